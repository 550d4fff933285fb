//! Flutter-facing bindings for `factura_core`.

pub mod api;
