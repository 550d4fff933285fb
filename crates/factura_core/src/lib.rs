//! Core domain logic for Factura: customers, invoices and their totals.
//! This crate is the single source of truth for business invariants.

pub mod book;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;
pub mod total;

pub use book::{BookError, BookResult, InvoiceBook, PhotoSource, Presenter, Session};
pub use config::{open_store, BackendConfig, ConfigError, StoreConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::customer::{Customer, CustomerId};
pub use model::invoice::{
    Invoice, InvoiceDraft, InvoiceFields, InvoiceId, LineItem, LineItemInput, PriceInput,
    DEFAULT_INVOICE_TITLE,
};
pub use model::photo::Photo;
pub use model::validation::ValidationError;
pub use service::cascade::{CascadeCoordinator, CascadeError, CascadeFailure, CascadeReport};
pub use service::customer_service::CustomerService;
pub use service::invoice_service::InvoiceService;
pub use service::photo::{load_inline_photo, PhotoError};
pub use store::embedded::SqliteStore;
pub use store::memory::MemoryStore;
pub use store::remote::{HttpTransport, RemoteStore, Transport};
pub use store::{Deletion, DynStore, Entity, StoreAdapter, StoreError, StoreResult};
pub use total::{invoice_total, InvoiceView, Total};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
