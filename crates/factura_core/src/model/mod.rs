//! Domain model for customers and the invoices they own.
//!
//! # Responsibility
//! - Define canonical records returned by every store backend.
//! - Normalize write requests before they reach persistence.
//!
//! # Invariants
//! - Every invoice belongs to exactly one customer and never outlives it.
//! - Ids are assigned by the store and never reused after deletion.

pub mod customer;
pub mod invoice;
pub mod photo;
pub mod validation;
