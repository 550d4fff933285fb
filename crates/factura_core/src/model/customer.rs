//! Customer domain model.
//!
//! # Invariants
//! - `id` is assigned by the store and never reused for another customer.
//! - `name` is trimmed and non-empty.
//! - `created_at` is set once on creation and never changes.

use crate::model::validation::ValidationError;
use serde::{Deserialize, Serialize};

/// Store-assigned customer identifier.
pub type CustomerId = i64;

/// Owner of zero or more invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

/// Trims `name` and rejects it when nothing is left.
pub fn validate_customer_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyCustomerName);
    }
    Ok(trimmed.to_string())
}
