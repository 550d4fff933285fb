//! Validation errors raised while normalizing write requests.

use crate::model::customer::CustomerId;
use crate::model::invoice::InvoiceId;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Rejected input. Never retried automatically; surfaced to the caller as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Customer name is empty after trimming.
    EmptyCustomerName,
    /// Invoice write request carries no customer reference.
    MissingCustomerReference,
    /// Invoice references a customer that does not exist.
    UnknownCustomer(CustomerId),
    /// Update tried to move an invoice to another customer.
    Reparent {
        invoice_id: InvoiceId,
        from: CustomerId,
        to: CustomerId,
    },
    /// Photo payload could not be interpreted.
    InvalidPhoto(String),
    /// Backend refused the write for a reason it reported itself.
    Rejected(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCustomerName => write!(f, "customer name cannot be empty"),
            Self::MissingCustomerReference => write!(f, "invoice requires a customer_id"),
            Self::UnknownCustomer(id) => write!(f, "customer does not exist: {id}"),
            Self::Reparent {
                invoice_id,
                from,
                to,
            } => write!(
                f,
                "invoice {invoice_id} belongs to customer {from}; cannot move it to {to}"
            ),
            Self::InvalidPhoto(details) => write!(f, "invalid photo payload: {details}"),
            Self::Rejected(details) => write!(f, "write rejected by backend: {details}"),
        }
    }
}

impl Error for ValidationError {}
