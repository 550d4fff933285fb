//! Store adapter contract and backend implementations.
//!
//! # Responsibility
//! - Define one async CRUD contract over customers and invoices.
//! - Keep backend details (SQL, HTTP) behind that contract.
//!
//! # Invariants
//! - Every backend provides atomic single-entity writes.
//! - Deleting a missing record is a no-op success (`Deletion::AlreadyAbsent`).
//! - `delete_customer` removes only the customer row; cascade semantics are
//!   owned by `service::cascade`.
//! - Only backends returning `Some` from `transactional()` may delete a
//!   customer and its invoices in one commit.

use crate::db::DbError;
use crate::model::customer::{Customer, CustomerId};
use crate::model::invoice::{Invoice, InvoiceFields, InvoiceId};
use crate::model::validation::ValidationError;
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub mod embedded;
pub mod memory;
pub mod remote;

pub type StoreResult<T> = Result<T, StoreError>;

/// Record family addressed by an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Customer,
    Invoice,
}

impl Display for Entity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Customer => write!(f, "customer"),
            Self::Invoice => write!(f, "invoice"),
        }
    }
}

/// Failure taxonomy shared by every backend.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Bad input; never retried.
    Validation(ValidationError),
    /// Operation targeted a missing id.
    NotFound { entity: Entity, id: i64 },
    /// Backend unreachable, errored, or timed out.
    Unavailable(String),
    /// Backend returned data that violates the model.
    InvalidData(String),
}

impl StoreError {
    pub fn not_found(entity: Entity, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Stable machine-readable code for presentation layers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Unavailable(_) => "store_unavailable",
            Self::InvalidData(_) => "invalid_data",
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Unavailable(details) => write!(f, "store unavailable: {details}"),
            Self::InvalidData(details) => write!(f, "invalid stored data: {details}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for StoreError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::CorruptRow { .. } => Self::InvalidData(value.to_string()),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::from(DbError::Sqlite(value))
    }
}

/// Result of an idempotent delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    Removed,
    AlreadyAbsent,
}

impl Deletion {
    pub fn from_changed_rows(changed: usize) -> Self {
        if changed == 0 {
            Self::AlreadyAbsent
        } else {
            Self::Removed
        }
    }
}

/// Outcome of a native customer-plus-invoices transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeDeletion {
    pub customer: Deletion,
    /// Invoice ids actually removed, including rows swept by `customer_id`.
    pub removed_invoice_ids: Vec<InvoiceId>,
}

/// Backend-independent persistence contract.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Short backend name for diagnostics (`sqlite`, `remote`, `memory`).
    fn backend_tag(&self) -> &'static str;

    async fn list_customers(&self) -> StoreResult<Vec<Customer>>;
    async fn create_customer(&self, name: &str) -> StoreResult<Customer>;
    /// Removes the customer record only. Callers needing cascade semantics go
    /// through `CascadeCoordinator`.
    async fn delete_customer(&self, id: CustomerId) -> StoreResult<Deletion>;

    /// Invoices owned by `customer_id`; empty when there are none or the
    /// customer does not exist.
    async fn list_invoices(&self, customer_id: CustomerId) -> StoreResult<Vec<Invoice>>;
    async fn get_invoice(&self, id: InvoiceId) -> StoreResult<Invoice>;
    async fn create_invoice(&self, fields: &InvoiceFields) -> StoreResult<Invoice>;
    /// Full replacement. Fails with `NotFound` and leaves the store unchanged
    /// when `id` does not exist.
    async fn update_invoice(&self, id: InvoiceId, fields: &InvoiceFields)
        -> StoreResult<Invoice>;
    async fn delete_invoice(&self, id: InvoiceId) -> StoreResult<Deletion>;

    /// Multi-record transaction capability, when the backend has one.
    fn transactional(&self) -> Option<&dyn TransactionalStore> {
        None
    }
}

/// Native multi-record atomic delete.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    /// Deletes `invoice_ids`, any other invoice still owned by `customer_id`,
    /// and the customer itself in one commit.
    async fn delete_customer_tree(
        &self,
        customer_id: CustomerId,
        invoice_ids: &[InvoiceId],
    ) -> StoreResult<TreeDeletion>;
}

/// Shared handle used when the backend is chosen at startup.
pub type DynStore = Arc<dyn StoreAdapter>;

#[async_trait]
impl<S: StoreAdapter + ?Sized> StoreAdapter for Arc<S> {
    fn backend_tag(&self) -> &'static str {
        (**self).backend_tag()
    }

    async fn list_customers(&self) -> StoreResult<Vec<Customer>> {
        (**self).list_customers().await
    }

    async fn create_customer(&self, name: &str) -> StoreResult<Customer> {
        (**self).create_customer(name).await
    }

    async fn delete_customer(&self, id: CustomerId) -> StoreResult<Deletion> {
        (**self).delete_customer(id).await
    }

    async fn list_invoices(&self, customer_id: CustomerId) -> StoreResult<Vec<Invoice>> {
        (**self).list_invoices(customer_id).await
    }

    async fn get_invoice(&self, id: InvoiceId) -> StoreResult<Invoice> {
        (**self).get_invoice(id).await
    }

    async fn create_invoice(&self, fields: &InvoiceFields) -> StoreResult<Invoice> {
        (**self).create_invoice(fields).await
    }

    async fn update_invoice(
        &self,
        id: InvoiceId,
        fields: &InvoiceFields,
    ) -> StoreResult<Invoice> {
        (**self).update_invoice(id, fields).await
    }

    async fn delete_invoice(&self, id: InvoiceId) -> StoreResult<Deletion> {
        (**self).delete_invoice(id).await
    }

    fn transactional(&self) -> Option<&dyn TransactionalStore> {
        (**self).transactional()
    }
}

/// Rejects updates that would move `invoice_id` to another customer.
pub(crate) fn ensure_same_owner(
    invoice_id: InvoiceId,
    stored_owner: CustomerId,
    fields: &InvoiceFields,
) -> Result<(), ValidationError> {
    if stored_owner != fields.customer_id {
        return Err(ValidationError::Reparent {
            invoice_id,
            from: stored_owner,
            to: fields.customer_id,
        });
    }
    Ok(())
}

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
