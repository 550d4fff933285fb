//! Invoice use-case service.
//!
//! # Responsibility
//! - Normalize invoice drafts and forward them to the store adapter.
//! - Annotate every invoice read with its computed total.
//!
//! # Invariants
//! - `update_invoice` is a full replacement that keeps the owning customer.
//! - `save_invoice` updates when an id is being edited and creates otherwise.

use crate::model::customer::CustomerId;
use crate::model::invoice::{InvoiceDraft, InvoiceId};
use crate::service::{guarded, DEFAULT_STORE_TIMEOUT};
use crate::store::{Deletion, StoreAdapter, StoreResult};
use crate::total::InvoiceView;
use std::time::Duration;

/// Invoice service facade over one store adapter.
pub struct InvoiceService<S: StoreAdapter> {
    store: S,
    deadline: Duration,
}

impl<S: StoreAdapter> InvoiceService<S> {
    pub fn new(store: S) -> Self {
        Self::with_deadline(store, DEFAULT_STORE_TIMEOUT)
    }

    pub fn with_deadline(store: S, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Lists invoices owned by `customer_id`, each with its total.
    pub async fn list_invoices(&self, customer_id: CustomerId) -> StoreResult<Vec<InvoiceView>> {
        let invoices = guarded(
            self.store.backend_tag(),
            "list_invoices",
            self.deadline,
            self.store.list_invoices(customer_id),
        )
        .await?;
        Ok(invoices.into_iter().map(InvoiceView::from).collect())
    }

    pub async fn get_invoice(&self, id: InvoiceId) -> StoreResult<InvoiceView> {
        guarded(
            self.store.backend_tag(),
            "get_invoice",
            self.deadline,
            self.store.get_invoice(id),
        )
        .await
        .map(InvoiceView::from)
    }

    /// Creates one invoice from a draft.
    ///
    /// # Errors
    /// - `Validation(MissingCustomerReference)` before any store call.
    /// - `Validation(UnknownCustomer)` when the owner does not exist.
    pub async fn create_invoice(&self, draft: &InvoiceDraft) -> StoreResult<InvoiceView> {
        let fields = draft.normalize()?;
        guarded(
            self.store.backend_tag(),
            "create_invoice",
            self.deadline,
            self.store.create_invoice(&fields),
        )
        .await
        .map(InvoiceView::from)
    }

    /// Replaces every field of invoice `id`.
    ///
    /// # Errors
    /// - `NotFound` when `id` does not exist; nothing is created.
    /// - `Validation(Reparent)` when the draft names another customer.
    pub async fn update_invoice(
        &self,
        id: InvoiceId,
        draft: &InvoiceDraft,
    ) -> StoreResult<InvoiceView> {
        let fields = draft.normalize()?;
        guarded(
            self.store.backend_tag(),
            "update_invoice",
            self.deadline,
            self.store.update_invoice(id, &fields),
        )
        .await
        .map(InvoiceView::from)
    }

    /// Creates or replaces depending on whether an invoice is being edited.
    pub async fn save_invoice(
        &self,
        editing: Option<InvoiceId>,
        draft: &InvoiceDraft,
    ) -> StoreResult<InvoiceView> {
        match editing {
            Some(id) => self.update_invoice(id, draft).await,
            None => self.create_invoice(draft).await,
        }
    }

    /// Idempotent delete.
    pub async fn delete_invoice(&self, id: InvoiceId) -> StoreResult<Deletion> {
        guarded(
            self.store.backend_tag(),
            "delete_invoice",
            self.deadline,
            self.store.delete_invoice(id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::InvoiceService;
    use crate::model::invoice::InvoiceDraft;
    use crate::model::validation::ValidationError;
    use crate::store::memory::MemoryStore;
    use crate::store::{StoreAdapter, StoreError};
    use std::sync::Arc;

    #[tokio::test]
    async fn draft_without_customer_never_reaches_store() {
        let store = Arc::new(MemoryStore::new());
        let service = InvoiceService::new(store.clone());

        let err = service
            .create_invoice(&InvoiceDraft::default().title("orphan"))
            .await
            .expect_err("missing customer must fail");
        assert_eq!(
            err,
            StoreError::Validation(ValidationError::MissingCustomerReference)
        );
        assert!(store.calls().await.is_empty());
    }

    #[tokio::test]
    async fn save_switches_between_create_and_update() {
        let store = Arc::new(MemoryStore::new());
        let customer = store.create_customer("Acme").await.expect("customer");
        let service = InvoiceService::new(store.clone());

        let created = service
            .save_invoice(None, &InvoiceDraft::for_customer(customer.id).amount(40.0))
            .await
            .expect("create");
        let updated = service
            .save_invoice(
                Some(created.invoice.id),
                &InvoiceDraft::for_customer(customer.id)
                    .title("Revised")
                    .item("Labor", 25.0),
            )
            .await
            .expect("update");

        assert_eq!(updated.invoice.id, created.invoice.id);
        assert_eq!(updated.invoice.title, "Revised");
        assert_eq!(updated.total.to_string(), "25.00");
        assert_eq!(store.invoice_count().await, 1);
    }
}
