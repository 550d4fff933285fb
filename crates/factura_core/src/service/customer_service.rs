//! Customer use-case service.
//!
//! # Responsibility
//! - Provide customer list/create/delete APIs over any store adapter.
//! - Route every customer delete through the cascade coordinator.
//!
//! # Invariants
//! - A customer is never deleted while it still owns invoices.
//! - Names are validated before any store call is issued.

use crate::model::customer::{validate_customer_name, Customer, CustomerId};
use crate::service::cascade::{CascadeCoordinator, CascadeError, CascadeFailure, CascadeReport};
use crate::service::{guarded, DEFAULT_STORE_TIMEOUT};
use crate::store::{StoreAdapter, StoreResult};
use std::time::Duration;

/// Customer service facade over one store adapter.
pub struct CustomerService<S: StoreAdapter> {
    store: S,
    deadline: Duration,
}

impl<S: StoreAdapter> CustomerService<S> {
    pub fn new(store: S) -> Self {
        Self::with_deadline(store, DEFAULT_STORE_TIMEOUT)
    }

    pub fn with_deadline(store: S, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Lists all customers in backend order.
    pub async fn list_customers(&self) -> StoreResult<Vec<Customer>> {
        guarded(
            self.store.backend_tag(),
            "list_customers",
            self.deadline,
            self.store.list_customers(),
        )
        .await
    }

    /// Creates one customer from a display name.
    ///
    /// # Errors
    /// - `StoreError::Validation(EmptyCustomerName)` for blank names; the
    ///   store is not contacted.
    pub async fn create_customer(&self, name: &str) -> StoreResult<Customer> {
        let name = validate_customer_name(name)?;
        guarded(
            self.store.backend_tag(),
            "create_customer",
            self.deadline,
            self.store.create_customer(&name),
        )
        .await
    }

    /// Deletes a customer and every invoice it owns.
    pub async fn delete_customer(
        &self,
        id: CustomerId,
    ) -> Result<CascadeReport, CascadeError> {
        CascadeCoordinator::with_deadline(&self.store, self.deadline)
            .delete_customer(id)
            .await
    }

    /// Completes a cascade that previously stopped part-way.
    pub async fn resume_delete(
        &self,
        failure: &CascadeFailure,
    ) -> Result<CascadeReport, CascadeError> {
        CascadeCoordinator::with_deadline(&self.store, self.deadline)
            .resume(failure)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::CustomerService;
    use crate::model::validation::ValidationError;
    use crate::store::memory::{MemoryStore, StoreCall};
    use crate::store::StoreError;
    use std::sync::Arc;

    #[tokio::test]
    async fn blank_name_is_rejected_without_store_call() {
        let store = Arc::new(MemoryStore::new());
        let service = CustomerService::new(store.clone());

        let err = service
            .create_customer("   ")
            .await
            .expect_err("blank name must fail");
        assert_eq!(
            err,
            StoreError::Validation(ValidationError::EmptyCustomerName)
        );
        assert!(store.calls().await.is_empty());
    }

    #[tokio::test]
    async fn created_name_is_trimmed() {
        let store = Arc::new(MemoryStore::new());
        let service = CustomerService::new(store.clone());

        let customer = service.create_customer("  Acme  ").await.expect("create");
        assert_eq!(customer.name, "Acme");
        assert_eq!(store.calls().await, vec![StoreCall::CreateCustomer]);
    }
}
