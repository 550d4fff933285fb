//! In-process reference store.
//!
//! Non-transactional on purpose: it exercises the staged cascade path the
//! same way the remote backend does. Every call is recorded, and individual
//! operations can be made to fail or stall.

use crate::model::customer::{validate_customer_name, Customer, CustomerId};
use crate::model::invoice::{Invoice, InvoiceFields, InvoiceId};
use crate::model::validation::ValidationError;
use crate::store::{
    ensure_same_owner, now_epoch_ms, Deletion, Entity, StoreAdapter, StoreError, StoreResult,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio::sync::Mutex;

/// One recorded adapter call, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    ListCustomers,
    CreateCustomer,
    DeleteCustomer(CustomerId),
    ListInvoices(CustomerId),
    GetInvoice(InvoiceId),
    CreateInvoice(CustomerId),
    UpdateInvoice(InvoiceId),
    DeleteInvoice(InvoiceId),
}

#[derive(Default)]
struct State {
    customers: BTreeMap<CustomerId, Customer>,
    invoices: BTreeMap<InvoiceId, Invoice>,
    next_customer_id: CustomerId,
    next_invoice_id: InvoiceId,
    calls: Vec<StoreCall>,
    failing_invoice_deletes: BTreeSet<InvoiceId>,
    failing_customer_deletes: BTreeSet<CustomerId>,
    unavailable: bool,
    latency: Duration,
}

/// Map-backed store adapter with call recording and fault injection.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls issued so far, oldest first.
    pub async fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Makes every `delete_invoice(id)` fail until cleared.
    pub async fn fail_invoice_delete(&self, id: InvoiceId) {
        self.state.lock().await.failing_invoice_deletes.insert(id);
    }

    /// Makes every `delete_customer(id)` fail until cleared.
    pub async fn fail_customer_delete(&self, id: CustomerId) {
        self.state.lock().await.failing_customer_deletes.insert(id);
    }

    pub async fn clear_failures(&self) {
        let mut state = self.state.lock().await;
        state.failing_invoice_deletes.clear();
        state.failing_customer_deletes.clear();
        state.unavailable = false;
    }

    /// Fails every subsequent call with `StoreError::Unavailable`.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    /// Delays every subsequent call by `latency`.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.lock().await.latency = latency;
    }

    /// Total number of invoices across all customers.
    pub async fn invoice_count(&self) -> usize {
        self.state.lock().await.invoices.len()
    }

    /// Records `call`, applies injected latency, then returns the locked state
    /// unless the store is marked unavailable.
    async fn enter(&self, call: StoreCall) -> StoreResult<tokio::sync::MutexGuard<'_, State>> {
        let latency = {
            let mut state = self.state.lock().await;
            state.calls.push(call);
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let state = self.state.lock().await;
        if state.unavailable {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(state)
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn list_customers(&self) -> StoreResult<Vec<Customer>> {
        let state = self.enter(StoreCall::ListCustomers).await?;
        Ok(state.customers.values().cloned().collect())
    }

    async fn create_customer(&self, name: &str) -> StoreResult<Customer> {
        let mut state = self.enter(StoreCall::CreateCustomer).await?;
        let name = validate_customer_name(name)?;
        state.next_customer_id += 1;
        let customer = Customer {
            id: state.next_customer_id,
            name,
            created_at: now_epoch_ms(),
        };
        state.customers.insert(customer.id, customer.clone());
        Ok(customer)
    }

    async fn delete_customer(&self, id: CustomerId) -> StoreResult<Deletion> {
        let mut state = self.enter(StoreCall::DeleteCustomer(id)).await?;
        if state.failing_customer_deletes.contains(&id) {
            return Err(StoreError::Unavailable(format!(
                "injected failure deleting customer {id}"
            )));
        }
        Ok(match state.customers.remove(&id) {
            Some(_) => Deletion::Removed,
            None => Deletion::AlreadyAbsent,
        })
    }

    async fn list_invoices(&self, customer_id: CustomerId) -> StoreResult<Vec<Invoice>> {
        let state = self.enter(StoreCall::ListInvoices(customer_id)).await?;
        Ok(state
            .invoices
            .values()
            .filter(|invoice| invoice.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn get_invoice(&self, id: InvoiceId) -> StoreResult<Invoice> {
        let state = self.enter(StoreCall::GetInvoice(id)).await?;
        state
            .invoices
            .get(&id)
            .cloned()
            .ok_or(StoreError::not_found(Entity::Invoice, id))
    }

    async fn create_invoice(&self, fields: &InvoiceFields) -> StoreResult<Invoice> {
        let mut state = self
            .enter(StoreCall::CreateInvoice(fields.customer_id))
            .await?;
        if !state.customers.contains_key(&fields.customer_id) {
            return Err(ValidationError::UnknownCustomer(fields.customer_id).into());
        }
        state.next_invoice_id += 1;
        let invoice = Invoice::from_fields(state.next_invoice_id, fields.clone());
        state.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    async fn update_invoice(
        &self,
        id: InvoiceId,
        fields: &InvoiceFields,
    ) -> StoreResult<Invoice> {
        let mut state = self.enter(StoreCall::UpdateInvoice(id)).await?;
        let stored_owner = state
            .invoices
            .get(&id)
            .map(|invoice| invoice.customer_id)
            .ok_or(StoreError::not_found(Entity::Invoice, id))?;
        ensure_same_owner(id, stored_owner, fields)?;

        let invoice = Invoice::from_fields(id, fields.clone());
        state.invoices.insert(id, invoice.clone());
        Ok(invoice)
    }

    async fn delete_invoice(&self, id: InvoiceId) -> StoreResult<Deletion> {
        let mut state = self.enter(StoreCall::DeleteInvoice(id)).await?;
        if state.failing_invoice_deletes.contains(&id) {
            return Err(StoreError::Unavailable(format!(
                "injected failure deleting invoice {id}"
            )));
        }
        Ok(match state.invoices.remove(&id) {
            Some(_) => Deletion::Removed,
            None => Deletion::AlreadyAbsent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryStore, StoreCall};
    use crate::store::{StoreAdapter, StoreError};

    #[tokio::test]
    async fn records_calls_in_issue_order() {
        let store = MemoryStore::new();
        let customer = store.create_customer("Acme").await.unwrap();
        store.list_invoices(customer.id).await.unwrap();
        store.delete_customer(customer.id).await.unwrap();

        assert_eq!(
            store.calls().await,
            vec![
                StoreCall::CreateCustomer,
                StoreCall::ListInvoices(customer.id),
                StoreCall::DeleteCustomer(customer.id),
            ]
        );
    }

    #[tokio::test]
    async fn unavailable_store_rejects_calls_but_still_records_them() {
        let store = MemoryStore::new();
        store.set_unavailable(true).await;

        let err = store.list_customers().await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.calls().await, vec![StoreCall::ListCustomers]);
    }
}
