use factura_core::store::memory::StoreCall;
use factura_core::{
    CascadeCoordinator, CascadeError, Customer, CustomerService, Deletion, InvoiceDraft,
    InvoiceId, MemoryStore, SqliteStore, StoreAdapter, StoreError,
};
use std::sync::Arc;
use std::time::Duration;

async fn customer_with_invoices<S: StoreAdapter>(
    store: &S,
    name: &str,
    count: usize,
) -> (Customer, Vec<InvoiceId>) {
    let customer = store.create_customer(name).await.unwrap();
    let mut ids = Vec::with_capacity(count);
    for n in 0..count {
        let fields = InvoiceDraft::for_customer(customer.id)
            .title(format!("invoice {n}"))
            .amount(n as f64)
            .normalize()
            .unwrap();
        ids.push(store.create_invoice(&fields).await.unwrap().id);
    }
    (customer, ids)
}

#[tokio::test]
async fn cascade_empties_invoices_for_zero_one_and_many() {
    for count in [0, 1, 7] {
        let memory = MemoryStore::new();
        let (customer, ids) = customer_with_invoices(&memory, "Staged", count).await;
        let report = CascadeCoordinator::new(&memory)
            .delete_customer(customer.id)
            .await
            .unwrap();
        assert!(!report.atomic);
        assert_eq!(report.removed_invoice_ids, ids);
        assert_eq!(report.customer, Deletion::Removed);
        assert!(memory.list_invoices(customer.id).await.unwrap().is_empty());

        let sqlite = SqliteStore::open_in_memory().unwrap();
        let (customer, ids) = customer_with_invoices(&sqlite, "Atomic", count).await;
        let report = CascadeCoordinator::new(&sqlite)
            .delete_customer(customer.id)
            .await
            .unwrap();
        assert!(report.atomic);
        assert_eq!(report.removed_invoice_ids, ids);
        assert!(sqlite.list_invoices(customer.id).await.unwrap().is_empty());
        assert!(sqlite.list_customers().await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn staged_cascade_deletes_invoices_before_customer() {
    let store = MemoryStore::new();
    let (customer, ids) = customer_with_invoices(&store, "Order", 3).await;
    store.clear_calls().await;

    CascadeCoordinator::new(&store)
        .delete_customer(customer.id)
        .await
        .unwrap();

    let mut expected = vec![StoreCall::ListInvoices(customer.id)];
    expected.extend(ids.iter().map(|id| StoreCall::DeleteInvoice(*id)));
    expected.push(StoreCall::DeleteCustomer(customer.id));
    assert_eq!(store.calls().await, expected);
}

#[tokio::test]
async fn cascade_leaves_other_customers_untouched() {
    let store = MemoryStore::new();
    let (doomed, _) = customer_with_invoices(&store, "Doomed", 2).await;
    let (kept, kept_ids) = customer_with_invoices(&store, "Kept", 2).await;

    CascadeCoordinator::new(&store)
        .delete_customer(doomed.id)
        .await
        .unwrap();

    let remaining: Vec<InvoiceId> = store
        .list_invoices(kept.id)
        .await
        .unwrap()
        .into_iter()
        .map(|invoice| invoice.id)
        .collect();
    assert_eq!(remaining, kept_ids);
    assert_eq!(store.list_customers().await.unwrap(), vec![kept]);
}

#[tokio::test]
async fn partial_failure_names_failed_ids_keeps_customer_and_resumes() {
    let store = MemoryStore::new();
    let (customer, ids) = customer_with_invoices(&store, "Flaky", 4).await;
    store.fail_invoice_delete(ids[1]).await;
    store.fail_invoice_delete(ids[3]).await;

    let coordinator = CascadeCoordinator::new(&store);
    let failure = match coordinator.delete_customer(customer.id).await {
        Err(CascadeError::Partial(failure)) => failure,
        other => panic!("expected partial failure, got {other:?}"),
    };

    assert_eq!(failure.failed_invoice_ids(), vec![ids[1], ids[3]]);
    assert_eq!(failure.removed_invoice_ids, vec![ids[0], ids[2]]);
    assert!(failure.customer_error.is_none());
    assert_eq!(store.list_customers().await.unwrap(), vec![customer.clone()]);
    assert!(!store
        .calls()
        .await
        .contains(&StoreCall::DeleteCustomer(customer.id)));

    store.clear_failures().await;
    store.clear_calls().await;
    let report = coordinator.resume(&failure).await.unwrap();

    assert_eq!(report.removed_invoice_ids, vec![ids[0], ids[2], ids[1], ids[3]]);
    assert_eq!(report.customer, Deletion::Removed);
    assert_eq!(
        store.calls().await,
        vec![
            StoreCall::DeleteInvoice(ids[1]),
            StoreCall::DeleteInvoice(ids[3]),
            StoreCall::DeleteCustomer(customer.id),
        ]
    );
    assert_eq!(store.invoice_count().await, 0);
    assert!(store.list_customers().await.unwrap().is_empty());
}

#[tokio::test]
async fn customer_delete_failure_after_invoices_is_reported_and_resumable() {
    let store = MemoryStore::new();
    let (customer, ids) = customer_with_invoices(&store, "Sticky", 2).await;
    store.fail_customer_delete(customer.id).await;

    let coordinator = CascadeCoordinator::new(&store);
    let failure = match coordinator.delete_customer(customer.id).await {
        Err(CascadeError::Partial(failure)) => failure,
        other => panic!("expected partial failure, got {other:?}"),
    };
    assert!(failure.failed_invoice_ids().is_empty());
    assert_eq!(failure.removed_invoice_ids, ids);
    assert!(matches!(
        failure.customer_error,
        Some(StoreError::Unavailable(_))
    ));

    store.clear_failures().await;
    let report = coordinator.resume(&failure).await.unwrap();
    assert_eq!(report.customer, Deletion::Removed);
}

#[tokio::test]
async fn listing_failure_deletes_nothing() {
    let store = MemoryStore::new();
    let (customer, _) = customer_with_invoices(&store, "Offline", 2).await;
    store.set_unavailable(true).await;

    let err = CascadeCoordinator::new(&store)
        .delete_customer(customer.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CascadeError::Store(StoreError::Unavailable(_))));
    assert_eq!(err.code(), "store_unavailable");

    store.set_unavailable(false).await;
    assert_eq!(store.invoice_count().await, 2);
    assert_eq!(store.list_customers().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stalled_store_call_surfaces_unavailable() {
    let store = Arc::new(MemoryStore::new());
    let (customer, _) = customer_with_invoices(&*store, "Slow", 1).await;
    store.set_latency(Duration::from_secs(30)).await;

    let service = CustomerService::with_deadline(store.clone(), Duration::from_millis(200));
    let err = service.delete_customer(customer.id).await.unwrap_err();

    assert!(matches!(
        err,
        CascadeError::Store(StoreError::Unavailable(message)) if message.contains("timed out")
    ));
}

#[tokio::test]
async fn deleting_missing_customer_is_a_no_op() {
    let store = MemoryStore::new();
    let report = CascadeCoordinator::new(&store)
        .delete_customer(12345)
        .await
        .unwrap();
    assert_eq!(report.customer, Deletion::AlreadyAbsent);
    assert!(report.removed_invoice_ids.is_empty());
}
