//! Cascade delete of a customer and every invoice it owns.
//!
//! # Responsibility
//! - Guarantee that deleting a customer leaves no orphaned invoice behind.
//! - Report exactly which invoice deletions failed when the backend cannot
//!   commit the whole set atomically.
//!
//! # Invariants
//! - The invoice id set is read before anything is deleted.
//! - Transactional backends delete invoices and customer in one commit.
//! - Other backends use a staged commit: invoices first, in listed order,
//!   then the customer, and only when every invoice is confirmed gone. The
//!   customer record therefore still exists whenever a `CascadeFailure` is
//!   returned.
//! - Steps run sequentially, never concurrently.

use crate::model::customer::CustomerId;
use crate::model::invoice::InvoiceId;
use crate::service::{guarded, DEFAULT_STORE_TIMEOUT};
use crate::store::{Deletion, StoreAdapter, StoreError};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Successful cascade outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeReport {
    pub customer_id: CustomerId,
    /// Invoice ids confirmed gone, in deletion order.
    pub removed_invoice_ids: Vec<InvoiceId>,
    pub customer: Deletion,
    /// Whether the backend committed everything in one transaction.
    pub atomic: bool,
}

/// Staged cascade that stopped before deleting the customer.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeFailure {
    pub customer_id: CustomerId,
    /// Invoice ids confirmed gone before the failure.
    pub removed_invoice_ids: Vec<InvoiceId>,
    /// Invoice deletions that failed, with their causes.
    pub failed_invoices: Vec<(InvoiceId, StoreError)>,
    /// Set when every invoice is gone but the customer delete itself failed.
    pub customer_error: Option<StoreError>,
}

impl CascadeFailure {
    /// Invoice ids a caller should retry.
    pub fn failed_invoice_ids(&self) -> Vec<InvoiceId> {
        self.failed_invoices.iter().map(|(id, _)| *id).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CascadeError {
    /// Listing invoices or the native transaction failed; nothing was deleted.
    Store(StoreError),
    /// Some staged steps failed; see `CascadeFailure`.
    Partial(CascadeFailure),
}

impl CascadeError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Store(err) => err.code(),
            Self::Partial(_) => "cascade_partial",
        }
    }
}

impl Display for CascadeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Partial(failure) => match &failure.customer_error {
                Some(err) => write!(
                    f,
                    "customer {} delete failed after removing its invoices: {err}",
                    failure.customer_id
                ),
                None => write!(
                    f,
                    "customer {} kept; invoice deletes failed for ids {:?}",
                    failure.customer_id,
                    failure.failed_invoice_ids()
                ),
            },
        }
    }
}

impl Error for CascadeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Partial(_) => None,
        }
    }
}

impl From<StoreError> for CascadeError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Executes the cascade protocol against one store.
pub struct CascadeCoordinator<'a, S: StoreAdapter + ?Sized> {
    store: &'a S,
    deadline: Duration,
}

impl<'a, S: StoreAdapter + ?Sized> CascadeCoordinator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self::with_deadline(store, DEFAULT_STORE_TIMEOUT)
    }

    pub fn with_deadline(store: &'a S, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    /// Deletes `customer_id` and every invoice it owns.
    ///
    /// # Errors
    /// - `CascadeError::Store` when the invoice listing or native transaction
    ///   fails; the store is unchanged.
    /// - `CascadeError::Partial` when a staged step fails; retry with
    ///   [`CascadeCoordinator::resume`].
    pub async fn delete_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<CascadeReport, CascadeError> {
        let backend = self.store.backend_tag();
        info!("event=cascade_delete module=cascade status=start backend={backend} customer_id={customer_id}");

        let invoice_ids: Vec<InvoiceId> = guarded(
            backend,
            "list_invoices",
            self.deadline,
            self.store.list_invoices(customer_id),
        )
        .await
        .map_err(|err| {
            error!("event=cascade_delete module=cascade status=error backend={backend} customer_id={customer_id} stage=list error_code={}", err.code());
            CascadeError::Store(err)
        })?
        .into_iter()
        .map(|invoice| invoice.id)
        .collect();

        if let Some(tx_store) = self.store.transactional() {
            let outcome = guarded(
                backend,
                "delete_customer_tree",
                self.deadline,
                tx_store.delete_customer_tree(customer_id, &invoice_ids),
            )
            .await
            .map_err(|err| {
                error!("event=cascade_delete module=cascade status=error backend={backend} customer_id={customer_id} stage=transaction error_code={}", err.code());
                CascadeError::Store(err)
            })?;

            info!(
                "event=cascade_delete module=cascade status=ok backend={backend} customer_id={customer_id} mode=atomic invoices_removed={}",
                outcome.removed_invoice_ids.len()
            );
            return Ok(CascadeReport {
                customer_id,
                removed_invoice_ids: outcome.removed_invoice_ids,
                customer: outcome.customer,
                atomic: true,
            });
        }

        self.delete_staged(customer_id, invoice_ids, Vec::new())
            .await
    }

    /// Retries only the steps a previous staged cascade left undone.
    pub async fn resume(&self, failure: &CascadeFailure) -> Result<CascadeReport, CascadeError> {
        info!(
            "event=cascade_resume module=cascade status=start backend={} customer_id={} pending_invoices={}",
            self.store.backend_tag(),
            failure.customer_id,
            failure.failed_invoices.len()
        );
        self.delete_staged(
            failure.customer_id,
            failure.failed_invoice_ids(),
            failure.removed_invoice_ids.clone(),
        )
        .await
    }

    async fn delete_staged(
        &self,
        customer_id: CustomerId,
        invoice_ids: Vec<InvoiceId>,
        mut removed_invoice_ids: Vec<InvoiceId>,
    ) -> Result<CascadeReport, CascadeError> {
        let backend = self.store.backend_tag();
        let mut failed_invoices = Vec::new();

        for invoice_id in invoice_ids {
            match guarded(
                backend,
                "delete_invoice",
                self.deadline,
                self.store.delete_invoice(invoice_id),
            )
            .await
            {
                Ok(_) => removed_invoice_ids.push(invoice_id),
                Err(err) => failed_invoices.push((invoice_id, err)),
            }
        }

        if !failed_invoices.is_empty() {
            warn!(
                "event=cascade_delete module=cascade status=partial backend={backend} customer_id={customer_id} invoices_removed={} invoices_failed={}",
                removed_invoice_ids.len(),
                failed_invoices.len()
            );
            return Err(CascadeError::Partial(CascadeFailure {
                customer_id,
                removed_invoice_ids,
                failed_invoices,
                customer_error: None,
            }));
        }

        match guarded(
            backend,
            "delete_customer",
            self.deadline,
            self.store.delete_customer(customer_id),
        )
        .await
        {
            Ok(customer) => {
                info!(
                    "event=cascade_delete module=cascade status=ok backend={backend} customer_id={customer_id} mode=staged invoices_removed={}",
                    removed_invoice_ids.len()
                );
                Ok(CascadeReport {
                    customer_id,
                    removed_invoice_ids,
                    customer,
                    atomic: false,
                })
            }
            Err(err) => {
                warn!(
                    "event=cascade_delete module=cascade status=partial backend={backend} customer_id={customer_id} stage=customer error_code={}",
                    err.code()
                );
                Err(CascadeError::Partial(CascadeFailure {
                    customer_id,
                    removed_invoice_ids,
                    failed_invoices: Vec::new(),
                    customer_error: Some(err),
                }))
            }
        }
    }
}
