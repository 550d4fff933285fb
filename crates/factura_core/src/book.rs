//! Presentation-facing facade.
//!
//! # Responsibility
//! - Combine customer, invoice and cascade services behind the calls a UI
//!   makes, keeping the selection and edit context in an explicit `Session`.
//! - Push fresh state to a `Presenter` after every mutation.
//!
//! # Invariants
//! - Presenter data always comes from a store read issued after the write.
//! - The core never renders user-facing text; callers receive typed errors.

use crate::model::customer::{Customer, CustomerId};
use crate::model::invoice::{InvoiceDraft, InvoiceId};
use crate::model::photo::Photo;
use crate::service::cascade::{CascadeError, CascadeFailure, CascadeReport};
use crate::service::customer_service::CustomerService;
use crate::service::invoice_service::InvoiceService;
use crate::service::photo::{load_inline_photo, PhotoError};
use crate::service::DEFAULT_STORE_TIMEOUT;
use crate::store::{Deletion, StoreAdapter, StoreError};
use crate::total::InvoiceView;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

/// Receives refreshed state after reads and mutations.
pub trait Presenter: Send + Sync {
    fn customers_changed(&self, customers: &[Customer]);
    fn invoices_changed(&self, customer_id: CustomerId, invoices: &[InvoiceView]);
}

/// UI context: which customer is open and which invoice is being edited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Session {
    pub selected_customer: Option<CustomerId>,
    pub editing_invoice: Option<InvoiceId>,
}

impl Session {
    /// Opens `customer_id`, or closes it when it is already open.
    ///
    /// Returns the customer that is open afterwards.
    pub fn toggle_customer(&mut self, customer_id: CustomerId) -> Option<CustomerId> {
        self.editing_invoice = None;
        self.selected_customer = match self.selected_customer {
            Some(current) if current == customer_id => None,
            _ => Some(customer_id),
        };
        self.selected_customer
    }
}

/// Where a new invoice photo comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoSource {
    /// Local image file, embedded inline.
    File(PathBuf),
    /// Already hosted image.
    Url(String),
}

#[derive(Debug)]
pub enum BookError {
    Store(StoreError),
    Cascade(CascadeError),
    Photo(PhotoError),
    /// Invoice action issued while no customer is open.
    NoCustomerSelected,
}

impl BookError {
    /// Stable machine-readable code for presentation layers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Store(err) => err.code(),
            Self::Cascade(err) => err.code(),
            Self::Photo(err) => err.code(),
            Self::NoCustomerSelected => "no_customer_selected",
        }
    }
}

impl Display for BookError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Cascade(err) => write!(f, "{err}"),
            Self::Photo(err) => write!(f, "{err}"),
            Self::NoCustomerSelected => write!(f, "no customer selected"),
        }
    }
}

impl Error for BookError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Cascade(err) => Some(err),
            Self::Photo(err) => Some(err),
            Self::NoCustomerSelected => None,
        }
    }
}

impl From<StoreError> for BookError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<CascadeError> for BookError {
    fn from(value: CascadeError) -> Self {
        Self::Cascade(value)
    }
}

impl From<PhotoError> for BookError {
    fn from(value: PhotoError) -> Self {
        Self::Photo(value)
    }
}

pub type BookResult<T> = Result<T, BookError>;

/// Customer and invoice book bound to one store and one presenter.
pub struct InvoiceBook<S: StoreAdapter + Clone, P: Presenter> {
    customers: CustomerService<S>,
    invoices: InvoiceService<S>,
    presenter: P,
}

impl<S: StoreAdapter + Clone, P: Presenter> InvoiceBook<S, P> {
    pub fn new(store: S, presenter: P) -> Self {
        Self::with_deadline(store, presenter, DEFAULT_STORE_TIMEOUT)
    }

    pub fn with_deadline(store: S, presenter: P, deadline: Duration) -> Self {
        Self {
            customers: CustomerService::with_deadline(store.clone(), deadline),
            invoices: InvoiceService::with_deadline(store, deadline),
            presenter,
        }
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Reloads the customer list and pushes it to the presenter.
    pub async fn refresh_customers(&self) -> BookResult<Vec<Customer>> {
        let customers = self.customers.list_customers().await?;
        self.presenter.customers_changed(&customers);
        Ok(customers)
    }

    /// Reloads invoices of the open customer; no-op when none is open.
    pub async fn refresh_invoices(&self, session: &Session) -> BookResult<Vec<InvoiceView>> {
        let Some(customer_id) = session.selected_customer else {
            return Ok(Vec::new());
        };
        let invoices = self.invoices.list_invoices(customer_id).await?;
        self.presenter.invoices_changed(customer_id, &invoices);
        Ok(invoices)
    }

    pub async fn create_customer(&self, name: &str) -> BookResult<Customer> {
        let customer = self.customers.create_customer(name).await?;
        self.refresh_customers().await?;
        Ok(customer)
    }

    /// Cascade-deletes a customer. Closes it in `session` once it is gone.
    ///
    /// The customer list is refreshed on partial failure too, so the
    /// presenter reflects what actually remains.
    pub async fn delete_customer(
        &self,
        session: &mut Session,
        customer_id: CustomerId,
    ) -> BookResult<CascadeReport> {
        let outcome = self.customers.delete_customer(customer_id).await;
        self.finish_customer_delete(session, customer_id, outcome)
            .await
    }

    /// Retries a cascade that stopped part-way.
    pub async fn resume_customer_delete(
        &self,
        session: &mut Session,
        failure: &CascadeFailure,
    ) -> BookResult<CascadeReport> {
        let outcome = self.customers.resume_delete(failure).await;
        self.finish_customer_delete(session, failure.customer_id, outcome)
            .await
    }

    async fn finish_customer_delete(
        &self,
        session: &mut Session,
        customer_id: CustomerId,
        outcome: Result<CascadeReport, CascadeError>,
    ) -> BookResult<CascadeReport> {
        match outcome {
            Ok(report) => {
                if session.selected_customer == Some(customer_id) {
                    *session = Session::default();
                }
                self.refresh_customers().await?;
                Ok(report)
            }
            Err(err) => {
                // Refresh failures here would mask the cascade error.
                if self.refresh_customers().await.is_ok() {
                    let _ = self.refresh_invoices(session).await;
                }
                Err(err.into())
            }
        }
    }

    /// Toggles the open customer and loads its invoices when opened.
    pub async fn select_customer(
        &self,
        session: &mut Session,
        customer_id: CustomerId,
    ) -> BookResult<Vec<InvoiceView>> {
        session.toggle_customer(customer_id);
        self.refresh_invoices(session).await
    }

    /// Loads one invoice of the open customer and marks it as being edited.
    pub async fn begin_edit(
        &self,
        session: &mut Session,
        invoice_id: InvoiceId,
    ) -> BookResult<InvoiceView> {
        if session.selected_customer.is_none() {
            return Err(BookError::NoCustomerSelected);
        }
        let view = self.invoices.get_invoice(invoice_id).await?;
        session.editing_invoice = Some(view.invoice.id);
        Ok(view)
    }

    pub fn begin_new(&self, session: &mut Session) {
        session.editing_invoice = None;
    }

    /// Saves a draft for the open customer: updates the invoice being edited,
    /// otherwise creates a new one.
    ///
    /// A `photo` source replaces `draft.photo`. File sources are read before
    /// the store is contacted; a read error aborts the save.
    pub async fn save_invoice(
        &self,
        session: &mut Session,
        mut draft: InvoiceDraft,
        photo: Option<PhotoSource>,
    ) -> BookResult<InvoiceView> {
        let customer_id = session
            .selected_customer
            .ok_or(BookError::NoCustomerSelected)?;
        draft.customer_id = Some(customer_id);

        match photo {
            Some(PhotoSource::File(path)) => draft.photo = Some(load_inline_photo(path).await?),
            Some(PhotoSource::Url(url)) => draft.photo = Some(Photo::Url(url)),
            None => {}
        }

        let saved = self
            .invoices
            .save_invoice(session.editing_invoice, &draft)
            .await?;
        session.editing_invoice = None;
        self.refresh_invoices(session).await?;
        Ok(saved)
    }

    pub async fn delete_invoice(
        &self,
        session: &mut Session,
        invoice_id: InvoiceId,
    ) -> BookResult<Deletion> {
        let deletion = self.invoices.delete_invoice(invoice_id).await?;
        if session.editing_invoice == Some(invoice_id) {
            session.editing_invoice = None;
        }
        self.refresh_invoices(session).await?;
        Ok(deletion)
    }
}

#[cfg(test)]
mod tests {
    use super::Session;

    #[test]
    fn toggling_same_customer_closes_it() {
        let mut session = Session::default();
        assert_eq!(session.toggle_customer(3), Some(3));
        assert_eq!(session.toggle_customer(3), None);
    }

    #[test]
    fn switching_customer_drops_edit_context() {
        let mut session = Session {
            selected_customer: Some(1),
            editing_invoice: Some(9),
        };
        assert_eq!(session.toggle_customer(2), Some(2));
        assert_eq!(session.editing_invoice, None);
    }
}
