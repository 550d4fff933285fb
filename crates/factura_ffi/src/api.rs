//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose customer and invoice use-cases to Dart via FRB.
//! - Translate core errors into stable `error_code` strings.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - The store backend is resolved once per process from `FACTURA_*` env vars.
//! - Store-backed calls are not `sync`; FRB runs them off the UI thread.

use factura_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, open_store,
    ping as ping_inner, CascadeError, CascadeReport, CustomerService, DynStore, InvoiceDraft, InvoiceService,
    InvoiceView, LineItemInput, Photo, PriceInput, StoreConfig, StoreError,
};
use log::error;
use once_cell::sync::OnceCell;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Runtime;

static RUNTIME: OnceCell<Runtime> = OnceCell::new();
static STORE: OnceCell<(DynStore, Duration)> = OnceCell::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Sync call; may perform small file-system setup work.
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Customer row for list rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerItem {
    pub id: i64,
    pub name: String,
    /// Epoch milliseconds.
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineItemDto {
    pub description: String,
    pub price: f64,
}

/// Invoice row with its total already formatted (`150.00`).
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceItem {
    pub id: i64,
    pub customer_id: i64,
    pub title: String,
    pub date: String,
    pub amount: Option<f64>,
    pub items: Vec<LineItemDto>,
    /// URL or `data:` URI, directly usable as an image source.
    pub photo: Option<String>,
    pub total: String,
}

/// Invoice form as typed by the user. Prices stay text until normalized.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvoiceInput {
    pub customer_id: i64,
    pub title: String,
    pub date: String,
    pub amount: Option<String>,
    pub items: Vec<LineItemInputDto>,
    /// Local image to embed; wins over `photo_url`.
    pub photo_path: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LineItemInputDto {
    pub description: String,
    pub price: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomersResponse {
    pub ok: bool,
    pub items: Vec<CustomerItem>,
    pub error_code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoicesResponse {
    pub ok: bool,
    pub items: Vec<InvoiceItem>,
    pub error_code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceResponse {
    pub ok: bool,
    pub invoice: Option<InvoiceItem>,
    pub error_code: Option<String>,
    pub message: String,
}

/// Generic action response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub ok: bool,
    /// Id of the created or affected record.
    pub id: Option<i64>,
    pub error_code: Option<String>,
    pub message: String,
    /// Invoices a partial cascade could not delete; retry the customer delete.
    pub failed_invoice_ids: Vec<i64>,
}

impl ActionResponse {
    fn success(message: impl Into<String>, id: i64) -> Self {
        Self {
            ok: true,
            id: Some(id),
            error_code: None,
            message: message.into(),
            failed_invoice_ids: Vec::new(),
        }
    }

    fn failure(error_code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id: None,
            error_code: Some(error_code.to_string()),
            message: message.into(),
            failed_invoice_ids: Vec::new(),
        }
    }
}

/// Lists every customer.
pub fn customers_list() -> CustomersResponse {
    let result = with_store(|store, deadline| async move {
        CustomerService::with_deadline(store, deadline)
            .list_customers()
            .await
            .map_err(|err| failure_parts(&err))
    });
    match result {
        Ok(customers) => CustomersResponse {
            ok: true,
            items: customers
                .into_iter()
                .map(|customer| CustomerItem {
                    id: customer.id,
                    name: customer.name,
                    created_at: customer.created_at,
                })
                .collect(),
            error_code: None,
            message: "ok".to_string(),
        },
        Err((code, message)) => CustomersResponse {
            ok: false,
            items: Vec::new(),
            error_code: Some(code),
            message,
        },
    }
}

/// Creates one customer; blank names fail with `validation`.
pub fn customer_create(name: String) -> ActionResponse {
    let result = with_store(|store, deadline| async move {
        CustomerService::with_deadline(store, deadline)
            .create_customer(&name)
            .await
            .map_err(|err| failure_parts(&err))
    });
    match result {
        Ok(customer) => ActionResponse::success("customer created", customer.id),
        Err((code, message)) => ActionResponse::failure(&code, message),
    }
}

/// Deletes a customer and all of its invoices.
///
/// On partial failure `failed_invoice_ids` lists the invoices still present;
/// the customer is kept and the call can simply be repeated.
pub fn customer_delete(customer_id: i64) -> ActionResponse {
    let result = with_store(|store, deadline| async move {
        Ok::<_, ActionResponse>(
            CustomerService::with_deadline(store, deadline)
                .delete_customer(customer_id)
                .await,
        )
    });
    match result {
        Ok(outcome) => delete_response(outcome),
        Err(response) => response,
    }
}

fn delete_response(outcome: Result<CascadeReport, CascadeError>) -> ActionResponse {
    match outcome {
        Ok(report) => ActionResponse::success(
            format!(
                "customer deleted with {} invoice(s)",
                report.removed_invoice_ids.len()
            ),
            report.customer_id,
        ),
        Err(err) => {
            let mut response = ActionResponse::failure(err.code(), err.to_string());
            if let CascadeError::Partial(failure) = &err {
                response.id = Some(failure.customer_id);
                response.failed_invoice_ids = failure.failed_invoice_ids();
            }
            response
        }
    }
}

/// Lists invoices of one customer with computed totals.
pub fn invoices_list(customer_id: i64) -> InvoicesResponse {
    let result = with_store(|store, deadline| async move {
        InvoiceService::with_deadline(store, deadline)
            .list_invoices(customer_id)
            .await
            .map_err(|err| failure_parts(&err))
    });
    match result {
        Ok(views) => InvoicesResponse {
            ok: true,
            items: views.into_iter().map(to_invoice_item).collect(),
            error_code: None,
            message: "ok".to_string(),
        },
        Err((code, message)) => InvoicesResponse {
            ok: false,
            items: Vec::new(),
            error_code: Some(code),
            message,
        },
    }
}

pub fn invoice_get(invoice_id: i64) -> InvoiceResponse {
    let result = with_store(|store, deadline| async move {
        InvoiceService::with_deadline(store, deadline)
            .get_invoice(invoice_id)
            .await
            .map_err(|err| failure_parts(&err))
    });
    invoice_response(result)
}

/// Creates an invoice, or replaces `editing_id` when set.
///
/// A `photo_path` is read and embedded before the store is contacted.
pub fn invoice_save(editing_id: Option<i64>, input: InvoiceInput) -> InvoiceResponse {
    let result = with_store(|store, deadline| async move {
        let draft = to_draft(input).await?;
        InvoiceService::with_deadline(store, deadline)
            .save_invoice(editing_id, &draft)
            .await
            .map_err(|err| failure_parts(&err))
    });
    invoice_response(result)
}

pub fn invoice_delete(invoice_id: i64) -> ActionResponse {
    let result = with_store(|store, deadline| async move {
        InvoiceService::with_deadline(store, deadline)
            .delete_invoice(invoice_id)
            .await
            .map_err(|err| failure_parts(&err))
    });
    match result {
        Ok(_) => ActionResponse::success("invoice deleted", invoice_id),
        Err((code, message)) => ActionResponse::failure(&code, message),
    }
}

fn invoice_response(result: Result<InvoiceView, (String, String)>) -> InvoiceResponse {
    match result {
        Ok(view) => InvoiceResponse {
            ok: true,
            invoice: Some(to_invoice_item(view)),
            error_code: None,
            message: "ok".to_string(),
        },
        Err((code, message)) => InvoiceResponse {
            ok: false,
            invoice: None,
            error_code: Some(code),
            message,
        },
    }
}

async fn to_draft(input: InvoiceInput) -> Result<InvoiceDraft, (String, String)> {
    let photo = match (input.photo_path, input.photo_url) {
        (Some(path), _) if !path.trim().is_empty() => Some(
            factura_core::load_inline_photo(path.trim())
                .await
                .map_err(|err| (err.code().to_string(), err.to_string()))?,
        ),
        (_, Some(url)) if !url.trim().is_empty() => Some(Photo::Url(url.trim().to_string())),
        _ => None,
    };

    Ok(InvoiceDraft {
        customer_id: Some(input.customer_id),
        title: Some(input.title),
        date: input.date,
        amount: input
            .amount
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| PriceInput::Text(raw).coerce()),
        items: input
            .items
            .into_iter()
            .map(|item| LineItemInput::new(item.description, PriceInput::Text(item.price)))
            .collect(),
        photo,
    })
}

fn to_invoice_item(view: InvoiceView) -> InvoiceItem {
    let invoice = view.invoice;
    InvoiceItem {
        id: invoice.id,
        customer_id: invoice.customer_id,
        title: invoice.title,
        date: invoice.date,
        amount: invoice.amount,
        items: invoice
            .items
            .into_iter()
            .map(|item| LineItemDto {
                description: item.description,
                price: item.price,
            })
            .collect(),
        photo: invoice.photo.as_ref().map(Photo::to_wire),
        total: view.total.to_string(),
    }
}

fn failure_parts(err: &StoreError) -> (String, String) {
    (err.code().to_string(), err.to_string())
}

/// Runs `f` against the process store on the shared runtime.
///
/// Runtime or store setup failures are returned as `E::setup_failure`.
fn with_store<T, E, F, Fut>(f: F) -> Result<T, E>
where
    F: FnOnce(DynStore, Duration) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: SetupFailure,
{
    let runtime = RUNTIME.get_or_try_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|err| format!("async runtime init failed: {err}"))
    });
    let runtime = match runtime {
        Ok(runtime) => runtime,
        Err(message) => {
            error!("event=ffi_setup module=ffi status=error error_code=runtime_unavailable");
            return Err(E::setup_failure("runtime_unavailable", message));
        }
    };

    let resolved = STORE.get_or_try_init(|| {
        let config = StoreConfig::from_env().map_err(|err| (err.code(), err.to_string()))?;
        let store = open_store(&config).map_err(|err| (err.code(), err.to_string()))?;
        Ok::<_, (&'static str, String)>((store, config.timeout))
    });
    let (store, deadline) = match resolved {
        Ok((store, deadline)) => (store.clone(), *deadline),
        Err((code, message)) => {
            error!("event=ffi_setup module=ffi status=error error_code={code}");
            return Err(E::setup_failure(code, message));
        }
    };

    runtime.block_on(f(store, deadline))
}

/// Error shapes that can carry a store setup failure.
trait SetupFailure {
    fn setup_failure(code: &str, message: String) -> Self;
}

impl SetupFailure for (String, String) {
    fn setup_failure(code: &str, message: String) -> Self {
        (code.to_string(), message)
    }
}

impl SetupFailure for ActionResponse {
    fn setup_failure(code: &str, message: String) -> Self {
        ActionResponse::failure(code, message)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        core_version, customer_create, customer_delete, customers_list, delete_response,
        init_logging, invoice_delete, invoice_get, invoice_save, invoices_list, ping,
        InvoiceInput, LineItemInputDto,
    };
    use factura_core::{CustomerService, InvoiceDraft, MemoryStore, StoreAdapter};
    use std::sync::{Arc, Once};

    static TEST_DB: Once = Once::new();

    fn use_test_db() {
        TEST_DB.call_once(|| {
            let path = std::env::temp_dir().join(format!(
                "factura-ffi-test-{}.sqlite3",
                std::process::id()
            ));
            let _ = std::fs::remove_file(&path);
            std::env::set_var("FACTURA_BACKEND", "embedded");
            std::env::set_var("FACTURA_DB_PATH", path);
        });
    }

    fn item(description: &str, price: &str) -> LineItemInputDto {
        LineItemInputDto {
            description: description.to_string(),
            price: price.to_string(),
        }
    }

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_empty_log_dir() {
        let error = init_logging("info".to_string(), String::new());
        assert!(!error.is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn blank_customer_name_reports_validation_code() {
        use_test_db();
        let response = customer_create("   ".to_string());
        assert!(!response.ok);
        assert_eq!(response.error_code.as_deref(), Some("validation"));
    }

    #[test]
    fn invoice_lifecycle_through_envelopes() {
        use_test_db();
        let created = customer_create("Acme".to_string());
        assert!(created.ok, "{}", created.message);
        let customer_id = created.id.expect("customer id");
        assert!(customers_list().items.iter().any(|c| c.id == customer_id));

        let saved = invoice_save(
            None,
            InvoiceInput {
                customer_id,
                title: "Service".to_string(),
                date: "2024-05-01".to_string(),
                items: vec![item("Labor", "100.5"), item("Parts", "49.5abc")],
                ..InvoiceInput::default()
            },
        );
        assert!(saved.ok, "{}", saved.message);
        let invoice = saved.invoice.expect("saved invoice");
        assert_eq!(invoice.total, "150.00");

        let edited = invoice_save(
            Some(invoice.id),
            InvoiceInput {
                customer_id,
                amount: Some("75".to_string()),
                ..InvoiceInput::default()
            },
        );
        let edited = edited.invoice.expect("edited invoice");
        assert_eq!(edited.id, invoice.id);
        assert_eq!(edited.total, "75.00");
        assert_eq!(invoice_get(invoice.id).invoice, Some(edited));

        let second = invoice_save(
            None,
            InvoiceInput {
                customer_id,
                ..InvoiceInput::default()
            },
        )
        .invoice
        .expect("second invoice");
        assert!(invoice_delete(second.id).ok);
        assert_eq!(invoices_list(customer_id).items.len(), 1);

        let deleted = customer_delete(customer_id);
        assert!(deleted.ok, "{}", deleted.message);
        assert!(invoices_list(customer_id).items.is_empty());
        assert!(invoice_get(invoice.id).error_code.as_deref() == Some("not_found"));
    }

    #[test]
    fn missing_photo_file_aborts_save() {
        use_test_db();
        let customer_id = customer_create("Photo".to_string()).id.expect("id");
        let response = invoice_save(
            None,
            InvoiceInput {
                customer_id,
                photo_path: Some("/definitely/not/here.png".to_string()),
                ..InvoiceInput::default()
            },
        );
        assert!(!response.ok);
        assert_eq!(response.error_code.as_deref(), Some("photo_read_failed"));
        assert!(invoices_list(customer_id).items.is_empty());
    }

    #[test]
    fn partial_cascade_lists_failed_invoices_in_envelope() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let store = Arc::new(MemoryStore::new());

        let (customer_id, stuck_id, response) = runtime.block_on(async {
            let customer = store.create_customer("Stuck").await.expect("customer");
            let mut ids = Vec::new();
            for _ in 0..3 {
                let fields = InvoiceDraft::for_customer(customer.id)
                    .normalize()
                    .expect("fields");
                ids.push(store.create_invoice(&fields).await.expect("invoice").id);
            }
            store.fail_invoice_delete(ids[1]).await;

            let outcome = CustomerService::new(store.clone())
                .delete_customer(customer.id)
                .await;
            (customer.id, ids[1], delete_response(outcome))
        });

        assert!(!response.ok);
        assert_eq!(response.error_code.as_deref(), Some("cascade_partial"));
        assert_eq!(response.id, Some(customer_id));
        assert_eq!(response.failed_invoice_ids, vec![stuck_id]);
        assert_eq!(runtime.block_on(store.invoice_count()), 1);
    }
}
