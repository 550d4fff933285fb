//! Remote API store backend.
//!
//! # Responsibility
//! - Speak the customer/invoice JSON protocol over a request/response
//!   `Transport`.
//! - Translate HTTP statuses into the shared `StoreError` taxonomy.
//!
//! # Invariants
//! - The backend offers no multi-record transaction; cascade deletes run as
//!   staged sequential calls in `service::cascade`.
//! - No retries happen here; a failed request surfaces immediately.
//!
//! Wire shapes:
//! - customer: `{id, name, created_at}`
//! - invoice: `{id, customer_id, title, amount, date, items: [{desc, price}], photo_url}`

use crate::model::customer::{validate_customer_name, Customer, CustomerId};
use crate::model::invoice::{
    Invoice, InvoiceFields, InvoiceId, LineItem, PriceInput, DEFAULT_INVOICE_TITLE,
};
use crate::model::photo::Photo;
use crate::model::validation::ValidationError;
use crate::store::{ensure_same_owner, Deletion, Entity, StoreAdapter, StoreError, StoreResult};
use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};
use uuid::Uuid;

const CUSTOMERS_PATH: &str = "/api/customers";
const INVOICES_PATH: &str = "/api/invoices";
const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// Transport-neutral request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Absolute path below the API base, e.g. `/api/invoices/4`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Raw response: status code plus body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Connectivity failure below the protocol level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for TransportError {}

/// Request/response channel to the remote service.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// HTTP transport backed by reqwest.
pub struct HttpTransport {
    base_url: String,
    auth_bearer: Option<String>,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a client bound to `base_url` with a per-request timeout.
    pub fn new(
        base_url: impl Into<String>,
        auth_bearer: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|err| TransportError(format!("invalid api url `{base_url}`: {err}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError(format!("http client setup failed: {err}")))?;
        Ok(Self {
            base_url,
            auth_bearer: auth_bearer.filter(|token| !token.trim().is_empty()),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let started_at = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let url = format!("{}{}", self.base_url, request.path);
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, url.as_str())
            .query(&request.query)
            .header(REQUEST_ID_HEADER, request_id.as_str());
        if let Some(token) = &self.auth_bearer {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| TransportError(format!("invalid auth header: {err}")))?;
            builder = builder.header(AUTHORIZATION, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|err| {
            TransportError(format!(
                "{} {} failed: {err}",
                request.method.as_str(),
                request.path
            ))
        })?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|err| TransportError(format!("read body failed: {err}")))?;

        debug!(
            "event=http_request module=store status=ok method={} path={} http_status={status} request_id={request_id} duration_ms={}",
            request.method.as_str(),
            request.path,
            started_at.elapsed().as_millis()
        );
        Ok(ApiResponse { status, body })
    }
}

/// Store adapter speaking the remote JSON protocol.
pub struct RemoteStore<T: Transport> {
    transport: T,
}

impl RemoteStore<HttpTransport> {
    /// Convenience constructor for the HTTP transport.
    pub fn http(
        base_url: impl Into<String>,
        auth_bearer: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        HttpTransport::new(base_url, auth_bearer, timeout).map(Self::new)
    }
}

impl<T: Transport> RemoteStore<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn exchange(
        &self,
        request: ApiRequest,
        target: Option<(Entity, i64)>,
    ) -> StoreResult<ApiResponse> {
        let method = request.method;
        let path = request.path.clone();
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        if response.is_success() {
            return Ok(response);
        }
        Err(classify_failure(method, &path, &response, target))
    }

    async fn fetch_invoice(&self, id: InvoiceId) -> StoreResult<Invoice> {
        let response = self
            .exchange(
                ApiRequest::new(Method::Get, invoice_path(id)),
                Some((Entity::Invoice, id)),
            )
            .await?;
        decode::<WireInvoice>(&response)?.into_invoice()
    }
}

#[async_trait]
impl<T: Transport> StoreAdapter for RemoteStore<T> {
    fn backend_tag(&self) -> &'static str {
        "remote"
    }

    async fn list_customers(&self) -> StoreResult<Vec<Customer>> {
        let response = self
            .exchange(ApiRequest::new(Method::Get, CUSTOMERS_PATH), None)
            .await?;
        Ok(decode::<Vec<WireCustomer>>(&response)?
            .into_iter()
            .map(WireCustomer::into_customer)
            .collect())
    }

    async fn create_customer(&self, name: &str) -> StoreResult<Customer> {
        let name = validate_customer_name(name)?;
        let body = serde_json::json!({ "name": name });
        let response = self
            .exchange(ApiRequest::new(Method::Post, CUSTOMERS_PATH).json(body), None)
            .await?;
        Ok(decode::<WireCustomer>(&response)?.into_customer())
    }

    async fn delete_customer(&self, id: CustomerId) -> StoreResult<Deletion> {
        let request = ApiRequest::new(Method::Delete, format!("{CUSTOMERS_PATH}/{id}"));
        idempotent_delete(self.exchange(request, Some((Entity::Customer, id))).await)
    }

    async fn list_invoices(&self, customer_id: CustomerId) -> StoreResult<Vec<Invoice>> {
        let request =
            ApiRequest::new(Method::Get, INVOICES_PATH).query("customer_id", customer_id);
        let response = self.exchange(request, None).await?;
        decode::<Vec<WireInvoice>>(&response)?
            .into_iter()
            // Servers that ignore the filter must not leak other customers' rows.
            .filter(|invoice| invoice.customer_id == customer_id)
            .map(WireInvoice::into_invoice)
            .collect()
    }

    async fn get_invoice(&self, id: InvoiceId) -> StoreResult<Invoice> {
        self.fetch_invoice(id).await
    }

    async fn create_invoice(&self, fields: &InvoiceFields) -> StoreResult<Invoice> {
        let customers = self.list_customers().await?;
        if !customers
            .iter()
            .any(|customer| customer.id == fields.customer_id)
        {
            return Err(ValidationError::UnknownCustomer(fields.customer_id).into());
        }

        let body = invoice_body(fields)?;
        let response = self
            .exchange(ApiRequest::new(Method::Post, INVOICES_PATH).json(body), None)
            .await?;
        decode::<WireInvoice>(&response)?.into_invoice()
    }

    async fn update_invoice(
        &self,
        id: InvoiceId,
        fields: &InvoiceFields,
    ) -> StoreResult<Invoice> {
        let stored = self.fetch_invoice(id).await?;
        ensure_same_owner(id, stored.customer_id, fields)?;

        let body = invoice_body(fields)?;
        let response = self
            .exchange(
                ApiRequest::new(Method::Put, invoice_path(id)).json(body),
                Some((Entity::Invoice, id)),
            )
            .await?;
        if response.body.is_empty() {
            return Ok(Invoice::from_fields(id, fields.clone()));
        }
        decode::<WireInvoice>(&response)?.into_invoice()
    }

    async fn delete_invoice(&self, id: InvoiceId) -> StoreResult<Deletion> {
        let request = ApiRequest::new(Method::Delete, invoice_path(id));
        idempotent_delete(self.exchange(request, Some((Entity::Invoice, id))).await)
    }
}

fn invoice_path(id: InvoiceId) -> String {
    format!("{INVOICES_PATH}/{id}")
}

fn idempotent_delete(result: StoreResult<ApiResponse>) -> StoreResult<Deletion> {
    match result {
        Ok(_) => Ok(Deletion::Removed),
        Err(StoreError::NotFound { .. }) => Ok(Deletion::AlreadyAbsent),
        Err(err) => Err(err),
    }
}

fn classify_failure(
    method: Method,
    path: &str,
    response: &ApiResponse,
    target: Option<(Entity, i64)>,
) -> StoreError {
    let detail = response_detail(response);
    match (response.status, target) {
        (404, Some((entity, id))) => StoreError::not_found(entity, id),
        (400 | 409 | 422, _) => StoreError::Validation(ValidationError::Rejected(detail)),
        (status, _) => StoreError::Unavailable(format!(
            "{} {path} returned status {status}: {detail}",
            method.as_str()
        )),
    }
}

/// Short, single-line excerpt of an error body.
fn response_detail(response: &ApiResponse) -> String {
    const MAX_DETAIL_CHARS: usize = 200;
    let text = String::from_utf8_lossy(&response.body);
    let single_line = text.replace(['\n', '\r'], " ");
    let trimmed = single_line.trim();
    if trimmed.is_empty() {
        return format!("status {}", response.status);
    }
    trimmed.chars().take(MAX_DETAIL_CHARS).collect()
}

fn decode<D: DeserializeOwned>(response: &ApiResponse) -> StoreResult<D> {
    serde_json::from_slice(&response.body)
        .map_err(|err| StoreError::InvalidData(format!("response decode failed: {err}")))
}

fn invoice_body(fields: &InvoiceFields) -> StoreResult<serde_json::Value> {
    let wire = WireInvoiceWrite {
        customer_id: fields.customer_id,
        title: fields.title.as_str(),
        amount: fields.amount,
        date: fields.date.as_str(),
        items: fields
            .items
            .iter()
            .map(|item| WireItemWrite {
                desc: item.description.as_str(),
                price: item.price,
            })
            .collect(),
        photo_url: fields.photo.as_ref().map(Photo::to_wire),
    };
    serde_json::to_value(wire)
        .map_err(|err| StoreError::InvalidData(format!("request encode failed: {err}")))
}

#[derive(Debug, Deserialize)]
struct WireCustomer {
    id: CustomerId,
    name: String,
    #[serde(default)]
    created_at: Option<serde_json::Value>,
}

impl WireCustomer {
    fn into_customer(self) -> Customer {
        Customer {
            id: self.id,
            name: self.name,
            created_at: self.created_at.as_ref().map_or(0, parse_timestamp_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireItem {
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    price: PriceInput,
}

#[derive(Debug, Deserialize)]
struct WireInvoice {
    id: InvoiceId,
    customer_id: CustomerId,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    amount: PriceInput,
    #[serde(default)]
    items: Option<Vec<WireItem>>,
    #[serde(default, alias = "photo")]
    photo_url: Option<String>,
}

impl WireInvoice {
    fn into_invoice(self) -> StoreResult<Invoice> {
        let id = self.id;
        let photo = Photo::from_wire_opt(self.photo_url.as_deref()).map_err(|err| {
            StoreError::InvalidData(format!("invalid photo for invoice {id}: {err}"))
        })?;
        let title = self
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_INVOICE_TITLE.to_string());
        let amount = match self.amount {
            PriceInput::Missing => None,
            other => Some(other.coerce()),
        };
        let items = self
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| {
                let description = item.desc.filter(|desc| !desc.trim().is_empty())?;
                Some(LineItem {
                    description,
                    price: item.price.coerce(),
                })
            })
            .collect();

        Ok(Invoice {
            id,
            customer_id: self.customer_id,
            title,
            date: self.date.unwrap_or_default(),
            amount,
            items,
            photo,
        })
    }
}

#[derive(Debug, Serialize)]
struct WireItemWrite<'a> {
    desc: &'a str,
    price: f64,
}

#[derive(Debug, Serialize)]
struct WireInvoiceWrite<'a> {
    customer_id: CustomerId,
    title: &'a str,
    amount: Option<f64>,
    date: &'a str,
    items: Vec<WireItemWrite<'a>>,
    photo_url: Option<String>,
}

/// Accepts epoch milliseconds, numeric strings, or RFC 3339 timestamps.
fn parse_timestamp_ms(value: &serde_json::Value) -> i64 {
    match value {
        serde_json::Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|ms| ms as i64))
            .unwrap_or(0),
        serde_json::Value::String(text) => text
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| {
                chrono::DateTime::parse_from_rfc3339(text.trim())
                    .ok()
                    .map(|at| at.timestamp_millis())
            })
            .unwrap_or(0),
        _ => 0,
    }
}
