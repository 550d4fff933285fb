//! Invoice domain model and write-request normalization.
//!
//! # Responsibility
//! - Define the canonical invoice record and its line items.
//! - Turn raw form input (`InvoiceDraft`) into persistable `InvoiceFields`.
//!
//! # Invariants
//! - `customer_id` is fixed at creation; invoices are never reparented.
//! - Item order is display order.
//! - Stored prices are finite numbers; unparseable input becomes `0.0`.

use crate::model::customer::CustomerId;
use crate::model::photo::Photo;
use crate::model::validation::ValidationError;
use serde::{Deserialize, Serialize};

/// Store-assigned invoice identifier.
pub type InvoiceId = i64;

/// Title used when the caller supplies none.
pub const DEFAULT_INVOICE_TITLE: &str = "Untitled";

/// One `{description, price}` pair contributing to an invoice total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub price: f64,
}

impl LineItem {
    pub fn new(description: impl Into<String>, price: f64) -> Self {
        Self {
            description: description.into(),
            price,
        }
    }
}

/// Canonical invoice record as returned by every store backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub customer_id: CustomerId,
    pub title: String,
    /// Opaque date value, used for display ordering only.
    pub date: String,
    /// Flat fallback amount, only meaningful when `items` is empty.
    pub amount: Option<f64>,
    pub items: Vec<LineItem>,
    pub photo: Option<Photo>,
}

impl Invoice {
    /// Builds the stored record from normalized fields and an assigned id.
    pub fn from_fields(id: InvoiceId, fields: InvoiceFields) -> Self {
        Self {
            id,
            customer_id: fields.customer_id,
            title: fields.title,
            date: fields.date,
            amount: fields.amount,
            items: fields.items,
            photo: fields.photo,
        }
    }

    /// Returns the write fields that would reproduce this record.
    pub fn fields(&self) -> InvoiceFields {
        InvoiceFields {
            customer_id: self.customer_id,
            title: self.title.clone(),
            date: self.date.clone(),
            amount: self.amount,
            items: self.items.clone(),
            photo: self.photo.clone(),
        }
    }
}

/// Raw price as typed by a user or received from a loosely typed backend.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriceInput {
    Number(f64),
    Text(String),
    #[default]
    Missing,
}

impl PriceInput {
    /// Coerces the input to a finite number, defaulting to zero.
    ///
    /// Text uses parse-float prefix semantics: `"12.5 DZD"` becomes `12.5`,
    /// `"abc"` becomes `0.0`.
    pub fn coerce(&self) -> f64 {
        let value = match self {
            Self::Number(value) => *value,
            Self::Text(text) => parse_float_prefix(text).unwrap_or(0.0),
            Self::Missing => 0.0,
        };
        if value.is_finite() {
            value
        } else {
            0.0
        }
    }
}

impl From<f64> for PriceInput {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for PriceInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Line item exactly as entered, before normalization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LineItemInput {
    pub description: String,
    #[serde(default)]
    pub price: PriceInput,
}

impl LineItemInput {
    pub fn new(description: impl Into<String>, price: impl Into<PriceInput>) -> Self {
        Self {
            description: description.into(),
            price: price.into(),
        }
    }
}

/// Invoice write request (create or full replacement).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InvoiceDraft {
    pub customer_id: Option<CustomerId>,
    pub title: Option<String>,
    pub date: String,
    pub amount: Option<f64>,
    pub items: Vec<LineItemInput>,
    pub photo: Option<Photo>,
}

impl InvoiceDraft {
    /// Starts a draft owned by `customer_id`.
    pub fn for_customer(customer_id: CustomerId) -> Self {
        Self {
            customer_id: Some(customer_id),
            ..Self::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    pub fn amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn item(mut self, description: impl Into<String>, price: impl Into<PriceInput>) -> Self {
        self.items.push(LineItemInput::new(description, price));
        self
    }

    pub fn photo(mut self, photo: Photo) -> Self {
        self.photo = Some(photo);
        self
    }

    /// Validates and normalizes this draft.
    ///
    /// # Errors
    /// - `MissingCustomerReference` when `customer_id` is absent.
    pub fn normalize(&self) -> Result<InvoiceFields, ValidationError> {
        let customer_id = self
            .customer_id
            .ok_or(ValidationError::MissingCustomerReference)?;

        let title = self
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(DEFAULT_INVOICE_TITLE)
            .to_string();

        let items = self
            .items
            .iter()
            .filter(|item| !item.description.trim().is_empty())
            .map(|item| LineItem {
                description: item.description.trim().to_string(),
                price: item.price.coerce(),
            })
            .collect();

        Ok(InvoiceFields {
            customer_id,
            title,
            date: self.date.trim().to_string(),
            amount: self.amount.filter(|amount| amount.is_finite()),
            items,
            photo: self.photo.clone(),
        })
    }
}

/// Normalized invoice content ready for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceFields {
    pub customer_id: CustomerId,
    pub title: String,
    pub date: String,
    pub amount: Option<f64>,
    pub items: Vec<LineItem>,
    pub photo: Option<Photo>,
}

/// Parses the longest leading decimal number in `text`, ignoring leading
/// whitespace.
fn parse_float_prefix(text: &str) -> Option<f64> {
    let trimmed = text.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    if !seen_digit {
        return None;
    }

    // Optional exponent, only taken when followed by at least one digit.
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+') | Some(b'-')) {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }

    trimmed[..end].parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::{
        parse_float_prefix, Invoice, InvoiceDraft, LineItem, PriceInput, DEFAULT_INVOICE_TITLE,
    };
    use crate::model::photo::Photo;
    use crate::model::validation::ValidationError;

    #[test]
    fn normalize_requires_customer_reference() {
        let draft = InvoiceDraft::default().title("Service");
        assert_eq!(
            draft.normalize().unwrap_err(),
            ValidationError::MissingCustomerReference
        );
    }

    #[test]
    fn normalize_drops_items_without_description_and_keeps_order() {
        let fields = InvoiceDraft::for_customer(7)
            .item("Labor", 100.5)
            .item("   ", 999.0)
            .item("Parts", "49.5")
            .normalize()
            .unwrap();

        assert_eq!(
            fields.items,
            vec![LineItem::new("Labor", 100.5), LineItem::new("Parts", 49.5)]
        );
    }

    #[test]
    fn normalize_defaults_blank_title() {
        let fields = InvoiceDraft::for_customer(1).title("  ").normalize().unwrap();
        assert_eq!(fields.title, DEFAULT_INVOICE_TITLE);

        let fields = InvoiceDraft::for_customer(1).normalize().unwrap();
        assert_eq!(fields.title, DEFAULT_INVOICE_TITLE);
    }

    #[test]
    fn normalize_discards_non_finite_amount() {
        let fields = InvoiceDraft::for_customer(1)
            .amount(f64::NAN)
            .normalize()
            .unwrap();
        assert_eq!(fields.amount, None);
    }

    #[test]
    fn stored_record_reproduces_its_write_fields() {
        let fields = InvoiceDraft::for_customer(3)
            .title("Service")
            .item("Labor", 10.0)
            .photo(Photo::Url("https://cdn.example.com/a.png".to_string()))
            .normalize()
            .unwrap();

        let invoice = Invoice::from_fields(11, fields.clone());
        assert_eq!(invoice.fields(), fields);
        assert_eq!(Invoice::from_fields(invoice.id, invoice.fields()), invoice);
    }

    #[test]
    fn price_coercion_defaults_to_zero() {
        assert_eq!(PriceInput::Missing.coerce(), 0.0);
        assert_eq!(PriceInput::from("abc").coerce(), 0.0);
        assert_eq!(PriceInput::from("").coerce(), 0.0);
        assert_eq!(PriceInput::Number(f64::INFINITY).coerce(), 0.0);
        assert_eq!(PriceInput::from(" 12.5 DZD").coerce(), 12.5);
        assert_eq!(PriceInput::from("-3").coerce(), -3.0);
    }

    #[test]
    fn float_prefix_handles_exponents_and_trailing_garbage() {
        assert_eq!(parse_float_prefix("1e3x"), Some(1000.0));
        assert_eq!(parse_float_prefix("2e"), Some(2.0));
        assert_eq!(parse_float_prefix(".5"), Some(0.5));
        assert_eq!(parse_float_prefix("1.2.3"), Some(1.2));
        assert_eq!(parse_float_prefix("-"), None);
        assert_eq!(parse_float_prefix("."), None);
    }
}
