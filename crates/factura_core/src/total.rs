//! Invoice total derivation.
//!
//! Totals are recomputed on every read and never stored on the record.
//! Prices are summed as integer ten-thousandths, so the result does not
//! depend on item order, then rounded to cents with halves away from zero.

use crate::model::invoice::Invoice;
use serde::Serialize;
use std::fmt::{Display, Formatter};

const UNITS_PER_CENT: i64 = 100;
const UNITS_PER_PRICE: f64 = 10_000.0;

/// Monetary total in cents. Displays with two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Total(i64);

impl Total {
    pub const ZERO: Total = Total(0);

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    fn from_units(units: i64) -> Self {
        let half = UNITS_PER_CENT / 2;
        let cents = if units >= 0 {
            units.saturating_add(half) / UNITS_PER_CENT
        } else {
            units.saturating_sub(half) / UNITS_PER_CENT
        };
        Self(cents)
    }
}

impl Display for Total {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

fn price_units(price: f64) -> i64 {
    if !price.is_finite() {
        return 0;
    }
    (price * UNITS_PER_PRICE).round() as i64
}

/// Sum of item prices when the invoice has items, else the flat amount,
/// else zero.
pub fn invoice_total(invoice: &Invoice) -> Total {
    if invoice.items.is_empty() {
        return invoice
            .amount
            .map_or(Total::ZERO, |amount| Total::from_units(price_units(amount)));
    }
    let units = invoice
        .items
        .iter()
        .fold(0_i64, |sum, item| sum.saturating_add(price_units(item.price)));
    Total::from_units(units)
}

/// Invoice annotated with its derived total for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceView {
    pub invoice: Invoice,
    pub total: Total,
}

impl From<Invoice> for InvoiceView {
    fn from(invoice: Invoice) -> Self {
        let total = invoice_total(&invoice);
        Self { invoice, total }
    }
}
