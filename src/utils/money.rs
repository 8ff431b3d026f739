//! 金额计算：所有金额均为美分 (i64)，纯函数，无副作用

use crate::entities::line_item_entity;

/// The priced part of a line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmount {
    pub quantity: i32,
    pub unit_price: i64,
    pub unit_tax: i64,
}

impl From<&line_item_entity::Model> for LineAmount {
    fn from(item: &line_item_entity::Model) -> Self {
        Self {
            quantity: item.quantity,
            unit_price: item.unit_price,
            unit_tax: item.unit_tax,
        }
    }
}

impl LineAmount {
    pub fn total(&self) -> i64 {
        line_total(self.quantity, self.unit_price, self.unit_tax)
    }
}

pub fn line_total(quantity: i32, unit_price: i64, unit_tax: i64) -> i64 {
    i64::from(quantity) * (unit_price + unit_tax)
}

pub fn subtotal(lines: &[LineAmount]) -> i64 {
    lines
        .iter()
        .map(|l| i64::from(l.quantity) * l.unit_price)
        .sum()
}

/// Sum of per-item tax.
pub fn itemized_tax(lines: &[LineAmount]) -> i64 {
    lines
        .iter()
        .map(|l| i64::from(l.quantity) * l.unit_tax)
        .sum()
}

/// Sum of line totals (price plus item tax), the base for percentage discounts.
pub fn items_total(lines: &[LineAmount]) -> i64 {
    lines.iter().map(LineAmount::total).sum()
}

/// Returns `(subtotal, total)`.
///
/// `tax` is the order's whole tax (itemized plus flat); waived tax and
/// shipping are left out of the total.
pub fn compute_totals(
    lines: &[LineAmount],
    discount_amount: i64,
    tax: i64,
    shipping: i64,
    waive_tax: bool,
    waive_shipping: bool,
) -> (i64, i64) {
    let subtotal = subtotal(lines);
    let mut total = (subtotal - discount_amount).max(0);
    if !waive_tax {
        total += tax;
    }
    if !waive_shipping {
        total += shipping;
    }
    (subtotal, total)
}

/// `percentage`% of `base`, rounded half-up to the cent.
pub fn percentage_of(base: i64, percentage: i32) -> i64 {
    let pct = i64::from(percentage.clamp(0, 100));
    (base.max(0) * pct + 50) / 100
}

/// Tax in cents for `amount` at `rate_bps` basis points, rounded half-up.
pub fn tax_for(amount: i64, rate_bps: i64) -> i64 {
    (amount.max(0) * rate_bps.max(0) + 5_000) / 10_000
}

/// Decimal string with two places, e.g. `1580` -> `"15.80"`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
