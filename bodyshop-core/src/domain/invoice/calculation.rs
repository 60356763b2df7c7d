//! Invoice arithmetic. Everything here is pure.
//!
//! Products and sums saturate instead of panicking on overflow. Values that
//! large never pass validation, so a saturated total cannot be saved.

use rust_decimal::{Decimal, RoundingStrategy};

use super::types::{LaborDetail, Part, Totals};

/// Round to cents, halves away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `quantity * unit_price * (1 - discount / 100)`, rounded.
pub fn line_total(part: &Part) -> Decimal {
    let factor = Decimal::ONE.saturating_sub(part.discount / Decimal::ONE_HUNDRED);
    round_money(part.quantity.saturating_mul(part.unit_price).saturating_mul(factor))
}

pub fn labor_total(labor: &LaborDetail) -> Decimal {
    round_money(labor.hours.saturating_mul(labor.rate))
}

fn saturating_sum(values: impl Iterator<Item = Decimal>) -> Decimal {
    values.fold(Decimal::ZERO, Decimal::saturating_add)
}

/// Derive the totals of an invoice from its lines.
pub fn recalculate(parts: &[Part], labor: &[LaborDetail], tax_rate: Decimal) -> Totals {
    let parts_sum = saturating_sum(parts.iter().map(line_total));
    let labor_sum = saturating_sum(labor.iter().map(labor_total));

    let subtotal = round_money(parts_sum.saturating_add(labor_sum));
    let tax_amount = round_money(subtotal.saturating_mul(tax_rate));
    let total = round_money(subtotal.saturating_add(tax_amount));

    Totals {
        subtotal,
        tax_amount,
        total,
    }
}

pub fn within_tolerance(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
    a.saturating_sub(b).abs() <= tolerance
}
