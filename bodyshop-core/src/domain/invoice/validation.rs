use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

use super::types::InvoiceDraft;

/// Upper bound for quantities, prices, hours and rates.
pub const MAX_LINE_VALUE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// A problem with one field, addressed by path (`parts[0].quantity`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn check_amount(errors: &mut Vec<FieldError>, field: String, value: Decimal) {
    if value <= Decimal::ZERO {
        errors.push(FieldError::new(field, "must be positive"));
    } else if value > MAX_LINE_VALUE {
        errors.push(FieldError::new(field, format!("must not exceed {MAX_LINE_VALUE}")));
    }
}

/// Everything that blocks saving `draft`. Empty when it can be saved.
pub fn validate(draft: &InvoiceDraft) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if draft.number.trim().is_empty() {
        errors.push(FieldError::new("number", "is required"));
    }
    if draft.client_name.trim().is_empty() {
        errors.push(FieldError::new("client_name", "is required"));
    }
    if let Some(email) = &draft.client_email {
        if !email.trim().is_empty() && !email.contains('@') {
            errors.push(FieldError::new("client_email", "is not a valid email address"));
        }
    }
    if draft.tax_rate < Decimal::ZERO || draft.tax_rate > Decimal::ONE {
        errors.push(FieldError::new("tax_rate", "must be between 0 and 1"));
    }
    if !draft.has_lines() {
        errors.push(FieldError::new("lines", "at least one part or labor line is required"));
    }

    for (i, part) in draft.parts.iter().enumerate() {
        if part.description.trim().is_empty() {
            errors.push(FieldError::new(format!("parts[{i}].description"), "is required"));
        }
        check_amount(&mut errors, format!("parts[{i}].quantity"), part.quantity);
        check_amount(&mut errors, format!("parts[{i}].unit_price"), part.unit_price);
        if part.discount < Decimal::ZERO || part.discount > Decimal::ONE_HUNDRED {
            errors.push(FieldError::new(format!("parts[{i}].discount"), "must be between 0 and 100"));
        }
    }

    for (i, labor) in draft.labor_details.iter().enumerate() {
        if labor.description.trim().is_empty() {
            errors.push(FieldError::new(format!("labor_details[{i}].description"), "is required"));
        }
        check_amount(&mut errors, format!("labor_details[{i}].hours"), labor.hours);
        check_amount(&mut errors, format!("labor_details[{i}].rate"), labor.rate);
    }

    errors
}
