//! Core types for the invoice domain.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{InvoiceId, ReportId};

/// A replacement part line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Part {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Percentage between 0 and 100.
    pub discount: Decimal,
    pub reference: Option<String>,
}

impl Part {
    pub fn new(description: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            ..Self::default()
        }
    }

    pub fn with_discount(mut self, discount: Decimal) -> Self {
        self.discount = discount;
        self
    }

    /// Complete lines take part in recalculation. Blank rows the user is
    /// still filling in do not.
    pub fn is_complete(&self) -> bool {
        !self.description.trim().is_empty()
            && self.quantity > Decimal::ZERO
            && self.unit_price > Decimal::ZERO
    }
}

/// A labor line, billed by the hour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaborDetail {
    pub description: String,
    pub hours: Decimal,
    pub rate: Decimal,
}

impl LaborDetail {
    pub fn new(description: impl Into<String>, hours: Decimal, rate: Decimal) -> Self {
        Self {
            description: description.into(),
            hours,
            rate,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.description.trim().is_empty() && self.hours > Decimal::ZERO && self.rate > Decimal::ZERO
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

/// An invoice as edited by the user.
///
/// `totals` is what the user sees. Right after loading it holds the persisted
/// values, which may not match the lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub id: InvoiceId,
    pub number: String,
    pub client_name: String,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub vehicle_plate: Option<String>,
    #[serde(default)]
    pub report_id: Option<ReportId>,
    pub issue_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default)]
    pub labor_details: Vec<LaborDetail>,
    /// Fraction, e.g. 0.2 for 20%.
    pub tax_rate: Decimal,
    #[serde(default)]
    pub totals: Totals,
}

impl InvoiceDraft {
    pub fn new(id: InvoiceId, number: impl Into<String>, client_name: impl Into<String>, issue_date: NaiveDate) -> Self {
        Self {
            id,
            number: number.into(),
            client_name: client_name.into(),
            client_email: None,
            vehicle_plate: None,
            report_id: None,
            issue_date,
            notes: None,
            parts: Vec::new(),
            labor_details: Vec::new(),
            tax_rate: Decimal::ZERO,
            totals: Totals::default(),
        }
    }

    pub fn has_lines(&self) -> bool {
        !self.parts.is_empty() || !self.labor_details.is_empty()
    }

    pub fn all_lines_complete(&self) -> bool {
        self.parts.iter().all(Part::is_complete) && self.labor_details.iter().all(LaborDetail::is_complete)
    }
}

/// A part as read off the expertise report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPart {
    pub description: String,
    pub amount: Decimal,
}

/// Figures extracted from an insurer's expertise report.
///
/// Extraction is best effort, so everything but the id may be missing. The
/// report is never modified once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertiseReport {
    pub id: ReportId,
    #[serde(default)]
    pub parts: Vec<ReportPart>,
    #[serde(default)]
    pub labor_hours: Option<Decimal>,
    #[serde(default)]
    pub labor_rate: Option<Decimal>,
    /// Either a fraction or a percentage, depending on the report.
    #[serde(default)]
    pub tax_rate: Option<Decimal>,
    #[serde(default)]
    pub subtotal: Option<Decimal>,
    #[serde(default)]
    pub tax_amount: Option<Decimal>,
    #[serde(default)]
    pub total: Option<Decimal>,
}

impl ExpertiseReport {
    /// Tax rate as a fraction. Values above 1 are read as percentages.
    pub fn normalized_tax_rate(&self) -> Option<Decimal> {
        self.tax_rate.map(|rate| {
            if rate > Decimal::ONE {
                rate / Decimal::ONE_HUNDRED
            } else {
                rate
            }
        })
    }
}
