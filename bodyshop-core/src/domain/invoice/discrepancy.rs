//! Comparison of report figures against the invoice built from them.
//!
//! Differences are advisory. They are returned as values for the user to
//! review and never block an operation.

use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

use super::{
    calculation::{line_total, round_money, within_tolerance},
    types::{ExpertiseReport, InvoiceDraft},
};

/// Precision tax rates are compared at.
const TAX_RATE_DP: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "field", content = "index")]
pub enum DiscrepancyField {
    PartsCount,
    /// Zero-based index into the parts.
    PartAmount(usize),
    LaborHours,
    /// Hour-weighted average over the labor lines.
    LaborRate,
    TaxRate,
    Subtotal,
    TaxAmount,
    Total,
}

impl fmt::Display for DiscrepancyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PartsCount => write!(f, "parts count"),
            Self::PartAmount(i) => write!(f, "part {} amount", i + 1),
            Self::LaborHours => write!(f, "labor hours"),
            Self::LaborRate => write!(f, "labor rate"),
            Self::TaxRate => write!(f, "tax rate"),
            Self::Subtotal => write!(f, "subtotal"),
            Self::TaxAmount => write!(f, "tax amount"),
            Self::Total => write!(f, "total"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Discrepancy {
    pub field: DiscrepancyField,
    /// Value read off the report.
    pub source: Decimal,
    /// Value on the invoice.
    pub draft: Decimal,
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: report {}, invoice {}", self.field, self.source, self.draft)
    }
}

/// Every figure the report states that the invoice disagrees with by more
/// than `tolerance`. Figures missing from the report are skipped.
///
/// Part amounts are only compared line by line when both sides have the same
/// number of parts; otherwise only the count is reported.
pub fn find_discrepancies(report: &ExpertiseReport, draft: &InvoiceDraft, tolerance: Decimal) -> Vec<Discrepancy> {
    let mut found = Vec::new();
    let mut check = |field, source: Option<Decimal>, draft: Decimal, tolerance| {
        if let Some(source) = source {
            if !within_tolerance(source, draft, tolerance) {
                found.push(Discrepancy { field, source, draft });
            }
        }
    };

    if !report.parts.is_empty() {
        if report.parts.len() != draft.parts.len() {
            check(
                DiscrepancyField::PartsCount,
                Some(Decimal::from(report.parts.len())),
                Decimal::from(draft.parts.len()),
                Decimal::ZERO,
            );
        } else {
            for (i, (source, part)) in report.parts.iter().zip(&draft.parts).enumerate() {
                check(DiscrepancyField::PartAmount(i), Some(source.amount), line_total(part), tolerance);
            }
        }
    }

    let hours: Decimal = draft.labor_details.iter().map(|l| l.hours).sum();
    check(DiscrepancyField::LaborHours, report.labor_hours, hours, tolerance);

    if !hours.is_zero() {
        let weighted: Decimal = draft.labor_details.iter().map(|l| l.hours * l.rate).sum();
        check(DiscrepancyField::LaborRate, report.labor_rate, round_money(weighted / hours), tolerance);
    }

    check(
        DiscrepancyField::TaxRate,
        report.normalized_tax_rate().map(|r| r.round_dp(TAX_RATE_DP)),
        draft.tax_rate.round_dp(TAX_RATE_DP),
        Decimal::ZERO,
    );
    check(DiscrepancyField::Subtotal, report.subtotal, draft.totals.subtotal, tolerance);
    check(DiscrepancyField::TaxAmount, report.tax_amount, draft.totals.tax_amount, tolerance);
    check(DiscrepancyField::Total, report.total, draft.totals.total, tolerance);

    found
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::invoice::{
        calculation::recalculate,
        ids::{InvoiceId, ReportId},
        types::{LaborDetail, Part, ReportPart},
    };

    fn draft() -> InvoiceDraft {
        let mut draft = InvoiceDraft::new(
            InvoiceId::new("inv-1"),
            "F-001",
            "Garage Martin",
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        );
        draft.tax_rate = dec!(0.2);
        draft.parts.push(Part::new("Bumper", dec!(2), dec!(100)).with_discount(dec!(10)));
        draft.labor_details.push(LaborDetail::new("Paint", dec!(2), dec!(70)));
        draft.totals = recalculate(&draft.parts, &draft.labor_details, draft.tax_rate);
        draft
    }

    fn report() -> ExpertiseReport {
        ExpertiseReport {
            id: ReportId::new("rep-1"),
            parts: vec![ReportPart {
                description: "Bumper".to_string(),
                amount: dec!(180),
            }],
            labor_hours: Some(dec!(2)),
            labor_rate: Some(dec!(70)),
            tax_rate: Some(dec!(20)),
            subtotal: Some(dec!(320)),
            tax_amount: Some(dec!(64)),
            total: Some(dec!(384)),
        }
    }

    #[test]
    fn matching_invoice_has_no_discrepancies() {
        assert!(find_discrepancies(&report(), &draft(), dec!(0.01)).is_empty());
    }

    #[test]
    fn total_mismatch_is_reported() {
        let mut draft = draft();
        draft.totals.total = dec!(400);

        let found = find_discrepancies(&report(), &draft, dec!(0.01));

        assert_eq!(
            found,
            vec![Discrepancy {
                field: DiscrepancyField::Total,
                source: dec!(384),
                draft: dec!(400),
            }]
        );
        assert_eq!(found[0].to_string(), "total: report 384, invoice 400");
    }

    #[test]
    fn differences_within_tolerance_are_ignored() {
        let mut draft = draft();
        draft.totals.total = dec!(384.01);

        assert!(find_discrepancies(&report(), &draft, dec!(0.01)).is_empty());
    }

    #[test]
    fn part_count_mismatch_skips_line_comparison() {
        let mut draft = draft();
        draft.parts.push(Part::new("Clip", dec!(1), dec!(5)));

        let fields: Vec<_> = find_discrepancies(&report(), &draft, dec!(0.01))
            .into_iter()
            .map(|d| d.field)
            .collect();

        assert_eq!(fields, vec![DiscrepancyField::PartsCount]);
    }

    #[test]
    fn line_and_labor_differences_are_named() {
        let mut draft = draft();
        draft.parts[0].discount = dec!(0);
        draft.labor_details.push(LaborDetail::new("Prep", dec!(1), dec!(40)));

        let names: Vec<String> = find_discrepancies(&report(), &draft, dec!(0.01))
            .iter()
            .map(|d| d.field.to_string())
            .collect();

        assert_eq!(names, vec!["part 1 amount", "labor hours", "labor rate"]);
    }

    #[test]
    fn missing_report_figures_are_skipped() {
        let report = ExpertiseReport {
            id: ReportId::new("rep-2"),
            parts: vec![],
            labor_hours: None,
            labor_rate: None,
            tax_rate: None,
            subtotal: None,
            tax_amount: None,
            total: None,
        };

        assert!(find_discrepancies(&report, &draft(), dec!(0.01)).is_empty());
    }
}
