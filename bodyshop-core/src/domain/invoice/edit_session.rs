use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument};

use super::{
    discrepancy::{find_discrepancies, Discrepancy},
    guard::{Edit, GuardState, RecalculationGuard},
    ids::InvoiceId,
    traits::{InvoiceError, InvoiceRepository, LineKind, Result},
    types::{ExpertiseReport, InvoiceDraft, LaborDetail, Part, Totals},
    validation::validate,
};
use crate::domain::retry::{retry_with_timeout, RetryPolicy};

const SOURCE_LABOR_DESCRIPTION: &str = "Labor (from report)";

/// Header fields of an invoice. Editing them never touches totals.
#[derive(Debug, Clone, PartialEq)]
pub enum InvoiceField {
    Number(String),
    ClientName(String),
    ClientEmail(Option<String>),
    VehiclePlate(Option<String>),
    IssueDate(NaiveDate),
    Notes(Option<String>),
}

/// One user editing one invoice.
///
/// Every mutation goes through here so the [`RecalculationGuard`] sees it.
/// Mutations return the totals to display.
#[derive(Debug, Clone)]
pub struct InvoiceEditSession {
    draft: InvoiceDraft,
    guard: RecalculationGuard,
    source: Option<ExpertiseReport>,
    tolerance: Decimal,
}

impl InvoiceEditSession {
    /// Start editing an invoice that has never been saved.
    pub fn new(mut draft: InvoiceDraft, tolerance: Decimal) -> Self {
        let guard = RecalculationGuard::unsaved(&draft, tolerance);
        draft.totals = guard.displayed();
        Self {
            draft,
            guard,
            source: None,
            tolerance,
        }
    }

    /// Start editing a persisted invoice. Its stored totals are kept as-is
    /// until a line is genuinely edited.
    pub fn load(draft: InvoiceDraft, tolerance: Decimal) -> Self {
        let guard = RecalculationGuard::loaded(draft.totals, tolerance);
        Self {
            draft,
            guard,
            source: None,
            tolerance,
        }
    }

    pub fn with_source_report(mut self, report: ExpertiseReport) -> Self {
        self.source = Some(report);
        self
    }

    /// Load an invoice and, when it has one, its source report.
    #[instrument(skip(repo, retry, tolerance), fields(invoice_id = %id))]
    pub async fn open<R>(repo: &R, id: &InvoiceId, retry: &RetryPolicy, tolerance: Decimal) -> Result<Self>
    where
        R: InvoiceRepository + ?Sized,
    {
        let draft = retry_with_timeout(retry, "load_invoice", move || repo.get(id)).await?;

        let source = match &draft.report_id {
            Some(report_id) => {
                retry_with_timeout(retry, "load_report", move || repo.get_report(report_id)).await?
            }
            None => None,
        };

        debug!(has_source = source.is_some(), "invoice opened");
        Ok(Self {
            source,
            ..Self::load(draft, tolerance)
        })
    }

    pub fn draft(&self) -> &InvoiceDraft {
        &self.draft
    }

    pub fn guard_state(&self) -> GuardState {
        self.guard.state()
    }

    pub fn totals(&self) -> Totals {
        self.draft.totals
    }

    pub fn source_report(&self) -> Option<&ExpertiseReport> {
        self.source.as_ref()
    }

    pub fn update_field(&mut self, field: InvoiceField) -> Totals {
        match field {
            InvoiceField::Number(v) => self.draft.number = v,
            InvoiceField::ClientName(v) => self.draft.client_name = v,
            InvoiceField::ClientEmail(v) => self.draft.client_email = v,
            InvoiceField::VehiclePlate(v) => self.draft.vehicle_plate = v,
            InvoiceField::IssueDate(v) => self.draft.issue_date = v,
            InvoiceField::Notes(v) => self.draft.notes = v,
        }
        self.record(Edit::Metadata)
    }

    pub fn update_part(&mut self, index: usize, edit: impl FnOnce(&mut Part)) -> Result<Totals> {
        let part = self
            .draft
            .parts
            .get_mut(index)
            .ok_or(InvoiceError::LineNotFound {
                kind: LineKind::Part,
                index,
            })?;
        edit(part);
        let complete = part.is_complete();
        Ok(self.record(Edit::Line { complete }))
    }

    pub fn add_part(&mut self, part: Part) -> Totals {
        let complete = part.is_complete();
        self.draft.parts.push(part);
        self.record(Edit::Line { complete })
    }

    pub fn remove_part(&mut self, index: usize) -> Result<Totals> {
        if index >= self.draft.parts.len() {
            return Err(InvoiceError::LineNotFound {
                kind: LineKind::Part,
                index,
            });
        }
        let removed = self.draft.parts.remove(index);
        Ok(self.record(Edit::Line {
            complete: removed.is_complete(),
        }))
    }

    pub fn update_labor_detail(&mut self, index: usize, edit: impl FnOnce(&mut LaborDetail)) -> Result<Totals> {
        let labor = self
            .draft
            .labor_details
            .get_mut(index)
            .ok_or(InvoiceError::LineNotFound {
                kind: LineKind::Labor,
                index,
            })?;
        edit(labor);
        let complete = labor.is_complete();
        Ok(self.record(Edit::Line { complete }))
    }

    pub fn add_labor_detail(&mut self, labor: LaborDetail) -> Totals {
        let complete = labor.is_complete();
        self.draft.labor_details.push(labor);
        self.record(Edit::Line { complete })
    }

    pub fn remove_labor_detail(&mut self, index: usize) -> Result<Totals> {
        if index >= self.draft.labor_details.len() {
            return Err(InvoiceError::LineNotFound {
                kind: LineKind::Labor,
                index,
            });
        }
        let removed = self.draft.labor_details.remove(index);
        Ok(self.record(Edit::Line {
            complete: removed.is_complete(),
        }))
    }

    /// `rate` is a fraction. Out-of-range values are accepted here and
    /// rejected on save.
    pub fn set_tax_rate(&mut self, rate: Decimal) -> Totals {
        self.draft.tax_rate = rate;
        self.record(Edit::TaxRate)
    }

    /// Differences between the source report and the invoice as displayed.
    /// Empty when there is no source report.
    pub fn discrepancies(&self) -> Vec<Discrepancy> {
        self.source
            .as_ref()
            .map(|report| find_discrepancies(report, &self.draft, self.tolerance))
            .unwrap_or_default()
    }

    /// Copy the report's figures into the draft and recalculate.
    ///
    /// Report parts become one line each at quantity one. Report labor becomes
    /// a single line. Figures missing from the report leave the draft alone.
    pub fn apply_source_values(&mut self) -> Totals {
        let Some(report) = &self.source else {
            return self.draft.totals;
        };

        if !report.parts.is_empty() {
            self.draft.parts = report
                .parts
                .iter()
                .map(|p| Part::new(p.description.clone(), Decimal::ONE, p.amount))
                .collect();
        }
        if let (Some(hours), Some(rate)) = (report.labor_hours, report.labor_rate) {
            self.draft.labor_details = vec![LaborDetail::new(SOURCE_LABOR_DESCRIPTION, hours, rate)];
        }
        if let Some(rate) = report.normalized_tax_rate() {
            self.draft.tax_rate = rate;
        }

        info!(report_id = %report.id, "applied report values to invoice");
        self.draft.totals = self.guard.recalculate(&self.draft);
        self.draft.totals
    }

    /// Accept that the next save overwrites the stored totals.
    pub fn acknowledge_totals_discrepancy(&mut self) -> Totals {
        self.draft.totals = self.guard.acknowledge(&self.draft);
        self.draft.totals
    }

    /// The draft exactly as it would be written.
    pub fn prepare_save(&self) -> Result<InvoiceDraft> {
        let errors = validate(&self.draft);
        if !errors.is_empty() {
            return Err(InvoiceError::Validation(errors));
        }

        let totals = self.guard.totals_to_save(&self.draft)?;
        Ok(InvoiceDraft {
            totals,
            ..self.draft.clone()
        })
    }

    #[instrument(skip_all, fields(invoice_id = %self.draft.id))]
    pub async fn save<R>(&mut self, repo: &R) -> Result<Totals>
    where
        R: InvoiceRepository + ?Sized,
    {
        let draft = self.prepare_save()?;
        repo.save(&draft).await?;

        self.guard.mark_saved(draft.totals);
        self.draft.totals = draft.totals;
        info!(total = %draft.totals.total, "invoice saved");
        Ok(draft.totals)
    }

    fn record(&mut self, edit: Edit) -> Totals {
        self.draft.totals = self.guard.record(edit, &self.draft);
        self.draft.totals
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::invoice::{
        discrepancy::DiscrepancyField,
        ids::ReportId,
        repository::InMemoryInvoiceRepository,
        types::ReportPart,
    };

    const TOLERANCE: Decimal = dec!(0.01);

    fn persisted() -> InvoiceDraft {
        let mut draft = InvoiceDraft::new(
            InvoiceId::new("inv-1"),
            "F-001",
            "Garage Martin",
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        );
        draft.report_id = Some(ReportId::new("rep-1"));
        draft.tax_rate = dec!(0.2);
        draft.parts.push(Part::new("Bumper", dec!(2), dec!(100)).with_discount(dec!(10)));
        draft.labor_details.push(LaborDetail::new("Paint", dec!(2), dec!(70)));
        // Does not match the lines, which compute to 384.
        draft.totals = Totals {
            subtotal: dec!(320),
            tax_amount: dec!(64),
            total: dec!(400),
        };
        draft
    }

    fn report() -> ExpertiseReport {
        ExpertiseReport {
            id: ReportId::new("rep-1"),
            parts: vec![
                ReportPart {
                    description: "Bumper".to_string(),
                    amount: dec!(180),
                },
                ReportPart {
                    description: "Grille".to_string(),
                    amount: dec!(45.50),
                },
            ],
            labor_hours: Some(dec!(3)),
            labor_rate: Some(dec!(70)),
            tax_rate: Some(dec!(20)),
            subtotal: None,
            tax_amount: None,
            total: Some(dec!(508.20)),
        }
    }

    fn retry() -> RetryPolicy {
        RetryPolicy::fixed(2, Duration::from_millis(10), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn save_without_edit_keeps_persisted_totals() {
        let repo = InMemoryInvoiceRepository::new();
        repo.insert_invoice(persisted()).await;
        let mut session = InvoiceEditSession::open(&repo, &InvoiceId::new("inv-1"), &retry(), TOLERANCE)
            .await
            .unwrap();

        assert_eq!(session.totals().total, dec!(400));
        session.update_field(InvoiceField::Notes(Some("Paid in cash".to_string())));
        session.save(&repo).await.unwrap();

        let stored = repo.get(&InvoiceId::new("inv-1")).await.unwrap();
        assert_eq!(stored.totals.total, dec!(400));
        assert_eq!(stored.notes.as_deref(), Some("Paid in cash"));
    }

    #[test]
    fn blank_row_does_not_unlock_recalculation() {
        let mut session = InvoiceEditSession::load(persisted(), TOLERANCE);

        let totals = session.add_part(Part::default());

        assert_eq!(totals.total, dec!(400));
        assert!(matches!(session.guard_state(), GuardState::Loaded { .. }));
    }

    #[test]
    fn filling_in_a_row_recalculates() {
        let mut session = InvoiceEditSession::load(persisted(), TOLERANCE);
        session.add_part(Part::default());

        session
            .update_part(1, |p| p.description = "Clip".to_string())
            .unwrap();
        session.update_part(1, |p| p.quantity = dec!(4)).unwrap();
        assert_eq!(session.totals().total, dec!(400));

        let totals = session.update_part(1, |p| p.unit_price = dec!(2.5)).unwrap();

        // 180 + 10 + 140 = 330, plus 20% tax.
        assert_eq!(totals.subtotal, dec!(330));
        assert_eq!(totals.total, dec!(396));
        assert!(matches!(session.guard_state(), GuardState::Recalculated { .. }));
    }

    #[test]
    fn unknown_line_index_is_an_error() {
        let mut session = InvoiceEditSession::load(persisted(), TOLERANCE);

        assert_eq!(
            session.remove_labor_detail(3),
            Err(InvoiceError::LineNotFound {
                kind: LineKind::Labor,
                index: 3,
            })
        );
        assert!(session.update_part(9, |_| {}).is_err());
    }

    fn recalculated(subtotal: Decimal, tax_amount: Decimal, total: Decimal) -> GuardState {
        GuardState::Recalculated {
            totals: Totals {
                subtotal,
                tax_amount,
                total,
            },
        }
    }

    #[test]
    fn removing_a_part_recalculates() {
        let mut session = InvoiceEditSession::load(persisted(), TOLERANCE);

        let totals = session.remove_part(0).unwrap();

        // Only the 140 of labor is left.
        assert_eq!(totals.total, dec!(168));
        assert_eq!(session.guard_state(), recalculated(dec!(140), dec!(28), dec!(168)));
    }

    #[test]
    fn removing_a_labor_line_recalculates() {
        let mut session = InvoiceEditSession::load(persisted(), TOLERANCE);

        let totals = session.remove_labor_detail(0).unwrap();

        assert_eq!(totals.total, dec!(216));
        assert_eq!(session.guard_state(), recalculated(dec!(180), dec!(36), dec!(216)));
    }

    #[test]
    fn editing_a_labor_line_recalculates() {
        let mut session = InvoiceEditSession::load(persisted(), TOLERANCE);

        let totals = session.update_labor_detail(0, |l| l.hours = dec!(3)).unwrap();

        // 180 + 3 * 70 = 390, plus 20% tax.
        assert_eq!(totals.total, dec!(468));
        assert_eq!(session.guard_state(), recalculated(dec!(390), dec!(78), dec!(468)));
    }

    #[test]
    fn removing_blank_rows_keeps_saved_totals() {
        let mut draft = persisted();
        draft.parts.push(Part::default());
        draft.labor_details.push(LaborDetail::default());
        let mut session = InvoiceEditSession::load(draft, TOLERANCE);

        session.remove_part(1).unwrap();
        let totals = session.remove_labor_detail(1).unwrap();

        assert_eq!(totals.total, dec!(400));
        assert!(matches!(session.guard_state(), GuardState::Loaded { .. }));
    }

    #[tokio::test]
    async fn changed_total_is_blocked_until_acknowledged() {
        let repo = InMemoryInvoiceRepository::new();
        let mut session = InvoiceEditSession::load(persisted(), TOLERANCE);
        session.set_tax_rate(dec!(0.1));

        let err = session.save(&repo).await.unwrap_err();
        assert_eq!(
            err,
            InvoiceError::TotalsDiscrepancy {
                computed: dec!(352),
                persisted: dec!(400),
            }
        );
        assert_eq!(repo.save_count(), 0);

        session.acknowledge_totals_discrepancy();
        let saved = session.save(&repo).await.unwrap();

        assert_eq!(saved.total, dec!(352));
        assert_eq!(repo.save_count(), 1);
    }

    #[tokio::test]
    async fn invalid_draft_is_not_saved() {
        let repo = InMemoryInvoiceRepository::new();
        let mut session = InvoiceEditSession::load(persisted(), TOLERANCE);
        session.update_field(InvoiceField::ClientName(String::new()));

        match session.save(&repo).await {
            Err(InvoiceError::Validation(errors)) => assert_eq!(errors[0].field, "client_name"),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(repo.save_count(), 0);
    }

    #[test]
    fn new_invoice_shows_computed_totals() {
        let mut draft = persisted();
        draft.totals = Totals::default();

        let session = InvoiceEditSession::new(draft, TOLERANCE);

        assert_eq!(session.totals().total, dec!(384));
    }

    #[test]
    fn applying_report_values_resolves_discrepancies() {
        let mut session = InvoiceEditSession::load(persisted(), TOLERANCE).with_source_report(report());

        let before: Vec<_> = session.discrepancies().into_iter().map(|d| d.field).collect();
        assert_eq!(
            before,
            vec![
                DiscrepancyField::PartsCount,
                DiscrepancyField::LaborHours,
                DiscrepancyField::Total,
            ]
        );

        let totals = session.apply_source_values();

        // 180 + 45.50 + 3 * 70 = 435.50, plus 20% tax.
        assert_eq!(totals.total, dec!(522.60));
        assert_eq!(session.draft().parts.len(), 2);
        assert!(matches!(session.guard_state(), GuardState::Recalculated { .. }));

        let after: Vec<_> = session.discrepancies().into_iter().map(|d| d.field).collect();
        assert_eq!(after, vec![DiscrepancyField::Total]);
    }

    #[tokio::test(start_paused = true)]
    async fn open_retries_transient_failures() {
        let repo = InMemoryInvoiceRepository::new();
        repo.insert_invoice(persisted()).await;
        repo.insert_report(report()).await;
        repo.fail_next_gets(1);

        let session = InvoiceEditSession::open(&repo, &InvoiceId::new("inv-1"), &retry(), TOLERANCE)
            .await
            .unwrap();

        assert!(session.source_report().is_some());
    }

    #[tokio::test]
    async fn open_missing_invoice_fails_fast() {
        let repo = InMemoryInvoiceRepository::new();

        let result = InvoiceEditSession::open(&repo, &InvoiceId::new("nope"), &retry(), TOLERANCE).await;

        assert!(matches!(result, Err(InvoiceError::NotFound(_))));
    }
}
