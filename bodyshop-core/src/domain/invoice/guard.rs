//! Recalculation guard: decides when invoice totals may be derived from the
//! lines and when the persisted values win.
//!
//! ```text
//!            complete line edit / tax rate
//!  Loaded ────────────────────────────────▶ Dirty ──(all lines complete)──▶ Recalculated
//!    ▲  incomplete line edit keeps Loaded      ▲                                  │
//!    │                                         └────── incomplete line ◀──────────┘
//!    └──────────────────────── save ◀──────────────────────────────────────────────
//! ```

use rust_decimal::Decimal;

use super::{
    calculation::{recalculate, within_tolerance},
    traits::{InvoiceError, Result},
    types::{InvoiceDraft, Totals},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// Totals are pinned to the persisted values, even when the lines say
    /// otherwise.
    Loaded { pinned: Totals },
    /// A tracked field changed but some line is incomplete. The last
    /// known-good totals stay on display.
    Dirty { displayed: Totals },
    /// Totals equal the formula applied to the current lines.
    Recalculated { totals: Totals },
}

/// What changed in the draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    /// A line was added, removed or modified. `complete` describes that line.
    Line { complete: bool },
    TaxRate,
    /// Header fields do not affect totals.
    Metadata,
}

#[derive(Debug, Clone)]
pub struct RecalculationGuard {
    state: GuardState,
    persisted: Option<Totals>,
    acknowledged: Option<Totals>,
    tolerance: Decimal,
}

impl RecalculationGuard {
    /// Guard for an invoice read from storage.
    pub fn loaded(persisted: Totals, tolerance: Decimal) -> Self {
        Self {
            state: GuardState::Loaded { pinned: persisted },
            persisted: Some(persisted),
            acknowledged: None,
            tolerance,
        }
    }

    /// Guard for an invoice that was never saved. Nothing is pinned.
    pub fn unsaved(draft: &InvoiceDraft, tolerance: Decimal) -> Self {
        let mut guard = Self {
            state: GuardState::Dirty {
                displayed: Totals::default(),
            },
            persisted: None,
            acknowledged: None,
            tolerance,
        };
        guard.recalculate(draft);
        guard
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    /// Totals the user currently sees.
    pub fn displayed(&self) -> Totals {
        match self.state {
            GuardState::Loaded { pinned } => pinned,
            GuardState::Dirty { displayed } => displayed,
            GuardState::Recalculated { totals } => totals,
        }
    }

    /// Apply `edit`, already made to `draft`, and return the totals to display.
    pub fn record(&mut self, edit: Edit, draft: &InvoiceDraft) -> Totals {
        match (self.state, edit) {
            (_, Edit::Metadata) => {}
            (GuardState::Loaded { .. }, Edit::Line { complete: false }) => {}
            _ => {
                self.recalculate(draft);
            }
        }
        self.displayed()
    }

    /// Recompute from the lines when they are all complete, otherwise go
    /// `Dirty` and keep the last totals on display.
    pub fn recalculate(&mut self, draft: &InvoiceDraft) -> Totals {
        self.state = if draft.all_lines_complete() {
            GuardState::Recalculated {
                totals: recalculate(&draft.parts, &draft.labor_details, draft.tax_rate),
            }
        } else {
            GuardState::Dirty {
                displayed: self.displayed(),
            }
        };
        self.displayed()
    }

    /// Totals to write on save.
    ///
    /// Pinned totals are written back untouched. Otherwise the freshly
    /// computed totals are used, unless they move the saved total by more than
    /// the tolerance and the user has not acknowledged that.
    pub fn totals_to_save(&self, draft: &InvoiceDraft) -> Result<Totals> {
        if let GuardState::Loaded { pinned } = self.state {
            return Ok(pinned);
        }

        let computed = recalculate(&draft.parts, &draft.labor_details, draft.tax_rate);
        match self.persisted {
            Some(persisted)
                if !within_tolerance(computed.total, persisted.total, self.tolerance)
                    && self.acknowledged != Some(computed) =>
            {
                Err(InvoiceError::TotalsDiscrepancy {
                    computed: computed.total,
                    persisted: persisted.total,
                })
            }
            _ => Ok(computed),
        }
    }

    /// Accept the computed totals for the next save.
    pub fn acknowledge(&mut self, draft: &InvoiceDraft) -> Totals {
        let computed = recalculate(&draft.parts, &draft.labor_details, draft.tax_rate);
        self.acknowledged = Some(computed);
        self.state = GuardState::Recalculated { totals: computed };
        computed
    }

    /// The draft was stored with `totals`; pin them.
    pub fn mark_saved(&mut self, totals: Totals) {
        self.persisted = Some(totals);
        self.acknowledged = None;
        self.state = GuardState::Loaded { pinned: totals };
    }
}
