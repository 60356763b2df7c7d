//! Invoice editing with guarded totals.
//!
//! Totals on a stored invoice are financial records. They are only derived
//! from the lines again once the user genuinely edits a line, and a save that
//! would move the stored total has to be acknowledged first.
//!
//! - [`recalculate`] - the pure totals formula
//! - [`RecalculationGuard`] - `Loaded | Dirty | Recalculated` state machine
//! - [`InvoiceEditSession`] - all edits and the save go through here
//! - [`find_discrepancies`] - advisory comparison with the expertise report
//!
//! # Example
//!
//! ```ignore
//! let mut session = InvoiceEditSession::open(&repo, &id, &retry, dec!(0.01)).await?;
//! session.update_part(0, |p| p.quantity = dec!(3))?;
//!
//! match session.save(&repo).await {
//!     Err(InvoiceError::TotalsDiscrepancy { .. }) => {
//!         session.acknowledge_totals_discrepancy();
//!         session.save(&repo).await?;
//!     }
//!     other => { other?; }
//! }
//! ```

mod calculation;
mod discrepancy;
mod edit_session;
mod guard;
mod ids;
mod traits;
mod types;
mod validation;

pub mod repository;

pub use calculation::{labor_total, line_total, recalculate, round_money, within_tolerance};
pub use discrepancy::{find_discrepancies, Discrepancy, DiscrepancyField};
pub use edit_session::{InvoiceEditSession, InvoiceField};
pub use guard::{Edit, GuardState, RecalculationGuard};
pub use ids::{InvoiceId, ReportId};
pub use repository::{InMemoryInvoiceRepository, JsonFileInvoiceRepository};
pub use traits::{InvoiceError, InvoiceRepository, LineKind, Result};
pub use types::{ExpertiseReport, InvoiceDraft, LaborDetail, Part, ReportPart, Totals};
pub use validation::{validate, FieldError};
