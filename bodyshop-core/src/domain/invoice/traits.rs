//! Trait definitions for the invoice domain.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use strum::Display;

use super::{
    ids::{InvoiceId, ReportId},
    types::{ExpertiseReport, InvoiceDraft},
    validation::FieldError,
};
use crate::domain::{retry::Retryable, session::SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LineKind {
    Part,
    Labor,
}

/// Error type for invoice operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvoiceError {
    #[error("invoice is not valid: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("computed total {computed} differs from saved total {persisted}")]
    TotalsDiscrepancy { computed: Decimal, persisted: Decimal },

    #[error("invoice {0} not found")]
    NotFound(InvoiceId),

    #[error("no {kind} line at index {index}")]
    LineNotFound { kind: LineKind, index: usize },

    #[error("network timeout after {0:?}")]
    NetworkTimeout(Duration),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("repository error: {0}")]
    Repository(String),
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Retryable for InvoiceError {
    fn timed_out(after: Duration) -> Self {
        InvoiceError::NetworkTimeout(after)
    }

    fn is_retryable(&self) -> bool {
        matches!(self, InvoiceError::NetworkTimeout(_) | InvoiceError::Repository(_))
    }
}

pub type Result<T> = std::result::Result<T, InvoiceError>;

/// Persisted invoices and the reports they were created from.
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn get(&self, id: &InvoiceId) -> Result<InvoiceDraft>;

    /// Insert or replace the invoice with the same id.
    async fn save(&self, draft: &InvoiceDraft) -> Result<()>;

    async fn get_report(&self, id: &ReportId) -> Result<Option<ExpertiseReport>>;
}
