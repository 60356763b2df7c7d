use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::invoice::{
    ids::{InvoiceId, ReportId},
    traits::{InvoiceError, InvoiceRepository, Result},
    types::{ExpertiseReport, InvoiceDraft},
};

/// Invoice repository backed by in-memory maps.
///
/// Clones share their data. `fail_next_gets` injects transient failures.
#[derive(Clone, Default)]
pub struct InMemoryInvoiceRepository {
    invoices: Arc<RwLock<HashMap<InvoiceId, InvoiceDraft>>>,
    reports: Arc<RwLock<HashMap<ReportId, ExpertiseReport>>>,
    failing_gets: Arc<AtomicUsize>,
    saves: Arc<AtomicUsize>,
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_invoice(&self, draft: InvoiceDraft) {
        self.invoices.write().await.insert(draft.id.clone(), draft);
    }

    pub async fn insert_report(&self, report: ExpertiseReport) {
        self.reports.write().await.insert(report.id.clone(), report);
    }

    /// The next `count` calls to `get` fail with a repository error.
    pub fn fail_next_gets(&self, count: usize) {
        self.failing_gets.store(count, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryInvoiceRepository {
    async fn get(&self, id: &InvoiceId) -> Result<InvoiceDraft> {
        let injected = self
            .failing_gets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(InvoiceError::Repository("injected failure".to_string()));
        }

        self.invoices
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| InvoiceError::NotFound(id.clone()))
    }

    async fn save(&self, draft: &InvoiceDraft) -> Result<()> {
        self.invoices
            .write()
            .await
            .insert(draft.id.clone(), draft.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_report(&self, id: &ReportId) -> Result<Option<ExpertiseReport>> {
        Ok(self.reports.read().await.get(id).cloned())
    }
}
