use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::domain::invoice::{
    ids::{InvoiceId, ReportId},
    traits::{InvoiceError, InvoiceRepository, Result},
    types::{ExpertiseReport, InvoiceDraft},
};

/// Invoices and reports stored as pretty-printed JSON files.
///
/// ```text
/// <root>/invoices/<invoice id>.json
/// <root>/reports/<report id>.json
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileInvoiceRepository {
    root: PathBuf,
}

impl JsonFileInvoiceRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn invoice_path(&self, id: &InvoiceId) -> Result<PathBuf> {
        Ok(self.root.join("invoices").join(file_name(id.as_str())?))
    }

    pub fn report_path(&self, id: &ReportId) -> Result<PathBuf> {
        Ok(self.root.join("reports").join(file_name(id.as_str())?))
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(path, e)),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| InvoiceError::Repository(format!("{}: {e}", path.display())))
    }
}

/// Ids become file names, so they must stay inside their directory.
fn file_name(id: &str) -> Result<String> {
    if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
        return Err(InvoiceError::Repository(format!("invalid id {id:?}")));
    }
    Ok(format!("{id}.json"))
}

fn io_error(path: &Path, e: std::io::Error) -> InvoiceError {
    InvoiceError::Repository(format!("{}: {e}", path.display()))
}

#[async_trait]
impl InvoiceRepository for JsonFileInvoiceRepository {
    async fn get(&self, id: &InvoiceId) -> Result<InvoiceDraft> {
        Self::read_json(&self.invoice_path(id)?)
            .await?
            .ok_or_else(|| InvoiceError::NotFound(id.clone()))
    }

    async fn save(&self, draft: &InvoiceDraft) -> Result<()> {
        let path = self.invoice_path(&draft.id)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        let json = serde_json::to_vec_pretty(draft)
            .map_err(|e| InvoiceError::Repository(format!("serialize invoice: {e}")))?;

        // Write then rename so a crash never leaves a truncated invoice.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(&path, e))?;

        debug!(path = %path.display(), "invoice written");
        Ok(())
    }

    async fn get_report(&self, id: &ReportId) -> Result<Option<ExpertiseReport>> {
        Self::read_json(&self.report_path(id)?).await
    }
}
