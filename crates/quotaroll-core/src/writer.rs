//! Idempotent bulk writer
//!
//! Every document carries a deterministic id, so writing the same batch twice
//! replaces documents instead of duplicating them. The writer turns a slice
//! of documents into one bulk request and converts per-item rejections into a
//! [`BulkWriteFailure`] naming each failed id.

use crate::error::{BulkWriteFailure, FailedWrite, QuotarollError, Result};
use crate::store::{BulkItem, IndexDocument, MetricsStore};
use tracing::{debug, info};

/// Outcome of a successful bulk write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub index: String,
    pub written: usize,
}

/// Write `documents` to `index` in a single bulk request.
///
/// An empty slice issues no request. Either every document was written, or
/// the error lists exactly the documents that were not; the batch is never
/// rolled back, and resubmitting it converges.
pub async fn write_documents<S, D>(store: &S, index: &str, documents: &[D]) -> Result<WriteSummary>
where
    S: MetricsStore + ?Sized,
    D: IndexDocument,
{
    if documents.is_empty() {
        debug!("No documents to write to {}", index);
        return Ok(WriteSummary {
            index: index.to_string(),
            written: 0,
        });
    }

    let items = documents
        .iter()
        .map(|doc| {
            Ok(BulkItem {
                id: doc.document_id().to_string(),
                source: serde_json::to_value(doc)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let attempted = items.len();

    let response = store.bulk_index(index, items).await?;

    let failed: Vec<FailedWrite> = response
        .items
        .iter()
        .filter(|item| !item.is_success())
        .map(|item| FailedWrite {
            id: item.id.clone(),
            status: item.status,
            reason: item
                .error
                .clone()
                .unwrap_or_else(|| format!("status {}", item.status)),
        })
        .collect();

    if !failed.is_empty() {
        return Err(QuotarollError::BulkWrite(BulkWriteFailure {
            index: index.to_string(),
            attempted,
            failed,
        }));
    }

    info!("Wrote {} documents to {}", attempted, index);
    Ok(WriteSummary {
        index: index.to_string(),
        written: attempted,
    })
}
