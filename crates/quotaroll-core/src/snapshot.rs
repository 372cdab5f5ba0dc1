//! Snapshot persistence
//!
//! A run can write its summaries to `{dir}/{prefix}-{YYYYMM}.json` as a
//! single JSON array. Rerunning a period overwrites the file, which keeps the
//! snapshot consistent with what was last written to the store.

use crate::error::{QuotarollError, Result};
use crate::types::{Period, SummaryDocument};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Location of the snapshot for a period
///
/// ```
/// use quotaroll_core::snapshot::snapshot_path;
/// use quotaroll_core::types::Period;
/// use std::path::Path;
///
/// let period: Period = "2024-03".parse().unwrap();
/// assert_eq!(
///     snapshot_path(Path::new("/tmp/out"), "quotas", period),
///     Path::new("/tmp/out/quotas-202403.json")
/// );
/// ```
pub fn snapshot_path(dir: &Path, prefix: &str, period: Period) -> PathBuf {
    dir.join(format!("{}-{}.json", prefix, period.compact()))
}

/// Serialize `documents` to the period's snapshot file, replacing any
/// previous snapshot. Returns the path written.
pub async fn write_snapshot<T: Serialize>(
    dir: &Path,
    prefix: &str,
    period: Period,
    documents: &[T],
) -> Result<PathBuf> {
    let path = snapshot_path(dir, prefix, period);
    let body = serde_json::to_vec(documents)?;

    tokio::fs::write(&path, body)
        .await
        .map_err(|source| QuotarollError::Snapshot {
            path: path.clone(),
            source,
        })?;

    info!("Wrote {} documents to {}", documents.len(), path.display());
    Ok(path)
}

/// Load summaries back from a snapshot file
pub async fn read_snapshot(path: &Path) -> Result<Vec<SummaryDocument>> {
    let body = tokio::fs::read(path)
        .await
        .map_err(|source| QuotarollError::Snapshot {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_slice(&body).map_err(|e| QuotarollError::Snapshot {
        path: path.to_path_buf(),
        source: std::io::Error::from(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn documents(period: Period) -> Vec<SummaryDocument> {
        let mut doc = SummaryDocument::new(period, "org-a");
        doc.organization_names = vec!["alpha".into()];
        doc.metrics.insert("memory_limit".into(), 300.0);
        vec![doc]
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let period = Period::new(2024, 3).unwrap();

        let path = write_snapshot(dir.path(), "quotas", period, &documents(period))
            .await
            .unwrap();
        assert!(path.ends_with("quotas-202403.json"));

        let loaded = read_snapshot(&path).await.unwrap();
        assert_eq!(loaded, documents(period));
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_a_snapshot_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quotas-202403.json");
        tokio::fs::write(&path, b"[{\"id\": ").await.unwrap();

        let err = read_snapshot(&path).await.unwrap_err();
        assert!(matches!(err, QuotarollError::Snapshot { .. }));
        assert_eq!(err.exit_code(), 14);
    }

    #[tokio::test]
    async fn test_rerun_overwrites_snapshot() {
        let dir = TempDir::new().unwrap();
        let period = Period::new(2024, 3).unwrap();

        write_snapshot(dir.path(), "quotas", period, &documents(period))
            .await
            .unwrap();
        let path = write_snapshot::<SummaryDocument>(dir.path(), "quotas", period, &[])
            .await
            .unwrap();

        assert!(read_snapshot(&path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_is_a_snapshot_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("does-not-exist");
        let period = Period::new(2024, 3).unwrap();

        let err = write_snapshot(&missing, "memory", period, &documents(period))
            .await
            .unwrap_err();
        assert!(matches!(err, QuotarollError::Snapshot { .. }));
        assert_eq!(err.exit_code(), 14);
    }
}
