//! Durable diagnostic documents.
//!
//! Snapshots and crash dumps share one code path ([`snapshot`]); the running
//! summary ([`summary`]) is persisted on its own cadence.

pub mod snapshot;
pub mod summary;

pub use snapshot::{dedup_processes, SnapshotDocument, StorageSummary};
pub use summary::RunningSummary;

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Timestamp format used in snapshot and crash dump file names.
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// `<dir>/<prefix>-<timestamp>.json`
pub fn timestamped_path(dir: &Path, prefix: &str, at: DateTime<Utc>) -> PathBuf {
    dir.join(format!("{}-{}.json", prefix, at.format(FILE_TIMESTAMP_FORMAT)))
}

/// Serialize `document` as pretty JSON and move it into place at `path`.
///
/// The whole document is rendered in memory first and written to a sibling
/// temporary file, so readers never observe a partial file.
pub fn write_document<T: Serialize>(path: &Path, document: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(document)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    if let Err(err) = fs::write(&tmp, data).and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamped_path() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let path = timestamped_path(Path::new("crashes"), "crash", at);
        assert_eq!(path, PathBuf::from("crashes/crash-2024-03-09-14-05-07.json"));
    }

    #[test]
    fn test_write_document_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/doc.json");
        write_document(&path, &serde_json::json!({ "ok": true })).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["ok"], true);
        assert!(!dir.path().join("nested/deeper/doc.json.tmp").exists());
    }

    #[test]
    fn test_write_document_reports_unwritable_destination() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"not a directory").unwrap();

        let result = write_document(&blocker.join("doc.json"), &serde_json::json!({}));
        assert!(result.is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_write_leaves_no_temp_file() {
        if !Path::new("/dev/full").exists() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let tmp = dir.path().join("doc.json.tmp");
        std::os::unix::fs::symlink("/dev/full", &tmp).unwrap();

        let result = write_document(&path, &serde_json::json!({ "fill": "disk" }));

        assert!(matches!(result, Err(crate::error::MonitorError::Io(_))));
        assert!(fs::symlink_metadata(&tmp).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_rename_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::create_dir_all(path.join("occupied")).unwrap();

        assert!(write_document(&path, &serde_json::json!({})).is_err());
        assert!(!dir.path().join("doc.json.tmp").exists());
    }
}
