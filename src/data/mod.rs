//! Data ingestion and storage
//!
//! Play-by-play loading, training set construction, external feeds and the
//! flat JSON files everything is persisted to.

pub mod dataset;
pub mod feeds;
pub mod plays;

pub use dataset::{TrainingSample, TrainingSetBuilder};
pub use plays::load_plays;

use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A document written to a temporary sibling, not yet in place
///
/// Dropping without [`StagedFile::commit`] removes the temporary file.
#[must_use]
pub struct StagedFile {
    tmp: PathBuf,
    path: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// Rename into place
    pub fn commit(mut self) -> Result<()> {
        std::fs::rename(&self.tmp, &self.path)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.tmp);
        }
    }
}

/// Write pretty JSON next to `path` without replacing it yet
pub fn stage_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<StagedFile> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let body = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body)?;
    Ok(StagedFile {
        tmp,
        path: path.to_path_buf(),
        committed: false,
    })
}

/// Write pretty JSON to a temporary sibling and rename it into place
pub fn write_json_atomic<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    stage_json(path, value)?.commit()
}

/// Read a JSON document
pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_uncommitted_stage_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let staged = stage_json(&path, &vec![1, 2, 3]).unwrap();
        assert!(path.with_extension("json.tmp").exists());
        drop(staged);

        assert!(!path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_atomic_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/report.json");

        let mut first = BTreeMap::new();
        first.insert("games", 1);
        write_json_atomic(&path, &first).unwrap();

        let mut second = BTreeMap::new();
        second.insert("games", 2);
        write_json_atomic(&path, &second).unwrap();

        let read: BTreeMap<String, i32> = read_json(&path).unwrap();
        assert_eq!(read["games"], 2);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_failed_serialize_leaves_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();

        // Non-string map keys cannot be written as JSON
        let mut bad = BTreeMap::new();
        bad.insert(vec![1u8], 1);
        assert!(write_json_atomic(&path, &bad).is_err());

        let read: Vec<i32> = read_json(&path).unwrap();
        assert_eq!(read, vec![1, 2, 3]);
    }
}
