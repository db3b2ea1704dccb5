use crate::error::Result;
use crate::model::ReportKey;
use crate::parsing::naming::{ArtifactName, KeyDecodeError};
use std::collections::HashSet;
use std::path::Path;

/// Suffix of in-flight downloads; such files are never treated as artifacts.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Keys of every report already present in the artifact directory.
///
/// The directory itself is the ledger: a report counts as downloaded exactly
/// when a file with its encoded name exists. The repository is loaded once
/// per run and then extended in memory as downloads complete.
#[derive(Debug, Clone, Default)]
pub struct DedupRepository {
    keys: HashSet<ReportKey>,
}

/// Result of scanning the artifact directory.
#[derive(Debug, Default)]
pub struct DedupLoad {
    pub repository: DedupRepository,
    /// Files whose names did not decode; their keys are not in the repository
    pub rejected: Vec<KeyDecodeError>,
}

impl DedupRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans `dir` and decodes every artifact filename.
    ///
    /// Each regular file is decoded as `code_name_year_quarter.pdf` and its
    /// `(code, year, quarter)` key is recorded; the name is dropped so that a
    /// renamed company still matches its earlier downloads. In-flight `.part`
    /// files and subdirectories are skipped.
    ///
    /// # Arguments
    ///
    /// * `dir` - The artifact directory; it does not need to exist yet
    ///
    /// # Returns
    ///
    /// A [`DedupLoad`] holding the repository and one [`KeyDecodeError`] per
    /// file whose name did not decode. A missing directory yields an empty
    /// repository and no rejections.
    ///
    /// # Errors
    ///
    /// Returns `HarvestError::FileError` if the directory or one of its
    /// entries cannot be read. Malformed names are never an error.
    pub fn load(dir: impl AsRef<Path>) -> Result<DedupLoad> {
        let dir = dir.as_ref();
        let mut load = DedupLoad::default();

        if !dir.exists() {
            tracing::debug!("Artifact directory {} does not exist yet", dir.display());
            return Ok(load);
        }

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.ends_with(PARTIAL_SUFFIX) {
                tracing::debug!("Ignoring partial download {}", file_name);
                continue;
            }

            match ArtifactName::decode(&file_name) {
                Ok(artifact) => {
                    load.repository.insert(artifact.key());
                }
                Err(e) => load.rejected.push(e),
            }
        }

        tracing::info!(
            "Loaded {} existing reports from {} ({} unrecognized files)",
            load.repository.len(),
            dir.display(),
            load.rejected.len()
        );

        Ok(load)
    }

    pub fn contains(&self, key: &ReportKey) -> bool {
        self.keys.contains(key)
    }

    /// Records a key; returns `false` if it was already present.
    pub fn insert(&mut self, key: ReportKey) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReportKey> {
        self.keys.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StockCode, StockIdentity};
    use std::fs;

    fn key(code: &str, year: &str, quarter: &str) -> ReportKey {
        ReportKey::new(StockCode::parse(code).unwrap(), year, quarter)
    }

    #[test]
    fn test_load_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let load = DedupRepository::load(dir.path().join("reports")).unwrap();
        assert!(load.repository.is_empty());
        assert!(load.rejected.is_empty());
    }

    #[test]
    fn test_load_decodes_keys_without_names() {
        let dir = tempfile::tempdir().unwrap();
        let stock = StockIdentity::new(StockCode::parse("600754").unwrap(), "ABC Co");
        let name = ArtifactName::new(&stock, "2024", "Q1").encode().unwrap();
        fs::write(dir.path().join(name), b"%PDF").unwrap();

        let load = DedupRepository::load(dir.path()).unwrap();
        assert!(load.repository.contains(&key("600754", "2024", "Q1")));
        assert!(!load.repository.contains(&key("600754", "2024", "Q2")));
    }

    #[test]
    fn test_malformed_entries_are_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("600754_ABC_2024_Q1.pdf"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        fs::write(dir.path().join("000001_X_2023_Q4.pdf.part"), b"").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let load = DedupRepository::load(dir.path()).unwrap();
        assert_eq!(load.repository.len(), 1);
        assert_eq!(load.rejected.len(), 1);
        assert_eq!(load.rejected[0].file_name, "notes.txt");
        assert!(!load.repository.contains(&key("000001", "2023", "Q4")));
    }

    #[test]
    fn test_insert_reports_novelty() {
        let mut repo = DedupRepository::new();
        assert!(repo.insert(key("000001", "2024", "Q1")));
        assert!(!repo.insert(key("000001", "2024", "Q1")));
        assert_eq!(repo.iter().count(), 1);
    }
}
