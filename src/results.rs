use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub phrase: String,
    pub address: String,
}

/// JSON array of generated `{ phrase, address }` pairs, rewritten after
/// every append through a temporary file and a rename.
#[derive(Debug)]
pub struct ResultsFile {
    path: PathBuf,
    entries: Vec<ResultEntry>,
}

impl ResultsFile {

    /// Opens `path`, keeping any entries it already holds. A corrupt file
    /// is reported and replaced on the next save.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("⚠️ {} is not a valid results file ({}), starting empty", path.display(), e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(ResultsFile { path, entries })
    }

    pub fn push(&mut self, entry: ResultEntry) -> Result<()> {
        self.entries.push(entry);
        self.save()
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, serde_json::to_string_pretty(&self.entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn entries(&self) -> &[ResultEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(i: usize) -> ResultEntry {
        ResultEntry {
            phrase: format!("phrase {}", i),
            address: format!("address{}", i),
        }
    }

    #[test]
    fn test_push_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output").join("results.json");

        let mut results = ResultsFile::open(&path).unwrap();
        assert!(results.is_empty());
        results.push(entry(1)).unwrap();
        results.push(entry(2)).unwrap();

        let on_disk: Vec<ResultEntry> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, vec![entry(1), entry(2)]);
        assert!(!dir.path().join("output").join("results.json.tmp").exists());
    }

    #[test]
    fn test_existing_entries_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        fs::write(&path, serde_json::to_string(&vec![entry(1)]).unwrap()).unwrap();

        let mut results = ResultsFile::open(&path).unwrap();
        assert_eq!(results.len(), 1);
        results.push(entry(2)).unwrap();

        let reopened = ResultsFile::open(&path).unwrap();
        assert_eq!(reopened.entries(), &[entry(1), entry(2)]);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        fs::write(&path, "[{\"phrase\": ").unwrap();

        let results = ResultsFile::open(&path).unwrap();
        assert!(results.is_empty());
    }
}
