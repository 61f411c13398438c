use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use crate::prelude::{ConsoleError, ConsoleResult};

/// One completed burst file on local disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub last_modified: DateTime<Utc>,
    pub size_bytes: u64,
}

impl CatalogEntry {
    pub fn from_path(path: &Path) -> ConsoleResult<Self> {
        let metadata = fs::metadata(path).map_err(ConsoleError::storage)?;
        let modified = metadata.modified().map_err(ConsoleError::storage)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| ConsoleError::Storage(format!("{} has no file name", path.display())))?;
        Ok(Self {
            name,
            last_modified: DateTime::<Utc>::from(modified),
            size_bytes: metadata.len(),
        })
    }
}

/// Inventory of burst files in the survey directory, newest first.
#[derive(Debug, Clone)]
pub struct BurstCatalog {
    directory: PathBuf,
    extension: String,
    entries: VecDeque<CatalogEntry>,
}

impl BurstCatalog {
    pub fn new(directory: PathBuf, extension: &str) -> Self {
        Self {
            directory,
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
            entries: VecDeque::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn ensure_directory(&self) -> ConsoleResult<()> {
        fs::create_dir_all(&self.directory).map_err(ConsoleError::storage)
    }

    /// Rescans `directory` (creating it when missing) and replaces every
    /// entry. The catalog now tracks `directory`.
    pub fn refresh(&mut self, directory: &Path) -> ConsoleResult<Vec<CatalogEntry>> {
        let entries = scan(directory, &self.extension)?;
        info!(
            "catalog {} holds {} burst files",
            directory.display(),
            entries.len()
        );
        self.directory = directory.to_path_buf();
        self.entries = entries.into();
        Ok(self.entries())
    }

    /// Records a freshly downloaded file at the head without rescanning.
    /// A file downloaded over an existing one replaces its entry.
    pub fn insert_new(&mut self, entry: CatalogEntry) {
        debug!("catalog gains {}", entry.name);
        self.entries.retain(|existing| existing.name != entry.name);
        self.entries.push_front(entry);
    }
}

fn matches_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

/// Lists burst files under `directory` sorted newest first.
pub fn scan(directory: &Path, extension: &str) -> ConsoleResult<Vec<CatalogEntry>> {
    fs::create_dir_all(directory).map_err(ConsoleError::storage)?;
    let mut entries = Vec::new();
    for item in fs::read_dir(directory).map_err(ConsoleError::storage)? {
        let path = item.map_err(ConsoleError::storage)?.path();
        if path.is_file() && matches_extension(&path, extension) {
            entries.push(CatalogEntry::from_path(&path)?);
        }
    }
    entries.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| b.name.cmp(&a.name))
    });
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    fn touch(dir: &Path, name: &str, age_secs: u64, len: usize) {
        let path = dir.join(name);
        fs::write(&path, vec![0u8; len]).unwrap();
        let file = File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
    }

    #[test]
    fn refresh_creates_missing_directory() {
        let root = tempfile::tempdir().unwrap();
        let survey = root.path().join("ApRES").join("Survey_2021-05-18");
        let mut catalog = BurstCatalog::new(survey.clone(), "dat");
        assert!(catalog.refresh(&survey).unwrap().is_empty());
        assert!(survey.is_dir());
        assert!(catalog.refresh(&survey).unwrap().is_empty());
    }

    #[test]
    fn refresh_filters_extension_and_sorts_newest_first() {
        let root = tempfile::tempdir().unwrap();
        touch(root.path(), "old.dat", 300, 10);
        touch(root.path(), "new.DAT", 10, 20);
        touch(root.path(), "middle.dat", 100, 30);
        touch(root.path(), "notes.txt", 1, 5);
        fs::create_dir(root.path().join("nested.dat")).unwrap();

        let mut catalog = BurstCatalog::new(root.path().to_path_buf(), ".dat");
        let names: Vec<String> = catalog
            .refresh(root.path())
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, vec!["new.DAT", "middle.dat", "old.dat"]);
        assert_eq!(catalog.entries()[1].size_bytes, 30);
    }

    #[test]
    fn insert_new_prepends_without_rescan() {
        let root = tempfile::tempdir().unwrap();
        touch(root.path(), "burst_0001.dat", 60, 8);
        let mut catalog = BurstCatalog::new(root.path().to_path_buf(), "dat");
        catalog.refresh(root.path()).unwrap();

        touch(root.path(), "burst_0002.dat", 0, 8);
        let entry = CatalogEntry::from_path(&root.path().join("burst_0002.dat")).unwrap();
        catalog.insert_new(entry);
        let names: Vec<String> = catalog.entries().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["burst_0002.dat", "burst_0001.dat"]);
    }

    #[test]
    fn insert_new_replaces_an_overwritten_file() {
        let root = tempfile::tempdir().unwrap();
        touch(root.path(), "burst_0001.dat", 60, 8);
        touch(root.path(), "burst_0000.dat", 120, 8);
        let mut catalog = BurstCatalog::new(root.path().to_path_buf(), "dat");
        catalog.refresh(root.path()).unwrap();

        touch(root.path(), "burst_0001.dat", 0, 16);
        let entry = CatalogEntry::from_path(&root.path().join("burst_0001.dat")).unwrap();
        catalog.insert_new(entry);
        let entries = catalog.entries();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["burst_0001.dat", "burst_0000.dat"]);
        assert_eq!(entries[0].size_bytes, 16);
        assert_eq!(entries.len(), scan(root.path(), "dat").unwrap().len());
    }
}
