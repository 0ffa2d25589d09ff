use super::files::atomic_write;
use super::migration::classify;
use crate::error::{Result, TodoError};
use chrono::Local;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

const PREFIX: &str = "data_";
const LEGACY_PREFIX: &str = "data_legacy_backup_";
const CORRUPT_PREFIX: &str = "data_corrupt_";
const EXTENSION: &str = ".json";

/// Kind of file found in the backup directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    /// Rotating copy written after each successful save
    Regular,
    /// Pre-migration copy of a legacy file; never pruned
    Legacy,
    /// Copy of a file that failed to parse; never pruned or restored from
    Corrupt,
}

impl BackupKind {
    fn of(name: &str) -> Option<Self> {
        if !name.starts_with(PREFIX) || !name.ends_with(EXTENSION) {
            return None;
        }
        if name.starts_with(LEGACY_PREFIX) {
            Some(Self::Legacy)
        } else if name.starts_with(CORRUPT_PREFIX) {
            Some(Self::Corrupt)
        } else {
            Some(Self::Regular)
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Regular => "backup",
            Self::Legacy => "legacy",
            Self::Corrupt => "corrupt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub name: String,
    pub path: PathBuf,
    pub kind: BackupKind,
    pub size: u64,
}

/// Timestamped copies of the document in one directory.
///
/// Names embed a millisecond timestamp (`data_20250101_120000_123.json`) so
/// lexical order is chronological order.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
    max_backups: usize,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>, max_backups: usize) -> Self {
        Self {
            dir: dir.into(),
            max_backups: max_backups.max(1),
        }
    }

    fn stamp() -> String {
        Local::now().format("%Y%m%d_%H%M%S_%3f").to_string()
    }

    /// Path for `<prefix><stamp>.json`, suffixed when a file with that name
    /// already exists (two saves inside the same millisecond).
    fn fresh_path(&self, prefix: &str) -> PathBuf {
        let stamp = Self::stamp();
        let mut path = self.dir.join(format!("{}{}{}", prefix, stamp, EXTENSION));
        let mut n = 1;
        while path.exists() {
            path = self
                .dir
                .join(format!("{}{}_{}{}", prefix, stamp, n, EXTENSION));
            n += 1;
        }
        path
    }

    fn write_copy(&self, prefix: &str, content: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| TodoError::io(&self.dir, e))?;
        let path = self.fresh_path(prefix);
        atomic_write(&path, content).map_err(|e| TodoError::io(&path, e))?;
        Ok(path)
    }

    /// Write a rotating backup and prune the oldest beyond the retention count
    pub fn write_backup(&self, content: &[u8]) -> Result<PathBuf> {
        let path = self.write_copy(PREFIX, content)?;
        tracing::debug!(path = %path.display(), "backup written");
        self.prune()?;
        Ok(path)
    }

    /// Keep the original bytes of a legacy file before migration overwrites it
    pub fn write_legacy_backup(&self, original: &[u8]) -> Result<PathBuf> {
        let path = self.write_copy(LEGACY_PREFIX, original)?;
        tracing::info!(path = %path.display(), "legacy file backed up before migration");
        Ok(path)
    }

    /// Keep a copy of a document that failed to parse
    pub fn quarantine(&self, original: &[u8]) -> Result<PathBuf> {
        let path = self.write_copy(CORRUPT_PREFIX, original)?;
        tracing::warn!(path = %path.display(), "corrupt document quarantined");
        Ok(path)
    }

    /// All backup files, newest first
    pub fn list(&self) -> Result<Vec<BackupEntry>> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(TodoError::io(&self.dir, e)),
        };

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| TodoError::io(&self.dir, e))?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(kind) = BackupKind::of(name) else {
                continue;
            };
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            entries.push(BackupEntry {
                name: name.to_string(),
                kind,
                size,
                path,
            });
        }
        entries.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(entries)
    }

    /// Delete regular backups beyond the retention count, oldest first
    pub fn prune(&self) -> Result<usize> {
        let regular: Vec<BackupEntry> = self
            .list()?
            .into_iter()
            .filter(|e| e.kind == BackupKind::Regular)
            .collect();

        let mut removed = 0;
        for stale in regular.iter().skip(self.max_backups) {
            match fs::remove_file(&stale.path) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(name = %stale.name, error = %e, "failed to prune backup"),
            }
        }
        if removed > 0 {
            tracing::debug!(removed, kept = self.max_backups, "pruned old backups");
        }
        Ok(removed)
    }

    /// Parse a backup and check it has a recognised document shape
    pub fn verify(&self, entry: &BackupEntry) -> Result<Value> {
        let content = fs::read_to_string(&entry.path).map_err(|e| TodoError::io(&entry.path, e))?;
        let value: Value = serde_json::from_str(&content)?;
        classify(value.clone())?;
        Ok(value)
    }

    /// Newest regular backup that parses
    pub fn newest_valid(&self) -> Result<Option<(BackupEntry, Value)>> {
        for entry in self.list()? {
            if entry.kind != BackupKind::Regular {
                continue;
            }
            match self.verify(&entry) {
                Ok(value) => return Ok(Some((entry, value))),
                Err(e) => tracing::warn!(name = %entry.name, error = %e, "skipping invalid backup"),
            }
        }
        Ok(None)
    }

    /// Look up a backup by file name
    pub fn find(&self, name: &str) -> Result<BackupEntry> {
        self.list()?
            .into_iter()
            .find(|e| e.name == name)
            .ok_or_else(|| TodoError::BackupNotFound(name.to_string()))
    }
}
