//! Completed-host ledger backing resume.
//!
//! One host per line, appended and synced as each host finishes. The file is
//! never rewritten by this process.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::types::HostTarget;

struct Ledger {
    done: HashSet<HostTarget>,
    file: Option<File>,
}

pub struct ProgressStore {
    path: PathBuf,
    inner: Mutex<Ledger>,
}

impl ProgressStore {
    /// Open the ledger at `path`. With `resume`, hosts already listed form the
    /// skip-set; otherwise the file is appended to but its contents ignored.
    pub fn open(path: impl AsRef<Path>, resume: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let done = if resume {
            read_hosts(&path)?
        } else {
            HashSet::new()
        };
        if resume {
            tracing::info!(file = %path.display(), completed = done.len(), "loaded progress");
        }
        Ok(Self {
            path,
            inner: Mutex::new(Ledger { done, file: None }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, host: &str) -> bool {
        self.lock().done.contains(host)
    }

    pub fn completed_count(&self) -> usize {
        self.lock().done.len()
    }

    /// Snapshot of the completed set.
    pub fn completed(&self) -> HashSet<HostTarget> {
        self.lock().done.clone()
    }

    /// Record `host` as finished. Returns `false` without writing if it was already recorded.
    pub fn mark_complete(&self, host: &str) -> Result<bool> {
        let mut ledger = self.lock();
        if ledger.done.contains(host) {
            return Ok(false);
        }
        if ledger.file.is_none() {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .with_context(|| format!("failed to open {}", self.path.display()))?;
            ledger.file = Some(file);
        }
        if let Some(file) = ledger.file.as_mut() {
            writeln!(file, "{host}")
                .and_then(|()| file.flush())
                .and_then(|()| file.sync_data())
                .with_context(|| format!("failed to append to {}", self.path.display()))?;
        }
        ledger.done.insert(host.to_string());
        Ok(true)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Ledger> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Non-empty trimmed lines of the ledger; a missing file is an empty set.
pub fn read_hosts(path: &Path) -> Result<HashSet<HostTarget>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(e).with_context(|| format!("failed to open {}", path.display())),
    };
    let mut hosts = HashSet::new();
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        let host = line.trim();
        if !host.is_empty() {
            hosts.insert(host.to_string());
        }
    }
    Ok(hosts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn marks_once_and_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed_ips.txt");
        let store = ProgressStore::open(&path, true).unwrap();
        assert!(store.mark_complete("10.0.0.1").unwrap());
        assert!(!store.mark_complete("10.0.0.1").unwrap());
        assert!(store.mark_complete("10.0.0.2").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "10.0.0.1\n10.0.0.2\n");
    }

    #[test]
    fn resume_flag_controls_skip_set() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.txt");
        fs::write(&path, "a\n\n  b  \n").unwrap();
        assert_eq!(ProgressStore::open(&path, true).unwrap().completed_count(), 2);
        assert!(ProgressStore::open(&path, true).unwrap().contains("b"));
        assert_eq!(ProgressStore::open(&path, false).unwrap().completed_count(), 0);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::open(dir.path().join("none.txt"), true).unwrap();
        assert_eq!(store.completed_count(), 0);
    }
}
