//! Directory snapshots and change detection
//!
//! A [`Snapshot`] is the set of acceptable file names present in a watched
//! directory at one instant. [`diff`] returns what appeared since the
//! previous snapshot. Removals are never reported.

use async_trait::async_trait;
use lake_common::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::naming;

/// Names observed at one instant, in lexicographic order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    names: BTreeSet<String>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for Snapshot {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Names that appeared between two snapshots, in lexicographic order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArrivalBatch {
    names: Vec<String>,
}

impl ArrivalBatch {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl From<&Snapshot> for ArrivalBatch {
    /// Every name of the snapshot, used for the first poll
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            names: snapshot.names.iter().cloned().collect(),
        }
    }
}

impl<S: Into<String>> FromIterator<S> for ArrivalBatch {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// `current \ previous`
pub fn diff(previous: &Snapshot, current: &Snapshot) -> ArrivalBatch {
    ArrivalBatch {
        names: current.names.difference(&previous.names).cloned().collect(),
    }
}

/// Source of snapshots for the watch loop
#[async_trait]
pub trait Snapshotter: Send + Sync {
    async fn snapshot(&self) -> Result<Snapshot>;

    /// Human-readable location, for logs
    fn location(&self) -> String;
}

/// Snapshots the regular files of one directory (not recursive)
#[derive(Debug, Clone)]
pub struct DirectorySnapshotter {
    dir: PathBuf,
}

impl DirectorySnapshotter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Snapshotter for DirectorySnapshotter {
    async fn snapshot(&self) -> Result<Snapshot> {
        snapshot(&self.dir).await
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }
}

/// List `dir` and keep the regular files whose names pass the naming convention.
///
/// Symlinks are followed. Entries that disappear while listing are skipped.
pub async fn snapshot(dir: &Path) -> Result<Snapshot> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = BTreeSet::new();

    while let Some(entry) = entries.next_entry().await? {
        let Ok(metadata) = tokio::fs::metadata(entry.path()).await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }

        let Ok(name) = entry.file_name().into_string() else {
            debug!(path = %entry.path().display(), "Skipping non UTF-8 file name");
            continue;
        };

        match naming::classify(&name) {
            Ok(_) => {
                names.insert(name);
            }
            Err(rejected) => debug!(%rejected, "Ignoring file"),
        }
    }

    Ok(Snapshot { names })
}
