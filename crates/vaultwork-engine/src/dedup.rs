//! Persisted set of content hashes used to suppress duplicate ingestion.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::DedupError;
use crate::store::write_atomic;

/// SHA-256 hex digest of an event's canonical string form.
pub fn content_hash(canonical: &str) -> String {
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Full {
        hash: String,
        first_seen: DateTime<Utc>,
    },
    Bare(String),
}

/// Seen-hash cache with an explicit load/persist lifecycle.
///
/// The on-disk form is a JSON list of `{hash, first_seen}` objects. Bare hash
/// strings are accepted on load and get the load time as `first_seen`.
#[derive(Debug, Default)]
pub struct DedupCache {
    path: Option<PathBuf>,
    entries: HashMap<String, DateTime<Utc>>,
    dirty: bool,
}

impl DedupCache {
    /// A cache that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the cache at `path`. A missing file is an empty cache; so is an
    /// unreadable or corrupt one, after a warning.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match parse_entries(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Corrupt dedup cache, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unreadable dedup cache, starting empty");
                HashMap::new()
            }
        };
        tracing::debug!(path = %path.display(), entries = entries.len(), "Loaded dedup cache");
        Self {
            path: Some(path),
            entries,
            dirty: false,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn first_seen(&self, hash: &str) -> Option<DateTime<Utc>> {
        self.entries.get(hash).copied()
    }

    /// Record a hash. Returns false if it was already present.
    pub fn mark_seen(&mut self, hash: impl Into<String>) -> bool {
        let hash = hash.into();
        if self.entries.contains_key(&hash) {
            return false;
        }
        self.entries.insert(hash, Utc::now());
        self.dirty = true;
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether there are entries not yet persisted.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Rewrite the cache file wholesale. No-op for in-memory caches.
    pub fn persist(&mut self) -> Result<(), DedupError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut stored: Vec<StoredEntry> = self
            .entries
            .iter()
            .map(|(hash, first_seen)| StoredEntry::Full {
                hash: hash.clone(),
                first_seen: *first_seen,
            })
            .collect();
        stored.sort_by(|a, b| entry_hash(a).cmp(entry_hash(b)));
        let json = serde_json::to_string_pretty(&stored)?;
        write_atomic(path, json.as_bytes()).map_err(|e| match e {
            crate::error::StoreError::Io { path, source } => DedupError::Io { path, source },
            other => DedupError::Io {
                path: path.clone(),
                source: std::io::Error::other(other.to_string()),
            },
        })?;
        self.dirty = false;
        Ok(())
    }
}

fn entry_hash(entry: &StoredEntry) -> &str {
    match entry {
        StoredEntry::Full { hash, .. } => hash,
        StoredEntry::Bare(hash) => hash,
    }
}

fn parse_entries(raw: &str) -> Result<HashMap<String, DateTime<Utc>>, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(HashMap::new());
    }
    let stored: Vec<StoredEntry> = serde_json::from_str(raw)?;
    let now = Utc::now();
    Ok(stored
        .into_iter()
        .map(|entry| match entry {
            StoredEntry::Full { hash, first_seen } => (hash, first_seen),
            StoredEntry::Bare(hash) => (hash, now),
        })
        .collect())
}
