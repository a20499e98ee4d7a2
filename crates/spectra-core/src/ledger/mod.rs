//! Content-hash duplicate ledger: the single source of truth for "have we
//! seen this content before".
//!
//! The hash covers the original raw bytes before any parsing, so identical
//! source content is recognized even when header order or whitespace
//! differs in the metadata. Byte-identical payloads under different archive
//! wrappers hash differently and stay distinct entries.
//!
//! `check_and_record` holds one lock across the check and the write; it is
//! the atomic gate that keeps two concurrent ingestions of identical
//! content from both proceeding.

use crate::domain::{LedgerError, LedgerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// SHA-256 of the raw bytes as handed to ingestion, hex encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LedgerScope {
    /// Cleared at the process/session boundary; never persisted.
    Session,
    /// Persists across sessions in the backing store.
    Global,
}

impl LedgerScope {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Global => "global",
        }
    }
}

impl Display for LedgerScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub content_hash: String,
    pub first_seen_at: DateTime<Utc>,
    pub scope: LedgerScope,
    pub label: String,
}

/// Outcome of the atomic duplicate gate.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Novel content; an entry was recorded.
    Fresh(LedgerEntry),
    /// Already known, and re-ingestion is permitted (no lock, or the
    /// caller overrode it).
    Duplicate(LedgerEntry),
}

#[derive(Debug, Default)]
struct LedgerState {
    session: BTreeMap<String, LedgerEntry>,
    global: BTreeMap<String, LedgerEntry>,
}

impl LedgerState {
    fn lookup(&self, content_hash: &str) -> Option<&LedgerEntry> {
        self.global
            .get(content_hash)
            .or_else(|| self.session.get(content_hash))
    }
}

/// On-disk shape of the global scope: hash -> entry metadata.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredLedger {
    entries: BTreeMap<String, StoredEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    first_seen_at: DateTime<Utc>,
    label: String,
}

#[derive(Debug)]
pub struct DuplicateLedger {
    state: Mutex<LedgerState>,
    store_path: Option<PathBuf>,
    locked: bool,
}

impl DuplicateLedger {
    /// Session-only ledger with no backing store.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            store_path: None,
            locked: false,
        }
    }

    /// Opens (or initializes) the JSON-backed global store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        let path = path.into();
        let mut state = LedgerState::default();

        match fs::read(&path) {
            Ok(bytes) => {
                let stored: StoredLedger =
                    serde_json::from_slice(&bytes).map_err(|error| LedgerError::CorruptStore {
                        path: path.clone(),
                        reason: error.to_string(),
                    })?;
                for (content_hash, entry) in stored.entries {
                    state.global.insert(
                        content_hash.clone(),
                        LedgerEntry {
                            content_hash,
                            first_seen_at: entry.first_seen_at,
                            scope: LedgerScope::Global,
                            label: entry.label,
                        },
                    );
                }
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(LedgerError::StoreUnreachable { path, source });
            }
        }

        Ok(Self {
            state: Mutex::new(state),
            store_path: Some(path),
            locked: false,
        })
    }

    /// When locked, a hash already present in scope rejects re-ingestion
    /// unless the caller passes an explicit override.
    pub fn with_lock(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Read-only probe; the hot path for repeat ingestion attempts.
    pub fn check(&self, content_hash: &str) -> LedgerResult<Option<LedgerEntry>> {
        let state = self.state.lock().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(state.lookup(content_hash).cloned())
    }

    /// Check-then-record as one atomic operation. Novel content is
    /// recorded; known content yields the existing entry, extending a
    /// session entry's scope to global when asked for (the one permitted
    /// mutation). With the lock set, known content is an error unless
    /// `override_lock` is passed.
    pub fn check_and_record(
        &self,
        content_hash: &str,
        scope: LedgerScope,
        label: &str,
        override_lock: bool,
    ) -> LedgerResult<GateDecision> {
        let mut state = self.state.lock().map_err(|_| LedgerError::LockPoisoned)?;

        if let Some(existing) = state.lookup(content_hash).cloned() {
            if self.locked && !override_lock {
                return Err(LedgerError::DuplicateLocked {
                    content_hash: content_hash.to_string(),
                    scope: existing.scope.to_string(),
                    first_seen_at: existing.first_seen_at.to_rfc3339(),
                });
            }

            if existing.scope == LedgerScope::Session && scope == LedgerScope::Global {
                let promoted = LedgerEntry {
                    scope: LedgerScope::Global,
                    ..existing
                };
                state.session.remove(content_hash);
                state
                    .global
                    .insert(content_hash.to_string(), promoted.clone());
                self.persist(&state)?;
                return Ok(GateDecision::Duplicate(promoted));
            }

            return Ok(GateDecision::Duplicate(existing));
        }

        let entry = LedgerEntry {
            content_hash: content_hash.to_string(),
            first_seen_at: Utc::now(),
            scope,
            label: label.to_string(),
        };
        match scope {
            LedgerScope::Session => {
                state.session.insert(content_hash.to_string(), entry.clone());
            }
            LedgerScope::Global => {
                state.global.insert(content_hash.to_string(), entry.clone());
                self.persist(&state)?;
            }
        }
        debug!(content_hash, scope = %scope, "recorded ledger entry");
        Ok(GateDecision::Fresh(entry))
    }

    /// Explicit administrative purge; the only way an entry is deleted.
    pub fn purge(&self, content_hash: &str) -> LedgerResult<bool> {
        let mut state = self.state.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let removed_session = state.session.remove(content_hash).is_some();
        let removed_global = state.global.remove(content_hash).is_some();
        if removed_global {
            self.persist(&state)?;
        }
        Ok(removed_session || removed_global)
    }

    /// Drops all session-scope entries; global entries are untouched.
    pub fn clear_session(&self) -> LedgerResult<()> {
        let mut state = self.state.lock().map_err(|_| LedgerError::LockPoisoned)?;
        state.session.clear();
        Ok(())
    }

    pub fn entries(&self) -> LedgerResult<Vec<LedgerEntry>> {
        let state = self.state.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let mut entries: Vec<LedgerEntry> = state.global.values().cloned().collect();
        entries.extend(state.session.values().cloned());
        Ok(entries)
    }

    fn persist(&self, state: &LedgerState) -> LedgerResult<()> {
        let Some(path) = &self.store_path else {
            return Ok(());
        };

        let stored = StoredLedger {
            entries: state
                .global
                .iter()
                .map(|(content_hash, entry)| {
                    (
                        content_hash.clone(),
                        StoredEntry {
                            first_seen_at: entry.first_seen_at,
                            label: entry.label.clone(),
                        },
                    )
                })
                .collect(),
        };
        let json = serde_json::to_vec_pretty(&stored).map_err(|error| LedgerError::CorruptStore {
            path: path.clone(),
            reason: error.to_string(),
        })?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| LedgerError::StoreUnreachable {
                path: path.clone(),
                source,
            })?;
        }

        // Same write-temp-then-rename discipline as cache chunks.
        let temp = path.with_extension("part");
        fs::write(&temp, &json).map_err(|source| LedgerError::StoreUnreachable {
            path: temp.clone(),
            source,
        })?;
        fs::rename(&temp, path).map_err(|source| LedgerError::StoreUnreachable {
            path: path.clone(),
            source,
        })
    }
}

pub fn session_store_path(root: &Path) -> PathBuf {
    root.join("ledger.json")
}
