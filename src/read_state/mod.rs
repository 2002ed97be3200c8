//! Persisted notification read state.
//!
//! Read flags are the only notification state that survives between
//! runs. They are stored per user as a set of notification keys behind
//! the [`ReadStateStore`] trait.

use crate::models::{NotificationEntry, NotificationKey};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Read-state persistence errors.
#[derive(Debug, Error)]
pub enum ReadStateError {
    #[error("Failed to access read-state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed read-state file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Storage for acknowledged notification keys, scoped per user.
pub trait ReadStateStore {
    /// Keys the user has acknowledged. Unknown users have none.
    fn get(&self, user: &str) -> Result<BTreeSet<NotificationKey>, ReadStateError>;

    /// Replace the user's acknowledged keys.
    fn set(&mut self, user: &str, keys: BTreeSet<NotificationKey>) -> Result<(), ReadStateError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryReadStateStore {
    users: HashMap<String, BTreeSet<NotificationKey>>,
}

impl InMemoryReadStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReadStateStore for InMemoryReadStateStore {
    fn get(&self, user: &str) -> Result<BTreeSet<NotificationKey>, ReadStateError> {
        Ok(self.users.get(user).cloned().unwrap_or_default())
    }

    fn set(&mut self, user: &str, keys: BTreeSet<NotificationKey>) -> Result<(), ReadStateError> {
        self.users.insert(user.to_string(), keys);
        Ok(())
    }
}

/// JSON file store: `{ "<user>": ["<id>:<bucket>", ...] }`.
///
/// A missing file reads as empty. Writes go to a temporary file in the same
/// directory and are renamed into place.
#[derive(Debug, Clone)]
pub struct JsonFileReadStateStore {
    path: PathBuf,
}

type Document = BTreeMap<String, Vec<String>>;

impl JsonFileReadStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_document(&self) -> Result<Document, ReadStateError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No read-state file at {}", self.path.display());
                return Ok(Document::new());
            }
            Err(source) => {
                return Err(ReadStateError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if content.trim().is_empty() {
            return Ok(Document::new());
        }

        serde_json::from_str(&content).map_err(|source| ReadStateError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    fn write_document(&self, document: &Document) -> Result<(), ReadStateError> {
        let io_error = |source: std::io::Error| ReadStateError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(dir).map_err(io_error)?;
        serde_json::to_writer_pretty(&mut file, document).map_err(|source| {
            ReadStateError::Malformed {
                path: self.path.clone(),
                source,
            }
        })?;
        file.write_all(b"\n").map_err(io_error)?;
        file.persist(&self.path).map_err(|e| io_error(e.error))?;

        Ok(())
    }
}

impl ReadStateStore for JsonFileReadStateStore {
    fn get(&self, user: &str) -> Result<BTreeSet<NotificationKey>, ReadStateError> {
        let document = self.load_document()?;
        let Some(stored) = document.get(user) else {
            return Ok(BTreeSet::new());
        };

        let keys = stored
            .iter()
            .filter_map(|raw| match raw.parse::<NotificationKey>() {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!("Ignoring stored read key for {}: {}", user, e);
                    None
                }
            })
            .collect();

        Ok(keys)
    }

    fn set(&mut self, user: &str, keys: BTreeSet<NotificationKey>) -> Result<(), ReadStateError> {
        let mut document = self.load_document()?;

        if keys.is_empty() {
            document.remove(user);
        } else {
            document.insert(
                user.to_string(),
                keys.iter().map(ToString::to_string).collect(),
            );
        }

        self.write_document(&document)
    }
}

/// Set one key read or unread. Returns whether anything changed.
pub fn set_read<S: ReadStateStore + ?Sized>(
    store: &mut S,
    user: &str,
    key: &NotificationKey,
    read: bool,
) -> Result<bool, ReadStateError> {
    let mut keys = store.get(user)?;

    let changed = if read {
        keys.insert(key.clone())
    } else {
        keys.remove(key)
    };

    if changed {
        store.set(user, keys)?;
    }

    Ok(changed)
}

/// Acknowledge every given notification. Returns how many were newly read.
pub fn mark_all_read<S: ReadStateStore + ?Sized>(
    store: &mut S,
    user: &str,
    entries: &[NotificationEntry],
) -> Result<usize, ReadStateError> {
    let mut keys = store.get(user)?;
    let before = keys.len();

    keys.extend(entries.iter().map(|entry| entry.key.clone()));
    let added = keys.len() - before;

    if added > 0 {
        store.set(user, keys)?;
    }

    Ok(added)
}

/// Read/unread changes requested for one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadStateEdits<'a> {
    pub mark_read: &'a [NotificationKey],
    pub mark_unread: &'a [NotificationKey],
    pub mark_all_read: bool,
}

impl ReadStateEdits<'_> {
    pub fn is_empty(&self) -> bool {
        !self.mark_all_read && self.mark_read.is_empty() && self.mark_unread.is_empty()
    }
}

/// Apply `edits` for `user` against the current notifications.
///
/// Explicit keys are applied first, then mark-all. Returns the number of
/// keys whose read flag changed.
pub fn apply_edits<S: ReadStateStore + ?Sized>(
    store: &mut S,
    user: &str,
    edits: &ReadStateEdits<'_>,
    notifications: &[NotificationEntry],
) -> Result<usize, ReadStateError> {
    if edits.is_empty() {
        return Ok(0);
    }

    let mut changed = 0;

    for key in edits.mark_read {
        if !notifications.iter().any(|n| &n.key == key) {
            warn!("{} is not a current notification; marking it anyway", key);
        }
        if set_read(store, user, key, true)? {
            info!("Marked {} as read for {}", key, user);
            changed += 1;
        }
    }

    for key in edits.mark_unread {
        if set_read(store, user, key, false)? {
            info!("Marked {} as unread for {}", key, user);
            changed += 1;
        }
    }

    if edits.mark_all_read {
        let added = mark_all_read(store, user, notifications)?;
        info!("Marked {} notifications as read for {}", added, user);
        changed += added;
    }

    Ok(changed)
}
