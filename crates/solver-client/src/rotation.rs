//! Key rotation policy and its persistence boundary.
//!
//! [`RotationState`] is pure scheduling policy: no I/O, no clocks beyond
//! timestamping invalid marks. Loading and saving happen only at the
//! dispatcher's boundaries through a [`RotationStore`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use solver_types::credential::{InvalidMark, InvalidReason};

use crate::error::ClientError;

/// One entry of an attempt queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// Try this pool key.
    Key(String),
    /// Send no key and let the relay apply its own default. Always the
    /// final entry of a queue.
    ServerDefault,
}

impl Attempt {
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Key(key) => Some(key),
            Self::ServerDefault => None,
        }
    }
}

/// Caller-local rotation state: ordered key pool, persisted cursor, and the
/// set of keys currently believed unusable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RotationState {
    pool: Vec<String>,
    cursor: usize,
    invalid: HashMap<String, InvalidMark>,
}

impl RotationState {
    pub fn new(pool: Vec<String>) -> Self {
        Self { pool: normalize_pool(pool), cursor: 0, invalid: HashMap::new() }
    }

    pub fn pool(&self) -> &[String] {
        &self.pool
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn invalid_mark(&self, key: &str) -> Option<&InvalidMark> {
        self.invalid.get(key.trim())
    }

    /// Replace the pool. Resets the cursor and drops invalid marks for keys
    /// no longer present.
    pub fn set_pool(&mut self, pool: Vec<String>) {
        self.pool = normalize_pool(pool);
        self.cursor = 0;
        let pool = &self.pool;
        self.invalid.retain(|key, _| pool.iter().any(|k| k == key));
    }

    /// Build the attempt order for one request: the pool rotated to start
    /// at the cursor, invalid keys filtered out — unless filtering would
    /// empty the queue, in which case the unfiltered rotation is used so an
    /// erroneous mass-marking cannot lock the pool out entirely. The
    /// server-default sentinel is always appended last.
    pub fn build_queue(&self) -> Vec<Attempt> {
        let cursor = self.clamped_cursor();
        let rotated: Vec<&String> =
            self.pool.iter().skip(cursor).chain(self.pool.iter().take(cursor)).collect();

        let valid: Vec<&String> =
            rotated.iter().copied().filter(|key| !self.invalid.contains_key(key.trim())).collect();

        let chosen = if valid.is_empty() { rotated } else { valid };
        chosen
            .into_iter()
            .cloned()
            .map(Attempt::Key)
            .chain(std::iter::once(Attempt::ServerDefault))
            .collect()
    }

    /// After a successful attempt with `used_key`, start the next request
    /// at the following pool entry. No-op when the pool is empty or the key
    /// is not in the pool (a server-default success rotates nothing).
    pub fn advance_cursor(&mut self, used_key: &str) {
        if self.pool.is_empty() {
            return;
        }
        if let Some(index) = self.pool.iter().position(|key| key == used_key) {
            self.cursor = (index + 1) % self.pool.len();
        }
    }

    /// Mark a key unusable. Idempotent: re-marking refreshes the reason and
    /// timestamp.
    pub fn mark_invalid(&mut self, key: &str, reason: InvalidReason) {
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return;
        }
        self.invalid.insert(trimmed.to_string(), InvalidMark::now(reason));
    }

    /// Clear a key's invalid mark, if any. Idempotent.
    pub fn clear_invalid(&mut self, key: &str) {
        self.invalid.remove(key.trim());
    }

    /// Cursor clamped into the pool, defending against a stale persisted
    /// value after the pool shrank outside this process.
    fn clamped_cursor(&self) -> usize {
        if self.pool.is_empty() {
            0
        } else {
            self.cursor % self.pool.len()
        }
    }
}

fn normalize_pool(pool: Vec<String>) -> Vec<String> {
    pool.into_iter().map(|key| key.trim().to_string()).filter(|key| !key.is_empty()).collect()
}

/// Persistence boundary for [`RotationState`].
///
/// The dispatcher loads once per request and saves after each mutation;
/// policy code never touches storage.
#[async_trait::async_trait]
pub trait RotationStore: Send + Sync {
    async fn load(&self) -> Result<RotationState, ClientError>;
    async fn save(&self, state: &RotationState) -> Result<(), ClientError>;
}

/// JSON-file-backed store. A missing file loads as the empty state.
pub struct FileRotationStore {
    path: PathBuf,
}

impl FileRotationStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

#[async_trait::async_trait]
impl RotationStore for FileRotationStore {
    async fn load(&self) -> Result<RotationState, ClientError> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map_err(|e| ClientError::Storage(format!("corrupt rotation state: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RotationState::default()),
            Err(e) => Err(ClientError::Storage(e.to_string())),
        }
    }

    async fn save(&self, state: &RotationState) -> Result<(), ClientError> {
        let raw = serde_json::to_vec_pretty(state)
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ClientError::Storage(e.to_string()))?;
            }
        }
        tokio::fs::write(&self.path, raw).await.map_err(|e| ClientError::Storage(e.to_string()))
    }
}

/// In-memory store for tests and embedded use.
#[derive(Default)]
pub struct MemoryRotationStore {
    state: std::sync::Mutex<RotationState>,
}

impl MemoryRotationStore {
    pub fn new(state: RotationState) -> Self {
        Self { state: std::sync::Mutex::new(state) }
    }

    pub fn snapshot(&self) -> RotationState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl RotationStore for MemoryRotationStore {
    async fn load(&self) -> Result<RotationState, ClientError> {
        Ok(self.snapshot())
    }

    async fn save(&self, state: &RotationState) -> Result<(), ClientError> {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state.clone();
        Ok(())
    }
}
