//! Script storage seam.
//!
//! Party specifications are addressed by content hash. Upload and CRUD live
//! outside the core; the core only ever loads by hash through this trait.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script `{0}` not found")]
    NotFound(String),
    #[error("failed to read script: {0}")]
    Io(String),
}

#[async_trait]
pub trait ScriptStore: Send + Sync {
    async fn load(&self, hash: &str) -> Result<String, ScriptError>;
}

/// Scripts stored as files named by their hash under one directory.
pub struct FsScriptStore {
    dir: PathBuf,
}

impl FsScriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ScriptStore for FsScriptStore {
    async fn load(&self, hash: &str) -> Result<String, ScriptError> {
        // Hashes arrive from the wire; keep lookups inside the directory.
        if hash.is_empty() || hash.contains(['/', '\\', '.']) {
            return Err(ScriptError::NotFound(hash.to_string()));
        }

        let path = self.dir.join(hash);
        tokio::fs::read_to_string(&path).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                ScriptError::NotFound(hash.to_string())
            } else {
                ScriptError::Io(err.to_string())
            }
        })
    }
}

/// In-memory store, used by tests and embedded setups.
#[derive(Default)]
pub struct MemoryScriptStore {
    scripts: RwLock<HashMap<String, String>>,
}

impl MemoryScriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, hash: impl Into<String>, text: impl Into<String>) {
        self.scripts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hash.into(), text.into());
    }
}

#[async_trait]
impl ScriptStore for MemoryScriptStore {
    async fn load(&self, hash: &str) -> Result<String, ScriptError> {
        self.scripts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(hash)
            .cloned()
            .ok_or_else(|| ScriptError::NotFound(hash.to_string()))
    }
}
