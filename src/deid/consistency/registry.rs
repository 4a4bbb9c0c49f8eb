//! Long-lived pseudonym registries
//!
//! Registries are keyed by a salted fingerprint of the consistency key, so
//! neither memory dumps nor the persisted file contain the PHI value itself.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Shared fingerprint → token store
///
/// Implementations must serialize the read-then-conditional-insert for a
/// key, so concurrent documents agree on the first token issued.
pub trait PseudonymRegistry: Send + Sync {
    /// Returns the stored token for `fingerprint`, inserting `make()` first
    /// when there is none
    fn get_or_insert_with(&self, fingerprint: &str, make: &dyn Fn() -> String) -> Result<String>;

    /// Number of stored tokens
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes pending entries to durable storage, if any
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Process-local registry
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PseudonymRegistry for InMemoryRegistry {
    fn get_or_insert_with(&self, fingerprint: &str, make: &dyn Fn() -> String) -> Result<String> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("Pseudonym registry lock poisoned"))?;
        Ok(entries
            .entry(fingerprint.to_string())
            .or_insert_with(make)
            .clone())
    }

    fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    version: u32,
    entries: BTreeMap<String, String>,
}

const REGISTRY_VERSION: u32 = 1;

#[derive(Debug, Default)]
struct FileState {
    entries: BTreeMap<String, String>,
    dirty: bool,
}

/// Registry persisted as a JSON document
///
/// Entries are written on [`flush`](PseudonymRegistry::flush) and when the
/// registry is dropped.
#[derive(Debug)]
pub struct JsonFileRegistry {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl JsonFileRegistry {
    /// Opens the registry at `path`, starting empty if the file is absent
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path).with_context(|| {
                format!("Failed to read pseudonym registry: {}", path.display())
            })?;
            let file: RegistryFile = serde_json::from_str(&content).with_context(|| {
                format!("Failed to parse pseudonym registry: {}", path.display())
            })?;
            if file.version != REGISTRY_VERSION {
                anyhow::bail!(
                    "Unsupported pseudonym registry version {} in {}",
                    file.version,
                    path.display()
                );
            }
            file.entries
        } else {
            BTreeMap::new()
        };

        tracing::debug!(
            path = %path.display(),
            entries = entries.len(),
            "Opened pseudonym registry"
        );

        Ok(Self {
            path,
            state: Mutex::new(FileState {
                entries,
                dirty: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, state: &mut FileState) -> Result<()> {
        if !state.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create registry directory: {}", parent.display())
                })?;
            }
        }

        let file = RegistryFile {
            version: REGISTRY_VERSION,
            entries: state.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .context("Failed to serialize pseudonym registry")?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write registry: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace registry: {}", self.path.display()))?;

        state.dirty = false;
        Ok(())
    }
}

impl PseudonymRegistry for JsonFileRegistry {
    fn get_or_insert_with(&self, fingerprint: &str, make: &dyn Fn() -> String) -> Result<String> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("Pseudonym registry lock poisoned"))?;
        if let Some(token) = state.entries.get(fingerprint) {
            return Ok(token.clone());
        }
        let token = make();
        state.entries.insert(fingerprint.to_string(), token.clone());
        state.dirty = true;
        Ok(token)
    }

    fn len(&self) -> usize {
        self.state.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    fn flush(&self) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("Pseudonym registry lock poisoned"))?;
        self.write(&mut state)
    }
}

impl Drop for JsonFileRegistry {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to persist pseudonym registry"
            );
        }
    }
}
