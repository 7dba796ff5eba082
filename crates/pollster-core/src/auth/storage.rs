//! Durable key/value slots backing the session store.
//!
//! A backend only needs to read one slot and apply a batch of changes.
//! Batches let the file backend persist a whole session in one write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::debug;

/// A single slot change: `Some(value)` stores, `None` removes.
pub type SlotChange<'a> = (&'a str, Option<&'a str>);

pub trait SlotStorage: Send + Sync {
    /// Read a slot. A missing slot is `Ok(None)`, not an error.
    fn read(&self, slot: &str) -> Result<Option<String>>;

    /// Apply a batch of changes.
    fn write(&self, changes: &[SlotChange<'_>]) -> Result<()>;
}

/// In-process storage. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build storage pre-populated with the given slots
    pub fn with_slots<'a>(slots: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let map = slots
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            slots: Mutex::new(map),
        }
    }
}

impl SlotStorage for MemoryStorage {
    fn read(&self, slot: &str) -> Result<Option<String>> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;
        Ok(slots.get(slot).cloned())
    }

    fn write(&self, changes: &[SlotChange<'_>]) -> Result<()> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;
        apply_changes(&mut slots, changes);
        Ok(())
    }
}

/// Slots stored as one JSON object on disk.
///
/// The file is read once when opened and rewritten on every change, so a
/// session written by one run is visible to the next.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    slots: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open the slot file at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let slots = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read session file {}", path.display()))?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse session file {}", path.display()))?
            }
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), slots = slots.len(), "Session file opened");

        Ok(Self {
            path,
            slots: Mutex::new(slots),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, slots: &BTreeMap<String, String>) -> Result<()> {
        if slots.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).context("Failed to remove session file")?;
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a crash never leaves a half-written session
        let tmp = self.path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(slots)?;
        std::fs::write(&tmp, contents).context("Failed to write session file")?;
        std::fs::rename(&tmp, &self.path).context("Failed to replace session file")?;
        Ok(())
    }
}

impl SlotStorage for FileStorage {
    fn read(&self, slot: &str) -> Result<Option<String>> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| anyhow::anyhow!("file storage lock poisoned"))?;
        Ok(slots.get(slot).cloned())
    }

    fn write(&self, changes: &[SlotChange<'_>]) -> Result<()> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| anyhow::anyhow!("file storage lock poisoned"))?;
        apply_changes(&mut slots, changes);
        self.persist(&slots)
    }
}

fn apply_changes(slots: &mut BTreeMap<String, String>, changes: &[SlotChange<'_>]) {
    for (slot, value) in changes {
        match value {
            Some(v) => {
                slots.insert(slot.to_string(), v.to_string());
            }
            None => {
                slots.remove(*slot);
            }
        }
    }
}
