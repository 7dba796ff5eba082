use anyhow::{Context, Result};
use keyring::Entry;

use super::storage::{SlotChange, SlotStorage};

/// Default keychain service name
pub const SERVICE_NAME: &str = "pollster";

/// Session slots kept in the OS keychain, one entry per slot.
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, slot: &str) -> Result<Entry> {
        Entry::new(&self.service, slot).context("Failed to create keyring entry")
    }
}

impl Default for KeyringStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotStorage for KeyringStorage {
    fn read(&self, slot: &str) -> Result<Option<String>> {
        match self.entry(slot)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read slot from keychain"),
        }
    }

    fn write(&self, changes: &[SlotChange<'_>]) -> Result<()> {
        for (slot, value) in changes {
            let entry = self.entry(slot)?;
            match value {
                Some(v) => entry
                    .set_password(v)
                    .context("Failed to store slot in keychain")?,
                None => match entry.delete_credential() {
                    Ok(()) | Err(keyring::Error::NoEntry) => {}
                    Err(e) => return Err(e).context("Failed to delete slot from keychain"),
                },
            }
        }
        Ok(())
    }
}
