use std::sync::Mutex;

use tokio::sync::watch;
use tracing::{debug, warn};

use super::storage::SlotStorage;

/// Storage slot holding the access token
pub const ACCESS_TOKEN_SLOT: &str = "authToken";

/// Storage slot holding the refresh token
pub const REFRESH_TOKEN_SLOT: &str = "refreshToken";

/// Storage slot holding the signed-in username
pub const USERNAME_SLOT: &str = "username";

/// Client-held credentials. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub username: Option<String>,
}

impl Session {
    /// Both tokens present. A partial session counts as logged out.
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.username.is_none()
    }
}

/// Process-wide session store over a durable slot backend.
///
/// Every `set` and `clear` publishes the resulting session on a watch
/// channel so the presentation layer can refresh its logged-in state.
pub struct SessionStore {
    storage: Box<dyn SlotStorage>,
    write_lock: Mutex<()>,
    changes: watch::Sender<Session>,
}

impl SessionStore {
    pub fn new(storage: Box<dyn SlotStorage>) -> Self {
        let (changes, _) = watch::channel(Session::default());
        let store = Self {
            storage,
            write_lock: Mutex::new(()),
            changes,
        };
        // Seed the channel with whatever the backend already holds
        let initial = store.get();
        store.changes.send_replace(initial);
        store
    }

    /// Read the current session. Unreadable slots read as absent.
    pub fn get(&self) -> Session {
        Session {
            access_token: self.read_slot(ACCESS_TOKEN_SLOT),
            refresh_token: self.read_slot(REFRESH_TOKEN_SLOT),
            username: self.read_slot(USERNAME_SLOT),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.read_slot(ACCESS_TOKEN_SLOT)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read_slot(REFRESH_TOKEN_SLOT)
    }

    pub fn username(&self) -> Option<String> {
        self.read_slot(USERNAME_SLOT)
    }

    /// Overwrite all three slots in one backend write
    pub fn set(&self, access: &str, refresh: &str, username: Option<&str>) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let changes = [
            (ACCESS_TOKEN_SLOT, Some(access)),
            (REFRESH_TOKEN_SLOT, Some(refresh)),
            (USERNAME_SLOT, username),
        ];
        if let Err(e) = self.storage.write(&changes) {
            warn!(error = %e, "Failed to persist session");
        }
        debug!(has_username = username.is_some(), "Session updated");

        self.changes.send_replace(Session {
            access_token: Some(access.to_string()),
            refresh_token: Some(refresh.to_string()),
            username: username.map(str::to_string),
        });
    }

    /// Remove all three slots
    pub fn clear(&self) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let changes = [
            (ACCESS_TOKEN_SLOT, None),
            (REFRESH_TOKEN_SLOT, None),
            (USERNAME_SLOT, None),
        ];
        if let Err(e) = self.storage.write(&changes) {
            warn!(error = %e, "Failed to clear persisted session");
        }
        debug!("Session cleared");

        self.changes.send_replace(Session::default());
    }

    /// Observe session changes. The receiver always holds the latest session.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.changes.subscribe()
    }

    fn read_slot(&self, slot: &str) -> Option<String> {
        match self.storage.read(slot) {
            Ok(value) => value,
            Err(e) => {
                warn!(slot, error = %e, "Failed to read session slot");
                None
            }
        }
    }
}
