//! Observable credential store. Login and logout anywhere in the
//! application go through here, and the notification client reacts to the
//! change instead of polling for it.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone)]
pub struct CredentialStore {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.set(token);
        store
    }

    /// Store a new token. Setting the same token again does not notify.
    pub fn set(&self, token: impl Into<String>) {
        let token = Some(token.into());
        self.tx.send_if_modified(|current| {
            if *current == token {
                return false;
            }
            *current = token;
            true
        });
    }

    /// Remove the token (logout).
    pub fn clear(&self) {
        self.tx.send_if_modified(|current| current.take().is_some());
    }

    pub fn current(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("present", &self.tx.borrow().is_some())
            .finish()
    }
}
