use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::protocol::ServerMessage;
use crate::session::ConnId;

/// Outbound queue for one socket. Sends are fire-and-forget; a closed
/// receiver means the writer task is gone and the frame is dropped.
pub type OutboundSender = mpsc::UnboundedSender<ServerMessage>;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RegistryError {
    #[error("username is unavailable")]
    NameTaken,
}

/// Live connection handle held by a registry entry. The registry does not
/// own the socket; it keeps the connection id and the outbound queue.
#[derive(Debug, Clone)]
pub struct UserHandle {
    pub conn: ConnId,
    pub tx: OutboundSender,
}

/// Process-wide name -> connection mapping; the sole source of truth for
/// who is online. Login's check-then-insert and disconnect's lookup must be
/// atomic across concurrently running connection tasks, so every access
/// goes through one mutex.
#[derive(Debug, Default)]
pub struct Registry {
    users: Mutex<HashMap<String, UserHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` for `handle`. On success returns the names registered
    /// before this login, for the new client's initial roster.
    pub fn register(&self, name: &str, handle: UserHandle) -> Result<Vec<String>, RegistryError> {
        let mut users = self.users.lock().unwrap();
        if users.contains_key(name) {
            return Err(RegistryError::NameTaken);
        }
        let roster = users.keys().cloned().collect();
        users.insert(name.to_string(), handle);
        Ok(roster)
    }

    pub fn lookup(&self, name: &str) -> Option<UserHandle> {
        self.users.lock().unwrap().get(name).cloned()
    }

    /// Idempotent; removing an absent name is a no-op.
    pub fn remove(&self, name: &str) -> Option<UserHandle> {
        self.users.lock().unwrap().remove(name)
    }

    /// Names of everyone currently registered except `exclude`.
    pub fn snapshot_names(&self, exclude: &str) -> Vec<String> {
        self.users
            .lock()
            .unwrap()
            .keys()
            .filter(|n| *n != exclude)
            .cloned()
            .collect()
    }

    /// (name, outbound queue) for every registered connection, used to build
    /// per-recipient roster broadcasts. The snapshot does not outlive one
    /// broadcast construction.
    pub fn roster_targets(&self) -> Vec<(String, OutboundSender)> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .map(|(name, handle)| (name.clone(), handle.tx.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
