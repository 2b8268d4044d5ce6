//! Session and credential abstractions.
//!
//! The connection manager never performs HTTP itself; it consumes a
//! `SessionProvider` to decide whether a connection may be attempted and a
//! `CredentialRefresher` to recover from invalid-session rejections. The
//! surrounding application wires these to its auth store.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::TmResult;

/// An authenticated session credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Bearer token presented in the authorization envelope.
    pub session_token: String,
    /// Token used to mint a new session token.
    pub refresh_token: String,
    /// Owning user id.
    pub user_id: i64,
}

/// Supplies the current credential, if any.
///
/// A `None` return means no connection attempt should be made at all.
pub trait SessionProvider: Send + Sync {
    /// The current credential, or None when logged out.
    fn get(&self) -> Option<Credential>;
}

/// Refreshes an expired credential.
///
/// The connection manager guarantees at most one refresh is in flight at
/// a time; implementations do not need their own guard.
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    /// Attempt to refresh the credential. Returns true if a new credential
    /// was installed and a reconnect should be attempted immediately.
    async fn refresh(&self) -> TmResult<bool>;
}

/// In-memory session store implementing both traits.
///
/// Used by tests and the CLI; the mobile shell wires its own persistent
/// store instead.
#[derive(Default)]
pub struct MemorySession {
    current: Mutex<Option<Credential>>,
    staged: Mutex<Option<Credential>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a credential (login).
    pub fn set(&self, credential: Credential) {
        *self.current.lock().unwrap() = Some(credential);
    }

    /// Remove the credential (logout).
    pub fn clear(&self) {
        *self.current.lock().unwrap() = None;
        *self.staged.lock().unwrap() = None;
    }

    /// Stage a credential to be installed by the next `refresh()` call.
    pub fn stage_refreshed(&self, credential: Credential) {
        *self.staged.lock().unwrap() = Some(credential);
    }
}

impl SessionProvider for MemorySession {
    fn get(&self) -> Option<Credential> {
        self.current.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialRefresher for MemorySession {
    async fn refresh(&self) -> TmResult<bool> {
        match self.staged.lock().unwrap().take() {
            Some(fresh) => {
                *self.current.lock().unwrap() = Some(fresh);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
