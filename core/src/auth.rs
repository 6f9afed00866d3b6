//! Credential storage and the session-expiry signal.
//!
//! # Design
//! The transport never touches ambient storage or navigation. It is handed a
//! `Session` at construction: outbound requests read the bearer credential
//! from it, and a 401 calls `Session::expire`, which clears the credential and
//! sends a `Redirect` to whoever hosts the client. Expiry happens once per
//! signed-in session no matter how many in-flight requests come back 401.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Route the host should navigate to once the session has expired.
pub const SIGN_IN_ROUTE: &str = "/auth/signin";

/// Storage key the credential is kept under.
pub const CREDENTIAL_KEY: &str = "token";

/// Where the bearer credential lives between requests.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn store(&self, token: &str);
    fn clear(&self);
}

/// Process-local credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: RwLock<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, token: &str) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
    }

    fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Credential persisted as the file `{dir}/token`, so a restarted host keeps
/// its session. I/O failures are logged and read as "no credential".
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(CREDENTIAL_KEY),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                (!token.is_empty()).then(|| token.to_string())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read credential");
                None
            }
        }
    }

    fn store(&self, token: &str) {
        let written = match self.path.parent() {
            Some(dir) => std::fs::create_dir_all(dir),
            None => Ok(()),
        }
        .and_then(|()| std::fs::write(&self.path, token));
        if let Err(err) = written {
            warn!(path = %self.path.display(), error = %err, "failed to persist credential");
        }
    }

    fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to remove credential");
            }
        }
    }
}

/// Instruction to the host application to navigate away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub route: &'static str,
}

pub type RedirectReceiver = mpsc::UnboundedReceiver<Redirect>;

struct SessionInner {
    store: Arc<dyn CredentialStore>,
    redirects: mpsc::UnboundedSender<Redirect>,
    // `true` once a redirect has been sent; re-armed by `sign_in`.
    expired: Mutex<bool>,
}

/// Shared handle to the credential and the redirect channel.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(store: Arc<dyn CredentialStore>) -> (Self, RedirectReceiver) {
        let (redirects, receiver) = mpsc::unbounded_channel();
        let session = Self {
            inner: Arc::new(SessionInner {
                store,
                redirects,
                expired: Mutex::new(false),
            }),
        };
        (session, receiver)
    }

    /// Session backed by a fresh `MemoryCredentialStore`.
    pub fn in_memory() -> (Self, RedirectReceiver) {
        Self::new(Arc::new(MemoryCredentialStore::new()))
    }

    pub fn credential(&self) -> Option<String> {
        self.inner.store.load()
    }

    pub fn sign_in(&self, token: &str) {
        let mut expired = self.lock_expired();
        self.inner.store.store(token);
        *expired = false;
        info!("credential stored");
    }

    /// Explicit logout: drop the credential, no redirect.
    pub fn logout(&self) {
        let _guard = self.lock_expired();
        self.inner.store.clear();
        info!("credential cleared on logout");
    }

    /// Handle a 401 for a request that carried `presented`.
    ///
    /// Returns `true` when this call cleared the credential and sent the
    /// redirect. A 401 for a credential that has since been replaced is
    /// ignored.
    pub fn expire(&self, presented: Option<&str>) -> bool {
        let mut expired = self.lock_expired();
        let current = self.inner.store.load();
        if current.is_some() && current.as_deref() != presented {
            debug!("ignoring 401 for a superseded credential");
            return false;
        }
        if *expired {
            return false;
        }
        self.inner.store.clear();
        *expired = true;
        info!(route = SIGN_IN_ROUTE, "session expired, redirecting to sign-in");
        // A dropped receiver means nobody is hosting navigation; nothing to do.
        let _ = self.inner.redirects.send(Redirect {
            route: SIGN_IN_ROUTE,
        });
        true
    }

    fn lock_expired(&self) -> std::sync::MutexGuard<'_, bool> {
        self.inner
            .expired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("signed_in", &self.credential().is_some())
            .finish()
    }
}
