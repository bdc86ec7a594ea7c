use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

/// Opaque identity of the authenticated user/tenant/role a tab runs under.
/// Supplied by the environment; only ever compared for equality.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionScope(String);

impl SessionScope {
    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionScope {
    fn from(scope: &str) -> Self {
        Self(scope.to_string())
    }
}

impl fmt::Debug for SessionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionScope({})", self.0)
    }
}

impl fmt::Display for SessionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sticky "the server said this session is dead" flag.
///
/// Clones share one flag. The application flips it; the engine only reads it
/// before every network-gated operation.
#[derive(Debug, Clone, Default)]
pub struct AuthGuard {
    invalid: Arc<AtomicBool>,
}

impl AuthGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&self) {
        self.invalid.store(true, Ordering::SeqCst);
    }

    pub fn restore(&self) {
        self.invalid.store(false, Ordering::SeqCst);
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid.load(Ordering::SeqCst)
    }
}

/// Everything a tab knows about who it is running as.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub scope: SessionScope,
    pub auth: AuthGuard,
}

impl SessionContext {
    pub fn new(scope: impl Into<SessionScope>) -> Self {
        Self {
            scope: scope.into(),
            auth: AuthGuard::new(),
        }
    }

    pub fn with_auth(scope: impl Into<SessionScope>, auth: AuthGuard) -> Self {
        Self {
            scope: scope.into(),
            auth,
        }
    }
}
