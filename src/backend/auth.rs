//! Identity and bearer credential for backend calls.

use std::fmt;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors raised when credentials are incomplete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no signed-in identity")]
    MissingIdentity,
    #[error("no bearer credential")]
    MissingCredential,
}

impl AuthError {
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::MissingIdentity => "Please sign in before starting face capture.",
            AuthError::MissingCredential => "Your session has expired. Please sign in again.",
        }
    }
}

/// A complete identity and bearer token pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    identity: String,
    bearer: String,
}

impl Credentials {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn bearer(&self) -> &str {
        &self.bearer
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("bearer", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Default)]
struct AuthState {
    identity: Option<String>,
    bearer: Option<String>,
}

/// Shared authentication context owned by the embedding application.
///
/// Clones share state, so signing out is seen by a running session before
/// its next upload.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    state: Arc<RwLock<AuthState>>,
}

impl AuthContext {
    /// Creates a signed-in context.
    pub fn new(identity: impl Into<String>, bearer: impl Into<String>) -> Self {
        let context = Self::default();
        context.sign_in(identity, bearer);
        context
    }

    /// Creates a context with nobody signed in.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, identity: impl Into<String>, bearer: impl Into<String>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.identity = Some(identity.into());
        state.bearer = Some(bearer.into());
    }

    pub fn sign_out(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        *state = AuthState::default();
    }

    /// Returns the current credentials if both parts are present and non-empty.
    pub fn credentials(&self) -> Result<Credentials, AuthError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let identity = state
            .identity
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingIdentity)?;
        let bearer = state
            .bearer
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingCredential)?;
        Ok(Credentials {
            identity: identity.to_string(),
            bearer: bearer.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_has_no_credentials() {
        assert_eq!(
            AuthContext::anonymous().credentials(),
            Err(AuthError::MissingIdentity)
        );
    }

    #[test]
    fn test_empty_bearer_rejected() {
        let auth = AuthContext::new("user-1", "");
        assert_eq!(auth.credentials(), Err(AuthError::MissingCredential));
    }

    #[test]
    fn test_sign_out_shared_between_clones() {
        let auth = AuthContext::new("user-1", "token");
        let clone = auth.clone();
        assert_eq!(clone.credentials().unwrap().identity(), "user-1");

        auth.sign_out();
        assert!(clone.credentials().is_err());
    }

    #[test]
    fn test_debug_redacts_bearer() {
        let credentials = AuthContext::new("user-1", "secret").credentials().unwrap();
        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("secret"));
    }
}
