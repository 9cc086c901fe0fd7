//! Authenticated session context handed to the sync engine.

use crate::util::normalize_text_option;

/// Bearer token and user identity of the signed-in user
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Session {
    pub token: String,
    pub user_id: String,
}

impl Session {
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
        }
    }

    /// Session with no credentials; the engine never contacts the server for it
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Whether a usable bearer token is present
    pub fn is_authenticated(&self) -> bool {
        normalize_text_option(Some(self.token.clone())).is_some()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Session")
            .field("token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .finish()
    }
}
