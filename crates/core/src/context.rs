//! Session context attached to log events
//!
//! Callers build a [`SessionContext`] explicitly and pass it with each event;
//! there is no ambient per-thread lookup.

use serde::{Deserialize, Serialize};

use crate::limits::{truncate_chars, MAX_CONTEXT_FIELD_CHARS};

/// Request/session identity of the caller that produced an event
///
/// Every field defaults to the empty string. An empty `username` marks a
/// system (non-user) event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionContext {
    /// Session identifier
    pub session_id: String,
    /// Request identifier
    pub request_id: String,
    /// Authenticated user, empty for system events
    pub username: String,
    /// Directory/profile domain of the user
    pub domain: String,
    /// Remote address of the request
    pub source_address: String,
}

impl SessionContext {
    /// Context with no fields set (system events)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builder: set session id
    pub fn with_session_id(mut self, value: impl Into<String>) -> Self {
        self.session_id = value.into();
        self
    }

    /// Builder: set request id
    pub fn with_request_id(mut self, value: impl Into<String>) -> Self {
        self.request_id = value.into();
        self
    }

    /// Builder: set username
    pub fn with_username(mut self, value: impl Into<String>) -> Self {
        self.username = value.into();
        self
    }

    /// Builder: set domain
    pub fn with_domain(mut self, value: impl Into<String>) -> Self {
        self.domain = value.into();
        self
    }

    /// Builder: set source address
    pub fn with_source_address(mut self, value: impl Into<String>) -> Self {
        self.source_address = value.into();
        self
    }

    /// Copy with every field cut to [`MAX_CONTEXT_FIELD_CHARS`]
    pub fn truncated(&self) -> Self {
        Self {
            session_id: truncate_chars(&self.session_id, MAX_CONTEXT_FIELD_CHARS),
            request_id: truncate_chars(&self.request_id, MAX_CONTEXT_FIELD_CHARS),
            username: truncate_chars(&self.username, MAX_CONTEXT_FIELD_CHARS),
            domain: truncate_chars(&self.domain, MAX_CONTEXT_FIELD_CHARS),
            source_address: truncate_chars(&self.source_address, MAX_CONTEXT_FIELD_CHARS),
        }
    }

    /// True when the event was produced on behalf of a user
    pub fn is_user_event(&self) -> bool {
        !self.username.is_empty()
    }
}
