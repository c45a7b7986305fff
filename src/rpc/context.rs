//! Per-call context handed to the dispatch table.
//!
//! # Responsibilities
//! - Carry the call deadline (explicit or defaulted)
//! - Carry inbound HTTP Basic credentials under a reserved slot
//! - Carry the request id for log correlation
//!
//! # Design Decisions
//! - Immutable builder style: each `with_*` returns a new context
//! - Credentials are stored as `user:pass`, the shape the outbound layer forwards

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Name of the context slot holding inbound Basic credentials.
pub const BASIC_AUTH_KEY: &str = "authorization-basic";

/// Username and password taken from an inbound request.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The `user:pass` form forwarded as call metadata.
    pub fn joined(&self) -> String {
        format!("{}:{}", self.username, self.password)
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Context of one outbound invocation.
#[derive(Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    basic_auth: Option<BasicAuth>,
    request_id: Option<String>,
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("request_id", &self.request_id)
            .field("remaining", &self.remaining())
            .field(BASIC_AUTH_KEY, &self.basic_auth)
            .finish()
    }
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_basic_auth(mut self, auth: BasicAuth) -> Self {
        self.basic_auth = Some(auth);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn basic_auth(&self) -> Option<&BasicAuth> {
        self.basic_auth.as_ref()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Time left before the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}
