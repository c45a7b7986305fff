//! Outbound Basic-auth credential layer.
//!
//! # Responsibilities
//! - Produce the `authorization` metadata for each outbound call
//! - Prefer credentials forwarded from the inbound request
//! - Fall back to the statically configured credential
//!
//! # Design Decisions
//! - Basic auth is not secure by itself, so transport security is required
//!   unless the credential was explicitly built as insecure

use std::collections::BTreeMap;

use crate::config::CredentialsConfig;
use crate::rpc::context::{BasicAuth, CallContext};

/// Metadata key the credential is sent under.
pub const AUTHORIZATION: &str = "authorization";

/// Per-call credentials for the outbound RPC connection.
#[derive(Debug, Clone, Default)]
pub struct BasicAuthCredentials {
    fallback: Option<BasicAuth>,
    insecure: bool,
}

impl BasicAuthCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            fallback: Some(BasicAuth::new(username, password)),
            insecure: false,
        }
    }

    /// Credentials that do not demand a secure transport.
    pub fn insecure(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            fallback: Some(BasicAuth::new(username, password)),
            insecure: true,
        }
    }

    /// No static credential; only forwarded ones are sent.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_config(config: &CredentialsConfig) -> Self {
        let mut creds = match (&config.username, &config.password) {
            (Some(user), pass) => Self::new(user.clone(), pass.clone().unwrap_or_default()),
            (None, _) => Self::none(),
        };
        creds.insecure = config.insecure;
        creds
    }

    pub fn require_transport_security(&self) -> bool {
        !self.insecure
    }

    /// Metadata to attach to a call made with `ctx`.
    pub fn request_metadata(&self, ctx: &CallContext) -> BTreeMap<String, String> {
        let mut md = BTreeMap::new();
        if let Some(auth) = ctx.basic_auth().or(self.fallback.as_ref()) {
            md.insert(AUTHORIZATION.to_string(), auth.joined());
        }
        md
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarded_credentials_win() {
        let creds = BasicAuthCredentials::new("static", "pw");
        let ctx = CallContext::new().with_basic_auth(BasicAuth::new("alice", "secret"));
        let md = creds.request_metadata(&ctx);
        assert_eq!(md.get(AUTHORIZATION).map(String::as_str), Some("alice:secret"));
    }

    #[test]
    fn test_static_fallback() {
        let creds = BasicAuthCredentials::new("static", "pw");
        let md = creds.request_metadata(&CallContext::new());
        assert_eq!(md.get(AUTHORIZATION).map(String::as_str), Some("static:pw"));
        assert!(creds.require_transport_security());
    }

    #[test]
    fn test_no_credentials() {
        let creds = BasicAuthCredentials::none();
        assert!(creds.request_metadata(&CallContext::new()).is_empty());
        assert!(!BasicAuthCredentials::insecure("a", "b").require_transport_security());
    }
}
