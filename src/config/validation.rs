//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, paths and value ranges
//! - Check that the spill directory exists
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::GatewayConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("gateway.xmlrpc_path must be a literal path under '/' other than / and /health, got {0:?}")]
    XmlRpcPath(String),

    #[error("spill.directory {0:?} is not a directory")]
    SpillDirectory(String),

    #[error("observability.log_format must be \"pretty\" or \"json\", got {0:?}")]
    LogFormat(String),

    #[error("credentials.password is set without credentials.username")]
    PasswordWithoutUser,
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    for (field, value) in [
        ("listener.max_connections", config.listener.max_connections),
        ("listener.max_body_size", config.listener.max_body_size),
        ("gateway.stream_buffer", config.gateway.stream_buffer),
        ("merge.flush_threshold_bytes", config.merge.flush_threshold_bytes),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    let path = config.gateway.xmlrpc_path.as_str();
    if !path.starts_with('/') || path == "/" || path == "/health" || path.contains(['{', '}']) {
        errors.push(ValidationError::XmlRpcPath(config.gateway.xmlrpc_path.clone()));
    }

    if let Some(dir) = &config.spill.directory {
        if !dir.is_dir() {
            errors.push(ValidationError::SpillDirectory(dir.display().to_string()));
        }
    }

    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::LogFormat(config.observability.log_format.clone()));
    }

    if config.credentials.password.is_some() && config.credentials.username.is_none() {
        errors.push(ValidationError::PasswordWithoutUser);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.listener.max_body_size = 0;
        config.gateway.xmlrpc_path = "xmlrpc".into();
        config.spill.directory = Some("/definitely/not/here".into());
        config.credentials.password = Some("pw".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::Zero {
            field: "listener.max_body_size"
        }));
        assert!(errors.contains(&ValidationError::XmlRpcPath("xmlrpc".into())));
        assert!(errors.contains(&ValidationError::PasswordWithoutUser));
    }

    #[test]
    fn test_xmlrpc_path_cannot_shadow_builtin_routes() {
        let mut config = GatewayConfig::default();
        for path in ["/", "/health", "/rpc/{name}"] {
            config.gateway.xmlrpc_path = path.into();
            assert_eq!(
                validate_config(&config),
                Err(vec![ValidationError::XmlRpcPath(path.into())])
            );
        }
        config.gateway.xmlrpc_path = "/RPC2".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_metrics_address_ignored_when_disabled() {
        let mut config = GatewayConfig::default();
        config.observability.metrics_address = "bad".into();
        assert!(validate_config(&config).is_err());
        config.observability.metrics_enabled = false;
        assert!(validate_config(&config).is_ok());
    }
}
