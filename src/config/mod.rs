//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, from --config or RPC_GATEWAY_CONFIG)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_default, ConfigError};
pub use schema::{
    CredentialsConfig, GatewayConfig, HandlerConfig, ListenerConfig, MergeConfig,
    ObservabilityConfig, SpillConfig,
};
pub use validation::ValidationError;
