//! Protocol-bridging RPC gateway library.

pub mod codec;
pub mod config;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod merge;
pub mod observability;
pub mod pool;
pub mod resilience;
pub mod rpc;
pub mod services;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use rpc::{DispatchTable, MethodTable};
