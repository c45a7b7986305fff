//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use rpc_gateway::config::GatewayConfig;
use rpc_gateway::services::demo;
use rpc_gateway::{DispatchTable, HttpServer, Shutdown};

/// A gateway serving on an ephemeral local port; stops when dropped.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Defaults suitable for tests: loopback listener, no metrics exporter.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.observability.metrics_enabled = false;
    config
}

pub async fn start_gateway(config: GatewayConfig, table: Arc<dyn DispatchTable>) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let server = HttpServer::new(config, table);
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap();
    TestGateway {
        addr,
        client,
        shutdown,
    }
}

/// Gateway over the built-in demo service.
pub async fn start_demo(config: GatewayConfig) -> TestGateway {
    start_gateway(config, Arc::new(demo::table())).await
}
