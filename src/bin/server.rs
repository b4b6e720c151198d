//! Sleuth 网关服务
//!
//! 启动: cargo run --bin sleuth-server
//! WebSocket: ws://<host>:<port>/ws?session_id=..；JSON API: /api/*

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use sleuth::agent::create_research_components;
use sleuth::config::load_config;
use sleuth::gateway::{serve, SessionRegistry};
use sleuth::observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let components = create_research_components(&cfg)
        .await
        .context("Failed to create research components")?;
    let registry = Arc::new(SessionRegistry::with_timeout(
        components,
        Duration::from_secs(cfg.server.session_timeout_secs),
    ));

    // 端口可用 SLEUTH_PORT 临时覆盖
    let mut server = cfg.server.clone();
    if let Some(port) = std::env::var("SLEUTH_PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
        server.port = port;
    }
    serve(&server.bind_addr(), registry).await
}
