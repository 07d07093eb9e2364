//! Autoform Web 服务
//!
//! 提供任务提交、队列查询、人工回答、日志下载与 SSE 推送。
//! 运行：`cargo run --bin autoform-web --features "web browser"`

#![cfg(feature = "web")]

use std::net::SocketAddr;

use anyhow::Context;
use autoform::{api, app, config::load_config, observability};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let launcher = app::build_launcher(&cfg)?;
    let orchestrator = app::build_orchestrator(&cfg, launcher);

    let addr: SocketAddr = cfg
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid server.bind: {}", cfg.server.bind))?;
    let router = api::router(orchestrator.clone());

    tracing::info!("Autoform web listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            orchestrator.shutdown();
        })
        .await?;
    Ok(())
}
