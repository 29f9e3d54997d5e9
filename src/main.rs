use anyhow::Context;
use responses_adapter::config::AdapterConfig;
use responses_adapter::server::build_router;
use responses_adapter::util::{init_tracing, AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AdapterConfig::from_env().context("loading configuration")?;

    if config.upstream_api_key.is_some() {
        tracing::info!("Auth mode: managed (configured upstream key injected on every call)");
    } else {
        tracing::info!("Auth mode: passthrough (client Authorization forwarded upstream)");
    }
    if config.http_timeout.is_none() {
        tracing::info!("No upstream timeout configured; hung upstream streams are held open");
    }

    let addr = config.bind_addr.clone();
    tracing::info!(upstream = %config.upstream_base_url, "Upstream configured");

    let app = build_router(Arc::new(AppState::new(config)));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("responses-adapter listening on http://{}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
