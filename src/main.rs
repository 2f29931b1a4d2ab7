mod app;
mod auth;
mod config;
mod error;
mod state;

use crate::{config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "authsvc=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let port = config.port;
    let base_url = config.base_url.clone();
    tracing::info!(platform = %config.platform, production = config.is_production(), "configuration loaded");

    let (app_state, db) = AppState::init(config).await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let app = app::build_app(app_state)?;
    app::serve(app, port, &base_url).await
}
