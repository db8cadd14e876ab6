use stocksage::{app, config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "stocksage=debug,axum=info,tower_http=info".to_string());
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
    tracing::info!(
        content_dir = %config.content.dir.display(),
        model = %config.analysis.model,
        protect_content_routes = config.server.protect_content_routes,
        "configuration loaded"
    );

    let server = config.server.clone();
    let app_state = AppState::init(config).await?;
    let app = app::build_app(app_state);

    app::serve(app, &server).await
}
