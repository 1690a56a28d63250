mod db;
mod llm;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .expect("invalid PORT");

    let pool = db::init_pool(&database_url)
        .await
        .expect("database init failed");

    match services::session::purge_expired_sessions(&pool).await {
        Ok(purged) => tracing::info!(purged, "expired sessions removed"),
        Err(e) => tracing::warn!(error = %e, "expired session purge failed"),
    }

    // Initialize LLM client (non-fatal: chat disabled if config missing).
    let llm: Option<Arc<dyn llm::LlmChat>> = match llm::LlmClient::from_env() {
        Ok(client) => {
            tracing::info!(model = client.model(), "LLM client initialized");
            Some(Arc::new(client))
        }
        Err(e) => {
            tracing::warn!(error = %e, "LLM client not configured, chat disabled");
            None
        }
    };

    let google = services::auth::GoogleConfig::from_env();
    if google.is_none() {
        tracing::warn!(
            "GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET/GOOGLE_REDIRECT_URI not set, sign-in disabled"
        );
    }

    let mut state = state::AppState::new(pool, llm, google);
    if let Some(max_tokens) = std::env::var("CHAT_MAX_TOKENS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|n| *n > 0)
    {
        state = state.with_chat_max_tokens(max_tokens);
    }

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "betterchat listening");
    axum::serve(listener, app).await.expect("server failed");
}
