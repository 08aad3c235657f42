use std::error::Error;
use std::sync::Arc;
use studydesk_server::{
    auth::AdminGuard,
    persist::SaveFile,
    routes::map_routes,
    settings::Settings,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // A missing .env is fine; real env vars win over it.
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = Settings::load()?;

    // ── Boot the World ─────────────────────────────────────────
    let save_file = SaveFile::open(&settings.data_file)?;
    let world = save_file.load_world()?;
    tracing::info!(
        tasks = world.tasks.len(),
        file = %save_file.path().display(),
        "world loaded"
    );

    let admin = AdminGuard::new(settings.admin_token.as_deref())
        .map_err(|e| format!("cannot hash admin token: {e}"))?;
    if settings.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN not set, admin endpoints are disabled");
    }

    // ── Shared state ───────────────────────────────────────────
    let state: SharedState = Arc::new(AppState::new(settings, save_file, world, admin)?);
    match state.llm_client()? {
        Some(client) => tracing::info!(provider = ?client.provider(), model = client.model(), "assistant llm enabled"),
        None => tracing::info!("no LLM_API_KEY, assistant runs on rules only"),
    }

    // ── Start ──────────────────────────────────────────────────
    let addr = state.settings.bind_addr();
    let app = map_routes(state.clone());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("server running on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn init_tracing() {
    #[cfg(feature = "profile-console")]
    console_subscriber::init();

    #[cfg(not(feature = "profile-console"))]
    {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("studydesk_server=info,tower_http=info"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
