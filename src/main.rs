//! wardenio HTTP server entry point.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::Method;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use wardenio_kernel::config::Config;
use wardenio_kernel::scheduler;
use wardenio_kernel::session;
use wardenio_kernel::state::AppState;

#[derive(Parser)]
#[command(name = "wardenio", about = "Multi-tenant OIDC/OAuth2 token engine")]
struct Cli {
    /// Run database migrations and exit, without starting the server.
    #[arg(long)]
    migrate_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let config = Config::from_env().context("failed to load configuration")?;
    info!(port = config.port, "Configuration loaded");

    let state = AppState::new(config.clone())
        .await
        .context("failed to initialize application state")?;
    info!("Database and Redis connections established");

    if cli.migrate_only {
        info!("migrations applied, exiting (--migrate-only)");
        return Ok(());
    }

    let session_layer = session::create_session_layer(&config.redis_url, config.cookies_secure())
        .await
        .context("failed to create session layer")?;

    let cors = build_cors_layer();

    let app = Router::new()
        .merge(wardenio_kernel::routes::oidc::router(state.clone()))
        .merge(wardenio_kernel::routes::broker::router())
        .merge(wardenio_kernel::routes::admin::router(state.clone()))
        .merge(wardenio_kernel::routes::health::router())
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    tokio::spawn(scheduler::run_forever(state));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind to address")?;

    info!(%addr, "Server listening");

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

/// Any-origin CORS with credentials disabled, appropriate for a
/// bearer-token API with no first-party cookie consumers outside the
/// login-flow collaborator (which sets its own narrower policy).
fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
