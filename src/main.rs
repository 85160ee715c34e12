//! Taskhub - Project and Task Tracking Service
//!
//! A multi-tenant tracker for projects, Kanban boards, tasks and todos.
//!
//! ## Architecture
//!
//! - **Users**: Sign up with email verification, own projects and todos
//! - **Projects**: Personal or collaborative, with custom Kanban boards
//! - **Collaboration**: Managers and developers with role-derived permissions
//! - **Tasks**: Per-project serial numbers, status state machine, comments

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = taskhub::Config::from_env();

    info!(
        database = config.database_url.as_str(),
        bind_address = config.bind_address.as_str(),
        "Starting Taskhub service"
    );

    let db = taskhub::Database::new(&config.database_url).await?;
    let bind_address = config.bind_address.clone();
    let state = taskhub::AppState::new(db, Arc::new(taskhub::LogNotifier), config);
    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api", taskhub::routes())
        .with_state(state);

    info!("Listening on {}", bind_address);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
