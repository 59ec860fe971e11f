use std::process;
use std::sync::Arc;

use tracing::{error, info};

use lifespan::server::{router, AppState};
use lifespan::settings::Settings;
use lifespan::timeline::Database;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "could not read settings");
            process::exit(1);
        }
    };
    let db = match Database::new(settings.persistence_mode()) {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "could not open the timeline");
            process::exit(1);
        }
    };

    let app = router(AppState::new(Arc::new(db)));
    info!(bind = %settings.server.bind, "lifespan listening");
    let listener = tokio::net::TcpListener::bind(&settings.server.bind)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
