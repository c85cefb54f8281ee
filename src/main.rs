use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod routes;
mod upstream;

use config::Config;
use routes::{create_router, AppState};
use upstream::client::OpenWeatherClient;
use upstream::gateway::WeatherGateway;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tekitempest=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Missing API key is startup-fatal
    let config = Config::from_env()?;

    let client = OpenWeatherClient::new(&config)?;
    let gateway = Arc::new(WeatherGateway::new(
        client,
        Duration::from_secs(config.cache_ttl_secs),
    ));

    // Periodic sweep bounds memory; expiry-on-read is what keeps stale
    // entries invisible.
    let sweeper = Arc::clone(&gateway);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            sweeper.cache().purge_expired();
        }
    });

    let addr = format!("0.0.0.0:{}", config.port);

    let state = AppState { gateway };

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("TekiTempest API is running on http://{addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
