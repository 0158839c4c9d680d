use std::{net::Ipv4Addr, sync::Arc};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use todo_search::config::Config;
use todo_search::weather::WeatherClient;
use todo_search::{auth, create_app, db, seed, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().expect("valid configuration");

    let db = db::open(&config.database).expect("initializing database");
    match db::cleanup_expired_sessions(&db, auth::unix_now()) {
        Ok(purged) => info!(purged, "Removed expired sessions"),
        Err(err) => warn!(error = %err, "Failed to remove expired sessions"),
    }

    if let Some(count) = config.seed_users {
        let pool = db.clone();
        let batch_size = config.seed_batch_size;
        let seeded = tokio::task::spawn_blocking(move || {
            if db::count_users(&pool)? > 0 {
                info!("Users already present, skipping seeding");
                return Ok(0);
            }
            seed::seed_users(&pool, count, batch_size)
        })
        .await
        .expect("seeding task panicked");
        if let Err(err) = seeded {
            warn!(error = %err, "Failed to seed users");
        }
    }

    let weather = match &config.weather_url {
        Some(url) => WeatherClient::remote(url.clone()),
        None => WeatherClient::fixed(config.weather.clone()),
    };

    let state = AppState {
        db,
        weather: Arc::new(weather),
        base_path: Arc::new(config.base_path.clone()),
    };
    let app = create_app(state);
    let addr = (Ipv4Addr::UNSPECIFIED, config.port);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind port");

    info!("running on {addr:?}");

    axum::serve(listener, app).await.expect("failed serving");
}
