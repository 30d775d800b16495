use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

mod client_ip;
mod config;
mod db;
mod device;
mod error;
mod geo;
mod journal;
mod routes;
mod visitor;

use geo::{IpGeolocator, IpInfoClient, NominatimClient, ReverseGeocoder};
use journal::VisitorJournal;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub tera: tera::Tera,
    pub journal: Arc<VisitorJournal>,
    pub ip_geo: Arc<dyn IpGeolocator>,
    pub reverse_geo: Arc<dyn ReverseGeocoder>,
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(routes::visitor::index))
        .route(
            "/submit-device-info",
            post(routes::visitor::submit_device_info),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();

    let config = config::AppConfig::from_env();
    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create DB pool");

    db::init_schema(&pool)
        .await
        .expect("Failed to create visitor table");

    let tera = tera::Tera::new(&config.template_glob).expect("Failed to load templates");

    let journal = Arc::new(VisitorJournal::new(config.log_dir.clone()));
    tracing::info!("Writing visitor logs to {}", journal.dir().display());

    let ip_geo: Arc<dyn IpGeolocator> = Arc::new(IpInfoClient::new(
        config.ipinfo_base_url.clone(),
        config.ip_lookup_timeout(),
    ));

    let reverse_geo: Arc<dyn ReverseGeocoder> = Arc::new(NominatimClient::new(
        config.nominatim_base_url.clone(),
        config.geocoder_user_agent.clone(),
        config.reverse_geocode_timeout(),
    ));

    let state = AppState {
        db: pool,
        tera,
        journal,
        ip_geo,
        reverse_geo,
    };

    let app = build_router(state);

    let addr = config.listen_addr();
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install signal handler");
    tracing::info!("Shutting down...");
}
