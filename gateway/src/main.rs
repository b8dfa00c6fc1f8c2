use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Json, Router,
};
use geofence_core::ZoneRegistry;
use safety_tracking::{
    EngineConfig, EscalationDispatcher, LogSink, RegistryRefresher, SafetyEngine, ZoneSource,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod routes;
mod sources;
mod stream;

use sources::{FileZoneSource, HttpZoneSource};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SafetyEngine>,
}

pub fn app(state: AppState) -> Router {
    let zone_routes = Router::new()
        .route(
            "/zones",
            get(routes::list_zones)
                .put(routes::load_zones)
                .post(routes::upsert_zone),
        )
        .route("/zones/lookup", get(routes::lookup_zone))
        .route("/zones/:id", axum::routing::delete(routes::remove_zone))
        .route("/subjects/:id", get(routes::get_subject).delete(routes::end_session))
        .route("/subjects/:id/location", post(routes::location_update))
        .route("/subjects/:id/alerts", post(routes::trigger_alert))
        .route(
            "/subjects/:id/alerts/:alert_id/ack",
            post(routes::acknowledge_alert),
        )
        .route("/events", get(stream::events_ws))
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", zone_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

fn zone_source() -> Option<Arc<dyn ZoneSource>> {
    if let Ok(url) = std::env::var("SAFETY_ZONES_URL") {
        tracing::info!("   Zone feed: {}", url);
        return Some(Arc::new(HttpZoneSource::new(url)));
    }
    if let Ok(path) = std::env::var("SAFETY_ZONES_PATH") {
        tracing::info!("   Zone file: {}", path);
        return Some(Arc::new(FileZoneSource::new(path)));
    }
    None
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "safety_gateway=debug,safety_tracking=info,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::from_env();
    let registry = Arc::new(ZoneRegistry::new());
    let engine = Arc::new(SafetyEngine::new(registry.clone(), config.clone()));

    EscalationDispatcher::new()
        .with_sink(Arc::new(LogSink))
        .spawn(engine.escalations());

    match zone_source() {
        Some(source) => {
            let refresher = RegistryRefresher::new(
                source,
                registry.clone(),
                engine.event_sender(),
                config.refresh_timeout,
            );
            refresher.refresh_once().await;
            refresher.spawn(config.refresh_interval);
        }
        None => tracing::warn!("   No zone source configured; registry starts empty"),
    }

    let app = app(AppState { engine });

    let port = std::env::var("SAFETY_GATEWAY_PORT")
        .or_else(|_| std::env::var("PORT"))
        .unwrap_or_else(|_| "18700".to_string());
    let addr = format!("0.0.0.0:{}", port);

    tracing::info!("Safety Gateway starting on {}", addr);
    tracing::info!("   Zones loaded: {}", registry.snapshot().len());
    tracing::info!("   SOS ack timeout: {:?}", config.ack_timeout);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "safety-gateway",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
