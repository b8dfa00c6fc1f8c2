use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use geofence_core::{Coordinate, GeofenceError, Zone, ZoneSnapshot};
use safety_tracking::{ActiveAlert, EngineError, EngineEvent, TrackedSubject};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;

type ApiResult<T> = Result<T, (StatusCode, String)>;

fn engine_error(e: EngineError) -> (StatusCode, String) {
    let status = match &e {
        EngineError::SessionEnded(_) => StatusCode::CONFLICT,
        EngineError::InvalidCoordinate { .. } | EngineError::Zone(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        EngineError::SubjectUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Source { .. } | EngineError::Dispatch { .. } => StatusCode::BAD_GATEWAY,
    };
    (status, e.to_string())
}

fn zone_error(e: GeofenceError) -> (StatusCode, String) {
    (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
}

// ============================================================================
// Zones
// ============================================================================

#[derive(Serialize)]
pub struct RegistryVersion {
    pub version: u64,
    pub zones: usize,
}

#[derive(Deserialize)]
pub struct LookupQuery {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Serialize)]
pub struct NearestBoundary {
    pub zone_id: String,
    pub distance_m: f64,
}

#[derive(Serialize)]
pub struct LookupResponse {
    pub point: Coordinate,
    /// `None` means open area
    pub zone: Option<Arc<Zone>>,
    pub nearest: Option<NearestBoundary>,
    pub version: u64,
}

pub async fn list_zones(State(state): State<AppState>) -> Json<Arc<ZoneSnapshot>> {
    Json(state.engine.registry().snapshot())
}

pub async fn load_zones(
    State(state): State<AppState>,
    Json(zones): Json<Vec<Zone>>,
) -> ApiResult<Json<RegistryVersion>> {
    let count = zones.len();
    let version = state.engine.load_zones(zones).map_err(engine_error)?;
    Ok(Json(RegistryVersion {
        version,
        zones: count,
    }))
}

pub async fn upsert_zone(
    State(state): State<AppState>,
    Json(zone): Json<Zone>,
) -> ApiResult<Json<RegistryVersion>> {
    let version = state.engine.upsert_zone(zone).map_err(engine_error)?;
    Ok(Json(RegistryVersion {
        version,
        zones: state.engine.registry().snapshot().len(),
    }))
}

/// Idempotent; 204 whether or not the zone existed
pub async fn remove_zone(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    state.engine.remove_zone(&id);
    StatusCode::NO_CONTENT
}

pub async fn lookup_zone(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> ApiResult<Json<LookupResponse>> {
    let point = Coordinate::new(query.lat, query.lng)
        .validate()
        .map_err(zone_error)?;

    let snapshot = state.engine.registry().snapshot();
    let zone = snapshot.lookup(&point).cloned();
    let nearest = snapshot.nearest(&point).map(|(z, distance_m)| NearestBoundary {
        zone_id: z.id.clone(),
        distance_m,
    });

    Ok(Json(LookupResponse {
        point,
        zone,
        nearest,
        version: snapshot.version(),
    }))
}

// ============================================================================
// Subjects
// ============================================================================

#[derive(Deserialize)]
pub struct LocationRequest {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct LocationResponse {
    /// Tracking start or zone transition caused by this fix
    pub event: Option<EngineEvent>,
}

#[derive(Deserialize)]
pub struct AlertRequest {
    pub alert_type: String,
}

#[derive(Deserialize, Default)]
pub struct AckRequest {
    pub by: Option<String>,
}

#[derive(Serialize)]
pub struct AckResponse {
    pub acknowledged: bool,
}

pub async fn location_update(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
    Json(req): Json<LocationRequest>,
) -> ApiResult<Json<LocationResponse>> {
    let at = req.timestamp.unwrap_or_else(Utc::now);
    let event = state
        .engine
        .location_update(&subject_id, Coordinate::new(req.lat, req.lng), at)
        .await
        .map_err(engine_error)?;
    Ok(Json(LocationResponse { event }))
}

pub async fn trigger_alert(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
    Json(req): Json<AlertRequest>,
) -> ApiResult<(StatusCode, Json<ActiveAlert>)> {
    let alert = state
        .engine
        .trigger_alert(&subject_id, &req.alert_type)
        .await
        .map_err(engine_error)?;
    Ok((StatusCode::CREATED, Json(alert)))
}

pub async fn acknowledge_alert(
    State(state): State<AppState>,
    Path((subject_id, alert_id)): Path<(String, Uuid)>,
    body: Option<Json<AckRequest>>,
) -> ApiResult<Json<AckResponse>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let by = req.by.unwrap_or_else(|| "operator".to_string());
    let acknowledged = state
        .engine
        .acknowledge(&subject_id, alert_id, &by)
        .await
        .map_err(engine_error)?;
    Ok(Json(AckResponse { acknowledged }))
}

pub async fn end_session(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> StatusCode {
    state.engine.end_session(&subject_id).await;
    StatusCode::NO_CONTENT
}

pub async fn get_subject(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> ApiResult<Json<TrackedSubject>> {
    state
        .engine
        .subject(&subject_id)
        .await
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("Subject {} not tracked", subject_id)))
}
