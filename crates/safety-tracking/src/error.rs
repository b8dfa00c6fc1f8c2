use geofence_core::GeofenceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Tracking session for {0} has ended")]
    SessionEnded(String),
    #[error("Location out of range: ({lat}, {lng})")]
    InvalidCoordinate { lat: f64, lng: f64 },
    #[error("Subject {0} is not accepting commands")]
    SubjectUnavailable(String),
    #[error(transparent)]
    Zone(#[from] GeofenceError),
    #[error("Zone source {name} failed: {reason}")]
    Source { name: String, reason: String },
    #[error("Escalation sink {sink} failed: {reason}")]
    Dispatch { sink: String, reason: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;
