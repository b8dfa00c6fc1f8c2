//! Geofence Core
//!
//! Safety zone geometry and escalation rules for tourist tracking:
//! - Point-in-polygon containment (boundary inclusive)
//! - Priority-ordered overlap resolution
//! - Copy-on-write zone registry
//! - SOS escalation decision table

use thiserror::Error;

pub mod escalation;
pub mod geometry;
pub mod registry;
pub mod zone;

pub use escalation::{decide, EscalationDecision, EscalationReason, Priority, ResponderClass, PANIC_ALERT};
pub use geometry::{distance_to_boundary_m, haversine_m, point_in_polygon, resolve_overlaps};
pub use registry::{ZoneRegistry, ZoneSnapshot};
pub use zone::{Coordinate, Zone, ZoneKind};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeofenceError {
    #[error("Invalid zone {zone_id}: {reason}")]
    Validation { zone_id: String, reason: String },
    #[error("Coordinate out of range: ({lat}, {lng})")]
    InvalidCoordinate { lat: f64, lng: f64 },
}

impl GeofenceError {
    pub(crate) fn validation(zone_id: &str, reason: impl Into<String>) -> Self {
        GeofenceError::Validation {
            zone_id: zone_id.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GeofenceError>;
