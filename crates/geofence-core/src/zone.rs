//! Zone and coordinate model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GeofenceError, Result};

/// Minimum vertex count for a usable zone boundary
pub const MIN_BOUNDARY_POINTS: usize = 3;

/// WGS84 position in decimal degrees
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Latitude in [-90, 90], longitude in [-180, 180], both finite
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    pub fn validate(self) -> Result<Self> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(GeofenceError::InvalidCoordinate {
                lat: self.lat,
                lng: self.lng,
            })
        }
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

/// Safety classification of a zone
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Safe,
    TouristZone,
    Restricted,
    Danger,
}

impl ZoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneKind::Safe => "safe",
            ZoneKind::TouristZone => "tourist_zone",
            ZoneKind::Restricted => "restricted",
            ZoneKind::Danger => "danger",
        }
    }
}

impl std::fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ZoneKind {
    type Err = GeofenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "safe" => Ok(ZoneKind::Safe),
            "tourist_zone" | "tourist" => Ok(ZoneKind::TouristZone),
            "restricted" => Ok(ZoneKind::Restricted),
            "danger" => Ok(ZoneKind::Danger),
            other => Err(GeofenceError::validation("", format!("unknown zone kind '{}'", other))),
        }
    }
}

/// A named polygonal safety zone
///
/// The boundary is an open ring: the first vertex is not repeated at the end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub kind: ZoneKind,
    pub boundary: Vec<Coordinate>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Zone {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: ZoneKind,
        boundary: Vec<Coordinate>,
        priority: i32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            boundary,
            priority,
            created_at: Utc::now(),
        }
    }

    /// Axis-aligned rectangle from two opposite corners
    pub fn rectangle(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: ZoneKind,
        south_west: Coordinate,
        north_east: Coordinate,
        priority: i32,
    ) -> Self {
        let boundary = vec![
            Coordinate::new(south_west.lat, south_west.lng),
            Coordinate::new(north_east.lat, south_west.lng),
            Coordinate::new(north_east.lat, north_east.lng),
            Coordinate::new(south_west.lat, north_east.lng),
        ];
        Self::new(id, name, kind, boundary, priority)
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Reject zones the geometry kernel cannot evaluate meaningfully
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(GeofenceError::validation(&self.id, "empty zone id"));
        }
        if self.boundary.len() < MIN_BOUNDARY_POINTS {
            return Err(GeofenceError::validation(
                &self.id,
                format!(
                    "boundary has {} points, need at least {}",
                    self.boundary.len(),
                    MIN_BOUNDARY_POINTS
                ),
            ));
        }
        if let Some(bad) = self.boundary.iter().find(|c| !c.is_valid()) {
            return Err(GeofenceError::validation(
                &self.id,
                format!("boundary coordinate out of range: ({}, {})", bad.lat, bad.lng),
            ));
        }
        Ok(())
    }

    pub fn contains(&self, point: &Coordinate) -> bool {
        crate::geometry::point_in_polygon(point, &self.boundary)
    }
}

impl AsRef<Zone> for Zone {
    fn as_ref(&self) -> &Zone {
        self
    }
}
