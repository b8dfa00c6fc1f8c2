//! Zone Tools
//!
//! Import zone definitions from JSON records or GeoJSON Polygons and export
//! the registry back to a GeoJSON `FeatureCollection`.
//!
//! GeoJSON positions are `[lng, lat]`; zone boundaries are stored as open
//! rings, so import drops the closing vertex and export adds it back.

use thiserror::Error;

pub mod export;
pub mod loader;

pub use export::{to_feature_collection, write_geojson, zone_to_feature};
pub use loader::{load_zones, parse_zones, LoadReport};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
    #[error("No usable zones in input")]
    NoZones,
}

pub type Result<T> = std::result::Result<T, LoadError>;
