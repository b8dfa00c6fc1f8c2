//! Zone loading from JSON and GeoJSON
//!
//! Accepted inputs:
//! - a JSON array of zone records, or an object with a `zones` array
//! - a GeoJSON `FeatureCollection` (or single `Feature`) of Polygons
//!
//! Entries that cannot form a valid zone are skipped and counted rather than
//! failing the whole file.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use geofence_core::{Coordinate, Zone, ZoneKind};
use geojson::{feature::Id, Feature, GeoJson, Value};
use serde::Deserialize;
use tracing::{debug, info};

use crate::{LoadError, Result};

/// Zones parsed from one input plus how many entries were dropped
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub zones: Vec<Zone>,
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct RawCoordinate {
    #[serde(alias = "latitude")]
    lat: Option<f64>,
    #[serde(alias = "longitude", alias = "lon")]
    lng: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawZone {
    id: Option<String>,
    name: Option<String>,
    #[serde(alias = "type", alias = "zone_type")]
    kind: Option<String>,
    #[serde(alias = "coordinates", alias = "polygon")]
    boundary: Option<Vec<RawCoordinate>>,
    priority: Option<i32>,
    created_at: Option<DateTime<Utc>>,
}

impl RawZone {
    fn into_zone(self, index: usize) -> Option<Zone> {
        let id = self.id.unwrap_or_else(|| format!("zone-{}", index));
        let kind: ZoneKind = self.kind?.parse().ok()?;
        let boundary = self
            .boundary?
            .into_iter()
            .map(|c| Some(Coordinate::new(c.lat?, c.lng?)))
            .collect::<Option<Vec<_>>>()?;

        let name = self.name.unwrap_or_else(|| id.clone());
        let mut zone = Zone::new(id, name, kind, open_ring(boundary), self.priority.unwrap_or(0));
        if let Some(created_at) = self.created_at {
            zone.created_at = created_at;
        }
        Some(zone)
    }
}

/// Drop a repeated closing vertex
fn open_ring(mut ring: Vec<Coordinate>) -> Vec<Coordinate> {
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

/// Keeps valid zones with unseen ids
struct Collector {
    zones: Vec<Zone>,
    seen: HashSet<String>,
    skipped: usize,
}

impl Collector {
    fn new() -> Self {
        Self {
            zones: Vec::new(),
            seen: HashSet::new(),
            skipped: 0,
        }
    }

    fn push(&mut self, zone: Option<Zone>) {
        let Some(zone) = zone else {
            self.skipped += 1;
            return;
        };
        if let Err(e) = zone.validate() {
            debug!(error = %e, "Skipping invalid zone");
            self.skipped += 1;
            return;
        }
        if !self.seen.insert(zone.id.clone()) {
            debug!(zone_id = %zone.id, "Skipping duplicate zone id");
            self.skipped += 1;
            return;
        }
        self.zones.push(zone);
    }

    fn finish(self) -> Result<LoadReport> {
        info!(
            "Loaded {} zones ({} skipped as invalid or duplicate)",
            self.zones.len(),
            self.skipped
        );
        if self.zones.is_empty() {
            return Err(LoadError::NoZones);
        }
        Ok(LoadReport {
            zones: self.zones,
            skipped: self.skipped,
        })
    }
}

fn string_property(feature: &Feature, key: &str) -> Option<String> {
    feature
        .property(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn feature_id(feature: &Feature) -> Option<String> {
    string_property(feature, "id").or_else(|| match &feature.id {
        Some(Id::String(s)) => Some(s.clone()),
        Some(Id::Number(n)) => Some(n.to_string()),
        None => None,
    })
}

fn feature_to_zone(feature: &Feature, index: usize) -> Option<Zone> {
    let exterior = match feature.geometry.as_ref().map(|g| &g.value) {
        Some(Value::Polygon(rings)) => rings.first()?,
        _ => {
            debug!(index, "Skipping non-polygon feature");
            return None;
        }
    };

    // GeoJSON positions are [lng, lat]
    let boundary = exterior
        .iter()
        .map(|pos| match pos.as_slice() {
            [lng, lat, ..] => Some(Coordinate::new(*lat, *lng)),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;

    let id = feature_id(feature).unwrap_or_else(|| format!("zone-{}", index));
    let kind: ZoneKind = string_property(feature, "kind")
        .or_else(|| string_property(feature, "zone_type"))?
        .parse()
        .ok()?;
    let name = string_property(feature, "name").unwrap_or_else(|| id.clone());
    let priority = feature
        .property("priority")
        .and_then(|v| v.as_i64())
        .and_then(|p| i32::try_from(p).ok())
        .unwrap_or(0);

    let mut zone = Zone::new(id, name, kind, open_ring(boundary), priority);
    if let Some(created_at) = string_property(feature, "created_at")
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
    {
        zone.created_at = created_at.with_timezone(&Utc);
    }
    Some(zone)
}

fn from_records(records: Vec<serde_json::Value>) -> Result<LoadReport> {
    let mut collector = Collector::new();
    for (i, record) in records.into_iter().enumerate() {
        let zone = serde_json::from_value::<RawZone>(record)
            .ok()
            .and_then(|raw| raw.into_zone(i));
        collector.push(zone);
    }
    collector.finish()
}

fn from_geojson(geojson: GeoJson) -> Result<LoadReport> {
    let features = match geojson {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(_) => return Err(LoadError::NoZones),
    };

    let mut collector = Collector::new();
    for (i, feature) in features.iter().enumerate() {
        collector.push(feature_to_zone(feature, i));
    }
    collector.finish()
}

/// Parse zones from a JSON or GeoJSON document
pub fn parse_zones(text: &str) -> Result<LoadReport> {
    let value: serde_json::Value = serde_json::from_str(text)?;

    match value {
        serde_json::Value::Array(records) => from_records(records),
        serde_json::Value::Object(mut object) => {
            let is_geojson = matches!(
                object.get("type").and_then(|t| t.as_str()),
                Some("FeatureCollection") | Some("Feature")
            );
            if is_geojson {
                let geojson = GeoJson::from_json_value(serde_json::Value::Object(object))?;
                return from_geojson(geojson);
            }
            match object.remove("zones") {
                Some(serde_json::Value::Array(records)) => from_records(records),
                _ => Err(LoadError::NoZones),
            }
        }
        _ => Err(LoadError::NoZones),
    }
}

/// Load zones from a JSON or GeoJSON file
pub fn load_zones(path: impl AsRef<Path>) -> Result<LoadReport> {
    let path = path.as_ref();
    info!("Loading zones from {:?}", path);
    let text = std::fs::read_to_string(path)?;
    parse_zones(&text)
}
