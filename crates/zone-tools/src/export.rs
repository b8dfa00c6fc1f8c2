//! GeoJSON export of the zone set

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use geofence_core::Zone;
use geojson::{feature::Id, Feature, FeatureCollection, Geometry, JsonObject, Value};
use tracing::info;

use crate::Result;

/// Exterior ring as GeoJSON positions, closed
fn closed_ring(zone: &Zone) -> Vec<Vec<f64>> {
    let mut ring: Vec<Vec<f64>> = zone.boundary.iter().map(|c| vec![c.lng, c.lat]).collect();
    if let Some(first) = ring.first().cloned() {
        if ring.last() != Some(&first) {
            ring.push(first);
        }
    }
    ring
}

pub fn zone_to_feature(zone: &Zone) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("id".to_string(), zone.id.clone().into());
    properties.insert("name".to_string(), zone.name.clone().into());
    properties.insert("kind".to_string(), zone.kind.as_str().into());
    properties.insert("priority".to_string(), zone.priority.into());
    properties.insert("created_at".to_string(), zone.created_at.to_rfc3339().into());

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Polygon(vec![closed_ring(zone)]))),
        id: Some(Id::String(zone.id.clone())),
        properties: Some(properties),
        foreign_members: None,
    }
}

pub fn to_feature_collection<Z: AsRef<Zone>>(zones: &[Z]) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: zones.iter().map(|z| zone_to_feature(z.as_ref())).collect(),
        foreign_members: None,
    }
}

pub fn write_geojson<Z: AsRef<Zone>>(path: impl AsRef<Path>, zones: &[Z]) -> Result<()> {
    let path = path.as_ref();
    let collection = to_feature_collection(zones);
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &collection)?;
    info!("Wrote {} zones to {:?}", zones.len(), path);
    Ok(())
}
