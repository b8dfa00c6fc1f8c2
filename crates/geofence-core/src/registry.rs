//! Zone Registry
//!
//! Holds the current zone set as an immutable snapshot behind an `Arc`.
//! Every mutation builds a complete new snapshot and swaps the pointer, so
//! readers never observe a partially applied change and never wait on a
//! writer for longer than the pointer clone.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info};

use crate::geometry::{distance_to_boundary_m, resolve_overlaps};
use crate::zone::{Coordinate, Zone};
use crate::{GeofenceError, Result};

/// Immutable view of the registry at one version
#[derive(Debug, Clone, Serialize)]
pub struct ZoneSnapshot {
    version: u64,
    loaded_at: DateTime<Utc>,
    zones: Vec<Arc<Zone>>,
}

impl ZoneSnapshot {
    fn empty() -> Self {
        Self {
            version: 0,
            loaded_at: Utc::now(),
            zones: Vec::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn zones(&self) -> &[Arc<Zone>] {
        &self.zones
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn get(&self, zone_id: &str) -> Option<&Arc<Zone>> {
        self.zones.iter().find(|z| z.id == zone_id)
    }

    pub fn lookup(&self, point: &Coordinate) -> Option<&Arc<Zone>> {
        resolve_overlaps(point, &self.zones)
    }

    /// Zone whose boundary is closest to `point`, with the distance in metres
    pub fn nearest(&self, point: &Coordinate) -> Option<(&Arc<Zone>, f64)> {
        self.zones
            .iter()
            .filter_map(|z| distance_to_boundary_m(point, &z.boundary).map(|d| (z, d)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }
}

/// Shared, read-mostly zone registry
pub struct ZoneRegistry {
    current: RwLock<Arc<ZoneSnapshot>>,
    // Serialises writers so two upserts cannot both build from the same base
    writer: Mutex<()>,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(ZoneSnapshot::empty())),
            writer: Mutex::new(()),
        }
    }

    pub fn with_zones(zones: Vec<Zone>) -> Result<Self> {
        let registry = Self::new();
        registry.load(zones)?;
        Ok(registry)
    }

    /// Current snapshot; cheap, never blocks on a writer building a new set
    pub fn snapshot(&self) -> Arc<ZoneSnapshot> {
        self.current.read().clone()
    }

    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    pub fn lookup(&self, point: &Coordinate) -> Option<Arc<Zone>> {
        let snapshot = self.snapshot();
        let hit = snapshot.lookup(point).cloned();
        debug!(
            lat = point.lat,
            lng = point.lng,
            zone_id = hit.as_ref().map(|z| z.id.as_str()).unwrap_or("-"),
            version = snapshot.version,
            "Zone lookup"
        );
        hit
    }

    pub fn get(&self, zone_id: &str) -> Option<Arc<Zone>> {
        self.snapshot().get(zone_id).cloned()
    }

    pub fn nearest(&self, point: &Coordinate) -> Option<(Arc<Zone>, f64)> {
        self.snapshot().nearest(point).map(|(z, d)| (z.clone(), d))
    }

    /// Replace the whole zone set
    ///
    /// All zones are validated first; on any failure the registry is
    /// left untouched.
    pub fn load(&self, zones: Vec<Zone>) -> Result<u64> {
        {
            let mut seen = HashSet::with_capacity(zones.len());
            for zone in &zones {
                zone.validate()?;
                if !seen.insert(zone.id.as_str()) {
                    return Err(GeofenceError::validation(&zone.id, "duplicate zone id"));
                }
            }
        }

        let count = zones.len();
        let _guard = self.writer.lock();
        let version = self.swap(zones.into_iter().map(Arc::new).collect());
        info!(version, zones = count, "Zone registry loaded");
        Ok(version)
    }

    /// Insert or replace a zone by id
    ///
    /// Replacing keeps the original `created_at` and position.
    pub fn upsert(&self, zone: Zone) -> Result<u64> {
        zone.validate()?;

        let _guard = self.writer.lock();
        let base = self.snapshot();
        let mut zones: Vec<Arc<Zone>> = base.zones.clone();

        match zones.iter().position(|z| z.id == zone.id) {
            Some(idx) => {
                let mut zone = zone;
                zone.created_at = zones[idx].created_at;
                zones[idx] = Arc::new(zone);
            }
            None => zones.push(Arc::new(zone)),
        }

        let version = self.swap(zones);
        info!(version, "Zone upserted");
        Ok(version)
    }

    /// Remove a zone by id; removing a missing id is a no-op returning `false`
    pub fn remove(&self, zone_id: &str) -> bool {
        let _guard = self.writer.lock();
        let base = self.snapshot();
        if base.get(zone_id).is_none() {
            debug!(zone_id, "Remove of unknown zone ignored");
            return false;
        }

        let zones = base
            .zones
            .iter()
            .filter(|z| z.id != zone_id)
            .cloned()
            .collect();
        let version = self.swap(zones);
        info!(zone_id, version, "Zone removed");
        true
    }

    /// Caller must hold `writer`
    fn swap(&self, zones: Vec<Arc<Zone>>) -> u64 {
        let mut current = self.current.write();
        let version = current.version + 1;
        *current = Arc::new(ZoneSnapshot {
            version,
            loaded_at: Utc::now(),
            zones,
        });
        version
    }
}

impl Default for ZoneRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ZoneRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("ZoneRegistry")
            .field("version", &snapshot.version)
            .field("zones", &snapshot.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::ZoneKind;
    use std::thread;

    fn rect(id: &str, kind: ZoneKind, priority: i32, lat0: f64, lng0: f64, size: f64) -> Zone {
        Zone::rectangle(
            id,
            id,
            kind,
            Coordinate::new(lat0, lng0),
            Coordinate::new(lat0 + size, lng0 + size),
            priority,
        )
    }

    #[test]
    fn test_load_and_lookup() {
        let registry = ZoneRegistry::with_zones(vec![
            rect("fort", ZoneKind::TouristZone, 1, 28.0, 77.0, 0.1),
            rect("ridge", ZoneKind::Danger, 5, 28.05, 77.05, 0.1),
        ])
        .unwrap();

        assert_eq!(registry.version(), 1);
        assert_eq!(registry.lookup(&Coordinate::new(28.01, 77.01)).unwrap().id, "fort");
        assert_eq!(registry.lookup(&Coordinate::new(28.07, 77.07)).unwrap().id, "ridge");
        assert!(registry.lookup(&Coordinate::new(30.0, 80.0)).is_none());
    }

    #[test]
    fn test_load_rejects_batch_atomically() {
        let registry = ZoneRegistry::with_zones(vec![rect("a", ZoneKind::Safe, 0, 0.0, 0.0, 1.0)]).unwrap();

        let bad = Zone::new("b", "b", ZoneKind::Safe, vec![Coordinate::new(0.0, 0.0)], 0);
        let result = registry.load(vec![rect("c", ZoneKind::Safe, 0, 5.0, 5.0, 1.0), bad]);
        assert!(matches!(result, Err(GeofenceError::Validation { .. })));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.version(), 1);
        assert!(snapshot.get("a").is_some());
        assert!(snapshot.get("c").is_none());
    }

    #[test]
    fn test_load_rejects_duplicate_ids() {
        let registry = ZoneRegistry::new();
        let result = registry.load(vec![
            rect("dup", ZoneKind::Safe, 0, 0.0, 0.0, 1.0),
            rect("dup", ZoneKind::Danger, 0, 5.0, 5.0, 1.0),
        ]);
        assert!(result.is_err());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_upsert_validation_leaves_registry_unchanged() {
        let registry = ZoneRegistry::with_zones(vec![rect("a", ZoneKind::Safe, 0, 0.0, 0.0, 1.0)]).unwrap();
        let degenerate = Zone::new(
            "a",
            "a",
            ZoneKind::Danger,
            vec![Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0)],
            9,
        );
        assert!(registry.upsert(degenerate).is_err());
        assert_eq!(registry.version(), 1);
        assert_eq!(registry.get("a").unwrap().kind, ZoneKind::Safe);
    }

    #[test]
    fn test_upsert_replaces_and_keeps_created_at() {
        let original = rect("a", ZoneKind::Safe, 0, 0.0, 0.0, 1.0);
        let created = original.created_at;
        let registry = ZoneRegistry::with_zones(vec![original]).unwrap();

        let replacement = rect("a", ZoneKind::Restricted, 3, 0.0, 0.0, 2.0);
        registry.upsert(replacement).unwrap();

        let zone = registry.get("a").unwrap();
        assert_eq!(zone.kind, ZoneKind::Restricted);
        assert_eq!(zone.priority, 3);
        assert_eq!(zone.created_at, created);
        assert_eq!(registry.snapshot().len(), 1);
        assert_eq!(registry.version(), 2);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = ZoneRegistry::with_zones(vec![rect("a", ZoneKind::Safe, 0, 0.0, 0.0, 1.0)]).unwrap();
        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
        assert!(!registry.remove("never-existed"));
        assert_eq!(registry.version(), 2);
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_old_snapshot_survives_swap() {
        let registry = ZoneRegistry::with_zones(vec![rect("a", ZoneKind::Safe, 0, 0.0, 0.0, 1.0)]).unwrap();
        let before = registry.snapshot();
        registry.remove("a");
        assert_eq!(before.len(), 1);
        assert!(before.lookup(&Coordinate::new(0.5, 0.5)).is_some());
        assert!(registry.lookup(&Coordinate::new(0.5, 0.5)).is_none());
    }

    #[test]
    fn test_nearest_zone() {
        let registry = ZoneRegistry::with_zones(vec![
            rect("near", ZoneKind::Danger, 0, 0.0, 0.0, 0.1),
            rect("far", ZoneKind::Safe, 0, 1.0, 1.0, 0.1),
        ])
        .unwrap();
        let (zone, distance) = registry.nearest(&Coordinate::new(0.15, 0.05)).unwrap();
        assert_eq!(zone.id, "near");
        assert!(distance > 5_000.0 && distance < 6_000.0, "got {}", distance);
        assert!(ZoneRegistry::new().nearest(&Coordinate::new(0.0, 0.0)).is_none());
    }

    #[test]
    fn test_concurrent_lookup_sees_whole_snapshots() {
        // Snapshot A holds {left}, snapshot B holds {right}; both cover the probe
        // point. A reader must only ever see "left", "right" or nothing in between
        // swaps, never a zone from neither set.
        let left = rect("left", ZoneKind::Safe, 1, 0.0, 0.0, 1.0);
        let right = rect("right", ZoneKind::Danger, 1, 0.0, 0.0, 1.0);
        let registry = Arc::new(ZoneRegistry::with_zones(vec![left.clone()]).unwrap());
        let probe = Coordinate::new(0.5, 0.5);

        let writer = {
            let registry = registry.clone();
            thread::spawn(move || {
                for i in 0..500 {
                    if i % 2 == 0 {
                        registry.load(vec![right.clone()]).unwrap();
                    } else {
                        registry.upsert(left.clone()).unwrap();
                        registry.remove("right");
                    }
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for _ in 0..2_000 {
                        let snapshot = registry.snapshot();
                        let ids: Vec<&str> = snapshot.zones().iter().map(|z| z.id.as_str()).collect();
                        assert!(ids.iter().all(|id| *id == "left" || *id == "right"));
                        if let Some(z) = snapshot.lookup(&probe) {
                            assert!(z.id == "left" || z.id == "right");
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }
}
