//! Geometry Kernel
//!
//! Pure functions over WGS84 coordinates. Polygons are treated as planar in
//! (lng, lat) space, which holds for the small, non-antimeridian zones this
//! crate is built for.

use std::cmp::Ordering;
use std::f64::consts::PI;

use crate::zone::{Coordinate, Zone, MIN_BOUNDARY_POINTS};

/// Mean Earth radius in metres
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Tolerance (degrees) for a point to count as lying on an edge, ~0.1 mm
pub const BOUNDARY_EPSILON_DEG: f64 = 1e-9;

const DEG_TO_RAD: f64 = PI / 180.0;

/// Boundary-inclusive ray-casting containment test
///
/// A horizontal ray is cast from `point` towards +∞ longitude and edge
/// crossings are counted; an odd count means inside. Points on a vertex or
/// edge are inside. Fewer than 3 vertices is never inside.
pub fn point_in_polygon(point: &Coordinate, boundary: &[Coordinate]) -> bool {
    let n = boundary.len();
    if n < MIN_BOUNDARY_POINTS {
        return false;
    }

    let (x, y) = (point.lng, point.lat);
    let mut inside = false;
    let mut j = n - 1;

    for i in 0..n {
        let a = &boundary[j];
        let b = &boundary[i];

        if on_segment(point, a, b) {
            return true;
        }

        let (xi, yi) = (b.lng, b.lat);
        let (xj, yj) = (a.lng, a.lat);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// True if `p` lies on the closed segment `a`-`b` within tolerance
fn on_segment(p: &Coordinate, a: &Coordinate, b: &Coordinate) -> bool {
    let (dx, dy) = (b.lng - a.lng, b.lat - a.lat);
    let len = (dx * dx + dy * dy).sqrt();

    if len <= BOUNDARY_EPSILON_DEG {
        return (p.lng - a.lng).abs() <= BOUNDARY_EPSILON_DEG
            && (p.lat - a.lat).abs() <= BOUNDARY_EPSILON_DEG;
    }

    let cross = dx * (p.lat - a.lat) - dy * (p.lng - a.lng);
    if cross.abs() > BOUNDARY_EPSILON_DEG * len {
        return false;
    }

    // Projection of p onto the segment, in units of len²
    let dot = (p.lng - a.lng) * dx + (p.lat - a.lat) * dy;
    let slack = BOUNDARY_EPSILON_DEG * len;
    dot >= -slack && dot <= len * len + slack
}

/// Great-circle distance in metres
pub fn haversine_m(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.lat * DEG_TO_RAD;
    let lat2 = b.lat * DEG_TO_RAD;
    let dlat = (b.lat - a.lat) * DEG_TO_RAD;
    let dlng = (b.lng - a.lng) * DEG_TO_RAD;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Distance in metres from `point` to the nearest edge of `boundary`
///
/// Edges are measured in a local equirectangular projection centred on the
/// point. Returns `None` when the boundary has no edge.
pub fn distance_to_boundary_m(point: &Coordinate, boundary: &[Coordinate]) -> Option<f64> {
    let n = boundary.len();
    if n < 2 {
        return None;
    }

    let m_per_deg_lat = EARTH_RADIUS_M * DEG_TO_RAD;
    let m_per_deg_lng = m_per_deg_lat * (point.lat * DEG_TO_RAD).cos();
    let project = |c: &Coordinate| {
        (
            (c.lng - point.lng) * m_per_deg_lng,
            (c.lat - point.lat) * m_per_deg_lat,
        )
    };

    let mut best = f64::INFINITY;
    for i in 0..n {
        // A two-point boundary has a single edge
        if n == 2 && i == 1 {
            break;
        }
        let a = project(&boundary[i]);
        let b = project(&boundary[(i + 1) % n]);
        best = best.min(origin_to_segment(a, b));
    }

    Some(best)
}

fn origin_to_segment(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (-(a.0 * dx + a.1 * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (px, py) = (a.0 + t * dx, a.1 + t * dy);
    (px * px + py * py).sqrt()
}

/// Pick the zone a point resolves into
///
/// Highest `priority` wins; ties go to the most recently created zone, then
/// to the zone later in `zones`. `None` means open area.
pub fn resolve_overlaps<'a, Z: AsRef<Zone>>(point: &Coordinate, zones: &'a [Z]) -> Option<&'a Z> {
    zones
        .iter()
        .enumerate()
        .filter(|(_, z)| z.as_ref().contains(point))
        .max_by(|(ia, a), (ib, b)| zone_order(a.as_ref(), b.as_ref()).then(ia.cmp(ib)))
        .map(|(_, z)| z)
}

fn zone_order(a: &Zone, b: &Zone) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::ZoneKind;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    fn c(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng)
    }

    fn square() -> Vec<Coordinate> {
        vec![c(0.0, 0.0), c(0.0, 10.0), c(10.0, 10.0), c(10.0, 0.0)]
    }

    fn zone(id: &str, priority: i32, boundary: Vec<Coordinate>, age_secs: i64) -> Zone {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Zone::new(id, id, ZoneKind::Safe, boundary, priority)
            .with_created_at(base + Duration::seconds(age_secs))
    }

    #[test]
    fn test_square_inside_outside_edge() {
        let sq = square();
        assert!(point_in_polygon(&c(5.0, 5.0), &sq));
        assert!(!point_in_polygon(&c(15.0, 15.0), &sq));
        assert!(point_in_polygon(&c(0.0, 5.0), &sq));
    }

    #[test]
    fn test_vertices_and_all_edges_inclusive() {
        let sq = square();
        for v in &sq {
            assert!(point_in_polygon(v, &sq), "vertex {:?}", v);
        }
        assert!(point_in_polygon(&c(10.0, 5.0), &sq));
        assert!(point_in_polygon(&c(5.0, 0.0), &sq));
        assert!(point_in_polygon(&c(5.0, 10.0), &sq));
        assert!(!point_in_polygon(&c(5.0, 10.000001), &sq));
    }

    #[test]
    fn test_degenerate_polygon() {
        assert!(!point_in_polygon(&c(0.0, 0.0), &[]));
        assert!(!point_in_polygon(&c(0.0, 0.0), &[c(0.0, 0.0), c(1.0, 1.0)]));
    }

    #[test]
    fn test_concave_polygon() {
        // U shape opening north
        let u = vec![
            c(0.0, 0.0),
            c(0.0, 3.0),
            c(3.0, 3.0),
            c(3.0, 2.0),
            c(1.0, 2.0),
            c(1.0, 1.0),
            c(3.0, 1.0),
            c(3.0, 0.0),
        ];
        assert!(point_in_polygon(&c(0.5, 1.5), &u));
        assert!(point_in_polygon(&c(2.0, 0.5), &u));
        assert!(!point_in_polygon(&c(2.0, 1.5), &u));
    }

    #[test]
    fn test_ray_through_vertex_counts_once() {
        // Diamond; the ray from (0, -5) passes exactly through the vertex at lng 5
        let diamond = vec![c(-5.0, 0.0), c(0.0, 5.0), c(5.0, 0.0), c(0.0, -5.0)];
        assert!(point_in_polygon(&c(0.0, -1.0), &diamond));
        assert!(!point_in_polygon(&c(0.0, -6.0), &diamond));
    }

    #[test]
    fn test_closed_ring_input_is_tolerated() {
        let mut ring = square();
        ring.push(ring[0]);
        assert!(point_in_polygon(&c(5.0, 5.0), &ring));
        assert!(!point_in_polygon(&c(-1.0, 5.0), &ring));
    }

    #[test]
    fn test_haversine() {
        // Delhi to Mumbai: ~1,150 km
        let d = haversine_m(&c(28.6139, 77.2090), &c(19.0760, 72.8777));
        assert!((d - 1_150_000.0).abs() < 20_000.0);
        assert!(haversine_m(&c(10.0, 10.0), &c(10.0, 10.0)).abs() < 1e-6);
    }

    #[test]
    fn test_distance_to_boundary() {
        // 0.01° of latitude ~ 1,112 m
        let sq = vec![c(0.0, 0.0), c(0.0, 0.1), c(0.1, 0.1), c(0.1, 0.0)];
        let d = distance_to_boundary_m(&c(0.05, 0.01), &sq).unwrap();
        assert!((d - 1_112.0).abs() < 5.0, "got {}", d);

        let outside = distance_to_boundary_m(&c(0.12, 0.05), &sq).unwrap();
        assert!((outside - 2_224.0).abs() < 10.0, "got {}", outside);

        let on_edge = distance_to_boundary_m(&c(0.0, 0.05), &sq).unwrap();
        assert!(on_edge < 1e-6);

        assert!(distance_to_boundary_m(&c(0.0, 0.0), &[c(1.0, 1.0)]).is_none());
    }

    #[test]
    fn test_overlap_priority() {
        let a = zone("a", 1, square(), 0);
        let b = zone("b", 5, square(), 0);
        let zones = vec![a, b];
        let hit = resolve_overlaps(&c(5.0, 5.0), &zones).unwrap();
        assert_eq!(hit.id, "b");
    }

    #[test]
    fn test_overlap_tie_newest_wins() {
        let older = zone("older", 3, square(), 0);
        let newer = zone("newer", 3, square(), 60);
        let zones = vec![newer.clone(), older.clone()];
        assert_eq!(resolve_overlaps(&c(5.0, 5.0), &zones).unwrap().id, "newer");
        let zones = vec![older, newer];
        assert_eq!(resolve_overlaps(&c(5.0, 5.0), &zones).unwrap().id, "newer");
    }

    #[test]
    fn test_open_area() {
        let zones = vec![zone("a", 1, square(), 0)];
        assert!(resolve_overlaps(&c(20.0, 20.0), &zones).is_none());
        let empty: Vec<Zone> = Vec::new();
        assert!(resolve_overlaps(&c(0.0, 0.0), &empty).is_none());
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let zones = vec![
            zone("a", 2, square(), 10),
            zone("b", 2, square(), 10),
            zone("c", 1, square(), 20),
        ];
        let first = resolve_overlaps(&c(5.0, 5.0), &zones).map(|z| z.id.clone());
        let second = resolve_overlaps(&c(5.0, 5.0), &zones).map(|z| z.id.clone());
        assert_eq!(first, second);
        assert_eq!(first.as_deref(), Some("b"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(2000))]

        #[test]
        fn fuzz_rectangle_interior_inside(
            lat0 in -60.0f64..60.0,
            lng0 in -170.0f64..160.0,
            h in 0.001f64..5.0,
            w in 0.001f64..5.0,
            fy in 0.0f64..=1.0,
            fx in 0.0f64..=1.0,
        ) {
            let rect = vec![c(lat0, lng0), c(lat0 + h, lng0), c(lat0 + h, lng0 + w), c(lat0, lng0 + w)];
            let p = c(lat0 + fy * h, lng0 + fx * w);
            prop_assert!(point_in_polygon(&p, &rect));
        }

        #[test]
        fn fuzz_outside_bbox_is_outside(
            pts in proptest::collection::vec((-10.0f64..10.0, -10.0f64..10.0), 3..12),
            dlat in 0.01f64..50.0,
            dlng in -50.0f64..50.0,
        ) {
            let boundary: Vec<Coordinate> = pts.iter().map(|&(la, ln)| c(la, ln)).collect();
            let max_lat = boundary.iter().map(|p| p.lat).fold(f64::MIN, f64::max);
            let p = c(max_lat + dlat, dlng);
            prop_assert!(!point_in_polygon(&p, &boundary));
        }

        #[test]
        fn fuzz_resolve_order_independent(
            priorities in proptest::collection::vec(-5i32..5, 1..8),
            rotate in 0usize..8,
        ) {
            let zones: Vec<Zone> = priorities
                .iter()
                .enumerate()
                .map(|(i, &p)| zone(&format!("z{}", i), p, square(), i as i64))
                .collect();
            let mut rotated = zones.clone();
            let len = rotated.len();
            rotated.rotate_left(rotate % len);

            let a = resolve_overlaps(&c(5.0, 5.0), &zones).map(|z| z.id.clone());
            let b = resolve_overlaps(&c(5.0, 5.0), &rotated).map(|z| z.id.clone());
            prop_assert_eq!(a, b);
        }
    }
}
