//! Offline zone check
//!
//! Resolves the zone for a point against a zone file and, optionally, the
//! escalation decision an alert there would produce.
//!
//! Usage:
//!   zone-check --zones data/zones.geojson --lat 28.05 --lng 77.05 --alert panic

use anyhow::{bail, Result};
use clap::Parser;
use geofence_core::{decide, Coordinate, ZoneRegistry};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use zone_tools::{load_zones, write_geojson};

#[derive(Parser, Debug)]
#[command(
    name = "zone-check",
    about = "Resolve the safety zone and escalation for a coordinate"
)]
struct Args {
    /// Zone file (JSON records or GeoJSON FeatureCollection)
    #[arg(short, long)]
    zones: PathBuf,

    /// Latitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    /// Longitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    lng: f64,

    /// Alert type to evaluate, e.g. "panic"
    #[arg(short, long)]
    alert: Option<String>,

    /// Also write the loaded zones as GeoJSON
    #[arg(long)]
    export: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let point = Coordinate::new(args.lat, args.lng);
    if !point.is_valid() {
        bail!("coordinate out of range: ({}, {})", args.lat, args.lng);
    }

    let report = load_zones(&args.zones)?;
    info!("{} zones loaded, {} skipped", report.zones.len(), report.skipped);

    if let Some(path) = &args.export {
        write_geojson(path, &report.zones)?;
    }

    let registry = ZoneRegistry::with_zones(report.zones)?;
    let zone = registry.lookup(&point);
    let nearest = registry.nearest(&point);
    let decision = args
        .alert
        .as_deref()
        .map(|alert| decide(zone.as_deref(), alert));

    let output = serde_json::json!({
        "point": point,
        "zone": zone,
        "nearest": nearest.map(|(z, distance_m)| serde_json::json!({
            "zone_id": z.id,
            "distance_m": distance_m,
        })),
        "decision": decision,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
