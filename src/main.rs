use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::{error, info, warn};

use detection_drone_rs::config::{ClimbMode, FlightConfig};
use detection_drone_rs::sim::{SimConfig, SimulatedVehicle, SyntheticCamera};
use detection_drone_rs::sink::CsvResultSink;
use detection_drone_rs::supervisor::run_mission;
use detection_drone_rs::vehicle::VehicleLink;

#[derive(Parser, Debug)]
#[command(name = "detection_drone")]
#[command(about = "Climb until the target is in view, record the position, fly away and land", long_about = None)]
struct Args {
    /// JSON config file; missing fields keep their defaults
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(long, default_value = "drone_sessions")]
    output_dir: PathBuf,

    /// Climb strategy (overrides config)
    #[arg(long, value_enum)]
    climb_mode: Option<ClimbMode>,

    /// Altitude abort threshold in meters (overrides config)
    #[arg(long)]
    max_altitude: Option<f64>,

    /// Waypoint distance abort threshold in meters (overrides config)
    #[arg(long)]
    max_distance: Option<f64>,

    /// Bounding-box area that counts as acquisition, px² (overrides config)
    #[arg(long)]
    detection_area: Option<f64>,

    /// Simulator noise seed
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Altitude of the simulated target in meters
    #[arg(long, default_value_t = 1.5)]
    target_altitude: f64,

    /// Inject a vehicle emergency this many seconds after takeoff
    #[arg(long, value_name = "SECONDS")]
    emergency_after: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => FlightConfig::load(path)?,
        None => FlightConfig::default(),
    };
    if let Some(mode) = args.climb_mode {
        config.mission.climb_mode = mode;
    }
    if let Some(limit) = args.max_altitude {
        config.mission.max_altitude = limit;
    }
    if let Some(limit) = args.max_distance {
        config.mission.max_distance = limit;
    }
    if let Some(area) = args.detection_area {
        config.mission.detection_area_threshold = area;
    }
    config.validate().context("invalid command-line overrides")?;

    info!("Detection drone starting");
    info!("  Climb mode: {:?}", config.mission.climb_mode);
    info!(
        "  Limits: altitude {:.2} m, distance {:.2} m, detection {:.0} px²",
        config.mission.max_altitude,
        config.mission.max_distance,
        config.mission.detection_area_threshold
    );
    info!("  Output dir: {}", args.output_dir.display());

    std::fs::create_dir_all(&args.output_dir).with_context(|| {
        format!("failed to create output dir {}", args.output_dir.display())
    })?;
    let session = Utc::now().format("%Y%m%d_%H%M%S").to_string();

    let sim = SimulatedVehicle::new(SimConfig {
        seed: args.seed,
        position_noise_std: config.estimator.position_noise_std,
        velocity_noise_std: config.estimator.velocity_noise_std,
        emergency_after_secs: args.emergency_after,
        ..SimConfig::default()
    });
    let camera = SyntheticCamera::new(sim.truth(), args.target_altitude);
    let sink = CsvResultSink::new(
        args.output_dir
            .join(format!("firing_position_{}.csv", session)),
    );

    let outcome = run_mission(&config, VehicleLink::new(sim), camera, Box::new(sink)).await;

    let report_path = args.output_dir.join(format!("mission_{}.json", session));
    outcome.report.save(&report_path)?;
    info!("Report saved to {}", report_path.display());

    match &outcome.report.firing_position {
        Some(firing) => {
            let p = firing.position();
            info!(
                "Target at ({:.2}, {:.2}, {:.2}){}",
                p.x,
                p.y,
                p.z,
                if outcome.report.firing_position_persisted {
                    ""
                } else {
                    " (not persisted)"
                }
            );
        }
        None => warn!("No target acquired"),
    }
    if let Some(abort) = &outcome.abort {
        warn!("Mission aborted: {}", abort);
    }

    if let Some(failure) = outcome.landing_failure {
        error!("Vehicle may still be airborne");
        return Err(failure.into());
    }
    Ok(())
}
