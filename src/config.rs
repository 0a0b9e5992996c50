use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::controller::ControllerGains;
use crate::error::EstimatorResult;
use crate::filters::StateEstimator;
use crate::model::LinearModel;
use crate::types::{linalg::*, ActuatorCommand};

// ─── Estimator ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Sample period of the sensor task and the discretized model
    pub dt_secs: f64,
    pub position_noise_std: f64,
    pub velocity_noise_std: f64,
    pub process_noise_std: f64,
    /// Added to the x0·x0ᵀ prior on the diagonal
    pub prior_variance: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            dt_secs: 0.05,
            position_noise_std: 0.02,
            velocity_noise_std: 0.05,
            process_noise_std: 0.05,
            prior_variance: 0.0,
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.dt_secs > 0.0, "estimator.dt_secs must be > 0");
        anyhow::ensure!(
            self.position_noise_std > 0.0 && self.velocity_noise_std > 0.0,
            "estimator measurement noise std must be > 0"
        );
        anyhow::ensure!(
            self.process_noise_std > 0.0,
            "estimator.process_noise_std must be > 0"
        );
        anyhow::ensure!(
            self.prior_variance >= 0.0,
            "estimator.prior_variance must be >= 0"
        );
        Ok(())
    }

    pub fn sample_period(&self) -> Duration {
        secs(self.dt_secs)
    }

    /// Rw = σ²·I over the full state
    pub fn process_noise(&self, state_dim: usize) -> NoiseMat {
        DMatrix::identity(state_dim, state_dim) * self.process_noise_std.powi(2)
    }

    /// Rv = diag(σp², σp², σp², σv², σv², σv²)
    pub fn measurement_noise(&self) -> NoiseMat {
        let pos = self.position_noise_std.powi(2);
        let vel = self.velocity_noise_std.powi(2);
        NoiseMat::from_diagonal(&MeasureVec::from_vec(vec![pos, pos, pos, vel, vel, vel]))
    }

    /// Reference quadrotor estimator seeded at `initial_state`
    pub fn build_estimator(&self, initial_state: StateVec) -> EstimatorResult<StateEstimator> {
        let model = LinearModel::reference_quadrotor(self.dt_secs)?;
        let n = model.state_dim();
        let p0 = StateEstimator::outer_product_prior(&initial_state)
            + DMatrix::identity(n, n) * self.prior_variance;
        StateEstimator::initialize(
            model,
            initial_state,
            p0,
            self.process_noise(n),
            self.measurement_noise(),
        )
    }
}

// ─── Mission ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ClimbMode {
    /// Waypoint tracking through the position controller
    Controlled,
    /// Fixed vertical command, no controller
    Direct,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FlyAwayManeuver {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub vertical: f64,
    pub duration_secs: f64,
}

impl Default for FlyAwayManeuver {
    fn default() -> Self {
        Self {
            roll: 30.0,
            pitch: -30.0,
            yaw: 0.0,
            vertical: 0.0,
            duration_secs: 3.0,
        }
    }
}

impl FlyAwayManeuver {
    pub fn command(&self) -> ActuatorCommand {
        ActuatorCommand::new(self.pitch, self.roll, self.yaw, self.vertical)
    }

    pub fn duration(&self) -> Duration {
        secs(self.duration_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    // ── Thresholds ──
    pub position_tolerance: f64,
    pub max_altitude: f64,
    pub max_distance: f64,
    pub detection_area_threshold: f64,

    // ── Climb ──
    pub climb_step: f64,
    pub climb_mode: ClimbMode,
    pub direct_climb_vertical: f64,
    pub control_period_secs: f64,
    pub actuator_limit: f64,

    // ── Waits ──
    pub calibration_timeout_secs: f64,
    pub calibration_poll_secs: f64,
    pub first_estimate_timeout_secs: f64,
    pub estimate_timeout_secs: f64,
    pub takeoff_timeout_secs: f64,
    pub land_timeout_secs: f64,
    pub hover_after_acquire_secs: f64,

    // ── Vision ──
    pub vision_period_secs: f64,

    pub fly_away: FlyAwayManeuver,
    pub controller: ControllerGains,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            position_tolerance: 0.08,
            max_altitude: 3.0,
            max_distance: 3.0,
            detection_area_threshold: 62648.0,
            climb_step: 0.1,
            climb_mode: ClimbMode::Controlled,
            direct_climb_vertical: 30.0,
            control_period_secs: 0.05,
            actuator_limit: 100.0,
            calibration_timeout_secs: 10.0,
            calibration_poll_secs: 0.05,
            first_estimate_timeout_secs: 5.0,
            estimate_timeout_secs: 1.0,
            takeoff_timeout_secs: 5.0,
            land_timeout_secs: 5.0,
            hover_after_acquire_secs: 2.0,
            vision_period_secs: 1.0 / 30.0,
            fly_away: FlyAwayManeuver::default(),
            controller: ControllerGains::default(),
        }
    }
}

impl MissionConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("position_tolerance", self.position_tolerance),
            ("max_altitude", self.max_altitude),
            ("max_distance", self.max_distance),
            ("detection_area_threshold", self.detection_area_threshold),
            ("climb_step", self.climb_step),
            ("control_period_secs", self.control_period_secs),
            ("actuator_limit", self.actuator_limit),
            ("calibration_timeout_secs", self.calibration_timeout_secs),
            ("calibration_poll_secs", self.calibration_poll_secs),
            ("first_estimate_timeout_secs", self.first_estimate_timeout_secs),
            ("estimate_timeout_secs", self.estimate_timeout_secs),
            ("takeoff_timeout_secs", self.takeoff_timeout_secs),
            ("land_timeout_secs", self.land_timeout_secs),
            ("vision_period_secs", self.vision_period_secs),
        ] {
            anyhow::ensure!(value > 0.0, "mission.{name} must be > 0, got {value}");
        }
        anyhow::ensure!(
            self.hover_after_acquire_secs >= 0.0 && self.fly_away.duration_secs >= 0.0,
            "hover and fly-away durations must be >= 0"
        );
        Ok(())
    }

    pub fn control_period(&self) -> Duration {
        secs(self.control_period_secs)
    }

    pub fn vision_period(&self) -> Duration {
        secs(self.vision_period_secs)
    }
}

/// Complete configuration file layout
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightConfig {
    pub estimator: EstimatorConfig,
    pub mission: MissionConfig,
}

impl FlightConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: FlightConfig = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// All periods and limits must be positive
    pub fn validate(&self) -> anyhow::Result<()> {
        self.estimator.validate()?;
        self.mission.validate()
    }
}

/// Seconds to `Duration`, negative values clamp to zero
pub fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}
