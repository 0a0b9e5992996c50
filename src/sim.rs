//! Simulated vehicle and camera
//!
//! `SimulatedVehicle` integrates a first-order velocity response to percent
//! commands on the tokio clock, so it runs unchanged under a paused test
//! runtime. Sensor readings carry Gaussian noise from a seeded generator.
//! `SyntheticCamera` reports a centered box that grows as the vehicle nears
//! a target altitude.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{info, warn};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::types::{ActuatorCommand, BoundingBox, RawSensors, VehicleFlightState};
use crate::vehicle::VehicleIO;
use crate::vision::VisionFeed;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub seed: u64,
    /// Altitude reached by takeoff
    pub takeoff_altitude: f64,
    /// Sensors report timestamp 0 for this long after takeoff
    pub calibration_delay_secs: f64,
    /// Commanded speed per percent of command, m/s
    pub speed_per_percent: f64,
    /// Yaw rate per percent of command, rad/s
    pub yaw_rate_per_percent: f64,
    /// Velocity response time constant
    pub response_tau_secs: f64,
    pub position_noise_std: f64,
    pub velocity_noise_std: f64,
    /// Report emergency once this long after takeoff
    pub emergency_after_secs: Option<f64>,
    pub fail_landing: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 7,
            takeoff_altitude: 0.6,
            calibration_delay_secs: 1.0,
            speed_per_percent: 0.02,
            yaw_rate_per_percent: 0.01,
            response_tau_secs: 0.3,
            position_noise_std: 0.02,
            velocity_noise_std: 0.05,
            emergency_after_secs: None,
            fail_landing: false,
        }
    }
}

/// Shared view of the simulated true position
#[derive(Clone, Debug, Default)]
pub struct TruthHandle(Arc<RwLock<Vector3<f64>>>);

impl TruthHandle {
    pub fn position(&self) -> Vector3<f64> {
        self.0.read().map(|p| *p).unwrap_or_else(|_| Vector3::zeros())
    }

    fn store(&self, position: Vector3<f64>) {
        if let Ok(mut p) = self.0.write() {
            *p = position;
        }
    }
}

pub struct SimulatedVehicle {
    config: SimConfig,
    rng: StdRng,
    position_noise: Option<Normal<f64>>,
    velocity_noise: Option<Normal<f64>>,
    position: Vector3<f64>,
    velocity: Vector3<f64>,
    yaw: f64,
    command: ActuatorCommand,
    command_until: Option<Instant>,
    airborne_since: Option<Instant>,
    last_update: Instant,
    truth: TruthHandle,
    commands_received: u64,
    landed: bool,
    connected: bool,
}

impl SimulatedVehicle {
    pub fn new(config: SimConfig) -> Self {
        // invalid std means noiseless
        let position_noise = Normal::new(0.0, config.position_noise_std).ok();
        let velocity_noise = Normal::new(0.0, config.velocity_noise_std).ok();
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            position_noise,
            velocity_noise,
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            yaw: 0.0,
            command: ActuatorCommand::HOVER,
            command_until: None,
            airborne_since: None,
            last_update: Instant::now(),
            truth: TruthHandle::default(),
            commands_received: 0,
            landed: false,
            connected: true,
        }
    }

    pub fn truth(&self) -> TruthHandle {
        self.truth.clone()
    }

    pub fn true_position(&self) -> Vector3<f64> {
        self.position
    }

    pub fn commands_received(&self) -> u64 {
        self.commands_received
    }

    pub fn has_landed(&self) -> bool {
        self.landed
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Integrate from the last update to now. Commands with a duration expire
    /// to hover mid-interval.
    fn advance(&mut self) {
        let now = Instant::now();
        if self.airborne_since.is_none() {
            self.last_update = now;
            return;
        }

        if let Some(until) = self.command_until {
            if until <= now {
                self.integrate(until.saturating_duration_since(self.last_update));
                self.last_update = until;
                self.command = ActuatorCommand::HOVER;
                self.command_until = None;
            }
        }
        self.integrate(now.saturating_duration_since(self.last_update));
        self.last_update = now;
        self.truth.store(self.position);
    }

    fn integrate(&mut self, elapsed: Duration) {
        let dt = elapsed.as_secs_f64();
        if dt <= 0.0 {
            return;
        }

        let k = self.config.speed_per_percent;
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let forward = self.command.pitch * k;
        let lateral = self.command.roll * k;
        let target = Vector3::new(
            cos_yaw * forward - sin_yaw * lateral,
            sin_yaw * forward + cos_yaw * lateral,
            self.command.vertical * k,
        );

        let alpha = 1.0 - (-dt / self.config.response_tau_secs.max(1e-3)).exp();
        self.velocity += (target - self.velocity) * alpha;
        self.position += self.velocity * dt;
        self.yaw += self.command.yaw * self.config.yaw_rate_per_percent * dt;

        if self.position.z < 0.0 {
            self.position.z = 0.0;
            self.velocity.z = self.velocity.z.max(0.0);
        }
    }

    fn elapsed_airborne(&self) -> Option<f64> {
        self.airborne_since
            .map(|t| Instant::now().saturating_duration_since(t).as_secs_f64())
    }
}

fn sample(noise: Option<&Normal<f64>>, rng: &mut StdRng) -> f64 {
    noise.map_or(0.0, |n| n.sample(rng))
}

impl VehicleIO for SimulatedVehicle {
    fn takeoff(&mut self, _timeout: Duration) -> anyhow::Result<()> {
        if !self.connected {
            anyhow::bail!("vehicle disconnected");
        }
        self.position = Vector3::new(self.position.x, self.position.y, self.config.takeoff_altitude);
        self.velocity = Vector3::zeros();
        self.airborne_since = Some(Instant::now());
        self.last_update = Instant::now();
        self.landed = false;
        self.truth.store(self.position);
        info!("[sim] Airborne at {:.2} m", self.position.z);
        Ok(())
    }

    fn land(&mut self, _timeout: Duration) -> anyhow::Result<()> {
        self.advance();
        if self.config.fail_landing {
            anyhow::bail!("landing rejected by flight controller");
        }
        self.position.z = 0.0;
        self.velocity = Vector3::zeros();
        self.command = ActuatorCommand::HOVER;
        self.command_until = None;
        self.airborne_since = None;
        self.landed = true;
        self.truth.store(self.position);
        info!("[sim] Landed");
        Ok(())
    }

    fn send_command(
        &mut self,
        command: ActuatorCommand,
        duration: Option<Duration>,
    ) -> anyhow::Result<()> {
        if !self.connected {
            anyhow::bail!("vehicle disconnected");
        }
        self.advance();
        self.command = command;
        self.command_until = duration.map(|d| Instant::now() + d);
        self.commands_received += 1;
        Ok(())
    }

    fn read_raw_sensors(&mut self) -> anyhow::Result<RawSensors> {
        if !self.connected {
            anyhow::bail!("vehicle disconnected");
        }
        self.advance();

        let elapsed = self.elapsed_airborne();
        let timestamp = match elapsed {
            Some(t) if t >= self.config.calibration_delay_secs => t,
            _ => 0.0,
        };
        let flight_state = match (elapsed, self.config.emergency_after_secs) {
            (Some(t), Some(after)) if t >= after => VehicleFlightState::Emergency,
            _ => VehicleFlightState::Nominal,
        };

        let rng = &mut self.rng;
        let position = self.position.map(|v| v + sample(self.position_noise.as_ref(), rng));
        let velocity = self.velocity.map(|v| v + sample(self.velocity_noise.as_ref(), rng));

        Ok(RawSensors {
            timestamp,
            position,
            velocity,
            flight_state,
        })
    }

    fn disconnect(&mut self) -> anyhow::Result<()> {
        if self.airborne_since.is_some() {
            warn!("[sim] Disconnecting while airborne");
        }
        self.connected = false;
        Ok(())
    }
}

/// One synthetic frame: the true altitude at capture time
#[derive(Clone, Copy, Debug)]
pub struct SyntheticFrame {
    pub index: u64,
    pub altitude: f64,
}

pub struct SyntheticCamera {
    truth: TruthHandle,
    target_altitude: f64,
    /// Box side in pixels with the vehicle at the target altitude
    peak_side: f64,
    /// Altitude offset over which the box shrinks by 1/e
    falloff: f64,
    width: f64,
    height: f64,
    frames: u64,
}

impl SyntheticCamera {
    pub fn new(truth: TruthHandle, target_altitude: f64) -> Self {
        Self {
            truth,
            target_altitude,
            peak_side: 320.0,
            falloff: 0.5,
            width: 640.0,
            height: 480.0,
            frames: 0,
        }
    }

    pub fn box_side(&self, altitude: f64) -> f64 {
        self.peak_side * (-(altitude - self.target_altitude).abs() / self.falloff).exp()
    }
}

impl VisionFeed for SyntheticCamera {
    type Frame = SyntheticFrame;

    fn latest_frame(&mut self) -> anyhow::Result<Option<SyntheticFrame>> {
        self.frames += 1;
        Ok(Some(SyntheticFrame {
            index: self.frames,
            altitude: self.truth.position().z,
        }))
    }

    fn detect(&mut self, frame: &SyntheticFrame) -> anyhow::Result<Option<BoundingBox>> {
        let side = self.box_side(frame.altitude);
        if side < 8.0 {
            return Ok(None);
        }
        let (cx, cy) = (self.width / 2.0, self.height / 2.0);
        let half = side / 2.0;
        Ok(Some(BoundingBox::new(cx - half, cy - half, cx + half, cy + half)))
    }
}
