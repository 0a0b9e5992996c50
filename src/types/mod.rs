pub mod linalg;

pub use linalg::*;

use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};

/// Flight state reported by the vehicle firmware
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleFlightState {
    Nominal,
    Emergency,
}

/// One raw sensor sample, position and velocity in meters (z up)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawSensors {
    pub timestamp: f64,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub flight_state: VehicleFlightState,
}

impl RawSensors {
    /// Measurement vector `[x, y, z, vx, vy, vz]`
    pub fn measurement(&self) -> MeasureVec {
        DVector::from_iterator(
            MEASURE_DIM,
            self.position.iter().chain(self.velocity.iter()).copied(),
        )
    }

    /// Sensor pipeline has produced real data once the timestamp leaves zero.
    pub fn is_calibrated(&self) -> bool {
        self.timestamp != 0.0
    }
}

/// Actuator command in percent of the vehicle's range
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActuatorCommand {
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
    pub vertical: f64,
}

impl ActuatorCommand {
    pub const HOVER: ActuatorCommand = ActuatorCommand {
        pitch: 0.0,
        roll: 0.0,
        yaw: 0.0,
        vertical: 0.0,
    };

    pub fn new(pitch: f64, roll: f64, yaw: f64, vertical: f64) -> Self {
        Self {
            pitch,
            roll,
            yaw,
            vertical,
        }
    }

    /// Clamp every channel into `[-limit, limit]`
    pub fn clamped(self, limit: f64) -> Self {
        let limit = limit.abs();
        Self {
            pitch: self.pitch.clamp(-limit, limit),
            roll: self.roll.clamp(-limit, limit),
            yaw: self.yaw.clamp(-limit, limit),
            vertical: self.vertical.clamp(-limit, limit),
        }
    }

    /// Control input vector in model order (pitch, roll, yaw, vertical)
    pub fn to_input(&self) -> InputVec {
        let mut u = InputVec::zeros(INPUT_DIM);
        u[IN_PITCH] = self.pitch;
        u[IN_ROLL] = self.roll;
        u[IN_YAW] = self.yaw;
        u[IN_VERTICAL] = self.vertical;
        u
    }
}

/// Published estimator output. `sequence` increases by one per successful
/// estimator cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub sequence: u64,
    pub timestamp: f64,
    pub state: StateVec,
}

impl StateSnapshot {
    pub fn position(&self) -> Position {
        position_of(&self.state)
    }

    pub fn altitude(&self) -> f64 {
        self.position().z
    }
}

/// Detector output in pixel coordinates
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Area in px², zero for inverted boxes
    pub fn area(&self) -> f64 {
        let w = (self.x2 - self.x1).max(0.0);
        let h = (self.y2 - self.y1).max(0.0);
        w * h
    }
}
