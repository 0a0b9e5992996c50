//! PD position controller
//!
//! Maps the error between a desired and the current filtered state onto the
//! four actuator channels. Conventions: positive pitch moves the vehicle
//! along body +x, positive roll along body +y, positive vertical up,
//! positive yaw increases heading. Horizontal errors are rotated into the
//! body frame by the current yaw.

use serde::{Deserialize, Serialize};

use crate::error::{EstimatorError, EstimatorResult};
use crate::types::{linalg::*, ActuatorCommand};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerGains {
    /// percent per meter
    pub kp_xy: f64,
    /// percent per m/s
    pub kd_xy: f64,
    pub kp_z: f64,
    pub kd_z: f64,
    /// percent per radian
    pub kp_yaw: f64,
    pub kd_yaw: f64,
}

impl Default for ControllerGains {
    fn default() -> Self {
        Self {
            kp_xy: 40.0,
            kd_xy: 20.0,
            kp_z: 60.0,
            kd_z: 25.0,
            kp_yaw: 30.0,
            kd_yaw: 5.0,
        }
    }
}

pub struct PositionController {
    gains: ControllerGains,
    limit: f64,
    desired: StateVec,
    current: StateVec,
}

impl PositionController {
    /// Both desired and current start at `initial`.
    pub fn new(gains: ControllerGains, limit: f64, initial: StateVec) -> EstimatorResult<Self> {
        check_dim(&initial)?;
        Ok(Self {
            gains,
            limit,
            desired: initial.clone(),
            current: initial,
        })
    }

    pub fn set_desired_state(&mut self, desired: StateVec) -> EstimatorResult<()> {
        check_dim(&desired)?;
        self.desired = desired;
        Ok(())
    }

    pub fn set_current_state(&mut self, current: StateVec) -> EstimatorResult<()> {
        check_dim(&current)?;
        self.current = current;
        Ok(())
    }

    pub fn desired_state(&self) -> &StateVec {
        &self.desired
    }

    pub fn current_state(&self) -> &StateVec {
        &self.current
    }

    /// Bounded actuator command from the stored (current, desired) pair.
    pub fn command(&self) -> ActuatorCommand {
        let g = &self.gains;
        let cur = &self.current;
        let des = &self.desired;

        let e_pos = position_of(des) - position_of(cur);
        let ev = [
            des[VEL_X] - cur[VEL_X],
            des[VEL_Y] - cur[VEL_Y],
            des[VEL_Z] - cur[VEL_Z],
        ];

        let (sin_yaw, cos_yaw) = cur[YAW].sin_cos();
        let forward = cos_yaw * e_pos.x + sin_yaw * e_pos.y;
        let lateral = -sin_yaw * e_pos.x + cos_yaw * e_pos.y;
        let v_forward = cos_yaw * ev[0] + sin_yaw * ev[1];
        let v_lateral = -sin_yaw * ev[0] + cos_yaw * ev[1];

        let yaw_error = wrap_angle(des[YAW] - cur[YAW]);
        let yaw_rate_error = des[RATE_R] - cur[RATE_R];

        ActuatorCommand {
            pitch: g.kp_xy * forward + g.kd_xy * v_forward,
            roll: g.kp_xy * lateral + g.kd_xy * v_lateral,
            yaw: g.kp_yaw * yaw_error + g.kd_yaw * yaw_rate_error,
            vertical: g.kp_z * e_pos.z + g.kd_z * ev[2],
        }
        .clamped(self.limit)
    }

    /// Euclidean norm of the position error
    pub fn distance_to_target(&self) -> f64 {
        (position_of(&self.desired) - position_of(&self.current)).norm()
    }
}

fn check_dim(x: &StateVec) -> EstimatorResult<()> {
    if x.len() == STATE_DIM {
        Ok(())
    } else {
        Err(EstimatorError::DimensionMismatch {
            what: "controller state",
            expected: (STATE_DIM, 1),
            found: (x.len(), 1),
        })
    }
}

/// Wrap to (-π, π]
fn wrap_angle(angle: f64) -> f64 {
    use std::f64::consts::{PI, TAU};
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}
