//! Linear algebra type system for the detection drone
//!
//! Model dimensions are runtime configuration (one estimator type, many
//! vehicle models), so matrices are dynamically sized. The reference
//! quadrotor dimensions and state layout are fixed here.

use nalgebra::{DMatrix, DVector, Vector3};

// ===== Reference Model Dimensions =====
pub const STATE_DIM: usize = 12;
pub const INPUT_DIM: usize = 4;
pub const MEASURE_DIM: usize = 6; // (x, y, z, vx, vy, vz)

// ===== State Layout =====
// x y z yaw pitch roll xdot ydot zdot p q r
pub const POS_X: usize = 0;
pub const POS_Y: usize = 1;
pub const POS_Z: usize = 2;
pub const YAW: usize = 3;
pub const PITCH: usize = 4;
pub const ROLL: usize = 5;
pub const VEL_X: usize = 6;
pub const VEL_Y: usize = 7;
pub const VEL_Z: usize = 8;
pub const RATE_P: usize = 9;
pub const RATE_Q: usize = 10;
pub const RATE_R: usize = 11;

// ===== Input Layout =====
// Matches the actuator command order: pitch, roll, yaw, vertical
pub const IN_PITCH: usize = 0;
pub const IN_ROLL: usize = 1;
pub const IN_YAW: usize = 2;
pub const IN_VERTICAL: usize = 3;

pub type StateVec = DVector<f64>;
pub type StateMat = DMatrix<f64>;
pub type InputVec = DVector<f64>;
pub type MeasureVec = DVector<f64>;
pub type NoiseMat = DMatrix<f64>;
pub type GainMat = DMatrix<f64>;
pub type Position = Vector3<f64>;

/// Position block `[x, y, z]` of a state vector, zero-padded when the state
/// is shorter than three elements.
pub fn position_of(state: &StateVec) -> Position {
    let get = |i: usize| state.get(i).copied().unwrap_or(0.0);
    Position::new(get(POS_X), get(POS_Y), get(POS_Z))
}

/// Symmetric part `(M + Mᵀ) / 2`.
pub fn symmetrize(m: &StateMat) -> StateMat {
    (m + m.transpose()) * 0.5
}
