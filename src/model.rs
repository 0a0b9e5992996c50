//! Discrete-time linear vehicle model
//!
//! x[k+1] = A x[k] + B u[k]
//! y[k]   = C x[k] + D u[k]
//!
//! A vehicle is a configuration value: the estimator takes any validated
//! `LinearModel`, the reference quadrotor is just one instance.

use nalgebra::DMatrix;

use crate::error::{EstimatorError, EstimatorResult};
use crate::types::linalg::*;

/// Percent actuator command to model input. The tabulated input
/// coefficients carry a 1e4 scale; this brings them back to one percent.
const REFERENCE_INPUT_GAIN: f64 = 1.0e-4;

#[derive(Clone, Debug)]
pub struct LinearModel {
    a: StateMat,
    b: DMatrix<f64>,
    c: DMatrix<f64>,
    d: DMatrix<f64>,
}

impl LinearModel {
    /// Build a model, checking every shape against the state dimension of `a`.
    pub fn new(
        a: StateMat,
        b: DMatrix<f64>,
        c: DMatrix<f64>,
        d: DMatrix<f64>,
    ) -> EstimatorResult<Self> {
        let n = a.nrows();
        if n == 0 || a.ncols() != n {
            return Err(EstimatorError::DimensionMismatch {
                what: "transition matrix A",
                expected: (n.max(1), n.max(1)),
                found: a.shape(),
            });
        }
        if b.nrows() != n {
            return Err(EstimatorError::DimensionMismatch {
                what: "input matrix B",
                expected: (n, b.ncols()),
                found: b.shape(),
            });
        }
        if c.ncols() != n || c.nrows() == 0 {
            return Err(EstimatorError::DimensionMismatch {
                what: "output matrix C",
                expected: (c.nrows().max(1), n),
                found: c.shape(),
            });
        }
        if d.shape() != (c.nrows(), b.ncols()) {
            return Err(EstimatorError::DimensionMismatch {
                what: "feedthrough matrix D",
                expected: (c.nrows(), b.ncols()),
                found: d.shape(),
            });
        }
        Ok(Self { a, b, c, d })
    }

    /// Forward-Euler discretization of a continuous model: A = I + Ac·dt, B = Bc·dt
    pub fn discretize(
        ac: StateMat,
        bc: DMatrix<f64>,
        c: DMatrix<f64>,
        d: DMatrix<f64>,
        dt: f64,
    ) -> EstimatorResult<Self> {
        let n = ac.nrows();
        let a = if ac.is_square() {
            DMatrix::identity(n, n) + ac * dt
        } else {
            ac
        };
        Self::new(a, bc * dt, c, d)
    }

    /// Linearized quadrotor about hover (12 states, 4 inputs), measuring
    /// position and linear velocity.
    ///
    /// States: x y z yaw pitch roll xdot ydot zdot p q r
    /// Inputs: pitch roll yaw vertical (percent)
    pub fn reference_quadrotor(dt: f64) -> EstimatorResult<Self> {
        let mut ac = DMatrix::<f64>::zeros(STATE_DIM, STATE_DIM);
        // kinematics
        ac[(POS_X, VEL_X)] = 1.0;
        ac[(POS_Y, VEL_Y)] = 1.0;
        ac[(POS_Z, VEL_Z)] = 1.0;
        ac[(YAW, RATE_R)] = 1.0;
        ac[(PITCH, RATE_Q)] = 1.0;
        ac[(ROLL, RATE_P)] = 1.0;
        // translational dynamics
        ac[(VEL_X, PITCH)] = -9.81;
        ac[(VEL_X, VEL_X)] = -0.064;
        ac[(VEL_X, RATE_Q)] = 0.1382;
        ac[(VEL_Y, ROLL)] = 9.81;
        ac[(VEL_Y, VEL_Y)] = -0.64;
        ac[(VEL_Y, RATE_P)] = -0.1382;
        // rotational dynamics
        ac[(RATE_P, VEL_Y)] = -1.1999;
        ac[(RATE_P, RATE_P)] = -2.5898;
        ac[(RATE_Q, VEL_X)] = 0.9755;
        ac[(RATE_Q, RATE_Q)] = -2.1056;
        ac[(RATE_R, RATE_R)] = -0.1715;

        let mut bc = DMatrix::<f64>::zeros(STATE_DIM, INPUT_DIM);
        let scale = 10_000.0 * REFERENCE_INPUT_GAIN;
        bc[(VEL_Z, IN_VERTICAL)] = 0.0015 * scale;
        bc[(RATE_P, IN_ROLL)] = 1.7157 * scale;
        // positive pitch command tilts nose down, accelerating along +x
        bc[(RATE_Q, IN_PITCH)] = -1.3949 * scale;
        bc[(RATE_R, IN_YAW)] = 1.0 * scale;

        let mut c = DMatrix::<f64>::zeros(MEASURE_DIM, STATE_DIM);
        for (row, col) in [POS_X, POS_Y, POS_Z, VEL_X, VEL_Y, VEL_Z].into_iter().enumerate() {
            c[(row, col)] = 1.0;
        }
        let d = DMatrix::<f64>::zeros(MEASURE_DIM, INPUT_DIM);

        Self::discretize(ac, bc, c, d, dt)
    }

    pub fn state_dim(&self) -> usize {
        self.a.nrows()
    }

    pub fn input_dim(&self) -> usize {
        self.b.ncols()
    }

    pub fn output_dim(&self) -> usize {
        self.c.nrows()
    }

    pub fn a(&self) -> &StateMat {
        &self.a
    }

    pub fn b(&self) -> &DMatrix<f64> {
        &self.b
    }

    pub fn c(&self) -> &DMatrix<f64> {
        &self.c
    }

    pub fn d(&self) -> &DMatrix<f64> {
        &self.d
    }

    /// A·x + B·u
    pub fn predict(&self, x: &StateVec, u: &InputVec) -> StateVec {
        &self.a * x + &self.b * u
    }

    /// C·x + D·u
    pub fn output(&self, x: &StateVec, u: &InputVec) -> MeasureVec {
        &self.c * x + &self.d * u
    }

    pub fn check_state(&self, x: &StateVec) -> EstimatorResult<()> {
        check_len("state vector", self.state_dim(), x.len())
    }

    pub fn check_input(&self, u: &InputVec) -> EstimatorResult<()> {
        check_len("control input", self.input_dim(), u.len())
    }

    pub fn check_measurement(&self, y: &MeasureVec) -> EstimatorResult<()> {
        check_len("measurement", self.output_dim(), y.len())
    }
}

fn check_len(what: &'static str, expected: usize, found: usize) -> EstimatorResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(EstimatorError::DimensionMismatch {
            what,
            expected: (expected, 1),
            found: (found, 1),
        })
    }
}
