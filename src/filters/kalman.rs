/// Linear Kalman state estimator (one-step predictor form)
///
/// Each cycle, with the estimate x and covariance P the measurement refers to:
///
///   S   = Rv + C P Cᵀ                   innovation covariance
///   L   = A P Cᵀ S⁻¹                    estimator gain
///   x  ← A x + B u + L (y − C x − D u)  predict + correct
///   Acl = A − L C
///   P  ← Acl P Aclᵀ + Rw + L Rv Lᵀ      covariance propagation
///
/// S is symmetric positive-definite whenever Rv is, so it is factored with
/// Cholesky. A factorization failure (or a pivot ratio below tolerance) is a
/// `SingularInnovationCovariance` fault: the cycle falls back to open-loop
/// prediction and the fault is returned to the caller.
use log::{debug, warn};
use nalgebra::{Cholesky, DMatrix, Dyn};

use crate::error::{EstimatorError, EstimatorResult};
use crate::model::LinearModel;
use crate::types::linalg::*;

/// Minimum squared ratio of smallest to largest Cholesky pivot of S
const SINGULAR_TOLERANCE: f64 = 1e-12;

/// Relative asymmetry accepted on supplied covariances
const SYMMETRY_TOLERANCE: f64 = 1e-9;

pub struct StateEstimator {
    model: LinearModel,

    /// Filtered state [n]
    x: StateVec,

    /// Error covariance [n x n]
    p: StateMat,

    /// Process noise covariance [n x n]
    rw: NoiseMat,

    /// Measurement noise covariance [p x p]
    rv: NoiseMat,

    /// Gain from the last successful cycle
    gain: Option<GainMat>,

    updates: u64,
    faults: u64,
}

impl StateEstimator {
    /// Set the initial state and covariance and store the noise covariances.
    pub fn initialize(
        model: LinearModel,
        initial_state: StateVec,
        initial_covariance: StateMat,
        rw: NoiseMat,
        rv: NoiseMat,
    ) -> EstimatorResult<Self> {
        let n = model.state_dim();
        let p = model.output_dim();

        model.check_state(&initial_state)?;
        check_shape("initial covariance", &initial_covariance, n, n)?;
        check_shape("process noise Rw", &rw, n, n)?;
        check_shape("measurement noise Rv", &rv, p, p)?;

        if !is_positive_semidefinite(&initial_covariance) {
            return Err(EstimatorError::InvalidCovariance("initial covariance P0"));
        }
        if !is_positive_definite(&rw) {
            return Err(EstimatorError::InvalidCovariance("process noise Rw"));
        }
        if !is_positive_definite(&rv) {
            return Err(EstimatorError::InvalidCovariance("measurement noise Rv"));
        }

        Ok(Self {
            model,
            x: initial_state,
            p: symmetrize(&initial_covariance),
            rw,
            rv,
            gain: None,
            updates: 0,
            faults: 0,
        })
    }

    /// Degenerate prior P0 = x0·x0ᵀ (expected value of a known constant state)
    pub fn outer_product_prior(initial_state: &StateVec) -> StateMat {
        initial_state * initial_state.transpose()
    }

    /// One predict-and-correct cycle. Returns the new filtered state.
    ///
    /// On `SingularInnovationCovariance` the state and covariance are
    /// propagated open-loop (x = A x + B u, P = A P Aᵀ + Rw) before the
    /// fault is returned.
    pub fn step(&mut self, y: &MeasureVec, u: &InputVec) -> EstimatorResult<StateVec> {
        self.model.check_measurement(y)?;
        self.model.check_input(u)?;

        let a = self.model.a();
        let c = self.model.c();

        let gain = match estimator_gain(a, &self.p, c, &self.rv) {
            Ok(gain) => gain,
            Err(EstimatorError::SingularInnovationCovariance) => {
                self.x = self.model.predict(&self.x, u);
                self.p = symmetrize(&(a * &self.p * a.transpose() + &self.rw));
                self.faults += 1;
                warn!(
                    "Innovation covariance singular, prediction only (fault #{})",
                    self.faults
                );
                return Err(EstimatorError::SingularInnovationCovariance);
            }
            Err(e) => return Err(e),
        };

        let innovation = y - self.model.output(&self.x, u);
        let predicted = self.model.predict(&self.x, u);
        self.x = predicted + &gain * innovation;

        let a_cl = a - &gain * c;
        let propagated = &a_cl * &self.p * a_cl.transpose()
            + &self.rw
            + &gain * &self.rv * gain.transpose();
        self.p = symmetrize(&propagated);

        self.gain = Some(gain);
        self.updates += 1;
        debug!(
            "estimator cycle {}: trace(P) = {:.4e}",
            self.updates,
            self.p.trace()
        );

        Ok(self.x.clone())
    }

    pub fn state(&self) -> &StateVec {
        &self.x
    }

    pub fn covariance(&self) -> &StateMat {
        &self.p
    }

    pub fn gain(&self) -> Option<&GainMat> {
        self.gain.as_ref()
    }

    pub fn model(&self) -> &LinearModel {
        &self.model
    }

    pub fn process_noise(&self) -> &NoiseMat {
        &self.rw
    }

    pub fn measurement_noise(&self) -> &NoiseMat {
        &self.rv
    }

    pub fn update_count(&self) -> u64 {
        self.updates
    }

    pub fn fault_count(&self) -> u64 {
        self.faults
    }
}

/// Estimator gain L = A P Cᵀ (Rv + C P Cᵀ)⁻¹ as a total function of its inputs.
pub fn estimator_gain(
    a: &StateMat,
    p: &StateMat,
    c: &DMatrix<f64>,
    rv: &NoiseMat,
) -> EstimatorResult<GainMat> {
    let s = symmetrize(&(rv + c * p * c.transpose()));
    let chol = factor_innovation(s)?;

    // L = M S⁻¹  <=>  Lᵀ = S⁻¹ Mᵀ  (S symmetric)
    let m = a * p * c.transpose();
    let gain = chol.solve(&m.transpose()).transpose();

    if gain.iter().all(|v| v.is_finite()) {
        Ok(gain)
    } else {
        Err(EstimatorError::SingularInnovationCovariance)
    }
}

fn factor_innovation(s: DMatrix<f64>) -> EstimatorResult<Cholesky<f64, Dyn>> {
    if s.iter().any(|v| !v.is_finite()) {
        return Err(EstimatorError::SingularInnovationCovariance);
    }
    let chol = Cholesky::new(s).ok_or(EstimatorError::SingularInnovationCovariance)?;

    let pivots = chol.l_dirty().diagonal();
    let max = pivots.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let min = pivots.iter().fold(f64::INFINITY, |acc, v| acc.min(v.abs()));
    if max <= 0.0 || (min / max).powi(2) < SINGULAR_TOLERANCE {
        return Err(EstimatorError::SingularInnovationCovariance);
    }
    Ok(chol)
}

fn check_shape(
    what: &'static str,
    m: &DMatrix<f64>,
    rows: usize,
    cols: usize,
) -> EstimatorResult<()> {
    if m.shape() == (rows, cols) {
        Ok(())
    } else {
        Err(EstimatorError::DimensionMismatch {
            what,
            expected: (rows, cols),
            found: m.shape(),
        })
    }
}

fn is_symmetric(m: &DMatrix<f64>) -> bool {
    if !m.is_square() || m.iter().any(|v| !v.is_finite()) {
        return false;
    }
    let scale = m.amax().max(1.0);
    (m - m.transpose()).amax() <= SYMMETRY_TOLERANCE * scale
}

/// Symmetric with a successful Cholesky factorization
pub fn is_positive_definite(m: &DMatrix<f64>) -> bool {
    is_symmetric(m) && Cholesky::new(symmetrize(m)).is_some()
}

/// Symmetric with no eigenvalue below tolerance
pub fn is_positive_semidefinite(m: &DMatrix<f64>) -> bool {
    if !is_symmetric(m) {
        return false;
    }
    let scale = m.amax().max(1.0);
    symmetrize(m)
        .symmetric_eigenvalues()
        .iter()
        .all(|&ev| ev >= -SYMMETRY_TOLERANCE * scale)
}
