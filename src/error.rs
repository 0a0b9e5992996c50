use thiserror::Error;

use crate::supervisor::FlightPhase;

/// Estimator construction and runtime faults
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimatorError {
    #[error("Dimension mismatch in {what}: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Invalid covariance {0}: must be symmetric positive-definite")]
    InvalidCovariance(&'static str),

    #[error("Innovation covariance is singular")]
    SingularInnovationCovariance,
}

/// Mission-level errors raised by the flight supervisor
#[derive(Error, Debug)]
pub enum FlightError {
    #[error("Sensor calibration did not finish within {0:.1}s")]
    CalibrationTimeout(f64),

    #[error("Altitude {altitude:.2} m reached limit {limit:.2} m")]
    AltitudeExceeded { altitude: f64, limit: f64 },

    #[error("Distance to waypoint {distance:.2} m reached limit {limit:.2} m")]
    DistanceExceeded { distance: f64, limit: f64 },

    #[error("Vehicle reported emergency flight state")]
    VehicleEmergency,

    #[error("No new state estimate for {0:.1}s")]
    EstimateStale(f64),

    #[error("Failed to persist firing position: {0}")]
    PersistFailure(String),

    #[error("Vehicle error during {action}: {source}")]
    Vehicle {
        action: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Landing failed: {0}")]
    LandingFailed(#[source] anyhow::Error),

    #[error("Invalid phase transition {from} -> {to}")]
    InvalidTransition { from: FlightPhase, to: FlightPhase },

    #[error(transparent)]
    Estimator(#[from] EstimatorError),
}

impl FlightError {
    pub fn vehicle(action: &'static str, source: anyhow::Error) -> Self {
        FlightError::Vehicle { action, source }
    }

    /// Threshold and safety aborts end the climb but not the mission.
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            FlightError::CalibrationTimeout(_)
                | FlightError::AltitudeExceeded { .. }
                | FlightError::DistanceExceeded { .. }
                | FlightError::VehicleEmergency
                | FlightError::EstimateStale(_)
        )
    }

    /// Threshold aborts are followed by the escape maneuver before landing
    pub fn allows_fly_away(&self) -> bool {
        matches!(
            self,
            FlightError::AltitudeExceeded { .. } | FlightError::DistanceExceeded { .. }
        )
    }
}

pub type EstimatorResult<T> = Result<T, EstimatorError>;
pub type FlightResult<T> = Result<T, FlightError>;
