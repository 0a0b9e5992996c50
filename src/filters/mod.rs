pub mod kalman;

pub use kalman::{estimator_gain, is_positive_definite, is_positive_semidefinite, StateEstimator};
