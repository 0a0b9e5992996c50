pub mod config;
pub mod controller;
pub mod error;
pub mod filters;
pub mod health_monitor;
pub mod mission_report;
pub mod model;
pub mod sensors;
pub mod sim;
pub mod sink;
pub mod supervisor;
pub mod types;
pub mod vehicle;
pub mod vision;

pub use error::{EstimatorError, FlightError};
pub use filters::StateEstimator;
pub use model::LinearModel;
pub use supervisor::{FlightPhase, FlightSupervisor};
