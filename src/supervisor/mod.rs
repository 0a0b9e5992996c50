pub mod flight_phase;
pub mod flight_supervisor;
pub mod latch;

pub use flight_phase::FlightPhase;
pub use flight_supervisor::{run_mission, ClimbOutcome, FlightOutcome, FlightSupervisor};
pub use latch::{LatchOutcome, TargetLatch};
