use std::fmt;

use serde::{Deserialize, Serialize};

/// Supervisor flight phase, exactly one active at a time
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum FlightPhase {
    Ground,
    Takeoff,
    Calibrating,
    Climbing,
    TargetAcquired,
    FlyAway,
    Landing,
    Done,
    Failed,
}

impl FlightPhase {
    /// Legal edges of the phase graph.
    ///
    /// `Landing -> Failed` only records a failed landing; `Failed -> Landing`
    /// is the forced safety landing. `Failed -> FlyAway` is the escape after
    /// a threshold abort. After acquisition only a vehicle fault can reach
    /// `Failed`.
    pub fn can_transition_to(self, next: FlightPhase) -> bool {
        use FlightPhase::*;
        matches!(
            (self, next),
            (Ground, Takeoff)
                | (Takeoff, Calibrating)
                | (Takeoff, Failed)
                | (Calibrating, Climbing)
                | (Calibrating, Failed)
                | (Climbing, TargetAcquired)
                | (Climbing, Failed)
                | (TargetAcquired, FlyAway)
                | (TargetAcquired, Failed)
                | (FlyAway, Landing)
                | (FlyAway, Failed)
                | (Landing, Done)
                | (Landing, Failed)
                | (Failed, FlyAway)
                | (Failed, Landing)
        )
    }
}

impl From<FlightPhase> for &'static str {
    fn from(value: FlightPhase) -> Self {
        match value {
            FlightPhase::Ground => "ground",
            FlightPhase::Takeoff => "takeoff",
            FlightPhase::Calibrating => "calibrating",
            FlightPhase::Climbing => "climbing",
            FlightPhase::TargetAcquired => "target_acquired",
            FlightPhase::FlyAway => "fly_away",
            FlightPhase::Landing => "landing",
            FlightPhase::Done => "done",
            FlightPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for FlightPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = (*self).into();
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use FlightPhase::*;

    #[test]
    fn test_nominal_sequence_is_legal() {
        let sequence = [
            Ground,
            Takeoff,
            Calibrating,
            Climbing,
            TargetAcquired,
            FlyAway,
            Landing,
            Done,
        ];
        for pair in sequence.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_failure_routes_through_landing() {
        assert!(Takeoff.can_transition_to(Failed));
        assert!(Calibrating.can_transition_to(Failed));
        assert!(Climbing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Landing));
        assert!(Failed.can_transition_to(FlyAway));
        assert!(!Failed.can_transition_to(Done));
        assert!(!Failed.can_transition_to(TargetAcquired));
        assert!(!Ground.can_transition_to(Failed));
    }

    #[test]
    fn test_no_skipping_phases() {
        assert!(!Ground.can_transition_to(Climbing));
        assert!(!Climbing.can_transition_to(Landing));
        assert!(!TargetAcquired.can_transition_to(Climbing));
        assert!(!Done.can_transition_to(Takeoff));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(TargetAcquired.to_string(), "target_acquired");
        assert_eq!(FlyAway.to_string(), "fly_away");
    }
}
