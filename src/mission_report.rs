use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sensors::SensorSummary;
use crate::supervisor::FlightPhase;
use crate::types::StateSnapshot;
use crate::vision::VisionSummary;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PhaseRecord {
    pub phase: FlightPhase,
    pub entered_at: DateTime<Utc>,
}

/// End-of-flight summary written next to the firing position
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MissionReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub phases: Vec<PhaseRecord>,
    pub abort_reason: Option<String>,
    pub landing_error: Option<String>,
    // Acquisition
    pub firing_position: Option<StateSnapshot>,
    pub firing_position_persisted: bool,
    pub detection_area_threshold: f64,
    // Vision
    pub frames_processed: u64,
    pub detections: u64,
    pub max_detection_area: f64,
    // Estimator
    pub sensor_samples: u64,
    pub estimator_updates: u64,
    pub estimator_faults: u64,
}

impl MissionReport {
    pub fn new(detection_area_threshold: f64) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            phases: vec![PhaseRecord {
                phase: FlightPhase::Ground,
                entered_at: Utc::now(),
            }],
            abort_reason: None,
            landing_error: None,
            firing_position: None,
            firing_position_persisted: false,
            detection_area_threshold,
            frames_processed: 0,
            detections: 0,
            max_detection_area: 0.0,
            sensor_samples: 0,
            estimator_updates: 0,
            estimator_faults: 0,
        }
    }

    pub fn record_phase(&mut self, phase: FlightPhase) {
        self.phases.push(PhaseRecord {
            phase,
            entered_at: Utc::now(),
        });
    }

    pub fn final_phase(&self) -> FlightPhase {
        self.phases
            .last()
            .map(|r| r.phase)
            .unwrap_or(FlightPhase::Ground)
    }

    pub fn phase_sequence(&self) -> Vec<FlightPhase> {
        self.phases.iter().map(|r| r.phase).collect()
    }

    pub fn absorb_sensors(&mut self, summary: &SensorSummary) {
        self.sensor_samples = summary.samples;
        self.estimator_updates = summary.estimator_updates;
        self.estimator_faults = summary.estimator_faults;
    }

    pub fn absorb_vision(&mut self, summary: &VisionSummary) {
        self.frames_processed = summary.frames;
        self.detections = summary.detections;
        self.max_detection_area = summary.max_area;
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Target latched, no abort and the vehicle is down
    pub fn is_success(&self) -> bool {
        self.firing_position.is_some()
            && self.abort_reason.is_none()
            && self.final_phase() == FlightPhase::Done
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::linalg::*;

    #[test]
    fn test_phase_history_and_success() {
        let mut report = MissionReport::new(62648.0);
        for phase in [
            FlightPhase::Takeoff,
            FlightPhase::Calibrating,
            FlightPhase::Climbing,
            FlightPhase::TargetAcquired,
            FlightPhase::FlyAway,
            FlightPhase::Landing,
            FlightPhase::Done,
        ] {
            report.record_phase(phase);
        }
        assert!(!report.is_success());

        report.firing_position = Some(StateSnapshot {
            sequence: 12,
            timestamp: 3.0,
            state: StateVec::zeros(STATE_DIM),
        });
        assert!(report.is_success());
        assert_eq!(report.phase_sequence().len(), 8);

        report.abort_reason = Some("altitude".into());
        assert!(!report.is_success());
    }

    #[test]
    fn test_save_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mission.json");

        let mut report = MissionReport::new(62648.0);
        report.record_phase(FlightPhase::Takeoff);
        report.abort_reason = Some("Vehicle reported emergency flight state".into());
        report.finish();
        report.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let loaded: MissionReport = serde_json::from_str(&text).unwrap();
        assert_eq!(loaded.final_phase(), FlightPhase::Takeoff);
        assert_eq!(loaded.abort_reason, report.abort_reason);
        assert!(loaded.finished_at.is_some());
    }
}
