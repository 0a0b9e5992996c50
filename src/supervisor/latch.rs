use std::sync::OnceLock;

use crate::types::{BoundingBox, StateSnapshot};

/// Result of offering one detection to the latch
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LatchOutcome {
    BelowThreshold { area: f64 },
    Fired,
    AlreadyLatched,
    Closed,
}

/// One-shot target acquisition latch.
///
/// The slot is written at most once per flight, either by the first
/// detection over the threshold (`Some`, the firing position) or by
/// `close` (`None`). Concurrent writers block on the `OnceLock` and lose,
/// so overlapping or reentrant vision callbacks cannot fire twice.
#[derive(Debug)]
pub struct TargetLatch {
    area_threshold: f64,
    slot: OnceLock<Option<StateSnapshot>>,
}

impl TargetLatch {
    pub fn new(area_threshold: f64) -> Self {
        Self {
            area_threshold,
            slot: OnceLock::new(),
        }
    }

    pub fn offer(&self, bbox: &BoundingBox, snapshot: &StateSnapshot) -> LatchOutcome {
        if let Some(outcome) = self.settled() {
            return outcome;
        }

        let area = bbox.area();
        if area < self.area_threshold {
            return LatchOutcome::BelowThreshold { area };
        }

        match self.slot.set(Some(snapshot.clone())) {
            Ok(()) => LatchOutcome::Fired,
            Err(_) => self.settled().unwrap_or(LatchOutcome::AlreadyLatched),
        }
    }

    fn settled(&self) -> Option<LatchOutcome> {
        self.slot.get().map(|slot| match slot {
            Some(_) => LatchOutcome::AlreadyLatched,
            None => LatchOutcome::Closed,
        })
    }

    /// Refuse all further detections. Returns the firing position if the
    /// latch fired before it was closed.
    pub fn close(&self) -> Option<&StateSnapshot> {
        let _ = self.slot.set(None);
        self.firing_position()
    }

    pub fn is_acquired(&self) -> bool {
        self.firing_position().is_some()
    }

    pub fn firing_position(&self) -> Option<&StateSnapshot> {
        self.slot.get().and_then(Option::as_ref)
    }

    pub fn area_threshold(&self) -> f64 {
        self.area_threshold
    }
}
