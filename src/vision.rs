//! Camera boundary and the acquisition monitor
//!
//! The monitor polls the feed at frame rate while the supervisor is
//! climbing and offers every detection to the shared `TargetLatch`. It
//! never blocks the control loop: the supervisor only reads the latch.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::supervisor::{FlightPhase, LatchOutcome, TargetLatch};
use crate::types::{BoundingBox, StateSnapshot};

pub trait VisionFeed: Send + 'static {
    type Frame: Send;

    /// Most recent frame, `None` when nothing new has arrived
    fn latest_frame(&mut self) -> anyhow::Result<Option<Self::Frame>>;

    fn detect(&mut self, frame: &Self::Frame) -> anyhow::Result<Option<BoundingBox>>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VisionSummary {
    pub frames: u64,
    pub detections: u64,
    pub feed_errors: u64,
    pub max_area: f64,
    pub fired: bool,
}

pub async fn vision_loop<F: VisionFeed>(
    mut feed: F,
    latch: Arc<TargetLatch>,
    snapshots: watch::Receiver<Option<StateSnapshot>>,
    mut phase: watch::Receiver<FlightPhase>,
    period: Duration,
) -> VisionSummary {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut summary = VisionSummary::default();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = phase.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        }

        if *phase.borrow() != FlightPhase::Climbing {
            continue;
        }

        let frame = match feed.latest_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => {
                summary.feed_errors += 1;
                warn!("[vision] Frame capture failed: {}", e);
                continue;
            }
        };
        summary.frames += 1;

        let bbox = match feed.detect(&frame) {
            Ok(Some(bbox)) => bbox,
            Ok(None) => continue,
            Err(e) => {
                summary.feed_errors += 1;
                warn!("[vision] Detector failed: {}", e);
                continue;
            }
        };
        summary.detections += 1;
        summary.max_area = summary.max_area.max(bbox.area());

        // detections before the first estimate cannot be latched
        let Some(snapshot) = snapshots.borrow().clone() else {
            continue;
        };

        match latch.offer(&bbox, &snapshot) {
            LatchOutcome::Fired => {
                summary.fired = true;
                let p = snapshot.position();
                info!(
                    "[vision] Target acquired: area {:.0} px² at ({:.2}, {:.2}, {:.2}), estimate #{}",
                    bbox.area(),
                    p.x,
                    p.y,
                    p.z,
                    snapshot.sequence
                );
            }
            LatchOutcome::BelowThreshold { area } => {
                debug!(
                    "[vision] Detection {:.0} px² below threshold {:.0}",
                    area,
                    latch.area_threshold()
                );
            }
            LatchOutcome::AlreadyLatched => trace!("[vision] Latch already set"),
            LatchOutcome::Closed => trace!("[vision] Latch closed, detection ignored"),
        }
    }

    info!(
        "[vision] Stopped after {} frames, {} detections",
        summary.frames, summary.detections
    );
    summary
}
