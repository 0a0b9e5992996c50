use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::EstimatorConfig;
use crate::error::EstimatorError;
use crate::filters::StateEstimator;
use crate::supervisor::FlightPhase;
use crate::types::{linalg::*, RawSensors, StateSnapshot, VehicleFlightState};
use crate::vehicle::{VehicleIO, VehicleLink};

/// Publishing half of the telemetry channels. The sensor task is the only
/// writer of both.
pub struct TelemetryPublisher {
    pub snapshots: watch::Sender<Option<StateSnapshot>>,
    pub flight_state: watch::Sender<VehicleFlightState>,
}

/// Read half handed to the supervisor and the vision task
#[derive(Clone)]
pub struct Telemetry {
    pub snapshots: watch::Receiver<Option<StateSnapshot>>,
    pub flight_state: watch::Receiver<VehicleFlightState>,
}

pub fn telemetry_channel() -> (TelemetryPublisher, Telemetry) {
    let (snap_tx, snap_rx) = watch::channel(None);
    let (state_tx, state_rx) = watch::channel(VehicleFlightState::Nominal);
    (
        TelemetryPublisher {
            snapshots: snap_tx,
            flight_state: state_tx,
        },
        Telemetry {
            snapshots: snap_rx,
            flight_state: state_rx,
        },
    )
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SensorSummary {
    pub samples: u64,
    pub read_errors: u64,
    pub estimator_updates: u64,
    pub estimator_faults: u64,
}

/// Initial state from the first calibrated sample: measured position and
/// velocity, everything else zero.
pub fn seed_state(raw: &RawSensors) -> StateVec {
    let mut x0 = StateVec::zeros(STATE_DIM);
    x0[POS_X] = raw.position.x;
    x0[POS_Y] = raw.position.y;
    x0[POS_Z] = raw.position.z;
    x0[VEL_X] = raw.velocity.x;
    x0[VEL_Y] = raw.velocity.y;
    x0[VEL_Z] = raw.velocity.z;
    x0
}

/// Sensor task: one estimator cycle per sample period.
///
/// Reads the vehicle every tick and republishes its flight state. Once
/// `measurements_enabled` is set and the sensors report a calibrated sample,
/// the estimator is seeded from that sample and stepped with every
/// following one, using the last command sent as the control input. Each
/// successful step publishes a new snapshot; a faulted step leaves the
/// previous snapshot in place. Runs until the supervisor's phase channel
/// closes.
pub async fn sensor_loop<V: VehicleIO>(
    link: VehicleLink<V>,
    config: EstimatorConfig,
    measurements_enabled: Arc<AtomicBool>,
    publisher: TelemetryPublisher,
    mut phase: watch::Receiver<FlightPhase>,
) -> SensorSummary {
    let mut ticker = interval(config.sample_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut summary = SensorSummary::default();
    let mut estimator: Option<StateEstimator> = None;
    let mut sequence = 0u64;

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

        let raw = match link.read_raw_sensors().await {
            Ok(raw) => raw,
            Err(e) => {
                summary.read_errors += 1;
                warn!("[sensors] {}", e);
                continue;
            }
        };
        summary.samples += 1;

        publisher.flight_state.send_if_modified(|state| {
            let changed = *state != raw.flight_state;
            *state = raw.flight_state;
            changed
        });

        if !measurements_enabled.load(Ordering::Acquire) || !raw.is_calibrated() {
            continue;
        }

        if estimator.is_none() {
            match config.build_estimator(seed_state(&raw)) {
                Ok(kf) => {
                    info!(
                        "[sensors] Estimator seeded at ({:.2}, {:.2}, {:.2})",
                        raw.position.x, raw.position.y, raw.position.z
                    );
                    estimator = Some(kf);
                }
                Err(e) => {
                    error!("[sensors] Estimator construction failed: {}", e);
                    break;
                }
            }
        }
        let Some(kf) = estimator.as_mut() else {
            continue;
        };

        let u = link.last_command().to_input();
        match kf.step(&raw.measurement(), &u) {
            Ok(state) => {
                sequence += 1;
                publisher.snapshots.send_replace(Some(StateSnapshot {
                    sequence,
                    timestamp: raw.timestamp,
                    state,
                }));
                if sequence % 100 == 0 {
                    debug!("[sensors] {} estimator cycles", sequence);
                }
            }
            Err(EstimatorError::SingularInnovationCovariance) => {
                debug!("[sensors] Snapshot {} held after estimator fault", sequence);
            }
            Err(e) => {
                error!("[sensors] Estimator step rejected: {}", e);
            }
        }
    }

    if let Some(kf) = &estimator {
        summary.estimator_updates = kf.update_count();
        summary.estimator_faults = kf.fault_count();
    }
    info!(
        "[sensors] Stopped after {} samples ({} estimator updates, {} faults)",
        summary.samples, summary.estimator_updates, summary.estimator_faults
    );
    summary
}
