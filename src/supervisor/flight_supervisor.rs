//! Mission sequencing
//!
//! The supervisor is the only writer of the flight phase. It reads the
//! filtered state through the telemetry watch channel, drives the position
//! controller during the climb and polls the acquisition latch once per
//! control cycle. Every failure path ends in a landing attempt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::time::{interval, sleep, timeout, Instant, MissedTickBehavior};

use crate::config::{secs, ClimbMode, FlightConfig, MissionConfig};
use crate::controller::PositionController;
use crate::error::{FlightError, FlightResult};
use crate::health_monitor::EstimateWatchdog;
use crate::mission_report::MissionReport;
use crate::sensors::{sensor_loop, telemetry_channel, Telemetry};
use crate::sink::ResultSink;
use crate::supervisor::{FlightPhase, TargetLatch};
use crate::types::{linalg::*, ActuatorCommand, StateSnapshot, VehicleFlightState};
use crate::vehicle::{VehicleIO, VehicleLink};
use crate::vision::{vision_loop, VisionFeed};

/// Result of one climb control cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClimbOutcome {
    Command(ActuatorCommand),
    Acquired,
}

pub struct FlightOutcome {
    pub report: MissionReport,
    /// Why the mission left the nominal sequence, if it did
    pub abort: Option<FlightError>,
    pub landing_failure: Option<FlightError>,
}

impl FlightOutcome {
    pub fn landed(&self) -> bool {
        self.landing_failure.is_none()
    }
}

struct ClimbState {
    controller: PositionController,
    watchdog: EstimateWatchdog,
    waypoints: u32,
}

pub struct FlightSupervisor<V: VehicleIO> {
    config: MissionConfig,
    link: VehicleLink<V>,
    telemetry: Telemetry,
    measurements_enabled: Arc<AtomicBool>,
    latch: Arc<TargetLatch>,
    sink: Box<dyn ResultSink>,
    phase: FlightPhase,
    phase_tx: watch::Sender<FlightPhase>,
    climb: Option<ClimbState>,
    report: MissionReport,
}

impl<V: VehicleIO> FlightSupervisor<V> {
    pub fn new(
        config: MissionConfig,
        link: VehicleLink<V>,
        telemetry: Telemetry,
        measurements_enabled: Arc<AtomicBool>,
        latch: Arc<TargetLatch>,
        sink: Box<dyn ResultSink>,
    ) -> Self {
        let (phase_tx, _) = watch::channel(FlightPhase::Ground);
        let report = MissionReport::new(config.detection_area_threshold);
        Self {
            config,
            link,
            telemetry,
            measurements_enabled,
            latch,
            sink,
            phase: FlightPhase::Ground,
            phase_tx,
            climb: None,
            report,
        }
    }

    /// Phase updates; the channel closes when the supervisor finishes.
    pub fn subscribe_phase(&self) -> watch::Receiver<FlightPhase> {
        self.phase_tx.subscribe()
    }

    pub fn phase(&self) -> FlightPhase {
        self.phase
    }

    /// Fly the whole mission. Never returns without a landing attempt.
    pub async fn run(mut self) -> FlightOutcome {
        info!("Mission start");
        let result = self.fly().await;
        self.finish(result.err()).await
    }

    fn transition(&mut self, next: FlightPhase) -> FlightResult<()> {
        if !self.phase.can_transition_to(next) {
            return Err(FlightError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        info!("Phase {} -> {}", self.phase, next);
        self.phase = next;
        self.phase_tx.send_replace(next);
        self.report.record_phase(next);
        Ok(())
    }

    async fn fly(&mut self) -> FlightResult<()> {
        self.transition(FlightPhase::Takeoff)?;
        self.link
            .takeoff(secs(self.config.takeoff_timeout_secs))
            .await?;
        let raw = self.link.read_raw_sensors().await?;
        if raw.flight_state == VehicleFlightState::Emergency {
            return Err(FlightError::VehicleEmergency);
        }

        self.transition(FlightPhase::Calibrating)?;
        self.wait_for_calibration().await?;
        self.measurements_enabled.store(true, Ordering::Release);
        let first = self.wait_for_first_estimate().await?;

        self.transition(FlightPhase::Climbing)?;
        self.begin_climb(&first, Instant::now())?;
        self.climb_until_acquired().await?;

        self.transition(FlightPhase::TargetAcquired)?;
        self.record_firing_position();
        let hover = secs(self.config.hover_after_acquire_secs);
        self.link
            .send_command(ActuatorCommand::HOVER, Some(hover))
            .await?;
        sleep(hover).await;

        self.fly_away().await
    }

    /// Fixed escape maneuver, flown without the estimator
    async fn fly_away(&mut self) -> FlightResult<()> {
        self.transition(FlightPhase::FlyAway)?;
        let maneuver = self.config.fly_away;
        info!(
            "Fly-away: roll {:.0} pitch {:.0} yaw {:.0} for {:.1}s",
            maneuver.roll, maneuver.pitch, maneuver.yaw, maneuver.duration_secs
        );
        self.link
            .send_command(maneuver.command(), Some(maneuver.duration()))
            .await?;
        sleep(maneuver.duration()).await;
        self.link.send_command(ActuatorCommand::HOVER, None).await?;
        Ok(())
    }

    async fn wait_for_calibration(&mut self) -> FlightResult<()> {
        let limit = self.config.calibration_timeout_secs;
        let poll = secs(self.config.calibration_poll_secs);
        match timeout(secs(limit), poll_calibration(&self.link, poll)).await {
            Ok(Ok(timestamp)) => {
                info!("Sensors calibrated (timestamp {:.2})", timestamp);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(FlightError::CalibrationTimeout(limit)),
        }
    }

    async fn wait_for_first_estimate(&mut self) -> FlightResult<StateSnapshot> {
        let limit = self.config.first_estimate_timeout_secs;
        let mut snapshots = self.telemetry.snapshots.clone();
        let first = match timeout(secs(limit), snapshots.wait_for(Option::is_some)).await {
            Ok(Ok(snapshot)) => snapshot.clone(),
            Ok(Err(_)) | Err(_) => None,
        };
        first.ok_or(FlightError::EstimateStale(limit))
    }

    /// Build the controller at `snapshot` with the first waypoint one climb
    /// step above it.
    fn begin_climb(&mut self, snapshot: &StateSnapshot, now: Instant) -> FlightResult<()> {
        let position = snapshot.position();
        let mut desired = StateVec::zeros(STATE_DIM);
        desired[POS_X] = position.x;
        desired[POS_Y] = position.y;
        desired[POS_Z] = position.z + self.config.climb_step;

        let mut controller = PositionController::new(
            self.config.controller,
            self.config.actuator_limit,
            snapshot.state.clone(),
        )?;
        controller.set_desired_state(desired)?;

        let mut watchdog = EstimateWatchdog::new(secs(self.config.estimate_timeout_secs), now);
        watchdog.observe(snapshot.sequence, now)?;

        info!(
            "Climb ({:?}) from {:.2} m, first waypoint {:.2} m",
            self.config.climb_mode,
            position.z,
            position.z + self.config.climb_step
        );
        self.climb = Some(ClimbState {
            controller,
            watchdog,
            waypoints: 0,
        });
        Ok(())
    }

    async fn climb_until_acquired(&mut self) -> FlightResult<()> {
        let mut ticker = interval(self.config.control_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let snapshot = self.telemetry.snapshots.borrow().clone();
            let Some(snapshot) = snapshot else {
                continue;
            };
            let flight_state = *self.telemetry.flight_state.borrow();

            match self.climb_cycle(&snapshot, flight_state, Instant::now())? {
                ClimbOutcome::Command(command) => self.link.send_command(command, None).await?,
                ClimbOutcome::Acquired => return Ok(()),
            }
        }
    }

    /// One control cycle of the climb: latch first, then the abort checks,
    /// then the next command.
    fn climb_cycle(
        &mut self,
        snapshot: &StateSnapshot,
        flight_state: VehicleFlightState,
        now: Instant,
    ) -> FlightResult<ClimbOutcome> {
        if self.latch.is_acquired() {
            return Ok(ClimbOutcome::Acquired);
        }
        if flight_state == VehicleFlightState::Emergency {
            return Err(FlightError::VehicleEmergency);
        }

        let Some(climb) = self.climb.as_mut() else {
            return Err(FlightError::InvalidTransition {
                from: self.phase,
                to: FlightPhase::Climbing,
            });
        };

        climb.watchdog.observe(snapshot.sequence, now)?;
        climb.controller.set_current_state(snapshot.state.clone())?;

        let altitude = snapshot.altitude();
        if altitude >= self.config.max_altitude {
            return Err(FlightError::AltitudeExceeded {
                altitude,
                limit: self.config.max_altitude,
            });
        }
        let distance = climb.controller.distance_to_target();
        if distance >= self.config.max_distance {
            return Err(FlightError::DistanceExceeded {
                distance,
                limit: self.config.max_distance,
            });
        }

        let command = match self.config.climb_mode {
            ClimbMode::Controlled => {
                if distance <= self.config.position_tolerance {
                    let mut desired = climb.controller.desired_state().clone();
                    desired[POS_Z] += self.config.climb_step;
                    climb.waypoints += 1;
                    debug!(
                        "Waypoint {} reached at {:.2} m, next {:.2} m",
                        climb.waypoints, altitude, desired[POS_Z]
                    );
                    climb.controller.set_desired_state(desired)?;
                }
                climb.controller.command()
            }
            ClimbMode::Direct => {
                ActuatorCommand::new(0.0, 0.0, 0.0, self.config.direct_climb_vertical)
                    .clamped(self.config.actuator_limit)
            }
        };
        Ok(ClimbOutcome::Command(command))
    }

    fn record_firing_position(&mut self) {
        let Some(firing) = self.latch.firing_position().cloned() else {
            warn!("Latch reported acquisition without a firing position");
            return;
        };
        info!(
            "Firing position ({:.2}, {:.2}, {:.2}) from estimate #{}",
            firing.state[POS_X], firing.state[POS_Y], firing.state[POS_Z], firing.sequence
        );

        match self.sink.persist(&firing.state) {
            Ok(()) => self.report.firing_position_persisted = true,
            Err(e) => warn!("{}", FlightError::PersistFailure(format!("{e:#}"))),
        }
        self.report.firing_position = Some(firing);
    }

    /// Failure routing and the unconditional landing attempt
    async fn finish(mut self, abort: Option<FlightError>) -> FlightOutcome {
        // the vision task may fire between the last climb cycle and here
        if self.latch.close().is_some() && self.report.firing_position.is_none() {
            info!("Target latched after the climb ended in {}", self.phase);
            self.record_firing_position();
        }

        if let Some(e) = &abort {
            if e.is_abort() {
                warn!("Mission aborted during {}: {}", self.phase, e);
            } else {
                error!("Mission failed during {}: {}", self.phase, e);
            }
            self.report.abort_reason = Some(e.to_string());
            if let Err(e) = self.transition(FlightPhase::Failed) {
                error!("{}", e);
            }
            if e.allows_fly_away() {
                if let Err(e) = self.fly_away().await {
                    error!("Fly-away after abort failed: {}", e);
                    if let Err(e) = self.transition(FlightPhase::Failed) {
                        error!("{}", e);
                    }
                }
            }
        }

        if let Err(e) = self.transition(FlightPhase::Landing) {
            error!("{}", e);
        }
        let landing_failure = match self.link.land(secs(self.config.land_timeout_secs)).await {
            Ok(()) => {
                if let Err(e) = self.transition(FlightPhase::Done) {
                    error!("{}", e);
                }
                None
            }
            Err(e) => {
                error!("{}", e);
                self.report.landing_error = Some(e.to_string());
                if let Err(e) = self.transition(FlightPhase::Failed) {
                    error!("{}", e);
                }
                Some(e)
            }
        };

        self.measurements_enabled.store(false, Ordering::Release);
        if let Err(e) = self.link.disconnect().await {
            warn!("{}", e);
        }
        self.report.finish();
        info!("Mission finished in phase {}", self.phase);

        FlightOutcome {
            report: self.report,
            abort,
            landing_failure,
        }
    }
}

async fn poll_calibration<V: VehicleIO>(
    link: &VehicleLink<V>,
    poll: Duration,
) -> FlightResult<f64> {
    loop {
        let raw = link.read_raw_sensors().await?;
        if raw.flight_state == VehicleFlightState::Emergency {
            return Err(FlightError::VehicleEmergency);
        }
        if raw.is_calibrated() {
            return Ok(raw.timestamp);
        }
        sleep(poll).await;
    }
}

/// Wire the sensor and vision tasks to a supervisor and fly one mission.
/// `config` must pass `FlightConfig::validate`.
pub async fn run_mission<V, F>(
    config: &FlightConfig,
    link: VehicleLink<V>,
    camera: F,
    sink: Box<dyn ResultSink>,
) -> FlightOutcome
where
    V: VehicleIO,
    F: VisionFeed,
{
    let (publisher, telemetry) = telemetry_channel();
    let latch = Arc::new(TargetLatch::new(config.mission.detection_area_threshold));
    let measurements_enabled = Arc::new(AtomicBool::new(false));

    let supervisor = FlightSupervisor::new(
        config.mission.clone(),
        link.clone(),
        telemetry.clone(),
        Arc::clone(&measurements_enabled),
        Arc::clone(&latch),
        sink,
    );

    let sensor_task = tokio::spawn(sensor_loop(
        link,
        config.estimator.clone(),
        measurements_enabled,
        publisher,
        supervisor.subscribe_phase(),
    ));
    let vision_task = tokio::spawn(vision_loop(
        camera,
        latch,
        telemetry.snapshots,
        supervisor.subscribe_phase(),
        config.mission.vision_period(),
    ));

    let mut outcome = supervisor.run().await;

    match sensor_task.await {
        Ok(summary) => outcome.report.absorb_sensors(&summary),
        Err(e) => error!("Sensor task failed: {}", e),
    }
    match vision_task.await {
        Ok(summary) => outcome.report.absorb_vision(&summary),
        Err(e) => error!("Vision task failed: {}", e),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimConfig, SimulatedVehicle, SyntheticCamera};
    use crate::supervisor::LatchOutcome;
    use crate::types::BoundingBox;
    use approx::assert_relative_eq;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct MemorySink(Arc<Mutex<Vec<StateVec>>>);

    impl ResultSink for MemorySink {
        fn persist(&mut self, state: &StateVec) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(state.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl ResultSink for FailingSink {
        fn persist(&mut self, _state: &StateVec) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
    }

    fn snapshot_at(sequence: u64, x: f64, z: f64) -> StateSnapshot {
        let mut state = StateVec::zeros(STATE_DIM);
        state[POS_X] = x;
        state[POS_Z] = z;
        StateSnapshot {
            sequence,
            timestamp: sequence as f64 * 0.05,
            state,
        }
    }

    fn climbing_supervisor(
        mission: MissionConfig,
    ) -> (FlightSupervisor<SimulatedVehicle>, VehicleLink<SimulatedVehicle>) {
        let link = VehicleLink::new(SimulatedVehicle::new(SimConfig::default()));
        let (_publisher, telemetry) = telemetry_channel();
        let latch = Arc::new(TargetLatch::new(mission.detection_area_threshold));
        let mut sup = FlightSupervisor::new(
            mission,
            link.clone(),
            telemetry,
            Arc::new(AtomicBool::new(false)),
            latch,
            Box::new(MemorySink::default()),
        );
        for phase in [
            FlightPhase::Takeoff,
            FlightPhase::Calibrating,
            FlightPhase::Climbing,
        ] {
            sup.transition(phase).unwrap();
        }
        (sup, link)
    }

    #[tokio::test(start_paused = true)]
    async fn test_altitude_limit_aborts_climb_and_lands() {
        let (mut sup, link) = climbing_supervisor(MissionConfig::default());
        let now = Instant::now();
        sup.begin_climb(&snapshot_at(1, 0.0, 0.5), now).unwrap();

        let mut abort = None;
        for (k, altitude) in [0.5, 1.2, 2.9, 3.1].into_iter().enumerate() {
            let snap = snapshot_at(k as u64 + 2, 0.0, altitude);
            match sup.climb_cycle(&snap, VehicleFlightState::Nominal, now) {
                Ok(ClimbOutcome::Command(_)) => assert!(k < 3, "reading {k} should abort"),
                Ok(ClimbOutcome::Acquired) => panic!("no detection was offered"),
                Err(e) => {
                    assert_eq!(k, 3);
                    abort = Some(e);
                    break;
                }
            }
        }
        let abort = abort.unwrap();
        assert!(matches!(abort, FlightError::AltitudeExceeded { altitude, .. } if altitude == 3.1));

        let outcome = sup.finish(Some(abort)).await;
        assert_eq!(
            outcome.report.phase_sequence(),
            vec![
                FlightPhase::Ground,
                FlightPhase::Takeoff,
                FlightPhase::Calibrating,
                FlightPhase::Climbing,
                FlightPhase::Failed,
                FlightPhase::FlyAway,
                FlightPhase::Landing,
                FlightPhase::Done,
            ]
        );
        assert!(outcome.landed());
        assert!(outcome.report.firing_position.is_none());
        assert!(link.with_vehicle(|v| v.has_landed()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detection_after_abort_is_still_persisted() {
        let link = VehicleLink::new(SimulatedVehicle::new(SimConfig::default()));
        let (_publisher, telemetry) = telemetry_channel();
        let latch = Arc::new(TargetLatch::new(62648.0));
        let sink = MemorySink::default();
        let records = Arc::clone(&sink.0);
        let mut sup = FlightSupervisor::new(
            MissionConfig::default(),
            link.clone(),
            telemetry,
            Arc::new(AtomicBool::new(false)),
            Arc::clone(&latch),
            Box::new(sink),
        );
        for phase in [
            FlightPhase::Takeoff,
            FlightPhase::Calibrating,
            FlightPhase::Climbing,
        ] {
            sup.transition(phase).unwrap();
        }
        let now = Instant::now();
        sup.begin_climb(&snapshot_at(1, 0.0, 0.5), now).unwrap();

        let err = sup
            .climb_cycle(&snapshot_at(2, 0.0, 3.1), VehicleFlightState::Nominal, now)
            .unwrap_err();
        assert!(matches!(err, FlightError::AltitudeExceeded { .. }));

        // vision fires while the phase is still Climbing
        let firing = snapshot_at(2, 0.0, 2.9);
        let bbox = BoundingBox::new(0.0, 0.0, 300.0, 300.0);
        assert_eq!(latch.offer(&bbox, &firing), LatchOutcome::Fired);

        let outcome = sup.finish(Some(err)).await;
        assert_eq!(outcome.report.firing_position.as_ref(), Some(&firing));
        assert!(outcome.report.firing_position_persisted);
        assert_eq!(*records.lock().unwrap(), vec![firing.state.clone()]);

        // closed for good
        assert_eq!(
            latch.offer(&bbox, &snapshot_at(3, 0.0, 3.0)),
            LatchOutcome::Closed
        );
        assert_eq!(outcome.report.final_phase(), FlightPhase::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emergency_abort_skips_fly_away() {
        let (mut sup, _link) = climbing_supervisor(MissionConfig::default());
        sup.begin_climb(&snapshot_at(1, 0.0, 0.5), Instant::now()).unwrap();
        let err = sup
            .climb_cycle(
                &snapshot_at(2, 0.0, 0.6),
                VehicleFlightState::Emergency,
                Instant::now(),
            )
            .unwrap_err();

        let outcome = sup.finish(Some(err)).await;
        assert!(!outcome
            .report
            .phase_sequence()
            .contains(&FlightPhase::FlyAway));
        assert_eq!(outcome.report.final_phase(), FlightPhase::Done);
    }

    #[tokio::test]
    async fn test_distance_limit_aborts_climb() {
        let (mut sup, _link) = climbing_supervisor(MissionConfig::default());
        let now = Instant::now();
        sup.begin_climb(&snapshot_at(1, 0.0, 0.5), now).unwrap();

        let err = sup
            .climb_cycle(&snapshot_at(2, 3.5, 0.6), VehicleFlightState::Nominal, now)
            .unwrap_err();
        match err {
            FlightError::DistanceExceeded { distance, limit } => {
                assert_relative_eq!(distance, 3.5, epsilon = 1e-12);
                assert_eq!(limit, 3.0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_waypoint_advances_only_within_tolerance() {
        let (mut sup, _link) = climbing_supervisor(MissionConfig::default());
        let now = Instant::now();
        sup.begin_climb(&snapshot_at(1, 0.0, 1.0), now).unwrap();
        let waypoint = |sup: &FlightSupervisor<SimulatedVehicle>| {
            sup.climb.as_ref().unwrap().controller.desired_state()[POS_Z]
        };
        assert_relative_eq!(waypoint(&sup), 1.1, epsilon = 1e-12);

        // 0.1 m short of the waypoint: keep tracking it
        sup.climb_cycle(&snapshot_at(2, 0.0, 1.0), VehicleFlightState::Nominal, now)
            .unwrap();
        assert_relative_eq!(waypoint(&sup), 1.1, epsilon = 1e-12);

        // inside tolerance: next waypoint
        let outcome = sup
            .climb_cycle(&snapshot_at(3, 0.0, 1.05), VehicleFlightState::Nominal, now)
            .unwrap();
        assert_relative_eq!(waypoint(&sup), 1.2, epsilon = 1e-12);
        match outcome {
            ClimbOutcome::Command(cmd) => assert!(cmd.vertical > 0.0),
            ClimbOutcome::Acquired => panic!("no detection was offered"),
        }
    }

    #[tokio::test]
    async fn test_direct_mode_sends_fixed_vertical() {
        let mission = MissionConfig {
            climb_mode: ClimbMode::Direct,
            ..MissionConfig::default()
        };
        let (mut sup, _link) = climbing_supervisor(mission);
        let now = Instant::now();
        sup.begin_climb(&snapshot_at(1, 0.0, 0.5), now).unwrap();
        let outcome = sup
            .climb_cycle(&snapshot_at(2, 0.0, 0.5), VehicleFlightState::Nominal, now)
            .unwrap();
        assert_eq!(
            outcome,
            ClimbOutcome::Command(ActuatorCommand::new(0.0, 0.0, 0.0, 30.0))
        );
    }

    #[tokio::test]
    async fn test_latch_ends_climb_before_abort_checks() {
        let (mut sup, _link) = climbing_supervisor(MissionConfig::default());
        let now = Instant::now();
        sup.begin_climb(&snapshot_at(1, 0.0, 0.5), now).unwrap();

        let bbox = BoundingBox::new(0.0, 0.0, 300.0, 300.0);
        sup.latch.offer(&bbox, &snapshot_at(2, 0.0, 1.4));
        // altitude over the limit, but the latch wins this cycle
        let outcome = sup
            .climb_cycle(&snapshot_at(3, 0.0, 3.2), VehicleFlightState::Nominal, now)
            .unwrap();
        assert_eq!(outcome, ClimbOutcome::Acquired);
    }

    #[tokio::test]
    async fn test_emergency_and_stale_estimate_abort() {
        let (mut sup, _link) = climbing_supervisor(MissionConfig::default());
        let now = Instant::now();
        sup.begin_climb(&snapshot_at(1, 0.0, 0.5), now).unwrap();

        let err = sup
            .climb_cycle(&snapshot_at(2, 0.0, 0.5), VehicleFlightState::Emergency, now)
            .unwrap_err();
        assert!(matches!(err, FlightError::VehicleEmergency));

        // sequence 2 was never observed by the watchdog, so this one is fresh
        sup.climb_cycle(&snapshot_at(2, 0.0, 0.5), VehicleFlightState::Nominal, now)
            .unwrap();
        let err = sup
            .climb_cycle(
                &snapshot_at(2, 0.0, 0.5),
                VehicleFlightState::Nominal,
                now + Duration::from_millis(1500),
            )
            .unwrap_err();
        assert!(matches!(err, FlightError::EstimateStale(_)));
    }

    // ── Full missions against the simulator ──

    fn sim_link(config: SimConfig) -> (VehicleLink<SimulatedVehicle>, SyntheticCamera) {
        let sim = SimulatedVehicle::new(config);
        let camera = SyntheticCamera::new(sim.truth(), 1.5);
        (VehicleLink::new(sim), camera)
    }

    #[tokio::test(start_paused = true)]
    async fn test_nominal_mission_latches_once_and_lands() {
        let (link, camera) = sim_link(SimConfig::default());
        let sink = MemorySink::default();
        let records = Arc::clone(&sink.0);

        let outcome = run_mission(&FlightConfig::default(), link.clone(), camera, Box::new(sink)).await;

        assert!(outcome.abort.is_none(), "aborted: {:?}", outcome.abort);
        assert!(outcome.landed());
        assert_eq!(
            outcome.report.phase_sequence(),
            vec![
                FlightPhase::Ground,
                FlightPhase::Takeoff,
                FlightPhase::Calibrating,
                FlightPhase::Climbing,
                FlightPhase::TargetAcquired,
                FlightPhase::FlyAway,
                FlightPhase::Landing,
                FlightPhase::Done,
            ]
        );
        assert!(outcome.report.is_success());
        assert!(outcome.report.firing_position_persisted);

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 1);
        let firing = outcome.report.firing_position.as_ref().unwrap();
        assert_eq!(records[0], firing.state);
        assert!(firing.altitude() > 1.2 && firing.altitude() < 1.8);

        assert!(outcome.report.estimator_updates > 0);
        assert!(outcome.report.frames_processed > 0);
        assert!(link.with_vehicle(|v| v.has_landed() && !v.is_connected()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_climb_mission() {
        let (link, camera) = sim_link(SimConfig::default());
        let mut config = FlightConfig::default();
        config.mission.climb_mode = ClimbMode::Direct;

        let outcome = run_mission(&config, link, camera, Box::new(MemorySink::default())).await;
        assert!(outcome.abort.is_none(), "aborted: {:?}", outcome.abort);
        assert!(outcome.report.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_emergency_on_takeoff_forces_landing() {
        let (link, camera) = sim_link(SimConfig {
            emergency_after_secs: Some(0.0),
            ..SimConfig::default()
        });
        let outcome = run_mission(
            &FlightConfig::default(),
            link.clone(),
            camera,
            Box::new(MemorySink::default()),
        )
        .await;

        assert!(matches!(outcome.abort, Some(FlightError::VehicleEmergency)));
        assert_eq!(
            outcome.report.phase_sequence(),
            vec![
                FlightPhase::Ground,
                FlightPhase::Takeoff,
                FlightPhase::Failed,
                FlightPhase::Landing,
                FlightPhase::Done,
            ]
        );
        assert!(link.with_vehicle(|v| v.has_landed()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibration_timeout_forces_landing() {
        let (link, camera) = sim_link(SimConfig {
            calibration_delay_secs: 100.0,
            ..SimConfig::default()
        });
        let mut config = FlightConfig::default();
        config.mission.calibration_timeout_secs = 2.0;

        let outcome = run_mission(&config, link.clone(), camera, Box::new(MemorySink::default())).await;
        assert!(matches!(outcome.abort, Some(FlightError::CalibrationTimeout(t)) if t == 2.0));
        assert_eq!(outcome.report.final_phase(), FlightPhase::Done);
        assert_eq!(outcome.report.estimator_updates, 0);
        assert!(link.with_vehicle(|v| v.has_landed()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persist_failure_does_not_abort() {
        let (link, camera) = sim_link(SimConfig::default());
        let outcome = run_mission(&FlightConfig::default(), link, camera, Box::new(FailingSink)).await;

        assert!(outcome.abort.is_none());
        assert!(outcome.report.firing_position.is_some());
        assert!(!outcome.report.firing_position_persisted);
        assert_eq!(outcome.report.final_phase(), FlightPhase::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_landing_failure_is_surfaced() {
        let (link, camera) = sim_link(SimConfig {
            emergency_after_secs: Some(0.0),
            fail_landing: true,
            ..SimConfig::default()
        });
        let outcome = run_mission(
            &FlightConfig::default(),
            link,
            camera,
            Box::new(MemorySink::default()),
        )
        .await;

        assert!(matches!(outcome.landing_failure, Some(FlightError::LandingFailed(_))));
        assert_eq!(outcome.report.final_phase(), FlightPhase::Failed);
        assert!(outcome.report.landing_error.is_some());
    }
}
