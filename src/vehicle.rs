//! Vehicle SDK boundary
//!
//! `VehicleIO` is the narrow interface to the flight controller. All access
//! from the async tasks goes through a `VehicleLink`, which holds the
//! vehicle behind a `tokio::sync::Mutex` so only one request is in flight at
//! a time, and publishes the last actuator command for the estimator.
//! Takeoff, landing and disconnect may block for their whole timeout, so
//! they run on the blocking pool; the per-cycle calls run inline.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::{watch, Mutex};

use crate::error::{FlightError, FlightResult};
use crate::types::{ActuatorCommand, RawSensors};

/// Flight controller SDK calls.
///
/// `send_command` and `read_raw_sensors` are issued every control or sensor
/// cycle from async tasks and must return promptly. The others may block.
pub trait VehicleIO: Send + 'static {
    fn takeoff(&mut self, timeout: Duration) -> anyhow::Result<()>;

    fn land(&mut self, timeout: Duration) -> anyhow::Result<()>;

    /// Apply `command`. With a duration the vehicle holds it for that long
    /// and then reverts to hover; the call itself does not block.
    fn send_command(
        &mut self,
        command: ActuatorCommand,
        duration: Option<Duration>,
    ) -> anyhow::Result<()>;

    fn read_raw_sensors(&mut self) -> anyhow::Result<RawSensors>;

    fn disconnect(&mut self) -> anyhow::Result<()>;
}

pub struct VehicleLink<V: VehicleIO> {
    vehicle: Arc<Mutex<V>>,
    last_command: Arc<watch::Sender<ActuatorCommand>>,
}

impl<V: VehicleIO> Clone for VehicleLink<V> {
    fn clone(&self) -> Self {
        Self {
            vehicle: Arc::clone(&self.vehicle),
            last_command: Arc::clone(&self.last_command),
        }
    }
}

impl<V: VehicleIO> VehicleLink<V> {
    pub fn new(vehicle: V) -> Self {
        let (tx, _rx) = watch::channel(ActuatorCommand::HOVER);
        Self {
            vehicle: Arc::new(Mutex::new(vehicle)),
            last_command: Arc::new(tx),
        }
    }

    /// Run a blocking SDK call off the async workers, holding the link
    /// until it returns.
    async fn blocking<R, F>(&self, call: F) -> anyhow::Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut V) -> anyhow::Result<R> + Send + 'static,
    {
        let vehicle = Arc::clone(&self.vehicle);
        tokio::task::spawn_blocking(move || {
            let mut guard = vehicle.blocking_lock();
            call(&mut guard)
        })
        .await
        .map_err(|e| anyhow::anyhow!("vehicle task failed: {e}"))?
    }

    pub async fn takeoff(&self, timeout: Duration) -> FlightResult<()> {
        self.blocking(move |v| v.takeoff(timeout))
            .await
            .map_err(|e| FlightError::vehicle("takeoff", e))
    }

    pub async fn land(&self, timeout: Duration) -> FlightResult<()> {
        let result = self.blocking(move |v| v.land(timeout)).await;
        self.last_command.send_replace(ActuatorCommand::HOVER);
        result.map_err(FlightError::LandingFailed)
    }

    pub async fn send_command(
        &self,
        command: ActuatorCommand,
        duration: Option<Duration>,
    ) -> FlightResult<()> {
        self.vehicle
            .lock()
            .await
            .send_command(command, duration)
            .map_err(|e| FlightError::vehicle("send command", e))?;
        self.last_command.send_replace(command);
        debug!(
            "command pitch={:.1} roll={:.1} yaw={:.1} vertical={:.1}",
            command.pitch, command.roll, command.yaw, command.vertical
        );
        Ok(())
    }

    pub async fn read_raw_sensors(&self) -> FlightResult<RawSensors> {
        self.vehicle
            .lock()
            .await
            .read_raw_sensors()
            .map_err(|e| FlightError::vehicle("sensor read", e))
    }

    pub async fn disconnect(&self) -> FlightResult<()> {
        self.blocking(|v| v.disconnect())
            .await
            .map_err(|e| FlightError::vehicle("disconnect", e))
    }

    /// Last command accepted by the vehicle (hover before the first one)
    pub fn last_command(&self) -> ActuatorCommand {
        *self.last_command.borrow()
    }

    /// Run `f` against the vehicle while holding the link
    pub async fn with_vehicle<R>(&self, f: impl FnOnce(&mut V) -> R) -> R {
        let mut vehicle = self.vehicle.lock().await;
        f(&mut vehicle)
    }
}
