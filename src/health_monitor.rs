use tokio::time::{Duration, Instant};

use crate::error::{FlightError, FlightResult};

/// Tracks how long the published estimate has gone without a new sequence
/// number.
#[derive(Clone, Debug)]
pub struct EstimateWatchdog {
    silence_threshold: Duration,
    last_sequence: Option<u64>,
    last_update: Instant,
}

impl EstimateWatchdog {
    pub fn new(silence_threshold: Duration, now: Instant) -> Self {
        EstimateWatchdog {
            silence_threshold,
            last_sequence: None,
            last_update: now,
        }
    }

    /// Record the sequence currently published. Fails with `EstimateStale`
    /// once the same sequence has been seen for longer than the threshold.
    pub fn observe(&mut self, sequence: u64, now: Instant) -> FlightResult<()> {
        if self.last_sequence != Some(sequence) {
            self.last_sequence = Some(sequence);
            self.last_update = now;
            return Ok(());
        }

        let silence = self.silence(now);
        if silence > self.silence_threshold {
            Err(FlightError::EstimateStale(silence.as_secs_f64()))
        } else {
            Ok(())
        }
    }

    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_sequences_keep_watchdog_quiet() {
        let t0 = Instant::now();
        let mut dog = EstimateWatchdog::new(Duration::from_secs(1), t0);
        for k in 0..50u64 {
            let now = t0 + Duration::from_millis(50 * k);
            assert!(dog.observe(k, now).is_ok());
        }
        assert_eq!(
            dog.silence(t0 + Duration::from_millis(2500)),
            Duration::from_millis(50)
        );
    }

    #[test]
    fn test_repeated_sequence_goes_stale() {
        let t0 = Instant::now();
        let mut dog = EstimateWatchdog::new(Duration::from_secs(1), t0);
        dog.observe(7, t0).unwrap();
        assert!(dog.observe(7, t0 + Duration::from_millis(900)).is_ok());

        let err = dog.observe(7, t0 + Duration::from_millis(1200)).unwrap_err();
        match err {
            FlightError::EstimateStale(secs) => assert!((secs - 1.2).abs() < 1e-9),
            other => panic!("unexpected error: {other}"),
        }

        // a new estimate clears it
        assert!(dog.observe(8, t0 + Duration::from_millis(1300)).is_ok());
    }
}
