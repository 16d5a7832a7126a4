//! Device position requests.
//!
//! The device pushes position fixes (or positioning failures) into a
//! [`FixSlot`]; capture and locate actions request a position from the slot
//! with a caller-supplied timeout. A timeout is an error outcome, never a
//! retry.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

// ---

/// A reported coordinate with its accuracy radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
    #[serde(alias = "accuracy")]
    pub accuracy_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    Unavailable,
    #[error("timed out waiting for a position")]
    Timeout,
}

#[derive(Debug, Clone)]
struct TimedFix {
    fix: Result<Position, PositionError>,
    at: Instant,
}

/// Latest position report from the device.
#[derive(Debug)]
pub struct FixSlot {
    tx: watch::Sender<Option<TimedFix>>,
    max_age: Duration,
}

impl FixSlot {
    // ---
    /// `max_age` bounds how old a cached fix may be and still answer a
    /// request without waiting.
    pub fn new(max_age: Duration) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx, max_age }
    }

    /// Record a new fix or positioning failure.
    pub fn report(&self, fix: Result<Position, PositionError>) {
        // ---
        match &fix {
            Ok(p) => tracing::debug!(lat = p.lat, lng = p.lng, accuracy_m = p.accuracy_m, "position fix"),
            Err(e) => tracing::debug!(error = %e, "positioning failure"),
        }
        self.tx.send_replace(Some(TimedFix {
            fix,
            at: Instant::now(),
        }));
    }

    /// Return a fresh cached fix, or wait up to `timeout` for the next one.
    pub async fn request(&self, timeout: Duration) -> Result<Position, PositionError> {
        // ---
        let mut rx = self.tx.subscribe();

        let cached = rx
            .borrow_and_update()
            .as_ref()
            .filter(|f| f.at.elapsed() <= self.max_age)
            .map(|f| f.fix);
        if let Some(fix) = cached {
            return fix;
        }

        match tokio::time::timeout(timeout, rx.changed()).await {
            Ok(Ok(())) => rx
                .borrow_and_update()
                .as_ref()
                .map(|f| f.fix)
                .unwrap_or(Err(PositionError::Unavailable)),
            Ok(Err(_)) => Err(PositionError::Unavailable),
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "position request timed out");
                Err(PositionError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::sync::Arc;

    fn fix() -> Position {
        Position {
            lat: 12.8406,
            lng: 80.1534,
            accuracy_m: 8.0,
        }
    }

    #[tokio::test]
    async fn test_cached_fix_answers_immediately() {
        // ---
        let slot = FixSlot::new(Duration::from_secs(30));
        slot.report(Ok(fix()));
        assert_eq!(slot.request(Duration::from_millis(10)).await, Ok(fix()));
    }

    #[tokio::test]
    async fn test_no_fix_times_out() {
        // ---
        let slot = FixSlot::new(Duration::from_secs(30));
        assert_eq!(
            slot.request(Duration::from_millis(20)).await,
            Err(PositionError::Timeout)
        );
    }

    #[tokio::test]
    async fn test_stale_fix_waits_for_next_report() {
        // ---
        let slot = Arc::new(FixSlot::new(Duration::ZERO));
        slot.report(Err(PositionError::Unavailable));
        tokio::time::sleep(Duration::from_millis(5)).await;

        let reporter = slot.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            reporter.report(Ok(fix()));
        });

        assert_eq!(slot.request(Duration::from_secs(2)).await, Ok(fix()));
    }

    #[tokio::test]
    async fn test_reported_failure_is_surfaced() {
        // ---
        let slot = FixSlot::new(Duration::from_secs(30));
        slot.report(Err(PositionError::PermissionDenied));
        assert_eq!(
            slot.request(Duration::from_millis(10)).await,
            Err(PositionError::PermissionDenied)
        );
    }

    #[test]
    fn test_position_accepts_accuracy_alias() {
        // ---
        let p: Position =
            serde_json::from_str(r#"{"lat": 12.8, "lng": 80.1, "accuracy": 12.0}"#).unwrap();
        assert_eq!(p.accuracy_m, 12.0);
    }
}
