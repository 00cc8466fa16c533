use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Requests go to the primary backend.
    #[default]
    Closed,
    /// Requests are served from the in-memory fallback for the rest of the process.
    Open,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BreakerTransition {
    pub from: BreakerState,
    pub to: BreakerState,
    pub operation: String,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// One-way breaker: once the primary backend is declared unavailable it stays open.
#[derive(Debug, Clone, Default)]
pub struct FallbackBreaker {
    state: BreakerState,
    transitions: Vec<BreakerTransition>,
}

impl FallbackBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == BreakerState::Open
    }

    /// Opens the breaker. Returns false when it was already open.
    pub fn trip(&mut self, operation: &str, reason: &str, at: DateTime<Utc>) -> bool {
        if self.is_open() {
            return false;
        }
        warn!(
            event = "storage_breaker_open",
            operation,
            reason,
            "primary storage unavailable, serving from memory"
        );
        self.transitions.push(BreakerTransition {
            from: self.state,
            to: BreakerState::Open,
            operation: operation.to_string(),
            reason: reason.to_string(),
            at,
        });
        self.state = BreakerState::Open;
        true
    }

    pub fn transitions(&self) -> &[BreakerTransition] {
        &self.transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn trips_once_and_records_the_cause() {
        let at = Utc
            .with_ymd_and_hms(2026, 3, 2, 9, 30, 0)
            .single()
            .expect("valid timestamp");
        let mut breaker = FallbackBreaker::new();
        assert_eq!(breaker.state(), BreakerState::Closed);

        assert!(breaker.trip("leads", "permission-denied", at));
        assert!(!breaker.trip("rates", "not-found", at));

        assert!(breaker.is_open());
        assert_eq!(breaker.transitions().len(), 1);
        let transition = &breaker.transitions()[0];
        assert_eq!(transition.from, BreakerState::Closed);
        assert_eq!(transition.to, BreakerState::Open);
        assert_eq!(transition.operation, "leads");
        assert_eq!(transition.at, at);
    }
}
