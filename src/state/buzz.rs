use std::time::{Duration, Instant};

use tracing::debug;
use uuid::Uuid;

use crate::error::EngineError;
use crate::state::state_machine::Phase;

/// Buzz command sent and not yet answered by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingBuzz {
    /// Correlation id carried on the outbound command.
    pub id: Uuid,
    /// Local send time.
    pub sent_at: Instant,
    /// Round the buzz was sent in.
    pub round: u32,
}

/// Optimistic enable/disable state of the local buzz control.
#[derive(Debug, Clone)]
pub struct BuzzControl {
    enabled: bool,
    pending: Option<PendingBuzz>,
    ack_timeout: Duration,
}

impl BuzzControl {
    /// Disabled control waiting at most `ack_timeout` for acknowledgments.
    pub fn new(ack_timeout: Duration) -> Self {
        Self {
            enabled: false,
            pending: None,
            ack_timeout,
        }
    }

    /// Whether a buzz may be sent right now.
    pub fn can_buzz(&self) -> bool {
        self.enabled && self.pending.is_none()
    }

    /// Outstanding buzz, if any.
    pub fn pending(&self) -> Option<&PendingBuzz> {
        self.pending.as_ref()
    }

    /// Enable for a fresh or reopened round, forgetting any outstanding buzz.
    pub fn enable(&mut self) {
        self.enabled = true;
        self.pending = None;
    }

    /// Disable, as when the buzzer is locked or the round closes.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.pending = None;
    }

    /// Disable optimistically and remember the buzz `id`. `false` when the control is disabled.
    pub fn request(&mut self, id: Uuid, now: Instant, round: u32) -> bool {
        if !self.can_buzz() {
            return false;
        }
        self.enabled = false;
        self.pending = Some(PendingBuzz {
            id,
            sent_at: now,
            round,
        });
        debug!(%id, round, "buzz sent; control disabled pending acknowledgment");
        true
    }

    /// The server accepted the buzz. The control stays disabled.
    pub fn acknowledge(&mut self) {
        self.pending = None;
    }

    /// The server refused the buzz; control comes back only while the round is still open.
    pub fn reject(&mut self, phase: &Phase) {
        self.pending = None;
        self.enabled = *phase == Phase::RoundActive;
    }

    /// Liveness fallback when no acknowledgment arrived within the bound.
    ///
    /// The outcome stays unknown: the control is re-enabled only while the round is still
    /// open, and the server remains the judge of any later buzz.
    pub fn check_timeout(&mut self, now: Instant, phase: &Phase) -> Option<EngineError> {
        let pending = self.pending?;
        let waited = now.saturating_duration_since(pending.sent_at);
        if waited < self.ack_timeout {
            return None;
        }
        self.pending = None;
        self.enabled = *phase == Phase::RoundActive;
        Some(EngineError::CommandTimeout {
            command: "buzz".into(),
            waited_ms: waited.as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::model::BuzzRecord;

    fn control() -> BuzzControl {
        let mut control = BuzzControl::new(Duration::from_millis(3_000));
        control.enable();
        control
    }

    #[test]
    fn request_disables_optimistically() {
        let mut control = control();
        let t0 = Instant::now();

        assert!(control.request(Uuid::new_v4(), t0, 1));
        assert!(!control.can_buzz());
        assert!(!control.request(Uuid::new_v4(), t0, 1));
    }

    #[test]
    fn rejection_reenables_only_in_open_round() {
        let t0 = Instant::now();

        let mut control = control();
        control.request(Uuid::new_v4(), t0, 1);
        control.reject(&Phase::RoundActive);
        assert!(control.can_buzz());

        let mut control = self::control();
        control.request(Uuid::new_v4(), t0, 1);
        control.reject(&Phase::Locked(BuzzRecord::unknown()));
        assert!(!control.can_buzz());
    }

    #[test]
    fn missing_ack_falls_back_to_enabled() {
        let mut control = control();
        let t0 = Instant::now();
        control.request(Uuid::new_v4(), t0, 1);

        assert!(
            control
                .check_timeout(t0 + Duration::from_millis(2_999), &Phase::RoundActive)
                .is_none()
        );
        match control.check_timeout(t0 + Duration::from_millis(3_000), &Phase::RoundActive) {
            Some(EngineError::CommandTimeout { command, waited_ms }) => {
                assert_eq!(command, "buzz");
                assert_eq!(waited_ms, 3_000);
            }
            other => panic!("expected command timeout, got {other:?}"),
        }
        assert!(control.can_buzz());
    }

    #[test]
    fn acknowledged_buzz_stays_disabled() {
        let mut control = control();
        let t0 = Instant::now();
        control.request(Uuid::new_v4(), t0, 1);
        control.acknowledge();

        assert!(!control.can_buzz());
        assert!(
            control
                .check_timeout(t0 + Duration::from_secs(10), &Phase::RoundActive)
                .is_none()
        );
    }
}
