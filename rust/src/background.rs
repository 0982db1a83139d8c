//! Background driver: one OS wake alarm per account, re-armed after every inconclusive check.
//!
//! The alarm outlives this process, so a wake delivers nothing but the account id and every
//! piece of state is re-read from the registry.

use std::sync::Arc;
use std::time::Duration;

use crate::poller::{ApprovalPoller, CheckOutcome, Driver};

const ALARM_KEY_PREFIX: &str = "approval-check:";

/// Platform wake-alarm facility (WorkManager / BGTaskScheduler / a desktop alarm table).
/// Registering an existing key must replace the previous registration.
#[uniffi::export(callback_interface)]
pub trait WakeAlarmScheduler: Send + Sync + 'static {
    fn register(&self, key: String, delay_ms: u64, account_id: String);
    fn cancel(&self, key: String);
}

pub type SharedWakeAlarmScheduler = Arc<dyn WakeAlarmScheduler>;

pub fn alarm_key(account_id: &str) -> String {
    format!("{ALARM_KEY_PREFIX}{account_id}")
}

/// Inverse of [`alarm_key`], for hosts that only persist keys.
pub fn account_id_from_alarm_key(key: &str) -> Option<&str> {
    key.strip_prefix(ALARM_KEY_PREFIX).filter(|id| !id.is_empty())
}

#[derive(Clone)]
pub struct BackgroundScheduler {
    alarms: SharedWakeAlarmScheduler,
    interval: Duration,
}

impl BackgroundScheduler {
    pub fn new(alarms: SharedWakeAlarmScheduler, interval: Duration) -> Self {
        Self { alarms, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn arm(&self, account_id: &str) {
        let delay_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(account_id, delay_ms, "arming approval check alarm");
        self.alarms
            .register(alarm_key(account_id), delay_ms, account_id.to_string());
    }

    /// Idempotent; fine to call for ids that never had an alarm or no longer have a session.
    pub fn disarm(&self, account_id: &str) {
        tracing::debug!(account_id, "cancelling approval check alarm");
        self.alarms.cancel(alarm_key(account_id));
    }

    /// Entry point for a delivered wake alarm. Returns once the follow-up work is done too, so a
    /// host that exits right after (a CLI, an OS background task) does not cut housekeeping short.
    pub async fn on_wake(&self, poller: &ApprovalPoller, account_id: &str) -> CheckOutcome {
        let outcome = poller.check(account_id, Driver::Background).await;
        tracing::info!(account_id, ?outcome, "background approval check finished");
        match outcome {
            // The 403 path already re-armed inside the poller.
            CheckOutcome::NotYetKnown => self.arm(account_id),
            // Activation is already persisted; housekeeping failures are only logged.
            CheckOutcome::Activated { .. } => poller.run_housekeeping(account_id).await,
            CheckOutcome::AwaitingApproval { .. } | CheckOutcome::Stale(_) => {}
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alarm_key_is_stable_and_reversible() {
        assert_eq!(alarm_key("a1"), "approval-check:a1");
        assert_eq!(alarm_key("a1"), alarm_key("a1"));
        assert_eq!(account_id_from_alarm_key("approval-check:a1"), Some("a1"));
        assert_eq!(account_id_from_alarm_key("approval-check:"), None);
        assert_eq!(account_id_from_alarm_key("other:a1"), None);
    }
}
