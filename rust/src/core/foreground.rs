// Foreground driver: polls every few seconds while the activation screen is visible.

use tokio::task::AbortHandle;

use super::AppCore;
use crate::poller::{CheckOutcome, Driver, StaleReason};
use crate::state::{now_millis, AccountSession, ActivationPhase, ActivationScreenState};
use crate::updates::{AppUpdate, InternalEvent};

/// One visible run of the activation screen. A new token is minted per show, so late events from
/// a previous run are dropped on arrival.
pub(super) struct ForegroundLoop {
    pub(super) account_id: String,
    pub(super) token: u64,
    // Never both set.
    in_flight: Option<AbortHandle>,
    retry: Option<AbortHandle>,
    observed_pending: bool,
    advanced: bool,
    pub(super) last_resend_at_ms: i64,
}

impl ForegroundLoop {
    fn cancel_pending(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        } else if let Some(handle) = self.retry.take() {
            handle.abort();
        }
    }
}

impl AppCore {
    pub(super) fn is_showing(&self, account_id: &str) -> bool {
        self.foreground
            .as_ref()
            .is_some_and(|fg| fg.account_id == account_id)
    }

    fn current_run(&mut self, token: u64) -> Option<&mut ForegroundLoop> {
        self.foreground.as_mut().filter(|fg| fg.token == token)
    }

    pub(super) fn show_activation_screen(&mut self, account_id: String) {
        if self.foreground.is_some() {
            self.stop_foreground();
        }

        let session = match self.service.registry().get(&account_id) {
            Ok(Some(session)) => Some(session),
            Ok(None) => {
                tracing::info!(%account_id, "activation screen shown for unknown account");
                self.emit_side_effect(|rev| AppUpdate::SessionLost { rev, account_id });
                return;
            }
            Err(e) => {
                // The poller will retry the lookup; show the screen with what we know.
                tracing::warn!(%account_id, "activation screen: {e:#}");
                None
            }
        };

        self.next_foreground_token = self.next_foreground_token.saturating_add(1);
        let token = self.next_foreground_token;
        let last_resend_at_ms = session
            .as_ref()
            .map(AccountSession::last_resend_at_ms)
            .unwrap_or(0);
        self.foreground = Some(ForegroundLoop {
            account_id: account_id.clone(),
            token,
            in_flight: None,
            retry: None,
            observed_pending: false,
            advanced: false,
            last_resend_at_ms,
        });

        let cooldown = self.service.config().resend_cooldown();
        self.state.activation = Some(ActivationScreenState {
            account_id: account_id.clone(),
            email: session
                .as_ref()
                .and_then(|s| s.activation_info.as_ref())
                .map(|info| info.email.clone())
                .unwrap_or_default(),
            phase: session
                .as_ref()
                .map(AccountSession::phase)
                .unwrap_or(ActivationPhase::EmailUnconfirmed),
            resend: super::resend_cooldown(last_resend_at_ms, now_millis(), cooldown),
            resending: false,
        });
        self.emit_state();
        self.restart_resend_ticks();

        tracing::info!(%account_id, token, "foreground approval polling started");
        self.start_foreground_check(token);
    }

    pub(super) fn hide_activation_screen(&mut self) {
        if self.foreground.is_none() {
            return;
        }
        self.stop_foreground();
        self.emit_state();
    }

    /// Drops the current run: aborts its request or its pending retry, clears the screen state.
    fn stop_foreground(&mut self) {
        if let Some(mut fg) = self.foreground.take() {
            tracing::info!(account_id = %fg.account_id, token = fg.token, "foreground approval polling stopped");
            fg.cancel_pending();
        }
        self.state.activation = None;
        self.stop_resend_ticks();
    }

    pub(super) fn end_foreground_with_session_lost(&mut self, account_id: &str) {
        self.stop_foreground();
        self.emit_state();
        let account_id = account_id.to_string();
        self.emit_side_effect(|rev| AppUpdate::SessionLost { rev, account_id });
    }

    fn start_foreground_check(&mut self, token: u64) {
        let poller = self.service.poller().clone();
        let tx = self.core_sender.clone();
        let Some(fg) = self.current_run(token) else {
            return;
        };
        let account_id = fg.account_id.clone();
        let task = self.runtime.spawn(async move {
            let outcome = poller.check(&account_id, Driver::Foreground).await;
            Self::send_internal(
                &tx,
                InternalEvent::ForegroundCheckFinished {
                    token,
                    account_id,
                    outcome,
                },
            );
        });
        if let Some(fg) = self.current_run(token) {
            fg.retry = None;
            fg.in_flight = Some(task.abort_handle());
        }
    }

    fn schedule_foreground_retry(&mut self, token: u64) {
        let delay = self.service.config().foreground_poll_interval();
        let tx = self.core_sender.clone();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            Self::send_internal(&tx, InternalEvent::ForegroundRetryDue { token });
        });
        if let Some(fg) = self.current_run(token) {
            fg.in_flight = None;
            fg.retry = Some(task.abort_handle());
        } else {
            task.abort();
        }
    }

    pub(super) fn handle_foreground_retry_due(&mut self, token: u64) {
        let due = match self.current_run(token) {
            Some(fg) if !fg.advanced => fg.retry.take().is_some(),
            _ => false,
        };
        if due {
            self.start_foreground_check(token);
        }
    }

    pub(super) fn handle_foreground_check_finished(
        &mut self,
        token: u64,
        account_id: &str,
        outcome: CheckOutcome,
    ) {
        // The registry already reflects `outcome`; only the screen reaction is dropped.
        let Some(fg) = self.current_run(token) else {
            tracing::debug!(account_id, ?outcome, "approval check finished for a hidden screen");
            return;
        };
        fg.in_flight = None;
        if fg.advanced {
            return;
        }
        tracing::info!(account_id, ?outcome, "foreground approval check finished");

        match outcome {
            CheckOutcome::AwaitingApproval { .. } => {
                let first_in_run = !fg.observed_pending;
                fg.observed_pending = true;
                if first_in_run {
                    self.set_screen_phase(ActivationPhase::AwaitingApproval);
                    let account_id = account_id.to_string();
                    self.emit_side_effect(|rev| AppUpdate::ApprovalPending { rev, account_id });
                }
                self.schedule_foreground_retry(token);
            }
            CheckOutcome::NotYetKnown => self.schedule_foreground_retry(token),
            CheckOutcome::Activated { .. } => {
                self.set_screen_phase(ActivationPhase::Activated);
                // Advance only once the profile cleanup settles, whatever its result.
                let poller = self.service.poller().clone();
                let tx = self.core_sender.clone();
                let account_id = account_id.to_string();
                self.runtime.spawn(async move {
                    poller.run_housekeeping(&account_id).await;
                    Self::send_internal(
                        &tx,
                        InternalEvent::HousekeepingFinished { token, account_id },
                    );
                });
            }
            CheckOutcome::Stale(StaleReason::AlreadyActivated) => self.advance(token),
            CheckOutcome::Stale(StaleReason::SessionMissing) => {
                self.end_foreground_with_session_lost(account_id)
            }
        }
    }

    pub(super) fn handle_housekeeping_finished(&mut self, token: u64, account_id: &str) {
        if self.current_run(token).is_none() {
            tracing::info!(account_id, "activated after the screen was hidden; not advancing");
            return;
        }
        self.advance(token);
    }

    pub(super) fn handle_activated_by_background(&mut self, account_id: &str) {
        let Some(token) = self
            .foreground
            .as_ref()
            .filter(|fg| fg.account_id == account_id)
            .map(|fg| fg.token)
        else {
            return;
        };
        tracing::info!(account_id, "background check activated the visible account");
        self.advance(token);
    }

    /// Emits `AccountActivated` at most once per run, and only while the run is still visible.
    fn advance(&mut self, token: u64) {
        let Some(fg) = self.current_run(token) else {
            return;
        };
        if fg.advanced {
            return;
        }
        fg.advanced = true;
        fg.cancel_pending();
        let account_id = fg.account_id.clone();

        self.set_screen_phase(ActivationPhase::Activated);
        self.stop_resend_ticks();
        self.emit_side_effect(|rev| AppUpdate::AccountActivated { rev, account_id });
    }

    fn set_screen_phase(&mut self, phase: ActivationPhase) {
        let Some(screen) = self.state.activation.as_mut() else {
            return;
        };
        if screen.phase != phase {
            screen.phase = phase;
            self.emit_state();
        }
    }
}
