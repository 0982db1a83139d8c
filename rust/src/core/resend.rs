// "Resend confirmation email" button: cooldown countdown plus the resend call itself.

use std::time::Duration;

use super::AppCore;
use crate::state::{now_millis, ActivationPhase, ResendButtonState};
use crate::updates::InternalEvent;

/// Button state `now_ms` for a resend at `last_resend_at_ms`. Disabled on `[last, last + window)`;
/// a clock that moved backwards (`now < last`) also counts as cooling down.
pub fn resend_cooldown(last_resend_at_ms: i64, now_ms: i64, window: Duration) -> ResendButtonState {
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
    let elapsed_ms = now_ms.saturating_sub(last_resend_at_ms);
    if elapsed_ms >= window_ms {
        return ResendButtonState {
            enabled: true,
            seconds_remaining: 0,
        };
    }
    let remaining_ms = window_ms.saturating_sub(elapsed_ms.max(0));
    let seconds = remaining_ms.saturating_add(999) / 1000;
    ResendButtonState {
        enabled: false,
        seconds_remaining: u32::try_from(seconds).unwrap_or(u32::MAX),
    }
}

impl AppCore {
    /// Re-evaluates the button now and keeps ticking while it is disabled.
    pub(super) fn restart_resend_ticks(&mut self) {
        self.stop_resend_ticks();
        if self.refresh_resend_button() {
            self.schedule_resend_tick(self.resend_tick_token);
        }
    }

    pub(super) fn stop_resend_ticks(&mut self) {
        self.resend_tick_token = self.resend_tick_token.saturating_add(1);
    }

    fn schedule_resend_tick(&self, token: u64) {
        let delay = self.service.config().resend_tick();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            Self::send_internal(&tx, InternalEvent::ResendTick { token });
        });
    }

    pub(super) fn handle_resend_tick(&mut self, token: u64) {
        if token != self.resend_tick_token {
            return;
        }
        if self.refresh_resend_button() {
            self.schedule_resend_tick(token);
        }
    }

    /// Returns true while the cooldown is still running.
    fn refresh_resend_button(&mut self) -> bool {
        let Some(last_resend_at_ms) = self.foreground.as_ref().map(|fg| fg.last_resend_at_ms)
        else {
            return false;
        };
        let next = resend_cooldown(
            last_resend_at_ms,
            now_millis(),
            self.service.config().resend_cooldown(),
        );
        let cooling_down = !next.enabled;
        let Some(screen) = self.state.activation.as_mut() else {
            return false;
        };
        if screen.resend != next {
            screen.resend = next;
            self.emit_state();
        }
        cooling_down
    }

    pub(super) fn resend_confirmation_email(&mut self) {
        let Some(screen) = self.state.activation.as_ref() else {
            tracing::debug!("resend requested without a visible activation screen");
            return;
        };
        if screen.resending
            || !screen.resend.enabled
            || screen.phase != ActivationPhase::EmailUnconfirmed
        {
            tracing::debug!(account_id = %screen.account_id, "resend not available");
            return;
        }
        let account_id = screen.account_id.clone();
        if let Some(screen) = self.state.activation.as_mut() {
            screen.resending = true;
        }
        self.emit_state();

        let registry = self.service.registry().clone();
        let api = self.service.api().clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result: Result<i64, String> = async {
                let session = match registry.get(&account_id) {
                    Ok(Some(session)) => session,
                    Ok(None) => return Err("Account not found".to_string()),
                    Err(e) => return Err(format!("{e:#}")),
                };
                api.resend_confirmation_email(&session)
                    .await
                    .map_err(|e| e.to_string())?;

                let now = now_millis();
                let _guard = registry.lock(&account_id).await;
                match registry.record_email_resent(&account_id, now) {
                    Ok(true) => {}
                    // Signed out while the request was in flight.
                    Ok(false) => return Err("Account not found".to_string()),
                    Err(e) => tracing::warn!(%account_id, "failed to record resend time: {e:#}"),
                }
                Ok(now)
            }
            .await;
            Self::send_internal(
                &tx,
                InternalEvent::ConfirmationEmailResent { account_id, result },
            );
        });
    }

    pub(super) fn handle_confirmation_email_resent(
        &mut self,
        account_id: &str,
        result: Result<i64, String>,
    ) {
        let showing = self.is_showing(account_id);
        if showing {
            if let Some(screen) = self.state.activation.as_mut() {
                screen.resending = false;
            }
        }
        match result {
            Ok(sent_at_ms) => {
                tracing::info!(account_id, "confirmation email resent");
                if showing {
                    if let Some(fg) = self.foreground.as_mut() {
                        fg.last_resend_at_ms = sent_at_ms;
                    }
                    self.restart_resend_ticks();
                }
                self.toast("Confirmation email sent");
            }
            Err(msg) => {
                tracing::warn!(account_id, %msg, "resend confirmation email failed");
                self.toast(msg);
            }
        }
    }
}
