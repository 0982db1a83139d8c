mod foreground;
mod resend;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use flume::Sender;

use crate::actions::AppAction;
use crate::service::ActivationService;
use crate::state::AppState;
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

use foreground::ForegroundLoop;
pub use resend::resend_cooldown;

const TOAST_AUTO_DISMISS: Duration = Duration::from_secs(3);

pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    service: Arc<ActivationService>,
    runtime: Arc<tokio::runtime::Runtime>,

    // At most one visible activation screen.
    foreground: Option<ForegroundLoop>,
    next_foreground_token: u64,
    resend_tick_token: u64,
    toast_dismiss_token: u64,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        shared_state: Arc<RwLock<AppState>>,
        service: Arc<ActivationService>,
        runtime: Arc<tokio::runtime::Runtime>,
    ) -> Self {
        Self {
            state: AppState::empty(),
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            service,
            runtime,
            foreground: None,
            next_foreground_token: 0,
            resend_tick_token: 0,
            toast_dismiss_token: 0,
        }
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    /// Side-effect update carrying its own rev.
    fn emit_side_effect(&mut self, build: impl FnOnce(u64) -> AppUpdate) {
        let rev = self.next_rev();
        // Keep snapshot rev in sync with the update stream even though this is a side-effect update.
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(build(rev));
    }

    fn send_internal(tx: &Sender<CoreMsg>, event: InternalEvent) {
        let _ = tx.send(CoreMsg::Internal(Box::new(event)));
    }

    fn toast(&mut self, msg: impl Into<String>) {
        self.state.toast = Some(msg.into());
        self.toast_dismiss_token = self.toast_dismiss_token.saturating_add(1);
        self.schedule_toast_auto_dismiss(self.toast_dismiss_token);
        self.emit_state();
    }

    fn schedule_toast_auto_dismiss(&self, token: u64) {
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(TOAST_AUTO_DISMISS).await;
            Self::send_internal(&tx, InternalEvent::ToastAutoDismiss { token });
        });
    }

    fn handle_toast_auto_dismiss(&mut self, token: u64) {
        if token != self.toast_dismiss_token {
            return;
        }
        if self.state.toast.is_some() {
            self.state.toast = None;
            self.emit_state();
        }
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Never log `?action` directly: sign-in carries the access token.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::ForegroundCheckFinished {
                token,
                account_id,
                outcome,
            } => self.handle_foreground_check_finished(token, &account_id, outcome),
            InternalEvent::ForegroundRetryDue { token } => self.handle_foreground_retry_due(token),
            InternalEvent::HousekeepingFinished { token, account_id } => {
                self.handle_housekeeping_finished(token, &account_id)
            }
            InternalEvent::ActivatedByBackground { account_id } => {
                self.handle_activated_by_background(&account_id)
            }
            InternalEvent::ResendTick { token } => self.handle_resend_tick(token),
            InternalEvent::ConfirmationEmailResent { account_id, result } => {
                self.handle_confirmation_email_resent(&account_id, result)
            }
            InternalEvent::Toast(ref msg) => {
                tracing::info!(msg, "toast");
                self.toast(msg.clone());
            }
            InternalEvent::ToastAutoDismiss { token } => self.handle_toast_auto_dismiss(token),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            // Accounts
            AppAction::AccountSignedIn { session } => {
                if let Err(e) = self.service.sign_in(&session) {
                    tracing::error!(account_id = %session.account_id, "sign in failed: {e:#}");
                    self.toast(format!("Sign in failed: {e:#}"));
                }
            }
            AppAction::SignOut { account_id } => {
                if self.is_showing(&account_id) {
                    self.end_foreground_with_session_lost(&account_id);
                }
                let service = self.service.clone();
                let tx = self.core_sender.clone();
                self.runtime.spawn(async move {
                    if let Err(e) = service.sign_out(&account_id).await {
                        tracing::error!(%account_id, "sign out failed: {e:#}");
                        Self::send_internal(
                            &tx,
                            InternalEvent::Toast(format!("Sign out failed: {e:#}")),
                        );
                    }
                });
            }

            // Activation screen
            AppAction::ActivationScreenShown { account_id } => self.show_activation_screen(account_id),
            AppAction::ActivationScreenHidden => self.hide_activation_screen(),
            AppAction::ResendConfirmationEmail => self.resend_confirmation_email(),

            // UI
            AppAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit_state();
                }
            }
        }
    }
}
