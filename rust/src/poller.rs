//! The approval state machine. Both drivers call [`ApprovalPoller::check`]; everything it reads or
//! writes for an account happens under that account's registry lock, so the result does not
//! depend on which driver gets there first.

use std::sync::Arc;

use crate::api::{AccountSnapshot, ProfileUpdate, SharedAccountApi};
use crate::background::BackgroundScheduler;
use crate::notifier::Notifier;
use crate::registry::SharedAccountRegistry;
use crate::state::{AccountSession, ActivationPhase};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Driver {
    Foreground,
    Background,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StaleReason {
    SessionMissing,
    AlreadyActivated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    /// This check performed the transition. `notified` is true when it also posted the
    /// approval notification (the account had been awaiting approval).
    Activated { notified: bool },
    /// Server said 403. `first_observed` is true only for the check that flipped the durable
    /// state out of EMAIL_UNCONFIRMED.
    AwaitingApproval { first_observed: bool },
    /// Anything else, including storage trouble. Retry later.
    NotYetKnown,
    /// Nothing left to poll for; all scheduling for the id has been cancelled.
    Stale(StaleReason),
}

impl CheckOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckOutcome::Activated { .. } | CheckOutcome::Stale(_))
    }
}

pub struct ApprovalPoller {
    registry: SharedAccountRegistry,
    api: SharedAccountApi,
    scheduler: BackgroundScheduler,
    notifier: Arc<Notifier>,
    skip_housekeeping: bool,
}

impl ApprovalPoller {
    pub fn new(
        registry: SharedAccountRegistry,
        api: SharedAccountApi,
        scheduler: BackgroundScheduler,
        notifier: Arc<Notifier>,
        skip_housekeeping: bool,
    ) -> Self {
        Self {
            registry,
            api,
            scheduler,
            notifier,
            skip_housekeeping,
        }
    }

    pub async fn check(&self, account_id: &str, driver: Driver) -> CheckOutcome {
        // Held across the request. Dropping this future (foreground hide) releases it without
        // any write having happened: all writes below run after the last await.
        let _guard = self.registry.lock(account_id).await;

        let session = match self.registry.get(account_id) {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::info!(account_id, ?driver, "no session for approval check; cancelling");
                self.scheduler.disarm(account_id);
                return CheckOutcome::Stale(StaleReason::SessionMissing);
            }
            Err(e) => {
                tracing::warn!(account_id, ?driver, "approval check: {e:#}");
                return CheckOutcome::NotYetKnown;
            }
        };
        if session.activated {
            tracing::info!(account_id, ?driver, "account already activated; cancelling checks");
            self.scheduler.disarm(account_id);
            return CheckOutcome::Stale(StaleReason::AlreadyActivated);
        }

        match self.api.verify_credentials(&session).await {
            Ok(snapshot) => self.activate(session, &snapshot, driver),
            Err(e) if e.is_awaiting_approval() => self.mark_awaiting_approval(session, driver),
            Err(e) => {
                tracing::info!(account_id, ?driver, %e, "account status not yet known");
                CheckOutcome::NotYetKnown
            }
        }
    }

    fn activate(
        &self,
        mut session: AccountSession,
        snapshot: &AccountSnapshot,
        driver: Driver,
    ) -> CheckOutcome {
        let account_id = session.account_id.clone();
        let was_awaiting_approval = session.phase() == ActivationPhase::AwaitingApproval;

        // A just-approved account usually has a blank server profile; housekeeping pushes the
        // sign-up values, so they must survive the snapshot.
        let signup_display_name = session.display_name.take();
        let signup_avatar_url = session.avatar_url.take();
        session.apply_snapshot(snapshot);
        if session.display_name.is_none() {
            session.display_name = signup_display_name;
        }
        if session.avatar_url.is_none() {
            session.avatar_url = signup_avatar_url;
        }
        session.activated = true;
        match self.registry.persist_activation_info(&session) {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(%account_id, ?driver, "session removed during approval check");
                self.scheduler.disarm(&account_id);
                return CheckOutcome::Stale(StaleReason::SessionMissing);
            }
            Err(e) => {
                tracing::warn!(%account_id, ?driver, "failed to persist activation: {e:#}");
                return CheckOutcome::NotYetKnown;
            }
        }

        tracing::info!(%account_id, ?driver, was_awaiting_approval, "account activated");
        self.scheduler.disarm(&account_id);
        let notified = was_awaiting_approval && self.notifier.notify_activated(&account_id);
        CheckOutcome::Activated { notified }
    }

    fn mark_awaiting_approval(&self, mut session: AccountSession, driver: Driver) -> CheckOutcome {
        let account_id = session.account_id.clone();
        let first_observed = !session.approval_pending;
        session.approval_pending = true;
        // Written even when already pending: a false return means a sign-out raced the request,
        // and re-arming then would outlive the session.
        match self.registry.persist_activation_info(&session) {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(%account_id, ?driver, "session removed during approval check");
                self.scheduler.disarm(&account_id);
                return CheckOutcome::Stale(StaleReason::SessionMissing);
            }
            Err(e) => {
                tracing::warn!(%account_id, ?driver, "failed to persist approval state: {e:#}");
                return CheckOutcome::NotYetKnown;
            }
        }
        if first_observed {
            tracing::info!(%account_id, ?driver, "email confirmed; awaiting approval");
        }
        self.scheduler.arm(&account_id);
        CheckOutcome::AwaitingApproval { first_observed }
    }

    /// Post-activation profile cleanup: keep the display name, clear the sign-up note.
    /// Never fails the caller.
    pub async fn run_housekeeping(&self, account_id: &str) {
        if self.skip_housekeeping {
            return;
        }
        let session = match self.registry.get(account_id) {
            Ok(Some(session)) if session.activated => session,
            Ok(_) => return,
            Err(e) => {
                tracing::warn!(account_id, "profile housekeeping skipped: {e:#}");
                return;
            }
        };
        if session.display_name.is_none() && session.avatar_url.is_none() {
            return;
        }

        let update = ProfileUpdate {
            display_name: session.display_name.clone(),
            note: String::new(),
        };
        let snapshot = match self.api.update_credentials(&session, &update).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(account_id, %e, "profile housekeeping failed; ignoring");
                return;
            }
        };

        let _guard = self.registry.lock(account_id).await;
        match self.registry.get(account_id) {
            Ok(Some(mut fresh)) => {
                fresh.apply_snapshot(&snapshot);
                if let Err(e) = self.registry.persist_activation_info(&fresh) {
                    tracing::warn!(account_id, "failed to store refreshed profile: {e:#}");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(account_id, "failed to store refreshed profile: {e:#}"),
        }
    }
}
