use std::sync::Arc;

use crate::api::{HttpAccountApi, SharedAccountApi};
use crate::background::{BackgroundScheduler, SharedWakeAlarmScheduler};
use crate::config::{self, AppConfig};
use crate::notifier::{Notifier, SharedNotificationPresenter};
use crate::poller::{ApprovalPoller, CheckOutcome, Driver};
use crate::registry::{AccountRegistry, SharedAccountRegistry};
use crate::state::AccountSession;

/// Everything both drivers share, built once per process. Holds no per-screen state, so a wake
/// alarm can be served by a fresh instance in a process that never showed any UI.
pub struct ActivationService {
    config: AppConfig,
    registry: SharedAccountRegistry,
    api: SharedAccountApi,
    scheduler: BackgroundScheduler,
    poller: Arc<ApprovalPoller>,
}

impl ActivationService {
    pub fn open(
        data_dir: &str,
        alarms: SharedWakeAlarmScheduler,
        presenter: SharedNotificationPresenter,
    ) -> anyhow::Result<Self> {
        let config = config::load_app_config(data_dir);
        let api: SharedAccountApi = Arc::new(HttpAccountApi::from_config(&config));
        let registry = Arc::new(AccountRegistry::open(data_dir)?);
        Ok(Self::from_parts(config, registry, api, alarms, presenter))
    }

    pub fn from_parts(
        config: AppConfig,
        registry: SharedAccountRegistry,
        api: SharedAccountApi,
        alarms: SharedWakeAlarmScheduler,
        presenter: SharedNotificationPresenter,
    ) -> Self {
        let scheduler = BackgroundScheduler::new(alarms, config.background_check_interval());
        let notifier = Arc::new(Notifier::new(presenter));
        let poller = Arc::new(ApprovalPoller::new(
            registry.clone(),
            api.clone(),
            scheduler.clone(),
            notifier,
            config.skip_profile_housekeeping(),
        ));
        Self {
            config,
            registry,
            api,
            scheduler,
            poller,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &SharedAccountRegistry {
        &self.registry
    }

    pub fn api(&self) -> &SharedAccountApi {
        &self.api
    }

    pub fn poller(&self) -> &Arc<ApprovalPoller> {
        &self.poller
    }

    /// One-shot check outside any driver loop. Re-arms nothing beyond what the poller itself does.
    pub async fn check_now(&self, account_id: &str) -> CheckOutcome {
        self.poller.check(account_id, Driver::Foreground).await
    }

    pub async fn handle_wake(&self, account_id: &str) -> CheckOutcome {
        self.scheduler.on_wake(&self.poller, account_id).await
    }

    pub fn sign_in(&self, session: &AccountSession) -> anyhow::Result<()> {
        self.registry.put(session)?;
        tracing::info!(account_id = %session.account_id, "session stored");
        Ok(())
    }

    /// Removes the session and cancels its background check before returning. Waits out any
    /// check already running for the account so it cannot re-arm afterwards.
    pub async fn sign_out(&self, account_id: &str) -> anyhow::Result<bool> {
        let _guard = self.registry.lock(account_id).await;
        let removed = self.registry.remove(account_id)?;
        self.scheduler.disarm(account_id);
        tracing::info!(account_id, removed, "signed out");
        Ok(removed)
    }
}
