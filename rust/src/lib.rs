mod actions;
pub mod api;
pub mod background;
pub mod config;
mod core;
mod logging;
pub mod notifier;
pub mod poller;
pub mod registry;
pub mod service;
mod state;
mod updates;

#[cfg(test)]
mod test_support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use background::{alarm_key, WakeAlarmScheduler};
pub use crate::core::resend_cooldown;
pub use notifier::NotificationPresenter;
pub use state::*;
pub use updates::*;

use api::{HttpAccountApi, SharedAccountApi};
use background::SharedWakeAlarmScheduler;
use notifier::SharedNotificationPresenter;
use poller::CheckOutcome;
use registry::AccountRegistry;
use service::ActivationService;

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

#[derive(uniffi::Object)]
pub struct FfiApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
    service: Arc<ActivationService>,
    runtime: Arc<tokio::runtime::Runtime>,
}

#[uniffi::export]
impl FfiApp {
    #[uniffi::constructor]
    pub fn new(
        data_dir: String,
        alarms: Box<dyn WakeAlarmScheduler>,
        notifications: Box<dyn NotificationPresenter>,
    ) -> Arc<Self> {
        Self::start(data_dir, Arc::from(alarms), Arc::from(notifications), None)
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    /// Delivery of a wake alarm registered through [`WakeAlarmScheduler`]. Never blocks; the
    /// host may call this from a process it just started for the alarm.
    pub fn handle_wake_alarm(&self, account_id: String) {
        let service = self.service.clone();
        let core_tx = self.core_tx.clone();
        self.runtime.spawn(async move {
            let outcome = service.handle_wake(&account_id).await;
            if let CheckOutcome::Activated { .. } = outcome {
                let _ = core_tx.send(CoreMsg::Internal(Box::new(
                    InternalEvent::ActivatedByBackground { account_id },
                )));
            }
        });
    }
}

impl FfiApp {
    /// Same as [`FfiApp::new`] with a caller-provided account API (tests, headless hosts).
    pub fn with_account_api(
        data_dir: String,
        alarms: SharedWakeAlarmScheduler,
        notifications: SharedNotificationPresenter,
        api: SharedAccountApi,
    ) -> Arc<Self> {
        Self::start(data_dir, alarms, notifications, Some(api))
    }

    fn start(
        data_dir: String,
        alarms: SharedWakeAlarmScheduler,
        notifications: SharedNotificationPresenter,
        api: Option<SharedAccountApi>,
    ) -> Arc<Self> {
        logging::init_logging(&data_dir);
        tracing::info!(data_dir = %data_dir, "FfiApp::new() starting");

        let runtime = Arc::new(
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_time()
                .enable_io()
                .build()
                .expect("tokio runtime"),
        );

        let config = config::load_app_config(&data_dir);
        let api: SharedAccountApi = match api {
            Some(api) => api,
            None => Arc::new(HttpAccountApi::from_config(&config)),
        };
        let registry = match AccountRegistry::open(&data_dir) {
            Ok(registry) => registry,
            Err(e) => {
                tracing::error!("{e:#}; falling back to an in-memory account registry");
                AccountRegistry::open_in_memory().expect("in-memory account registry")
            }
        };
        let service = Arc::new(ActivationService::from_parts(
            config,
            Arc::new(registry),
            api,
            alarms,
            notifications,
        ));

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        let service_for_core = service.clone();
        let runtime_for_core = runtime.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                shared_for_core,
                service_for_core,
                runtime_for_core,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
            service,
            runtime,
        })
    }

    pub fn service(&self) -> &Arc<ActivationService> {
        &self.service
    }
}
