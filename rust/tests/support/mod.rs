#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use fedi_core::api::{AccountApi, AccountSnapshot, ApiError, ProfileUpdate};
use fedi_core::{AccountSession, AppReconciler, AppUpdate, NotificationPresenter, WakeAlarmScheduler};

pub fn write_config(data_dir: &str) {
    let path = Path::new(data_dir).join("fedi_config.json");
    let v = serde_json::json!({
        "foreground_poll_interval_ms": 50,
        "background_check_interval_ms": 60_000,
        "resend_tick_ms": 50,
    });
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

pub fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply {
    Approved,
    PendingApproval,
    Unreachable,
}

/// Answers every status query with the current [`Reply`]. While held, status and resend
/// requests are counted and then park until [`FakeServer::release_requests`].
pub struct FakeServer {
    reply: Mutex<Reply>,
    verify_calls: Mutex<usize>,
    resend_calls: Mutex<usize>,
    hold: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeServer {
    pub fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(reply),
            verify_calls: Mutex::new(0),
            resend_calls: Mutex::new(0),
            hold: Mutex::new(None),
        })
    }

    pub fn hold_requests(&self) {
        *self.hold.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_requests(&self) {
        if let Some(gate) = self.hold.lock().unwrap().take() {
            gate.close();
        }
    }

    async fn wait_if_held(&self) {
        let gate = self.hold.lock().unwrap().clone();
        if let Some(gate) = gate {
            // Closing the semaphore is the release signal.
            let _ = gate.acquire().await;
        }
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn verify_calls(&self) -> usize {
        *self.verify_calls.lock().unwrap()
    }

    pub fn resend_calls(&self) -> usize {
        *self.resend_calls.lock().unwrap()
    }
}

#[async_trait]
impl AccountApi for FakeServer {
    async fn verify_credentials(
        &self,
        session: &AccountSession,
    ) -> Result<AccountSnapshot, ApiError> {
        *self.verify_calls.lock().unwrap() += 1;
        self.wait_if_held().await;
        let reply = *self.reply.lock().unwrap();
        match reply {
            Reply::Approved => Ok(AccountSnapshot {
                id: session.account_id.clone(),
                username: "alice".into(),
                display_name: String::new(),
                avatar: None,
                note: String::new(),
            }),
            Reply::PendingApproval => Err(ApiError::Status {
                status: 403,
                message: "Your login is currently pending approval".into(),
            }),
            Reply::Unreachable => Err(ApiError::Transport("connection refused".into())),
        }
    }

    async fn resend_confirmation_email(&self, _session: &AccountSession) -> Result<(), ApiError> {
        *self.resend_calls.lock().unwrap() += 1;
        self.wait_if_held().await;
        Ok(())
    }

    async fn update_credentials(
        &self,
        session: &AccountSession,
        update: &ProfileUpdate,
    ) -> Result<AccountSnapshot, ApiError> {
        Ok(AccountSnapshot {
            id: session.account_id.clone(),
            username: session.username.clone(),
            display_name: update.display_name.clone().unwrap_or_default(),
            avatar: None,
            note: update.note.clone(),
        })
    }
}

#[derive(Default)]
pub struct FakeAlarms {
    armed: Mutex<HashMap<String, String>>,
    cancels: Mutex<Vec<String>>,
}

impl FakeAlarms {
    pub fn is_armed(&self, key: &str) -> bool {
        self.armed.lock().unwrap().contains_key(key)
    }

    pub fn cancel_count(&self, key: &str) -> usize {
        self.cancels.lock().unwrap().iter().filter(|k| *k == key).count()
    }
}

impl WakeAlarmScheduler for FakeAlarms {
    fn register(&self, key: String, _delay_ms: u64, account_id: String) {
        self.armed.lock().unwrap().insert(key, account_id);
    }

    fn cancel(&self, key: String) {
        self.armed.lock().unwrap().remove(&key);
        self.cancels.lock().unwrap().push(key);
    }
}

#[derive(Default)]
pub struct FakeNotifications {
    shown: Mutex<Vec<(String, i32)>>,
}

impl FakeNotifications {
    pub fn shown(&self) -> Vec<(String, i32)> {
        self.shown.lock().unwrap().clone()
    }
}

impl NotificationPresenter for FakeNotifications {
    fn ensure_channel(&self, _channel_id: String, _name: String, _description: String) {}

    fn show(
        &self,
        channel_id: String,
        notification_id: i32,
        _title: String,
        _body: String,
        _click_target: String,
    ) {
        self.shown.lock().unwrap().push((channel_id, notification_id));
    }
}

#[derive(Clone, Default)]
pub struct Collector {
    pub updates: Arc<Mutex<Vec<AppUpdate>>>,
}

impl Collector {
    pub fn count(&self, f: impl Fn(&AppUpdate) -> bool) -> usize {
        self.updates.lock().unwrap().iter().filter(|u| f(u)).count()
    }
}

impl AppReconciler for Collector {
    fn reconcile(&self, update: AppUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}
