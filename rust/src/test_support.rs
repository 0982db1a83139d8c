//! Fakes for the platform and network collaborators, shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::api::{AccountApi, AccountSnapshot, ApiError, ProfileUpdate};
use crate::background::{alarm_key, WakeAlarmScheduler};
use crate::notifier::NotificationPresenter;
use crate::state::AccountSession;

fn locked<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poison| poison.into_inner())
}

pub fn snapshot(account_id: &str) -> AccountSnapshot {
    AccountSnapshot {
        id: account_id.to_string(),
        username: format!("user_{account_id}"),
        display_name: String::new(),
        avatar: None,
        note: "signing up".into(),
    }
}

pub fn forbidden() -> ApiError {
    ApiError::Status {
        status: 403,
        message: "Your login is currently pending approval".into(),
    }
}

/// Replays queued `verify_credentials` results; an empty queue answers with a transport error.
#[derive(Default)]
pub struct ScriptedApi {
    verify: Mutex<VecDeque<Result<AccountSnapshot, ApiError>>>,
    verify_calls: Mutex<usize>,
    profile_updates: Mutex<Vec<ProfileUpdate>>,
    fail_profile_updates: Mutex<bool>,
}

impl ScriptedApi {
    pub fn push_verify(&self, result: Result<AccountSnapshot, ApiError>) {
        locked(&self.verify).push_back(result);
    }

    pub fn fail_profile_updates(&self) {
        *locked(&self.fail_profile_updates) = true;
    }

    pub fn verify_calls(&self) -> usize {
        *locked(&self.verify_calls)
    }

    pub fn profile_updates(&self) -> Vec<ProfileUpdate> {
        locked(&self.profile_updates).clone()
    }
}

#[async_trait]
impl AccountApi for ScriptedApi {
    async fn verify_credentials(
        &self,
        _session: &AccountSession,
    ) -> Result<AccountSnapshot, ApiError> {
        *locked(&self.verify_calls) += 1;
        locked(&self.verify)
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Transport("no scripted response".into())))
    }

    async fn resend_confirmation_email(&self, _session: &AccountSession) -> Result<(), ApiError> {
        Ok(())
    }

    async fn update_credentials(
        &self,
        session: &AccountSession,
        update: &ProfileUpdate,
    ) -> Result<AccountSnapshot, ApiError> {
        locked(&self.profile_updates).push(update.clone());
        if *locked(&self.fail_profile_updates) {
            return Err(ApiError::Status {
                status: 422,
                message: "Validation failed".into(),
            });
        }
        let mut snap = snapshot(&session.account_id);
        snap.display_name = update.display_name.clone().unwrap_or_default();
        snap.note = update.note.clone();
        Ok(snap)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AlarmEvent {
    Register {
        key: String,
        delay_ms: u64,
        account_id: String,
    },
    Cancel {
        key: String,
    },
}

impl AlarmEvent {
    pub fn register(account_id: &str, delay_ms: u64) -> Self {
        AlarmEvent::Register {
            key: alarm_key(account_id),
            delay_ms,
            account_id: account_id.to_string(),
        }
    }

    pub fn cancel(account_id: &str) -> Self {
        AlarmEvent::Cancel {
            key: alarm_key(account_id),
        }
    }
}

#[derive(Default)]
pub struct RecordingAlarms {
    events: Mutex<Vec<AlarmEvent>>,
}

impl RecordingAlarms {
    pub fn events(&self) -> Vec<AlarmEvent> {
        locked(&self.events).clone()
    }

    /// Currently registered alarms, key -> (account_id, delay_ms), with replace semantics.
    pub fn armed(&self) -> HashMap<String, (String, u64)> {
        let mut armed = HashMap::new();
        for event in locked(&self.events).iter() {
            match event {
                AlarmEvent::Register {
                    key,
                    delay_ms,
                    account_id,
                } => {
                    armed.insert(key.clone(), (account_id.clone(), *delay_ms));
                }
                AlarmEvent::Cancel { key } => {
                    armed.remove(key);
                }
            }
        }
        armed
    }
}

impl WakeAlarmScheduler for RecordingAlarms {
    fn register(&self, key: String, delay_ms: u64, account_id: String) {
        locked(&self.events).push(AlarmEvent::Register {
            key,
            delay_ms,
            account_id,
        });
    }

    fn cancel(&self, key: String) {
        locked(&self.events).push(AlarmEvent::Cancel { key });
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShownNotification {
    pub channel_id: String,
    pub notification_id: i32,
    pub title: String,
    pub body: String,
    pub click_target: String,
}

#[derive(Default)]
pub struct RecordingPresenter {
    channels: Mutex<Vec<String>>,
    shown: Mutex<Vec<ShownNotification>>,
}

impl RecordingPresenter {
    pub fn channels(&self) -> Vec<String> {
        locked(&self.channels).clone()
    }

    pub fn shown(&self) -> Vec<ShownNotification> {
        locked(&self.shown).clone()
    }
}

impl NotificationPresenter for RecordingPresenter {
    fn ensure_channel(&self, channel_id: String, _name: String, _description: String) {
        locked(&self.channels).push(channel_id);
    }

    fn show(
        &self,
        channel_id: String,
        notification_id: i32,
        title: String,
        body: String,
        click_target: String,
    ) {
        locked(&self.shown).push(ShownNotification {
            channel_id,
            notification_id,
            title,
            body,
            click_target,
        });
    }
}
