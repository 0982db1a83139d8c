use serde::{Deserialize, Serialize};

use crate::api::AccountSnapshot;

/// Email-confirmation bookkeeping for an account that had to go through sign-up activation.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationInfo {
    pub email: String,
    /// Wall-clock millis of the last "resend confirmation email" (0 = never resent).
    pub last_resend_at_ms: i64,
}

/// One signed-in account, keyed by `account_id`.
#[derive(uniffi::Record, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSession {
    pub account_id: String,
    pub domain: String,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub access_token: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    /// Monotonic: once true it is never written back to false.
    pub activated: bool,
    /// Set the first time any driver observes the server's "pending approval" signal.
    pub approval_pending: bool,
    pub activation_info: Option<ActivationInfo>,
}

// Hand-written so `{:?}` never leaks the bearer token into logs.
impl std::fmt::Debug for AccountSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountSession")
            .field("account_id", &self.account_id)
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("activated", &self.activated)
            .field("approval_pending", &self.approval_pending)
            .field("activation_info", &self.activation_info)
            .finish_non_exhaustive()
    }
}

impl AccountSession {
    pub fn new(
        account_id: impl Into<String>,
        domain: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            domain: domain.into(),
            access_token: access_token.into(),
            username: String::new(),
            display_name: None,
            avatar_url: None,
            activated: false,
            approval_pending: false,
            activation_info: None,
        }
    }

    pub fn phase(&self) -> ActivationPhase {
        if self.activated {
            ActivationPhase::Activated
        } else if self.approval_pending {
            ActivationPhase::AwaitingApproval
        } else {
            ActivationPhase::EmailUnconfirmed
        }
    }

    pub fn last_resend_at_ms(&self) -> i64 {
        self.activation_info
            .as_ref()
            .map(|info| info.last_resend_at_ms)
            .unwrap_or(0)
    }

    /// Adopt the server's view of the account after a successful status query.
    pub(crate) fn apply_snapshot(&mut self, snapshot: &AccountSnapshot) {
        if !snapshot.username.is_empty() {
            self.username = snapshot.username.clone();
        }
        self.display_name = Some(snapshot.display_name.trim())
            .filter(|s| !s.is_empty())
            .map(ToString::to_string);
        self.avatar_url = snapshot
            .avatar
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string);
    }
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationPhase {
    EmailUnconfirmed,
    AwaitingApproval,
    Activated,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResendButtonState {
    pub enabled: bool,
    /// Countdown shown next to the disabled button; 0 once enabled.
    pub seconds_remaining: u32,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ActivationScreenState {
    pub account_id: String,
    pub email: String,
    pub phase: ActivationPhase,
    pub resend: ResendButtonState,
    pub resending: bool,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct AppState {
    pub rev: u64,
    pub activation: Option<ActivationScreenState>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            activation: None,
            toast: None,
        }
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
