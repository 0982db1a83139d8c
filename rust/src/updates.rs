use crate::poller::CheckOutcome;
use crate::state::AppState;
use crate::AppAction;

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum AppUpdate {
    /// Primary update stream: always send a full state snapshot.
    FullState(AppState),
    /// First 403 seen by the visible activation screen: swap copy to "awaiting approval".
    ApprovalPending { rev: u64, account_id: String },
    /// Advance past the activation screen. Sent at most once, and only while it is visible.
    AccountActivated { rev: u64, account_id: String },
    /// The session disappeared under the visible screen; the host should restart at home.
    SessionLost { rev: u64, account_id: String },
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
            AppUpdate::ApprovalPending { rev, .. }
            | AppUpdate::AccountActivated { rev, .. }
            | AppUpdate::SessionLost { rev, .. } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

#[derive(Debug)]
pub enum InternalEvent {
    // Foreground loop. `token` identifies the screen run that spawned the work.
    ForegroundCheckFinished {
        token: u64,
        account_id: String,
        outcome: CheckOutcome,
    },
    ForegroundRetryDue {
        token: u64,
    },
    HousekeepingFinished {
        token: u64,
        account_id: String,
    },
    /// A wake alarm activated the account while this process was alive.
    ActivatedByBackground {
        account_id: String,
    },

    // Resend confirmation email
    ResendTick {
        token: u64,
    },
    ConfirmationEmailResent {
        account_id: String,
        result: Result<i64, String>,
    },

    Toast(String),
    ToastAutoDismiss {
        token: u64,
    },
}
