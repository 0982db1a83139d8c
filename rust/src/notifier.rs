use std::collections::HashSet;
use std::sync::{Arc, Mutex};

pub const APPROVED_CHANNEL_ID: &str = "account_approved";
pub const APPROVED_CHANNEL_NAME: &str = "Account Approved";
pub const APPROVED_CHANNEL_DESCRIPTION: &str = "Notifications when your account is approved";
/// Fixed id so a repeated post replaces the previous one instead of stacking.
pub const APPROVED_NOTIFICATION_ID: i32 = 1001;
pub const APPROVED_CLICK_TARGET: &str = "main";

const APPROVED_TITLE: &str = "Account approved";
const APPROVED_BODY: &str = "Your account has been approved. Tap to get started.";

/// Platform notification facility (Android NotificationManager, UNUserNotificationCenter, ...).
#[uniffi::export(callback_interface)]
pub trait NotificationPresenter: Send + Sync + 'static {
    fn ensure_channel(&self, channel_id: String, name: String, description: String);
    fn show(
        &self,
        channel_id: String,
        notification_id: i32,
        title: String,
        body: String,
        click_target: String,
    );
}

pub type SharedNotificationPresenter = Arc<dyn NotificationPresenter>;

/// Process-wide; both drivers share one instance.
pub struct Notifier {
    presenter: SharedNotificationPresenter,
    notified: Mutex<HashSet<String>>,
}

impl Notifier {
    pub fn new(presenter: SharedNotificationPresenter) -> Self {
        presenter.ensure_channel(
            APPROVED_CHANNEL_ID.to_string(),
            APPROVED_CHANNEL_NAME.to_string(),
            APPROVED_CHANNEL_DESCRIPTION.to_string(),
        );
        Self {
            presenter,
            notified: Mutex::new(HashSet::new()),
        }
    }

    /// Returns false if this process already notified for `account_id`.
    pub fn notify_activated(&self, account_id: &str) -> bool {
        let first = {
            let mut notified = match self.notified.lock() {
                Ok(g) => g,
                Err(poison) => poison.into_inner(),
            };
            notified.insert(account_id.to_string())
        };
        if !first {
            tracing::debug!(account_id, "activation notification already shown");
            return false;
        }
        tracing::info!(account_id, "showing account approved notification");
        self.presenter.show(
            APPROVED_CHANNEL_ID.to_string(),
            APPROVED_NOTIFICATION_ID,
            APPROVED_TITLE.to_string(),
            APPROVED_BODY.to_string(),
            APPROVED_CLICK_TARGET.to_string(),
        );
        true
    }
}
