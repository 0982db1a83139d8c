use fedi_core::NotificationPresenter;

/// Prints notifications to stdout; there is no desktop notification center to talk to.
pub struct StdoutNotifications;

impl NotificationPresenter for StdoutNotifications {
    fn ensure_channel(&self, channel_id: String, name: String, _description: String) {
        tracing::debug!(%channel_id, %name, "notification channel ready");
    }

    fn show(
        &self,
        channel_id: String,
        notification_id: i32,
        title: String,
        body: String,
        click_target: String,
    ) {
        tracing::info!(%channel_id, notification_id, %click_target, "notification");
        println!("[{channel_id}#{notification_id}] {title}: {body}");
    }
}
