use crate::state::AccountSession;

#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Accounts
    AccountSignedIn {
        session: AccountSession,
    },
    SignOut {
        account_id: String,
    },

    // Activation screen
    ActivationScreenShown {
        account_id: String,
    },
    ActivationScreenHidden,
    ResendConfirmationEmail,

    // UI
    ClearToast,
}

impl AppAction {
    /// Log-safe action tag (never includes the access token).
    pub fn tag(&self) -> &'static str {
        match self {
            // Accounts
            AppAction::AccountSignedIn { .. } => "AccountSignedIn",
            AppAction::SignOut { .. } => "SignOut",

            // Activation screen
            AppAction::ActivationScreenShown { .. } => "ActivationScreenShown",
            AppAction::ActivationScreenHidden => "ActivationScreenHidden",
            AppAction::ResendConfirmationEmail => "ResendConfirmationEmail",

            // UI
            AppAction::ClearToast => "ClearToast",
        }
    }
}
