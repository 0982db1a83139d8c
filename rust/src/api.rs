// Remote account endpoints the activation flow depends on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::AppConfig;
use crate::state::AccountSession;

/// The one status code with meaning here: email confirmed, waiting for a moderator.
pub const AWAITING_APPROVAL_STATUS: u16 = 403;

const VERIFY_CREDENTIALS_PATH: &str = "/api/v1/accounts/verify_credentials";
const RESEND_CONFIRMATION_PATH: &str = "/api/v1/emails/confirmations";
const UPDATE_CREDENTIALS_PATH: &str = "/api/v1/accounts/update_credentials";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountSnapshot {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(_) | ApiError::Decode(_) => None,
        }
    }

    pub fn is_awaiting_approval(&self) -> bool {
        self.status() == Some(AWAITING_APPROVAL_STATUS)
    }
}

#[async_trait]
pub trait AccountApi: Send + Sync + 'static {
    /// "Get own account": succeeds only once the account is fully usable.
    async fn verify_credentials(&self, session: &AccountSession)
        -> Result<AccountSnapshot, ApiError>;

    async fn resend_confirmation_email(&self, session: &AccountSession) -> Result<(), ApiError>;

    async fn update_credentials(
        &self,
        session: &AccountSession,
        update: &ProfileUpdate,
    ) -> Result<AccountSnapshot, ApiError>;
}

pub type SharedAccountApi = Arc<dyn AccountApi>;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct HttpAccountApi {
    client: reqwest::Client,
    network_enabled: bool,
}

impl HttpAccountApi {
    pub fn new(timeout: Duration) -> Self {
        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(%e, "failed to build http client; using defaults");
                reqwest::Client::new()
            }
        };
        Self {
            client,
            network_enabled: true,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let mut api = Self::new(config.http_timeout());
        api.network_enabled = config.network_enabled();
        api
    }

    fn url(session: &AccountSession, path: &str) -> String {
        let domain = session.domain.trim().trim_end_matches('/');
        if domain.starts_with("http://") || domain.starts_with("https://") {
            format!("{domain}{path}")
        } else {
            format!("https://{domain}{path}")
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        if !self.network_enabled {
            return Err(ApiError::Transport("network disabled".into()));
        }
        let resp = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or_else(|_| body.chars().take(200).collect());
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl AccountApi for HttpAccountApi {
    async fn verify_credentials(
        &self,
        session: &AccountSession,
    ) -> Result<AccountSnapshot, ApiError> {
        let request = self
            .client
            .get(Self::url(session, VERIFY_CREDENTIALS_PATH))
            .bearer_auth(&session.access_token);
        self.send_json(request).await
    }

    async fn resend_confirmation_email(&self, session: &AccountSession) -> Result<(), ApiError> {
        let request = self
            .client
            .post(Self::url(session, RESEND_CONFIRMATION_PATH))
            .bearer_auth(&session.access_token);
        self.send(request).await.map(|_| ())
    }

    async fn update_credentials(
        &self,
        session: &AccountSession,
        update: &ProfileUpdate,
    ) -> Result<AccountSnapshot, ApiError> {
        let mut body = serde_json::json!({ "note": update.note });
        if let Some(name) = update.display_name.as_ref() {
            body["display_name"] = serde_json::Value::String(name.clone());
        }
        let request = self
            .client
            .patch(Self::url(session, UPDATE_CREDENTIALS_PATH))
            .bearer_auth(&session.access_token)
            .json(&body);
        self.send_json(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_403_means_awaiting_approval() {
        let pending = ApiError::Status {
            status: 403,
            message: "Your login is currently pending approval".into(),
        };
        assert!(pending.is_awaiting_approval());

        let unauthorized = ApiError::Status {
            status: 401,
            message: "The access token is invalid".into(),
        };
        assert!(!unauthorized.is_awaiting_approval());
        assert!(!ApiError::Transport("timed out".into()).is_awaiting_approval());
        assert_eq!(ApiError::Decode("eof".into()).status(), None);
    }

    #[test]
    fn url_accepts_bare_domain_or_origin() {
        let mut session = AccountSession::new("a1", "mastodon.social/", "tok");
        assert_eq!(
            HttpAccountApi::url(&session, VERIFY_CREDENTIALS_PATH),
            "https://mastodon.social/api/v1/accounts/verify_credentials"
        );

        session.domain = "http://127.0.0.1:3000".into();
        assert_eq!(
            HttpAccountApi::url(&session, RESEND_CONFIRMATION_PATH),
            "http://127.0.0.1:3000/api/v1/emails/confirmations"
        );
    }

    #[test]
    fn snapshot_tolerates_missing_optional_fields() {
        let snapshot: AccountSnapshot =
            serde_json::from_str(r#"{"id":"109","username":"alice","acct":"alice"}"#).unwrap();
        assert_eq!(snapshot.username, "alice");
        assert_eq!(snapshot.display_name, "");
        assert_eq!(snapshot.avatar, None);
    }

    #[tokio::test]
    async fn disabled_network_fails_as_transport_error() {
        let config = AppConfig {
            disable_network: Some(true),
            ..AppConfig::default()
        };
        let api = HttpAccountApi::from_config(&config);
        let session = AccountSession::new("a1", "example.invalid", "tok");
        let err = api.verify_credentials(&session).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
