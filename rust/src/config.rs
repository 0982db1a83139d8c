// App config loaded from `<data_dir>/fedi_config.json`.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

pub const CONFIG_FILE: &str = "fedi_config.json";

const DEFAULT_FOREGROUND_POLL_INTERVAL_MS: u64 = 10_000;
const DEFAULT_BACKGROUND_CHECK_INTERVAL_MS: u64 = 5 * 60 * 1000;
const DEFAULT_RESEND_COOLDOWN_MS: u64 = 60_000;
const DEFAULT_RESEND_TICK_MS: u64 = 500;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Every field is optional so a partial (or hand-edited) file still loads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    pub foreground_poll_interval_ms: Option<u64>,
    pub background_check_interval_ms: Option<u64>,
    pub resend_cooldown_ms: Option<u64>,
    pub resend_tick_ms: Option<u64>,
    pub http_timeout_secs: Option<u64>,
    pub skip_profile_housekeeping: Option<bool>,
    pub disable_network: Option<bool>,
}

impl AppConfig {
    pub fn foreground_poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.foreground_poll_interval_ms
                .unwrap_or(DEFAULT_FOREGROUND_POLL_INTERVAL_MS),
        )
    }

    pub fn background_check_interval(&self) -> Duration {
        Duration::from_millis(
            self.background_check_interval_ms
                .unwrap_or(DEFAULT_BACKGROUND_CHECK_INTERVAL_MS),
        )
    }

    pub fn resend_cooldown(&self) -> Duration {
        Duration::from_millis(self.resend_cooldown_ms.unwrap_or(DEFAULT_RESEND_COOLDOWN_MS))
    }

    pub fn resend_tick(&self) -> Duration {
        // A zero tick would spin the actor.
        Duration::from_millis(self.resend_tick_ms.unwrap_or(DEFAULT_RESEND_TICK_MS).max(10))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS))
    }

    pub fn skip_profile_housekeeping(&self) -> bool {
        self.skip_profile_housekeeping.unwrap_or(false)
    }

    pub fn network_enabled(&self) -> bool {
        if env_flag("FEDI_DISABLE_NETWORK") {
            return false;
        }
        !self.disable_network.unwrap_or(false)
    }
}

fn env_flag(name: &str) -> bool {
    match std::env::var(name) {
        Ok(v) => {
            let t = v.trim();
            !t.is_empty() && t != "0" && !t.eq_ignore_ascii_case("false")
        }
        Err(_) => false,
    }
}

pub fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE);
    let Ok(data) = std::fs::read_to_string(&path) else {
        return AppConfig::default();
    };
    match serde_json::from_str::<AppConfig>(&data) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(%e, path = %path.display(), "invalid config file; using defaults");
            AppConfig::default()
        }
    }
}
