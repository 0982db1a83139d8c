use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE: &str = "fedi.log";

static INIT: OnceLock<()> = OnceLock::new();

/// Install the process-wide subscriber. Safe to call more than once; only the first call wins.
pub(crate) fn init_logging(data_dir: &str) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let log_path = Path::new(data_dir).join(LOG_FILE);
        let file_layer = match OpenOptions::new().create(true).append(true).open(&log_path) {
            Ok(file) => Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            ),
            Err(e) => {
                eprintln!("fedi: cannot open log file {}: {e}", log_path.display());
                None
            }
        };

        // Another subscriber may already be installed (tests, host binaries).
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .with(file_layer)
            .try_init();
    });
}
