use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use fedi_core::WakeAlarmScheduler;
use serde::{Deserialize, Serialize};

const ALARMS_FILE: &str = "wake_alarms.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmEntry {
    pub account_id: String,
    pub due_at_ms: i64,
}

/// Desktop stand-in for the OS alarm facility: a JSON table under the data dir, so alarms
/// survive the process that registered them. `fedi alarms run` delivers them.
pub struct FileWakeAlarms {
    path: PathBuf,
    // Serializes read-modify-write within this process.
    io: Mutex<()>,
}

impl FileWakeAlarms {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(ALARMS_FILE),
            io: Mutex::new(()),
        }
    }

    fn load(&self) -> anyhow::Result<BTreeMap<String, AlarmEntry>> {
        match std::fs::read_to_string(&self.path) {
            Ok(data) => serde_json::from_str(&data)
                .with_context(|| format!("parse {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).with_context(|| format!("read {}", self.path.display())),
        }
    }

    fn save(&self, alarms: &BTreeMap<String, AlarmEntry>) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(alarms)?;
        std::fs::write(&self.path, json).with_context(|| format!("write {}", self.path.display()))
    }

    fn update<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, AlarmEntry>) -> T,
    ) -> anyhow::Result<T> {
        let _io = self.io.lock().unwrap_or_else(|poison| poison.into_inner());
        let mut alarms = self.load()?;
        let out = f(&mut alarms);
        self.save(&alarms)?;
        Ok(out)
    }

    pub fn list(&self) -> anyhow::Result<BTreeMap<String, AlarmEntry>> {
        let _io = self.io.lock().unwrap_or_else(|poison| poison.into_inner());
        self.load()
    }

    /// Removes and returns every alarm due at `now_ms`. Delivery re-arms through `register`.
    pub fn take_due(&self, now_ms: i64) -> anyhow::Result<Vec<(String, AlarmEntry)>> {
        self.update(|alarms| {
            let due: Vec<String> = alarms
                .iter()
                .filter(|(_, entry)| entry.due_at_ms <= now_ms)
                .map(|(key, _)| key.clone())
                .collect();
            due.into_iter()
                .filter_map(|key| alarms.remove(&key).map(|entry| (key, entry)))
                .collect()
        })
    }
}

impl WakeAlarmScheduler for FileWakeAlarms {
    fn register(&self, key: String, delay_ms: u64, account_id: String) {
        let delay_ms = i64::try_from(delay_ms).unwrap_or(i64::MAX);
        let due_at_ms = fedi_core::now_millis().saturating_add(delay_ms);
        let res = self.update(|alarms| {
            alarms.insert(
                key.clone(),
                AlarmEntry {
                    account_id,
                    due_at_ms,
                },
            );
        });
        match res {
            Ok(()) => tracing::debug!(%key, due_at_ms, "alarm registered"),
            Err(e) => tracing::warn!(%key, "failed to register alarm: {e:#}"),
        }
    }

    fn cancel(&self, key: String) {
        if let Err(e) = self.update(|alarms| {
            alarms.remove(&key);
        }) {
            tracing::warn!(%key, "failed to cancel alarm: {e:#}");
        }
    }
}
