//! Durable per-account session + activation metadata.
//!
//! Both pollers read and write the same rows. Read-modify-write sequences for one account must
//! run under [`AccountRegistry::lock`]; different accounts never contend.

mod account_db;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use anyhow::Context;
use rusqlite::Connection;
use tokio::sync::OwnedMutexGuard;

use crate::state::{AccountSession, ActivationInfo};

pub type SharedAccountRegistry = Arc<AccountRegistry>;

pub struct AccountRegistry {
    conn: Mutex<Connection>,
    locks: Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>,
}

impl AccountRegistry {
    pub fn open(data_dir: &str) -> anyhow::Result<Self> {
        let conn = account_db::open_account_db(data_dir)
            .with_context(|| format!("open account registry in {data_dir}"))?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory account registry")?;
        conn.execute_batch(account_db::SCHEMA)
            .context("create account registry schema")?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> rusqlite::Result<T> {
        match self.conn.lock() {
            Ok(g) => f(&g),
            Err(poison) => f(&poison.into_inner()),
        }
    }

    /// Per-account mutual exclusion. The map only holds weak references: a mutex lives as long
    /// as some guard or waiter holds it, so an id nobody is locking costs nothing and a guard
    /// handed out before a sign-out still excludes whoever locks the same id afterwards.
    pub async fn lock(&self, account_id: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = match self.locks.lock() {
                Ok(g) => g,
                Err(poison) => poison.into_inner(),
            };
            locks.retain(|_, weak| weak.strong_count() > 0);
            match locks.get(account_id).and_then(Weak::upgrade) {
                Some(mutex) => mutex,
                None => {
                    let mutex = Arc::new(tokio::sync::Mutex::new(()));
                    locks.insert(account_id.to_string(), Arc::downgrade(&mutex));
                    mutex
                }
            }
        };
        mutex.lock_owned().await
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        match self.locks.lock() {
            Ok(g) => g.len(),
            Err(poison) => poison.into_inner().len(),
        }
    }

    pub fn get(&self, account_id: &str) -> anyhow::Result<Option<AccountSession>> {
        self.with_conn(|c| account_db::get_account(c, account_id))
            .with_context(|| format!("load account {account_id}"))
    }

    /// Upsert by id. Never flips a stored `activated = true` back to false.
    pub fn put(&self, session: &AccountSession) -> anyhow::Result<()> {
        self.with_conn(|c| account_db::upsert_account(c, session))
            .with_context(|| format!("save account {}", session.account_id))
    }

    /// Deletes the session. Any wake alarm still registered for the id becomes stale and cancels
    /// itself on its next lookup miss.
    pub fn remove(&self, account_id: &str) -> anyhow::Result<bool> {
        self.with_conn(|c| account_db::delete_account(c, account_id))
            .with_context(|| format!("remove account {account_id}"))
    }

    /// Durably write `activated` + `activation_info` (and the refreshed profile fields).
    /// Returns `false` when the account was removed in the meantime; nothing is recreated.
    pub fn persist_activation_info(&self, session: &AccountSession) -> anyhow::Result<bool> {
        self.with_conn(|c| account_db::update_activation(c, session))
            .with_context(|| format!("persist activation info for {}", session.account_id))
    }

    /// Caller must hold [`Self::lock`] for `account_id`.
    pub fn record_email_resent(&self, account_id: &str, now_ms: i64) -> anyhow::Result<bool> {
        let Some(mut session) = self.get(account_id)? else {
            return Ok(false);
        };
        match session.activation_info.as_mut() {
            Some(info) => info.last_resend_at_ms = now_ms,
            None => {
                session.activation_info = Some(ActivationInfo {
                    email: "?".to_string(),
                    last_resend_at_ms: now_ms,
                });
            }
        }
        self.persist_activation_info(&session)
    }

    pub fn list(&self) -> anyhow::Result<Vec<AccountSession>> {
        self.with_conn(account_db::list_accounts)
            .context("list accounts")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn pending_session(id: &str) -> AccountSession {
        let mut session = AccountSession::new(id, "example.social", "tok");
        session.activation_info = Some(ActivationInfo {
            email: "alice@example.com".into(),
            last_resend_at_ms: 0,
        });
        session
    }

    #[test]
    fn put_get_remove_roundtrip() {
        let registry = AccountRegistry::open_in_memory().unwrap();
        assert!(registry.get("a1").unwrap().is_none());

        let session = pending_session("a1");
        registry.put(&session).unwrap();
        registry.put(&session).unwrap();

        let loaded = registry.get("a1").unwrap().expect("session should exist");
        assert_eq!(loaded, session);
        assert_eq!(registry.list().unwrap().len(), 1);

        assert!(registry.remove("a1").unwrap());
        assert!(!registry.remove("a1").unwrap());
        assert!(registry.get("a1").unwrap().is_none());
    }

    #[test]
    fn session_without_activation_info_loads_as_none() {
        let registry = AccountRegistry::open_in_memory().unwrap();
        registry
            .put(&AccountSession::new("a1", "example.social", "tok"))
            .unwrap();
        let loaded = registry.get("a1").unwrap().unwrap();
        assert_eq!(loaded.activation_info, None);
    }

    #[test]
    fn activated_is_monotonic() {
        let registry = AccountRegistry::open_in_memory().unwrap();
        let mut session = pending_session("a1");
        session.activated = true;
        registry.put(&session).unwrap();

        session.activated = false;
        registry.put(&session).unwrap();
        assert!(registry.get("a1").unwrap().unwrap().activated);

        assert!(registry.persist_activation_info(&session).unwrap());
        assert!(registry.get("a1").unwrap().unwrap().activated);
    }

    #[test]
    fn persist_does_not_resurrect_removed_account() {
        let registry = AccountRegistry::open_in_memory().unwrap();
        let mut session = pending_session("a1");
        registry.put(&session).unwrap();
        registry.remove("a1").unwrap();

        session.activated = true;
        assert!(!registry.persist_activation_info(&session).unwrap());
        assert!(registry.get("a1").unwrap().is_none());
    }

    #[test]
    fn record_email_resent_creates_or_updates_info() {
        let registry = AccountRegistry::open_in_memory().unwrap();
        registry
            .put(&AccountSession::new("bare", "example.social", "tok"))
            .unwrap();
        registry.put(&pending_session("a1")).unwrap();

        assert!(registry.record_email_resent("bare", 1_000).unwrap());
        assert!(registry.record_email_resent("a1", 2_000).unwrap());
        assert!(!registry.record_email_resent("missing", 3_000).unwrap());

        let bare = registry.get("bare").unwrap().unwrap();
        assert_eq!(
            bare.activation_info,
            Some(ActivationInfo {
                email: "?".into(),
                last_resend_at_ms: 1_000
            })
        );
        let a1 = registry.get("a1").unwrap().unwrap();
        assert_eq!(a1.last_resend_at_ms(), 2_000);
        assert_eq!(a1.activation_info.unwrap().email, "alice@example.com");
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_string_lossy().into_owned();
        {
            let registry = AccountRegistry::open(&data_dir).unwrap();
            let mut session = pending_session("a1");
            session.approval_pending = true;
            registry.put(&session).unwrap();
        }
        let reopened = AccountRegistry::open(&data_dir).unwrap();
        assert!(reopened.get("a1").unwrap().unwrap().approval_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn lock_serializes_same_account_only() {
        let registry = Arc::new(AccountRegistry::open_in_memory().unwrap());
        let held = registry.lock("a1").await;

        // A different account is never blocked.
        let other = tokio::time::timeout(Duration::from_secs(1), registry.lock("a2")).await;
        assert!(other.is_ok());

        let contender = {
            let registry = registry.clone();
            tokio::spawn(async move {
                let _guard = registry.lock("a1").await;
            })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!contender.is_finished());

        drop(held);
        contender.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn idle_locks_are_pruned_but_held_ones_survive_sign_out() {
        let registry = Arc::new(AccountRegistry::open_in_memory().unwrap());
        registry.put(&pending_session("a1")).unwrap();

        drop(registry.lock("gone").await);
        let held = registry.lock("a1").await;
        registry.remove("a1").unwrap();

        // Locking anything prunes "gone"; "a1" is still held.
        drop(registry.lock("a2").await);
        assert_eq!(registry.tracked_locks(), 2);

        let contender = {
            let registry = registry.clone();
            tokio::spawn(async move {
                let _guard = registry.lock("a1").await;
            })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!contender.is_finished());

        drop(held);
        contender.await.unwrap();
        drop(registry.lock("a3").await);
        assert_eq!(registry.tracked_locks(), 1);
    }
}
