use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::state::{AccountSession, ActivationInfo};

const ACCOUNT_DB_FILE: &str = "accounts.sqlite3";

pub(super) const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS accounts (
        account_id TEXT PRIMARY KEY,
        domain TEXT NOT NULL,
        access_token TEXT NOT NULL,
        username TEXT NOT NULL DEFAULT '',
        display_name TEXT,
        avatar_url TEXT,
        activated INTEGER NOT NULL DEFAULT 0,
        approval_pending INTEGER NOT NULL DEFAULT 0,
        activation_email TEXT,
        last_resend_at_ms INTEGER
    );
"#;

const SELECT_COLUMNS: &str = r#"
    SELECT
        account_id,
        domain,
        access_token,
        username,
        display_name,
        avatar_url,
        activated,
        approval_pending,
        activation_email,
        last_resend_at_ms
    FROM accounts
"#;

pub(super) fn open_account_db(data_dir: &str) -> rusqlite::Result<Connection> {
    let path = Path::new(data_dir).join(ACCOUNT_DB_FILE);
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<AccountSession> {
    let activation_email: Option<String> = row.get(8)?;
    let last_resend_at_ms: Option<i64> = row.get(9)?;
    Ok(AccountSession {
        account_id: row.get(0)?,
        domain: row.get(1)?,
        access_token: row.get(2)?,
        username: row.get(3)?,
        display_name: row.get(4)?,
        avatar_url: row.get(5)?,
        activated: row.get(6)?,
        approval_pending: row.get(7)?,
        activation_info: activation_email.map(|email| ActivationInfo {
            email,
            last_resend_at_ms: last_resend_at_ms.unwrap_or(0),
        }),
    })
}

fn activation_columns(session: &AccountSession) -> (Option<&str>, Option<i64>) {
    match session.activation_info.as_ref() {
        Some(info) => (Some(info.email.as_str()), Some(info.last_resend_at_ms)),
        None => (None, None),
    }
}

pub(super) fn upsert_account(conn: &Connection, session: &AccountSession) -> rusqlite::Result<()> {
    let (activation_email, last_resend_at_ms) = activation_columns(session);
    conn.execute(
        r#"
        INSERT INTO accounts (
            account_id,
            domain,
            access_token,
            username,
            display_name,
            avatar_url,
            activated,
            approval_pending,
            activation_email,
            last_resend_at_ms
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(account_id) DO UPDATE SET
            domain = excluded.domain,
            access_token = excluded.access_token,
            username = excluded.username,
            display_name = excluded.display_name,
            avatar_url = excluded.avatar_url,
            activated = MAX(accounts.activated, excluded.activated),
            approval_pending = excluded.approval_pending,
            activation_email = excluded.activation_email,
            last_resend_at_ms = excluded.last_resend_at_ms
        "#,
        params![
            session.account_id,
            session.domain,
            session.access_token,
            session.username,
            session.display_name,
            session.avatar_url,
            session.activated,
            session.approval_pending,
            activation_email,
            last_resend_at_ms,
        ],
    )?;
    Ok(())
}

/// UPDATE-only write of everything the activation flow mutates. Returns false if the row is gone.
pub(super) fn update_activation(
    conn: &Connection,
    session: &AccountSession,
) -> rusqlite::Result<bool> {
    let (activation_email, last_resend_at_ms) = activation_columns(session);
    let changed = conn.execute(
        r#"
        UPDATE accounts SET
            username = ?2,
            display_name = ?3,
            avatar_url = ?4,
            activated = MAX(activated, ?5),
            approval_pending = ?6,
            activation_email = ?7,
            last_resend_at_ms = ?8
        WHERE account_id = ?1
        "#,
        params![
            session.account_id,
            session.username,
            session.display_name,
            session.avatar_url,
            session.activated,
            session.approval_pending,
            activation_email,
            last_resend_at_ms,
        ],
    )?;
    Ok(changed > 0)
}

pub(super) fn get_account(
    conn: &Connection,
    account_id: &str,
) -> rusqlite::Result<Option<AccountSession>> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE account_id = ?1"),
        params![account_id],
        session_from_row,
    )
    .optional()
}

pub(super) fn list_accounts(conn: &Connection) -> rusqlite::Result<Vec<AccountSession>> {
    let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY account_id"))?;
    let rows = stmt.query_map([], session_from_row)?;
    let sessions = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(sessions)
}

pub(super) fn delete_account(conn: &Connection, account_id: &str) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "DELETE FROM accounts WHERE account_id = ?1",
        params![account_id],
    )?;
    Ok(changed > 0)
}
