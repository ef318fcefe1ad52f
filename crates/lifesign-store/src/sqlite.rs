//! SQLite deadline store. Survives restarts, supports the scheduler's
//! read-then-write pattern without a per-tick transaction — the suppression
//! window and the deadline recheck on every tick self-heal races with
//! concurrent check-ins.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC text (`...Z`), which
//! makes SQL string comparison order them correctly.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};

use lifesign_core::deadline;
use lifesign_core::error::{LifesignError, Result};
use lifesign_core::traits::DeadlineStore;
use lifesign_core::types::{
    AlertEpisode, ContactStatus, ContactSurface, ContactType, EphemeralTable, OverdueUser, User,
};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn opt_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(|s| parse_ts(&s))
}

fn store_err(e: impl std::fmt::Display) -> LifesignError {
    LifesignError::Store(e.to_string())
}

const USER_COLUMNS: &str = "id, contact_type, check_in_interval_hours, grace_period_hours, \
     last_check_in, next_deadline, is_paused, paused_until, reminder_enabled, push_token, \
     created_at";

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        contact_type: ContactType::parse(&row.get::<_, String>(1)?),
        check_in_interval_hours: row.get(2)?,
        grace_period_hours: row.get(3)?,
        last_check_in: opt_ts(row.get(4)?),
        next_deadline: opt_ts(row.get(5)?),
        is_paused: row.get::<_, i64>(6)? != 0,
        paused_until: opt_ts(row.get(7)?),
        reminder_enabled: row.get::<_, i64>(8)? != 0,
        push_token: row.get(9)?,
        created_at: parse_ts(&row.get::<_, String>(10)?),
    })
}

impl SqliteStore {
    /// Open or create the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(store_err)?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory store, used by tests and local experiments.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(store_err)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                encrypted_display_name BLOB NOT NULL,
                contact_type TEXT NOT NULL DEFAULT 'email',
                encrypted_contact_info BLOB NOT NULL,
                check_in_interval_hours INTEGER NOT NULL DEFAULT 48,
                grace_period_hours INTEGER NOT NULL DEFAULT 6,
                last_check_in TEXT,
                next_deadline TEXT,
                is_paused INTEGER NOT NULL DEFAULT 0,
                paused_until TEXT,
                reminder_enabled INTEGER NOT NULL DEFAULT 1,
                last_reminder_at TEXT,
                push_token TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_deadline
                ON users(next_deadline) WHERE is_paused = 0;

            -- Stored directionally: user_id is the alert owner.
            CREATE TABLE IF NOT EXISTS contacts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                contact_user_id TEXT NOT NULL REFERENCES users(id),
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                UNIQUE(user_id, contact_user_id)
            );

            -- Alert episodes: written once, never mutated.
            CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                triggered_at TEXT NOT NULL,
                notified_contacts TEXT NOT NULL DEFAULT '[]'
            );
            CREATE INDEX IF NOT EXISTS idx_alerts_user_time
                ON alerts(user_id, triggered_at);

            CREATE TABLE IF NOT EXISTS check_ins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                checked_in_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS verification_codes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT,
                code TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS refresh_tokens (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS invitations (
                id TEXT PRIMARY KEY,
                from_user_id TEXT NOT NULL,
                invite_code TEXT NOT NULL UNIQUE,
                expires_at TEXT NOT NULL,
                used_at TEXT,
                created_at TEXT NOT NULL
            );
            ",
        )
        .map_err(store_err)?;
        Ok(())
    }

    // ─── Users ──────────────────────────────────────

    /// Insert a new user with their encrypted identity fields.
    pub fn insert_user(
        &self,
        user: &User,
        encrypted_display_name: &[u8],
        encrypted_contact_info: &[u8],
    ) -> Result<()> {
        let conn = self.conn.lock().map_err(store_err)?;
        conn.execute(
            "INSERT INTO users
             (id, encrypted_display_name, contact_type, encrypted_contact_info,
              check_in_interval_hours, grace_period_hours, last_check_in, next_deadline,
              is_paused, paused_until, reminder_enabled, push_token, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            rusqlite::params![
                user.id,
                encrypted_display_name,
                user.contact_type.as_str(),
                encrypted_contact_info,
                user.check_in_interval_hours,
                user.grace_period_hours,
                user.last_check_in.map(ts),
                user.next_deadline.map(ts),
                user.is_paused as i64,
                user.paused_until.map(ts),
                user.reminder_enabled as i64,
                user.push_token,
                ts(user.created_at),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().map_err(store_err)?;
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            [id],
            row_to_user,
        )
        .optional()
        .map_err(store_err)
    }

    fn require_user(&self, id: &str) -> Result<User> {
        self.get_user(id)?
            .ok_or_else(|| LifesignError::Store(format!("user {id} not found")))
    }

    /// Record a check-in: resets the deadline clock and appends to history.
    pub fn check_in(&self, user_id: &str, now: DateTime<Utc>) -> Result<User> {
        let user = self.require_user(user_id)?;
        let next_deadline = deadline::deadline_after_check_in(
            user.check_in_interval_hours,
            user.grace_period_hours,
            now,
        );

        let conn = self.conn.lock().map_err(store_err)?;
        conn.execute(
            "UPDATE users SET last_check_in = ?1, next_deadline = ?2 WHERE id = ?3",
            rusqlite::params![ts(now), ts(next_deadline), user_id],
        )
        .map_err(store_err)?;
        conn.execute(
            "INSERT INTO check_ins (user_id, checked_in_at) VALUES (?1, ?2)",
            rusqlite::params![user_id, ts(now)],
        )
        .map_err(store_err)?;

        Ok(User {
            last_check_in: Some(now),
            next_deadline: Some(next_deadline),
            ..user
        })
    }

    /// Change the check-in interval. With an existing check-in the deadline
    /// is recomputed from `last_check_in + new_interval + grace`.
    pub fn set_check_in_interval(&self, user_id: &str, interval_hours: u32) -> Result<User> {
        let user = self.require_user(user_id)?;
        let next_deadline = deadline::interval_change_deadline(&user, interval_hours)
            .or(user.next_deadline);

        let conn = self.conn.lock().map_err(store_err)?;
        conn.execute(
            "UPDATE users SET check_in_interval_hours = ?1, next_deadline = ?2 WHERE id = ?3",
            rusqlite::params![interval_hours, next_deadline.map(ts), user_id],
        )
        .map_err(store_err)?;

        Ok(User {
            check_in_interval_hours: interval_hours,
            next_deadline,
            ..user
        })
    }

    /// Toggle pause through the pause engine. Precondition violations come
    /// back as `InvalidOperation`.
    pub fn set_paused(&self, user_id: &str, paused: bool, now: DateTime<Utc>) -> Result<User> {
        let user = self.require_user(user_id)?;
        let state = if paused {
            deadline::enter_pause(&user, now)?
        } else {
            deadline::leave_pause(&user, now, None)
        };

        let conn = self.conn.lock().map_err(store_err)?;
        conn.execute(
            "UPDATE users SET is_paused = ?1, paused_until = ?2, next_deadline = ?3 WHERE id = ?4",
            rusqlite::params![
                state.is_paused as i64,
                state.paused_until.map(ts),
                state.next_deadline.map(ts),
                user_id
            ],
        )
        .map_err(store_err)?;

        Ok(User {
            is_paused: state.is_paused,
            paused_until: state.paused_until,
            next_deadline: state.next_deadline,
            ..user
        })
    }

    pub fn set_push_token(&self, user_id: &str, token: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().map_err(store_err)?;
        conn.execute(
            "UPDATE users SET push_token = ?1 WHERE id = ?2",
            rusqlite::params![token, user_id],
        )
        .map_err(store_err)?;
        Ok(())
    }

    // ─── Contacts ──────────────────────────────────────

    /// Create a pending contact relation. Rejects a duplicate of the same
    /// unordered pair in either direction.
    pub fn add_contact(&self, user_id: &str, contact_user_id: &str) -> Result<()> {
        let conn = self.conn.lock().map_err(store_err)?;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM contacts
                 WHERE (user_id = ?1 AND contact_user_id = ?2)
                    OR (user_id = ?2 AND contact_user_id = ?1)",
                [user_id, contact_user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        if exists.is_some() {
            return Err(LifesignError::InvalidOperation(
                "contact relation already exists".into(),
            ));
        }
        conn.execute(
            "INSERT INTO contacts (id, user_id, contact_user_id, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                uuid::Uuid::new_v4().to_string(),
                user_id,
                contact_user_id,
                ContactStatus::Pending.as_str(),
                ts(Utc::now()),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    pub fn accept_contact(&self, user_id: &str, contact_user_id: &str) -> Result<()> {
        let conn = self.conn.lock().map_err(store_err)?;
        let changed = conn
            .execute(
                "UPDATE contacts SET status = ?1 WHERE user_id = ?2 AND contact_user_id = ?3",
                rusqlite::params![ContactStatus::Accepted.as_str(), user_id, contact_user_id],
            )
            .map_err(store_err)?;
        if changed == 0 {
            return Err(LifesignError::Store("contact relation not found".into()));
        }
        Ok(())
    }

    // ─── Alerts ──────────────────────────────────────

    /// Episodes recorded for a user, newest first. Used by data export.
    pub fn alerts_for_user(&self, user_id: &str) -> Result<Vec<AlertEpisode>> {
        let conn = self.conn.lock().map_err(store_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, triggered_at, notified_contacts
                 FROM alerts WHERE user_id = ?1 ORDER BY triggered_at DESC",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map([user_id], |row| {
                let notified: String = row.get(3)?;
                Ok(AlertEpisode {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    triggered_at: parse_ts(&row.get::<_, String>(2)?),
                    notified_contacts: serde_json::from_str(&notified).unwrap_or_default(),
                })
            })
            .map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }

    // ─── Ephemeral records ──────────────────────────────────────

    pub fn insert_verification_code(
        &self,
        user_id: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().map_err(store_err)?;
        conn.execute(
            "INSERT INTO verification_codes (user_id, code, expires_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![user_id, code, ts(expires_at)],
        )
        .map_err(store_err)?;
        Ok(())
    }

    pub fn insert_refresh_token(
        &self,
        token: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().map_err(store_err)?;
        conn.execute(
            "INSERT INTO refresh_tokens (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![token, user_id, ts(expires_at)],
        )
        .map_err(store_err)?;
        Ok(())
    }

    pub fn insert_invitation(
        &self,
        from_user_id: &str,
        invite_code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().map_err(store_err)?;
        conn.execute(
            "INSERT INTO invitations (id, from_user_id, invite_code, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                uuid::Uuid::new_v4().to_string(),
                from_user_id,
                invite_code,
                ts(expires_at),
                ts(Utc::now()),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    pub fn mark_invitation_used(&self, invite_code: &str, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().map_err(store_err)?;
        conn.execute(
            "UPDATE invitations SET used_at = ?1 WHERE invite_code = ?2",
            rusqlite::params![ts(now), invite_code],
        )
        .map_err(store_err)?;
        Ok(())
    }
}

#[async_trait]
impl DeadlineStore for SqliteStore {
    async fn find_overdue_candidates(
        &self,
        now: DateTime<Utc>,
        suppression: Duration,
    ) -> Result<Vec<OverdueUser>> {
        let cutoff = now - suppression;
        let conn = self.conn.lock().map_err(store_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, encrypted_display_name, last_check_in, next_deadline
                 FROM users
                 WHERE next_deadline IS NOT NULL
                   AND next_deadline < ?1
                   AND is_paused = 0
                   AND id NOT IN (
                       SELECT user_id FROM alerts WHERE triggered_at > ?2
                   )",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map([ts(now), ts(cutoff)], |row| {
                Ok(OverdueUser {
                    id: row.get(0)?,
                    encrypted_display_name: row.get(1)?,
                    last_check_in: opt_ts(row.get(2)?),
                    next_deadline: parse_ts(&row.get::<_, String>(3)?),
                })
            })
            .map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }

    async fn accepted_contacts(&self, user_id: &str) -> Result<Vec<ContactSurface>> {
        let conn = self.conn.lock().map_err(store_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT c.contact_user_id, u.push_token, u.contact_type, u.encrypted_contact_info
                 FROM contacts c
                 JOIN users u ON u.id = c.contact_user_id
                 WHERE c.user_id = ?1 AND c.status = 'accepted'",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map([user_id], |row| {
                Ok(ContactSurface {
                    contact_user_id: row.get(0)?,
                    push_token: row.get(1)?,
                    contact_type: ContactType::parse(&row.get::<_, String>(2)?),
                    encrypted_address: row.get(3)?,
                })
            })
            .map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }

    async fn write_alert_episode(
        &self,
        user_id: &str,
        notified_contacts: &[String],
        triggered_at: DateTime<Utc>,
    ) -> Result<AlertEpisode> {
        let episode = AlertEpisode {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            triggered_at,
            notified_contacts: notified_contacts.to_vec(),
        };
        let notified = serde_json::to_string(&episode.notified_contacts)
            .map_err(store_err)?;
        let conn = self.conn.lock().map_err(store_err)?;
        conn.execute(
            "INSERT INTO alerts (id, user_id, triggered_at, notified_contacts)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![episode.id, episode.user_id, ts(triggered_at), notified],
        )
        .map_err(store_err)?;
        Ok(episode)
    }

    async fn delete_expired(&self, table: EphemeralTable, now: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn.lock().map_err(store_err)?;
        let deleted = match table {
            EphemeralTable::VerificationCodes | EphemeralTable::RefreshTokens => conn
                .execute(
                    &format!("DELETE FROM {} WHERE expires_at < ?1", table.table_name()),
                    [ts(now)],
                )
                .map_err(store_err)?,
            EphemeralTable::Invitations => conn
                .execute(
                    "DELETE FROM invitations WHERE expires_at < ?1 AND used_at IS NULL",
                    [ts(now)],
                )
                .map_err(store_err)?,
        };
        Ok(deleted as u64)
    }

    async fn find_reminder_candidates(
        &self,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> Result<Vec<User>> {
        let horizon = now + threshold;
        let conn = self.conn.lock().map_err(store_err)?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE reminder_enabled = 1
                   AND is_paused = 0
                   AND push_token IS NOT NULL
                   AND next_deadline IS NOT NULL
                   AND next_deadline > ?1
                   AND next_deadline <= ?2
                   AND (last_reminder_at IS NULL
                        OR (last_check_in IS NOT NULL AND last_reminder_at < last_check_in))"
            ))
            .map_err(store_err)?;
        let rows = stmt
            .query_map([ts(now), ts(horizon)], row_to_user)
            .map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }

    async fn mark_reminded(&self, user_id: &str, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().map_err(store_err)?;
        conn.execute(
            "UPDATE users SET last_reminder_at = ?1 WHERE id = ?2",
            rusqlite::params![ts(now), user_id],
        )
        .map_err(store_err)?;
        Ok(())
    }
}
