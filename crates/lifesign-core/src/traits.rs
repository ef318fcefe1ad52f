//! Capability traits at the seams between the scheduler and its
//! collaborators. The scheduler only ever sees `Arc<dyn ...>` — concrete
//! implementations are injected at startup, never reached for as globals.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::types::{
    AlertEpisode, ContactSurface, EphemeralTable, OutgoingEmail, OverdueUser, PushMessage,
    PushTicket, User,
};

/// Read/update surface of the persisted deadline state.
#[async_trait]
pub trait DeadlineStore: Send + Sync {
    /// Users past their deadline, not paused, and with no alert episode
    /// inside the suppression window. Evaluated atomically against the store.
    async fn find_overdue_candidates(
        &self,
        now: DateTime<Utc>,
        suppression: Duration,
    ) -> Result<Vec<OverdueUser>>;

    /// Accepted contacts of the alert owner, joined with each contact's
    /// delivery surface.
    async fn accepted_contacts(&self, user_id: &str) -> Result<Vec<ContactSurface>>;

    /// Record one alert episode. This is the dedup-write step: its absence
    /// on total dispatch failure is what allows a retry on the next tick.
    async fn write_alert_episode(
        &self,
        user_id: &str,
        notified_contacts: &[String],
        triggered_at: DateTime<Utc>,
    ) -> Result<AlertEpisode>;

    /// Delete expired rows of one ephemeral record class. Returns the number
    /// of rows removed.
    async fn delete_expired(&self, table: EphemeralTable, now: DateTime<Utc>) -> Result<u64>;

    /// Reminder-enabled users with a push token whose deadline falls within
    /// `threshold` and who have not been reminded since their last check-in.
    async fn find_reminder_candidates(
        &self,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> Result<Vec<User>>;

    /// Mark a user as reminded so the next reminder waits for a new cycle.
    async fn mark_reminded(&self, user_id: &str, now: DateTime<Utc>) -> Result<()>;
}

/// Push provider capability: deliver a batch, return per-token outcomes.
/// Delivery is best-effort; a provider outage yields an empty ticket list,
/// never an error.
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn send_batch(&self, messages: Vec<PushMessage>) -> Vec<PushTicket>;
}

/// Email provider capability: one message per recipient, errors propagate so
/// the caller can catch them per-recipient.
#[async_trait]
pub trait EmailChannel: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<()>;
}

/// Opaque encrypt/decrypt capability keyed by the owning user's id.
pub trait Crypto: Send + Sync {
    fn encrypt(&self, plaintext: &str, owner_id: &str) -> Vec<u8>;

    /// Fails with `LifesignError::Decryption` on tamper or key mismatch.
    fn decrypt(&self, ciphertext: &[u8], owner_id: &str) -> Result<String>;
}
