//! Hand-rolled fakes shared by the dispatcher and scanner tests.

use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use lifesign_core::error::{LifesignError, Result};
use lifesign_core::traits::{Crypto, DeadlineStore, EmailChannel, PushChannel};
use lifesign_core::types::{
    AlertEpisode, ContactSurface, EphemeralTable, OutgoingEmail, OverdueUser, PushMessage,
    PushStatus, PushTicket, User,
};

/// Pair of signals for parking the overdue scan mid-flight: the store
/// notifies `entered` once a scan reaches it, then waits for `release`.
#[derive(Default)]
pub struct ScanHold {
    pub entered: Notify,
    pub release: Notify,
}

/// In-memory store fake. Configure the candidate lists up front, read the
/// recorded writes afterwards.
#[derive(Default)]
pub struct MockStore {
    pub overdue: Vec<OverdueUser>,
    pub contacts: Vec<ContactSurface>,
    pub reminders: Vec<User>,
    /// Simulate a store failure when resolving this user's contacts.
    pub fail_contacts_for: Option<String>,
    /// When set, `find_overdue_candidates` blocks until released.
    pub hold_scan: Option<Arc<ScanHold>>,
    pub episodes: Mutex<Vec<AlertEpisode>>,
    pub reminded: Mutex<Vec<String>>,
    pub swept: Mutex<Vec<EphemeralTable>>,
}

impl MockStore {
    pub fn with_contacts(mut self, contacts: Vec<ContactSurface>) -> Self {
        self.contacts = contacts;
        self
    }

    pub fn with_overdue(mut self, overdue: Vec<OverdueUser>) -> Self {
        self.overdue = overdue;
        self
    }

    pub fn with_reminders(mut self, reminders: Vec<User>) -> Self {
        self.reminders = reminders;
        self
    }

    pub fn failing_contacts_for(mut self, user_id: &str) -> Self {
        self.fail_contacts_for = Some(user_id.to_string());
        self
    }

    pub fn holding_scans(mut self, hold: Arc<ScanHold>) -> Self {
        self.hold_scan = Some(hold);
        self
    }
}

#[async_trait]
impl DeadlineStore for MockStore {
    async fn find_overdue_candidates(
        &self,
        _now: DateTime<Utc>,
        _suppression: Duration,
    ) -> Result<Vec<OverdueUser>> {
        if let Some(hold) = &self.hold_scan {
            hold.entered.notify_one();
            hold.release.notified().await;
        }
        Ok(self.overdue.clone())
    }

    async fn accepted_contacts(&self, user_id: &str) -> Result<Vec<ContactSurface>> {
        if self.fail_contacts_for.as_deref() == Some(user_id) {
            return Err(LifesignError::Store(format!(
                "simulated failure resolving contacts of {user_id}"
            )));
        }
        Ok(self.contacts.clone())
    }

    async fn write_alert_episode(
        &self,
        user_id: &str,
        notified_contacts: &[String],
        triggered_at: DateTime<Utc>,
    ) -> Result<AlertEpisode> {
        let episode = AlertEpisode {
            id: format!("episode-{}", self.episodes.lock().unwrap().len()),
            user_id: user_id.to_string(),
            triggered_at,
            notified_contacts: notified_contacts.to_vec(),
        };
        self.episodes.lock().unwrap().push(episode.clone());
        Ok(episode)
    }

    async fn delete_expired(&self, table: EphemeralTable, _now: DateTime<Utc>) -> Result<u64> {
        self.swept.lock().unwrap().push(table);
        Ok(1)
    }

    async fn find_reminder_candidates(
        &self,
        _now: DateTime<Utc>,
        _threshold: Duration,
    ) -> Result<Vec<User>> {
        Ok(self.reminders.clone())
    }

    async fn mark_reminded(&self, user_id: &str, _now: DateTime<Utc>) -> Result<()> {
        self.reminded.lock().unwrap().push(user_id.to_string());
        Ok(())
    }
}

/// Records every batch handed to it; every message gets an Ok ticket unless
/// its token appears in `dead_tokens`.
#[derive(Default)]
pub struct MockPush {
    pub batches: Mutex<Vec<Vec<PushMessage>>>,
    pub dead_tokens: Vec<String>,
}

impl MockPush {
    pub fn with_dead_token(mut self, token: &str) -> Self {
        self.dead_tokens.push(token.to_string());
        self
    }
}

#[async_trait]
impl PushChannel for MockPush {
    async fn send_batch(&self, messages: Vec<PushMessage>) -> Vec<PushTicket> {
        let tickets = messages
            .iter()
            .map(|m| PushTicket {
                token: m.to.clone(),
                status: if self.dead_tokens.contains(&m.to) {
                    PushStatus::Error { reason: "DeviceNotRegistered".into() }
                } else {
                    PushStatus::Ok
                },
            })
            .collect();
        self.batches.lock().unwrap().push(messages);
        tickets
    }
}

/// Records successful sends; addresses in `fail_to` error out instead.
#[derive(Default)]
pub struct MockEmail {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub fail_to: Vec<String>,
}

impl MockEmail {
    pub fn failing_for(mut self, address: &str) -> Self {
        self.fail_to.push(address.to_string());
        self
    }
}

#[async_trait]
impl EmailChannel for MockEmail {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        if self.fail_to.contains(&email.to) {
            return Err(LifesignError::Channel(format!(
                "simulated SMTP failure for {}",
                email.to
            )));
        }
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

/// Identity "encryption": ciphertext is the UTF-8 plaintext, so arbitrary
/// byte garbage doubles as an undecryptable value.
pub struct PlainCrypto;

impl Crypto for PlainCrypto {
    fn encrypt(&self, plaintext: &str, _owner_id: &str) -> Vec<u8> {
        plaintext.as_bytes().to_vec()
    }

    fn decrypt(&self, ciphertext: &[u8], _owner_id: &str) -> Result<String> {
        String::from_utf8(ciphertext.to_vec())
            .map_err(|_| LifesignError::Decryption("not valid UTF-8".into()))
    }
}
