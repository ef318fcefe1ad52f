//! Alert dispatcher — fans one missed-deadline alert out to the user's
//! accepted contacts across the push and email channels, then records the
//! alert episode.
//!
//! The episode write happens only after both channels have been attempted
//! (individual delivery failures are ignored); a failure anywhere before
//! that point leaves no episode, which is what guarantees a retry on the
//! next scan tick. At-least-once alerting, duplicates bounded by the
//! suppression window.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;

use lifesign_core::error::Result;
use lifesign_core::traits::{Crypto, DeadlineStore, EmailChannel, PushChannel};
use lifesign_core::types::{DeliverySurface, OverdueUser, PushTicket};

use crate::templates;

/// What one dispatch attempt did. Returned for logging and tests.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Contact ids recorded on the episode (attempted, not confirmed).
    pub notified: Vec<String>,
    pub push_tokens: usize,
    pub emails_sent: usize,
    pub episode_written: bool,
}

pub struct AlertDispatcher {
    store: Arc<dyn DeadlineStore>,
    push: Arc<dyn PushChannel>,
    email: Arc<dyn EmailChannel>,
    crypto: Arc<dyn Crypto>,
}

impl AlertDispatcher {
    pub fn new(
        store: Arc<dyn DeadlineStore>,
        push: Arc<dyn PushChannel>,
        email: Arc<dyn EmailChannel>,
        crypto: Arc<dyn Crypto>,
    ) -> Self {
        Self { store, push, email, crypto }
    }

    /// Dispatch one alert. Errors here mean the episode was not written and
    /// the user will be retried on the next tick.
    pub async fn dispatch_alert(
        &self,
        user: &OverdueUser,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome> {
        let user_name = self
            .crypto
            .decrypt(&user.encrypted_display_name, &user.id)?;
        let hours = user.hours_since_check_in(now);

        let contacts = self.store.accepted_contacts(&user.id).await?;
        if contacts.is_empty() {
            // Nothing to notify, nothing to suppress future scans with: the
            // user is rescanned every tick until a contact exists.
            tracing::debug!("no contacts to notify for user {}", user.id);
            return Ok(DispatchOutcome::default());
        }

        let mut push_tokens: Vec<String> = Vec::new();
        let mut email_targets: Vec<(String, Vec<u8>)> = Vec::new();
        for contact in &contacts {
            match contact.delivery_surface() {
                Some(DeliverySurface::Push(token)) => push_tokens.push(token),
                Some(DeliverySurface::Email(address)) => {
                    email_targets.push((contact.contact_user_id.clone(), address));
                }
                Some(DeliverySurface::Both { token, address }) => {
                    push_tokens.push(token);
                    email_targets.push((contact.contact_user_id.clone(), address));
                }
                None => {
                    tracing::debug!(
                        "contact {} of user {} has no delivery surface",
                        contact.contact_user_id,
                        user.id
                    );
                }
            }
        }

        let push_fut = self.send_push(&push_tokens, &user_name, hours);
        let email_fut = self.send_emails(&email_targets, &user_name, hours);
        // Independent channels, run concurrently; wait for both before the
        // episode write.
        let (tickets, emails_sent) = tokio::join!(push_fut, email_fut);

        for ticket in tickets.iter().filter(|t| t.is_device_not_registered()) {
            // Stale tokens are not cleared here; the signal is only logged.
            tracing::warn!(
                "push token {} of a contact of user {} is no longer registered",
                ticket.token,
                user.id
            );
        }

        let notified: Vec<String> = contacts
            .iter()
            .map(|c| c.contact_user_id.clone())
            .collect();
        self.store
            .write_alert_episode(&user.id, &notified, now)
            .await?;

        tracing::info!(
            "🚨 alert for user {}: {} contacts notified ({} push, {} email)",
            user.id,
            notified.len(),
            push_tokens.len(),
            emails_sent
        );

        Ok(DispatchOutcome {
            notified,
            push_tokens: push_tokens.len(),
            emails_sent,
            episode_written: true,
        })
    }

    /// One batched push call for all push-capable contacts of this user.
    /// The adapter chunks internally and never raises.
    async fn send_push(&self, tokens: &[String], user_name: &str, hours: i64) -> Vec<PushTicket> {
        if tokens.is_empty() {
            return Vec::new();
        }
        let messages = templates::alert_push_messages(tokens, user_name, hours);
        self.push.send_batch(messages).await
    }

    /// N independent email sends. A decryption failure skips that contact;
    /// a send failure is logged; neither aborts the rest.
    async fn send_emails(
        &self,
        targets: &[(String, Vec<u8>)],
        user_name: &str,
        hours: i64,
    ) -> usize {
        let sends = targets.iter().map(|(contact_id, encrypted_address)| async move {
            let address = match self.crypto.decrypt(encrypted_address, contact_id) {
                Ok(address) => address,
                Err(e) => {
                    tracing::warn!("cannot decrypt address of contact {contact_id}: {e}");
                    return false;
                }
            };
            match self
                .email
                .send(templates::alert_email(address, user_name, hours))
                .await
            {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("failed to send alert email to contact {contact_id}: {e}");
                    false
                }
            }
        });
        join_all(sends).await.into_iter().filter(|sent| *sent).count()
    }
}
