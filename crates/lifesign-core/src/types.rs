//! Domain types shared by the store, scheduler, and channel adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default check-in interval for new users.
pub const DEFAULT_CHECK_IN_INTERVAL_HOURS: u32 = 48;
/// Extra buffer added to the interval before a deadline counts as missed.
pub const DEFAULT_GRACE_PERIOD_HOURS: u32 = 6;
/// Reminder pushes go out when the deadline is within this many hours.
pub const WARNING_THRESHOLD_HOURS: i64 = 6;
/// A repeat alert for the same user is withheld for this long (sliding window).
pub const ALERT_SUPPRESSION_SECS: i64 = 3600;

/// A registered user with their check-in obligation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub contact_type: ContactType,
    pub check_in_interval_hours: u32,
    pub grace_period_hours: u32,
    /// Null until the first check-in ever occurs.
    pub last_check_in: Option<DateTime<Utc>>,
    /// Recomputed on every check-in and interval change. Only enforceable
    /// while `is_paused` is false.
    pub next_deadline: Option<DateTime<Utc>>,
    pub is_paused: bool,
    /// Pause auto-expires at this instant.
    pub paused_until: Option<DateTime<Utc>>,
    pub reminder_enabled: bool,
    pub push_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// How a user can be reached outside the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactType {
    Email,
    Phone,
}

impl ContactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "phone" => Self::Phone,
            _ => Self::Email,
        }
    }
}

/// Contact relation state. Only accepted relations participate in fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    Pending,
    Accepted,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
        }
    }
}

/// A user past their deadline, as returned by the overdue scan.
#[derive(Debug, Clone)]
pub struct OverdueUser {
    pub id: String,
    pub encrypted_display_name: Vec<u8>,
    pub last_check_in: Option<DateTime<Utc>>,
    pub next_deadline: DateTime<Utc>,
}

impl OverdueUser {
    /// Whole hours since the last check-in. Falls back to the deadline when
    /// no check-in was ever recorded.
    pub fn hours_since_check_in(&self, now: DateTime<Utc>) -> i64 {
        let reference = self.last_check_in.unwrap_or(self.next_deadline);
        (now - reference).num_hours().max(0)
    }
}

/// An accepted contact joined with their delivery surface.
#[derive(Debug, Clone)]
pub struct ContactSurface {
    pub contact_user_id: String,
    pub push_token: Option<String>,
    pub contact_type: ContactType,
    pub encrypted_address: Vec<u8>,
}

impl ContactSurface {
    /// Resolve the delivery surface once, instead of re-checking optional
    /// fields at every use site. None means the contact is unreachable.
    pub fn delivery_surface(&self) -> Option<DeliverySurface> {
        let email = (self.contact_type == ContactType::Email)
            .then(|| self.encrypted_address.clone());
        match (self.push_token.clone(), email) {
            (Some(token), Some(address)) => Some(DeliverySurface::Both { token, address }),
            (Some(token), None) => Some(DeliverySurface::Push(token)),
            (None, Some(address)) => Some(DeliverySurface::Email(address)),
            (None, None) => None,
        }
    }
}

/// Channels a single contact can be reached on. Email addresses stay
/// encrypted until the moment of sending.
#[derive(Debug, Clone)]
pub enum DeliverySurface {
    Push(String),
    Email(Vec<u8>),
    Both { token: String, address: Vec<u8> },
}

/// One recorded instance of notifying contacts about a missed deadline.
/// Created once per episode, never mutated; consumed by the dedup predicate
/// and by user data export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEpisode {
    pub id: String,
    pub user_id: String,
    pub triggered_at: DateTime<Utc>,
    /// Contacts we attempted to tell — not delivery confirmations.
    pub notified_contacts: Vec<String>,
}

/// Ephemeral record classes swept by the retention job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EphemeralTable {
    VerificationCodes,
    RefreshTokens,
    /// Only expired *and unused* invitations are deleted.
    Invitations,
}

impl EphemeralTable {
    pub const ALL: [Self; 3] = [
        Self::VerificationCodes,
        Self::RefreshTokens,
        Self::Invitations,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            Self::VerificationCodes => "verification_codes",
            Self::RefreshTokens => "refresh_tokens",
            Self::Invitations => "invitations",
        }
    }
}

/// A single push notification addressed to one device token.
#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    pub to: String,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

/// Provider error reason meaning the token is permanently invalid.
pub const DEVICE_NOT_REGISTERED: &str = "DeviceNotRegistered";

/// Per-message delivery ticket returned by the push provider.
#[derive(Debug, Clone)]
pub struct PushTicket {
    pub token: String,
    pub status: PushStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushStatus {
    Ok,
    Error { reason: String },
}

impl PushTicket {
    /// The provider reported this token as permanently dead.
    pub fn is_device_not_registered(&self) -> bool {
        matches!(&self.status, PushStatus::Error { reason } if reason == DEVICE_NOT_REGISTERED)
    }
}

/// One outbound email, fully rendered.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(token: Option<&str>, ctype: ContactType) -> ContactSurface {
        ContactSurface {
            contact_user_id: "c1".into(),
            push_token: token.map(String::from),
            contact_type: ctype,
            encrypted_address: vec![1, 2, 3],
        }
    }

    #[test]
    fn test_delivery_surface_partition() {
        assert!(matches!(
            surface(Some("tok"), ContactType::Phone).delivery_surface(),
            Some(DeliverySurface::Push(_))
        ));
        assert!(matches!(
            surface(None, ContactType::Email).delivery_surface(),
            Some(DeliverySurface::Email(_))
        ));
        assert!(matches!(
            surface(Some("tok"), ContactType::Email).delivery_surface(),
            Some(DeliverySurface::Both { .. })
        ));
        assert!(surface(None, ContactType::Phone).delivery_surface().is_none());
    }

    #[test]
    fn test_device_not_registered_ticket() {
        let dead = PushTicket {
            token: "t".into(),
            status: PushStatus::Error { reason: DEVICE_NOT_REGISTERED.into() },
        };
        let ok = PushTicket { token: "t".into(), status: PushStatus::Ok };
        assert!(dead.is_device_not_registered());
        assert!(!ok.is_device_not_registered());
    }
}
