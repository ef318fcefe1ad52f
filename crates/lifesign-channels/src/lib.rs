//! # Lifesign Channels
//!
//! Notification channel adapters. Each adapter owns its own failure
//! isolation: the push adapter never raises to the dispatcher, the email
//! adapter raises per-recipient so the dispatcher can catch and continue.

pub mod email;
pub mod push;

pub use email::Mailer;
pub use push::PushClient;
