//! Notification content. The dispatcher renders, the channel adapters
//! transport.

use lifesign_core::types::{OutgoingEmail, PushMessage};

/// Alert push messages, one per push-capable token.
pub fn alert_push_messages(tokens: &[String], user_name: &str, hours: i64) -> Vec<PushMessage> {
    tokens
        .iter()
        .map(|token| PushMessage {
            to: token.clone(),
            title: "Important notice".into(),
            body: format!(
                "{user_name} has not checked in for {hours} hours. \
                 Please make sure they are okay."
            ),
            data: serde_json::json!({
                "type": "alert",
                "userName": user_name,
                "hoursSinceCheckIn": hours,
            }),
        })
        .collect()
}

/// Reminder push for the user themselves, shortly before their deadline.
pub fn reminder_push_message(token: &str, hours_remaining: i64) -> PushMessage {
    PushMessage {
        to: token.to_string(),
        title: "Reminder".into(),
        body: format!(
            "Please check in soon! Only {hours_remaining} hours left until your deadline."
        ),
        data: serde_json::json!({
            "type": "reminder",
            "hoursRemaining": hours_remaining,
        }),
    }
}

/// Alert email for one contact.
pub fn alert_email(to: String, user_name: &str, hours: i64) -> OutgoingEmail {
    OutgoingEmail {
        subject: format!("Important: {user_name} has not checked in"),
        html_body: format!(
            r#"<!DOCTYPE html>
<html>
<body style="font-family: sans-serif; line-height: 1.6; max-width: 600px; margin: 0 auto; padding: 20px;">
  <h1 style="color: #E53935;">Important notice</h1>
  <div style="background-color: #ffebee; border-radius: 12px; padding: 30px; border: 2px solid #E53935;">
    <p style="font-size: 18px;">
      <strong>{user_name}</strong> has not checked in for <strong>{hours} hours</strong>.
    </p>
    <p>Please make sure they are okay.</p>
  </div>
  <p style="font-size: 14px; color: #757575;">
    This message was sent automatically by Lifesign.
  </p>
</body>
</html>"#
        ),
        text_body: format!(
            "Important notice from Lifesign\n\n\
             {user_name} has not checked in for {hours} hours.\n\n\
             Please make sure they are okay.\n\n\
             This message was sent automatically by Lifesign."
        ),
        to,
    }
}
