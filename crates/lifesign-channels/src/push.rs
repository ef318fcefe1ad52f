//! Push adapter — Expo-compatible batch push over HTTP.
//!
//! Messages are validated, chunked to the provider's batch limit, and sent
//! as one JSON array per chunk. The provider answers with one ticket per
//! message in request order. A provider outage is logged and treated as
//! delivered-to-none; it never raises to the dispatcher.

use async_trait::async_trait;
use serde::Deserialize;

use lifesign_core::config::PushConfig;
use lifesign_core::error::{LifesignError, Result};
use lifesign_core::traits::PushChannel;
use lifesign_core::types::{PushMessage, PushStatus, PushTicket};

/// Token format check before sending. Anything else is dropped with a log
/// line, matching the provider SDK's behavior.
pub fn is_push_token(token: &str) -> bool {
    (token.starts_with("ExponentPushToken[") || token.starts_with("ExpoPushToken["))
        && token.ends_with(']')
}

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    data: Vec<ProviderTicket>,
}

#[derive(Debug, Deserialize)]
struct ProviderTicket {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<ProviderTicketDetails>,
}

#[derive(Debug, Deserialize)]
struct ProviderTicketDetails {
    #[serde(default)]
    error: Option<String>,
}

/// Map provider tickets back to the tokens of one chunk (same order).
fn tickets_for_chunk(chunk: &[PushMessage], response: ProviderResponse) -> Vec<PushTicket> {
    chunk
        .iter()
        .zip(response.data)
        .map(|(msg, ticket)| {
            let status = if ticket.status == "ok" {
                PushStatus::Ok
            } else {
                let reason = ticket
                    .details
                    .and_then(|d| d.error)
                    .or(ticket.message)
                    .unwrap_or_else(|| "unknown".into());
                PushStatus::Error { reason }
            };
            PushTicket { token: msg.to.clone(), status }
        })
        .collect()
}

pub struct PushClient {
    client: reqwest::Client,
    config: PushConfig,
}

impl PushClient {
    pub fn new(config: PushConfig) -> Self {
        Self { client: reqwest::Client::new(), config }
    }

    async fn send_chunk(&self, chunk: &[PushMessage]) -> Result<Vec<PushTicket>> {
        let resp = self
            .client
            .post(&self.config.endpoint)
            .json(chunk)
            .timeout(std::time::Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map_err(|e| LifesignError::Channel(format!("push send failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LifesignError::Channel(format!(
                "push provider error {status}: {body}"
            )));
        }

        let parsed: ProviderResponse = resp
            .json()
            .await
            .map_err(|e| LifesignError::Channel(format!("push response parse: {e}")))?;
        Ok(tickets_for_chunk(chunk, parsed))
    }
}

#[async_trait]
impl PushChannel for PushClient {
    async fn send_batch(&self, messages: Vec<PushMessage>) -> Vec<PushTicket> {
        let valid: Vec<PushMessage> = messages
            .into_iter()
            .filter(|m| {
                let ok = is_push_token(&m.to);
                if !ok {
                    tracing::warn!("dropping invalid push token: {}", m.to);
                }
                ok
            })
            .collect();

        if valid.is_empty() {
            return Vec::new();
        }

        let mut tickets = Vec::with_capacity(valid.len());
        // A zero chunk size from a hand-edited config must not panic.
        for chunk in valid.chunks(self.config.chunk_size.max(1)) {
            match self.send_chunk(chunk).await {
                Ok(chunk_tickets) => tickets.extend(chunk_tickets),
                Err(e) => {
                    tracing::warn!("push batch failed, remaining chunks skipped: {e}");
                    break;
                }
            }
        }
        tickets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Minimal push provider: counts requests and answers every message in
    /// the posted array with an ok ticket.
    async fn spawn_provider(hits: Arc<AtomicUsize>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { return };
                hits.fetch_add(1, Ordering::SeqCst);
                let mut buf = Vec::new();
                let mut tmp = [0u8; 4096];
                let body = loop {
                    let n = socket.read(&mut tmp).await.unwrap();
                    buf.extend_from_slice(&tmp[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        let headers = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                        let len: usize = headers
                            .lines()
                            .find_map(|l| l.strip_prefix("content-length:"))
                            .and_then(|v| v.trim().parse().ok())
                            .unwrap_or(0);
                        while buf.len() < pos + 4 + len {
                            let n = socket.read(&mut tmp).await.unwrap();
                            buf.extend_from_slice(&tmp[..n]);
                        }
                        break buf[pos + 4..pos + 4 + len].to_vec();
                    }
                };
                let messages: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
                let tickets: Vec<_> = messages
                    .iter()
                    .map(|_| serde_json::json!({"status": "ok"}))
                    .collect();
                let payload = serde_json::json!({ "data": tickets }).to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n{payload}",
                    payload.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
            }
        });
        format!("http://{addr}/push")
    }

    fn msg(to: &str) -> PushMessage {
        PushMessage {
            to: to.into(),
            title: "t".into(),
            body: "b".into(),
            data: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_token_validation() {
        assert!(is_push_token("ExponentPushToken[abc123]"));
        assert!(is_push_token("ExpoPushToken[abc123]"));
        assert!(!is_push_token("abc123"));
        assert!(!is_push_token("ExponentPushToken[abc"));
        assert!(!is_push_token(""));
    }

    #[test]
    fn test_ticket_mapping_preserves_order() {
        let chunk = vec![msg("ExponentPushToken[a]"), msg("ExponentPushToken[b]")];
        let response: ProviderResponse = serde_json::from_str(
            r#"{"data":[
                {"status":"ok","id":"1"},
                {"status":"error","message":"gone","details":{"error":"DeviceNotRegistered"}}
            ]}"#,
        )
        .unwrap();

        let tickets = tickets_for_chunk(&chunk, response);
        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0].status, PushStatus::Ok);
        assert_eq!(tickets[0].token, "ExponentPushToken[a]");
        assert!(tickets[1].is_device_not_registered());
    }

    #[test]
    fn test_error_without_details_keeps_message() {
        let chunk = vec![msg("ExponentPushToken[a]")];
        let response: ProviderResponse =
            serde_json::from_str(r#"{"data":[{"status":"error","message":"rate limited"}]}"#)
                .unwrap();

        let tickets = tickets_for_chunk(&chunk, response);
        assert_eq!(
            tickets[0].status,
            PushStatus::Error { reason: "rate limited".into() }
        );
    }

    #[tokio::test]
    async fn test_batches_are_chunked_to_provider_limit() {
        let hits = Arc::new(AtomicUsize::new(0));
        let endpoint = spawn_provider(hits.clone()).await;
        let client = PushClient::new(PushConfig { endpoint, chunk_size: 2, timeout_secs: 5 });

        let tickets = client
            .send_batch(vec![
                msg("ExponentPushToken[a]"),
                msg("ExponentPushToken[b]"),
                msg("ExponentPushToken[c]"),
            ])
            .await;

        // three messages at a limit of two means exactly two provider calls
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(tickets.len(), 3);
        assert!(tickets.iter().all(|t| t.status == PushStatus::Ok));
    }

    #[tokio::test]
    async fn test_zero_chunk_size_is_clamped_to_one() {
        let hits = Arc::new(AtomicUsize::new(0));
        let endpoint = spawn_provider(hits.clone()).await;
        let client = PushClient::new(PushConfig { endpoint, chunk_size: 0, timeout_secs: 5 });

        let tickets = client
            .send_batch(vec![msg("ExponentPushToken[a]"), msg("ExponentPushToken[b]")])
            .await;

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(tickets.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_tokens_short_circuit_without_network() {
        // Unroutable endpoint: proves invalid-only batches never hit the wire.
        let client = PushClient::new(PushConfig {
            endpoint: "http://127.0.0.1:1/push".into(),
            chunk_size: 100,
            timeout_secs: 1,
        });
        let tickets = client.send_batch(vec![msg("not-a-token")]).await;
        assert!(tickets.is_empty());
    }

    #[tokio::test]
    async fn test_provider_outage_is_delivered_to_none() {
        let client = PushClient::new(PushConfig {
            endpoint: "http://127.0.0.1:1/push".into(),
            chunk_size: 100,
            timeout_secs: 1,
        });
        let tickets = client.send_batch(vec![msg("ExponentPushToken[a]")]).await;
        assert!(tickets.is_empty());
    }
}
