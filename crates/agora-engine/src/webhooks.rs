//! Webhook deliverer: HMAC-signed fan-out of domain events.
//!
//! Every active webhook subscribed to the event's type gets a POST with the
//! signed JSON body. One immutable audit row is written per attempt,
//! successful or not; deliveries run in parallel and never affect each
//! other.

use std::sync::Arc;
use std::time::Duration;

use agora_core::envelope::DomainEvent;
use agora_core::fmt::BoxedError;
use agora_core::id::{DeliveryId, WebhookId};
use agora_core::Timestamp;
use agora_db::{Database, DeliveryRecord, WebhookRecord};
use async_trait::async_trait;
use futures::future::join_all;
use hmac::{Hmac, Mac as _};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::dispatch::EventHandler;

const LOG_TARGET: &str = "agora::webhooks";

const WEBHOOK_TIMEOUT_SECS: u64 = 15;
/// Response bodies are truncated to this many bytes in the audit row.
const MAX_RESPONSE_BYTES: usize = 4096;

/// `sha256=<hex>` signature over the exact request body.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    format!("sha256={}", data_encoding::HEXLOWER.encode(&digest))
}

fn truncate_response(body: &str) -> String {
    if body.len() <= MAX_RESPONSE_BYTES {
        return body.to_string();
    }
    let mut end = MAX_RESPONSE_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

pub struct WebhookDeliverer {
    db: Arc<Database>,
    client: reqwest::Client,
}

impl WebhookDeliverer {
    pub fn new(db: Arc<Database>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("agora-webhooks/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");
        Self { db, client }
    }

    async fn deliver(
        &self,
        webhook_id: WebhookId,
        webhook: &WebhookRecord,
        event: &DomainEvent,
    ) {
        let delivery_id = DeliveryId::random();

        let body = serde_json::json!({
            "id": delivery_id.to_string(),
            "type": event.event_type,
            "timestamp": event.timestamp.to_rfc3339(),
            "data": event.payload,
        });
        let body_bytes = serde_json::to_vec(&body).expect("JSON serialization");
        let signature = sign_payload(&webhook.secret, &body_bytes);

        let response = self
            .client
            .post(&webhook.url)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Signature", &signature)
            .header("X-Event-Type", &event.event_type)
            .header("X-Delivery-ID", delivery_id.to_string())
            .body(body_bytes)
            .send()
            .await;

        let record = match response {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let response_body = truncate_response(&response.text().await.unwrap_or_default());
                debug!(
                    target: LOG_TARGET,
                    url = %webhook.url,
                    status = status_code,
                    "Webhook delivered"
                );
                DeliveryRecord {
                    event_type: event.event_type.clone(),
                    status_code,
                    response_body,
                    attempt: 1,
                    delivered_at: Timestamp::now(),
                    error: None,
                }
            }
            Err(err) => {
                warn!(
                    target: LOG_TARGET,
                    url = %webhook.url,
                    err = %err,
                    "Webhook delivery failed"
                );
                DeliveryRecord {
                    event_type: event.event_type.clone(),
                    // Network failure, no HTTP status.
                    status_code: 0,
                    response_body: String::new(),
                    attempt: 1,
                    delivered_at: Timestamp::now(),
                    error: Some(err.to_string()),
                }
            }
        };

        if let Err(err) = self
            .db
            .record_webhook_delivery(webhook_id, delivery_id, record)
            .await
        {
            warn!(
                target: LOG_TARGET,
                url = %webhook.url,
                err = %err,
                "Failed to record webhook delivery"
            );
        }
    }
}

#[async_trait]
impl EventHandler for WebhookDeliverer {
    fn name(&self) -> &'static str {
        "webhooks"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), BoxedError> {
        let subscribers = self.db.list_webhooks_for_event(&event.event_type).await?;
        if subscribers.is_empty() {
            return Ok(());
        }

        join_all(
            subscribers
                .iter()
                .map(|(webhook_id, webhook)| self.deliver(*webhook_id, webhook, event)),
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_stable_hex_with_prefix() {
        let signature = sign_payload("topsecret", br#"{"hello":"world"}"#);
        assert!(signature.starts_with("sha256="));
        // 32-byte digest, hex-encoded.
        assert_eq!(signature.len(), "sha256=".len() + 64);
        // Deterministic for the same key/body.
        assert_eq!(signature, sign_payload("topsecret", br#"{"hello":"world"}"#));
        // Key changes the digest.
        assert_ne!(signature, sign_payload("other", br#"{"hello":"world"}"#));
    }

    #[test]
    fn response_truncation_respects_char_boundaries() {
        let long = "x".repeat(MAX_RESPONSE_BYTES + 100);
        assert_eq!(truncate_response(&long).len(), MAX_RESPONSE_BYTES);

        let short = "ok";
        assert_eq!(truncate_response(short), "ok");

        // Multi-byte char straddling the cut must not split.
        let tricky = format!("{}é", "x".repeat(MAX_RESPONSE_BYTES - 1));
        let truncated = truncate_response(&tricky);
        assert!(truncated.len() <= MAX_RESPONSE_BYTES);
        assert!(truncated.chars().all(|c| c == 'x'));
    }
}
