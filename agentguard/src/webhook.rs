//! Fire-and-forget webhook notifications for approval lifecycle events.
//!
//! Delivery is at-most-once: one attempt on a detached task with a
//! 5-second timeout, failures logged and dropped. The approval record is
//! always the authoritative state; the decision that triggered an event
//! is never rolled back on delivery failure.
//!
//! Slack incoming-webhook destinations (detected by host substring) get a
//! pre-rendered attachment body; all other destinations get the JSON
//! event payload, HMAC-signed when a shared secret is configured.

use chrono::{SecondsFormat, Utc};
use errors::WebhookError;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

pub const EVENT_APPROVAL_CREATED: &str = "approval.created";
pub const EVENT_APPROVAL_APPROVED: &str = "approval.approved";
pub const EVENT_APPROVAL_DENIED: &str = "approval.denied";

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);
pub const SIGNATURE_HEADER: &str = "X-AgentGuard-Signature";

/// Event payload fields shared by all three approval events.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalEvent {
    pub approval_id: String,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_by: Option<String>,
}

#[derive(Serialize)]
struct EventBody<'a> {
    event: &'a str,
    timestamp: String,
    #[serde(flatten)]
    payload: &'a ApprovalEvent,
}

#[derive(Clone)]
pub struct WebhookDispatcher {
    client: reqwest::Client,
    url: Option<String>,
    secret: Option<String>,
}

impl WebhookDispatcher {
    pub fn new(url: Option<String>, secret: Option<String>) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()
            .map_err(|e| WebhookError::Delivery {
                reason: e.to_string(),
            })?;
        Ok(Self { client, url, secret })
    }

    /// Queue one delivery attempt and return immediately. A no-op when no
    /// webhook URL is configured.
    pub fn dispatch(&self, event: &'static str, payload: ApprovalEvent) {
        let Some(url) = self.url.clone() else {
            return;
        };

        let is_slack = url.contains("hooks.slack.com");
        let body = if is_slack {
            slack_body(event, &payload)
        } else {
            json_body(event, &payload)
        };
        let signature = if is_slack {
            None
        } else {
            self.secret.as_deref().map(|secret| sign_body(secret, body.as_bytes()))
        };

        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = deliver(&client, &url, body, signature).await {
                metrics::counter!("agentguard_webhook_deliveries_total", "outcome" => "failure")
                    .increment(1);
                tracing::warn!(url = %url, event = %event, error = %e, "Webhook delivery failed");
            } else {
                metrics::counter!("agentguard_webhook_deliveries_total", "outcome" => "success")
                    .increment(1);
                tracing::debug!(url = %url, event = %event, "Webhook delivered");
            }
        });
    }
}

async fn deliver(
    client: &reqwest::Client,
    url: &str,
    body: String,
    signature: Option<String>,
) -> Result<(), WebhookError> {
    let mut request = client
        .post(url)
        .header("Content-Type", "application/json")
        .body(body);
    if let Some(signature) = signature {
        request = request.header(SIGNATURE_HEADER, signature);
    }

    let response = request.send().await.map_err(|e| WebhookError::Delivery {
        reason: e.to_string(),
    })?;

    if !response.status().is_success() {
        return Err(WebhookError::BadStatus {
            status: response.status().as_u16(),
        });
    }
    Ok(())
}

fn json_body(event: &str, payload: &ApprovalEvent) -> String {
    let body = EventBody {
        event,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        payload,
    };
    // ApprovalEvent serialization cannot fail; fall back to the bare
    // event name if it somehow does.
    serde_json::to_string(&body).unwrap_or_else(|_| format!("{{\"event\":\"{event}\"}}"))
}

/// `sha256=<hex>` over the raw request body.
fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn slack_body(event: &str, payload: &ApprovalEvent) -> String {
    let agent_name = payload
        .agent_name
        .clone()
        .unwrap_or_else(|| payload.agent_id.clone());
    let resource_part = payload
        .resource
        .as_deref()
        .filter(|r| !r.is_empty())
        .map(|r| format!(" on `{r}`"))
        .unwrap_or_default();
    let action = &payload.action;
    let reason_part = payload
        .decision_reason
        .as_deref()
        .filter(|r| !r.is_empty())
        .map(|r| format!("\n> {r}"))
        .unwrap_or_default();

    let (text, color) = match event {
        EVENT_APPROVAL_CREATED => (
            format!(
                "*AgentGuard — Human Approval Required* :hourglass_flowing_sand:\n\
                 Agent *{agent_name}* wants to perform `{action}`{resource_part}."
            ),
            "#F59E0B",
        ),
        EVENT_APPROVAL_APPROVED => (
            format!(
                "*AgentGuard — Request Approved* :white_check_mark:\n\
                 Agent *{agent_name}* action `{action}`{resource_part} was *approved*.{reason_part}"
            ),
            "#10B981",
        ),
        _ => (
            format!(
                "*AgentGuard — Request Denied* :x:\n\
                 Agent *{agent_name}* action `{action}`{resource_part} was *denied*.{reason_part}"
            ),
            "#EF4444",
        ),
    };

    let footer = format!("AgentGuard | {}", Utc::now().format("%Y-%m-%d %H:%M UTC"));
    serde_json::json!({
        "attachments": [{
            "color": color,
            "text": text,
            "footer": footer,
        }]
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> ApprovalEvent {
        ApprovalEvent {
            approval_id: "11111111-2222-3333-4444-555555555555".to_string(),
            agent_id: "agt_1".to_string(),
            agent_name: Some("deploy-bot".to_string()),
            action: "export:csv".to_string(),
            resource: Some("payments/Q4".to_string()),
            context: None,
            decision_reason: None,
            decision_by: None,
        }
    }

    #[test]
    fn json_body_carries_event_and_flattened_payload() {
        let body = json_body(EVENT_APPROVAL_CREATED, &payload());
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["event"], "approval.created");
        assert_eq!(value["agent_id"], "agt_1");
        assert_eq!(value["action"], "export:csv");
        assert_eq!(value["resource"], "payments/Q4");
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
        assert!(value.get("decision_by").is_none());
    }

    #[test]
    fn decision_fields_appear_once_populated() {
        let mut event = payload();
        event.decision_reason = Some("ok".to_string());
        event.decision_by = Some("adm_1".to_string());
        let body = json_body(EVENT_APPROVAL_APPROVED, &event);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["decision_reason"], "ok");
        assert_eq!(value["decision_by"], "adm_1");
    }

    #[test]
    fn signature_is_hmac_sha256_over_the_raw_body() {
        let body = b"{\"event\":\"approval.created\"}";
        let signature = sign_body("topsecret", body);
        assert!(signature.starts_with("sha256="));

        let mut mac = HmacSha256::new_from_slice(b"topsecret").unwrap();
        mac.update(body);
        let expected = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));
        assert_eq!(signature, expected);
    }

    #[test]
    fn slack_body_uses_attachment_format() {
        let body = slack_body(EVENT_APPROVAL_CREATED, &payload());
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        let attachment = &value["attachments"][0];
        assert_eq!(attachment["color"], "#F59E0B");
        let text = attachment["text"].as_str().unwrap();
        assert!(text.contains("deploy-bot"));
        assert!(text.contains("`export:csv`"));
        assert!(text.contains("`payments/Q4`"));
    }

    #[test]
    fn slack_denied_body_includes_reason() {
        let mut event = payload();
        event.decision_reason = Some("not during freeze".to_string());
        let body = slack_body(EVENT_APPROVAL_DENIED, &event);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        let text = value["attachments"][0]["text"].as_str().unwrap();
        assert!(text.contains("*denied*"));
        assert!(text.contains("not during freeze"));
    }

    #[test]
    fn slack_body_falls_back_to_agent_id() {
        let mut event = payload();
        event.agent_name = None;
        event.resource = None;
        let body = slack_body(EVENT_APPROVAL_APPROVED, &event);
        let text_value: serde_json::Value = serde_json::from_str(&body).unwrap();
        let text = text_value["attachments"][0]["text"].as_str().unwrap();
        assert!(text.contains("agt_1"));
        assert!(!text.contains(" on `"));
    }
}
