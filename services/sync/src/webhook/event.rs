use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Minimal envelope lifted from a platform-native webhook body. Parsing is
/// tolerant: whatever cannot be read stays `None` and the full payload is
/// preserved verbatim in the raw event row.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub event_type: String,
    pub event_id: String,
    pub campaign_external_id: Option<String>,
    pub lead_email: Option<String>,
    pub lead_name: Option<String>,
    pub step: i32,
    pub occurred_at: DateTime<Utc>,
    pub reply_text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireEvent {
    #[serde(rename = "eventType")]
    event_type: Option<String>,
    #[serde(rename = "eventId")]
    event_id: Option<String>,
    #[serde(rename = "campaignId")]
    campaign_id: Option<serde_json::Value>,
    #[serde(rename = "leadEmail")]
    lead_email: Option<String>,
    #[serde(rename = "leadName")]
    lead_name: Option<String>,
    #[serde(rename = "sequenceNumber")]
    sequence_number: Option<i32>,
    timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "replyText")]
    reply_text: Option<String>,
}

impl Envelope {
    pub fn from_payload(payload: &serde_json::Value) -> Self {
        let wire: WireEvent = serde_json::from_value(payload.clone()).unwrap_or_default();

        let event_type = wire
            .event_type
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        // Campaign ids arrive as numbers or strings depending on sender
        // version; normalize to a string key.
        let campaign_external_id = wire.campaign_id.and_then(|v| match v {
            serde_json::Value::String(s) if !s.is_empty() => Some(s),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        let lead_email = wire
            .lead_email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());

        let occurred_at = wire.timestamp.unwrap_or_else(Utc::now);

        // Senders that omit an event id still need stable de-dup: derive
        // one from the fields that identify the event.
        let event_id = wire.event_id.filter(|id| !id.is_empty()).unwrap_or_else(|| {
            format!(
                "{}:{}:{}:{}",
                event_type,
                campaign_external_id.as_deref().unwrap_or("-"),
                lead_email.as_deref().unwrap_or("-"),
                occurred_at.timestamp()
            )
        });

        Self {
            event_type,
            event_id,
            campaign_external_id,
            lead_email,
            lead_name: wire.lead_name,
            step: wire.sequence_number.unwrap_or(1),
            occurred_at,
            reply_text: wire.reply_text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_event_parses_all_fields() {
        let payload = serde_json::json!({
            "eventType": "Opened",
            "eventId": "evt-771",
            "campaignId": 90021,
            "leadEmail": "Sam@Example.com",
            "leadName": "Sam Ibe",
            "sequenceNumber": 2,
            "timestamp": "2026-08-01T10:30:00Z",
            "customField": "preserved in payload, ignored here"
        });
        let env = Envelope::from_payload(&payload);
        assert_eq!(env.event_type, "opened");
        assert_eq!(env.event_id, "evt-771");
        assert_eq!(env.campaign_external_id.as_deref(), Some("90021"));
        assert_eq!(env.lead_email.as_deref(), Some("sam@example.com"));
        assert_eq!(env.step, 2);
    }

    #[test]
    fn missing_event_id_synthesizes_stable_key() {
        let payload = serde_json::json!({
            "eventType": "sent",
            "campaignId": "c-1",
            "leadEmail": "a@example.com",
            "timestamp": "2026-08-01T10:30:00Z"
        });
        let a = Envelope::from_payload(&payload);
        let b = Envelope::from_payload(&payload);
        assert_eq!(a.event_id, b.event_id);
        assert!(a.event_id.starts_with("sent:c-1:a@example.com:"));
    }

    #[test]
    fn garbage_payload_still_yields_an_envelope() {
        let payload = serde_json::json!({ "nonsense": [1, 2, 3] });
        let env = Envelope::from_payload(&payload);
        assert_eq!(env.event_type, "unknown");
        assert!(env.campaign_external_id.is_none());
        assert_eq!(env.step, 1);
    }

    #[test]
    fn string_and_numeric_campaign_ids_normalize() {
        let numeric = serde_json::json!({ "eventType": "sent", "campaignId": 7 });
        let string = serde_json::json!({ "eventType": "sent", "campaignId": "7" });
        assert_eq!(
            Envelope::from_payload(&numeric).campaign_external_id,
            Envelope::from_payload(&string).campaign_external_id
        );
    }
}
