//! Wire envelopes for the marketplace queues
//!
//! Inbound bodies are a `{type, payload, metadata}` wrapper around the
//! business content; outbound responses mirror the shape and carry the
//! business correlation id back to the backend.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// The closed set of inbound message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    CreateThread,
}

impl MessageKind {
    /// Resolve a wire `type` discriminator. Unknown types return `None` and
    /// are the caller's warning to log.
    pub fn from_type(kind: &str) -> Option<Self> {
        match kind {
            "create_thread" => Some(MessageKind::CreateThread),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::CreateThread => "create_thread",
        }
    }
}

/// Inbound queue message envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

/// Envelope metadata attached by the backend.
///
/// `retry_count` is informational only; redelivery scheduling belongs to the
/// queue, not to application code.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageMetadata {
    pub order_id: Option<String>,
    pub entity_type: Option<String>,
    pub created_at: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

/// Entity descriptor nested inside the payload, used for correlation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityInfo {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl QueueMessage {
    /// Parse a raw JSON body into an envelope.
    pub fn from_slice(body: &[u8]) -> crate::error::Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// The `entity_info` block nested in the payload, if present and well formed.
    pub fn entity_info(&self) -> Option<EntityInfo> {
        let raw = self.payload.get("entity_info")?;
        serde_json::from_value(raw.clone()).ok()
    }

    /// Resolve the business correlation id for this message.
    ///
    /// `payload.entity_info.id` takes priority over `metadata.order_id`; a
    /// divergence between the two is a warning condition, not an error.
    pub fn correlation_id(&self) -> Option<String> {
        let entity_id = self.entity_info().and_then(|e| e.id);
        match (entity_id, &self.metadata.order_id) {
            (Some(entity_id), Some(order_id)) => {
                if &entity_id != order_id {
                    warn!(
                        "Message entity id '{}' diverges from metadata order id '{}'; using entity id",
                        entity_id, order_id
                    );
                }
                Some(entity_id)
            }
            (Some(entity_id), None) => Some(entity_id),
            (None, order_id) => order_id.clone(),
        }
    }

    /// Entity type, preferring the nested entity descriptor over metadata.
    pub fn entity_type(&self) -> Option<String> {
        self.entity_info()
            .and_then(|e| e.kind)
            .or_else(|| self.metadata.entity_type.clone())
    }
}

/// Outbound response envelope sent on the backend queue.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
    pub metadata: Value,
}

impl ResponseEnvelope {
    /// A `thread_created` success response.
    pub fn thread_created(
        thread_id: Option<String>,
        invite_code: Option<String>,
        correlation: Correlation,
    ) -> Self {
        Self {
            kind: "thread_created".to_string(),
            payload: serde_json::json!({
                "thread_id": thread_id,
                "invite_code": invite_code,
                "success": true,
            }),
            metadata: correlation.into_metadata(),
        }
    }

    /// An `error` response carrying a human-readable reason.
    pub fn error(message: impl Into<String>, correlation: Correlation) -> Self {
        Self {
            kind: "error".to_string(),
            payload: serde_json::json!({
                "error": message.into(),
                "success": false,
            }),
            metadata: correlation.into_metadata(),
        }
    }

    /// Serialize for the wire, stamping `metadata.created_at` with the
    /// current UTC time (ISO-8601, `Z` suffix). Called at send time.
    pub fn to_wire(&self) -> crate::error::Result<Vec<u8>> {
        let mut value = serde_json::to_value(self)?;
        if let Some(metadata) = value.get_mut("metadata").and_then(Value::as_object_mut) {
            metadata.insert(
                "created_at".to_string(),
                Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
            );
        }
        Ok(serde_json::to_vec(&value)?)
    }
}

/// Business correlation carried on every response.
///
/// `original_order_id` is the id the backend used to issue the request,
/// never an id minted by a Discord side effect.
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    pub original_order_id: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
}

impl Correlation {
    /// Derive the correlation block from an inbound message.
    pub fn from_message(message: &QueueMessage) -> Self {
        let id = message.correlation_id();
        Self {
            original_order_id: id.clone(),
            entity_type: message.entity_type(),
            entity_id: id,
        }
    }

    fn into_metadata(self) -> Value {
        serde_json::json!({
            "original_order_id": self.original_order_id,
            "entity_type": self.entity_type,
            "entity_id": self.entity_id,
        })
    }
}
