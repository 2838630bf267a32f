//! Queue message routing
//!
//! Decodes the inbound envelope, dispatches on the closed set of message
//! kinds, and produces the correlated response for the backend queue. The
//! boolean result drives acknowledgment: `true` means the message may be
//! removed from the queue, `false` leaves it for redelivery.

#[path = "router_tests.rs"]
mod router_tests;

use market_nats::{Correlation, MessageKind, QueueMessage, ResponseEnvelope, ResponseSink};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::gateway::DiscordGateway;
use crate::threads::{OrderPlacedRequest, ThreadOrchestrator};

pub struct MessageRouter<G, S> {
    orchestrator: ThreadOrchestrator<G>,
    sink: S,
}

impl<G: DiscordGateway, S: ResponseSink> MessageRouter<G, S> {
    pub fn new(orchestrator: ThreadOrchestrator<G>, sink: S) -> Self {
        Self { orchestrator, sink }
    }

    /// Process one raw queue body. Never panics; every failure path returns
    /// `false` so the message stays queued.
    pub async fn process(&self, body: &[u8]) -> bool {
        let message = match QueueMessage::from_slice(body) {
            Ok(message) => message,
            Err(e) => {
                error!("Failed to decode queue message: {}", e);
                return false;
            }
        };

        let Some(kind) = MessageKind::from_type(&message.kind) else {
            warn!("Unknown message type: {}", message.kind);
            return false;
        };

        info!(
            "Processing {} message for order {}",
            message.kind,
            message.correlation_id().as_deref().unwrap_or("<none>")
        );

        match kind {
            MessageKind::CreateThread => self.handle_create_thread(&message).await,
        }
    }

    async fn handle_create_thread(&self, message: &QueueMessage) -> bool {
        let correlation = Correlation::from_message(message);

        let request = match parse_create_thread(&message.payload) {
            Ok(request) => request,
            Err(reason) => {
                error!("Invalid create_thread payload: {}", reason);
                self.sink
                    .send_response(ResponseEnvelope::error(reason, correlation))
                    .await;
                return false;
            }
        };

        let outcome = self.orchestrator.order_placed(request).await;

        if let Some(reason) = outcome.error {
            self.sink
                .send_response(ResponseEnvelope::error(reason, correlation))
                .await;
            return false;
        }

        let response =
            ResponseEnvelope::thread_created(outcome.thread_id.clone(), outcome.invite_code, correlation);
        if !self.sink.send_response(response).await {
            // The thread exists; dropping the response loses only the
            // notification, so the message is still considered handled.
            warn!(
                "Thread {} created but the response could not be sent",
                outcome.thread_id.as_deref().unwrap_or("<unknown>")
            );
        }
        true
    }
}

/// Validate the `create_thread` payload into a typed request.
///
/// Returns a human-readable reason on the first contract violation; the
/// caller turns it into an error response.
fn parse_create_thread(payload: &Value) -> Result<OrderPlacedRequest, String> {
    let server_id = payload.get("server_id").and_then(id_text);
    let channel_id = payload.get("channel_id").and_then(id_text);
    let members: Vec<String> = payload
        .get("members")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(id_text).collect())
        .unwrap_or_default();

    let mut missing = Vec::new();
    if server_id.is_none() {
        missing.push("server_id");
    }
    if channel_id.is_none() {
        missing.push("channel_id");
    }
    if members.is_empty() {
        missing.push("members");
    }
    if !missing.is_empty() {
        return Err(format!("Missing required fields: {}", missing.join(", ")));
    }

    let server_id = parse_id("server_id", &server_id.unwrap_or_default())?;
    let channel_id = parse_id("channel_id", &channel_id.unwrap_or_default())?;
    let members = members
        .iter()
        .map(|member| parse_id("member id", member))
        .collect::<Result<Vec<u64>, String>>()?;

    // Customer id and invite are optional; malformed values degrade to None
    // rather than failing the whole request.
    let customer_discord_id = payload
        .get("customer_discord_id")
        .and_then(id_text)
        .and_then(|raw| raw.parse::<u64>().ok())
        .filter(|id| *id != 0);
    let invite_code = payload
        .get("discord_invite")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(OrderPlacedRequest {
        server_id,
        channel_id,
        members,
        order: payload.get("order").cloned().unwrap_or_else(|| Value::Object(Default::default())),
        customer_discord_id,
        invite_code,
    })
}

/// Ids arrive as JSON strings but are tolerated as bare numbers.
fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_id(field: &str, raw: &str) -> Result<u64, String> {
    raw.parse::<u64>()
        .map_err(|_| format!("Invalid numeric value for {}: '{}'", field, raw))
}
