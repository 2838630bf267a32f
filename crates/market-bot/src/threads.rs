//! Private order-thread provisioning
//!
//! Realizes the side effect behind a `create_thread` command: create a
//! private thread in the seller's configured channel, enroll the order's
//! participants, and fall back to a capped invite plus direct messages for
//! anyone who could not be enrolled directly.

#[path = "threads_tests.rs"]
mod threads_tests;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::gateway::{DiscordGateway, GatewayError};

/// Why thread provisioning failed.
///
/// These usually indicate external misconfiguration (bot removed from the
/// guild, channel deleted, permissions revoked) rather than a bug, so they
/// are logged at reduced severity and reported back to the backend verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThreadError {
    #[error("Server, channel, or members are not configured")]
    MissingParameters,
    #[error("Bot is not in the configured guild")]
    GuildUnavailable,
    #[error("The configured thread channel no longer exists")]
    ChannelMissing,
    #[error("The bot does not have permission to view the configured thread channel")]
    NoViewPermission,
    #[error("The bot received invalid data from Discord when fetching the configured thread channel")]
    InvalidChannelData,
    #[error("The bot does not have permission to create threads in the configured channel")]
    NoCreateThreadPermission,
    #[error("Discord request failed: {0}")]
    Discord(String),
}

/// One member that could not be enrolled, with the reason kept inspectable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentFailure {
    pub member_id: u64,
    pub reason: String,
}

/// Result of one thread-provisioning attempt. Not persisted; serialized into
/// the response envelope and discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadCreation {
    pub thread_id: String,
    pub failed: Vec<EnrollmentFailure>,
    pub invite_code: Option<String>,
}

impl ThreadCreation {
    pub fn failed_ids(&self) -> Vec<u64> {
        self.failed.iter().map(|f| f.member_id).collect()
    }
}

/// Fully validated `create_thread` request.
#[derive(Debug, Clone)]
pub struct OrderPlacedRequest {
    pub server_id: u64,
    pub channel_id: u64,
    pub members: Vec<u64>,
    pub order: Value,
    pub customer_discord_id: Option<u64>,
    pub invite_code: Option<String>,
}

/// Flattened outcome handed back to the router.
#[derive(Debug, Clone)]
pub struct OrderPlacedOutcome {
    pub thread_id: Option<String>,
    pub failed_members: Vec<u64>,
    pub invite_code: Option<String>,
    pub error: Option<String>,
}

pub struct ThreadOrchestrator<G> {
    gateway: G,
}

impl<G: DiscordGateway> ThreadOrchestrator<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    /// Handle a validated order-placed request: provision the thread, then
    /// work out whether the customer additionally needs a guild invite.
    pub async fn order_placed(&self, request: OrderPlacedRequest) -> OrderPlacedOutcome {
        let result = self
            .create_thread(
                request.server_id,
                request.channel_id,
                &request.members,
                &request.order,
            )
            .await;

        let customer_invite = if request.server_id != 0 && request.channel_id != 0 {
            self.verify_invite(
                request.customer_discord_id,
                request.server_id,
                request.channel_id,
                request.invite_code.as_deref(),
            )
            .await
        } else {
            None
        };

        match result {
            Ok(creation) => OrderPlacedOutcome {
                thread_id: Some(creation.thread_id.clone()),
                failed_members: creation.failed_ids(),
                invite_code: customer_invite.or(creation.invite_code),
                error: None,
            },
            Err(e) => {
                warn!("Thread provisioning failed: {}", e);
                OrderPlacedOutcome {
                    thread_id: None,
                    failed_members: Vec::new(),
                    invite_code: customer_invite,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Provision a private thread and enroll every member.
    ///
    /// Member enrollment is best-effort: failures are collected, never
    /// aborting the operation. Anyone who could not be added is sent an
    /// invite capped to the number of failures.
    pub async fn create_thread(
        &self,
        server_id: u64,
        channel_id: u64,
        members: &[u64],
        offer: &Value,
    ) -> Result<ThreadCreation, ThreadError> {
        if server_id == 0 || channel_id == 0 || members.is_empty() {
            return Err(ThreadError::MissingParameters);
        }

        if let Err(e) = self.gateway.fetch_guild(server_id).await {
            debug!("Guild {} unavailable: {}", server_id, e);
            return Err(ThreadError::GuildUnavailable);
        }

        if let Err(e) = self.gateway.fetch_channel(server_id, channel_id).await {
            return Err(match e {
                GatewayError::NotFound => ThreadError::ChannelMissing,
                GatewayError::Forbidden => ThreadError::NoViewPermission,
                GatewayError::InvalidData => ThreadError::InvalidChannelData,
                GatewayError::Other(reason) => ThreadError::Discord(reason),
            });
        }

        let thread_id = match self
            .gateway
            .create_private_thread(channel_id, &thread_name(offer))
            .await
        {
            Ok(id) => id,
            Err(e) => {
                debug!("Thread creation in channel {} failed: {}", channel_id, e);
                return Err(ThreadError::NoCreateThreadPermission);
            }
        };

        if let Err(e) = self.gateway.join_thread(thread_id).await {
            warn!("Failed to join own thread {}: {}", thread_id, e);
        }

        let mut failed = Vec::new();
        for &member in members {
            if member == 0 {
                continue;
            }
            if let Err(e) = self.gateway.add_thread_member(thread_id, member).await {
                debug!("Failed to add member {} to thread {}: {}", member, thread_id, e);
                failed.push(EnrollmentFailure {
                    member_id: member,
                    reason: e.to_string(),
                });
            }
        }

        let invite_code = if failed.is_empty() {
            None
        } else {
            self.invite_failed_members(channel_id, &failed).await
        };

        Ok(ThreadCreation {
            thread_id: thread_id.to_string(),
            failed,
            invite_code,
        })
    }

    async fn invite_failed_members(
        &self,
        channel_id: u64,
        failed: &[EnrollmentFailure],
    ) -> Option<String> {
        let max_uses = failed.len().min(100) as u8;
        let code = match self.gateway.create_invite(channel_id, max_uses, true).await {
            Ok(code) => code,
            Err(e) => {
                warn!(
                    "Failed to create invite for {} unenrolled members: {}",
                    failed.len(),
                    e
                );
                return None;
            }
        };

        let text = format!(
            "You have a new order thread on the marketplace. Please join the \
             fulfillment server to communicate directly with the seller: \
             https://discord.gg/{}",
            code
        );
        for failure in failed {
            if let Err(e) = self.gateway.direct_message(failure.member_id, &text).await {
                debug!("Failed to DM invite to {}: {}", failure.member_id, e);
            }
        }

        Some(code)
    }

    /// Work out an invite for the customer.
    ///
    /// Skipped entirely when the customer is already a guild member. A
    /// supplied code is reused if it still resolves; otherwise a non-unique
    /// invite is minted. Every resolution failure returns `None`; these are
    /// configuration issues, not operational errors.
    pub async fn verify_invite(
        &self,
        customer_id: Option<u64>,
        server_id: u64,
        channel_id: u64,
        invite_code: Option<&str>,
    ) -> Option<String> {
        if let Err(e) = self.gateway.fetch_guild(server_id).await {
            debug!("Skipping invite check, guild {} unavailable: {}", server_id, e);
            return None;
        }
        if let Err(e) = self.gateway.fetch_channel(server_id, channel_id).await {
            debug!(
                "Skipping invite check, channel {} unavailable: {}",
                channel_id, e
            );
            return None;
        }

        if let Some(customer) = customer_id {
            match self.gateway.is_guild_member(server_id, customer).await {
                Ok(true) => return None,
                Ok(false) => {}
                Err(e) => debug!("Member check for {} failed: {}", customer, e),
            }
        }

        if let Some(code) = invite_code {
            match self.gateway.invite_is_live(code).await {
                Ok(true) => return Some(code.to_string()),
                Ok(false) => debug!("Supplied invite {} is no longer valid", code),
                Err(e) => debug!("Invite lookup for {} failed: {}", code, e),
            }
        }

        match self.gateway.create_invite(channel_id, 0, false).await {
            Ok(code) => Some(code),
            Err(e) => {
                debug!("Failed to create customer invite: {}", e);
                None
            }
        }
    }
}

/// Thread names are a business-id prefix: `order-` when the offer carries an
/// `order_id`, `offer-` otherwise, plus the first 8 characters of the id.
fn thread_name(offer: &Value) -> String {
    let is_order = offer
        .get("order_id")
        .map(|v| !v.is_null())
        .unwrap_or(false);
    let business_id = offer
        .get("id")
        .or_else(|| offer.get("order_id"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let short: String = business_id.chars().take(8).collect();
    format!("{}-{}", if is_order { "order" } else { "offer" }, short)
}
