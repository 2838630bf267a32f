//! Serenity event handler
//!
//! Relays Discord-side events to the backend: messages typed inside order
//! threads, and newly joined members who already belong to order threads.

use std::sync::Arc;

use serenity::async_trait;
use serenity::model::channel::{ChannelType, Message};
use serenity::model::gateway::Ready;
use serenity::model::guild::Member;
use serenity::model::id::ChannelId;
use serenity::prelude::*;
use tracing::{debug, error, info, warn};

use crate::backend::BackendClient;

/// Shared bot state stored in serenity's TypeMap.
pub struct BotState {
    pub backend: Arc<BackendClient>,
}

impl TypeMapKey for BotState {
    type Value = Arc<BotState>;
}

pub struct Handler;

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("Discord bot connected as {}", ready.user.name);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot || msg.content.is_empty() {
            return;
        }

        // Only messages typed inside threads are relayed.
        let channel = match msg.channel_id.to_channel(&ctx.http).await {
            Ok(channel) => channel,
            Err(e) => {
                debug!("Failed to resolve channel {}: {}", msg.channel_id, e);
                return;
            }
        };
        let Some(guild_channel) = channel.guild() else {
            return;
        };
        if !matches!(
            guild_channel.kind,
            ChannelType::PublicThread | ChannelType::PrivateThread | ChannelType::NewsThread
        ) {
            return;
        }

        let state = {
            let data = ctx.data.read().await;
            match data.get::<BotState>() {
                Some(state) => state.clone(),
                None => {
                    error!("BotState not found in context data");
                    return;
                }
            }
        };

        if let Err(e) = state
            .backend
            .post_thread_message(
                &msg.author.id.to_string(),
                &msg.author.name,
                &msg.channel_id.to_string(),
                &msg.content,
            )
            .await
        {
            error!("Failed to relay thread message to backend: {}", e);
        }
    }

    async fn guild_member_addition(&self, ctx: Context, member: Member) {
        let state = {
            let data = ctx.data.read().await;
            match data.get::<BotState>() {
                Some(state) => state.clone(),
                None => return,
            }
        };

        let thread_ids = match state.backend.user_threads(member.user.id.get()).await {
            Ok(ids) => ids,
            Err(e) => {
                error!(
                    "Failed to fetch threads for joining member {}: {}",
                    member.user.id, e
                );
                return;
            }
        };

        for thread_id in thread_ids {
            let Ok(id) = thread_id.parse::<u64>() else {
                warn!("Backend returned a non-numeric thread id: {}", thread_id);
                continue;
            };
            if let Err(e) = ctx
                .http
                .add_thread_channel_member(ChannelId::new(id), member.user.id)
                .await
            {
                warn!(
                    "Failed to add member {} to thread {}: {}",
                    member.user.id, id, e
                );
            }
        }
    }
}
