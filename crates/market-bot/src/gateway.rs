//! Discord capability surface
//!
//! The orchestration layer only needs a narrow slice of the Discord API:
//! resolve a guild and channel, create a private thread, enroll members,
//! mint and check invites, and send direct messages. That slice lives behind
//! the [`DiscordGateway`] trait so the business logic can run against an
//! in-memory double in tests; [`SerenityGateway`] is the real implementation
//! over serenity's HTTP client.

use std::future::Future;
use std::sync::Arc;

use serenity::builder::{CreateInvite, CreateThread};
use serenity::http::{Http, HttpError};
use serenity::model::channel::{Channel, ChannelType};
use serenity::model::id::{ChannelId, GuildId, UserId};
use thiserror::Error;
use tracing::debug;

/// Classified Discord API failure.
///
/// Permission and existence failures map to specific thread-creation error
/// reasons; everything else is carried as text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("not found")]
    NotFound,
    #[error("permission denied")]
    Forbidden,
    #[error("invalid channel data")]
    InvalidData,
    #[error("{0}")]
    Other(String),
}

impl GatewayError {
    fn classify(err: serenity::Error) -> Self {
        match &err {
            serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)) => {
                match resp.status_code.as_u16() {
                    403 => GatewayError::Forbidden,
                    404 => GatewayError::NotFound,
                    _ => GatewayError::Other(err.to_string()),
                }
            }
            serenity::Error::Json(_) => GatewayError::InvalidData,
            _ => GatewayError::Other(err.to_string()),
        }
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// The Discord operations thread orchestration depends on.
pub trait DiscordGateway: Send + Sync {
    /// Confirm the bot can see the guild.
    fn fetch_guild(&self, guild_id: u64) -> impl Future<Output = GatewayResult<()>> + Send;

    /// Confirm the channel exists in the guild and is viewable.
    fn fetch_channel(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> impl Future<Output = GatewayResult<()>> + Send;

    /// Create a private thread in the channel; returns the new thread id.
    fn create_private_thread(
        &self,
        channel_id: u64,
        name: &str,
    ) -> impl Future<Output = GatewayResult<u64>> + Send;

    /// Add the bot itself to a thread.
    fn join_thread(&self, thread_id: u64) -> impl Future<Output = GatewayResult<()>> + Send;

    fn add_thread_member(
        &self,
        thread_id: u64,
        user_id: u64,
    ) -> impl Future<Output = GatewayResult<()>> + Send;

    /// Create an invite for the channel; `max_uses` of 0 means unlimited.
    /// Returns the invite code.
    fn create_invite(
        &self,
        channel_id: u64,
        max_uses: u8,
        unique: bool,
    ) -> impl Future<Output = GatewayResult<String>> + Send;

    /// Whether an invite code still resolves.
    fn invite_is_live(&self, code: &str) -> impl Future<Output = GatewayResult<bool>> + Send;

    fn is_guild_member(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> impl Future<Output = GatewayResult<bool>> + Send;

    fn direct_message(
        &self,
        user_id: u64,
        text: &str,
    ) -> impl Future<Output = GatewayResult<()>> + Send;
}

impl<T: DiscordGateway> DiscordGateway for Arc<T> {
    fn fetch_guild(&self, guild_id: u64) -> impl Future<Output = GatewayResult<()>> + Send {
        T::fetch_guild(self.as_ref(), guild_id)
    }

    fn fetch_channel(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> impl Future<Output = GatewayResult<()>> + Send {
        T::fetch_channel(self.as_ref(), guild_id, channel_id)
    }

    fn create_private_thread(
        &self,
        channel_id: u64,
        name: &str,
    ) -> impl Future<Output = GatewayResult<u64>> + Send {
        T::create_private_thread(self.as_ref(), channel_id, name)
    }

    fn join_thread(&self, thread_id: u64) -> impl Future<Output = GatewayResult<()>> + Send {
        T::join_thread(self.as_ref(), thread_id)
    }

    fn add_thread_member(
        &self,
        thread_id: u64,
        user_id: u64,
    ) -> impl Future<Output = GatewayResult<()>> + Send {
        T::add_thread_member(self.as_ref(), thread_id, user_id)
    }

    fn create_invite(
        &self,
        channel_id: u64,
        max_uses: u8,
        unique: bool,
    ) -> impl Future<Output = GatewayResult<String>> + Send {
        T::create_invite(self.as_ref(), channel_id, max_uses, unique)
    }

    fn invite_is_live(&self, code: &str) -> impl Future<Output = GatewayResult<bool>> + Send {
        T::invite_is_live(self.as_ref(), code)
    }

    fn is_guild_member(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> impl Future<Output = GatewayResult<bool>> + Send {
        T::is_guild_member(self.as_ref(), guild_id, user_id)
    }

    fn direct_message(
        &self,
        user_id: u64,
        text: &str,
    ) -> impl Future<Output = GatewayResult<()>> + Send {
        T::direct_message(self.as_ref(), user_id, text)
    }
}

/// Real implementation over serenity's HTTP client.
#[derive(Clone)]
pub struct SerenityGateway {
    http: Arc<Http>,
}

impl SerenityGateway {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

impl DiscordGateway for SerenityGateway {
    async fn fetch_guild(&self, guild_id: u64) -> GatewayResult<()> {
        self.http
            .get_guild(GuildId::new(guild_id))
            .await
            .map(|_| ())
            .map_err(GatewayError::classify)
    }

    async fn fetch_channel(&self, guild_id: u64, channel_id: u64) -> GatewayResult<()> {
        let channel = self
            .http
            .get_channel(ChannelId::new(channel_id))
            .await
            .map_err(GatewayError::classify)?;

        match channel.guild() {
            Some(guild_channel) if guild_channel.guild_id.get() == guild_id => Ok(()),
            Some(_) => {
                debug!(
                    "Channel {} belongs to a different guild than {}",
                    channel_id, guild_id
                );
                Err(GatewayError::NotFound)
            }
            None => Err(GatewayError::InvalidData),
        }
    }

    async fn create_private_thread(&self, channel_id: u64, name: &str) -> GatewayResult<u64> {
        let thread = ChannelId::new(channel_id)
            .create_thread(
                &*self.http,
                CreateThread::new(name).kind(ChannelType::PrivateThread),
            )
            .await
            .map_err(GatewayError::classify)?;
        Ok(thread.id.get())
    }

    async fn join_thread(&self, thread_id: u64) -> GatewayResult<()> {
        self.http
            .join_thread_channel(ChannelId::new(thread_id))
            .await
            .map_err(GatewayError::classify)
    }

    async fn add_thread_member(&self, thread_id: u64, user_id: u64) -> GatewayResult<()> {
        self.http
            .add_thread_channel_member(ChannelId::new(thread_id), UserId::new(user_id))
            .await
            .map_err(GatewayError::classify)
    }

    async fn create_invite(
        &self,
        channel_id: u64,
        max_uses: u8,
        unique: bool,
    ) -> GatewayResult<String> {
        let invite = ChannelId::new(channel_id)
            .create_invite(
                &*self.http,
                CreateInvite::new().max_uses(max_uses).unique(unique),
            )
            .await
            .map_err(GatewayError::classify)?;
        Ok(invite.code)
    }

    async fn invite_is_live(&self, code: &str) -> GatewayResult<bool> {
        match self.http.get_invite(code, false, false, None).await {
            Ok(_) => Ok(true),
            Err(err) => match GatewayError::classify(err) {
                GatewayError::NotFound => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn is_guild_member(&self, guild_id: u64, user_id: u64) -> GatewayResult<bool> {
        match self
            .http
            .get_member(GuildId::new(guild_id), UserId::new(user_id))
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => match GatewayError::classify(err) {
                GatewayError::NotFound => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn direct_message(&self, user_id: u64, text: &str) -> GatewayResult<()> {
        let channel = UserId::new(user_id)
            .create_dm_channel(&*self.http)
            .await
            .map_err(GatewayError::classify)?;
        channel
            .id
            .say(&*self.http, text)
            .await
            .map(|_| ())
            .map_err(GatewayError::classify)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_display() {
        assert_eq!(GatewayError::NotFound.to_string(), "not found");
        assert_eq!(GatewayError::Forbidden.to_string(), "permission denied");
        assert_eq!(
            GatewayError::Other("boom".to_string()).to_string(),
            "boom"
        );
    }
}
