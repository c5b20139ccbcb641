//! Chat transport boundary
//!
//! The core never talks to the chat platform directly. Everything it needs
//! (sending and editing status messages, reactions, voice channel lookup,
//! role membership) goes through the [`Transport`] trait, which the Discord
//! adapter implements on top of serenity.

mod discord;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use discord::{DiscordHandler, DiscordTransport, gateway_intents};

use crate::Result;
use crate::voice::VoiceConnection;

/// A platform user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Platform user identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Whether the account is a bot
    #[serde(default)]
    pub is_bot: bool,
}

impl User {
    /// Create a human user
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_bot: false,
        }
    }

    /// Mention markup that pings this user
    #[must_use]
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

/// Reference to a message that was sent or received
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    /// Channel the message lives in
    pub channel_id: String,

    /// Message identifier (platform-specific)
    pub message_id: String,
}

impl MessageRef {
    /// Create a message reference
    #[must_use]
    pub fn new(channel_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            message_id: message_id.into(),
        }
    }
}

/// A message from a text channel
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Message identifier (platform-specific)
    pub id: String,

    /// Channel identifier
    pub channel_id: String,

    /// Guild the message was posted in; `None` for direct messages
    pub guild_id: Option<String>,

    /// Message author
    pub author: User,

    /// Message content
    pub content: String,
}

impl IncomingMessage {
    /// Reference to this message
    #[must_use]
    pub fn reference(&self) -> MessageRef {
        MessageRef::new(self.channel_id.clone(), self.id.clone())
    }
}

/// An emoji reaction added to a message
#[derive(Debug, Clone)]
pub struct ReactionEvent {
    /// Message that received the reaction
    pub message: MessageRef,

    /// Guild of the message, if any
    pub guild_id: Option<String>,

    /// Unicode emoji, or `<:name:id>` for custom emoji
    pub emoji: String,

    /// Author of the reacted message, when known
    pub message_author_id: Option<String>,
}

/// A message to send to a channel
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    /// Channel identifier
    pub channel_id: String,

    /// Message content (plain text, may contain markdown)
    pub content: String,
}

impl OutgoingMessage {
    /// Create a simple `text` message
    #[must_use]
    pub fn text(channel_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            content: content.into(),
        }
    }
}

/// A voice channel in a guild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceChannelInfo {
    /// Channel identifier
    pub id: String,

    /// Guild identifier
    pub guild_id: String,

    /// Channel name
    pub name: String,

    /// Sort position in the guild's channel list
    pub position: u16,
}

/// Live role membership lookup
#[async_trait]
pub trait RoleLookup: Send + Sync {
    /// Names of the roles `user_id` currently holds in `guild_id`
    async fn role_names(&self, guild_id: &str, user_id: &str) -> Result<Vec<String>>;
}

/// Chat platform transport
#[async_trait]
pub trait Transport: RoleLookup {
    /// Get the transport name
    fn name(&self) -> &'static str;

    /// Send a message, returning a reference to it
    async fn send(&self, message: OutgoingMessage) -> Result<MessageRef>;

    /// Replace the content of a previously sent message
    async fn edit(&self, target: &MessageRef, content: &str) -> Result<()>;

    /// Delete a message
    async fn delete(&self, target: &MessageRef) -> Result<()>;

    /// Remove one user's reaction from a message
    async fn remove_reaction(&self, target: &MessageRef, emoji: &str, user_id: &str)
    -> Result<()>;

    /// List the voice channels of a guild, ordered by position
    async fn voice_channels(&self, guild_id: &str) -> Result<Vec<VoiceChannelInfo>>;

    /// Join a voice channel
    async fn join_voice(&self, channel: &VoiceChannelInfo) -> Result<Box<dyn VoiceConnection>>;
}
