//! Discord transport using serenity

use std::sync::Arc;

use async_trait::async_trait;
use serenity::all::{
    ChannelId, ChannelType, Context, CreateMessage, EditMessage, EventHandler, GatewayIntents,
    GuildId, Message, MessageId, Reaction, ReactionType, Ready, UserId,
};
use serenity::http::Http;

use super::{
    IncomingMessage, MessageRef, OutgoingMessage, ReactionEvent, RoleLookup, Transport, User,
    VoiceChannelInfo,
};
use crate::bot::Bot;
use crate::voice::{VoiceBackend, VoiceConnection};
use crate::{Error, Result};

/// Gateway intents the bot needs: guild text, reactions and voice state
#[must_use]
pub fn gateway_intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::GUILD_VOICE_STATES
}

/// Discord REST transport
pub struct DiscordTransport {
    http: Arc<Http>,
    voice: Arc<dyn VoiceBackend>,
}

impl std::fmt::Debug for DiscordTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordTransport").finish_non_exhaustive()
    }
}

impl DiscordTransport {
    /// Create a transport over `http`, joining voice through `voice`
    #[must_use]
    pub fn new(http: Arc<Http>, voice: Arc<dyn VoiceBackend>) -> Self {
        Self { http, voice }
    }

    /// Create a transport with its own HTTP client for `token`
    #[must_use]
    pub fn from_token(token: &str, voice: Arc<dyn VoiceBackend>) -> Self {
        Self::new(Arc::new(Http::new(token)), voice)
    }
}

fn parse_id(kind: &str, id: &str) -> Result<u64> {
    id.parse()
        .map_err(|_| Error::Transport(format!("invalid {kind} id: {id}")))
}

fn channel_id(id: &str) -> Result<ChannelId> {
    parse_id("channel", id).map(ChannelId::new)
}

fn message_id(id: &str) -> Result<MessageId> {
    parse_id("message", id).map(MessageId::new)
}

fn guild_id(id: &str) -> Result<GuildId> {
    parse_id("guild", id).map(GuildId::new)
}

fn user_id(id: &str) -> Result<UserId> {
    parse_id("user", id).map(UserId::new)
}

/// Parse an emoji string into a Discord `ReactionType`
///
/// Handles both Unicode emoji (e.g., "🔁") and custom Discord emoji (e.g., "<:name:123>")
fn parse_discord_emoji(emoji: &str) -> ReactionType {
    if let Some(inner) = emoji.strip_prefix('<').and_then(|e| e.strip_suffix('>')) {
        let parts: Vec<&str> = inner.split(':').collect();
        if let [kind, name, id] = parts.as_slice()
            && let Ok(id) = id.parse::<u64>()
        {
            return ReactionType::Custom {
                animated: *kind == "a",
                id: serenity::all::EmojiId::new(id),
                name: Some((*name).to_string()),
            };
        }
    }

    ReactionType::Unicode(emoji.to_string())
}

fn to_user(user: &serenity::all::User) -> User {
    User {
        id: user.id.to_string(),
        name: user.name.clone(),
        is_bot: user.bot,
    }
}

#[async_trait]
impl RoleLookup for DiscordTransport {
    async fn role_names(&self, guild: &str, user: &str) -> Result<Vec<String>> {
        let guild = guild_id(guild)?;
        let member = guild
            .member(&self.http, user_id(user)?)
            .await
            .map_err(|e| Error::Transport(format!("Discord member lookup error: {e}")))?;
        let roles = guild
            .roles(&self.http)
            .await
            .map_err(|e| Error::Transport(format!("Discord roles lookup error: {e}")))?;

        Ok(member
            .roles
            .iter()
            .filter_map(|id| roles.get(id))
            .map(|role| role.name.clone())
            .collect())
    }
}

#[async_trait]
impl Transport for DiscordTransport {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, message: OutgoingMessage) -> Result<MessageRef> {
        let sent = channel_id(&message.channel_id)?
            .send_message(&self.http, CreateMessage::new().content(&message.content))
            .await
            .map_err(|e| Error::Transport(format!("Discord send error: {e}")))?;

        tracing::debug!(channel_id = %message.channel_id, message_id = %sent.id, "Discord message sent");
        Ok(MessageRef::new(sent.channel_id.to_string(), sent.id.to_string()))
    }

    async fn edit(&self, target: &MessageRef, content: &str) -> Result<()> {
        channel_id(&target.channel_id)?
            .edit_message(
                &self.http,
                message_id(&target.message_id)?,
                EditMessage::new().content(content),
            )
            .await
            .map_err(|e| Error::Transport(format!("Discord edit error: {e}")))?;

        tracing::debug!(message_id = %target.message_id, "Discord message edited");
        Ok(())
    }

    async fn delete(&self, target: &MessageRef) -> Result<()> {
        channel_id(&target.channel_id)?
            .delete_message(&self.http, message_id(&target.message_id)?)
            .await
            .map_err(|e| Error::Transport(format!("Discord delete error: {e}")))?;

        tracing::debug!(message_id = %target.message_id, "Discord message deleted");
        Ok(())
    }

    async fn remove_reaction(&self, target: &MessageRef, emoji: &str, user: &str) -> Result<()> {
        channel_id(&target.channel_id)?
            .delete_reaction(
                &self.http,
                message_id(&target.message_id)?,
                Some(user_id(user)?),
                parse_discord_emoji(emoji),
            )
            .await
            .map_err(|e| Error::Transport(format!("Discord remove reaction error: {e}")))?;

        tracing::debug!(message_id = %target.message_id, emoji, user, "Discord reaction removed");
        Ok(())
    }

    async fn voice_channels(&self, guild: &str) -> Result<Vec<VoiceChannelInfo>> {
        let channels = guild_id(guild)?
            .channels(&self.http)
            .await
            .map_err(|e| Error::Transport(format!("Discord channel list error: {e}")))?;

        let mut voice: Vec<VoiceChannelInfo> = channels
            .into_values()
            .filter(|c| c.kind == ChannelType::Voice)
            .map(|c| VoiceChannelInfo {
                id: c.id.to_string(),
                guild_id: c.guild_id.to_string(),
                name: c.name,
                position: c.position,
            })
            .collect();
        voice.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));

        Ok(voice)
    }

    async fn join_voice(&self, channel: &VoiceChannelInfo) -> Result<Box<dyn VoiceConnection>> {
        self.voice.join(channel).await
    }
}

/// Forwards gateway events to the bot
pub struct DiscordHandler {
    bot: Arc<Bot>,
}

impl DiscordHandler {
    /// Create a handler for `bot`
    #[must_use]
    pub const fn new(bot: Arc<Bot>) -> Self {
        Self { bot }
    }
}

impl From<&Message> for IncomingMessage {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id.to_string(),
            channel_id: msg.channel_id.to_string(),
            guild_id: msg.guild_id.map(|g| g.to_string()),
            author: to_user(&msg.author),
            content: msg.content.clone(),
        }
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(user = %ready.user.name, "Discord bot ready");
        self.bot.ready(&ready.user.id.to_string()).await;
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        // Ignore bot messages
        if msg.author.bot {
            return;
        }

        tracing::debug!(
            author = %msg.author.name,
            channel_id = %msg.channel_id,
            "Discord message received"
        );
        self.bot.message(IncomingMessage::from(&msg)).await;
    }

    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        let actor = match reaction.user(&ctx).await {
            Ok(user) => to_user(&user),
            Err(e) => {
                tracing::warn!(error = %e, "failed to fetch reacting user");
                return;
            }
        };
        if actor.is_bot {
            return;
        }

        let message_author_id = match reaction.message(&ctx).await {
            Ok(message) => Some(message.author.id.to_string()),
            Err(e) => {
                tracing::debug!(error = %e, "failed to fetch reacted message");
                None
            }
        };

        let event = ReactionEvent {
            message: MessageRef::new(reaction.channel_id.to_string(), reaction.message_id.to_string()),
            guild_id: reaction.guild_id.map(|g| g.to_string()),
            emoji: reaction.emoji.to_string(),
            message_author_id,
        };

        tracing::debug!(
            user = %actor.name,
            emoji = %event.emoji,
            message_id = %event.message.message_id,
            "Discord reaction received"
        );
        self.bot.reaction(event, actor).await;
    }
}
