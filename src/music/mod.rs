//! Music extension
//!
//! Queue-based music playback driven by chat commands and emoji reactions:
//!
//! - `join [channel]`, `play <url>`, `pause`, `resume`, `skip`, `say <text>`
//!   and `help` require the DJ role
//! - `favorites` lists the caller's favorites and is open to everyone
//! - reacting with 🔁 on an announcement queues the track again
//! - reacting with ⭐ on an announcement records a favorite

mod engine;
mod render;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

pub use engine::{PlaybackState, Player, PlayerDeps, PlayerSnapshot, QueueEntry, QUEUE};
pub use render::{FAVORITE_EMOJI, REPEAT_EMOJI, TrackStatus};

use crate::channels::{OutgoingMessage, ReactionEvent, Transport, User};
use crate::db::{DbPool, HistoryQuery, HistoryRecord, HistoryStore};
use crate::extensions::{
    ActionFuture, Command, CommandAction, Extension, ExtensionMeta, Invocation, Permission,
};
use crate::media::MediaResolver;
use crate::session::Session;
use crate::voice::SpeechSynthesizer;
use crate::Result;

/// Name of the music extension, also its history collection
pub const NAME: &str = "MusicBot";

/// Music extension settings
#[derive(Debug, Clone)]
pub struct MusicSettings {
    /// Role required for playback commands
    pub dj_role: String,

    /// Playback volume (1.0 = unchanged)
    pub volume: f32,

    /// Log informational chatter
    pub logging: bool,
}

impl Default for MusicSettings {
    fn default() -> Self {
        Self {
            dj_role: "DJ".to_string(),
            volume: 0.5,
            logging: true,
        }
    }
}

/// The music extension
pub struct MusicExtension {
    meta: ExtensionMeta,
    player: Player,
    history: HistoryStore,
    commands: Vec<Command>,
}

impl std::fmt::Debug for MusicExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MusicExtension")
            .field("meta", &self.meta)
            .field("commands", &self.commands)
            .finish_non_exhaustive()
    }
}

impl MusicExtension {
    /// Build the extension and start its playback engine
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the extension metadata is invalid
    pub fn new(
        pool: DbPool,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn MediaResolver>,
        speech: Option<Arc<dyn SpeechSynthesizer>>,
        settings: &MusicSettings,
    ) -> Result<Self> {
        let meta = ExtensionMeta::new(NAME, settings.logging)?;
        let history = HistoryStore::new(pool, meta.name())?;

        let player = Player::spawn(PlayerDeps {
            meta: meta.clone(),
            history: history.clone(),
            transport,
            resolver,
            speech,
            volume: settings.volume,
        });

        let commands = build_commands(&player, &history, &Permission::role(&settings.dj_role));

        Ok(Self {
            meta,
            player,
            history,
            commands,
        })
    }

    /// Handle to the playback engine
    #[must_use]
    pub const fn player(&self) -> &Player {
        &self.player
    }

    /// Favorites of `user_id`, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if the history query fails
    pub fn favorites_of(&self, user_id: &str) -> Result<Vec<HistoryRecord>> {
        self.history.find(&HistoryQuery::favorites_of(user_id))
    }
}

#[async_trait]
impl Extension for MusicExtension {
    fn name(&self) -> &str {
        self.meta.name()
    }

    fn commands(&self) -> &[Command] {
        &self.commands
    }

    async fn on_ready(&self, _session: &Arc<Session>) -> Result<()> {
        self.meta.log("Ready to go!");
        Ok(())
    }

    async fn on_reaction(
        &self,
        reaction: &ReactionEvent,
        actor: &User,
        session: &Arc<Session>,
    ) -> Result<()> {
        match reaction.emoji.as_str() {
            REPEAT_EMOJI => self.player.repeat(reaction.clone(), actor.clone()).await,
            FAVORITE_EMOJI => {
                let bot_authored = reaction
                    .message_author_id
                    .as_deref()
                    .is_some_and(|id| session.is_self(id));
                if !bot_authored {
                    return Ok(());
                }
                self.player.favorite(reaction.clone(), actor.clone()).await
            }
            _ => Ok(()),
        }
    }
}

/// Wrap an engine call as a command action
fn player_action<F, Fut>(player: &Player, call: F) -> impl CommandAction + 'static
where
    F: Fn(Player, Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let player = player.clone();
    move |invocation: Invocation| -> ActionFuture { Box::pin(call(player.clone(), invocation)) }
}

fn optional_arg(args: String) -> Option<String> {
    Some(args).filter(|a| !a.is_empty())
}

fn build_commands(player: &Player, history: &HistoryStore, dj: &Permission) -> Vec<Command> {
    let history = history.clone();

    vec![
        Command::new(
            "join",
            dj.clone(),
            player_action(player, |player, inv| async move {
                player.join(inv.message, optional_arg(inv.args)).await
            }),
        ),
        Command::new(
            "play",
            dj.clone(),
            player_action(player, |player, inv| async move {
                player.enqueue(inv.message, inv.args).await
            }),
        ),
        Command::new(
            "pause",
            dj.clone(),
            player_action(player, |player, inv| async move { player.pause(inv.message).await }),
        ),
        Command::new(
            "resume",
            dj.clone(),
            player_action(player, |player, inv| async move { player.resume(inv.message).await }),
        ),
        Command::new(
            "skip",
            dj.clone(),
            player_action(player, |player, inv| async move { player.skip(inv.message).await }),
        ),
        Command::new(
            "say",
            dj.clone(),
            player_action(player, |player, inv| async move {
                player.say(inv.message, inv.args).await
            }),
        ),
        Command::new("help", dj.clone(), |inv: Invocation| -> ActionFuture {
            Box::pin(async move {
                let transport = inv.session.transport();
                transport
                    .send(OutgoingMessage::text(inv.message.channel_id.clone(), render::HELP))
                    .await?;
                transport.delete(&inv.message.reference()).await
            })
        }),
        Command::new("favorites", Permission::Any, move |inv: Invocation| -> ActionFuture {
            let history = history.clone();
            Box::pin(async move {
                let records = history.find(&HistoryQuery::favorites_of(&inv.message.author.id))?;
                inv.session
                    .transport()
                    .send(OutgoingMessage::text(
                        inv.message.channel_id.clone(),
                        render::favorites(&records),
                    ))
                    .await?;
                Ok(())
            })
        }),
    ]
}
