//! Playback engine
//!
//! One actor task per music extension owns the voice connection, the queue
//! and the active dispatcher. Commands arrive over a channel and are
//! handled strictly one at a time; playback completions are taken before
//! pending commands so auto-advance always sees the queue as it is at the
//! moment the previous track ends.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::render::{self, REPEAT_EMOJI, TrackStatus};
use crate::channels::{
    IncomingMessage, MessageRef, OutgoingMessage, ReactionEvent, Transport, User, VoiceChannelInfo,
};
use crate::db::{HistoryRecord, HistoryStore};
use crate::extensions::{ExtensionMeta, SessionStore};
use crate::media::{MediaResolver, TrackInfo, format_duration, validate_url};
use crate::voice::{Dispatcher, Playback, PlaybackOutcome, SpeechSynthesizer, VoiceConnection};
use crate::{Error, Result};

/// Session store key of the pending queue
pub const QUEUE: &str = "queue";

const COMMAND_BUFFER: usize = 64;

/// Derived playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No voice connection
    Disconnected,
    /// Connected, nothing playing
    Idle,
    /// A track is playing
    Playing,
    /// The current track is suspended
    Paused,
}

/// A track waiting in, or taken from, the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Track URL as requested
    pub url: String,

    /// Resolved metadata
    pub track: TrackInfo,

    /// The announcement message for this entry
    pub message: MessageRef,

    /// Who asked for it
    pub requester: User,
}

/// Point-in-time view of the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSnapshot {
    pub state: PlaybackState,
    pub current: Option<QueueEntry>,
    pub queue: Vec<QueueEntry>,
    pub channel: Option<VoiceChannelInfo>,
}

/// Collaborators of the playback engine
pub struct PlayerDeps {
    pub meta: ExtensionMeta,
    pub history: HistoryStore,
    pub transport: Arc<dyn Transport>,
    pub resolver: Arc<dyn MediaResolver>,
    pub speech: Option<Arc<dyn SpeechSynthesizer>>,
    pub volume: f32,
}

enum PlayerCommand {
    Join {
        origin: IncomingMessage,
        channel: Option<String>,
    },
    Enqueue {
        origin: IncomingMessage,
        url: String,
    },
    Pause {
        origin: IncomingMessage,
    },
    Resume {
        origin: IncomingMessage,
    },
    Skip {
        origin: IncomingMessage,
    },
    Repeat {
        reaction: ReactionEvent,
        user: User,
    },
    Favorite {
        reaction: ReactionEvent,
        user: User,
    },
    Say {
        origin: IncomingMessage,
        text: String,
    },
    Snapshot(oneshot::Sender<PlayerSnapshot>),
}

struct Request {
    command: PlayerCommand,
    ack: oneshot::Sender<()>,
}

/// Handle to a running playback engine
///
/// Every method resolves once the engine has fully handled the request.
#[derive(Debug, Clone)]
pub struct Player {
    tx: mpsc::Sender<Request>,
}

impl Player {
    /// Start the engine on the current Tokio runtime
    #[must_use]
    pub fn spawn(deps: PlayerDeps) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(Engine::new(deps).run(rx));
        Self { tx }
    }

    async fn send(&self, command: PlayerCommand) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Request { command, ack })
            .await
            .map_err(|_| Error::EngineStopped("command channel closed".to_string()))?;
        done.await
            .map_err(|_| Error::EngineStopped("request dropped".to_string()))
    }

    /// Join the named voice channel of the origin guild, or the first one
    ///
    /// # Errors
    ///
    /// Returns `Error::EngineStopped` if the engine is gone
    pub async fn join(&self, origin: IncomingMessage, channel: Option<String>) -> Result<()> {
        self.send(PlayerCommand::Join { origin, channel }).await
    }

    /// Resolve and queue `url`, starting playback when idle
    ///
    /// # Errors
    ///
    /// Returns `Error::EngineStopped` if the engine is gone
    pub async fn enqueue(&self, origin: IncomingMessage, url: String) -> Result<()> {
        self.send(PlayerCommand::Enqueue { origin, url }).await
    }

    /// Pause the current track
    ///
    /// # Errors
    ///
    /// Returns `Error::EngineStopped` if the engine is gone
    pub async fn pause(&self, origin: IncomingMessage) -> Result<()> {
        self.send(PlayerCommand::Pause { origin }).await
    }

    /// Resume the current track
    ///
    /// # Errors
    ///
    /// Returns `Error::EngineStopped` if the engine is gone
    pub async fn resume(&self, origin: IncomingMessage) -> Result<()> {
        self.send(PlayerCommand::Resume { origin }).await
    }

    /// End the current track early
    ///
    /// # Errors
    ///
    /// Returns `Error::EngineStopped` if the engine is gone
    pub async fn skip(&self, origin: IncomingMessage) -> Result<()> {
        self.send(PlayerCommand::Skip { origin }).await
    }

    /// Re-queue the track announced by the reacted message for `user`
    ///
    /// # Errors
    ///
    /// Returns `Error::EngineStopped` if the engine is gone
    pub async fn repeat(&self, reaction: ReactionEvent, user: User) -> Result<()> {
        self.send(PlayerCommand::Repeat { reaction, user }).await
    }

    /// Record the track announced by the reacted message as a favorite of `user`
    ///
    /// # Errors
    ///
    /// Returns `Error::EngineStopped` if the engine is gone
    pub async fn favorite(&self, reaction: ReactionEvent, user: User) -> Result<()> {
        self.send(PlayerCommand::Favorite { reaction, user }).await
    }

    /// Speak `text` in the voice channel over the current track
    ///
    /// # Errors
    ///
    /// Returns `Error::EngineStopped` if the engine is gone
    pub async fn say(&self, origin: IncomingMessage, text: String) -> Result<()> {
        self.send(PlayerCommand::Say { origin, text }).await
    }

    /// Current state, track and queue
    ///
    /// # Errors
    ///
    /// Returns `Error::EngineStopped` if the engine is gone
    pub async fn snapshot(&self) -> Result<PlayerSnapshot> {
        let (reply, snapshot) = oneshot::channel();
        self.send(PlayerCommand::Snapshot(reply)).await?;
        snapshot
            .await
            .map_err(|_| Error::EngineStopped("snapshot dropped".to_string()))
    }
}

struct Current {
    entry: QueueEntry,
    dispatcher: Box<dyn Dispatcher>,
    done: oneshot::Receiver<PlaybackOutcome>,
    paused: bool,
}

struct Engine {
    meta: ExtensionMeta,
    store: SessionStore<QueueEntry>,
    history: HistoryStore,
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn MediaResolver>,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
    volume: f32,
    voice: Option<Box<dyn VoiceConnection>>,
    current: Option<Current>,
}

impl Engine {
    fn new(deps: PlayerDeps) -> Self {
        let mut store = SessionStore::new();
        store.set_list(QUEUE);

        Self {
            meta: deps.meta,
            store,
            history: deps.history,
            transport: deps.transport,
            resolver: deps.resolver,
            speech: deps.speech,
            volume: deps.volume,
            voice: None,
            current: None,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        tracing::debug!(extension = self.meta.name(), "playback engine started");

        loop {
            tokio::select! {
                biased;

                outcome = next_outcome(&mut self.current) => self.finish(outcome).await,

                request = rx.recv() => {
                    let Some(Request { command, ack }) = request else {
                        break;
                    };
                    if let Err(e) = self.handle(command).await {
                        tracing::error!(
                            extension = self.meta.name(),
                            error = %e,
                            "player command failed"
                        );
                    }
                    let _ = ack.send(());
                }
            }
        }

        tracing::debug!(extension = self.meta.name(), "playback engine stopped");
    }

    async fn handle(&mut self, command: PlayerCommand) -> Result<()> {
        match command {
            PlayerCommand::Join { origin, channel } => self.join(&origin, channel.as_deref()).await,
            PlayerCommand::Enqueue { origin, url } => self.enqueue(&origin, &url).await,
            PlayerCommand::Pause { origin } => {
                self.pause(&origin).await;
                Ok(())
            }
            PlayerCommand::Resume { origin } => {
                self.resume(&origin).await;
                Ok(())
            }
            PlayerCommand::Skip { origin } => {
                self.skip(&origin).await;
                Ok(())
            }
            PlayerCommand::Repeat { reaction, user } => self.repeat(&reaction, &user).await,
            PlayerCommand::Favorite { reaction, user } => self.favorite(&reaction, &user).await,
            PlayerCommand::Say { origin, text } => self.say(&origin, &text).await,
            PlayerCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
                Ok(())
            }
        }
    }

    fn state(&self) -> PlaybackState {
        match (&self.voice, &self.current) {
            (None, _) => PlaybackState::Disconnected,
            (Some(_), None) => PlaybackState::Idle,
            (Some(_), Some(current)) if current.paused => PlaybackState::Paused,
            (Some(_), Some(_)) => PlaybackState::Playing,
        }
    }

    fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            state: self.state(),
            current: self.current.as_ref().map(|c| c.entry.clone()),
            queue: self.store.iter_list(QUEUE).cloned().collect(),
            channel: self.voice.as_ref().map(|v| v.channel().clone()),
        }
    }

    fn queue_len(&self) -> usize {
        self.store.len_of(QUEUE).unwrap_or(0)
    }

    /// Connect to a voice channel of `guild_id`, replacing any connection
    async fn connect(&mut self, guild_id: &str, name: Option<&str>) -> Result<VoiceChannelInfo> {
        let channels = self.transport.voice_channels(guild_id).await?;
        let channel = match name {
            Some(name) => channels.into_iter().find(|c| c.name == name),
            None => channels.into_iter().min_by_key(|c| c.position),
        }
        .ok_or_else(|| Error::ChannelNotFound(name.unwrap_or("<default>").to_string()))?;

        self.meta.log(&format!("Trying to join channel {}...", channel.name));
        let connection = self.transport.join_voice(&channel).await?;
        self.voice = Some(connection);
        self.meta.log(&format!("Joined channel {}!", channel.name));

        Ok(channel)
    }

    async fn join(&mut self, origin: &IncomingMessage, name: Option<&str>) -> Result<()> {
        if let Some(current) = &self.current {
            tracing::info!(
                extension = self.meta.name(),
                title = %current.entry.track.title,
                "ignoring join while a track is active"
            );
            return Ok(());
        }
        let Some(guild_id) = origin.guild_id.as_deref() else {
            return Ok(());
        };

        match self.connect(guild_id, name).await {
            Ok(channel) => {
                self.transport
                    .send(OutgoingMessage::text(
                        origin.channel_id.clone(),
                        render::joined(&channel.name),
                    ))
                    .await?;
                self.delete_origin(origin).await;
                Ok(())
            }
            Err(Error::ChannelNotFound(name)) => {
                tracing::warn!(extension = self.meta.name(), channel = %name, "voice channel not found");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn enqueue(&mut self, origin: &IncomingMessage, url: &str) -> Result<()> {
        if url.is_empty() {
            return Ok(());
        }

        if self.voice.is_none() {
            let Some(guild_id) = origin.guild_id.as_deref() else {
                return Ok(());
            };
            if let Err(e) = self.connect(guild_id, None).await {
                tracing::warn!(
                    extension = self.meta.name(),
                    url,
                    error = %e,
                    "no voice channel to join, dropping request"
                );
                return Ok(());
            }
        }

        let track = match self.resolve(url).await {
            Ok(track) => track,
            Err(e) => {
                tracing::warn!(extension = self.meta.name(), url, error = %e, "track rejected");
                self.delete_origin(origin).await;
                self.transport
                    .send(OutgoingMessage::text(
                        origin.channel_id.clone(),
                        render::rejection(url),
                    ))
                    .await?;
                return Ok(());
            }
        };

        self.delete_origin(origin).await;
        self.announce(&origin.channel_id, url, track, origin.author.clone())
            .await?;

        if self.current.is_none() {
            self.play_next().await;
        }
        Ok(())
    }

    async fn resolve(&self, url: &str) -> Result<TrackInfo> {
        validate_url(url)?;
        self.resolver.resolve(url).await
    }

    /// Post the queued rendering, record it and append the entry
    async fn announce(
        &mut self,
        channel_id: &str,
        url: &str,
        track: TrackInfo,
        requester: User,
    ) -> Result<()> {
        let text = render::announcement(TrackStatus::Queued, &track.title, url, &requester.mention());
        let message = self
            .transport
            .send(OutgoingMessage::text(channel_id, text))
            .await?;

        let record = HistoryRecord::played(
            &message.channel_id,
            &message.message_id,
            url,
            &requester.id,
            Some(track.title.clone()),
        );
        if let Err(e) = self.history.insert(&record) {
            tracing::warn!(
                extension = self.meta.name(),
                url,
                error = %e,
                "failed to record history, queueing anyway"
            );
        }

        self.meta.log(&format!(
            "Queued \"{}\" [{}]",
            track.title,
            format_duration(track.duration_secs)
        ));
        self.store.push(
            QUEUE,
            QueueEntry {
                url: url.to_string(),
                track,
                message,
                requester,
            },
        );
        Ok(())
    }

    /// Start the front of the queue
    async fn play_next(&mut self) {
        let Some(voice) = self.voice.as_ref() else {
            tracing::warn!(extension = self.meta.name(), "not connected, queue left waiting");
            return;
        };
        let Some(entry) = self.store.pop_front(QUEUE) else {
            return;
        };

        self.meta.log(&format!(
            "Playing a song \"{} [{}]\"",
            entry.track.title,
            format_duration(entry.track.duration_secs)
        ));
        edit_announcement(self.transport.as_ref(), &self.meta, &entry, TrackStatus::Playing).await;

        let stream = match self.resolver.open_stream(&entry.url).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(
                    extension = self.meta.name(),
                    url = %entry.url,
                    error = %e,
                    "stream failed, queue halted"
                );
                edit_announcement(self.transport.as_ref(), &self.meta, &entry, TrackStatus::Failed)
                    .await;
                return;
            }
        };

        match voice.play(stream, self.volume).await {
            Ok(Playback { dispatcher, done }) => {
                self.current = Some(Current {
                    entry,
                    dispatcher,
                    done,
                    paused: false,
                });
            }
            Err(e) => {
                tracing::warn!(
                    extension = self.meta.name(),
                    url = %entry.url,
                    error = %e,
                    "playback failed to start"
                );
                edit_announcement(self.transport.as_ref(), &self.meta, &entry, TrackStatus::Finished)
                    .await;
            }
        }
    }

    /// Settle the current track after its playback resolved
    async fn finish(&mut self, outcome: PlaybackOutcome) {
        let Some(Current { entry, .. }) = self.current.take() else {
            return;
        };

        match outcome {
            PlaybackOutcome::Ended => {
                self.edit(&entry, TrackStatus::Finished).await;
                if self.queue_len() > 0 {
                    self.play_next().await;
                }
            }
            PlaybackOutcome::StreamFailed(reason) => {
                tracing::warn!(
                    extension = self.meta.name(),
                    url = %entry.url,
                    reason = %reason,
                    "stream failed, queue halted"
                );
                self.edit(&entry, TrackStatus::Failed).await;
            }
            PlaybackOutcome::DispatcherFailed(reason) => {
                tracing::warn!(
                    extension = self.meta.name(),
                    url = %entry.url,
                    reason = %reason,
                    "playback failed"
                );
                self.edit(&entry, TrackStatus::Finished).await;
            }
        }
    }

    async fn pause(&mut self, origin: &IncomingMessage) {
        let Some(entry) = self
            .current
            .as_ref()
            .filter(|c| !c.paused)
            .map(|c| c.entry.clone())
        else {
            return;
        };

        self.delete_origin(origin).await;
        self.edit(&entry, TrackStatus::Paused).await;
        if let Some(current) = self.current.as_mut() {
            current.dispatcher.pause();
            current.paused = true;
        }
    }

    async fn resume(&mut self, origin: &IncomingMessage) {
        let Some(entry) = self
            .current
            .as_ref()
            .filter(|c| c.paused)
            .map(|c| c.entry.clone())
        else {
            return;
        };

        self.delete_origin(origin).await;
        self.edit(&entry, TrackStatus::Playing).await;
        if let Some(current) = self.current.as_mut() {
            current.dispatcher.resume();
            current.paused = false;
        }
    }

    async fn skip(&mut self, origin: &IncomingMessage) {
        let Some(entry) = self.current.as_ref().map(|c| c.entry.clone()) else {
            return;
        };

        self.delete_origin(origin).await;
        self.edit(&entry, TrackStatus::Skipped).await;
        if let Some(current) = &self.current {
            current.dispatcher.end();
        }
    }

    async fn repeat(&mut self, reaction: &ReactionEvent, user: &User) -> Result<()> {
        let Some(record) = self.history.find_by_message(&reaction.message.message_id)? else {
            return Ok(());
        };

        if let Err(e) = self
            .transport
            .remove_reaction(&reaction.message, REPEAT_EMOJI, &user.id)
            .await
        {
            tracing::warn!(extension = self.meta.name(), error = %e, "failed to remove reaction");
        }

        let track = match self.resolve(&record.url).await {
            Ok(track) => track,
            Err(e) => {
                tracing::warn!(
                    extension = self.meta.name(),
                    url = %record.url,
                    error = %e,
                    "cannot repeat track"
                );
                return Ok(());
            }
        };

        self.announce(&reaction.message.channel_id, &record.url, track, user.clone())
            .await?;

        if self.current.is_some() {
            return Ok(());
        }
        if self.voice.is_none() {
            let Some(guild_id) = reaction.guild_id.as_deref() else {
                return Ok(());
            };
            if let Err(e) = self.connect(guild_id, None).await {
                tracing::warn!(
                    extension = self.meta.name(),
                    error = %e,
                    "no voice channel to join, repeat left queued"
                );
                return Ok(());
            }
        }
        self.play_next().await;
        Ok(())
    }

    async fn favorite(&mut self, reaction: &ReactionEvent, user: &User) -> Result<()> {
        let Some(record) = self.history.find_by_message(&reaction.message.message_id)? else {
            return Ok(());
        };

        let title = match self.resolve(&record.url).await {
            Ok(track) => Some(track.title),
            Err(e) => {
                tracing::warn!(
                    extension = self.meta.name(),
                    url = %record.url,
                    error = %e,
                    "could not refresh title, using recorded one"
                );
                record.title.clone()
            }
        };

        self.history
            .insert(&HistoryRecord::favorite(&record, &user.id, title))?;
        self.meta
            .log(&format!("{} favorited {}", user.name, record.url));
        Ok(())
    }

    async fn say(&mut self, origin: &IncomingMessage, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let Some(speech) = self.speech.clone() else {
            tracing::warn!(extension = self.meta.name(), "no speech synthesizer configured");
            return Ok(());
        };
        let Some(voice) = self.voice.as_ref() else {
            self.meta.log("Not connected, ignoring say");
            return Ok(());
        };

        let stream = speech.speak(text).await?;

        let interrupted = self.current.as_ref().filter(|c| !c.paused);
        if let Some(current) = interrupted {
            current.dispatcher.pause();
        }

        let spoken = async {
            let playback = voice.play(stream, self.volume).await?;
            match playback.done.await {
                Ok(PlaybackOutcome::Ended) | Err(_) => Ok(()),
                Ok(PlaybackOutcome::StreamFailed(reason)) => Err(Error::Tts(reason)),
                Ok(PlaybackOutcome::DispatcherFailed(reason)) => Err(Error::Dispatcher(reason)),
            }
        }
        .await;

        if let Some(current) = interrupted {
            current.dispatcher.resume();
        }
        self.delete_origin(origin).await;
        spoken
    }

    async fn edit(&self, entry: &QueueEntry, status: TrackStatus) {
        edit_announcement(self.transport.as_ref(), &self.meta, entry, status).await;
    }

    async fn delete_origin(&self, origin: &IncomingMessage) {
        if let Err(e) = self.transport.delete(&origin.reference()).await {
            tracing::debug!(
                extension = self.meta.name(),
                message_id = %origin.id,
                error = %e,
                "failed to delete command message"
            );
        }
    }
}

async fn edit_announcement(
    transport: &dyn Transport,
    meta: &ExtensionMeta,
    entry: &QueueEntry,
    status: TrackStatus,
) {
    if let Err(e) = transport.edit(&entry.message, &entry.render(status)).await {
        tracing::warn!(
            extension = meta.name(),
            message_id = %entry.message.message_id,
            error = %e,
            "failed to update announcement"
        );
    }
}

/// Wait for the active playback to resolve; never resolves when idle
async fn next_outcome(current: &mut Option<Current>) -> PlaybackOutcome {
    match current {
        Some(current) => (&mut current.done)
            .await
            .unwrap_or_else(|_| PlaybackOutcome::DispatcherFailed("playback dropped".to_string())),
        None => std::future::pending().await,
    }
}
