//! Shared test utilities

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::oneshot;

use qin_bot::channels::{
    IncomingMessage, MessageRef, OutgoingMessage, ReactionEvent, RoleLookup, Transport, User,
    VoiceChannelInfo,
};
use qin_bot::media::{MediaResolver, MediaStream, TrackInfo};
use qin_bot::db::{HistoryKind, HistoryQuery, HistoryRecord, HistoryStore};
use qin_bot::music::{self, MusicExtension, MusicSettings, Player};
use qin_bot::voice::{
    Dispatcher, Playback, PlaybackOutcome, SpeechSynthesizer, VoiceConnection,
};
use qin_bot::{Bot, DbPool, Error, Result, Session, db};

/// Bot user id used by every test session
pub const BOT_ID: &str = "42";

/// Guild every test message comes from
pub const GUILD: &str = "g1";

/// Text channel every test message comes from
pub const TEXT_CHANNEL: &str = "text-1";

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// A human user
#[must_use]
pub fn user(id: &str) -> User {
    User::new(id, format!("user-{id}"))
}

/// A guild text message from `author`
#[must_use]
pub fn message(id: &str, author: &User, content: &str) -> IncomingMessage {
    IncomingMessage {
        id: id.to_string(),
        channel_id: TEXT_CHANNEL.to_string(),
        guild_id: Some(GUILD.to_string()),
        author: author.clone(),
        content: content.to_string(),
    }
}

/// A reaction on `message`
#[must_use]
pub fn reaction(message: &MessageRef, emoji: &str, author_id: Option<&str>) -> ReactionEvent {
    ReactionEvent {
        message: message.clone(),
        guild_id: Some(GUILD.to_string()),
        emoji: emoji.to_string(),
        message_author_id: author_id.map(ToString::to_string),
    }
}

/// A voice channel of the test guild
#[must_use]
pub fn voice_channel(id: &str, name: &str, position: u16) -> VoiceChannelInfo {
    VoiceChannelInfo {
        id: id.to_string(),
        guild_id: GUILD.to_string(),
        name: name.to_string(),
        position,
    }
}

/// Control over one mock playback
#[derive(Default)]
pub struct PlayControl {
    tx: Mutex<Option<oneshot::Sender<PlaybackOutcome>>>,
    pub paused: AtomicBool,
    pub pauses: AtomicUsize,
    pub resumes: AtomicUsize,
    pub ends: AtomicUsize,
}

impl PlayControl {
    /// Resolve the playback with `outcome`
    pub fn finish(&self, outcome: PlaybackOutcome) {
        if let Some(tx) = self.tx.lock().unwrap().take() {
            let _ = tx.send(outcome);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

struct MockDispatcher(Arc<PlayControl>);

impl Dispatcher for MockDispatcher {
    fn pause(&self) {
        self.0.paused.store(true, Ordering::SeqCst);
        self.0.pauses.fetch_add(1, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.0.paused.store(false, Ordering::SeqCst);
        self.0.resumes.fetch_add(1, Ordering::SeqCst);
    }

    fn end(&self) {
        self.0.ends.fetch_add(1, Ordering::SeqCst);
        self.0.finish(PlaybackOutcome::Ended);
    }
}

/// Mock voice side: records every playback
#[derive(Default)]
pub struct MockVoice {
    plays: Mutex<Vec<Arc<PlayControl>>>,
    fail_next_play: AtomicBool,
    auto_end_next_play: AtomicBool,
}

impl MockVoice {
    /// Number of playbacks started
    pub fn play_count(&self) -> usize {
        self.plays.lock().unwrap().len()
    }

    /// Control of the `index`th playback
    pub fn play(&self, index: usize) -> Arc<PlayControl> {
        Arc::clone(&self.plays.lock().unwrap()[index])
    }

    /// Control of the latest playback
    pub fn latest(&self) -> Arc<PlayControl> {
        Arc::clone(self.plays.lock().unwrap().last().expect("no playback started"))
    }

    /// Resolve the latest playback with `outcome`
    pub fn finish_latest(&self, outcome: PlaybackOutcome) {
        self.latest().finish(outcome);
    }

    /// Make the next `play` call fail
    pub fn fail_next_play(&self) {
        self.fail_next_play.store(true, Ordering::SeqCst);
    }

    /// Make the next playback end as soon as it starts
    pub fn auto_end_next_play(&self) {
        self.auto_end_next_play.store(true, Ordering::SeqCst);
    }
}

struct MockConnection {
    channel: VoiceChannelInfo,
    voice: Arc<MockVoice>,
}

#[async_trait]
impl VoiceConnection for MockConnection {
    fn channel(&self) -> &VoiceChannelInfo {
        &self.channel
    }

    async fn play(&self, _stream: MediaStream, _volume: f32) -> Result<Playback> {
        if self.voice.fail_next_play.swap(false, Ordering::SeqCst) {
            return Err(Error::Dispatcher("output unavailable".to_string()));
        }

        let (tx, done) = oneshot::channel();
        let control = Arc::new(PlayControl {
            tx: Mutex::new(Some(tx)),
            ..PlayControl::default()
        });
        if self.voice.auto_end_next_play.swap(false, Ordering::SeqCst) {
            control.finish(PlaybackOutcome::Ended);
        }
        self.voice.plays.lock().unwrap().push(Arc::clone(&control));

        Ok(Playback {
            dispatcher: Box::new(MockDispatcher(control)),
            done,
        })
    }
}

/// Everything the mock transport has been asked to do
#[derive(Default)]
pub struct TransportLog {
    pub sent: Vec<(MessageRef, String)>,
    pub edits: Vec<(MessageRef, String)>,
    pub deleted: Vec<MessageRef>,
    pub removed_reactions: Vec<(MessageRef, String, String)>,
    pub joins: Vec<VoiceChannelInfo>,
}

/// In-memory chat transport
pub struct MockTransport {
    log: Mutex<TransportLog>,
    roles: Mutex<HashMap<String, Vec<String>>>,
    channels: Mutex<Vec<VoiceChannelInfo>>,
    next_id: AtomicUsize,
    pub voice: Arc<MockVoice>,
}

impl MockTransport {
    /// A transport whose guild has the voice channels "General" and "Music"
    #[must_use]
    pub fn new() -> Self {
        Self {
            log: Mutex::new(TransportLog::default()),
            roles: Mutex::new(HashMap::new()),
            channels: Mutex::new(vec![
                voice_channel("v2", "Music", 1),
                voice_channel("v1", "General", 0),
            ]),
            next_id: AtomicUsize::new(1000),
            voice: Arc::new(MockVoice::default()),
        }
    }

    /// Replace the guild's voice channels
    pub fn set_voice_channels(&self, channels: Vec<VoiceChannelInfo>) {
        *self.channels.lock().unwrap() = channels;
    }

    /// Give `user_id` the named roles
    pub fn grant(&self, user_id: &str, roles: &[&str]) {
        self.roles.lock().unwrap().insert(
            user_id.to_string(),
            roles.iter().map(ToString::to_string).collect(),
        );
    }

    /// Take every role from `user_id`
    pub fn revoke_all(&self, user_id: &str) {
        self.roles.lock().unwrap().remove(user_id);
    }

    /// Inspect the log
    pub fn with_log<R>(&self, f: impl FnOnce(&TransportLog) -> R) -> R {
        f(&self.log.lock().unwrap())
    }

    /// Contents of every sent message, in order
    pub fn sent_texts(&self) -> Vec<String> {
        self.with_log(|log| log.sent.iter().map(|(_, text)| text.clone()).collect())
    }

    /// Latest content of a sent message, following edits
    pub fn content_of(&self, target: &MessageRef) -> Option<String> {
        self.with_log(|log| {
            log.edits
                .iter()
                .rev()
                .find(|(r, _)| r == target)
                .or_else(|| log.sent.iter().find(|(r, _)| r == target))
                .map(|(_, text)| text.clone())
        })
    }

    /// Every edit applied to `target`, in order
    pub fn edits_of(&self, target: &MessageRef) -> Vec<String> {
        self.with_log(|log| {
            log.edits
                .iter()
                .filter(|(r, _)| r == target)
                .map(|(_, text)| text.clone())
                .collect()
        })
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoleLookup for MockTransport {
    async fn role_names(&self, _guild_id: &str, user_id: &str) -> Result<Vec<String>> {
        Ok(self
            .roles
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn send(&self, message: OutgoingMessage) -> Result<MessageRef> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let sent = MessageRef::new(message.channel_id, id.to_string());
        self.log
            .lock()
            .unwrap()
            .sent
            .push((sent.clone(), message.content));
        Ok(sent)
    }

    async fn edit(&self, target: &MessageRef, content: &str) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .edits
            .push((target.clone(), content.to_string()));
        Ok(())
    }

    async fn delete(&self, target: &MessageRef) -> Result<()> {
        self.log.lock().unwrap().deleted.push(target.clone());
        Ok(())
    }

    async fn remove_reaction(&self, target: &MessageRef, emoji: &str, user_id: &str) -> Result<()> {
        self.log.lock().unwrap().removed_reactions.push((
            target.clone(),
            emoji.to_string(),
            user_id.to_string(),
        ));
        Ok(())
    }

    async fn voice_channels(&self, guild_id: &str) -> Result<Vec<VoiceChannelInfo>> {
        let mut channels: Vec<VoiceChannelInfo> = self
            .channels
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.guild_id == guild_id)
            .cloned()
            .collect();
        channels.sort_by_key(|c| c.position);
        Ok(channels)
    }

    async fn join_voice(&self, channel: &VoiceChannelInfo) -> Result<Box<dyn VoiceConnection>> {
        self.log.lock().unwrap().joins.push(channel.clone());
        Ok(Box::new(MockConnection {
            channel: channel.clone(),
            voice: Arc::clone(&self.voice),
        }))
    }
}

/// Resolver over a fixed catalog
#[derive(Default)]
pub struct MockResolver {
    catalog: Mutex<HashMap<String, TrackInfo>>,
    broken_streams: Mutex<HashSet<String>>,
    pub resolves: AtomicUsize,
}

impl MockResolver {
    /// Make `url` resolvable as `title`
    pub fn add(&self, url: &str, title: &str, duration_secs: u64) {
        self.catalog.lock().unwrap().insert(
            url.to_string(),
            TrackInfo {
                title: title.to_string(),
                duration_secs,
            },
        );
    }

    /// Make opening a stream for `url` fail
    pub fn break_stream(&self, url: &str) {
        self.broken_streams.lock().unwrap().insert(url.to_string());
    }
}

#[async_trait]
impl MediaResolver for MockResolver {
    async fn resolve(&self, url: &str) -> Result<TrackInfo> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        self.catalog
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Resolution(format!("unknown track {url}")))
    }

    async fn open_stream(&self, url: &str) -> Result<MediaStream> {
        if self.broken_streams.lock().unwrap().contains(url) {
            return Err(Error::Stream(format!("stream for {url} failed")));
        }
        Ok(MediaStream::from_reader(tokio::io::empty()))
    }
}

/// Speech synthesizer that records what it was asked to say
#[derive(Default)]
pub struct MockSpeech {
    pub spoken: Mutex<Vec<String>>,
}

#[async_trait]
impl SpeechSynthesizer for MockSpeech {
    async fn speak(&self, text: &str) -> Result<MediaStream> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(MediaStream::from_reader(tokio::io::empty()))
    }
}

/// A bot with the music extension on mock collaborators
pub struct Harness {
    pub db: DbPool,
    pub transport: Arc<MockTransport>,
    pub resolver: Arc<MockResolver>,
    pub speech: Arc<MockSpeech>,
    pub player: Player,
    pub bot: Arc<Bot>,
}

impl Harness {
    /// Build a ready bot with the music extension registered
    pub async fn new() -> Self {
        let db = setup_test_db();
        let transport = Arc::new(MockTransport::new());
        let resolver = Arc::new(MockResolver::default());
        let speech = Arc::new(MockSpeech::default());

        let music = MusicExtension::new(
            db.clone(),
            transport.clone(),
            resolver.clone(),
            Some(speech.clone() as Arc<dyn SpeechSynthesizer>),
            &MusicSettings::default(),
        )
        .expect("failed to build music extension");
        let player = music.player().clone();

        let session = Session::new(SecretString::from("test-token"), "Qin", transport.clone())
            .expect("failed to build session");
        let mut bot = Bot::new(session);
        bot.register(Box::new(music))
            .expect("failed to register music extension");
        let bot = Arc::new(bot);
        bot.ready(BOT_ID).await;

        Self {
            db,
            transport,
            resolver,
            speech,
            player,
            bot,
        }
    }

    /// The mock voice side
    pub fn voice(&self) -> &MockVoice {
        &self.transport.voice
    }

    /// Send `content` as `author` through the bot
    pub async fn send(&self, id: &str, author: &User, content: &str) {
        self.bot.message(message(id, author, content)).await;
    }

    /// Address a command to the bot as `author`
    pub async fn command(&self, id: &str, author: &User, command: &str) {
        self.send(id, author, &format!("<@{BOT_ID}> {command}")).await;
    }

    /// A user holding the DJ role
    pub fn dj(&self, id: &str) -> User {
        self.transport.grant(id, &["DJ"]);
        user(id)
    }

    /// The music extension's history
    pub fn history(&self) -> HistoryStore {
        HistoryStore::new(self.db.clone(), music::NAME).expect("failed to open history")
    }

    /// Every history row of `kind`
    pub fn records(&self, kind: HistoryKind) -> Vec<HistoryRecord> {
        self.history()
            .find(&HistoryQuery {
                kind: Some(kind),
                ..HistoryQuery::default()
            })
            .expect("failed to query history")
    }
}
