//! Daemon - the main bot service
//!
//! Wires the Discord transport, media tools, speech and the music
//! extension into one bot session and runs it until interrupted.

use std::sync::Arc;

use secrecy::ExposeSecret;
use serenity::Client;

use crate::bot::Bot;
use crate::channels::{DiscordHandler, DiscordTransport, Transport, gateway_intents};
use crate::db::{self, DbPool};
use crate::media::{MediaResolver, Transcoder, YtDlpResolver};
use crate::music::MusicExtension;
use crate::session::Session;
use crate::voice::{CommandSpeech, SpeakerBackend, SpeechSynthesizer, VoiceBackend};
use crate::{Config, Error, Result};

/// The Qin daemon
pub struct Daemon {
    config: Config,
    db: DbPool,
}

impl Daemon {
    /// Create a new daemon instance
    ///
    /// # Errors
    ///
    /// Returns error if the data directory or database cannot be initialized
    pub fn new(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let db_path = config.db_path();
        let db = db::init(&db_path)?;
        tracing::info!(path = %db_path.display(), "database opened");

        Ok(Self { config, db })
    }

    /// Database pool
    #[must_use]
    pub const fn db(&self) -> &DbPool {
        &self.db
    }

    fn speech(&self) -> Option<Arc<dyn SpeechSynthesizer>> {
        self.config.tts.as_ref().map(|tts| {
            tracing::info!(program = %tts.program, "speech synthesis enabled");
            Arc::new(CommandSpeech::new(
                tts.program.clone(),
                tts.args.clone(),
                tts.output.clone(),
                Transcoder::new(self.config.media.ffmpeg.clone()),
            )) as Arc<dyn SpeechSynthesizer>
        })
    }

    /// Run the bot until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the bot cannot be built or the gateway connection fails
    pub async fn run(self) -> Result<()> {
        let speech = self.speech();
        let Self { config, db } = self;

        let voice: Arc<dyn VoiceBackend> = Arc::new(SpeakerBackend::new());
        tracing::warn!(
            "voice audio plays on the local output device; the bot does not enter Discord voice channels"
        );
        let transport: Arc<dyn Transport> = Arc::new(DiscordTransport::from_token(
            config.token.expose_secret(),
            voice,
        ));
        let resolver: Arc<dyn MediaResolver> = Arc::new(YtDlpResolver::new(
            config.media.ytdlp.clone(),
            config.media.ffmpeg.clone(),
        ));

        let session = Session::new(config.token, config.name, Arc::clone(&transport))?;
        let mut bot = Bot::new(session);
        bot.register(Box::new(MusicExtension::new(
            db,
            transport,
            resolver,
            speech,
            &config.music,
        )?))?;
        let bot = Arc::new(bot);

        let mut client = Client::builder(bot.session().token().expose_secret(), gateway_intents())
            .event_handler(DiscordHandler::new(Arc::clone(&bot)))
            .await
            .map_err(|e| Error::Transport(format!("Discord client error: {e}")))?;

        // Set up shutdown signal
        let shard_manager = Arc::clone(&client.shard_manager);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutting down");
                shard_manager.shutdown_all().await;
            }
        });

        tracing::info!(
            name = %bot.session().display_name(),
            extensions = ?bot.extensions().names(),
            "connecting to Discord"
        );
        client
            .start()
            .await
            .map_err(|e| Error::Transport(format!("Discord gateway error: {e}")))?;

        tracing::info!("daemon stopped");
        Ok(())
    }
}
