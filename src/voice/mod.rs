//! Voice connections and playback
//!
//! A [`VoiceConnection`] plays one PCM [`MediaStream`] at a time and hands
//! back a [`Playback`]: a [`Dispatcher`] to control it plus a receiver that
//! resolves once with the [`PlaybackOutcome`].

mod playback;
mod tts;

use async_trait::async_trait;
use tokio::sync::oneshot;

pub use playback::SpeakerBackend;
pub use tts::{CommandSpeech, SpeechSynthesizer};

use crate::Result;
use crate::channels::VoiceChannelInfo;
use crate::media::MediaStream;

/// How an active playback finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Stream drained or was ended via [`Dispatcher::end`]
    Ended,
    /// The media stream failed while being read
    StreamFailed(String),
    /// The output side failed after playback started
    DispatcherFailed(String),
}

/// Control handle for one active outbound audio stream
pub trait Dispatcher: Send + Sync {
    /// Suspend output, keeping the position
    fn pause(&self);

    /// Continue a paused stream
    fn resume(&self);

    /// Stop the stream; the playback resolves with [`PlaybackOutcome::Ended`]
    fn end(&self);
}

/// An active playback: its dispatcher and completion signal
pub struct Playback {
    /// Control handle
    pub dispatcher: Box<dyn Dispatcher>,

    /// Resolves once when playback finishes
    pub done: oneshot::Receiver<PlaybackOutcome>,
}

impl std::fmt::Debug for Playback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Playback").finish_non_exhaustive()
    }
}

/// A joined voice channel
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// The channel this connection is bound to
    fn channel(&self) -> &VoiceChannelInfo;

    /// Start playing a stream at the given volume (1.0 = unchanged)
    ///
    /// # Errors
    ///
    /// Returns `Error::Dispatcher` if the output cannot be opened
    async fn play(&self, stream: MediaStream, volume: f32) -> Result<Playback>;
}

/// Opens voice connections for the transport
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    /// Join `channel`
    ///
    /// # Errors
    ///
    /// Returns error if the connection cannot be established
    async fn join(&self, channel: &VoiceChannelInfo) -> Result<Box<dyn VoiceConnection>>;
}
