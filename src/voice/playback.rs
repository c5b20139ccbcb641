//! Playback of PCM streams to the local output device
//!
//! The speaker backend renders voice-channel audio on the host's default
//! output device. Joining a channel only binds the connection to it; the
//! gateway voice handshake is left to an external bridge.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot};

use super::{Dispatcher, Playback, PlaybackOutcome, VoiceBackend, VoiceConnection};
use crate::channels::VoiceChannelInfo;
use crate::media::{MediaStream, SAMPLE_RATE};
use crate::{Error, Result};

/// Bytes read from the stream per chunk
const READ_CHUNK: usize = 8192;

/// Decoded chunks buffered between the reader and the output callback
const BUFFERED_CHUNKS: usize = 32;

/// How often the output thread checks for completion
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Voice backend that plays to the default output device
#[derive(Debug, Default, Clone, Copy)]
pub struct SpeakerBackend;

impl SpeakerBackend {
    /// Create a new speaker backend
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VoiceBackend for SpeakerBackend {
    async fn join(&self, channel: &VoiceChannelInfo) -> Result<Box<dyn VoiceConnection>> {
        tracing::debug!(channel = %channel.name, "voice channel bound to local output");
        Ok(Box::new(SpeakerConnection {
            channel: channel.clone(),
        }))
    }
}

/// A voice connection rendered on the local output device
struct SpeakerConnection {
    channel: VoiceChannelInfo,
}

#[async_trait]
impl VoiceConnection for SpeakerConnection {
    fn channel(&self) -> &VoiceChannelInfo {
        &self.channel
    }

    async fn play(&self, stream: MediaStream, volume: f32) -> Result<Playback> {
        let state = Arc::new(PlaybackState::default());
        let (chunk_tx, chunk_rx) = mpsc::channel(BUFFERED_CHUNKS);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();

        // cpal streams are not `Send`, so the output lives on its own thread
        let output_state = Arc::clone(&state);
        std::thread::spawn(move || {
            let outcome = render(chunk_rx, &output_state, volume, ready_tx);
            let _ = done_tx.send(outcome);
        });

        ready_rx
            .await
            .map_err(|_| Error::Dispatcher("output thread exited".to_string()))??;

        tokio::spawn(pump(stream, chunk_tx, Arc::clone(&state)));

        Ok(Playback {
            dispatcher: Box::new(SpeakerDispatcher { state }),
            done: done_rx,
        })
    }
}

/// State shared by the reader task, the output callback and the dispatcher
#[derive(Default)]
struct PlaybackState {
    paused: AtomicBool,
    ended: AtomicBool,
    drained: AtomicBool,
    stream_error: Mutex<Option<String>>,
    device_error: Mutex<Option<String>>,
}

impl PlaybackState {
    fn record(slot: &Mutex<Option<String>>, message: String) {
        if let Ok(mut slot) = slot.lock() {
            slot.get_or_insert(message);
        }
    }

    fn take(slot: &Mutex<Option<String>>) -> Option<String> {
        slot.lock().ok().and_then(|mut slot| slot.take())
    }
}

struct SpeakerDispatcher {
    state: Arc<PlaybackState>,
}

impl Dispatcher for SpeakerDispatcher {
    fn pause(&self) {
        self.state.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.state.paused.store(false, Ordering::SeqCst);
    }

    fn end(&self) {
        self.state.ended.store(true, Ordering::SeqCst);
    }
}

/// Read PCM from the stream and forward decoded chunks to the output
async fn pump(mut stream: MediaStream, tx: mpsc::Sender<Vec<f32>>, state: Arc<PlaybackState>) {
    let mut buf = vec![0u8; READ_CHUNK];
    let mut carry: Option<u8> = None;

    loop {
        if state.ended.load(Ordering::SeqCst) {
            break;
        }

        let read = match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "media stream read failed");
                PlaybackState::record(&state.stream_error, e.to_string());
                break;
            }
        };

        let samples = decode_s16le(&buf[..read], &mut carry);
        if tx.send(samples).await.is_err() {
            // Output side is gone
            break;
        }
    }
}

/// Convert little-endian i16 bytes to f32 samples, carrying an odd byte over
fn decode_s16le(bytes: &[u8], carry: &mut Option<u8>) -> Vec<f32> {
    let mut samples = Vec::with_capacity(bytes.len() / 2 + 1);
    let mut iter = bytes.iter().copied();

    if let Some(low) = carry.take() {
        match iter.next() {
            Some(high) => samples.push(f32::from(i16::from_le_bytes([low, high])) / 32768.0),
            None => {
                *carry = Some(low);
                return samples;
            }
        }
    }

    loop {
        match (iter.next(), iter.next()) {
            (Some(low), Some(high)) => {
                samples.push(f32::from(i16::from_le_bytes([low, high])) / 32768.0);
            }
            (Some(low), None) => {
                *carry = Some(low);
                break;
            }
            _ => break,
        }
    }

    samples
}

/// Pick an output config at [`SAMPLE_RATE`], mono preferred
fn output_config(device: &cpal::Device) -> Result<StreamConfig> {
    let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
        c.channels() == channels
            && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
            && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
    };

    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::Dispatcher(e.to_string()))?
        .find(|c| supports(c, 1))
        .or_else(|| {
            // Fallback: try stereo
            device
                .supported_output_configs()
                .ok()?
                .find(|c| supports(c, 2))
        })
        .ok_or_else(|| Error::Dispatcher("no suitable output config found".to_string()))?;

    Ok(supported.with_sample_rate(SampleRate(SAMPLE_RATE)).config())
}

/// Run the output stream until the playback finishes
fn render(
    mut chunks: mpsc::Receiver<Vec<f32>>,
    state: &Arc<PlaybackState>,
    volume: f32,
    ready: oneshot::Sender<Result<()>>,
) -> PlaybackOutcome {
    let host = cpal::default_host();
    let Some(device) = host.default_output_device() else {
        let _ = ready.send(Err(Error::Dispatcher("no output device available".to_string())));
        return PlaybackOutcome::DispatcherFailed("no output device".to_string());
    };

    let config = match output_config(&device) {
        Ok(config) => config,
        Err(e) => {
            let outcome = PlaybackOutcome::DispatcherFailed(e.to_string());
            let _ = ready.send(Err(e));
            return outcome;
        }
    };
    let channels = usize::from(config.channels);

    let callback_state = Arc::clone(state);
    let error_state = Arc::clone(state);
    let mut pending: Vec<f32> = Vec::new();
    let mut position = 0usize;

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let silent = callback_state.paused.load(Ordering::SeqCst)
                || callback_state.ended.load(Ordering::SeqCst);

            for frame in data.chunks_mut(channels) {
                let sample = if silent {
                    0.0
                } else {
                    if position >= pending.len() {
                        match chunks.try_recv() {
                            Ok(chunk) => {
                                pending = chunk;
                                position = 0;
                            }
                            Err(mpsc::error::TryRecvError::Empty) => {}
                            Err(mpsc::error::TryRecvError::Disconnected) => {
                                callback_state.drained.store(true, Ordering::SeqCst);
                            }
                        }
                    }

                    pending.get(position).map_or(0.0, |s| {
                        position += 1;
                        s * volume
                    })
                };

                for out in frame.iter_mut() {
                    *out = sample;
                }
            }
        },
        move |err| {
            tracing::error!(error = %err, "audio playback error");
            PlaybackState::record(&error_state.device_error, err.to_string());
        },
        None,
    );

    let stream = match stream.map_err(|e| Error::Dispatcher(e.to_string())) {
        Ok(stream) => stream,
        Err(e) => {
            let outcome = PlaybackOutcome::DispatcherFailed(e.to_string());
            let _ = ready.send(Err(e));
            return outcome;
        }
    };

    if let Err(e) = stream.play() {
        let outcome = PlaybackOutcome::DispatcherFailed(e.to_string());
        let _ = ready.send(Err(Error::Dispatcher(e.to_string())));
        return outcome;
    }

    let _ = ready.send(Ok(()));
    tracing::debug!(sample_rate = SAMPLE_RATE, channels, "playback started");

    let outcome = loop {
        if let Some(err) = PlaybackState::take(&state.device_error) {
            break PlaybackOutcome::DispatcherFailed(err);
        }
        if state.ended.load(Ordering::SeqCst) {
            break PlaybackOutcome::Ended;
        }
        if state.drained.load(Ordering::SeqCst) {
            break PlaybackState::take(&state.stream_error)
                .map_or(PlaybackOutcome::Ended, PlaybackOutcome::StreamFailed);
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    // Stop the reader if it is still producing
    state.ended.store(true, Ordering::SeqCst);
    drop(stream);
    tracing::debug!(?outcome, "playback complete");

    outcome
}
