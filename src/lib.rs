//! Qin - extension-driven Discord bot with a music queue
//!
//! This library provides the core of the Qin bot:
//! - An extension runtime (commands, permission checks, event fan-out)
//! - The music extension and its playback engine
//! - Play history persistence
//! - Discord, media (yt-dlp/ffmpeg) and voice adapters
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Discord gateway (serenity)             │
//! └────────────────────┬────────────────────────────────┘
//!                      │ ready / message / reaction
//! ┌────────────────────▼────────────────────────────────┐
//! │          Bot: Session + ExtensionRegistry           │
//! │   command parsing  │  permission gate  │  fan-out   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │        MusicExtension → Player (engine actor)       │
//! │   queue  │  history  │  media resolver  │  voice    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod bot;
pub mod channels;
pub mod config;
pub mod daemon;
pub mod db;
pub mod error;
pub mod extensions;
pub mod media;
pub mod music;
pub mod session;
pub mod voice;

pub use bot::Bot;
pub use config::Config;
pub use daemon::Daemon;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
pub use extensions::{Extension, ExtensionMeta, ExtensionRegistry};
pub use music::{MusicExtension, PlaybackState, Player};
pub use session::Session;
