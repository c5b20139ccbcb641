//! Extension runtime
//!
//! An extension is a named bundle of commands and event handlers. The
//! [`ExtensionRegistry`] fans every gateway event out to all registered
//! extensions in registration order and routes command invocations to the
//! matching commands after a permission check. A failing or panicking
//! handler is logged and never stops delivery to the rest.
//!
//! # Example
//!
//! ```rust,ignore
//! use qin_bot::extensions::ExtensionRegistry;
//!
//! let mut registry = ExtensionRegistry::new();
//! registry.register(Box::new(music))?;
//!
//! for name in registry.names() {
//!     println!("{name}");
//! }
//! ```

mod command;
mod permission;
mod store;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;

use crate::channels::{IncomingMessage, ReactionEvent, User};
use crate::session::Session;
use crate::{Error, Result};

pub use command::{parse_command, ActionFuture, Command, CommandAction, Invocation, ParsedCommand};
pub use permission::{check_permission, Permission};
pub use store::{SessionStore, Slot};

/// A named bundle of commands and event handlers
///
/// Every handler has a no-op default so extensions only implement the
/// events they care about.
#[async_trait]
pub trait Extension: Send + Sync {
    /// Unique extension name
    fn name(&self) -> &str;

    /// Commands this extension answers to
    fn commands(&self) -> &[Command] {
        &[]
    }

    /// Called once the gateway session is established
    ///
    /// # Errors
    ///
    /// Returns error if the extension cannot start
    async fn on_ready(&self, _session: &Arc<Session>) -> Result<()> {
        Ok(())
    }

    /// Called for every incoming message, commands included
    ///
    /// # Errors
    ///
    /// Returns error if handling fails
    async fn on_message(&self, _message: &IncomingMessage, _session: &Arc<Session>) -> Result<()> {
        Ok(())
    }

    /// Called for every reaction added by a human user
    ///
    /// # Errors
    ///
    /// Returns error if handling fails
    async fn on_reaction(
        &self,
        _reaction: &ReactionEvent,
        _actor: &User,
        _session: &Arc<Session>,
    ) -> Result<()> {
        Ok(())
    }
}

/// Extension identity and log switch
#[derive(Debug, Clone)]
pub struct ExtensionMeta {
    name: String,
    logging: bool,
}

impl ExtensionMeta {
    /// Create extension metadata
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the name is empty
    pub fn new(name: &str, logging: bool) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(Error::Config("extension name must not be empty".to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            logging,
        })
    }

    /// Extension name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether extension-level logging is on
    #[must_use]
    pub const fn logging(&self) -> bool {
        self.logging
    }

    /// Log an info line tagged with the extension name, when logging is on
    pub fn log(&self, message: &str) {
        if self.logging {
            tracing::info!(extension = %self.name, "{message}");
        }
    }
}

/// Ordered set of extensions and the event bus over them
#[derive(Default)]
pub struct ExtensionRegistry {
    extensions: Vec<Box<dyn Extension>>,
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &self.names())
            .finish()
    }
}

impl ExtensionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the extension is unnamed or its name is
    /// already registered
    pub fn register(&mut self, extension: Box<dyn Extension>) -> Result<()> {
        let name = extension.name().to_string();
        if name.trim().is_empty() {
            return Err(Error::Config("extension name must not be empty".to_string()));
        }
        if self.get(&name).is_some() {
            return Err(Error::Config(format!("extension {name} is already registered")));
        }

        tracing::info!(
            extension = %name,
            commands = extension.commands().len(),
            "registering extension"
        );
        self.extensions.push(extension);
        Ok(())
    }

    /// Get extension by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Extension> {
        self.extensions
            .iter()
            .find(|ext| ext.name() == name)
            .map(AsRef::as_ref)
    }

    /// Names in registration order
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.extensions
            .iter()
            .map(|ext| ext.name().to_string())
            .collect()
    }

    /// Number of registered extensions
    #[must_use]
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Check if no extensions are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Deliver the ready event to every extension
    pub async fn dispatch_ready(&self, session: &Arc<Session>) {
        for ext in &self.extensions {
            isolate(ext.name(), "ready", ext.on_ready(session)).await;
        }
    }

    /// Deliver a message to every extension, then run matching commands
    ///
    /// Each extension sees the raw message first. If the message is
    /// addressed to the bot, every command of that extension whose name
    /// matches runs once, provided the author passes its permission check.
    pub async fn dispatch_message(&self, message: &IncomingMessage, session: &Arc<Session>) {
        let parsed = parse_command(&message.content, |token| session.is_self_mention(token));

        for ext in &self.extensions {
            isolate(ext.name(), "message", ext.on_message(message, session)).await;

            let Some(parsed) = parsed.as_ref() else {
                continue;
            };

            for command in ext.commands().iter().filter(|c| c.name() == parsed.name) {
                if !check_permission(session.transport().as_ref(), message, command.permission())
                    .await
                {
                    tracing::debug!(
                        extension = ext.name(),
                        command = command.name(),
                        user = %message.author.id,
                        "permission denied"
                    );
                    continue;
                }

                tracing::debug!(
                    extension = ext.name(),
                    command = command.name(),
                    user = %message.author.id,
                    "invoking command"
                );
                let invocation = Invocation {
                    args: parsed.args.clone(),
                    message: message.clone(),
                    session: Arc::clone(session),
                };
                isolate(ext.name(), "command", command.call(invocation)).await;
            }
        }
    }

    /// Deliver a reaction to every extension
    ///
    /// Reactions from bot accounts are dropped.
    pub async fn dispatch_reaction(
        &self,
        reaction: &ReactionEvent,
        actor: &User,
        session: &Arc<Session>,
    ) {
        if actor.is_bot {
            return;
        }

        for ext in &self.extensions {
            isolate(ext.name(), "reaction", ext.on_reaction(reaction, actor, session)).await;
        }
    }
}

/// Run one handler, logging its error or panic instead of propagating it
async fn isolate<F>(extension: &str, event: &'static str, handler: F)
where
    F: Future<Output = Result<()>>,
{
    match AssertUnwindSafe(handler).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(extension, event, error = %e, "extension handler failed");
        }
        Err(_) => {
            tracing::error!(extension, event, "extension handler panicked");
        }
    }
}
