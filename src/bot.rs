//! The bot: a session plus its registered extensions

use std::sync::Arc;

use crate::channels::{IncomingMessage, ReactionEvent, User};
use crate::extensions::{Extension, ExtensionRegistry};
use crate::session::Session;
use crate::Result;

/// A session and the extensions listening to it
#[derive(Debug)]
pub struct Bot {
    session: Arc<Session>,
    extensions: ExtensionRegistry,
}

impl Bot {
    /// Create a bot with no extensions
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session: Arc::new(session),
            extensions: ExtensionRegistry::new(),
        }
    }

    /// Register an extension; events reach extensions in registration order
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the extension is unnamed or already registered
    pub fn register(&mut self, extension: Box<dyn Extension>) -> Result<()> {
        self.extensions.register(extension)
    }

    /// The bot session
    #[must_use]
    pub const fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Registered extensions
    #[must_use]
    pub const fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    /// Handle the gateway ready event
    pub async fn ready(&self, user_id: &str) {
        self.session.set_user_id(user_id);
        tracing::info!(
            name = %self.session.display_name(),
            user_id,
            extensions = ?self.extensions.names(),
            "session ready"
        );
        self.extensions.dispatch_ready(&self.session).await;
    }

    /// Handle an incoming message
    pub async fn message(&self, message: IncomingMessage) {
        self.extensions.dispatch_message(&message, &self.session).await;
    }

    /// Handle an added reaction
    pub async fn reaction(&self, reaction: ReactionEvent, actor: User) {
        self.extensions
            .dispatch_reaction(&reaction, &actor, &self.session)
            .await;
    }
}
