//! Bot session: credentials, identity and the chat transport

use std::sync::{Arc, OnceLock};

use secrecy::{ExposeSecret, SecretString};

use crate::channels::Transport;
use crate::{Error, Result};

/// The authenticated bot
///
/// Created before connecting; the bot's own user id becomes known once
/// the gateway reports ready.
pub struct Session {
    token: SecretString,
    display_name: String,
    user_id: OnceLock<String>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("display_name", &self.display_name)
            .field("user_id", &self.user_id.get())
            .field("transport", &self.transport.name())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the token is empty
    pub fn new(
        token: SecretString,
        display_name: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        if token.expose_secret().trim().is_empty() {
            return Err(Error::Config("bot token is empty".to_string()));
        }

        Ok(Self {
            token,
            display_name: display_name.into(),
            user_id: OnceLock::new(),
            transport,
        })
    }

    /// Bot token
    #[must_use]
    pub const fn token(&self) -> &SecretString {
        &self.token
    }

    /// Display name
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Chat transport
    #[must_use]
    pub const fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// The bot's own user id, once ready
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.get().map(String::as_str)
    }

    /// Record the bot's own user id; later calls are ignored
    pub fn set_user_id(&self, id: impl Into<String>) {
        let id = id.into();
        if self.user_id.set(id.clone()).is_err() && self.user_id() != Some(id.as_str()) {
            tracing::warn!(id, "bot user id already set, ignoring");
        }
    }

    /// Whether `token` is a mention of the bot (`<@id>` or `<@!id>`)
    #[must_use]
    pub fn is_self_mention(&self, token: &str) -> bool {
        let Some(id) = self.user_id() else {
            return false;
        };

        token
            .strip_prefix("<@")
            .and_then(|rest| rest.strip_suffix('>'))
            .map(|inner| inner.strip_prefix('!').unwrap_or(inner))
            .is_some_and(|inner| inner == id)
    }

    /// Whether `user_id` is the bot itself
    #[must_use]
    pub fn is_self(&self, user_id: &str) -> bool {
        self.user_id() == Some(user_id)
    }
}
