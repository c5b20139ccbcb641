//! Commands and command parsing
//!
//! A command is addressed to the bot as `<@bot> !name free text`: the
//! mention token, then the name behind a one-character prefix, then the
//! argument text.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use super::Permission;
use crate::channels::IncomingMessage;
use crate::session::Session;
use crate::Result;

/// Everything a command action receives
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Argument text (tokens after the command name, single-space joined)
    pub args: String,

    /// The message that carried the command
    pub message: IncomingMessage,

    /// The bot session
    pub session: Arc<Session>,
}

/// Future returned by a command action
pub type ActionFuture = BoxFuture<'static, Result<()>>;

/// Behavior bound to a command name
pub trait CommandAction: Send + Sync {
    /// Run the action
    fn call(&self, invocation: Invocation) -> ActionFuture;
}

impl<F> CommandAction for F
where
    F: Fn(Invocation) -> ActionFuture + Send + Sync,
{
    fn call(&self, invocation: Invocation) -> ActionFuture {
        self(invocation)
    }
}

/// An immutable `{name, permission, action}` entry
#[derive(Clone)]
pub struct Command {
    name: String,
    permission: Permission,
    action: Arc<dyn CommandAction>,
}

impl Command {
    /// Create a command
    pub fn new(
        name: impl Into<String>,
        permission: Permission,
        action: impl CommandAction + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            permission,
            action: Arc::new(action),
        }
    }

    /// Command name (without prefix)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Permission required to invoke
    #[must_use]
    pub const fn permission(&self) -> &Permission {
        &self.permission
    }

    /// Invoke the action
    #[must_use]
    pub fn call(&self, invocation: Invocation) -> ActionFuture {
        self.action.call(invocation)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("permission", &self.permission)
            .finish_non_exhaustive()
    }
}

/// A message addressed to the bot as a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    /// Command name with the prefix character removed
    pub name: &'a str,

    /// Remaining tokens joined with single spaces
    pub args: String,
}

/// Parse `content` as a command addressed to `is_self_mention`
///
/// Returns `None` for fewer than two tokens or when the first token is not
/// a mention of the bot.
pub fn parse_command<'a>(
    content: &'a str,
    is_self_mention: impl Fn(&str) -> bool,
) -> Option<ParsedCommand<'a>> {
    let mut tokens = content.split_whitespace();
    let mention = tokens.next()?;
    let command = tokens.next()?;

    if !is_self_mention(mention) {
        return None;
    }

    let mut chars = command.chars();
    chars.next();

    Some(ParsedCommand {
        name: chars.as_str(),
        args: tokens.collect::<Vec<_>>().join(" "),
    })
}
