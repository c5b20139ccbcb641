//! Command permission checks

use std::fmt;

use crate::channels::{IncomingMessage, RoleLookup};

/// Permission required to invoke a command
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Anyone in a guild may invoke
    Any,
    /// Caller must hold a role with this exact name
    Role(String),
}

impl Permission {
    /// Require the named role
    #[must_use]
    pub fn role(name: impl Into<String>) -> Self {
        Self::Role(name.into())
    }

    /// Parse the `*` wildcard or a role name
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "*" => Self::Any,
            name => Self::Role(name.to_string()),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Role(name) => write!(f, "{name}"),
        }
    }
}

/// Check whether the author of `message` may use a command gated by `permission`
///
/// Messages without guild context (direct messages) are always denied.
/// Roles are looked up on every call, so grants and revocations apply to
/// the very next command. A failed lookup denies.
pub async fn check_permission<L>(lookup: &L, message: &IncomingMessage, permission: &Permission) -> bool
where
    L: RoleLookup + ?Sized,
{
    let Some(guild_id) = message.guild_id.as_deref() else {
        return false;
    };

    let required = match permission {
        Permission::Any => return true,
        Permission::Role(name) => name,
    };

    match lookup.role_names(guild_id, &message.author.id).await {
        Ok(roles) => roles.iter().any(|role| role == required),
        Err(e) => {
            tracing::warn!(
                guild_id,
                user = %message.author.id,
                error = %e,
                "role lookup failed, denying"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::channels::User;
    use crate::{Error, Result};

    #[derive(Default)]
    struct Roles {
        by_user: Mutex<HashMap<String, Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl RoleLookup for Roles {
        async fn role_names(&self, _guild_id: &str, user_id: &str) -> Result<Vec<String>> {
            if self.fail {
                return Err(Error::Transport("lookup failed".to_string()));
            }
            Ok(self
                .by_user
                .lock()
                .unwrap()
                .get(user_id)
                .cloned()
                .unwrap_or_default())
        }
    }

    fn message(guild: Option<&str>) -> IncomingMessage {
        IncomingMessage {
            id: "m1".to_string(),
            channel_id: "c1".to_string(),
            guild_id: guild.map(ToString::to_string),
            author: User::new("u1", "alice"),
            content: String::new(),
        }
    }

    #[test]
    fn test_parse_permission() {
        assert_eq!(Permission::parse("*"), Permission::Any);
        assert_eq!(Permission::parse("DJ"), Permission::role("DJ"));
        assert_eq!(Permission::role("DJ").to_string(), "DJ");
    }

    #[tokio::test]
    async fn test_direct_messages_are_denied() {
        let roles = Roles::default();
        assert!(!check_permission(&roles, &message(None), &Permission::Any).await);
    }

    #[tokio::test]
    async fn test_wildcard_grants_in_guild() {
        let roles = Roles::default();
        assert!(check_permission(&roles, &message(Some("g1")), &Permission::Any).await);
    }

    #[tokio::test]
    async fn test_role_lookup_is_live() {
        let roles = Roles::default();
        let msg = message(Some("g1"));
        let dj = Permission::role("DJ");

        assert!(!check_permission(&roles, &msg, &dj).await);

        roles
            .by_user
            .lock()
            .unwrap()
            .insert("u1".to_string(), vec!["DJ".to_string()]);
        assert!(check_permission(&roles, &msg, &dj).await);

        roles.by_user.lock().unwrap().clear();
        assert!(!check_permission(&roles, &msg, &dj).await);
    }

    #[tokio::test]
    async fn test_role_names_match_exactly() {
        let roles = Roles::default();
        roles
            .by_user
            .lock()
            .unwrap()
            .insert("u1".to_string(), vec!["dj".to_string(), "DJs".to_string()]);

        assert!(!check_permission(&roles, &message(Some("g1")), &Permission::role("DJ")).await);
    }

    #[tokio::test]
    async fn test_failed_lookup_denies() {
        let roles = Roles {
            fail: true,
            ..Roles::default()
        };

        assert!(!check_permission(&roles, &message(Some("g1")), &Permission::role("DJ")).await);
    }
}
