//! Identity newtypes.
//!
//! Discord snowflakes are plain `u64`s on the wire; wrapping each kind in its
//! own type keeps a guild id from being passed where a user id is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Returns the raw snowflake value.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake!(
    /// A Discord guild (server).
    GuildId
);
snowflake!(
    /// A Discord user.
    UserId
);
snowflake!(
    /// A text or voice channel.
    ChannelId
);
snowflake!(
    /// A guild role.
    RoleId
);
snowflake!(
    /// A virtual pet owned by a guild member.
    PetId
);

/// A guild member: the user plus the guild they act in.
///
/// Used both as the actor that initiated an action and as the target an
/// action operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// The guild the member belongs to.
    pub guild: GuildId,
    /// The member's user id.
    pub user: UserId,
}

impl Identity {
    /// Creates a new member identity.
    pub fn new(guild: impl Into<GuildId>, user: impl Into<UserId>) -> Self {
        Self {
            guild: guild.into(),
            user: user.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.guild, self.user)
    }
}
