//! Dispatch context and the collaborators it is resolved from

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::channels::ChannelHandle;

/// Platform user identifier
pub type UserId = u64;

/// Platform guild (server) identifier
pub type GuildId = u64;

/// A guild the bot is listening in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildRef {
    pub id: GuildId,
    pub name: String,
}

/// A voice channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceChannelRef {
    pub id: u64,
    pub name: String,
}

/// The member who spoke the command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: UserId,
    pub name: String,

    /// Voice channel the member is currently in
    pub voice_channel: Option<VoiceChannelRef>,
}

impl Author {
    /// Discord-style mention
    #[must_use]
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

/// Permissions of the invoking member
///
/// Carried to handlers as-is; nothing in the dispatch path enforces it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PermissionView {
    /// Permission group name
    pub group: String,

    /// Commands the group may run; `None` allows everything
    pub allowed_commands: Option<HashSet<String>>,
}

/// Text command reconstructed from a voice command
#[derive(Debug, Clone)]
pub struct SyntheticMessage {
    /// e.g. `"!play 아이유"`
    pub content: String,
    pub channel_id: String,
    pub author: Author,
    pub guild: GuildRef,
}

/// Voice playback session in a guild
pub trait Player: Send + Sync + Debug {
    /// Guild the player belongs to
    fn guild_id(&self) -> GuildId;

    /// Voice channel the player is connected to
    fn voice_channel_id(&self) -> u64;
}

/// Shared player handle passed to handlers
pub type PlayerHandle = Arc<dyn Player>;

/// Looks up or creates a guild's player
#[async_trait]
pub trait PlayerResolver: Send + Sync {
    /// Get the player for the member's voice channel
    ///
    /// Fails with [`crate::Error::VoiceContextMissing`] when there is no
    /// voice context to play into.
    async fn resolve(
        &self,
        guild: &GuildRef,
        voice_channel: Option<&VoiceChannelRef>,
    ) -> Result<PlayerHandle>;

    /// Bring the bot into the author's voice channel
    async fn summon(&self, guild: &GuildRef, author: &Author) -> Result<()>;
}

/// Resolves speaker ids to members
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// Look up a member of `guild`
    async fn member(&self, guild: &GuildRef, user: UserId) -> Option<Author>;
}

/// Everything known about one command invocation
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub author: Author,
    pub channel: ChannelHandle,
    pub guild: GuildRef,
    pub permissions: Option<PermissionView>,
}

impl DispatchContext {
    /// Voice channel of the invoking member
    #[must_use]
    pub const fn voice_channel(&self) -> Option<&VoiceChannelRef> {
        self.author.voice_channel.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mention() {
        let author = Author {
            id: 42,
            name: "민지".to_string(),
            voice_channel: None,
        };
        assert_eq!(author.mention(), "<@42>");
    }
}
