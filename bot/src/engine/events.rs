use serde::{Deserialize, Serialize};

/// Guild (group) identifier as delivered by the gateway.
pub type GuildId = String;

/// Channel identifier.
pub type ChannelId = String;

/// Member / user identifier.
pub type MemberId = String;

/// Event forwarded by the gateway bridge. The bridge holds the actual chat
/// gateway connection; this process only sees these payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Initial state after the bridge connected: every guild it can see.
    Ready { guilds: Vec<GuildSnapshot> },

    /// The bot joined a guild, or a guild became available.
    GuildCreate { guild: GuildSnapshot },

    /// The bot was removed from a guild.
    GuildDelete { guild_id: GuildId },

    /// A member's voice state changed. `channel_id` is the member's channel
    /// after the change, `None` when they disconnected.
    VoiceStateUpdate {
        guild_id: GuildId,
        member: GuildMember,
        channel_id: Option<ChannelId>,
    },

    /// A member's profile (username, discriminator, nickname, avatar) changed.
    GuildMemberUpdate {
        guild_id: GuildId,
        member: GuildMember,
    },

    /// A text message was posted somewhere the bot can read.
    MessageCreate { message: IncomingMessage },
}

impl GatewayEvent {
    /// Wire name of the event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayEvent::Ready { .. } => "ready",
            GatewayEvent::GuildCreate { .. } => "guild_create",
            GatewayEvent::GuildDelete { .. } => "guild_delete",
            GatewayEvent::VoiceStateUpdate { .. } => "voice_state_update",
            GatewayEvent::GuildMemberUpdate { .. } => "guild_member_update",
            GatewayEvent::MessageCreate { .. } => "message_create",
        }
    }
}

/// A guild member as seen by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildMember {
    pub id: MemberId,
    pub username: String,
    /// Legacy four-digit discriminator. `None` or `"0"` for migrated accounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
    /// Guild-specific nickname.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// Avatar hash on the CDN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl GuildMember {
    /// Human-readable unique tag: `name#1234`, or just `name` for accounts
    /// without a legacy discriminator.
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some(d) if !d.is_empty() && d != "0" => format!("{}#{}", self.username, d),
            _ => self.username.clone(),
        }
    }

    /// Nickname if set, else the account username.
    pub fn display_name(&self) -> &str {
        self.nickname
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Text,
    Voice,
    Stage,
    Category,
    #[serde(other)]
    Other,
}

impl ChannelKind {
    /// Channels members can occupy.
    pub fn is_voice(self) -> bool {
        matches!(self, ChannelKind::Voice | ChannelKind::Stage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceState {
    pub member_id: MemberId,
    pub channel_id: ChannelId,
}

/// Full state of one guild, sent on `ready` and `guild_create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildSnapshot {
    pub id: GuildId,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub channels: Vec<ChannelInfo>,
    #[serde(default)]
    pub members: Vec<GuildMember>,
    #[serde(default)]
    pub voice_states: Vec<VoiceState>,
}

fn default_available() -> bool {
    true
}

/// A message that may carry a bot command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: String,
    pub channel_id: ChannelId,
    /// `None` for direct messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<GuildId>,
    pub author: GuildMember,
    #[serde(default)]
    pub author_is_bot: bool,
    /// Author's effective permission bits in the channel.
    #[serde(default)]
    pub permissions: u64,
    pub content: String,
    /// Voice channel the author currently occupies, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_channel_id: Option<ChannelId>,
}

/// Something the bridge should do on our behalf in the chat service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeAction {
    DeleteMessage {
        channel_id: ChannelId,
        message_id: String,
    },
    Reply {
        channel_id: ChannelId,
        reply_to: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        delete_after_secs: Option<u64>,
    },
}

/// Body returned to the bridge for every accepted event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventResponse {
    pub actions: Vec<BridgeAction>,
}
