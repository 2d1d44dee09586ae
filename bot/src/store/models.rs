use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::events::{ChannelId, GuildId, MemberId};

/// Social platforms recognized when no configuration exists yet.
pub const DEFAULT_PLATFORMS: &[&str] = &["twitch", "twitter", "youtube", "instagram"];

/// Command prefix for new guilds and direct messages.
pub const DEFAULT_PREFIX: &str = "~";

/// The persisted configuration document (`config.json`).
///
/// Key casing matches the files deployments already have on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigDocument {
    #[serde(default)]
    pub defaults: Defaults,
    /// Platforms that get a `{platform}.txt` file for every tracked member.
    #[serde(default = "default_platforms")]
    pub socials: Vec<String>,
    #[serde(default)]
    pub guilds: BTreeMap<GuildId, GuildSettings>,
    #[serde(default)]
    pub users: BTreeMap<MemberId, UserSettings>,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            defaults: Defaults::default(),
            socials: default_platforms(),
            guilds: BTreeMap::new(),
            users: BTreeMap::new(),
        }
    }
}

fn default_platforms() -> Vec<String> {
    DEFAULT_PLATFORMS.iter().map(|p| p.to_string()).collect()
}

/// Templates cloned into new guild and user entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Defaults {
    #[serde(default)]
    pub guild: GuildSettings,
    #[serde(default)]
    pub user: UserSettings,
}

/// Per-guild settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GuildSettings {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Voice channel whose occupants are exported. `None` = not watching.
    #[serde(default)]
    pub voice_channel: Option<ChannelId>,
    #[serde(default)]
    pub priority_list: BTreeMap<MemberId, i64>,
}

impl Default for GuildSettings {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            voice_channel: None,
            priority_list: BTreeMap::new(),
        }
    }
}

impl GuildSettings {
    pub fn priority_of(&self, member_id: &str) -> i64 {
        self.priority_list.get(member_id).copied().unwrap_or(0)
    }
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

/// Per-user settings, shared across guilds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserSettings {
    #[serde(default)]
    pub socials: BTreeMap<String, String>,
}
