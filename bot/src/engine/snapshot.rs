use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::store::models::{GuildSettings, UserSettings};

use super::events::{GuildMember, MemberId};

/// Avatar size requested for every tracked member.
pub const CANONICAL_AVATAR_SIZE: u32 = 512;

const CDN_BASE: &str = "https://cdn.discordapp.com";

/// One avatar image to export: `{pixel_size}.png` fetched from `source_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarRef {
    #[serde(rename = "size")]
    pub pixel_size: u32,
    #[serde(rename = "url")]
    pub source_url: String,
}

/// Exported data for one tracked member. Serialized as `user.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: MemberId,
    pub priority: i64,
    #[serde(rename = "discord")]
    pub handle: String,
    /// Every recognized platform, empty string when the member set none.
    #[serde(rename = "socials")]
    pub linked_accounts: BTreeMap<String, String>,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "avatarURLs")]
    pub avatar_refs: Vec<AvatarRef>,
}

impl Snapshot {
    /// Build the snapshot for `member` from the current configuration.
    ///
    /// Missing guild or user settings fall back to defaults.
    pub fn build(
        member: &GuildMember,
        guild: Option<&GuildSettings>,
        user: Option<&UserSettings>,
        platforms: &[String],
        avatar_sizes: &[u32],
    ) -> Self {
        let linked_accounts = platforms
            .iter()
            .map(|platform| {
                let name = user
                    .and_then(|u| u.socials.get(platform))
                    .cloned()
                    .unwrap_or_default();
                (platform.clone(), name)
            })
            .collect();

        Self {
            id: member.id.clone(),
            priority: guild.map(|g| g.priority_of(&member.id)).unwrap_or(0),
            handle: member.tag(),
            linked_accounts,
            display_name: member.display_name().to_string(),
            avatar_refs: avatar_sizes
                .iter()
                .map(|&size| AvatarRef {
                    pixel_size: size,
                    source_url: avatar_url(member, size),
                })
                .collect(),
        }
    }

    /// Serialized form written to `user.json`. Stable for equal snapshots.
    pub fn to_document(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Static PNG avatar URL for a member at the given size. Animated avatars
/// are exported as their first frame.
pub fn avatar_url(member: &GuildMember, size: u32) -> String {
    match member.avatar.as_deref().filter(|h| !h.is_empty()) {
        Some(hash) => format!(
            "{CDN_BASE}/avatars/{}/{}.png?size={size}",
            member.id, hash
        ),
        None => format!(
            "{CDN_BASE}/embed/avatars/{}.png?size={size}",
            default_avatar_index(member)
        ),
    }
}

/// Index of the built-in avatar shown for accounts without a custom one.
fn default_avatar_index(member: &GuildMember) -> u64 {
    let legacy = member
        .discriminator
        .as_deref()
        .and_then(|d| d.parse::<u64>().ok())
        .filter(|&d| d != 0);
    match legacy {
        Some(discriminator) => discriminator % 5,
        None => member
            .id
            .parse::<u64>()
            .map(|id| (id >> 22) % 6)
            .unwrap_or(0),
    }
}
