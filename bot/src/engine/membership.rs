use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use crate::error::WatchError;
use crate::store::config_store::ConfigStore;

use super::directory::VoiceDirectory;
use super::events::{ChannelId, GuildId, GuildMember, MemberId};
use super::snapshot::Snapshot;

/// A member's voice channel changed from `from` to `to` (either may be `None`).
#[derive(Debug, Clone)]
pub struct MembershipChange {
    pub guild_id: GuildId,
    pub member: GuildMember,
    pub from: Option<ChannelId>,
    pub to: Option<ChannelId>,
}

/// A member's handle and/or display name changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileChange {
    pub guild_id: GuildId,
    pub member_id: MemberId,
    pub old_handle: String,
    pub new_handle: String,
    pub old_display_name: String,
    pub new_display_name: String,
}

/// Who is in each guild's watched channel, as snapshots keyed by member ID.
///
/// A member appears here iff they currently occupy their guild's watched
/// channel. Every handler is a no-op for guilds without a watch target.
#[derive(Debug)]
pub struct MembershipState {
    guilds: HashMap<GuildId, BTreeMap<MemberId, Snapshot>>,
    avatar_sizes: Vec<u32>,
}

impl MembershipState {
    pub fn new(avatar_sizes: Vec<u32>) -> Self {
        Self {
            guilds: HashMap::new(),
            avatar_sizes,
        }
    }

    fn build(&self, guild_id: &str, member: &GuildMember, config: &ConfigStore) -> Snapshot {
        Snapshot::build(
            member,
            config.guild(guild_id),
            config.user(&member.id),
            config.platforms(),
            &self.avatar_sizes,
        )
    }

    /// Point a guild at a new voice channel and rebuild its membership from
    /// the channel's current occupants.
    pub fn set_watched_channel(
        &mut self,
        guild_id: &str,
        channel_id: &str,
        directory: &VoiceDirectory,
        config: &mut ConfigStore,
    ) -> Result<(), WatchError> {
        let guild = directory.guild(guild_id).ok_or(WatchError::UnknownGuild)?;
        let channel = guild
            .channel(channel_id)
            .ok_or(WatchError::UnknownChannel)?;
        if !channel.kind.is_voice() {
            return Err(WatchError::NotVoiceChannel);
        }

        config.ensure_guild(guild_id).voice_channel = Some(channel_id.to_string());
        self.rebuild(guild_id, directory, config);

        info!(%guild_id, %channel_id, channel = %channel.name, "watch target changed");
        Ok(())
    }

    /// Replace the guild's mapping with snapshots of everyone currently in its
    /// watched channel. The previous mapping is discarded entirely.
    pub fn rebuild(&mut self, guild_id: &str, directory: &VoiceDirectory, config: &ConfigStore) {
        let Some(channel_id) = config.watched_channel(guild_id) else {
            return;
        };

        let mut members = BTreeMap::new();
        if let Some(guild) = directory.guild(guild_id) {
            for member in guild.occupants(channel_id) {
                members.insert(member.id.clone(), self.build(guild_id, member, config));
            }
        }

        info!(%guild_id, %channel_id, count = members.len(), "membership rebuilt");
        self.guilds.insert(guild_id.to_string(), members);
    }

    /// Track `member` if `to` is the watched channel.
    pub fn on_join(
        &mut self,
        guild_id: &str,
        member: &GuildMember,
        to: Option<&str>,
        config: &ConfigStore,
    ) -> bool {
        let Some(watched) = config.watched_channel(guild_id) else {
            return false;
        };
        if to != Some(watched) {
            return false;
        }

        let snapshot = self.build(guild_id, member, config);
        self.guilds
            .entry(guild_id.to_string())
            .or_default()
            .insert(member.id.clone(), snapshot);
        info!(%guild_id, member_id = %member.id, name = %member.display_name(), "member joined watched channel");
        true
    }

    /// Stop tracking `member_id` if `from` is the watched channel.
    pub fn on_leave(
        &mut self,
        guild_id: &str,
        member_id: &str,
        from: Option<&str>,
        config: &ConfigStore,
    ) -> bool {
        let Some(watched) = config.watched_channel(guild_id) else {
            return false;
        };
        if from != Some(watched) {
            return false;
        }

        let removed = self
            .guilds
            .get_mut(guild_id)
            .and_then(|members| members.remove(member_id))
            .is_some();
        if removed {
            info!(%guild_id, %member_id, "member left watched channel");
        }
        removed
    }

    /// Leave `from`, then join `to`, both judged against the current watch target.
    pub fn on_move(
        &mut self,
        guild_id: &str,
        member: &GuildMember,
        from: Option<&str>,
        to: Option<&str>,
        config: &ConfigStore,
    ) -> bool {
        let left = self.on_leave(guild_id, &member.id, from, config);
        let joined = self.on_join(guild_id, member, to, config);
        left || joined
    }

    /// Apply a voice-state transition. Returns whether the mapping changed.
    pub fn apply(&mut self, change: &MembershipChange, config: &ConfigStore) -> bool {
        let from = change.from.as_deref();
        let to = change.to.as_deref();
        match (from, to) {
            (None, None) => false,
            (None, Some(_)) => self.on_join(&change.guild_id, &change.member, to, config),
            (Some(_), None) => self.on_leave(&change.guild_id, &change.member.id, from, config),
            (Some(a), Some(b)) if a == b => false,
            (Some(_), Some(_)) => {
                self.on_move(&change.guild_id, &change.member, from, to, config)
            }
        }
    }

    /// Patch the handle and display name of a tracked member in place.
    /// Priority, links and avatars keep their current values.
    pub fn on_profile_change(&mut self, change: &ProfileChange) -> bool {
        let Some(snapshot) = self
            .guilds
            .get_mut(&change.guild_id)
            .and_then(|members| members.get_mut(&change.member_id))
        else {
            return false;
        };

        let name_changed = change.old_display_name != change.new_display_name;
        let handle_changed = change.old_handle != change.new_handle;
        if !name_changed && !handle_changed {
            return false;
        }

        if name_changed {
            snapshot.display_name.clone_from(&change.new_display_name);
        }
        if handle_changed {
            snapshot.handle.clone_from(&change.new_handle);
        }
        debug!(
            guild_id = %change.guild_id,
            member_id = %change.member_id,
            name_changed,
            handle_changed,
            "tracked profile updated"
        );
        true
    }

    pub fn remove_guild(&mut self, guild_id: &str) {
        self.guilds.remove(guild_id);
    }

    pub fn members(&self, guild_id: &str) -> Option<&BTreeMap<MemberId, Snapshot>> {
        self.guilds.get(guild_id)
    }

    pub fn contains(&self, guild_id: &str, member_id: &str) -> bool {
        self.guilds
            .get(guild_id)
            .is_some_and(|members| members.contains_key(member_id))
    }

    /// Guilds with at least one tracked member.
    pub fn active_guilds(&self) -> impl Iterator<Item = (&GuildId, &BTreeMap<MemberId, Snapshot>)> {
        self.guilds.iter().filter(|(_, members)| !members.is_empty())
    }
}
