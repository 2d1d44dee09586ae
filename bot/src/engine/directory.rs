use std::collections::HashMap;

use super::events::{ChannelId, ChannelInfo, GuildId, GuildMember, GuildSnapshot, MemberId};

/// Cached view of one guild: its channels, its members, and where each
/// member currently sits in voice.
#[derive(Debug, Default)]
pub struct GuildDirectory {
    pub id: GuildId,
    pub channels: HashMap<ChannelId, ChannelInfo>,
    pub members: HashMap<MemberId, GuildMember>,
    /// Member ID -> voice channel they occupy.
    pub voice: HashMap<MemberId, ChannelId>,
}

impl GuildDirectory {
    pub fn from_snapshot(snapshot: &GuildSnapshot) -> Self {
        let mut dir = Self {
            id: snapshot.id.clone(),
            ..Self::default()
        };
        for channel in &snapshot.channels {
            dir.channels.insert(channel.id.clone(), channel.clone());
        }
        for member in &snapshot.members {
            dir.members.insert(member.id.clone(), member.clone());
        }
        for state in &snapshot.voice_states {
            dir.voice
                .insert(state.member_id.clone(), state.channel_id.clone());
        }
        dir
    }

    pub fn channel(&self, channel_id: &str) -> Option<&ChannelInfo> {
        self.channels.get(channel_id)
    }

    pub fn member(&self, member_id: &str) -> Option<&GuildMember> {
        self.members.get(member_id)
    }

    /// Members currently in `channel_id`, ordered by member ID.
    pub fn occupants(&self, channel_id: &str) -> Vec<&GuildMember> {
        let mut occupants: Vec<&GuildMember> = self
            .voice
            .iter()
            .filter(|(_, ch)| ch.as_str() == channel_id)
            .filter_map(|(member_id, _)| self.members.get(member_id))
            .collect();
        occupants.sort_by(|a, b| a.id.cmp(&b.id));
        occupants
    }

    /// Record a voice-state change and return the channel the member was in before.
    pub fn set_voice_channel(
        &mut self,
        member: &GuildMember,
        channel_id: Option<&str>,
    ) -> Option<ChannelId> {
        self.members.insert(member.id.clone(), member.clone());
        match channel_id {
            Some(ch) => self.voice.insert(member.id.clone(), ch.to_string()),
            None => self.voice.remove(&member.id),
        }
    }

    /// Replace the cached member and return the previous record, if any.
    pub fn update_member(&mut self, member: &GuildMember) -> Option<GuildMember> {
        self.members.insert(member.id.clone(), member.clone())
    }
}

/// Directory of every guild the bridge has told us about.
#[derive(Debug, Default)]
pub struct VoiceDirectory {
    guilds: HashMap<GuildId, GuildDirectory>,
}

impl VoiceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything known about a guild with a fresh snapshot.
    pub fn load_guild(&mut self, snapshot: &GuildSnapshot) {
        self.guilds
            .insert(snapshot.id.clone(), GuildDirectory::from_snapshot(snapshot));
    }

    pub fn remove_guild(&mut self, guild_id: &str) -> Option<GuildDirectory> {
        self.guilds.remove(guild_id)
    }

    pub fn guild(&self, guild_id: &str) -> Option<&GuildDirectory> {
        self.guilds.get(guild_id)
    }

    /// Mutable access, creating an empty entry for guilds seen only through events.
    pub fn guild_mut(&mut self, guild_id: &str) -> &mut GuildDirectory {
        self.guilds
            .entry(guild_id.to_string())
            .or_insert_with(|| GuildDirectory {
                id: guild_id.to_string(),
                ..GuildDirectory::default()
            })
    }

    pub fn guild_ids(&self) -> impl Iterator<Item = &GuildId> {
        self.guilds.keys()
    }
}
