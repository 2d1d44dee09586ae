use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SyncError;
use crate::store::config_store::ConfigStore;
use crate::sync::reconcile::SlotAssignment;
use crate::sync::sync_guild;
use crate::sync::writer::{OutputWriter, WriteReport};

use super::commands::{self, CommandError, CommandKind, Invocation, REPLY_LIFETIME_SECS};
use super::directory::VoiceDirectory;
use super::events::{BridgeAction, EventResponse, GatewayEvent, GuildMember, GuildSnapshot, IncomingMessage};
use super::membership::{MembershipChange, MembershipState, ProfileChange};
use super::permissions::Permissions;
use super::rate_limiter::RateLimiter;
use super::validation;

/// Requests queued ahead of the tracker before senders wait.
pub const QUEUE_CAPACITY: usize = 256;

/// Throttle buckets idle this long are forgotten.
const IDLE_THROTTLE_EXPIRY: Duration = Duration::from_secs(600);

/// One occupied slot, as reported by the inspection endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotView {
    pub slot: usize,
    pub directory: String,
    pub member_id: String,
    pub priority: i64,
    pub name: String,
    pub handle: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackerStatus {
    pub guilds_watched: usize,
    pub members_tracked: usize,
    pub pending_downloads: usize,
    pub last_tick: Option<DateTime<Utc>>,
}

/// Work for the tracker task. Each request carries its own reply channel.
pub enum TrackerRequest {
    Event {
        event: GatewayEvent,
        reply: oneshot::Sender<EventResponse>,
    },
    Slots {
        guild_id: String,
        reply: oneshot::Sender<Option<Vec<SlotView>>>,
    },
    Status {
        reply: oneshot::Sender<TrackerStatus>,
    },
    Tick {
        reply: oneshot::Sender<Result<WriteReport, SyncError>>,
    },
}

/// Cloneable front door to the tracker task.
#[derive(Clone)]
pub struct TrackerHandle {
    tx: mpsc::Sender<TrackerRequest>,
}

impl TrackerHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> TrackerRequest,
    ) -> Result<T, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| SyncError::TrackerClosed)?;
        rx.await.map_err(|_| SyncError::TrackerClosed)
    }

    /// Apply a gateway event and return what the bridge should do in response.
    pub async fn dispatch(&self, event: GatewayEvent) -> Result<EventResponse, SyncError> {
        self.request(|reply| TrackerRequest::Event { event, reply })
            .await
    }

    pub async fn slots(&self, guild_id: &str) -> Result<Option<Vec<SlotView>>, SyncError> {
        let guild_id = guild_id.to_string();
        self.request(|reply| TrackerRequest::Slots { guild_id, reply })
            .await
    }

    pub async fn status(&self) -> Result<TrackerStatus, SyncError> {
        self.request(|reply| TrackerRequest::Status { reply }).await
    }

    /// Run a reconciliation pass now instead of waiting for the timer.
    pub async fn tick_now(&self) -> Result<WriteReport, SyncError> {
        self.request(|reply| TrackerRequest::Tick { reply }).await?
    }
}

/// Owns all mutable state: configuration, the voice directory, membership,
/// and the output writer. Runs as a single task, so events and
/// reconciliation ticks never interleave.
pub struct Tracker {
    config: ConfigStore,
    directory: VoiceDirectory,
    membership: MembershipState,
    writer: OutputWriter,
    /// Per-author command throttle (burst of 5, refill 1 per 2 seconds).
    command_limiter: RateLimiter,
    last_tick: Option<DateTime<Utc>>,
}

impl Tracker {
    pub fn new(config: ConfigStore, writer: OutputWriter, avatar_sizes: Vec<u32>) -> Self {
        Self {
            config,
            directory: VoiceDirectory::new(),
            membership: MembershipState::new(avatar_sizes),
            writer,
            command_limiter: RateLimiter::new(5, Duration::from_secs(2)),
            last_tick: None,
        }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn membership(&self) -> &MembershipState {
        &self.membership
    }

    pub fn writer(&self) -> &OutputWriter {
        &self.writer
    }

    // ── Event handling ──────────────────────────────────────────────

    /// Apply one gateway event. Events are applied in the order received.
    pub fn handle_event(&mut self, event: GatewayEvent) -> EventResponse {
        match event {
            GatewayEvent::Ready { guilds } => {
                for guild in &guilds {
                    self.load_guild(guild);
                }
                info!(guilds = guilds.len(), "gateway ready");
            }
            GatewayEvent::GuildCreate { guild } => self.load_guild(&guild),
            GatewayEvent::GuildDelete { guild_id } => {
                self.config.remove_guild(&guild_id);
                self.directory.remove_guild(&guild_id);
                self.membership.remove_guild(&guild_id);
                info!(%guild_id, "guild removed");
            }
            GatewayEvent::VoiceStateUpdate {
                guild_id,
                member,
                channel_id,
            } => self.voice_state_update(guild_id, member, channel_id),
            GatewayEvent::GuildMemberUpdate { guild_id, member } => {
                self.member_update(guild_id, member)
            }
            GatewayEvent::MessageCreate { message } => {
                return EventResponse {
                    actions: self.handle_message(&message),
                };
            }
        }
        EventResponse::default()
    }

    fn load_guild(&mut self, guild: &GuildSnapshot) {
        if !guild.available {
            debug!(guild_id = %guild.id, "skipping unavailable guild");
            return;
        }
        self.directory.load_guild(guild);
        self.config.ensure_guild(&guild.id);
        self.membership
            .rebuild(&guild.id, &self.directory, &self.config);
    }

    fn voice_state_update(
        &mut self,
        guild_id: String,
        member: GuildMember,
        channel_id: Option<String>,
    ) {
        let from = self
            .directory
            .guild_mut(&guild_id)
            .set_voice_channel(&member, channel_id.as_deref());
        let change = MembershipChange {
            guild_id,
            member,
            from,
            to: channel_id,
        };
        self.membership.apply(&change, &self.config);
    }

    fn member_update(&mut self, guild_id: String, member: GuildMember) {
        let previous = self.directory.guild_mut(&guild_id).update_member(&member);

        // Without a cached record, compare against what we are exporting.
        let (old_handle, old_display_name) = match previous {
            Some(old) => (old.tag(), old.display_name().to_string()),
            None => match self
                .membership
                .members(&guild_id)
                .and_then(|m| m.get(&member.id))
            {
                Some(snap) => (snap.handle.clone(), snap.display_name.clone()),
                None => return,
            },
        };

        let change = ProfileChange {
            guild_id,
            member_id: member.id.clone(),
            old_handle,
            new_handle: member.tag(),
            old_display_name,
            new_display_name: member.display_name().to_string(),
        };
        self.membership.on_profile_change(&change);
    }

    // ── Commands ────────────────────────────────────────────────────

    fn prefix_for(&self, guild_id: Option<&str>) -> String {
        guild_id
            .and_then(|g| self.config.guild(g))
            .map(|g| g.prefix.clone())
            .unwrap_or_else(|| self.config.default_prefix().to_string())
    }

    fn handle_message(&mut self, message: &IncomingMessage) -> Vec<BridgeAction> {
        if message.author_is_bot {
            return Vec::new();
        }

        let prefix = self.prefix_for(message.guild_id.as_deref());
        let Some(invocation) = Invocation::parse(&message.content, &prefix) else {
            return Vec::new();
        };

        if !self.command_limiter.check(&message.author.id) {
            warn!(author = %message.author.id, command = %invocation.name, "command throttled");
            return Vec::new();
        }

        let content = match self.run_command(message, &invocation, &prefix) {
            Ok(reply) => {
                info!(author = %message.author.id, command = %invocation.name, "command executed");
                reply
            }
            Err(e) => {
                debug!(author = %message.author.id, command = %invocation.name, error = %e, "command rejected");
                e.to_string()
            }
        };

        vec![
            BridgeAction::DeleteMessage {
                channel_id: message.channel_id.clone(),
                message_id: message.id.clone(),
            },
            BridgeAction::Reply {
                channel_id: message.channel_id.clone(),
                reply_to: message.id.clone(),
                content,
                delete_after_secs: Some(REPLY_LIFETIME_SECS),
            },
        ]
    }

    fn run_command(
        &mut self,
        message: &IncomingMessage,
        invocation: &Invocation,
        prefix: &str,
    ) -> Result<String, CommandError> {
        let cmd = commands::find(&invocation.name).ok_or_else(|| CommandError::NotFound {
            prefix: prefix.to_string(),
        })?;

        let guild_id = message.guild_id.as_deref();
        if cmd.guild_only && guild_id.is_none() {
            return Err(CommandError::GuildOnly);
        }
        if !Permissions::from_bits_retain(message.permissions).allows(cmd.permission) {
            return Err(CommandError::MissingPermission);
        }

        match cmd.kind {
            CommandKind::Help => Ok(commands::help_text(prefix, self.config.platforms())),
            CommandKind::Info => Ok(commands::info_text()),
            CommandKind::Watch => {
                let guild_id = guild_id.ok_or(CommandError::GuildOnly)?;
                let channel_id = match invocation.arg(0) {
                    Some(id) => id.to_string(),
                    None => message
                        .voice_channel_id
                        .clone()
                        .ok_or(CommandError::NotInVoice)?,
                };
                self.membership.set_watched_channel(
                    guild_id,
                    &channel_id,
                    &self.directory,
                    &mut self.config,
                )?;
                Ok("Voice Channel Updated.".into())
            }
            CommandKind::SetPriority => {
                let guild_id = guild_id.ok_or(CommandError::GuildOnly)?;
                let member_id = invocation.arg(0).ok_or(CommandError::MissingMember)?;
                let known = self
                    .directory
                    .guild(guild_id)
                    .is_some_and(|g| g.member(member_id).is_some());
                if !known {
                    return Err(CommandError::UnknownMember);
                }
                let priority = validation::parse_priority(invocation.arg(1).unwrap_or_default())
                    .map_err(CommandError::Invalid)?;

                self.config
                    .ensure_guild(guild_id)
                    .priority_list
                    .insert(member_id.to_string(), priority);
                info!(%guild_id, %member_id, priority, "priority set");
                Ok("Updated Priority List.".into())
            }
            CommandKind::SetPrefix => {
                let guild_id = guild_id.ok_or(CommandError::GuildOnly)?;
                let new_prefix = invocation.arg(0).unwrap_or_default();
                validation::validate_prefix(new_prefix).map_err(CommandError::Invalid)?;

                self.config.ensure_guild(guild_id).prefix = new_prefix.to_string();
                info!(%guild_id, prefix = %new_prefix, "prefix changed");
                Ok("Prefix Updated.".into())
            }
            CommandKind::SetSocial => {
                let platform = invocation.arg(0).ok_or(CommandError::MissingPlatform)?;
                let name = invocation.args.get(1..).unwrap_or_default().join(" ");
                validation::validate_social_name(&name).map_err(CommandError::Invalid)?;
                if !self.config.is_platform(platform) {
                    return Err(CommandError::UnknownPlatform);
                }

                self.config
                    .ensure_user(&message.author.id)
                    .socials
                    .insert(platform.to_string(), name);
                info!(author = %message.author.id, %platform, "social updated");
                Ok("Socials Updated.".into())
            }
        }
    }

    // ── Reconciliation ──────────────────────────────────────────────

    /// Persist configuration, then bring every watched guild's output tree in
    /// line with current membership. Only configuration failures are errors.
    pub async fn tick(&mut self) -> Result<WriteReport, SyncError> {
        self.config.save().await?;
        self.command_limiter.cleanup(IDLE_THROTTLE_EXPIRY);

        let mut report = WriteReport::default();
        for (guild_id, members) in self.membership.active_guilds() {
            report.merge(sync_guild(&self.writer, guild_id, members).await);
        }

        self.last_tick = Some(Utc::now());
        Ok(report)
    }

    pub fn slots(&self, guild_id: &str) -> Option<Vec<SlotView>> {
        let members = self.membership.members(guild_id)?;
        let assignment = SlotAssignment::assign(members);
        Some(
            assignment
                .iter()
                .map(|(slot, snap)| SlotView {
                    slot,
                    directory: format!("User{slot}"),
                    member_id: snap.id.clone(),
                    priority: snap.priority,
                    name: snap.display_name.clone(),
                    handle: snap.handle.clone(),
                })
                .collect(),
        )
    }

    pub fn status(&self) -> TrackerStatus {
        let (guilds_watched, members_tracked) = self
            .membership
            .active_guilds()
            .fold((0, 0), |(g, m), (_, members)| (g + 1, m + members.len()));
        TrackerStatus {
            guilds_watched,
            members_tracked,
            pending_downloads: self.writer.pending_downloads(),
            last_tick: self.last_tick,
        }
    }

    // ── Task loop ───────────────────────────────────────────────────

    /// Start the tracker task.
    pub fn spawn(
        self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> (TrackerHandle, JoinHandle<Result<(), SyncError>>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let task = tokio::spawn(self.run(rx, interval, cancel));
        (TrackerHandle { tx }, task)
    }

    /// Serve requests and run a reconciliation tick every `interval` until
    /// cancelled or a fatal error occurs. The next tick is scheduled only
    /// after the previous one finishes.
    pub async fn run(
        mut self,
        rx: mpsc::Receiver<TrackerRequest>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Result<(), SyncError> {
        if let Err(e) = self.writer.ensure_root().await {
            warn!(error = %e, "cannot create output root");
        }

        let mut result = self.serve(rx, interval, &cancel).await;
        if result.is_ok() {
            // Flush whatever changed since the last tick.
            result = self.tick().await.map(|_| ());
        }
        if let Err(e) = &result {
            error!(error = %e, "tracker halted");
            cancel.cancel();
        }

        self.writer.shutdown().await;
        info!("tracker stopped");
        result
    }

    async fn serve(
        &mut self,
        mut rx: mpsc::Receiver<TrackerRequest>,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let mut next_tick = Instant::now() + interval;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                request = rx.recv() => {
                    let Some(request) = request else {
                        return Ok(());
                    };
                    self.handle_request(request).await?;
                }
                _ = tokio::time::sleep_until(next_tick) => {
                    match self.tick().await {
                        Ok(report) => debug!(files = report.files_written, downloads = report.downloads_started, "tick complete"),
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => warn!(error = %e, "tick failed"),
                    }
                    next_tick = Instant::now() + interval;
                }
            }
        }
    }

    async fn handle_request(&mut self, request: TrackerRequest) -> Result<(), SyncError> {
        match request {
            TrackerRequest::Event { event, reply } => {
                let _ = reply.send(self.handle_event(event));
            }
            TrackerRequest::Slots { guild_id, reply } => {
                let _ = reply.send(self.slots(&guild_id));
            }
            TrackerRequest::Status { reply } => {
                let _ = reply.send(self.status());
            }
            TrackerRequest::Tick { reply } => {
                let result = self.tick().await;
                let _ = reply.send(result.clone());
                if let Err(e) = result {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    warn!(error = %e, "tick failed");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::engine::events::{ChannelInfo, ChannelKind, VoiceState};
    use crate::store::models::ConfigDocument;
    use crate::sync::writer::tests::FakeFetcher;

    const GUILD: &str = "g1";
    const ADMIN: u64 = 1 << 3;

    fn member(id: &str) -> GuildMember {
        GuildMember {
            id: id.into(),
            username: format!("user{id}"),
            discriminator: None,
            nickname: None,
            avatar: None,
        }
    }

    fn guild() -> GuildSnapshot {
        GuildSnapshot {
            id: GUILD.into(),
            available: true,
            channels: vec![
                ChannelInfo {
                    id: "w".into(),
                    name: "Stream".into(),
                    kind: ChannelKind::Voice,
                },
                ChannelInfo {
                    id: "lobby".into(),
                    name: "Lobby".into(),
                    kind: ChannelKind::Voice,
                },
                ChannelInfo {
                    id: "text".into(),
                    name: "general".into(),
                    kind: ChannelKind::Text,
                },
            ],
            members: vec![member("1"), member("2"), member("3")],
            voice_states: vec![
                VoiceState {
                    member_id: "1".into(),
                    channel_id: "w".into(),
                },
                VoiceState {
                    member_id: "3".into(),
                    channel_id: "lobby".into(),
                },
            ],
        }
    }

    fn tracker(dir: &TempDir) -> Tracker {
        tracker_with(dir, FakeFetcher::default())
    }

    fn tracker_with(dir: &TempDir, fetcher: FakeFetcher) -> Tracker {
        let config = ConfigStore::new(dir.path().join("config.json"), ConfigDocument::default());
        let writer = OutputWriter::new(dir.path().join("Output"), Arc::new(fetcher));
        Tracker::new(config, writer, vec![512])
    }

    fn message(content: &str, permissions: u64) -> IncomingMessage {
        IncomingMessage {
            id: "m1".into(),
            channel_id: "text".into(),
            guild_id: Some(GUILD.into()),
            author: member("1"),
            author_is_bot: false,
            permissions,
            content: content.into(),
            voice_channel_id: None,
        }
    }

    fn reply_of(response: &EventResponse) -> Option<&str> {
        response.actions.iter().find_map(|a| match a {
            BridgeAction::Reply { content, .. } => Some(content.as_str()),
            _ => None,
        })
    }

    fn send(tracker: &mut Tracker, msg: IncomingMessage) -> EventResponse {
        tracker.handle_event(GatewayEvent::MessageCreate { message: msg })
    }

    #[test]
    fn test_ready_registers_guild_settings() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);
        tracker.handle_event(GatewayEvent::Ready {
            guilds: vec![guild()],
        });
        assert_eq!(tracker.config().guild(GUILD).unwrap().prefix, "~");
        assert!(tracker.membership().members(GUILD).is_none());
    }

    #[test]
    fn test_ready_rebuilds_watched_guild() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);
        tracker.config.ensure_guild(GUILD).voice_channel = Some("w".into());
        tracker.handle_event(GatewayEvent::Ready {
            guilds: vec![guild()],
        });
        assert!(tracker.membership().contains(GUILD, "1"));
        assert!(!tracker.membership().contains(GUILD, "3"));
    }

    #[test]
    fn test_unavailable_guild_skipped() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);
        let mut g = guild();
        g.available = false;
        tracker.handle_event(GatewayEvent::GuildCreate { guild: g });
        assert!(tracker.config().guild(GUILD).is_none());
    }

    #[test]
    fn test_guild_delete_drops_everything() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);
        tracker.config.ensure_guild(GUILD).voice_channel = Some("w".into());
        tracker.handle_event(GatewayEvent::GuildCreate { guild: guild() });
        tracker.handle_event(GatewayEvent::GuildDelete {
            guild_id: GUILD.into(),
        });
        assert!(tracker.config().guild(GUILD).is_none());
        assert!(tracker.membership().members(GUILD).is_none());
        assert!(tracker.directory.guild(GUILD).is_none());
    }

    #[test]
    fn test_voice_updates_use_cached_previous_channel() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);
        tracker.config.ensure_guild(GUILD).voice_channel = Some("w".into());
        tracker.handle_event(GatewayEvent::GuildCreate { guild: guild() });

        // 3 moves lobby -> w.
        tracker.handle_event(GatewayEvent::VoiceStateUpdate {
            guild_id: GUILD.into(),
            member: member("3"),
            channel_id: Some("w".into()),
        });
        assert!(tracker.membership().contains(GUILD, "3"));

        // 1 disconnects from w.
        tracker.handle_event(GatewayEvent::VoiceStateUpdate {
            guild_id: GUILD.into(),
            member: member("1"),
            channel_id: None,
        });
        assert!(!tracker.membership().contains(GUILD, "1"));

        // 2 joins lobby: not tracked.
        tracker.handle_event(GatewayEvent::VoiceStateUpdate {
            guild_id: GUILD.into(),
            member: member("2"),
            channel_id: Some("lobby".into()),
        });
        assert!(!tracker.membership().contains(GUILD, "2"));
    }

    #[test]
    fn test_member_update_renames_tracked_member() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);
        tracker.config.ensure_guild(GUILD).voice_channel = Some("w".into());
        tracker.handle_event(GatewayEvent::GuildCreate { guild: guild() });

        let mut renamed = member("1");
        renamed.nickname = Some("Host".into());
        tracker.handle_event(GatewayEvent::GuildMemberUpdate {
            guild_id: GUILD.into(),
            member: renamed,
        });

        let snap = &tracker.membership().members(GUILD).unwrap()["1"];
        assert_eq!(snap.display_name, "Host");
        assert_eq!(snap.handle, "user1");
    }

    #[test]
    fn test_watch_command() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);
        tracker.handle_event(GatewayEvent::GuildCreate { guild: guild() });

        let response = send(&mut tracker, message("~watch w", ADMIN));
        assert_eq!(reply_of(&response), Some("Voice Channel Updated."));
        assert!(matches!(
            response.actions[0],
            BridgeAction::DeleteMessage { .. }
        ));
        assert_eq!(tracker.config().watched_channel(GUILD), Some("w"));
        assert!(tracker.membership().contains(GUILD, "1"));
    }

    #[test]
    fn test_watch_uses_author_voice_channel() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);
        tracker.handle_event(GatewayEvent::GuildCreate { guild: guild() });

        let response = send(&mut tracker, message("~watch", ADMIN));
        assert_eq!(
            reply_of(&response),
            Some("Either Provide a VoiceChannelId or use this while in Voice Channel.")
        );

        let mut msg = message("~watch", ADMIN);
        msg.voice_channel_id = Some("lobby".into());
        send(&mut tracker, msg);
        assert_eq!(tracker.config().watched_channel(GUILD), Some("lobby"));
        assert!(tracker.membership().contains(GUILD, "3"));
    }

    #[test]
    fn test_watch_rejections() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);
        tracker.handle_event(GatewayEvent::GuildCreate { guild: guild() });

        let r = send(&mut tracker, message("~watch text", ADMIN));
        assert_eq!(reply_of(&r), Some("The provided channel isn't a voice channel."));
        let r = send(&mut tracker, message("~watch nope", ADMIN));
        assert_eq!(reply_of(&r), Some("Couldn't find a channel with the provided id."));
        let r = send(&mut tracker, message("~watch w", 0));
        assert_eq!(reply_of(&r), Some("You don't have permission to run this command."));
        assert!(tracker.config().watched_channel(GUILD).is_none());
    }

    #[test]
    fn test_setpriority_command() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);
        tracker.handle_event(GatewayEvent::GuildCreate { guild: guild() });

        let r = send(&mut tracker, message("~setpriority 2 10", ADMIN));
        assert_eq!(reply_of(&r), Some("Updated Priority List."));
        assert_eq!(tracker.config().guild(GUILD).unwrap().priority_of("2"), 10);

        let r = send(&mut tracker, message("~setpriority 99 10", ADMIN));
        assert_eq!(reply_of(&r), Some("Couldn't find a member with the provided id."));
        let r = send(&mut tracker, message("~setpriority 2 high", ADMIN));
        assert_eq!(reply_of(&r), Some("Please provide a valid priority."));
        let r = send(&mut tracker, message("~setpriority", ADMIN));
        assert_eq!(reply_of(&r), Some("Please provide a valid MemberId."));
        assert_eq!(tracker.config().guild(GUILD).unwrap().priority_of("2"), 10);
    }

    #[test]
    fn test_setprefix_command() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);
        tracker.handle_event(GatewayEvent::GuildCreate { guild: guild() });

        send(&mut tracker, message("~setprefix !", ADMIN));
        assert_eq!(tracker.config().guild(GUILD).unwrap().prefix, "!");

        // Old prefix no longer matches.
        assert!(send(&mut tracker, message("~help", 0)).actions.is_empty());
        let r = send(&mut tracker, message("!setprefix", ADMIN));
        assert_eq!(reply_of(&r), Some("Please provide a valid Prefix."));
    }

    #[test]
    fn test_setsocial_command_in_dm() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);

        let mut msg = message("~setsocial twitch Big Streamer", 0);
        msg.guild_id = None;
        let r = send(&mut tracker, msg);
        assert_eq!(reply_of(&r), Some("Socials Updated."));
        assert_eq!(
            tracker.config().user("1").unwrap().socials["twitch"],
            "Big Streamer"
        );

        let mut msg = message("~setsocial myspace tom", 0);
        msg.guild_id = None;
        assert_eq!(reply_of(&send(&mut tracker, msg)), Some("Invalid Platform provided."));

        let mut msg = message("~setsocial twitch", 0);
        msg.guild_id = None;
        assert_eq!(reply_of(&send(&mut tracker, msg)), Some("Please provide a valid Name"));

        let mut msg = message("~help", 0);
        msg.guild_id = None;
        assert_eq!(
            reply_of(&send(&mut tracker, msg)),
            Some("This command can only be used in a guild text channel.")
        );
    }

    #[test]
    fn test_unknown_command_and_bots() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);
        tracker.handle_event(GatewayEvent::GuildCreate { guild: guild() });

        let r = send(&mut tracker, message("~dance", 0));
        assert_eq!(reply_of(&r), Some("Command not found, try ~help"));

        let mut msg = message("~help", 0);
        msg.author_is_bot = true;
        assert!(send(&mut tracker, msg).actions.is_empty());

        assert!(send(&mut tracker, message("hello there", 0)).actions.is_empty());
    }

    #[test]
    fn test_commands_throttled_per_author() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);
        tracker.handle_event(GatewayEvent::GuildCreate { guild: guild() });

        for _ in 0..5 {
            assert!(!send(&mut tracker, message("~info", 0)).actions.is_empty());
        }
        assert!(send(&mut tracker, message("~info", 0)).actions.is_empty());
    }

    #[tokio::test]
    async fn test_tick_persists_config() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);
        tracker.handle_event(GatewayEvent::GuildCreate { guild: guild() });

        let report = tracker.tick().await.unwrap();
        assert_eq!(report, WriteReport::default());
        assert!(dir.path().join("config.json").exists());
        assert!(tracker.status().last_tick.is_some());
    }

    #[tokio::test]
    async fn test_tick_fails_when_config_unwritable() {
        let dir = TempDir::new().unwrap();
        let config = ConfigStore::new(
            dir.path().join("missing").join("config.json"),
            ConfigDocument::default(),
        );
        let writer = OutputWriter::new(dir.path().join("Output"), Arc::new(FakeFetcher::default()));
        let mut tracker = Tracker::new(config, writer, vec![512]);

        let err = tracker.tick().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_slots_view() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);
        tracker
            .config
            .ensure_guild(GUILD)
            .priority_list
            .insert("3".into(), 5);
        tracker.config.ensure_guild(GUILD).voice_channel = Some("w".into());
        tracker.handle_event(GatewayEvent::GuildCreate { guild: guild() });
        tracker.handle_event(GatewayEvent::VoiceStateUpdate {
            guild_id: GUILD.into(),
            member: member("3"),
            channel_id: Some("w".into()),
        });

        let slots = tracker.slots(GUILD).unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].member_id, "3");
        assert_eq!(slots[0].directory, "User0");
        assert_eq!(slots[1].member_id, "1");
        assert!(tracker.slots("unknown").is_none());

        let status = tracker.status();
        assert_eq!(status.guilds_watched, 1);
        assert_eq!(status.members_tracked, 2);
    }

    #[tokio::test]
    async fn test_spawned_tracker_serves_requests() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        let cancel = CancellationToken::new();
        let (handle, task) = tracker.spawn(Duration::from_secs(3600), cancel.clone());

        handle
            .dispatch(GatewayEvent::GuildCreate { guild: guild() })
            .await
            .unwrap();
        let response = handle
            .dispatch(GatewayEvent::MessageCreate {
                message: message("~watch w", ADMIN),
            })
            .await
            .unwrap();
        assert_eq!(reply_of(&response), Some("Voice Channel Updated."));

        // user.json, name.txt, discord.txt and one file per default platform.
        let report = handle.tick_now().await.unwrap();
        assert_eq!(report.files_written, 7);
        assert_eq!(report.downloads_started, 1);
        assert_eq!(handle.slots(GUILD).await.unwrap().unwrap().len(), 1);

        cancel.cancel();
        task.await.unwrap().unwrap();
        assert!(matches!(
            handle.status().await,
            Err(SyncError::TrackerClosed)
        ));
        assert!(dir.path().join("Output/g1/User0/user.json").exists());
    }

    #[tokio::test]
    async fn test_shutdown_keeps_final_tick_downloads() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker_with(&dir, FakeFetcher::with_delay(Duration::from_millis(50)));
        tracker.config.ensure_guild(GUILD).voice_channel = Some("w".into());
        let cancel = CancellationToken::new();
        let (handle, task) = tracker.spawn(Duration::from_secs(3600), cancel.clone());

        let mut g = guild();
        g.members[0].avatar = Some("slowhash".into());
        handle
            .dispatch(GatewayEvent::GuildCreate { guild: g })
            .await
            .unwrap();

        // No tick has run yet: the final tick on cancel starts the download.
        cancel.cancel();
        task.await.unwrap().unwrap();

        let slot = dir.path().join("Output/g1/User0");
        assert!(slot.join("user.json").exists());
        let avatar = std::fs::read_to_string(slot.join("512.png")).unwrap();
        assert!(avatar.contains("slowhash"));
    }

    #[tokio::test]
    async fn test_tick_now_returns_typed_error() {
        let dir = TempDir::new().unwrap();
        let config = ConfigStore::new(
            dir.path().join("missing").join("config.json"),
            ConfigDocument::default(),
        );
        let writer = OutputWriter::new(dir.path().join("Output"), Arc::new(FakeFetcher::default()));
        let cancel = CancellationToken::new();
        let (handle, task) = Tracker::new(config, writer, vec![512])
            .spawn(Duration::from_secs(3600), cancel.clone());

        let err = handle.tick_now().await.unwrap_err();
        assert!(matches!(err, SyncError::ConfigIo { .. }));

        // A configuration failure halts the tracker with the same error.
        let halted = task.await.unwrap().unwrap_err();
        assert!(matches!(halted, SyncError::ConfigIo { .. }));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_ticks_without_requests() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        let cancel = CancellationToken::new();
        let (handle, task) = tracker.spawn(Duration::from_secs(5), cancel.clone());

        assert!(handle.status().await.unwrap().last_tick.is_none());
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(handle.status().await.unwrap().last_tick.is_some());

        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
