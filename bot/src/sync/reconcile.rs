//! Slot assignment and per-field diffing between in-memory snapshots and
//! what was last written to disk.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::engine::events::MemberId;
use crate::engine::snapshot::{AvatarRef, Snapshot};

/// Rank-ordered snapshots for one pass. Index `n` is the `User{n}` directory.
///
/// A slot names "whoever currently ranks n", not a particular member: the
/// same member can land in a different slot on the next pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAssignment {
    slots: Vec<Snapshot>,
}

impl SlotAssignment {
    /// Order by descending priority; equal priorities by ascending member ID.
    pub fn assign(members: &BTreeMap<MemberId, Snapshot>) -> Self {
        let mut slots: Vec<Snapshot> = members.values().cloned().collect();
        slots.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        Self { slots }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Snapshot)> {
        self.slots.iter().enumerate()
    }

    pub fn member_ids(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.id.as_str()).collect()
    }
}

/// Last written state of a slot, parsed leniently from `user.json`.
/// Any field may be missing, in which case that field counts as changed.
#[derive(Debug, Default, Deserialize)]
pub struct PriorState {
    #[serde(skip)]
    raw: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    discord: Option<String>,
    #[serde(default)]
    socials: Option<BTreeMap<String, String>>,
    #[serde(default, rename = "avatarURLs")]
    avatar_urls: Option<Vec<AvatarRef>>,
}

impl PriorState {
    /// Parse a prior document. `None` when it is not a JSON object we can read.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut prior: PriorState = serde_json::from_str(raw).ok()?;
        prior.raw = raw.to_string();
        Some(prior)
    }
}

/// Which artifacts of one slot need rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPlan {
    pub index: usize,
    pub snapshot: Snapshot,
    pub document: bool,
    pub name: bool,
    pub handle: bool,
    /// Platforms whose `{platform}.txt` must be rewritten.
    pub platforms: Vec<String>,
    pub avatars: bool,
}

impl SlotPlan {
    /// Diff `snapshot` against the slot's prior state. Each artifact is gated
    /// only by its own field; no prior state means everything is written.
    pub fn diff(index: usize, snapshot: &Snapshot, prior: Option<&PriorState>) -> Self {
        let document = snapshot.to_document();
        let Some(prior) = prior else {
            return Self {
                index,
                snapshot: snapshot.clone(),
                document: true,
                name: true,
                handle: true,
                platforms: snapshot.linked_accounts.keys().cloned().collect(),
                avatars: true,
            };
        };

        let platforms = snapshot
            .linked_accounts
            .iter()
            .filter(|(platform, name)| {
                prior
                    .socials
                    .as_ref()
                    .and_then(|s| s.get(*platform))
                    .is_none_or(|old| old != *name)
            })
            .map(|(platform, _)| platform.clone())
            .collect();

        Self {
            index,
            snapshot: snapshot.clone(),
            document: prior.raw != document,
            name: prior.name.as_deref() != Some(snapshot.display_name.as_str()),
            handle: prior.discord.as_deref() != Some(snapshot.handle.as_str()),
            platforms,
            avatars: prior.avatar_urls.as_deref() != Some(snapshot.avatar_refs.as_slice()),
        }
    }

    /// True when nothing in this slot needs touching.
    pub fn is_clean(&self) -> bool {
        !self.document && !self.name && !self.handle && self.platforms.is_empty() && !self.avatars
    }
}
