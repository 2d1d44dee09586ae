pub mod avatar;
pub mod reconcile;
pub mod writer;

use std::collections::BTreeMap;

use crate::engine::events::MemberId;
use crate::engine::snapshot::Snapshot;

use reconcile::{SlotAssignment, SlotPlan};
use writer::{OutputWriter, WriteReport};

/// Reconcile one guild: rank its members, diff each slot against what is on
/// disk, and write the differences.
///
/// Slots beyond the current member count are left untouched on disk.
pub async fn sync_guild(
    writer: &OutputWriter,
    guild_id: &str,
    members: &BTreeMap<MemberId, Snapshot>,
) -> WriteReport {
    let assignment = SlotAssignment::assign(members);

    let mut plans = Vec::new();
    for (index, snapshot) in assignment.iter() {
        let prior = writer.read_prior(guild_id, index).await;
        let plan = SlotPlan::diff(index, snapshot, prior.as_ref());
        if !plan.is_clean() {
            plans.push(plan);
        }
    }

    if plans.is_empty() {
        return WriteReport::default();
    }
    writer.write_guild(guild_id, &plans).await
}
