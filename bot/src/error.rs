use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Failures of the persistence and output side of the tracker. Sources are
/// shared so an error can be both returned and sent to a waiting caller.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// The configuration document could not be read, parsed or written.
    /// Always fatal: continuing would let memory and disk diverge.
    #[error("configuration I/O failed for {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The configuration document exists but is not valid JSON for our schema.
    #[error("configuration at {path} is malformed: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// A slot artifact could not be written. Logged; other artifacts proceed.
    #[error("failed to write {path}: {source}")]
    SlotWrite {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// An avatar image could not be fetched or stored. Isolated to that file.
    #[error("avatar fetch from {url} failed: {reason}")]
    AvatarFetch { url: String, reason: String },

    /// The tracker task is gone (shut down or halted on a fatal error).
    #[error("tracker is not running")]
    TrackerClosed,
}

impl SyncError {
    /// Whether the process must stop instead of continuing with divergent state.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::ConfigIo { .. } | SyncError::ConfigParse { .. }
        )
    }
}

/// Rejected watch-target changes. Nothing is mutated when these are returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    #[error("Couldn't find a channel with the provided id.")]
    UnknownChannel,
    #[error("The provided channel isn't a voice channel.")]
    NotVoiceChannel,
    #[error("This guild isn't available right now.")]
    UnknownGuild,
}
