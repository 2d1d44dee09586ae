use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::SyncError;

use super::models::{ConfigDocument, GuildSettings, UserSettings};

/// Owns the configuration document and its on-disk location.
///
/// There is exactly one per process; it lives inside the tracker task and is
/// never shared.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    doc: ConfigDocument,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>, doc: ConfigDocument) -> Self {
        Self {
            path: path.into(),
            doc,
        }
    }

    /// Load the document at `path`. A missing file yields the defaults; an
    /// unreadable or malformed one is an error.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let path = path.into();
        let doc = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| {
                SyncError::ConfigParse {
                    path: path.clone(),
                    source: Arc::new(source),
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no configuration found, using defaults");
                ConfigDocument::default()
            }
            Err(source) => {
                return Err(SyncError::ConfigIo {
                    path: path.clone(),
                    source: Arc::new(source),
                });
            }
        };
        Ok(Self { path, doc })
    }

    /// Write the whole document. The file is replaced via a sibling temp file
    /// so a reader never sees a truncated document.
    pub async fn save(&self) -> Result<(), SyncError> {
        let contents = serde_json::to_string_pretty(&self.doc).map_err(|e| SyncError::ConfigIo {
            path: self.path.clone(),
            source: Arc::new(std::io::Error::other(e)),
        })?;

        let tmp = temp_path(&self.path);
        let io_err = |source| SyncError::ConfigIo {
            path: self.path.clone(),
            source: Arc::new(source),
        };
        tokio::fs::write(&tmp, contents.as_bytes())
            .await
            .map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(io_err)?;

        debug!(path = %self.path.display(), "configuration saved");
        Ok(())
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.doc
    }

    /// Recognized social platforms, in configured order.
    pub fn platforms(&self) -> &[String] {
        &self.doc.socials
    }

    pub fn is_platform(&self, platform: &str) -> bool {
        self.doc.socials.iter().any(|p| p == platform)
    }

    /// Prefix used outside guilds.
    pub fn default_prefix(&self) -> &str {
        &self.doc.defaults.guild.prefix
    }

    pub fn guild(&self, guild_id: &str) -> Option<&GuildSettings> {
        self.doc.guilds.get(guild_id)
    }

    /// Settings for a guild, creating them from the defaults template if absent.
    pub fn ensure_guild(&mut self, guild_id: &str) -> &mut GuildSettings {
        let template = &self.doc.defaults.guild;
        self.doc
            .guilds
            .entry(guild_id.to_string())
            .or_insert_with(|| template.clone())
    }

    pub fn remove_guild(&mut self, guild_id: &str) -> Option<GuildSettings> {
        self.doc.guilds.remove(guild_id)
    }

    /// Watched channel for a guild, if the guild has one configured.
    pub fn watched_channel(&self, guild_id: &str) -> Option<&str> {
        self.guild(guild_id)?.voice_channel.as_deref()
    }

    pub fn user(&self, user_id: &str) -> Option<&UserSettings> {
        self.doc.users.get(user_id)
    }

    /// Settings for a user, creating them from the defaults template if absent.
    pub fn ensure_user(&mut self, user_id: &str) -> &mut UserSettings {
        let template = &self.doc.defaults.user;
        self.doc
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| template.clone())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
