use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::SyncError;

use super::avatar::AvatarFetcher;
use super::reconcile::{PriorState, SlotPlan};

const DOCUMENT_FILE: &str = "user.json";
const NAME_FILE: &str = "name.txt";
const HANDLE_FILE: &str = "discord.txt";

/// What one call to [`OutputWriter::write_guild`] did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    /// Text files rewritten (`user.json`, `name.txt`, `discord.txt`, `{platform}.txt`).
    pub files_written: usize,
    /// Avatar downloads spawned. They complete after the call returns.
    pub downloads_started: usize,
    /// Text files that failed to write.
    pub failures: usize,
}

impl WriteReport {
    pub fn merge(&mut self, other: WriteReport) {
        self.files_written += other.files_written;
        self.downloads_started += other.downloads_started;
        self.failures += other.failures;
    }
}

/// How long shutdown waits for running avatar downloads before giving up.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Writes slot artifacts under `{root}/{guild}/User{n}/` and runs avatar
/// downloads as tracked background tasks.
pub struct OutputWriter {
    root: PathBuf,
    fetcher: Arc<dyn AvatarFetcher>,
    downloads: TaskTracker,
    next_generation: AtomicU64,
    /// Newest download generation per target file. Only that generation may
    /// replace the file.
    in_flight: Arc<Mutex<HashMap<PathBuf, u64>>>,
    /// Serializes the newest-check with the rename into place.
    commit: Arc<tokio::sync::Mutex<()>>,
}

impl OutputWriter {
    pub fn new(root: impl Into<PathBuf>, fetcher: Arc<dyn AvatarFetcher>) -> Self {
        Self {
            root: root.into(),
            fetcher,
            downloads: TaskTracker::new(),
            next_generation: AtomicU64::new(1),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            commit: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn guild_dir(&self, guild_id: &str) -> PathBuf {
        self.root.join(guild_id)
    }

    pub fn slot_dir(&self, guild_id: &str, index: usize) -> PathBuf {
        self.guild_dir(guild_id).join(format!("User{index}"))
    }

    /// Create the output root. No-op when it already exists.
    pub async fn ensure_root(&self) -> Result<(), SyncError> {
        ensure_dir(&self.root).await
    }

    /// Previously written state of a slot. Missing, unreadable, or corrupt
    /// documents all yield `None`, which makes the slot rewrite everything.
    pub async fn read_prior(&self, guild_id: &str, index: usize) -> Option<PriorState> {
        let path = self.slot_dir(guild_id, index).join(DOCUMENT_FILE);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable slot document, rewriting slot");
                return None;
            }
        };
        let prior = PriorState::parse(&raw);
        if prior.is_none() {
            warn!(path = %path.display(), "corrupt slot document, rewriting slot");
        }
        prior
    }

    /// Write every artifact the plans mark as changed. Failures are logged and
    /// counted; they never stop other files or other slots.
    pub async fn write_guild(&self, guild_id: &str, plans: &[SlotPlan]) -> WriteReport {
        let mut report = WriteReport::default();

        let guild_dir = self.guild_dir(guild_id);
        if let Err(e) = ensure_dir(&guild_dir).await {
            warn!(%guild_id, error = %e, "cannot create guild output directory");
            report.failures += 1;
            return report;
        }

        for plan in plans {
            let dir = self.slot_dir(guild_id, plan.index);
            if let Err(e) = ensure_dir(&dir).await {
                warn!(%guild_id, slot = plan.index, error = %e, "cannot create slot directory");
                report.failures += 1;
                continue;
            }
            self.write_slot(&dir, plan, &mut report).await;
        }

        if report.files_written > 0 || report.downloads_started > 0 {
            info!(
                %guild_id,
                slots = plans.len(),
                files = report.files_written,
                downloads = report.downloads_started,
                "output updated"
            );
        }
        report
    }

    async fn write_slot(&self, dir: &Path, plan: &SlotPlan, report: &mut WriteReport) {
        let snap = &plan.snapshot;

        if plan.document {
            write_text(&dir.join(DOCUMENT_FILE), &snap.to_document(), report).await;
        }
        if plan.name {
            write_text(&dir.join(NAME_FILE), &snap.display_name, report).await;
        }
        if plan.handle {
            write_text(&dir.join(HANDLE_FILE), &snap.handle, report).await;
        }
        for platform in &plan.platforms {
            let value = snap
                .linked_accounts
                .get(platform)
                .map(String::as_str)
                .unwrap_or_default();
            write_text(&dir.join(format!("{platform}.txt")), value, report).await;
        }
        if plan.avatars {
            for avatar in &snap.avatar_refs {
                let path = dir.join(format!("{}.png", avatar.pixel_size));
                self.spawn_download(avatar.source_url.clone(), path);
                report.downloads_started += 1;
            }
        }
    }

    /// Fetch `url` into `path` in the background. Not awaited by the caller.
    /// A later download for the same `path` supersedes this one.
    fn spawn_download(&self, url: String, path: PathBuf) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.insert(path.clone(), generation);
        }

        let fetch = self.fetcher.fetch(&url);
        let in_flight = self.in_flight.clone();
        let commit = self.commit.clone();
        self.downloads.spawn(async move {
            let bytes = match fetch.await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "avatar download failed");
                    release(&in_flight, &path, generation);
                    return;
                }
            };

            let part = part_path(&path, generation);
            if let Err(e) = tokio::fs::write(&part, &bytes).await {
                warn!(path = %part.display(), error = %e, "failed to store avatar");
                release(&in_flight, &path, generation);
                return;
            }

            let _commit = commit.lock().await;
            if !is_newest(&in_flight, &path, generation) {
                debug!(%url, path = %path.display(), "avatar download superseded");
                let _ = tokio::fs::remove_file(&part).await;
                return;
            }
            match tokio::fs::rename(&part, &path).await {
                Ok(()) => debug!(%url, path = %path.display(), "avatar saved"),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to store avatar");
                    let _ = tokio::fs::remove_file(&part).await;
                }
            }
            release(&in_flight, &path, generation);
        });
    }

    /// Downloads still running.
    pub fn pending_downloads(&self) -> usize {
        self.downloads.len()
    }

    /// Wait until every download spawned so far has finished, then accept new ones.
    pub async fn wait_for_downloads(&self) {
        self.downloads.close();
        self.downloads.wait().await;
        self.downloads.reopen();
    }

    /// Stop accepting downloads and let running ones finish, up to
    /// [`SHUTDOWN_GRACE`].
    pub async fn shutdown(&self) {
        self.downloads.close();
        let pending = self.downloads.len();
        if pending > 0 {
            info!(pending, "waiting for avatar downloads");
        }
        match tokio::time::timeout(SHUTDOWN_GRACE, self.downloads.wait()).await {
            Ok(()) => info!("avatar downloads finished"),
            Err(_) => warn!(
                pending = self.downloads.len(),
                "avatar downloads still running at shutdown"
            ),
        }
    }
}

fn is_newest(in_flight: &Mutex<HashMap<PathBuf, u64>>, path: &Path, generation: u64) -> bool {
    in_flight
        .lock()
        .map(|map| map.get(path) == Some(&generation))
        .unwrap_or(false)
}

/// Drop the in-flight entry for `path` if `generation` still owns it.
fn release(in_flight: &Mutex<HashMap<PathBuf, u64>>, path: &Path, generation: u64) {
    if let Ok(mut map) = in_flight.lock()
        && map.get(path) == Some(&generation)
    {
        map.remove(path);
    }
}

async fn ensure_dir(path: &Path) -> Result<(), SyncError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| SyncError::SlotWrite {
            path: path.to_path_buf(),
            source: Arc::new(source),
        })
}

async fn write_text(path: &Path, contents: &str, report: &mut WriteReport) {
    match tokio::fs::write(path, contents.as_bytes()).await {
        Ok(()) => {
            debug!(path = %path.display(), "wrote");
            report.files_written += 1;
        }
        Err(source) => {
            let err = SyncError::SlotWrite {
                path: path.to_path_buf(),
                source: Arc::new(source),
            };
            warn!(error = %err, "slot write failed");
            report.failures += 1;
        }
    }
}

/// Per-download sibling of `path`, so readers never see half an image and
/// concurrent downloads of one file never share a temp file.
fn part_path(path: &Path, generation: u64) -> PathBuf {
    let mut part = path.as_os_str().to_os_string();
    part.push(format!(".{generation}.part"));
    PathBuf::from(part)
}
