use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;
use tracing::info;

/// Top-level process settings, loaded from voiceinfo.toml.
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub bot: BotSection,
    pub sync: SyncSection,
}

#[derive(Deserialize)]
#[serde(default)]
pub struct BotSection {
    /// Shared secret the gateway bridge sends as `Authorization: Bot <token>`.
    pub token: String,
    pub listen_address: String,
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            token: String::new(),
            listen_address: "127.0.0.1:8087".into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct SyncSection {
    /// Seconds between reconciliation ticks.
    pub autosave_interval_secs: u64,
    pub output_dir: PathBuf,
    pub config_path: PathBuf,
    /// Avatar sizes downloaded into each slot, in pixels.
    pub avatar_sizes: Vec<u32>,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            autosave_interval_secs: 5,
            output_dir: "Output".into(),
            config_path: "config.json".into(),
            avatar_sizes: vec![512],
        }
    }
}

impl Settings {
    /// Load settings from a TOML file. Falls back to defaults if the file doesn't exist.
    /// Environment variables override TOML values.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut settings = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read settings file {}", path.display()))?;
            Self::parse(&contents)
                .with_context(|| format!("failed to parse settings file {}", path.display()))?
        } else {
            info!("No settings file found at {}, using defaults", path.display());
            Self::default()
        };

        settings.apply_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("BOT_TOKEN") {
            self.bot.token = v;
        }
        if let Some(v) = var("LISTEN_ADDRESS") {
            self.bot.listen_address = v;
        }
        if let Some(v) = var("AUTOSAVE_INTERVAL")
            && let Ok(secs) = v.parse()
        {
            self.sync.autosave_interval_secs = secs;
        }
        if let Some(v) = var("OUTPUT_DIR") {
            self.sync.output_dir = v.into();
        }
        if let Some(v) = var("CONFIG_PATH") {
            self.sync.config_path = v.into();
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.bot.token.trim().is_empty() {
            bail!("BOT_TOKEN is not set; add it to the environment or bot.token in the settings file");
        }
        if self.sync.autosave_interval_secs == 0 {
            bail!("sync.autosave_interval_secs must be at least 1");
        }
        if self.sync.avatar_sizes.is_empty() {
            bail!("sync.avatar_sizes must list at least one size");
        }
        Ok(())
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.sync.autosave_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.bot.listen_address, "127.0.0.1:8087");
        assert_eq!(settings.autosave_interval(), Duration::from_secs(5));
        assert_eq!(settings.sync.output_dir, PathBuf::from("Output"));
        assert_eq!(settings.sync.config_path, PathBuf::from("config.json"));
        assert_eq!(settings.sync.avatar_sizes, vec![512]);
    }

    #[test]
    fn test_parse_partial_file() {
        let settings = Settings::parse(
            r#"
            [bot]
            token = "abc"

            [sync]
            avatar_sizes = [128, 512]
            "#,
        )
        .unwrap();
        assert_eq!(settings.bot.token, "abc");
        assert_eq!(settings.bot.listen_address, "127.0.0.1:8087");
        assert_eq!(settings.sync.avatar_sizes, vec![128, 512]);
        assert_eq!(settings.sync.autosave_interval_secs, 5);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut settings = Settings::parse("[bot]\ntoken = \"file\"").unwrap();
        settings.apply_overrides(env(&[
            ("BOT_TOKEN", "env"),
            ("AUTOSAVE_INTERVAL", "10"),
            ("OUTPUT_DIR", "/srv/obs"),
        ]));
        assert_eq!(settings.bot.token, "env");
        assert_eq!(settings.sync.autosave_interval_secs, 10);
        assert_eq!(settings.sync.output_dir, PathBuf::from("/srv/obs"));
    }

    #[test]
    fn test_bad_interval_env_ignored() {
        let mut settings = Settings::default();
        settings.apply_overrides(env(&[("AUTOSAVE_INTERVAL", "soon")]));
        assert_eq!(settings.sync.autosave_interval_secs, 5);
    }

    #[test]
    fn test_missing_token_rejected() {
        let settings = Settings::default();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("BOT_TOKEN"));
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(Settings::parse("[bot\ntoken=").is_err());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("voiceinfo.toml");
        std::fs::write(&path, "[bot]\ntoken = \"from-file\"\n[sync]\nautosave_interval_secs = 2\n")
            .unwrap();
        // BOT_TOKEN from the environment would override the file.
        if std::env::var("BOT_TOKEN").is_err() && std::env::var("AUTOSAVE_INTERVAL").is_err() {
            let settings = Settings::load(&path).unwrap();
            assert_eq!(settings.bot.token, "from-file");
            assert_eq!(settings.autosave_interval(), Duration::from_secs(2));
        }
    }
}
