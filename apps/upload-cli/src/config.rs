//! Uploader configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/cinevision/uploader.toml`
//! - Windows: `%APPDATA%/cinevision/uploader.toml`
//!
//! `CINEVISION_*` environment variables override file values; command-line
//! flags override both.

use std::path::{Path, PathBuf};
use std::time::Duration;

use cinevision_uploader::DEFAULT_BATCH_PAUSE;
use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

/// Uploader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Control-plane API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Bearer token for the control plane.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Requested part size in MiB.
    #[serde(default = "default_chunk_size_mib")]
    pub chunk_size_mib: u64,

    /// Parts uploaded concurrently.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Total attempts per part.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Timeout for control-plane calls, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for a single part PUT, in seconds.
    #[serde(default = "default_part_timeout")]
    pub part_timeout_secs: u64,

    /// Pause between batch jobs, in seconds.
    #[serde(default = "default_batch_pause")]
    pub batch_pause_secs: u64,
}

fn default_api_url() -> String {
    "http://localhost:3001/api/v1".into()
}

fn default_chunk_size_mib() -> u64 {
    100
}

fn default_parallelism() -> usize {
    1
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_timeout() -> u64 {
    30
}

fn default_part_timeout() -> u64 {
    600
}

fn default_batch_pause() -> u64 {
    DEFAULT_BATCH_PAUSE.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_token: None,
            chunk_size_mib: default_chunk_size_mib(),
            parallelism: default_parallelism(),
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout(),
            part_timeout_secs: default_part_timeout(),
            batch_pause_secs: default_batch_pause(),
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or the platform default), creating
    /// a default file if none exists, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)?
        } else {
            let config = Config::default();
            config.save(&path)?;
            config
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // The file may hold an API token.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Applies `CINEVISION_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(url) = lookup("CINEVISION_API_URL") {
            self.api_url = url;
        }
        if let Some(token) = lookup("CINEVISION_API_TOKEN") {
            self.api_token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(v) = lookup("CINEVISION_CHUNK_SIZE_MIB") {
            self.chunk_size_mib = v
                .parse()
                .map_err(|e| anyhow::anyhow!("CINEVISION_CHUNK_SIZE_MIB={v}: {e}"))?;
        }
        if let Some(v) = lookup("CINEVISION_PARALLELISM") {
            self.parallelism = v
                .parse()
                .map_err(|e| anyhow::anyhow!("CINEVISION_PARALLELISM={v}: {e}"))?;
        }
        if let Some(v) = lookup("CINEVISION_MAX_RETRIES") {
            self.max_retries = v
                .parse()
                .map_err(|e| anyhow::anyhow!("CINEVISION_MAX_RETRIES={v}: {e}"))?;
        }
        Ok(())
    }

    pub fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size_mib.saturating_mul(MIB)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn part_timeout(&self) -> Duration {
        Duration::from_secs(self.part_timeout_secs)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_secs(self.batch_pause_secs)
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("cinevision")
            .join("uploader.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata)
            .join("cinevision")
            .join("uploader.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/cinevision/uploader.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.api_url, "http://localhost:3001/api/v1");
        assert!(config.api_token.is_none());
        assert_eq!(config.chunk_size_bytes(), 100 * MIB);
        assert_eq!(config.parallelism, 1);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.batch_pause(), Duration::from_secs(5));
    }

    #[test]
    fn partial_file_uses_defaults() {
        let text = "api_url = \"https://api.cinevision.example/v1\"\nparallelism = 4\n";
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.api_url, "https://api.cinevision.example/v1");
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.chunk_size_mib, 100);
        assert_eq!(config.part_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uploader.toml");
        let config = Config {
            api_token: Some("secret".into()),
            chunk_size_mib: 64,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let loaded: Config = toml::from_str(&content).unwrap();
        assert_eq!(loaded, config);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CINEVISION_API_URL", "https://staging.example/api/v1"),
            ("CINEVISION_API_TOKEN", "t0ken"),
            ("CINEVISION_CHUNK_SIZE_MIB", "50"),
            ("CINEVISION_PARALLELISM", "3"),
            ("CINEVISION_MAX_RETRIES", "5"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.api_url, "https://staging.example/api/v1");
        assert_eq!(config.api_token.as_deref(), Some("t0ken"));
        assert_eq!(config.chunk_size_mib, 50);
        assert_eq!(config.parallelism, 3);
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn bad_env_value_is_an_error() {
        let mut config = Config::default();
        let result = config.apply_env(|k| (k == "CINEVISION_PARALLELISM").then(|| "many".into()));
        assert!(result.is_err());
    }
}
