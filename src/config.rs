use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::{CopyError, Result};

/// Container format used to make the payload command-safe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    /// Single-entry tar archive, base64 encoded
    #[default]
    Tar,
    /// Bare base64 of the source bytes
    Raw,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CopyConfig {
    /// Number of chunk uploads allowed to run at once
    pub concurrency: usize,
    /// Extra attempts per chunk after the first one fails
    pub retries_per_chunk: u32,
    /// Longest command (in bytes) the transport accepts
    pub command_length_ceiling: usize,
    /// Jobs buffered between the splitter and the workers
    pub queue_depth: usize,
    /// Fixed pause between attempts of the same chunk
    pub retry_backoff_ms: u64,
    /// Per-command deadline enforced by the executor
    pub command_timeout_secs: Option<u64>,
    /// Remote directory holding temporary fragments
    pub temp_dir: String,
    /// Remove fragments once the run ends
    pub cleanup: bool,
    pub container: Container,
}

impl Default for CopyConfig {
    fn default() -> Self {
        CopyConfig {
            concurrency: 3,
            retries_per_chunk: 2,
            command_length_ceiling: 7500,
            queue_depth: 64,
            retry_backoff_ms: 0,
            command_timeout_secs: None,
            temp_dir: "/tmp".to_string(),
            cleanup: true,
            container: Container::Tar,
        }
    }
}

impl CopyConfig {
    pub fn from_toml_str(data: &str) -> Result<Self> {
        let cfg: CopyConfig =
            toml::from_str(data).map_err(|e| CopyError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_toml_str(&data)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(CopyError::Config("concurrency must be at least 1".into()));
        }
        if self.command_length_ceiling == 0 {
            return Err(CopyError::Config(
                "command_length_ceiling must be at least 1".into(),
            ));
        }
        if self.queue_depth == 0 {
            return Err(CopyError::Config("queue_depth must be at least 1".into()));
        }
        if self.temp_dir.trim().is_empty() {
            return Err(CopyError::Config("temp_dir must not be empty".into()));
        }
        Ok(())
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries_per_chunk.saturating_add(1)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}
