//! Command-line surface and how it layers over the config file

use clap::Parser;
use std::path::PathBuf;

use crate::config::{Container, CopyConfig};
use crate::error::Result;

/// Command-line arguments
#[derive(Clone, Debug, Parser)]
#[command(
    author,
    version,
    about = "blitcp - copy a file to a remote host one shell command at a time"
)]
pub struct Args {
    /// Local source file, or `-` for stdin
    pub source: PathBuf,

    /// Destination path on the remote host
    pub destination: String,

    /// Launcher that runs one command remotely; the command is appended as
    /// its last argument (e.g. "ssh deploy@host")
    #[arg(long, default_value = "sh -c")]
    pub via: String,

    /// TOML file with copy settings; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Concurrent chunk uploads
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Extra attempts per chunk
    #[arg(long)]
    pub retries: Option<u32>,

    /// Maximum length of one remote command in bytes
    #[arg(long)]
    pub ceiling: Option<usize>,

    /// Remote directory for temporary fragments
    #[arg(long)]
    pub temp_dir: Option<String>,

    /// Per-command timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Pause between attempts of the same chunk, in milliseconds
    #[arg(long)]
    pub backoff_ms: Option<u64>,

    /// Leave temporary fragments on the remote host
    #[arg(long)]
    pub keep_temp: bool,

    /// Send bare base64 instead of a tar archive
    #[arg(long)]
    pub raw: bool,

    /// Show every chunk attempt
    #[arg(short, long)]
    pub verbose: bool,

    /// Show a progress bar
    #[arg(short, long)]
    pub progress: bool,

    /// Append a timestamped log to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}

impl Args {
    pub fn reads_stdin(&self) -> bool {
        self.source.as_os_str() == "-"
    }

    /// Config file (or defaults) with command-line overrides applied.
    pub fn resolve_config(&self) -> Result<CopyConfig> {
        let mut cfg = match &self.config {
            Some(path) => CopyConfig::load(path)?,
            None => CopyConfig::default(),
        };
        if let Some(n) = self.concurrency {
            cfg.concurrency = n;
        }
        if let Some(n) = self.retries {
            cfg.retries_per_chunk = n;
        }
        if let Some(n) = self.ceiling {
            cfg.command_length_ceiling = n;
        }
        if let Some(dir) = &self.temp_dir {
            cfg.temp_dir = dir.clone();
        }
        if let Some(secs) = self.timeout {
            cfg.command_timeout_secs = Some(secs);
        }
        if let Some(ms) = self.backoff_ms {
            cfg.retry_backoff_ms = ms;
        }
        if self.keep_temp {
            cfg.cleanup = false;
        }
        if self.raw {
            cfg.container = Container::Raw;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CopyError;
    use tempfile::TempDir;

    #[test]
    fn test_flags_override_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blitcp.toml");
        std::fs::write(&path, "concurrency = 6\nretries_per_chunk = 5\ntemp_dir = \"/var/tmp\"\n")
            .unwrap();

        let args = Args::parse_from([
            "blitcp",
            "in.bin",
            "/srv/out.bin",
            "--config",
            path.to_str().unwrap(),
            "-j",
            "2",
            "--keep-temp",
            "--raw",
        ]);
        let cfg = args.resolve_config().unwrap();
        assert_eq!(cfg.concurrency, 2);
        assert_eq!(cfg.retries_per_chunk, 5);
        assert_eq!(cfg.temp_dir, "/var/tmp");
        assert!(!cfg.cleanup);
        assert_eq!(cfg.container, Container::Raw);
    }

    #[test]
    fn test_stdin_and_defaults() {
        let args = Args::parse_from(["blitcp", "-", "/srv/out"]);
        assert!(args.reads_stdin());
        assert_eq!(args.via, "sh -c");
        let cfg = args.resolve_config().unwrap();
        assert_eq!(cfg.command_length_ceiling, 7500);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let args = Args::parse_from(["blitcp", "a", "b", "--ceiling", "0"]);
        assert!(matches!(args.resolve_config(), Err(CopyError::Config(_))));
    }
}
