use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

pub trait CopyLogger: Send + Sync {
    fn start(&self, _destination: &str, _token: &str, _chunks: usize) {}
    fn chunk_attempt(&self, _index: usize, _attempt: u32, _command_len: usize) {}
    fn chunk_retry(&self, _index: usize, _attempt: u32, _msg: &str) {}
    fn chunk_delivered(&self, _index: usize) {}
    fn chunk_failed(&self, _index: usize, _attempts: u32, _msg: &str) {}
    fn cancelled(&self, _msg: &str) {}
    fn assembled(&self, _destination: &str) {}
    fn cleanup_failed(&self, _msg: &str) {}
    fn error(&self, _context: &str, _destination: &str, _msg: &str) {}
    fn done(&self, _bytes: u64, _chunks: usize, _seconds: f64) {}
}

pub struct NoopLogger;
impl CopyLogger for NoopLogger {}

/// Append-only text log with RFC 3339 timestamps
pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
    }
}

impl CopyLogger for TextLogger {
    fn start(&self, destination: &str, token: &str, chunks: usize) {
        self.line(&format!("START dst={destination} token={token} chunks={chunks}"));
    }
    fn chunk_attempt(&self, index: usize, attempt: u32, command_len: usize) {
        self.line(&format!("ATTEMPT chunk={index} try={attempt} len={command_len}"));
    }
    fn chunk_retry(&self, index: usize, attempt: u32, msg: &str) {
        self.line(&format!("RETRY chunk={index} try={attempt} msg={msg}"));
    }
    fn chunk_delivered(&self, index: usize) {
        self.line(&format!("DELIVERED chunk={index}"));
    }
    fn chunk_failed(&self, index: usize, attempts: u32, msg: &str) {
        self.line(&format!("FAILED chunk={index} attempts={attempts} msg={msg}"));
    }
    fn cancelled(&self, msg: &str) {
        self.line(&format!("CANCELLED msg={msg}"));
    }
    fn assembled(&self, destination: &str) {
        self.line(&format!("ASSEMBLED dst={destination}"));
    }
    fn cleanup_failed(&self, msg: &str) {
        self.line(&format!("CLEANUP_FAILED msg={msg}"));
    }
    fn error(&self, context: &str, destination: &str, msg: &str) {
        self.line(&format!("ERROR ctx={context} dst={destination} msg={msg}"));
    }
    fn done(&self, bytes: u64, chunks: usize, seconds: f64) {
        self.line(&format!("DONE bytes={bytes} chunks={chunks} seconds={seconds:.3}"));
    }
}

/// Human-oriented lines on stderr, for `--verbose`
pub struct StderrLogger;

impl CopyLogger for StderrLogger {
    fn start(&self, destination: &str, token: &str, chunks: usize) {
        eprintln!("Uploading {chunks} chunk(s) to {destination} (run {token})");
    }
    fn chunk_attempt(&self, index: usize, attempt: u32, command_len: usize) {
        eprintln!("  chunk {index}: attempt {attempt} (len={command_len})");
    }
    fn chunk_retry(&self, index: usize, attempt: u32, msg: &str) {
        eprintln!("  chunk {index}: attempt {attempt} failed: {msg}");
    }
    fn chunk_failed(&self, index: usize, attempts: u32, msg: &str) {
        eprintln!("  chunk {index}: giving up after {attempts} attempt(s): {msg}");
    }
    fn cancelled(&self, msg: &str) {
        eprintln!("Upload cancelled: {msg}");
    }
    fn assembled(&self, destination: &str) {
        eprintln!("Restored {destination}");
    }
    fn cleanup_failed(&self, msg: &str) {
        eprintln!("Warning: could not remove temporary fragments: {msg}");
    }
    fn error(&self, context: &str, destination: &str, msg: &str) {
        eprintln!("Error ({context}) {destination}: {msg}");
    }
}

/// Forwards every event to each inner logger
#[derive(Default)]
pub struct FanoutLogger {
    sinks: Vec<Arc<dyn CopyLogger>>,
}

impl FanoutLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Arc<dyn CopyLogger>) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl CopyLogger for FanoutLogger {
    fn start(&self, destination: &str, token: &str, chunks: usize) {
        self.sinks.iter().for_each(|s| s.start(destination, token, chunks));
    }
    fn chunk_attempt(&self, index: usize, attempt: u32, command_len: usize) {
        self.sinks
            .iter()
            .for_each(|s| s.chunk_attempt(index, attempt, command_len));
    }
    fn chunk_retry(&self, index: usize, attempt: u32, msg: &str) {
        self.sinks.iter().for_each(|s| s.chunk_retry(index, attempt, msg));
    }
    fn chunk_delivered(&self, index: usize) {
        self.sinks.iter().for_each(|s| s.chunk_delivered(index));
    }
    fn chunk_failed(&self, index: usize, attempts: u32, msg: &str) {
        self.sinks
            .iter()
            .for_each(|s| s.chunk_failed(index, attempts, msg));
    }
    fn cancelled(&self, msg: &str) {
        self.sinks.iter().for_each(|s| s.cancelled(msg));
    }
    fn assembled(&self, destination: &str) {
        self.sinks.iter().for_each(|s| s.assembled(destination));
    }
    fn cleanup_failed(&self, msg: &str) {
        self.sinks.iter().for_each(|s| s.cleanup_failed(msg));
    }
    fn error(&self, context: &str, destination: &str, msg: &str) {
        self.sinks
            .iter()
            .for_each(|s| s.error(context, destination, msg));
    }
    fn done(&self, bytes: u64, chunks: usize, seconds: f64) {
        self.sinks.iter().for_each(|s| s.done(bytes, chunks, seconds));
    }
}
