//! Progress bar for chunk uploads
//!
//! Plugs into the logger fan-out so the coordinator never knows it exists.

use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

use crate::logger::CopyLogger;

pub struct ChunkProgress {
    bar: ProgressBar,
    started: Mutex<Option<Instant>>,
}

impl ChunkProgress {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(0))
    }

    /// Progress that renders nowhere; used by tests.
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} chunks {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        Self {
            bar,
            started: Mutex::new(None),
        }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn length(&self) -> Option<u64> {
        self.bar.length()
    }
}

impl Default for ChunkProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl CopyLogger for ChunkProgress {
    fn start(&self, _destination: &str, _token: &str, chunks: usize) {
        self.bar.set_length(chunks as u64);
        self.bar.set_position(0);
        self.bar.enable_steady_tick(Duration::from_millis(100));
        *self.started.lock() = Some(Instant::now());
    }

    fn chunk_retry(&self, index: usize, attempt: u32, _msg: &str) {
        self.bar.set_message(format!("(chunk {index} retry after try {attempt})"));
    }

    fn chunk_delivered(&self, _index: usize) {
        self.bar.inc(1);
    }

    fn cancelled(&self, msg: &str) {
        self.bar.abandon_with_message(format!("cancelled: {msg}"));
    }

    fn assembled(&self, destination: &str) {
        self.bar.set_message(format!("restored {destination}"));
    }

    fn error(&self, _context: &str, _destination: &str, msg: &str) {
        if !self.bar.is_finished() {
            self.bar.abandon_with_message(format!("failed: {msg}"));
        }
    }

    fn done(&self, bytes: u64, chunks: usize, _seconds: f64) {
        let started = *self.started.lock();
        let elapsed = started
            .map(|s| s.elapsed().as_secs_f64())
            .unwrap_or_default();
        self.bar.finish_with_message(format!(
            "{bytes} bytes in {chunks} chunk(s), {elapsed:.1}s"
        ));
    }
}
