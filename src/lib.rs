//! blitcp library
//!
//! Chunked file copy for transports that can only run shell commands of
//! bounded length.

pub mod chunk;
pub mod cli;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod copy;
pub mod encode;
pub mod error;
pub mod executor;
pub mod logger;
pub mod progress;

pub use error::{CopyError, Result};
