use thiserror::Error;

pub type Result<T> = std::result::Result<T, CopyError>;

#[derive(Debug, Error)]
pub enum CopyError {
    /// The source could not be packaged into a command-safe payload.
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// One chunk ran out of attempts; the whole run was cancelled.
    #[error("chunk {index} failed after {attempts} attempt(s): {reason}")]
    ChunkDelivery {
        index: usize,
        attempts: u32,
        reason: String,
    },

    /// The executor itself failed (spawn, connection, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote command ran but exited non-zero.
    #[error("command exited with code {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    /// Reassembly on the remote side returned non-zero.
    #[error("restore of {destination} returned code={code}: {stderr}")]
    Assembly {
        destination: String,
        code: i32,
        stderr: String,
    },

    /// Only surfaced to loggers, never as the result of a copy.
    #[error("cleanup returned code={code}: {stderr}")]
    Cleanup { code: i32, stderr: String },

    #[error("upload cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CopyError {
    /// Errors a chunk delivery may retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CopyError::Transport(_) | CopyError::CommandFailed { .. } | CopyError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CopyError::Transport("reset".into()).is_transient());
        assert!(CopyError::CommandFailed {
            code: 1,
            stderr: String::new()
        }
        .is_transient());
        assert!(!CopyError::Cancelled.is_transient());
        assert!(!CopyError::Config("x".into()).is_transient());
    }

    #[test]
    fn test_chunk_delivery_message() {
        let e = CopyError::ChunkDelivery {
            index: 7,
            attempts: 3,
            reason: "boom".into(),
        };
        assert_eq!(e.to_string(), "chunk 7 failed after 3 attempt(s): boom");
    }
}
