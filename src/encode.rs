//! Packaging the source stream into a command-safe container
//!
//! Every encoder produces plain base64 text, which never needs quoting inside a
//! single-quoted shell word, and knows the remote filter that undoes it.

use base64::engine::general_purpose::STANDARD;
use base64::write::EncoderWriter;
use std::io::{Read, Write};
use tar::{Builder, Header};

use crate::config::Container;
use crate::error::{CopyError, Result};

pub trait Encoder: Send + Sync {
    /// Read the whole source and return the encoded payload.
    fn encode(&self, source: &mut dyn Read) -> Result<Encoded>;

    /// Shell filter turning the concatenated payload back into file bytes.
    fn remote_decode(&self) -> &'static str;
}

/// Encoder output plus the number of source bytes consumed
#[derive(Debug, Clone)]
pub struct Encoded {
    pub payload: Vec<u8>,
    pub source_len: u64,
}

/// Single-entry tar archive, base64 encoded
#[derive(Debug, Clone)]
pub struct TarBase64Encoder {
    entry_name: String,
}

impl TarBase64Encoder {
    pub fn new(entry_name: impl Into<String>) -> Self {
        let entry_name = entry_name.into();
        let entry_name = if entry_name.is_empty() {
            "payload".to_string()
        } else {
            entry_name
        };
        Self { entry_name }
    }

    /// Entry named after the final component of a remote destination path.
    /// `.` and `..` cannot name a tar entry, so they fall back too.
    pub fn for_destination(destination: &str) -> Self {
        let name = destination
            .rsplit(['/', '\\'])
            .find(|s| !s.is_empty())
            .filter(|s| *s != "." && *s != "..")
            .unwrap_or("");
        Self::new(name)
    }
}

impl Encoder for TarBase64Encoder {
    fn encode(&self, source: &mut dyn Read) -> Result<Encoded> {
        let data = read_source(source)?;
        if data.is_empty() {
            return Ok(Encoded {
                payload: Vec::new(),
                source_len: 0,
            });
        }

        let mut payload = Vec::with_capacity(data.len() * 4 / 3 + 1024);
        {
            let mut b64 = EncoderWriter::new(&mut payload, &STANDARD);
            {
                let mut builder = Builder::new(&mut b64);
                let mut header = Header::new_gnu();
                header.set_size(data.len() as u64);
                header.set_mode(0o644);
                header.set_mtime(
                    std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or(0),
                );
                builder
                    .append_data(&mut header, &self.entry_name, data.as_slice())
                    .map_err(|e| CopyError::Encoding(format!("tar entry: {e}")))?;
                builder
                    .finish()
                    .map_err(|e| CopyError::Encoding(format!("tar finish: {e}")))?;
            }
            b64.finish()
                .map_err(|e| CopyError::Encoding(format!("base64: {e}")))?;
        }

        Ok(Encoded {
            payload,
            source_len: data.len() as u64,
        })
    }

    fn remote_decode(&self) -> &'static str {
        "base64 -d | tar -xOf -"
    }
}

/// Bare base64, no archive
#[derive(Debug, Clone, Default)]
pub struct Base64Encoder;

impl Encoder for Base64Encoder {
    fn encode(&self, source: &mut dyn Read) -> Result<Encoded> {
        let data = read_source(source)?;
        let mut payload = Vec::with_capacity(data.len() * 4 / 3 + 4);
        {
            let mut b64 = EncoderWriter::new(&mut payload, &STANDARD);
            b64.write_all(&data)
                .map_err(|e| CopyError::Encoding(format!("base64: {e}")))?;
            b64.finish()
                .map_err(|e| CopyError::Encoding(format!("base64: {e}")))?;
        }
        Ok(Encoded {
            payload,
            source_len: data.len() as u64,
        })
    }

    fn remote_decode(&self) -> &'static str {
        "base64 -d"
    }
}

/// Pick the encoder for a configured container.
pub fn encoder_for(container: Container, destination: &str) -> Box<dyn Encoder> {
    match container {
        Container::Tar => Box::new(TarBase64Encoder::for_destination(destination)),
        Container::Raw => Box::new(Base64Encoder),
    }
}

/// Bytes that may appear unquoted-safe inside a single-quoted shell word.
fn is_command_safe(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=' | b'-' | b'_')
}

/// Reject payloads that would break out of the write command's quoting.
pub fn ensure_command_safe(payload: &[u8]) -> Result<()> {
    match payload.iter().position(|&b| !is_command_safe(b)) {
        Some(pos) => Err(CopyError::Encoding(format!(
            "payload byte 0x{:02x} at offset {} is not command-safe",
            payload[pos], pos
        ))),
        None => Ok(()),
    }
}

fn read_source(source: &mut dyn Read) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    source
        .read_to_end(&mut data)
        .map_err(|e| CopyError::Encoding(format!("reading source: {e}")))?;
    Ok(data)
}
