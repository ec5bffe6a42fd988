//! Length-prefixed, optionally AEAD-sealed JSON message framing.
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TransferError};
use crate::secure_channel::SecureChannel;

/// 16 MiB cap on a single frame's payload, enforced before the payload is
/// read so a hostile length prefix never triggers an oversized allocation.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;
pub const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub files: Vec<String>,
    pub total: u64,
    pub peer_name: String,
}

impl SendRequest {
    pub fn new(files: Vec<String>, total: u64, peer_name: String) -> Self {
        Self {
            kind: "send_request".to_string(),
            files,
            total,
            peer_name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResponse {
    pub accept: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHeader {
    pub file: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChunk {
    pub data: String,
}

impl FileChunk {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: encode_latin1(bytes),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        decode_latin1(&self.data)
    }
}

/// Byte `b` maps to codepoint `U+00XX`; every byte string round-trips
/// through this mapping with no locale dependence.
pub fn encode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

pub fn decode_latin1(s: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(s.len());
    for c in s.chars() {
        let codepoint = c as u32;
        if codepoint > 0xFF {
            return Err(TransferError::protocol(
                "file_chunk.data contains a codepoint outside latin-1 range",
            ));
        }
        out.push(codepoint as u8);
    }
    Ok(out)
}

/// Write a plaintext JSON message, sealing it with `channel` when present.
pub fn write_message<S: Write, T: Serialize>(
    stream: &mut S,
    channel: Option<&mut SecureChannel>,
    message: &T,
) -> Result<()> {
    let plaintext = serde_json::to_vec(message)?;
    let payload = match channel {
        Some(ch) => ch.encrypt(&plaintext)?,
        None => plaintext,
    };
    if payload.len() > MAX_FRAME_LEN {
        return Err(TransferError::protocol("outgoing frame exceeds 16 MiB cap"));
    }
    stream.write_all(&(payload.len() as u32).to_be_bytes())?;
    stream.write_all(&payload)?;
    Ok(())
}

/// Read one frame and return its decoded JSON value, without committing to
/// a particular message shape — callers inspect `type`/shape before
/// deserializing into a concrete struct.
pub fn read_value<S: Read>(
    stream: &mut S,
    mut channel: Option<&mut SecureChannel>,
) -> Result<Value> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransferError::protocol(format!(
            "incoming frame length {len} exceeds 16 MiB cap"
        )));
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload)?;
    let plaintext = match channel.as_deref_mut() {
        Some(ch) => ch.decrypt(&payload)?,
        None => payload,
    };
    Ok(serde_json::from_slice(&plaintext)?)
}

pub fn read_message<S: Read, T: for<'de> Deserialize<'de>>(
    stream: &mut S,
    channel: Option<&mut SecureChannel>,
) -> Result<T> {
    let value = read_value(stream, channel)?;
    Ok(serde_json::from_value(value)?)
}
