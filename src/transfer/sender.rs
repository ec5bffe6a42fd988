//! Sender state machine:
//! PRECHECK → CONNECT → HANDSHAKE → REQUEST → RESPONSE → {ABORT|STREAM} → DONE
//! with retry on transport/handshake failure.
use std::io::Read;
use std::net::TcpStream;
use std::path::PathBuf;
use std::time::Instant;

use tracing::{info, warn};

use crate::error::TransferError;
use crate::history::{RecordStatus, TransferHistory, TransferRecord};
use crate::identity::Identity;
use crate::protocol::{self, FileChunk, FileHeader, SendRequest, SendResponse, CHUNK_SIZE};
use crate::secure_channel::SecureChannel;
use crate::state::{AppState, AppStatus, TransferStatus};
use crate::transfer::{CONNECT_TIMEOUT, MAX_RETRIES, RETRY_BACKOFF};

/// Send `files` to `device`. Returns `Ok(())` on completion; the caller
/// inspects `AppState`/`TransferHistory` for the outcome either way, the
/// same as the receiver side.
pub fn send_to(
    device_id: &str,
    host: &str,
    port: u16,
    device_name: &str,
    files: &[PathBuf],
    identity: &Identity,
    state: &AppState,
    history: &TransferHistory,
) -> anyhow::Result<()> {
    let total: u64 = files
        .iter()
        .map(|p| std::fs::metadata(p).map(|m| m.len()).unwrap_or(0))
        .sum();
    let start_time = Instant::now();
    let timestamp = unix_timestamp();

    if let Some(device) = state.device(device_id) {
        if device.status == AppStatus::Busy {
            state.set_transfer_status(device_id, TransferStatus::Canceled);
            history.add_record(TransferRecord {
                timestamp,
                direction: "sent".to_string(),
                peer_name: device_name.to_string(),
                peer_host: host.to_string(),
                num_files: files.len() as u32,
                total_size: total,
                duration: start_time.elapsed().as_secs_f64(),
                status: RecordStatus::Canceled,
                error_msg: Some("Destination is busy".to_string()),
            });
            return Ok(());
        }
    }

    let mut last_err: Option<TransferError> = None;
    for attempt in 0..MAX_RETRIES {
        info!(device = %device_name, attempt = attempt + 1, "connecting");
        state.start_transfer(device_id);

        match attempt_once(host, port, device_name, files, total, identity, state, device_id) {
            Ok(Outcome::Completed) => {
                let duration = start_time.elapsed().as_secs_f64();
                state.update_progress(device_id, 1.0, total);
                history.add_record(TransferRecord {
                    timestamp,
                    direction: "sent".to_string(),
                    peer_name: device_name.to_string(),
                    peer_host: host.to_string(),
                    num_files: files.len() as u32,
                    total_size: total,
                    duration,
                    status: RecordStatus::Completed,
                    error_msg: None,
                });
                state.clear_progress(device_id);
                return Ok(());
            }
            Ok(Outcome::Rejected) => {
                state.set_transfer_status(device_id, TransferStatus::Canceled);
                state.update_progress(device_id, 1.0, 0);
                history.add_record(TransferRecord {
                    timestamp,
                    direction: "sent".to_string(),
                    peer_name: device_name.to_string(),
                    peer_host: host.to_string(),
                    num_files: files.len() as u32,
                    total_size: total,
                    duration: start_time.elapsed().as_secs_f64(),
                    status: RecordStatus::Canceled,
                    error_msg: Some("Transfer rejected by recipient".to_string()),
                });
                return Ok(());
            }
            Err(e) => {
                warn!(device = %device_name, attempt = attempt + 1, error = %e, "send attempt failed");
                let retryable = e.is_retryable();
                last_err = Some(e);
                if !retryable {
                    break;
                }
                if attempt + 1 < MAX_RETRIES {
                    std::thread::sleep(RETRY_BACKOFF);
                }
            }
        }
    }

    let duration = start_time.elapsed().as_secs_f64();
    state.set_transfer_status(device_id, TransferStatus::Error);
    state.clear_progress(device_id);
    history.add_record(TransferRecord {
        timestamp,
        direction: "sent".to_string(),
        peer_name: device_name.to_string(),
        peer_host: host.to_string(),
        num_files: files.len() as u32,
        total_size: total,
        duration,
        status: RecordStatus::Error,
        error_msg: last_err.as_ref().map(|e| e.to_string()),
    });
    Err(last_err.map(Into::into).unwrap_or_else(|| anyhow::anyhow!("transfer failed after {MAX_RETRIES} attempts")))
}

enum Outcome {
    Completed,
    Rejected,
}

fn attempt_once(
    host: &str,
    port: u16,
    device_name: &str,
    files: &[PathBuf],
    total: u64,
    identity: &Identity,
    state: &AppState,
    device_id: &str,
) -> Result<Outcome, TransferError> {
    let mut stream = connect_with_timeout(host, port)?;
    let mut channel = SecureChannel::handshake(&mut stream, identity, None)
        .map_err(|e| TransferError::crypto(e.to_string()))?;

    let files_rel: Vec<String> = files
        .iter()
        .map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default())
        .collect();
    let request = SendRequest::new(files_rel, total, device_name.to_string());
    protocol::write_message(&mut stream, Some(&mut channel), &request).map_err(TransferError::into_negotiation)?;

    // A malformed RESPONSE frame is still pre-stream: nothing has been
    // written to disk on either side yet, so it is safe to retry.
    let response: SendResponse = protocol::read_message(&mut stream, Some(&mut channel))
        .map_err(TransferError::into_negotiation)?;
    if !response.accept {
        info!(device = %device_name, "recipient declined the transfer");
        return Ok(Outcome::Rejected);
    }

    let mut sent_total: u64 = 0;
    for path in files {
        let fname = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let size = std::fs::metadata(path)?.len();
        protocol::write_message(&mut stream, Some(&mut channel), &FileHeader { file: fname.clone(), size })?;

        let mut file = std::fs::File::open(path)?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            protocol::write_message(&mut stream, Some(&mut channel), &FileChunk::from_bytes(&buf[..n]))?;
            sent_total += n as u64;
            if total > 0 {
                state.update_progress(device_id, sent_total as f64 / total as f64, sent_total);
            }
        }
    }

    info!(device = %device_name, "transfer complete");
    Ok(Outcome::Completed)
}

/// How many `file_chunk` frames the streaming loop above emits for a file
/// of `size` bytes: a ceiling division by `CHUNK_SIZE`, zero for an empty
/// file since `file.read` returns `0` immediately and the loop never
/// writes a frame.
fn chunk_count_for_size(size: u64) -> u64 {
    if size == 0 {
        0
    } else {
        (size + CHUNK_SIZE as u64 - 1) / CHUNK_SIZE as u64
    }
}

fn connect_with_timeout(host: &str, port: u16) -> Result<TcpStream, TransferError> {
    let addr = format!("{host}:{port}")
        .parse()
        .map_err(|_| TransferError::protocol(format!("invalid address {host}:{port}")))?;
    TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).map_err(TransferError::Transport)
}

fn unix_timestamp() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
