//! Receiver state machine:
//! ACCEPT → HANDSHAKE → AWAIT_REQUEST → CONSENT → {REJECT|INGEST} → DONE
use std::io::{ErrorKind, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::consent::ConsentOracle;
use crate::history::{RecordStatus, TransferHistory, TransferRecord};
use crate::identity::Identity;
use crate::protocol::{self, FileChunk, FileHeader, SendRequest, SendResponse};
use crate::secure_channel::SecureChannel;
use crate::state::{AppState, AppStatus, TransferStatus};
use crate::stop::StopToken;
use crate::transfer::ACCEPT_POLL_TIMEOUT;
use crate::ui::UiPoster;

pub struct Receiver {
    listener: TcpListener,
    download_dir: PathBuf,
    identity: Arc<Identity>,
    state: Arc<AppState>,
    history: Arc<TransferHistory>,
    oracle: Arc<dyn ConsentOracle>,
    ui_poster: UiPoster,
    stop: StopToken,
}

impl Receiver {
    pub fn bind(
        listen_port: u16,
        download_dir: PathBuf,
        identity: Arc<Identity>,
        state: Arc<AppState>,
        history: Arc<TransferHistory>,
        oracle: Arc<dyn ConsentOracle>,
        ui_poster: UiPoster,
        stop: StopToken,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", listen_port))?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            download_dir,
            identity,
            state,
            history,
            oracle,
            ui_poster,
            stop,
        })
    }

    pub fn spawn(self) -> std::thread::JoinHandle<()> {
        std::thread::Builder::new()
            .name("fishare-receiver-accept".into())
            .spawn(move || self.accept_loop())
            .expect("spawning receiver accept thread")
    }

    fn accept_loop(self) {
        info!("receiver listening");
        while !self.stop.is_stopped() {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    let download_dir = self.download_dir.clone();
                    let identity = self.identity.clone();
                    let state = self.state.clone();
                    let history = self.history.clone();
                    let oracle = self.oracle.clone();
                    let ui_poster = self.ui_poster.clone();
                    std::thread::Builder::new()
                        .name("fishare-receiver-worker".into())
                        .spawn(move || {
                            if let Err(e) = handle_peer(
                                stream,
                                addr.ip().to_string(),
                                &download_dir,
                                &identity,
                                &state,
                                &history,
                                &oracle,
                                &ui_poster,
                            ) {
                                error!(error = %e, peer = %addr, "receive error");
                            }
                        })
                        .expect("spawning receiver worker thread");
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    self.stop.sleep_or_stop(ACCEPT_POLL_TIMEOUT);
                }
                Err(e) => {
                    warn!(error = %e, "accept error");
                    self.stop.sleep_or_stop(ACCEPT_POLL_TIMEOUT);
                }
            }
        }
    }
}

fn handle_peer(
    mut stream: TcpStream,
    peer_host: String,
    download_dir: &Path,
    identity: &Identity,
    state: &AppState,
    history: &TransferHistory,
    oracle: &Arc<dyn ConsentOracle>,
    ui_poster: &UiPoster,
) -> anyhow::Result<()> {
    let mut channel = SecureChannel::handshake(&mut stream, identity, None)?;

    let req: SendRequest = protocol::read_message(&mut stream, Some(&mut channel))?;
    if req.kind != "send_request" {
        warn!(peer = %peer_host, "unknown request type");
        return Ok(());
    }

    let num_files = req.files.len() as u32;
    let total = req.total;
    let start_time = Instant::now();

    let accepted = if state.status() == AppStatus::Busy {
        false
    } else {
        // Spec's "posts a deferred request to the UI and blocks the worker
        // on a one-shot notification": the UI is notified first, then this
        // thread blocks on the oracle's answer.
        let notice_peer = req.peer_name.clone();
        ui_poster(Box::new(move || {
            debug!(peer = %notice_peer, files = num_files, bytes = total, "incoming transfer request");
        }));
        let peer_name = req.peer_name.clone();
        let oracle = oracle.clone();
        crate::consent::ask_with_timeout(move || oracle.ask(&peer_name, num_files, total))
    };

    protocol::write_message(&mut stream, Some(&mut channel), &SendResponse { accept: accepted })?;
    if !accepted {
        info!(peer = %req.peer_name, "transfer rejected locally");
        return Ok(());
    }

    state.start_transfer(&peer_host);
    let ingest_result = ingest_files(&mut stream, &mut channel, &req, total, download_dir, state, &peer_host);

    let duration = start_time.elapsed().as_secs_f64();
    match ingest_result {
        Ok(received_total) => {
            state.update_progress(&peer_host, 1.0, received_total);
            history.add_record(TransferRecord {
                timestamp: unix_timestamp(),
                direction: "received".to_string(),
                peer_name: req.peer_name.clone(),
                peer_host: peer_host.clone(),
                num_files: req.files.len() as u32,
                total_size: total,
                duration,
                status: RecordStatus::Completed,
                error_msg: None,
            });
            state.clear_progress(&peer_host);
            Ok(())
        }
        Err(e) => {
            state.set_transfer_status(&peer_host, TransferStatus::Error);
            state.clear_progress(&peer_host);
            Err(e)
        }
    }
}

/// Any short read, truncated chunk, or protocol violation aborts the
/// whole transfer; the partial file already written is left on disk.
fn ingest_files(
    stream: &mut TcpStream,
    channel: &mut SecureChannel,
    req: &SendRequest,
    total: u64,
    download_dir: &Path,
    state: &AppState,
    peer_host: &str,
) -> anyhow::Result<u64> {
    let mut received_total: u64 = 0;

    for _ in &req.files {
        let header: FileHeader = protocol::read_message(stream, Some(channel))?;
        let dest_name = sanitize_basename(&header.file)?;
        let dest_path = download_dir.join(&dest_name);
        info!(file = %dest_name, size = header.size, "receiving file");

        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&dest_path)?;

        let mut remaining = header.size;
        while remaining > 0 {
            let chunk: FileChunk = protocol::read_message(stream, Some(channel))?;
            let bytes = chunk.into_bytes()?;
            if bytes.len() as u64 > remaining {
                anyhow::bail!("file_chunk exceeds declared size for {dest_name}");
            }
            out.write_all(&bytes)?;
            received_total += bytes.len() as u64;
            remaining -= bytes.len() as u64;
            if total > 0 {
                state.update_progress(peer_host, received_total as f64 / total as f64, received_total);
            }
        }
        debug!(file = %dest_name, "file received");
    }

    Ok(received_total)
}

/// Reduce an incoming `file` field to its basename; reject path
/// separators or `..` segments as a protocol violation. Any component
/// other than the final one is a traversal attempt, not just a basename
/// to be stripped.
fn sanitize_basename(file: &str) -> anyhow::Result<String> {
    if file.is_empty() || file.contains('/') || file.contains('\\') {
        anyhow::bail!("unsafe file name: {file}");
    }
    if file == ".." || file == "." {
        anyhow::bail!("unsafe file name: {file}");
    }
    Ok(file.to_string())
}

fn unix_timestamp() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
