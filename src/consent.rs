//! The consent oracle: the pluggable callback a Receiver-worker blocks on
//! before accepting an incoming transfer. Rendering the actual dialog is
//! the GUI collaborator's job; this crate only defines the interface and
//! two trivial implementations useful for headless operation and tests.
use std::time::Duration;

use crossbeam_channel::bounded;

const CONSENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Invoked off the UI thread with `(peer_name, num_files, total_bytes)`.
/// A timeout (or any oracle that never answers) is treated as reject.
pub trait ConsentOracle: Send + Sync {
    fn ask(&self, peer_name: &str, num_files: u32, total_bytes: u64) -> bool;
}

pub struct AutoAcceptOracle;

impl ConsentOracle for AutoAcceptOracle {
    fn ask(&self, _peer_name: &str, _num_files: u32, _total_bytes: u64) -> bool {
        true
    }
}

pub struct AutoRejectOracle;

impl ConsentOracle for AutoRejectOracle {
    fn ask(&self, _peer_name: &str, _num_files: u32, _total_bytes: u64) -> bool {
        false
    }
}

/// Run `decide` on a scratch thread and wait up to 30 s for its answer.
/// A `ConsentOracle` whose own `ask` blocks on UI interaction composes
/// naturally with this: the oracle posts to the UI thread and waits on
/// its own one-shot notification internally.
pub fn ask_with_timeout<F>(decide: F) -> bool
where
    F: FnOnce() -> bool + Send + 'static,
{
    let (tx, rx) = bounded(1);
    std::thread::spawn(move || {
        let answer = decide();
        let _ = tx.send(answer);
    });
    rx.recv_timeout(CONSENT_TIMEOUT).unwrap_or(false)
}
