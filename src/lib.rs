//! FIshare core: discovery, secure session establishment, the transfer
//! protocol state machine, and the shared application state. The GUI,
//! file picker, and confirmation dialog are external collaborators —
//! this crate only defines the interfaces they plug into.
pub mod config;
pub mod consent;
pub mod discovery;
pub mod error;
pub mod history;
pub mod identity;
pub mod net;
pub mod protocol;
pub mod secure_channel;
pub mod state;
pub mod stop;
pub mod transfer;
pub mod ui;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::consent::ConsentOracle;
use crate::discovery::{Advertiser, Scanner};
use crate::history::TransferHistory;
use crate::identity::Identity;
use crate::state::AppState;
use crate::stop::StopToken;
use crate::transfer::Receiver;
use crate::ui::UiPoster;

/// Everything the running node needs, assembled once at startup and
/// handed to the five background threads spec.md's concurrency model
/// describes (one Advertiser, one Scanner-listener, one Scanner-GC, one
/// Receiver-accept, N Receiver-workers/M Sender-workers spawned on demand).
pub struct Node {
    pub config: Config,
    pub identity: Arc<Identity>,
    pub state: Arc<AppState>,
    pub history: Arc<TransferHistory>,
    pub stop: StopToken,
    handles: Vec<std::thread::JoinHandle<()>>,
}

impl Node {
    pub fn start(data_dir: PathBuf, oracle: Arc<dyn ConsentOracle>, ui_poster: UiPoster) -> Result<Self> {
        let config = Config::load(&data_dir)?;
        let identity = Arc::new(Identity::load_or_create(&data_dir)?);
        let state = Arc::new(AppState::new(config.allow_incoming));
        let history = Arc::new(TransferHistory::load(&data_dir));
        let stop = StopToken::new();

        let mut handles = Vec::new();

        let advertiser = Advertiser::new(
            config.device_name.clone(),
            config.listen_port,
            config.discovery_port,
            state.clone(),
            stop.clone(),
        )?;
        handles.push(advertiser.spawn());

        let scanner = Scanner::new(config.discovery_port, config.listen_port, state.clone(), stop.clone())?;
        let (listen_handle, gc_handle) = scanner.spawn();
        handles.push(listen_handle);
        handles.push(gc_handle);

        let receiver = Receiver::bind(
            config.listen_port,
            config.download_dir.clone(),
            identity.clone(),
            state.clone(),
            history.clone(),
            oracle,
            ui_poster,
            stop.clone(),
        )?;
        handles.push(receiver.spawn());

        Ok(Self {
            config,
            identity,
            state,
            history,
            stop,
            handles,
        })
    }

    /// Send `files` to the device identified by `device_id`, blocking the
    /// calling thread for the whole sender state machine (retries
    /// included). Callers that want this off the calling thread should
    /// spawn it themselves — one sender-worker thread per in-flight
    /// outbound transfer, per spec.md's concurrency model.
    pub fn send_to(&self, device_id: &str, files: &[PathBuf]) -> Result<()> {
        let device = self
            .state
            .device(device_id)
            .ok_or_else(|| anyhow::anyhow!("unknown device {device_id}"))?;
        transfer::send_to(
            device_id,
            &device.host,
            device.port,
            &device.name,
            files,
            &self.identity,
            &self.state,
            &self.history,
        )
    }

    /// Trip the cooperative stop signal; background threads exit at their
    /// next tick. Does not abort in-flight transfers (see DESIGN.md).
    pub fn shutdown(self) {
        self.stop.stop();
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}
