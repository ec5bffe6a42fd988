//! Periodic multicast beacon announcing this node's presence and status.
use std::net::UdpSocket;
use std::sync::Arc;

use tracing::warn;

use crate::discovery::{Advertisement, ADVERTISE_INTERVAL};
use crate::net::{self, MULTICAST_GROUP};
use crate::state::AppState;
use crate::stop::StopToken;

pub struct Advertiser {
    socket: UdpSocket,
    device_name: String,
    listen_port: u16,
    discovery_port: u16,
    state: Arc<AppState>,
    stop: StopToken,
}

impl Advertiser {
    pub fn new(
        device_name: String,
        listen_port: u16,
        discovery_port: u16,
        state: Arc<AppState>,
        stop: StopToken,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            socket: net::multicast_send_socket()?,
            device_name,
            listen_port,
            discovery_port,
            state,
            stop,
        })
    }

    /// Spawn the beacon thread. Emits a datagram every 1.5 s regardless of
    /// local AVAILABLE/BUSY status — peers use the embedded status, not the
    /// beacon's presence, to decide UI affordances.
    pub fn spawn(self) -> std::thread::JoinHandle<()> {
        std::thread::Builder::new()
            .name("fishare-advertiser".into())
            .spawn(move || self.run())
            .expect("spawning advertiser thread")
    }

    fn run(self) {
        let target = (MULTICAST_GROUP, self.discovery_port);
        while !self.stop.is_stopped() {
            let adv = Advertisement::new(
                self.device_name.clone(),
                net::local_ip().to_string(),
                self.listen_port,
                self.state.status().as_wire_str(),
            );
            match serde_json::to_vec(&adv) {
                Ok(bytes) => {
                    if let Err(e) = self.socket.send_to(&bytes, target) {
                        warn!(error = %e, "advertise send failed");
                    }
                }
                Err(e) => warn!(error = %e, "advertise serialize failed"),
            }
            self.stop.sleep_or_stop(ADVERTISE_INTERVAL);
        }
    }
}
