//! Passive multicast listener plus its liveness GC.
use std::net::UdpSocket;
use std::sync::Arc;

use tracing::debug;

use crate::discovery::{Advertisement, DEVICE_TTL, GC_INTERVAL, MAX_PACKET_LEN};
use crate::net;
use crate::state::{AppState, AppStatus, Device};
use crate::stop::StopToken;

pub struct Scanner {
    socket: UdpSocket,
    listen_port: u16,
    state: Arc<AppState>,
    stop: StopToken,
}

impl Scanner {
    pub fn new(discovery_port: u16, listen_port: u16, state: Arc<AppState>, stop: StopToken) -> anyhow::Result<Self> {
        Ok(Self {
            socket: net::multicast_receive_socket(discovery_port)?,
            listen_port,
            state,
            stop,
        })
    }

    /// Spawn the listener thread and the GC thread; returns both handles.
    pub fn spawn(self) -> (std::thread::JoinHandle<()>, std::thread::JoinHandle<()>) {
        let Scanner {
            socket,
            listen_port,
            state,
            stop,
        } = self;

        let gc_state = state.clone();
        let gc_stop = stop.clone();
        let gc_handle = std::thread::Builder::new()
            .name("fishare-scanner-gc".into())
            .spawn(move || {
                while !gc_stop.is_stopped() {
                    gc_state.prune_devices(DEVICE_TTL);
                    gc_stop.sleep_or_stop(GC_INTERVAL);
                }
            })
            .expect("spawning scanner GC thread");

        let listen_handle = std::thread::Builder::new()
            .name("fishare-scanner-listen".into())
            .spawn(move || listen_loop(socket, listen_port, state, stop))
            .expect("spawning scanner listen thread");

        (listen_handle, gc_handle)
    }
}

fn listen_loop(socket: UdpSocket, listen_port: u16, state: Arc<AppState>, stop: StopToken) {
    let mut buf = [0u8; MAX_PACKET_LEN];
    let local_ip = net::local_ip().to_string();
    while !stop.is_stopped() {
        match socket.recv_from(&mut buf) {
            Ok((n, src)) => {
                if let Err(e) = handle_packet(&buf[..n], src, listen_port, &local_ip, &state) {
                    debug!(error = %e, "scan error");
                }
            }
            Err(ref e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
                continue;
            }
            Err(e) => {
                debug!(error = %e, "scanner socket error");
            }
        }
    }
}

fn handle_packet(
    data: &[u8],
    src: std::net::SocketAddr,
    listen_port: u16,
    local_ip: &str,
    state: &AppState,
) -> anyhow::Result<()> {
    let adv: Advertisement = serde_json::from_slice(data)?;
    if adv.kind != Advertisement::KIND {
        return Ok(());
    }

    let adv_host = if adv.host.is_empty() {
        src.ip().to_string()
    } else {
        adv.host.clone()
    };
    let adv_port = adv.port;

    if adv_host == local_ip && adv_port == listen_port {
        return Ok(());
    }

    let status = AppStatus::from_wire_str(&adv.status);
    let device = Device::new(adv.name, adv_host, adv_port, status);
    state.upsert_device(device);
    Ok(())
}
