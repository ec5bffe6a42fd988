//! Shared application state: device registry, selection, progress, and
//! per-peer transfer status, all serialized through one reentrant mutex
//! (invariant I4).
use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Instant;

use parking_lot::ReentrantMutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppStatus {
    Available,
    Busy,
}

impl AppStatus {
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            AppStatus::Available => "available",
            AppStatus::Busy => "busy",
        }
    }

    /// Unknown values default to BUSY, per the discovery parse rule.
    pub fn from_wire_str(s: &str) -> Self {
        match s {
            "available" => AppStatus::Available,
            _ => AppStatus::Busy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Completed,
    Error,
    Canceled,
}

#[derive(Debug, Clone)]
pub struct Device {
    pub device_id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub status: AppStatus,
    pub last_seen: Instant,
}

impl Device {
    pub fn new(name: String, host: String, port: u16, status: AppStatus) -> Self {
        Self {
            device_id: format!("{host}:{port}"),
            name,
            host,
            port,
            status,
            last_seen: Instant::now(),
        }
    }
}

struct Inner {
    status: AppStatus,
    devices: HashMap<String, Device>,
    selected_device_ids: Vec<String>,
    selected_files: Vec<String>,
    progress: HashMap<String, f64>,
    transfer_status: HashMap<String, TransferStatus>,
    transfer_speeds: HashMap<String, f64>,
    transfer_start_times: HashMap<String, Instant>,
    transfer_bytes: HashMap<String, u64>,
}

/// All accesses serialize through a single reentrant mutex; every public
/// method locks, mutates, and returns without calling another public
/// method while holding the guard.
pub struct AppState {
    inner: ReentrantMutex<RefCell<Inner>>,
}

impl AppState {
    pub fn new(allow_incoming: bool) -> Self {
        let status = if allow_incoming {
            AppStatus::Available
        } else {
            AppStatus::Busy
        };
        Self {
            inner: ReentrantMutex::new(RefCell::new(Inner {
                status,
                devices: HashMap::new(),
                selected_device_ids: Vec::new(),
                selected_files: Vec::new(),
                progress: HashMap::new(),
                transfer_status: HashMap::new(),
                transfer_speeds: HashMap::new(),
                transfer_start_times: HashMap::new(),
                transfer_bytes: HashMap::new(),
            })),
        }
    }

    pub fn status(&self) -> AppStatus {
        let guard = self.inner.lock();
        guard.borrow().status
    }

    pub fn set_status(&self, status: AppStatus) {
        let guard = self.inner.lock();
        guard.borrow_mut().status = status;
    }

    pub fn upsert_device(&self, device: Device) {
        let guard = self.inner.lock();
        guard.borrow_mut().devices.insert(device.device_id.clone(), device);
    }

    pub fn device(&self, device_id: &str) -> Option<Device> {
        let guard = self.inner.lock();
        guard.borrow().devices.get(device_id).cloned()
    }

    pub fn devices(&self) -> Vec<Device> {
        let guard = self.inner.lock();
        guard.borrow().devices.values().cloned().collect()
    }

    /// Remove devices whose `last_seen` is older than `ttl`, along with
    /// their progress row and any now-dangling selection entries.
    pub fn prune_devices(&self, ttl: std::time::Duration) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let now = Instant::now();
        let stale: Vec<String> = inner
            .devices
            .iter()
            .filter(|(_, d)| now.duration_since(d.last_seen) >= ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            inner.devices.remove(id);
            inner.progress.remove(id);
            inner.transfer_status.remove(id);
            inner.transfer_speeds.remove(id);
            inner.transfer_start_times.remove(id);
            inner.transfer_bytes.remove(id);
        }
        inner.selected_device_ids.retain(|id| inner.devices.contains_key(id));
    }

    pub fn set_selected_devices(&self, ids: Vec<String>) {
        let guard = self.inner.lock();
        guard.borrow_mut().selected_device_ids = ids;
    }

    pub fn selected_devices(&self) -> Vec<String> {
        let guard = self.inner.lock();
        guard.borrow().selected_device_ids.clone()
    }

    pub fn set_selected_files(&self, files: Vec<String>) {
        let guard = self.inner.lock();
        guard.borrow_mut().selected_files = files;
    }

    pub fn selected_files(&self) -> Vec<String> {
        let guard = self.inner.lock();
        guard.borrow().selected_files.clone()
    }

    pub fn start_transfer(&self, device_id: &str) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.progress.insert(device_id.to_string(), 0.0);
        inner.transfer_bytes.insert(device_id.to_string(), 0);
        inner.transfer_speeds.insert(device_id.to_string(), 0.0);
        inner.transfer_start_times.insert(device_id.to_string(), Instant::now());
        inner.transfer_status.remove(device_id);
    }

    /// Updates aggregate progress and, when `bytes > 0`, recomputes the
    /// running transfer speed in MB/s from elapsed time since
    /// `start_transfer`.
    pub fn update_progress(&self, device_id: &str, ratio: f64, bytes: u64) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.progress.insert(device_id.to_string(), ratio.clamp(0.0, 1.0));
        if bytes > 0 {
            inner.transfer_bytes.insert(device_id.to_string(), bytes);
            if let Some(start) = inner.transfer_start_times.get(device_id) {
                let elapsed = start.elapsed().as_secs_f64();
                if elapsed > 0.0 {
                    let mbps = (bytes as f64 / (1024.0 * 1024.0)) / elapsed;
                    inner.transfer_speeds.insert(device_id.to_string(), mbps);
                }
            }
        }
    }

    pub fn progress(&self, device_id: &str) -> Option<f64> {
        let guard = self.inner.lock();
        guard.borrow().progress.get(device_id).copied()
    }

    /// Current running transfer speed in MB/s; `0.0` if no transfer is
    /// in flight for this peer.
    pub fn transfer_speed(&self, device_id: &str) -> f64 {
        let guard = self.inner.lock();
        guard.borrow().transfer_speeds.get(device_id).copied().unwrap_or(0.0)
    }

    pub fn clear_progress(&self, device_id: &str) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.progress.remove(device_id);
        inner.transfer_speeds.remove(device_id);
        inner.transfer_start_times.remove(device_id);
        inner.transfer_bytes.remove(device_id);
    }

    pub fn set_transfer_status(&self, device_id: &str, status: TransferStatus) {
        let guard = self.inner.lock();
        guard
            .borrow_mut()
            .transfer_status
            .insert(device_id.to_string(), status);
    }

    pub fn transfer_status(&self, device_id: &str) -> Option<TransferStatus> {
        let guard = self.inner.lock();
        guard.borrow().transfer_status.get(device_id).copied()
    }
}
