//! Transfer history: persisted record of completed/rejected/failed
//! transfers, most-recent-first, capped at 1000 entries.
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

const MAX_RECORDS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Completed,
    Error,
    Canceled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    pub timestamp: f64,
    pub direction: String,
    pub peer_name: String,
    pub peer_host: String,
    pub num_files: u32,
    pub total_size: u64,
    pub duration: f64,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

impl TransferRecord {
    /// Megabytes per second; zero unless the transfer actually completed.
    pub fn speed_mbps(&self) -> f64 {
        if self.duration > 0.0 && self.status == RecordStatus::Completed {
            (self.total_size as f64 / (1024.0 * 1024.0)) / self.duration
        } else {
            0.0
        }
    }
}

pub struct TransferHistory {
    path: PathBuf,
    records: Mutex<Vec<TransferRecord>>,
}

impl TransferHistory {
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join("transfer_history.json");
        let records = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Self {
            path,
            records: Mutex::new(records),
        }
    }

    pub fn add_record(&self, record: TransferRecord) {
        let mut records = self.records.lock();
        records.insert(0, record);
        records.truncate(MAX_RECORDS);
        self.save(&records);
    }

    pub fn all(&self) -> Vec<TransferRecord> {
        self.records.lock().clone()
    }

    pub fn clear_all(&self) {
        let mut records = self.records.lock();
        records.clear();
        self.save(&records);
    }

    fn save(&self, records: &[TransferRecord]) {
        if let Ok(raw) = serde_json::to_string_pretty(records) {
            let _ = std::fs::write(&self.path, raw);
        }
    }
}
