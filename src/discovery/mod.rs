mod advertiser;
mod scanner;

pub use advertiser::Advertiser;
pub use scanner::Scanner;

use serde::{Deserialize, Serialize};

pub const ADVERTISE_INTERVAL: std::time::Duration = std::time::Duration::from_millis(1500);
pub const GC_INTERVAL: std::time::Duration = std::time::Duration::from_secs(2);
pub const DEVICE_TTL: std::time::Duration = std::time::Duration::from_secs(6);
pub const MAX_PACKET_LEN: usize = 4096;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Advertisement {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub status: String,
}

impl Advertisement {
    pub const KIND: &'static str = "fishare_adv";

    pub fn new(name: String, host: String, port: u16, status: &str) -> Self {
        Self {
            kind: Self::KIND.to_string(),
            name,
            host,
            port,
            status: status.to_string(),
        }
    }
}
