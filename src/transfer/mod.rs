mod receiver;
mod sender;

pub use receiver::Receiver;
pub use sender::send_to;

use std::time::Duration;

pub const MAX_RETRIES: u32 = 3;
pub const RETRY_BACKOFF: Duration = Duration::from_secs(2);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const ACCEPT_POLL_TIMEOUT: Duration = Duration::from_secs(1);
