use thiserror::Error;

/// The error kinds a transfer can fail with.
///
/// Retry policy lives on the type itself (`is_retryable`) so the sender's
/// retry loop never has to duplicate the taxonomy in an `if` chain.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    /// A malformed frame or parse failure during CONNECT/HANDSHAKE/REQUEST/
    /// RESPONSE, before any file bytes have been streamed. Unlike
    /// `Protocol`, these are safe to retry: nothing has been written yet.
    #[error("negotiation error: {0}")]
    Negotiation(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("transfer rejected by recipient")]
    Rejected,

    #[error("peer is busy")]
    Busy,
}

impl TransferError {
    /// Only transport/handshake errors before RESPONSE are retried
    /// (connect failure, read/write error, AEAD failure, parse error).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransferError::Transport(_) | TransferError::Crypto(_) | TransferError::Negotiation(_)
        )
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        TransferError::Protocol(msg.into())
    }

    pub fn crypto(msg: impl Into<String>) -> Self {
        TransferError::Crypto(msg.into())
    }

    /// Reclassify a parse/protocol failure encountered before RESPONSE as
    /// retryable, leaving transport/crypto errors (already retryable) as-is.
    pub fn into_negotiation(self) -> Self {
        match self {
            TransferError::Protocol(msg) => TransferError::Negotiation(msg),
            other => other,
        }
    }
}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self {
        TransferError::Transport(e)
    }
}

impl From<serde_json::Error> for TransferError {
    fn from(e: serde_json::Error) -> Self {
        TransferError::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
