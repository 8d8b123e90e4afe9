//! Error types for the venue session

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Venue request failed: {0}")]
    Venue(#[from] anyhow::Error),

    #[error("Bar fetch already in flight for {symbol}")]
    BarFetchInProgress { symbol: String },

    #[error("Bar fetch for {symbol} lost with the venue connection")]
    BarFetchAborted { symbol: String },

    #[error("No connection parameters were ever supplied")]
    MissingConnectionParams,

    #[error("Session event pump has stopped")]
    Terminated,

    #[error("State storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("State decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
