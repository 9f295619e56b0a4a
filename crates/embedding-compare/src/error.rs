//! Error types shared by the transport, storage and playback layers

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Server answered with a non-success status
    #[error("HTTP status {status}")]
    Http { status: u16 },

    /// Request never produced a status (offline, aborted, CORS, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// Response or stored blob was not the JSON we expected
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio error: {0}")]
    Audio(String),
}

impl Error {
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status } => Some(*status),
            _ => None,
        }
    }

    /// Message shown in the alert when a plot fails to load
    pub fn user_message(&self) -> String {
        match self.status() {
            Some(status) => status_message(status),
            None => "Something went wrong".to_string(),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl From<ureq::Error> for Error {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::StatusCode(status) => Error::Http { status },
            other => Error::Network(other.to_string()),
        }
    }
}

pub fn status_message(status: u16) -> String {
    if status >= 500 {
        return "Something broke on the server".to_string();
    }
    match status {
        404 => "Data not available".to_string(),
        400 => "Invalid data was sent to server".to_string(),
        _ => format!("Something went wrong ({status})"),
    }
}
