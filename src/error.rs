use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Stream is not connected")]
    NotConnected,

    #[error("Stream connection closed")]
    Closed,

    #[error("Could not serialize outbound message: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response status: {0}")]
    Status(u16),

    #[error("Malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("Malformed inbound message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Inbound message is not text")]
    NotText,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("Invalid url: {0}")]
    Url(String),
}
