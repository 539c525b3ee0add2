use shared::domain::IgniterNr;
use thiserror::Error;

/// A frame that could not be turned into a [`shared::protocol::ServerEvent`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    NotJson(#[source] serde_json::Error),
    #[error("frame has an invalid payload: {0}")]
    Payload(#[source] serde_json::Error),
    #[error("binary frames are not part of the protocol ({0} bytes)")]
    Binary(usize),
}

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("invalid controller origin '{origin}': {source}")]
    InvalidOrigin {
        origin: String,
        source: url::ParseError,
    },
    #[error("controller origin must use http or https, got '{0}'")]
    UnsupportedScheme(String),
}

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("maintenance request for direct igniter {nr} failed: {source}")]
    Transport {
        nr: IgniterNr,
        source: reqwest::Error,
    },
    #[error("controller rejected availability change for direct igniter {0}")]
    Rejected(IgniterNr),
    #[error("invalid maintenance url: {0}")]
    Url(#[from] url::ParseError),
}
