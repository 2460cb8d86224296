use thiserror::Error;

/// Failures that stop a scan or a host from being recorded.
#[derive(Error, Debug)]
pub enum ScanError {
    /// The rendering engine could not be started; no host could ever succeed.
    #[error("rendering engine unavailable: {0}")]
    RendererUnavailable(String),

    #[error("HTTP client unavailable: {0}")]
    ClientUnavailable(String),

    #[error("host list error: {0}")]
    HostList(String),

    /// One or more output representations failed to persist a record.
    #[error("failed to persist record for {host}: {details}")]
    Sink { host: String, details: String },
}

/// Failure of a single request made by the HTTP collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout)
    }
}
