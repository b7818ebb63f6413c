use reqwest::StatusCode;

/// Error returned when a sink or provider is built from invalid settings.
///
/// Configuration problems are reported at construction time; the pipeline
/// never starts in a degraded mode.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("source token is missing or blank")]
    MissingSourceToken,

    #[error("invalid endpoint URL `{url}`: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("invalid value `{value}` for {key}")]
    InvalidSetting { key: &'static str, value: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("log provider must be created inside a Tokio runtime")]
    NoRuntime,
}

/// Error returned by a single batch upload.
#[derive(thiserror::Error, Debug)]
pub enum UploadError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("intake responded with status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("failed to serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<UploadError>,
    },
}

impl UploadError {
    /// Whether retrying the same request may succeed: network failures,
    /// request timeout, rate limiting and server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            UploadError::Transport(e) => !e.is_builder(),
            UploadError::Status { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::REQUEST_TIMEOUT
            }
            UploadError::Serialize(_) => false,
            UploadError::RetriesExhausted { .. } => false,
        }
    }

    /// HTTP status of the terminal response, if the intake answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            UploadError::Status { status, .. } => Some(*status),
            UploadError::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

/// Error returned when installing the global subscriber.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to install global subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}
