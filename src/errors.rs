use thiserror::Error;

pub type Result<T> = std::result::Result<T, GenError>;

#[derive(Error, Debug)]
pub enum GenError {
    #[error("unsupported provider: {0}")] UnsupportedProvider(String),
    #[error("unsupported framework: {0}")] UnsupportedFramework(String),
    #[error("invalid request: {0}")] InvalidRequest(String),
    #[error("authentication failed: {0}")] Authentication(String),
    #[error("provider error: {message}")] Provider { message: String, retryable: bool },
    /// `raw` keeps the backend text for diagnostics; it is not part of `Display`.
    #[error("malformed response: {reason}")] MalformedResponse { reason: String, raw: String },
    #[error("invalid path {path:?}: {reason}")] InvalidPath { path: String, reason: String },
    #[error("{0}")] InvalidCsv(String),
    #[error("archive error: {0}")] Archive(String),
    #[error("io error: {0}")] Io(#[from] std::io::Error),
}

impl GenError {
    pub fn transient(message: impl Into<String>) -> Self {
        GenError::Provider { message: message.into(), retryable: true }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        GenError::Provider { message: message.into(), retryable: false }
    }

    pub fn malformed(reason: impl Into<String>, raw: &str) -> Self {
        GenError::MalformedResponse { reason: reason.into(), raw: raw.to_string() }
    }

    pub fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        GenError::InvalidPath { path: path.to_string(), reason: reason.into() }
    }

    /// Stable taxonomy code surfaced to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            GenError::UnsupportedProvider(_) => "UNSUPPORTED_PROVIDER",
            GenError::UnsupportedFramework(_) => "UNSUPPORTED_FRAMEWORK",
            GenError::InvalidRequest(_) => "INVALID_REQUEST",
            GenError::Authentication(_) => "AUTHENTICATION_ERROR",
            GenError::Provider { .. } => "PROVIDER_ERROR",
            GenError::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            GenError::InvalidPath { .. } => "INVALID_PATH",
            GenError::InvalidCsv(_) => "INVALID_CSV",
            GenError::Archive(_) => "ARCHIVE_ERROR",
            GenError::Io(_) => "IO_ERROR",
        }
    }

    /// Only transient backend failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GenError::Provider { retryable: true, .. })
    }
}

impl From<zip::result::ZipError> for GenError {
    fn from(e: zip::result::ZipError) -> Self {
        GenError::Archive(e.to_string())
    }
}
