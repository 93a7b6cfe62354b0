use thiserror::Error;

pub type Result<T> = std::result::Result<T, PzipError>;

#[derive(Debug, Error)]
pub enum PzipError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    #[error("invalid compression level {0}: want value in range [-2, 9]")]
    InvalidLevel(i32),
    #[error("compression error: {0}")]
    Compression(String),
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),
    #[error("invalid duplicate file header")]
    DuplicateHeader,
    #[error("this worker has not been opened")]
    WorkerNotOpened,
    #[error("this worker has been closed")]
    WorkerClosed,
    #[error("cancelled: {0}")]
    Cancelled(String),
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("zip reader error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<PzipError>,
    },
    #[error("{}", join_error_list(.0))]
    Multiple(Vec<PzipError>),
}

fn join_error_list(errors: &[PzipError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl PzipError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Collapses a list of errors into one, preserving order. The first
    /// error is the canonical cause; later errors ride along.
    pub fn join(errors: Vec<PzipError>) -> Option<PzipError> {
        let mut errors = errors;
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(PzipError::Multiple(errors)),
        }
    }
}
