use thiserror::Error;

/// Result type for blob operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Coarse classification of a [`BlobError`], for callers that map errors onto
/// their own surface (HTTP status codes, exit codes, retries).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    InvalidRange,
    NotFound,
    RangeNotSatisfiable,
    Backend,
    Io,
}

/// Errors that can occur during blob operations
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Invalid range '{range}': {reason}")]
    InvalidRange { range: String, reason: String },

    #[error("Blob not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Range {start}:{end} not satisfiable for {key}")]
    RangeNotSatisfiable { key: String, start: u64, end: u64 },

    #[error("Storage backend error during {operation}: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl BlobError {
    /// Wrap any backend failure, tagging it with the operation that produced it
    pub fn backend<E>(operation: &'static str, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Backend {
            operation,
            source: error.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an invalid range error
    pub fn invalid_range<R: Into<String>, S: Into<String>>(range: R, reason: S) -> Self {
        Self::InvalidRange {
            range: range.into(),
            reason: reason.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<B: Into<String>, K: Into<String>>(bucket: B, key: K) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::InvalidRange { .. } => ErrorKind::InvalidRange,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::RangeNotSatisfiable { .. } => ErrorKind::RangeNotSatisfiable,
            Self::Backend { .. } => ErrorKind::Backend,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_keeps_operation_and_source() {
        let err = BlobError::backend("upload_part", "connection reset");
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert_eq!(
            err.to_string(),
            "Storage backend error during upload_part: connection reset"
        );
    }

    #[test]
    fn io_errors_convert() {
        let err: BlobError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
