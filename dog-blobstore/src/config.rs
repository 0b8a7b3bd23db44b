use crate::{BlobError, BlobResult};

/// Size at which a buffered part is flushed to the backend
pub const PART_SIZE: u64 = 50 * 1024 * 1024;

/// Smallest part most providers accept for a non-final multipart part
pub const MIN_MULTIPART_SIZE: u64 = 5 * 1024 * 1024;

/// Configuration for blob operations
#[derive(Debug, Clone, Default)]
pub struct BlobConfig {
    /// Rules for part-based uploads
    pub upload_rules: UploadRules,
}

impl BlobConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set upload rules
    pub fn with_upload_rules(mut self, rules: UploadRules) -> Self {
        self.upload_rules = rules;
        self
    }
}

/// Rules for multipart uploads
#[derive(Debug, Clone)]
pub struct UploadRules {
    /// Bytes buffered per part before it is uploaded
    pub part_size: u64,

    /// Objects smaller than this with no full part go through a single put
    pub min_multipart_size: u64,

    /// Part uploads allowed in flight at once. 1 means strictly sequential.
    pub part_concurrency: usize,
}

impl Default for UploadRules {
    fn default() -> Self {
        Self {
            part_size: PART_SIZE,
            min_multipart_size: MIN_MULTIPART_SIZE,
            part_concurrency: 1,
        }
    }
}

impl UploadRules {
    /// Create new upload rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Set part size
    pub fn with_part_size(mut self, bytes: u64) -> Self {
        self.part_size = bytes;
        self
    }

    /// Set the single-put threshold
    pub fn with_min_multipart_size(mut self, bytes: u64) -> Self {
        self.min_multipart_size = bytes;
        self
    }

    /// Allow up to `parts` part uploads in flight
    pub fn with_part_concurrency(mut self, parts: usize) -> Self {
        self.part_concurrency = parts;
        self
    }

    pub fn validate(&self) -> BlobResult<()> {
        if self.min_multipart_size == 0 {
            return Err(BlobError::invalid_input("min_multipart_size must be positive"));
        }
        if self.part_size < self.min_multipart_size {
            return Err(BlobError::invalid_input(format!(
                "part_size {} is below min_multipart_size {}",
                self.part_size, self.min_multipart_size
            )));
        }
        if usize::try_from(self.part_size).is_err() {
            return Err(BlobError::invalid_input(format!(
                "part_size {} does not fit in memory on this platform",
                self.part_size
            )));
        }
        if self.part_concurrency == 0 {
            return Err(BlobError::invalid_input("part_concurrency must be at least 1"));
        }
        Ok(())
    }
}
