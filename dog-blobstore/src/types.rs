use bytes::Bytes;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use uuid::Uuid;

use crate::{BlobError, BlobResult};

/// Stream of bytes for blob content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Delimiter between the two fields of a textual range, e.g. `"0:1023"`
pub const RANGE_DELIMITER: char = ':';

/// Address of a stored object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobIdentity {
    pub bucket: String,
    pub key: String,
}

impl BlobIdentity {
    /// Build an identity, rejecting empty bucket or key
    pub fn new<B: Into<String>, K: Into<String>>(bucket: B, key: K) -> BlobResult<Self> {
        let bucket = bucket.into();
        let key = key.into();

        if bucket.trim().is_empty() {
            return Err(BlobError::invalid_input("bucket must not be empty"));
        }
        if key.trim().is_empty() {
            return Err(BlobError::invalid_input("object key must not be empty"));
        }

        Ok(Self { bucket, key })
    }
}

impl std::fmt::Display for BlobIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Opaque identifier of an in-flight multipart upload, as issued by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadId(pub String);

impl UploadId {
    /// Generate a new random upload ID (for backends that mint their own)
    pub fn new() -> Self {
        Self(format!("upl_{}", Uuid::new_v4().simple()))
    }

    /// Create from existing string
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive byte range for partial reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Parse the `start:end` wire form.
    ///
    /// Only the syntax is checked here. Whether `end >= start` and whether the
    /// range falls inside the object is for the backend to decide.
    pub fn parse(text: &str) -> BlobResult<Self> {
        let fields: Vec<&str> = text.split(RANGE_DELIMITER).collect();
        if fields.len() != 2 {
            return Err(BlobError::invalid_range(
                text,
                format!("expected 'start{RANGE_DELIMITER}end'"),
            ));
        }

        let parse_field = |field: &str, name: &str| {
            field.parse::<u64>().map_err(|_| {
                BlobError::invalid_range(text, format!("{name} is not a non-negative integer"))
            })
        };

        Ok(Self {
            start: parse_field(fields[0], "start")?,
            end: parse_field(fields[1], "end")?,
        })
    }

    /// Parse optional range text; empty or absent means "whole object"
    pub fn parse_optional(text: Option<&str>) -> BlobResult<Option<Self>> {
        match text {
            None => Ok(None),
            Some(t) if t.is_empty() => Ok(None),
            Some(t) => Self::parse(t).map(Some),
        }
    }

    /// Number of bytes covered, when `end >= start`
    pub fn length(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }

    /// HTTP `Range` header value
    pub fn to_http_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.start, RANGE_DELIMITER, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn parses_two_field_range() {
        let range = ByteRange::parse("10:20").unwrap();
        assert_eq!(range, ByteRange::new(10, 20));
        assert_eq!(range.length(), 11);
        assert_eq!(range.to_http_header(), "bytes=10-20");
    }

    #[test]
    fn rejects_wrong_field_count() {
        for text in ["10", "1:2:3", ":"] {
            let err = ByteRange::parse(text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRange, "{text}");
        }
    }

    #[test]
    fn rejects_non_numeric_fields() {
        for text in ["abc:10", "10:xyz", "-1:5", " 1:5", "1.5:2"] {
            let err = ByteRange::parse(text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRange, "{text}");
        }
    }

    #[test]
    fn inverted_range_is_left_to_backend() {
        assert_eq!(ByteRange::parse("20:10").unwrap(), ByteRange::new(20, 10));
    }

    #[test]
    fn empty_or_missing_text_means_whole_object() {
        assert_eq!(ByteRange::parse_optional(None).unwrap(), None);
        assert_eq!(ByteRange::parse_optional(Some("")).unwrap(), None);
        assert_eq!(
            ByteRange::parse_optional(Some("0:1023")).unwrap(),
            Some(ByteRange::new(0, 1023))
        );
    }

    #[test]
    fn identity_requires_key() {
        assert!(BlobIdentity::new("bucket", "a.txt").is_ok());
        let err = BlobIdentity::new("bucket", "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
