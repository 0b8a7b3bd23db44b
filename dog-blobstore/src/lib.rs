//! # dog-blobstore: streaming blob upload and ranged retrieval
//!
//! `dog-blobstore` moves arbitrarily large byte streams into an object store
//! without holding the whole object in memory, and reads them back whole or by
//! inclusive byte range.
//!
//! ## Key Features
//!
//! - **Streaming uploads**: the source is cut into fixed-size parts and sent as
//!   a multipart upload, one part in memory at a time
//! - **Small-object fallback**: streams that end below the multipart minimum
//!   are written with a single put instead
//! - **Abort on failure**: an opened session always ends in exactly one of
//!   complete or abort
//! - **Range reads**: `start:end` text, inclusive on both ends
//! - **Pluggable backends**: S3-compatible services, the local filesystem, or
//!   memory
//!
//! ## Quick Start
//!
//! ```rust
//! use dog_blobstore::prelude::*;
//! use futures_util::StreamExt;
//!
//! # #[tokio::main]
//! # async fn main() -> BlobResult<()> {
//! let blobs = BlobAdapter::new(MemoryStore::new(), BlobConfig::default())?;
//!
//! let body: ByteStream = Box::pin(futures_util::stream::iter(vec![
//!     Ok(bytes::Bytes::from_static(b"Hello, ")),
//!     Ok(bytes::Bytes::from_static(b"world!")),
//! ]));
//! let receipt = blobs.put("media", "hello.txt", Some(body), Some("text/plain")).await?;
//! assert_eq!(receipt.size_bytes, 13);
//!
//! let mut opened = blobs.get("media", "hello.txt", Some("7:11")).await?;
//! let chunk = opened.stream.next().await.unwrap()?;
//! assert_eq!(&chunk[..], b"world");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │               BlobAdapter                │
//! ├───────────────────┬──────────┬───────────┤
//! │ UploadCoordinator │ Range-   │ Lister /  │
//! │  + StreamChunker  │ Reader   │ Deleter   │
//! ├───────────────────┴──────────┴───────────┤
//! │  StorageBackend (S3 / Fs / Memory)       │
//! └──────────────────────────────────────────┘
//! ```

pub mod adapter;
mod catalog;
pub mod chunker;
mod config;
mod coordinator;
mod error;
mod fs_store;
mod memory_store;
mod reader;
mod receipt;
mod s3_store;
pub mod store;
mod types;
mod upload;

pub use adapter::BlobAdapter;
pub use catalog::{BlobMetadata, Deleter, Lister, DEFAULT_CONTENT_TYPE};
pub use chunker::{Part, StreamChunker};
pub use config::{BlobConfig, UploadRules, MIN_MULTIPART_SIZE, PART_SIZE};
pub use coordinator::UploadCoordinator;
pub use error::{BlobError, BlobResult, ErrorKind};
pub use fs_store::FsStore;
pub use memory_store::MemoryStore;
pub use reader::RangeReader;
pub use receipt::{PutReceipt, UploadInfo};
pub use s3_store::{S3CompatibleStore, S3Config};
pub use store::{GetResult, ObjectEntry, PutResult, StorageBackend};
pub use types::{BlobIdentity, ByteRange, ByteStream, UploadId, RANGE_DELIMITER};
pub use upload::{PartDescriptor, UploadSession, UploadStatus};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BlobAdapter, BlobConfig, BlobError, BlobMetadata, BlobResult, ByteRange, ByteStream,
        MemoryStore, PutReceipt, StorageBackend, UploadRules,
    };
}
