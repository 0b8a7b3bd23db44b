use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;

use crate::{BlobError, BlobResult, ByteStream};

/// One slice of the source stream
#[derive(Debug, Clone)]
pub struct Part {
    pub data: Bytes,
    /// The source is exhausted; `data` holds whatever was left, possibly nothing
    pub is_final: bool,
}

impl Part {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Cuts a byte stream into fixed-size parts.
///
/// At most one part is buffered at a time. A stream item that straddles a
/// part boundary is split; its tail is kept and served before the source is
/// polled again. The source is dropped as soon as it reports the end of the
/// stream or an error.
pub struct StreamChunker {
    source: Option<ByteStream>,
    pending: Bytes,
    consumed: u64,
}

impl StreamChunker {
    pub fn new(source: ByteStream) -> Self {
        Self {
            source: Some(source),
            pending: Bytes::new(),
            consumed: 0,
        }
    }

    /// Total bytes handed out in parts so far
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn is_exhausted(&self) -> bool {
        self.source.is_none() && self.pending.is_empty()
    }

    /// Pull the next part of at most `max_size` bytes.
    ///
    /// Returns a full `max_size` part with `is_final == false` as soon as
    /// enough bytes are buffered, without probing the source for more.
    pub async fn next_part(&mut self, max_size: usize) -> BlobResult<Part> {
        if max_size == 0 {
            return Err(BlobError::invalid_input("part size must be positive"));
        }

        let mut buffer = BytesMut::new();

        loop {
            let needed = max_size - buffer.len();
            if needed == 0 {
                return Ok(self.emit(buffer.freeze(), false));
            }

            let mut chunk = if !self.pending.is_empty() {
                std::mem::take(&mut self.pending)
            } else {
                match self.pull().await? {
                    Some(chunk) => chunk,
                    None => return Ok(self.emit(buffer.freeze(), true)),
                }
            };

            if chunk.len() > needed {
                self.pending = chunk.split_off(needed);
            }

            if buffer.is_empty() && chunk.len() == max_size {
                return Ok(self.emit(chunk, false));
            }
            buffer.extend_from_slice(&chunk);
        }
    }

    async fn pull(&mut self) -> BlobResult<Option<Bytes>> {
        let Some(source) = self.source.as_mut() else {
            return Ok(None);
        };

        loop {
            match source.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => return Ok(Some(chunk)),
                Some(Err(err)) => {
                    self.source = None;
                    return Err(BlobError::from(err));
                }
                None => {
                    self.source = None;
                    return Ok(None);
                }
            }
        }
    }

    fn emit(&mut self, data: Bytes, is_final: bool) -> Part {
        self.consumed += data.len() as u64;
        Part { data, is_final }
    }
}
