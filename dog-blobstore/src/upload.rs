use serde::{Deserialize, Serialize};

use crate::{BlobError, BlobIdentity, BlobResult, UploadId};

/// Receipt for one successfully uploaded part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartDescriptor {
    pub part_number: u32,
    pub length: u64,
    pub tag: String,
}

/// Status of an upload session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    Active,
    Completed,
    Aborted,
}

/// Multipart upload in flight.
///
/// Parts are recorded by number. Once the session is completed or aborted it
/// accepts no further transitions.
#[derive(Debug, Clone)]
pub struct UploadSession {
    identity: BlobIdentity,
    upload_id: UploadId,
    parts: Vec<PartDescriptor>,
    next_part_number: u32,
    status: UploadStatus,
}

impl UploadSession {
    pub fn new(identity: BlobIdentity, upload_id: UploadId) -> Self {
        Self {
            identity,
            upload_id,
            parts: Vec::new(),
            next_part_number: 1,
            status: UploadStatus::Active,
        }
    }

    pub fn identity(&self) -> &BlobIdentity {
        &self.identity
    }

    pub fn upload_id(&self) -> &UploadId {
        &self.upload_id
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    /// Hand out the next part number; numbers start at 1 and never repeat
    pub fn allocate_part_number(&mut self) -> u32 {
        let n = self.next_part_number;
        self.next_part_number += 1;
        n
    }

    /// Number of part numbers handed out so far
    pub fn allocated_parts(&self) -> u32 {
        self.next_part_number - 1
    }

    pub fn record(&mut self, part: PartDescriptor) -> BlobResult<()> {
        self.ensure_active()?;
        if part.part_number == 0 || part.part_number >= self.next_part_number {
            return Err(BlobError::invalid_input(format!(
                "part {} was never allocated for upload {}",
                part.part_number, self.upload_id
            )));
        }
        if self.parts.iter().any(|p| p.part_number == part.part_number) {
            return Err(BlobError::invalid_input(format!(
                "part {} recorded twice for upload {}",
                part.part_number, self.upload_id
            )));
        }
        self.parts.push(part);
        Ok(())
    }

    pub fn bytes_recorded(&self) -> u64 {
        self.parts.iter().map(|p| p.length).sum()
    }

    /// Parts in ascending part-number order, checked for gaps
    pub fn ordered_parts(&self) -> BlobResult<Vec<PartDescriptor>> {
        let mut parts = self.parts.clone();
        parts.sort_by_key(|p| p.part_number);

        for (index, part) in parts.iter().enumerate() {
            let expected = index as u32 + 1;
            if part.part_number != expected {
                return Err(BlobError::invalid_input(format!(
                    "missing part {} for upload {}",
                    expected, self.upload_id
                )));
            }
        }

        Ok(parts)
    }

    pub fn mark_completed(&mut self) -> BlobResult<()> {
        self.ensure_active()?;
        self.status = UploadStatus::Completed;
        Ok(())
    }

    pub fn mark_aborted(&mut self) -> BlobResult<()> {
        self.ensure_active()?;
        self.status = UploadStatus::Aborted;
        Ok(())
    }

    fn ensure_active(&self) -> BlobResult<()> {
        if self.status != UploadStatus::Active {
            return Err(BlobError::invalid_input(format!(
                "upload session {} is not active ({:?})",
                self.upload_id, self.status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> UploadSession {
        UploadSession::new(
            BlobIdentity::new("bucket", "key").unwrap(),
            UploadId::from_string("upl_test".to_string()),
        )
    }

    fn part(n: u32, len: u64) -> PartDescriptor {
        PartDescriptor {
            part_number: n,
            length: len,
            tag: format!("etag-{n}"),
        }
    }

    #[test]
    fn orders_parts_recorded_out_of_order() {
        let mut s = session();
        for _ in 0..3 {
            s.allocate_part_number();
        }
        s.record(part(3, 1)).unwrap();
        s.record(part(1, 4)).unwrap();
        s.record(part(2, 4)).unwrap();

        let numbers: Vec<u32> = s.ordered_parts().unwrap().iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(s.bytes_recorded(), 9);
    }

    #[test]
    fn detects_gaps() {
        let mut s = session();
        s.allocate_part_number();
        s.allocate_part_number();
        s.record(part(2, 1)).unwrap();
        assert!(s.ordered_parts().is_err());
    }

    #[test]
    fn rejects_unallocated_and_duplicate_parts() {
        let mut s = session();
        assert!(s.record(part(1, 1)).is_err());
        s.allocate_part_number();
        s.record(part(1, 1)).unwrap();
        assert!(s.record(part(1, 1)).is_err());
    }

    #[test]
    fn terminal_states_are_exclusive() {
        let mut s = session();
        s.mark_aborted().unwrap();
        assert_eq!(s.status(), UploadStatus::Aborted);
        assert!(s.mark_completed().is_err());
        assert!(s.mark_aborted().is_err());
    }
}
