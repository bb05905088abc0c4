use bytes::Bytes;
use uuid::Uuid;

/// A contiguous run of serialized records taken from the front of the
/// forward buffer, concatenated into a single wire payload.
///
/// Taking a batch copies nothing out of the queue permanently: the records
/// stay buffered until the caller confirms the write with
/// [`ForwardBuffer::commit`], so a failed send loses nothing.
///
/// [`ForwardBuffer::commit`]: super::ForwardBuffer::commit
#[derive(Debug, Clone)]
pub struct Batch {
    id: String,
    payload: Bytes,
    records: usize,
}

impl Batch {
    pub(super) fn new(payload: Bytes, records: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload,
            records,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn wire_len(&self) -> usize {
        self.payload.len()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }
}
