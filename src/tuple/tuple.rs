use bytes::Bytes;

use crate::common::RecordId;

/// A fixed-width row payload. The record id is set once the tuple has been
/// stored on (or read from) a heap page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    data: Bytes,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Creates a tuple that has not been stored anywhere yet.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            record_id: None,
        }
    }

    /// Creates a tuple located at the given record id.
    pub fn with_record_id(data: impl Into<Bytes>, record_id: RecordId) -> Self {
        Self {
            data: data.into(),
            record_id: Some(record_id),
        }
    }

    /// Returns the payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the payload as a cheaply cloneable buffer.
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Returns the payload length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }
}
