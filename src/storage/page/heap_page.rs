use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::common::{DbError, PageId, RecordId, Result, SlotId, TransactionId};
use crate::tuple::Tuple;

/// Shared handle to a resident page. The buffer pool hands these out; the
/// page lock held by the transaction decides who may take the write side.
pub type PageRef = Arc<RwLock<HeapPage>>;

/// Largest slot count a [`SlotId`] can address
pub const MAX_SLOTS: usize = u16::MAX as usize + 1;

/// Heap page layout:
///
/// +------------------+
/// | Occupancy bitmap |  ceil(num_slots / 8) bytes, bit i set = slot i used
/// +------------------+
/// | Slot 0           |  tuple_size bytes each
/// | Slot 1           |
/// | ...              |
/// +------------------+
/// | Padding          |
/// +------------------+
///
/// `num_slots = floor(page_size * 8 / (tuple_size * 8 + 1))`: every tuple
/// costs its bytes plus one header bit. Slot ids are 16 bits wide, so a page
/// holds at most [`MAX_SLOTS`] tuples.
#[derive(Debug, Clone)]
pub struct HeapPage {
    id: PageId,
    tuple_size: usize,
    num_slots: usize,
    data: Vec<u8>,
    /// Content as of the last load or commit
    old_data: Vec<u8>,
    /// Transaction that dirtied the page, if any
    dirtier: Option<TransactionId>,
}

impl HeapPage {
    /// Wraps raw page bytes as read from a table file.
    pub fn new(id: PageId, data: Vec<u8>, tuple_size: usize) -> Result<Self> {
        let num_slots = Self::checked_slots(data.len(), tuple_size)?;

        Ok(Self {
            id,
            tuple_size,
            num_slots,
            old_data: data.clone(),
            data,
            dirtier: None,
        })
    }

    /// Creates a page with every slot empty.
    pub fn empty(id: PageId, page_size: usize, tuple_size: usize) -> Result<Self> {
        Self::new(id, vec![0u8; page_size], tuple_size)
    }

    /// Number of tuples of `tuple_size` bytes a page of `page_size` bytes holds.
    pub fn slots_per_page(page_size: usize, tuple_size: usize) -> usize {
        if tuple_size == 0 {
            return 0;
        }
        (page_size * 8) / (tuple_size * 8 + 1)
    }

    /// Like [`HeapPage::slots_per_page`], but rejects a geometry that holds
    /// no tuple or more than [`MAX_SLOTS`].
    pub fn checked_slots(page_size: usize, tuple_size: usize) -> Result<usize> {
        match Self::slots_per_page(page_size, tuple_size) {
            0 => Err(DbError::InvalidTupleSize {
                tuple_size,
                page_size,
            }),
            n if n > MAX_SLOTS => Err(DbError::TooManySlots {
                num_slots: n,
                max: MAX_SLOTS,
            }),
            n => Ok(n),
        }
    }

    fn header_size(&self) -> usize {
        self.num_slots.div_ceil(8)
    }

    fn slot_offset(&self, slot: usize) -> usize {
        self.header_size() + slot * self.tuple_size
    }

    fn slot_used(&self, slot: usize) -> bool {
        self.data[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn set_slot_used(&mut self, slot: usize, used: bool) {
        if used {
            self.data[slot / 8] |= 1 << (slot % 8);
        } else {
            self.data[slot / 8] &= !(1 << (slot % 8));
        }
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    /// Returns the serialized page, exactly page_size bytes.
    pub fn page_data(&self) -> &[u8] {
        &self.data
    }

    /// Returns whether the given slot holds a tuple.
    pub fn is_slot_used(&self, slot: SlotId) -> bool {
        slot.as_usize() < self.num_slots && self.slot_used(slot.as_usize())
    }

    /// Returns the number of free slots.
    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots).filter(|&i| !self.slot_used(i)).count()
    }

    /// Stores a tuple in the first free slot.
    pub fn insert_tuple(&mut self, tuple: &[u8]) -> Result<RecordId> {
        if tuple.len() != self.tuple_size {
            return Err(DbError::TupleSizeMismatch {
                expected: self.tuple_size,
                actual: tuple.len(),
            });
        }

        let slot = (0..self.num_slots)
            .find(|&i| !self.slot_used(i))
            .ok_or(DbError::PageFull(self.id))?;
        let slot_id = u16::try_from(slot).map_err(|_| DbError::TooManySlots {
            num_slots: self.num_slots,
            max: MAX_SLOTS,
        })?;

        let offset = self.slot_offset(slot);
        self.data[offset..offset + self.tuple_size].copy_from_slice(tuple);
        self.set_slot_used(slot, true);

        Ok(RecordId::new(self.id, SlotId::new(slot_id)))
    }

    /// Clears the slot a record occupies.
    pub fn delete_tuple(&mut self, record_id: RecordId) -> Result<()> {
        let slot = record_id.slot_id;
        if record_id.page_id != self.id || slot.as_usize() >= self.num_slots {
            return Err(DbError::InvalidSlot {
                page: record_id.page_id,
                slot,
            });
        }
        if !self.slot_used(slot.as_usize()) {
            return Err(DbError::EmptySlot {
                page: self.id,
                slot,
            });
        }

        let offset = self.slot_offset(slot.as_usize());
        self.data[offset..offset + self.tuple_size].fill(0);
        self.set_slot_used(slot.as_usize(), false);
        Ok(())
    }

    /// Returns the tuple stored in a slot.
    pub fn tuple(&self, slot: SlotId) -> Result<Tuple> {
        if slot.as_usize() >= self.num_slots {
            return Err(DbError::InvalidSlot {
                page: self.id,
                slot,
            });
        }
        if !self.slot_used(slot.as_usize()) {
            return Err(DbError::EmptySlot {
                page: self.id,
                slot,
            });
        }

        let offset = self.slot_offset(slot.as_usize());
        Ok(Tuple::with_record_id(
            Bytes::copy_from_slice(&self.data[offset..offset + self.tuple_size]),
            RecordId::new(self.id, slot),
        ))
    }

    /// Iterates over the stored tuples in slot order.
    pub fn tuples(&self) -> impl Iterator<Item = Tuple> + '_ {
        (0..self.num_slots)
            .filter(|&i| self.slot_used(i))
            .filter_map(|i| u16::try_from(i).ok())
            .filter_map(|i| self.tuple(SlotId::new(i)).ok())
    }

    /// Returns the transaction that dirtied this page, or None if it is clean.
    pub fn is_dirty(&self) -> Option<TransactionId> {
        self.dirtier
    }

    /// Marks the page dirty on behalf of `txn`, or clean.
    pub fn mark_dirty(&mut self, dirty: bool, txn: TransactionId) {
        self.dirtier = if dirty { Some(txn) } else { None };
    }

    /// Returns a clean copy of the page as it was before the current
    /// dirtying transaction touched it.
    pub fn before_image(&self) -> HeapPage {
        HeapPage {
            id: self.id,
            tuple_size: self.tuple_size,
            num_slots: self.num_slots,
            data: self.old_data.clone(),
            old_data: self.old_data.clone(),
            dirtier: None,
        }
    }

    /// Snapshots the current content as the new before-image.
    pub fn set_before_image(&mut self) {
        self.old_data.clone_from(&self.data);
    }
}
