//! Arena buffers and the table readers resolve them through.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use arc_swap::ArcSwapOption;
use interna_common::{EntryRef, Error, Result};

/// Lifecycle of a buffer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferState {
    /// No memory behind this id.
    #[default]
    Free,
    /// Serves reads and, if it is the primary buffer, new allocations.
    Active,
    /// Retired by compaction. Still readable until its hold is trimmed.
    Hold,
}

/// One slot: the stored value plus its reference count.
pub(crate) struct Slot<T> {
    value: ArcSwapOption<T>,
    ref_count: AtomicU32,
}

impl<T> Slot<T> {
    fn empty() -> Self {
        Self {
            value: ArcSwapOption::empty(),
            ref_count: AtomicU32::new(0),
        }
    }

    pub(crate) fn value(&self) -> Option<Arc<T>> {
        self.value.load_full()
    }

    pub(crate) fn has_value(&self) -> bool {
        self.value.load().is_some()
    }

    pub(crate) fn store_value(&self, value: Option<Arc<T>>) {
        self.value.store(value);
    }

    pub(crate) fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    pub(crate) fn set_ref_count(&self, count: u32) {
        self.ref_count.store(count, Ordering::Release);
    }
}

/// Fixed-capacity array of slots.
///
/// Only the writer appends. `len` is published after the slot is written,
/// so a reader that sees an offset below `len` sees an initialized slot.
pub(crate) struct Buffer<T> {
    slots: Box<[Slot<T>]>,
    len: AtomicU32,
}

impl<T> Buffer<T> {
    pub(crate) fn with_capacity(capacity: u32, reserved: u32) -> Self {
        let slots = (0..capacity).map(|_| Slot::empty()).collect();
        Self {
            slots,
            len: AtomicU32::new(reserved),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn capacity(&self) -> u32 {
        // Capacity never exceeds EntryRef::MAX_OFFSET.
        self.slots.len() as u32
    }

    pub(crate) fn len(&self) -> u32 {
        self.len.load(Ordering::Acquire)
    }

    pub(crate) fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Appends a value and returns its offset. Writer only.
    pub(crate) fn push(&self, value: Arc<T>) -> u32 {
        let offset = self.len.load(Ordering::Relaxed);
        debug_assert!(offset < self.capacity(), "push into full buffer");
        let slot = &self.slots[offset as usize];
        slot.set_ref_count(0);
        slot.store_value(Some(value));
        self.len.store(offset + 1, Ordering::Release);
        offset
    }

    pub(crate) fn slot(&self, offset: u32) -> Option<&Slot<T>> {
        if offset < self.len() {
            self.slots.get(offset as usize)
        } else {
            None
        }
    }
}

/// Snapshot of all buffers, indexed by buffer id.
///
/// The writer publishes a fresh table whenever a buffer is activated or
/// freed. Readers holding an older table keep its buffers alive.
pub(crate) struct BufferTable<T> {
    buffers: Vec<Option<Arc<Buffer<T>>>>,
}

impl<T> BufferTable<T> {
    pub(crate) fn new(buffers: Vec<Option<Arc<Buffer<T>>>>) -> Self {
        Self { buffers }
    }

    pub(crate) fn slot(&self, entry: EntryRef) -> Result<&Slot<T>> {
        resolve(&self.buffers, entry)
    }
}

/// Finds the slot behind `entry`.
pub(crate) fn resolve<T>(buffers: &[Option<Arc<Buffer<T>>>], entry: EntryRef) -> Result<&Slot<T>> {
    if !entry.is_valid() {
        return Err(Error::InvalidRef);
    }
    let buffer = buffers
        .get(entry.buffer_id() as usize)
        .and_then(Option::as_ref)
        .ok_or(Error::UnknownBuffer(entry))?;
    buffer.slot(entry.offset()).ok_or(Error::OutOfBounds(entry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_resolve() {
        let buffer = Arc::new(Buffer::with_capacity(4, 1));
        assert_eq!(buffer.len(), 1);
        let offset = buffer.push(Arc::new(7_i32));
        assert_eq!(offset, 1);

        let table = BufferTable::new(vec![Some(buffer)]);
        let slot = table.slot(EntryRef::new(0, 1)).unwrap();
        assert_eq!(slot.value().as_deref(), Some(&7));
        assert_eq!(slot.ref_count(), 0);
    }

    #[test]
    fn test_resolve_errors() {
        let buffer = Arc::new(Buffer::<i32>::with_capacity(4, 1));
        let table = BufferTable::new(vec![Some(buffer), None]);

        assert!(matches!(table.slot(EntryRef::INVALID), Err(Error::InvalidRef)));
        assert!(matches!(
            table.slot(EntryRef::new(0, 2)),
            Err(Error::OutOfBounds(_))
        ));
        assert!(matches!(
            table.slot(EntryRef::new(1, 0)),
            Err(Error::UnknownBuffer(_))
        ));
        assert!(matches!(
            table.slot(EntryRef::new(7, 0)),
            Err(Error::UnknownBuffer(_))
        ));
    }

    #[test]
    fn test_full_buffer() {
        let buffer = Buffer::with_capacity(2, 0);
        buffer.push(Arc::new(1_u8));
        assert!(!buffer.is_full());
        buffer.push(Arc::new(2_u8));
        assert!(buffer.is_full());
    }
}
