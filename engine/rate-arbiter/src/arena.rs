use crate::types::{ClockId, Rate, RequestHandle};

/// One consumer's outstanding demand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestRecord {
    pub clock: ClockId,
    pub rate: Rate,
}

#[derive(Clone, Copy)]
struct Slot {
    generation: u32,
    record: Option<RequestRecord>,
}

/// Fixed-capacity pool of request records.
///
/// Released slots bump their generation, so releasing the same handle twice, or a handle whose
/// slot has since been reused, trips an assertion instead of corrupting another request.
pub struct RequestArena {
    slots: Box<[Slot]>,
    free: Vec<u32>,
}

impl RequestArena {
    pub fn with_capacity(capacity: u32) -> Self {
        assert!(capacity > 0, "arena capacity must be > 0");
        let cap = capacity as usize;
        let mut free = Vec::with_capacity(cap);
        for i in (0..cap).rev() {
            free.push(i as u32);
        }
        Self {
            slots: vec![Slot { generation: 0, record: None }; cap].into_boxed_slice(),
            free,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `None` when every slot is in use.
    pub fn alloc(&mut self, record: RequestRecord) -> Option<RequestHandle> {
        let index = self.free.pop()?;
        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.record.is_none(), "allocating an in-use slot");
        slot.record = Some(record);
        Some(RequestHandle { index, generation: slot.generation })
    }

    /// Panics if `handle` is stale or already released.
    pub fn free(&mut self, handle: RequestHandle) -> RequestRecord {
        let i = handle.index as usize;
        assert!(i < self.slots.len(), "request handle out of range");
        let slot = &mut self.slots[i];
        assert!(slot.generation == handle.generation, "double release detected for {handle:?}");
        let Some(record) = slot.record.take() else {
            panic!("double release detected for {handle:?}");
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        record
    }

    pub fn get(&self, handle: RequestHandle) -> Option<&RequestRecord> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.record.as_ref()
    }

    #[inline]
    pub fn is_live(&self, handle: RequestHandle) -> bool {
        self.get(handle).is_some()
    }
}
