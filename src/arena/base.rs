//! Byte arena core shared by [`NaiveArena`] and [`ReusingArena`].
//!
//! [`NaiveArena`]: crate::NaiveArena
//! [`ReusingArena`]: crate::ReusingArena

use std::{
  alloc::{
    self,
    Layout,
  },
  collections::HashMap,
  ptr::{
    self,
    NonNull,
  },
};

use tracing::{
  debug,
  trace,
  warn,
};

use crate::{
  AllocError,
  AllocatorKind,
  Block,
  Counters,
  LeakPolicy,
  Origin,
  RawAllocator,
  arena::freelist::{
    FreeList,
    Span,
  },
  block::slot_offset,
  leak,
  slots::SlotTable,
};

#[derive(Debug)]
struct FallbackBlock {
  layout: Layout,
  slots: SlotTable,
}

/// Bump arena over an owned buffer of `capacity + ALIGN` bytes.
///
/// `REUSE` selects whether blocks that are not at the tail go to a
/// first-fit free list (`true`) or are lost until the arena is dropped
/// (`false`). Requests the arena cannot serve are handed to the system heap
/// and tagged [`Origin::Fallback`].
#[derive(Debug)]
pub(crate) struct ByteArena<const ALIGN: usize, const REUSE: bool> {
  storage: NonNull<u8>,
  storage_layout: Layout,
  base: NonNull<u8>,
  capacity: usize,
  cursor: usize,
  free: FreeList,
  slots: SlotTable,
  fallback: HashMap<usize, FallbackBlock>,
  counters: Counters,
  leak_policy: LeakPolicy,
}

impl<const ALIGN: usize, const REUSE: bool> ByteArena<ALIGN, REUSE> {
  pub(crate) const KIND: AllocatorKind = if REUSE {
    AllocatorKind::ReusingArena
  } else {
    AllocatorKind::NaiveArena
  };

  pub(crate) fn try_new(capacity: usize) -> Result<Self, AllocError> {
    if !ALIGN.is_power_of_two() {
      return Err(AllocError::AlignmentViolation { align: ALIGN });
    }
    if capacity == 0 {
      return Err(AllocError::ZeroSized);
    }
    let total = capacity.checked_add(ALIGN).ok_or(AllocError::SizeOverflow)?;
    let storage_layout = Layout::array::<u8>(total).map_err(|_| AllocError::SizeOverflow)?;
    // SAFETY: total is non-zero
    let raw = unsafe { alloc::alloc(storage_layout) };
    let storage = NonNull::new(raw).ok_or(AllocError::SystemExhausted { bytes: total })?;

    let addr = storage.as_ptr() as usize;
    let pad = Self::align(addr)? - addr;
    // SAFETY: pad < ALIGN, so base and the capacity bytes after it are in storage
    let base = unsafe { storage.add(pad) };

    Ok(Self {
      storage,
      storage_layout,
      base,
      capacity,
      cursor: 0,
      free: FreeList::default(),
      slots: SlotTable::new(capacity),
      fallback: HashMap::new(),
      counters: Counters::default(),
      leak_policy: LeakPolicy::default_for(Self::KIND),
    })
  }

  /// Rounds `n` up to the next multiple of `ALIGN`.
  pub(crate) fn align(n: usize) -> Result<usize, AllocError> {
    n.checked_add(ALIGN - 1)
      .map(|n| n & !(ALIGN - 1))
      .ok_or(AllocError::SizeOverflow)
  }

  pub(crate) fn set_leak_policy(&mut self, policy: LeakPolicy) {
    self.leak_policy = policy;
  }

  pub(crate) fn capacity(&self) -> usize {
    self.capacity
  }

  pub(crate) fn cursor(&self) -> usize {
    self.cursor
  }

  pub(crate) fn free_spans(&self) -> &[Span] {
    self.free.spans()
  }

  pub(crate) fn fallback_count(&self) -> usize {
    self.fallback.len()
  }

  pub(crate) fn offset_of(&self, block: &Block<u8>) -> Option<usize> {
    block.offset_in(self.base, self.capacity)
  }

  pub(crate) fn finish(&mut self) -> Result<(), AllocError> {
    let result = leak::check(Self::KIND, self.counters);
    self.leak_policy = LeakPolicy::Ignore;
    result
  }

  fn arena_block(&mut self, offset: usize, n: usize) -> Block<u8> {
    let stamp = self.slots.claim(offset, n);
    self.counters.allocated();
    // SAFETY: offset + n <= capacity
    let ptr = unsafe { self.base.add(offset) };
    Block::new(ptr, n, Origin::Arena, stamp)
  }

  fn fallback_block(&mut self, n: usize) -> Result<Block<u8>, AllocError> {
    warn!(
      kind = Self::KIND.as_str(),
      requested = n,
      available = self.capacity - self.cursor,
      "no memory available in the arena, falling back to the system heap"
    );
    let layout = Layout::from_size_align(n, ALIGN).map_err(|_| AllocError::SizeOverflow)?;
    // SAFETY: n is non-zero
    let raw = unsafe { alloc::alloc(layout) };
    let ptr = NonNull::new(raw).ok_or(AllocError::SystemExhausted { bytes: n })?;

    let mut slots = SlotTable::new(n);
    let stamp = slots.claim(0, n);
    self.fallback.insert(ptr.as_ptr() as usize, FallbackBlock { layout, slots });
    self.counters.allocated();
    Ok(Block::new(ptr, n, Origin::Fallback, stamp))
  }

  fn release_fallback(&mut self, block: &Block<u8>) -> Result<(), AllocError> {
    let entry = self
      .fallback
      .get_mut(&block.addr())
      .ok_or_else(|| AllocError::foreign(Self::KIND, block.addr()))?;
    entry.slots.release(0, block)?;
    let layout = entry.layout;
    self.fallback.remove(&block.addr());
    // SAFETY: allocated by `fallback_block` with this layout, freed only here
    unsafe { alloc::dealloc(block.as_non_null().as_ptr(), layout) };
    self.counters.deallocated();
    Ok(())
  }

  /// Slot table covering `block` and the block's first slot in it.
  fn slots_for(&self, block: &Block<u8>) -> Result<(&SlotTable, usize), AllocError> {
    match block.origin() {
      Origin::Fallback => self
        .fallback
        .get(&block.addr())
        .map(|entry| (&entry.slots, 0))
        .ok_or_else(|| AllocError::foreign(Self::KIND, block.addr())),
      _ => {
        let offset = self
          .offset_of(block)
          .ok_or_else(|| AllocError::foreign(Self::KIND, block.addr()))?;
        Ok((&self.slots, offset))
      }
    }
  }

  fn slots_for_mut(&mut self, block: &Block<u8>) -> Result<(&mut SlotTable, usize), AllocError> {
    match block.origin() {
      Origin::Fallback => self
        .fallback
        .get_mut(&block.addr())
        .map(|entry| (&mut entry.slots, 0))
        .ok_or_else(|| AllocError::foreign(Self::KIND, block.addr())),
      _ => {
        let offset = self
          .offset_of(block)
          .ok_or_else(|| AllocError::foreign(Self::KIND, block.addr()))?;
        Ok((&mut self.slots, offset))
      }
    }
  }
}

impl<const ALIGN: usize, const REUSE: bool> RawAllocator<u8> for ByteArena<ALIGN, REUSE> {
  fn kind(&self) -> AllocatorKind {
    Self::KIND
  }

  fn allocate(&mut self, n: usize) -> Result<Block<u8>, AllocError> {
    if n == 0 {
      return Err(AllocError::ZeroSized);
    }
    let size = Self::align(n)?;

    match self.cursor.checked_add(size) {
      Some(end) if end <= self.capacity => {
        let offset = self.cursor;
        self.cursor = end;
        trace!(kind = Self::KIND.as_str(), offset, size, "bump");
        return Ok(self.arena_block(offset, n));
      }
      _ => {}
    }

    if REUSE {
      if let Some(offset) = self.free.take_first_fit(size) {
        debug!(kind = Self::KIND.as_str(), offset, size, "reusing freed span");
        return Ok(self.arena_block(offset, n));
      }
    }

    self.fallback_block(n)
  }

  fn deallocate(&mut self, block: Block<u8>) -> Result<(), AllocError> {
    if block.origin() == Origin::Fallback {
      return self.release_fallback(&block);
    }

    let offset = self
      .offset_of(&block)
      .ok_or_else(|| AllocError::foreign(Self::KIND, block.addr()))?;
    let size = Self::align(block.len())?;
    self.slots.release(offset, &block)?;
    self.counters.deallocated();

    if offset + size == self.cursor {
      self.cursor = offset;
      trace!(kind = Self::KIND.as_str(), cursor = offset, "tail reclaimed");
    } else if REUSE {
      self.free.push(Span::new(offset, size));
    } else {
      debug!(kind = Self::KIND.as_str(), offset, size, "space lost until the arena is dropped");
    }
    Ok(())
  }

  fn construct(&mut self, block: &Block<u8>, index: usize, value: u8) -> Result<(), AllocError> {
    block.check_index(index)?;
    let (slots, first) = self.slots_for_mut(block)?;
    slots.construct(first, block, index)?;
    // SAFETY: index is inside the validated block
    unsafe { block.as_non_null().as_ptr().add(index).write(value) };
    self.counters.constructed();
    Ok(())
  }

  fn destroy(&mut self, block: &Block<u8>, index: usize) -> Result<(), AllocError> {
    block.check_index(index)?;
    let (slots, first) = self.slots_for_mut(block)?;
    slots.destroy(first, block, index)?;
    // SAFETY: slot held a constructed value
    unsafe { ptr::drop_in_place(block.as_non_null().as_ptr().add(index)) };
    self.counters.destroyed();
    Ok(())
  }

  fn get(&self, block: &Block<u8>, index: usize) -> Result<&u8, AllocError> {
    block.check_index(index)?;
    let (slots, first) = self.slots_for(block)?;
    slots.expect_constructed(first, block, index)?;
    // SAFETY: constructed slot inside memory owned by `self`
    Ok(unsafe { &*block.as_non_null().as_ptr().add(index) })
  }

  fn get_mut(&mut self, block: &Block<u8>, index: usize) -> Result<&mut u8, AllocError> {
    block.check_index(index)?;
    let (slots, first) = self.slots_for(block)?;
    slots.expect_constructed(first, block, index)?;
    // SAFETY: as in `get`, with `self` borrowed exclusively
    Ok(unsafe { &mut *block.as_non_null().as_ptr().add(index) })
  }

  fn counters(&self) -> Counters {
    self.counters
  }

  fn block_at(&self, addr: usize) -> Option<Block<u8>> {
    if let Some(entry) = self.fallback.get(&addr) {
      let (len, stamp) = entry.slots.owner(0)?;
      return Some(Block::new(NonNull::new(addr as *mut u8)?, len, Origin::Fallback, stamp));
    }
    let offset = slot_offset(self.base, self.capacity, addr)?;
    let (len, stamp) = self.slots.owner(offset)?;
    // SAFETY: offset < capacity
    let ptr = unsafe { self.base.add(offset) };
    Some(Block::new(ptr, len, Origin::Arena, stamp))
  }
}

impl<const ALIGN: usize, const REUSE: bool> Drop for ByteArena<ALIGN, REUSE> {
  fn drop(&mut self) {
    debug!(
      kind = Self::KIND.as_str(),
      used = self.cursor,
      free_spans = self.free.spans().len(),
      free_bytes = self.free.total(),
      fallbacks = self.fallback.len(),
      "arena dropped"
    );
    for (addr, entry) in self.fallback.drain() {
      // SAFETY: every entry is a live fallback allocation with its layout
      unsafe { alloc::dealloc(addr as *mut u8, entry.layout) };
    }
    // SAFETY: storage was allocated in `try_new` with this layout
    unsafe { alloc::dealloc(self.storage.as_ptr(), self.storage_layout) };
    leak::report(Self::KIND, self.counters, self.leak_policy);
  }
}
