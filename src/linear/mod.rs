//! Frame-style bump allocator over a caller-supplied buffer.

use core::{
  marker::PhantomData,
  mem::{
    self,
    MaybeUninit,
  },
  ptr::{
    self,
    NonNull,
  },
};

use tracing::{
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
  block::slot_offset,
  leak,
  slots::SlotTable,
};

const KIND: AllocatorKind = AllocatorKind::Linear;

/// Bump allocator that never gives space back.
///
/// Allocation advances a cursor through the borrowed buffer. `deallocate`
/// only does the bookkeeping; the cursor never moves back, so the buffer is
/// only reusable once the allocator is dropped and a new one is built over
/// it. The buffer stays owned by the caller.
pub struct LinearAllocator<'buf, T> {
  base: NonNull<T>,
  capacity: usize,
  cursor: usize,
  slots: SlotTable,
  counters: Counters,
  leak_policy: LeakPolicy,
  _buffer: PhantomData<&'buf mut [MaybeUninit<T>]>,
}

impl<'buf, T> LinearAllocator<'buf, T> {
  pub fn try_new(buffer: &'buf mut [MaybeUninit<T>]) -> Result<Self, AllocError> {
    if mem::size_of::<T>() == 0 {
      return Err(AllocError::ZeroSized);
    }
    let capacity = buffer.len();
    // SAFETY: slice pointers are never null
    let base = unsafe { NonNull::new_unchecked(buffer.as_mut_ptr().cast::<T>()) };
    Ok(Self {
      base,
      capacity,
      cursor: 0,
      slots: SlotTable::new(capacity),
      counters: Counters::default(),
      leak_policy: LeakPolicy::default_for(KIND),
      _buffer: PhantomData,
    })
  }

  pub fn new(buffer: &'buf mut [MaybeUninit<T>]) -> Self {
    Self::try_new(buffer)
      .unwrap_or_else(|err| panic!("Failed to create LinearAllocator: {err}"))
  }

  /// Replaces the teardown policy.
  pub fn with_leak_policy(mut self, policy: LeakPolicy) -> Self {
    self.leak_policy = policy;
    self
  }

  /// Capacity in elements.
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Elements consumed by the cursor, including deallocated ones.
  pub fn used(&self) -> usize {
    self.cursor
  }

  pub fn available(&self) -> usize {
    self.capacity - self.cursor
  }

  /// Element offset of `block` in the buffer, if it came from here.
  pub fn offset_of(&self, block: &Block<T>) -> Option<usize> {
    block.offset_in(self.base, self.capacity)
  }

  /// Runs the teardown leak check and returns it instead of applying the
  /// [`LeakPolicy`].
  pub fn finish(mut self) -> Result<(), AllocError> {
    let result = leak::check(KIND, self.counters);
    self.leak_policy = LeakPolicy::Ignore;
    result
  }

  fn owned(&self, block: &Block<T>) -> Result<usize, AllocError> {
    self
      .offset_of(block)
      .ok_or_else(|| AllocError::foreign(KIND, block.addr()))
  }

  fn slot(&self, offset: usize) -> *mut T {
    // SAFETY: callers pass offsets validated against capacity
    unsafe { self.base.as_ptr().add(offset) }
  }
}

impl<'buf, T> RawAllocator<T> for LinearAllocator<'buf, T> {
  fn kind(&self) -> AllocatorKind {
    KIND
  }

  fn allocate(&mut self, n: usize) -> Result<Block<T>, AllocError> {
    if n == 0 {
      return Err(AllocError::ZeroSized);
    }
    let end = self.cursor.checked_add(n).ok_or(AllocError::SizeOverflow)?;
    if end > self.capacity {
      warn!(kind = KIND.as_str(), requested = n, available = self.available(), "no memory available");
      return Err(AllocError::OutOfMemory {
        requested: n,
        available: self.available(),
      });
    }

    let offset = self.cursor;
    self.cursor = end;
    let stamp = self.slots.claim(offset, n);
    self.counters.allocated();
    trace!(kind = KIND.as_str(), offset, n, "bump");
    // SAFETY: derived from the non-null buffer base
    let ptr = unsafe { NonNull::new_unchecked(self.slot(offset)) };
    Ok(Block::new(ptr, n, Origin::Arena, stamp))
  }

  fn deallocate(&mut self, block: Block<T>) -> Result<(), AllocError> {
    let offset = self.owned(&block)?;
    self.slots.release(offset, &block)?;
    self.counters.deallocated();
    Ok(())
  }

  fn construct(&mut self, block: &Block<T>, index: usize, value: T) -> Result<(), AllocError> {
    block.check_index(index)?;
    let offset = self.owned(block)?;
    self.slots.construct(offset, block, index)?;
    // SAFETY: slot is inside the buffer and uninitialized
    unsafe { self.slot(offset + index).write(value) };
    self.counters.constructed();
    Ok(())
  }

  fn destroy(&mut self, block: &Block<T>, index: usize) -> Result<(), AllocError> {
    block.check_index(index)?;
    let offset = self.owned(block)?;
    self.slots.destroy(offset, block, index)?;
    // SAFETY: slot held a constructed value
    unsafe { ptr::drop_in_place(self.slot(offset + index)) };
    self.counters.destroyed();
    Ok(())
  }

  fn get(&self, block: &Block<T>, index: usize) -> Result<&T, AllocError> {
    block.check_index(index)?;
    let offset = self.owned(block)?;
    self.slots.expect_constructed(offset, block, index)?;
    // SAFETY: slot is constructed and outlives the borrow of `self`
    Ok(unsafe { &*self.slot(offset + index) })
  }

  fn get_mut(&mut self, block: &Block<T>, index: usize) -> Result<&mut T, AllocError> {
    block.check_index(index)?;
    let offset = self.owned(block)?;
    self.slots.expect_constructed(offset, block, index)?;
    // SAFETY: as in `get`, with `self` borrowed exclusively
    Ok(unsafe { &mut *self.slot(offset + index) })
  }

  fn counters(&self) -> Counters {
    self.counters
  }

  fn block_at(&self, addr: usize) -> Option<Block<T>> {
    let offset = slot_offset(self.base, self.capacity, addr)?;
    let (len, stamp) = self.slots.owner(offset)?;
    Some(Block::new(NonNull::new(self.slot(offset))?, len, Origin::Arena, stamp))
  }
}

impl<'buf, T> Drop for LinearAllocator<'buf, T> {
  fn drop(&mut self) {
    tracing::debug!(
      kind = KIND.as_str(),
      used = self.cursor,
      constructions = self.counters.constructions(),
      "linear allocator dropped"
    );
    leak::report(KIND, self.counters, self.leak_policy);
  }
}

#[cfg(test)]
mod tests;
