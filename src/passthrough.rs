//! Allocator that forwards every request to the system heap.

use std::{
  alloc::{
    self,
    Layout,
  },
  collections::HashMap,
  marker::PhantomData,
  mem,
  ptr::{
    self,
    NonNull,
  },
};

use tracing::trace;

use crate::{
  AllocError,
  AllocatorKind,
  Block,
  Counters,
  LeakPolicy,
  Origin,
  RawAllocator,
  leak,
  slots::SlotTable,
};

const KIND: AllocatorKind = AllocatorKind::Passthrough;

#[derive(Debug)]
struct LiveBlock {
  layout: Layout,
  slots: SlotTable,
}

/// Heap-backed allocator that keeps score of what is still outstanding.
///
/// Each live block is remembered by address, so blocks from another
/// allocator and blocks released twice are rejected instead of being handed
/// to the system heap. Dropping the allocator with outstanding blocks is a
/// leak and, by default, panics.
#[derive(Debug)]
pub struct PassthroughAllocator<T> {
  live: HashMap<usize, LiveBlock>,
  counters: Counters,
  leak_policy: LeakPolicy,
  _marker: PhantomData<*mut T>,
}

impl<T> PassthroughAllocator<T> {
  pub fn new() -> Self {
    Self {
      live: HashMap::new(),
      counters: Counters::default(),
      leak_policy: LeakPolicy::default_for(KIND),
      _marker: PhantomData,
    }
  }

  /// Replaces the teardown policy.
  pub fn with_leak_policy(mut self, policy: LeakPolicy) -> Self {
    self.leak_policy = policy;
    self
  }

  /// Tears the allocator down, returning the leak check instead of applying
  /// the [`LeakPolicy`]. Outstanding heap blocks are released either way.
  pub fn finish(mut self) -> Result<(), AllocError> {
    let result = leak::check(KIND, self.counters);
    self.leak_policy = LeakPolicy::Ignore;
    result
  }

  fn live(&self, block: &Block<T>) -> Result<&LiveBlock, AllocError> {
    match self.live.get(&block.addr()) {
      Some(live) if block.origin() == Origin::Heap => Ok(live),
      _ => Err(AllocError::foreign(KIND, block.addr())),
    }
  }

  fn live_mut(&mut self, block: &Block<T>) -> Result<&mut LiveBlock, AllocError> {
    match self.live.get_mut(&block.addr()) {
      Some(live) if block.origin() == Origin::Heap => Ok(live),
      _ => Err(AllocError::foreign(KIND, block.addr())),
    }
  }
}

impl<T> Default for PassthroughAllocator<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> RawAllocator<T> for PassthroughAllocator<T> {
  fn kind(&self) -> AllocatorKind {
    KIND
  }

  fn allocate(&mut self, n: usize) -> Result<Block<T>, AllocError> {
    if n == 0 || mem::size_of::<T>() == 0 {
      return Err(AllocError::ZeroSized);
    }
    let layout = Layout::array::<T>(n).map_err(|_| AllocError::SizeOverflow)?;
    // SAFETY: layout has a non-zero size
    let raw = unsafe { alloc::alloc(layout) };
    let ptr = NonNull::new(raw.cast::<T>()).ok_or(AllocError::SystemExhausted {
      bytes: layout.size(),
    })?;

    let mut slots = SlotTable::new(n);
    let stamp = slots.claim(0, n);
    self.live.insert(ptr.as_ptr() as usize, LiveBlock { layout, slots });
    self.counters.allocated();
    trace!(kind = KIND.as_str(), n, bytes = layout.size(), "heap allocation");
    Ok(Block::new(ptr, n, Origin::Heap, stamp))
  }

  fn deallocate(&mut self, block: Block<T>) -> Result<(), AllocError> {
    let live = self.live_mut(&block)?;
    live.slots.release(0, &block)?;
    let layout = live.layout;
    self.live.remove(&block.addr());
    // SAFETY: the address was returned by `alloc::alloc` with this layout and
    // has not been freed since, or it would not be in `live`
    unsafe { alloc::dealloc(block.as_non_null().as_ptr().cast(), layout) };
    self.counters.deallocated();
    trace!(kind = KIND.as_str(), n = block.len(), "heap release");
    Ok(())
  }

  fn construct(&mut self, block: &Block<T>, index: usize, value: T) -> Result<(), AllocError> {
    block.check_index(index)?;
    self.live_mut(block)?.slots.construct(0, block, index)?;
    // SAFETY: index is in bounds and the slot was uninitialized
    unsafe { block.as_non_null().as_ptr().add(index).write(value) };
    self.counters.constructed();
    Ok(())
  }

  fn destroy(&mut self, block: &Block<T>, index: usize) -> Result<(), AllocError> {
    block.check_index(index)?;
    self.live_mut(block)?.slots.destroy(0, block, index)?;
    // SAFETY: the slot held a constructed value, now marked as destroyed
    unsafe { ptr::drop_in_place(block.as_non_null().as_ptr().add(index)) };
    self.counters.destroyed();
    Ok(())
  }

  fn get(&self, block: &Block<T>, index: usize) -> Result<&T, AllocError> {
    block.check_index(index)?;
    self.live(block)?.slots.expect_constructed(0, block, index)?;
    // SAFETY: the slot is constructed and stays alive while `self` is borrowed
    Ok(unsafe { &*block.as_non_null().as_ptr().add(index) })
  }

  fn get_mut(&mut self, block: &Block<T>, index: usize) -> Result<&mut T, AllocError> {
    block.check_index(index)?;
    self.live(block)?.slots.expect_constructed(0, block, index)?;
    // SAFETY: as in `get`, and `self` is borrowed exclusively
    Ok(unsafe { &mut *block.as_non_null().as_ptr().add(index) })
  }

  fn counters(&self) -> Counters {
    self.counters
  }

  fn block_at(&self, addr: usize) -> Option<Block<T>> {
    let (len, stamp) = self.live.get(&addr)?.slots.owner(0)?;
    let ptr = NonNull::new(addr as *mut T)?;
    Some(Block::new(ptr, len, Origin::Heap, stamp))
  }
}

impl<T> Drop for PassthroughAllocator<T> {
  fn drop(&mut self) {
    for (addr, live) in self.live.drain() {
      // SAFETY: every entry is a live allocation made with its layout
      unsafe { alloc::dealloc(addr as *mut u8, live.layout) };
    }
    leak::report(KIND, self.counters, self.leak_policy);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn allocate_construct_read_back() {
    let mut heap = PassthroughAllocator::<String>::new();
    let block = heap.allocate(2).unwrap();
    assert_eq!(block.origin(), Origin::Heap);
    assert_eq!(block.addr() % mem::align_of::<String>(), 0);

    heap.construct(&block, 0, "left".to_owned()).unwrap();
    heap.construct(&block, 1, "right".to_owned()).unwrap();
    assert_eq!(heap.get(&block, 1).unwrap(), "right");
    heap.get_mut(&block, 0).unwrap().push('!');
    assert_eq!(heap.get(&block, 0).unwrap(), "left!");
    assert_eq!(heap.counters().constructions(), 2);

    heap.destroy(&block, 0).unwrap();
    heap.destroy(&block, 1).unwrap();
    heap.deallocate(block).unwrap();
    assert!(heap.counters().is_balanced());
    heap.finish().unwrap();
  }

  #[test]
  fn counters_follow_calls() {
    let mut heap = PassthroughAllocator::<u64>::new();
    let a = heap.allocate(1).unwrap();
    let b = heap.allocate(8).unwrap();
    assert_eq!(heap.counters().allocations(), 2);
    heap.deallocate(a).unwrap();
    assert_eq!(heap.counters().allocations(), 1);
    heap.deallocate(b).unwrap();
    assert_eq!(heap.counters().allocations(), 0);
  }

  #[test]
  fn double_deallocate_is_rejected() {
    let mut heap = PassthroughAllocator::<u32>::new();
    let block = heap.allocate(1).unwrap();
    heap.deallocate(block).unwrap();
    assert_eq!(
      heap.deallocate(block),
      Err(AllocError::OwnershipViolation { addr: block.addr() })
    );
    assert_eq!(heap.counters().allocations(), 0);
  }

  #[test]
  fn zero_sized_requests_are_rejected() {
    let mut heap = PassthroughAllocator::<u32>::new();
    assert_eq!(heap.allocate(0), Err(AllocError::ZeroSized));
    let mut unit = PassthroughAllocator::<()>::new();
    assert_eq!(unit.allocate(3), Err(AllocError::ZeroSized));
  }

  #[test]
  fn unmatched_allocate_is_a_leak() {
    let mut heap = PassthroughAllocator::<u8>::new();
    let _block = heap.allocate(16).unwrap();
    assert_eq!(
      heap.finish(),
      Err(AllocError::LeakDetected {
        kind: AllocatorKind::Passthrough,
        allocations: 1,
        constructions: 0,
      })
    );
  }

  #[test]
  #[should_panic(expected = "leaked 1 allocation(s)")]
  fn dropping_with_a_leak_panics_by_default() {
    let mut heap = PassthroughAllocator::<u8>::new();
    let _block = heap.allocate(4).unwrap();
  }

  #[test]
  fn log_policy_tolerates_leaks() {
    let mut heap = PassthroughAllocator::<u8>::new().with_leak_policy(LeakPolicy::Log);
    let _block = heap.allocate(4).unwrap();
  }
}
