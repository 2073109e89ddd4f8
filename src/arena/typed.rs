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

const KIND: AllocatorKind = AllocatorKind::TypedArena;

/// Arena of `T` slots over a caller-supplied buffer.
///
/// Works in whole elements, so there is no alignment rounding. Freed blocks
/// always go to the free list (there is no tail reclaim), and once the bump
/// cursor is exhausted requests are served from the most recently freed
/// span that can hold them. There is no system fallback.
pub struct TypedArena<'buf, T> {
  base: NonNull<T>,
  capacity: usize,
  cursor: usize,
  free: FreeList,
  slots: SlotTable,
  counters: Counters,
  leak_policy: LeakPolicy,
  _buffer: PhantomData<&'buf mut [MaybeUninit<T>]>,
}

impl<'buf, T> TypedArena<'buf, T> {
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
      free: FreeList::default(),
      slots: SlotTable::new(capacity),
      counters: Counters::default(),
      leak_policy: LeakPolicy::default_for(KIND),
      _buffer: PhantomData,
    })
  }

  pub fn new(buffer: &'buf mut [MaybeUninit<T>]) -> Self {
    Self::try_new(buffer).unwrap_or_else(|err| panic!("Failed to create TypedArena: {err}"))
  }

  pub fn with_leak_policy(mut self, policy: LeakPolicy) -> Self {
    self.leak_policy = policy;
    self
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn cursor(&self) -> usize {
    self.cursor
  }

  pub fn free_spans(&self) -> &[Span] {
    self.free.spans()
  }

  /// Elements that are free again: freed spans plus the untouched tail.
  /// Equals [`capacity`](Self::capacity) once everything handed out has come
  /// back.
  pub fn reclaimed(&self) -> usize {
    self.free.total() + (self.capacity - self.cursor)
  }

  pub fn offset_of(&self, block: &Block<T>) -> Option<usize> {
    block.offset_in(self.base, self.capacity)
  }

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

  fn hand_out(&mut self, offset: usize, n: usize) -> Block<T> {
    let stamp = self.slots.claim(offset, n);
    self.counters.allocated();
    // SAFETY: derived from the non-null buffer base
    let ptr = unsafe { NonNull::new_unchecked(self.slot(offset)) };
    Block::new(ptr, n, Origin::Arena, stamp)
  }
}

impl<'buf, T> RawAllocator<T> for TypedArena<'buf, T> {
  fn kind(&self) -> AllocatorKind {
    KIND
  }

  fn allocate(&mut self, n: usize) -> Result<Block<T>, AllocError> {
    if n == 0 {
      return Err(AllocError::ZeroSized);
    }

    match self.cursor.checked_add(n) {
      Some(end) if end <= self.capacity => {
        let offset = self.cursor;
        self.cursor = end;
        trace!(kind = KIND.as_str(), offset, n, "bump");
        return Ok(self.hand_out(offset, n));
      }
      _ => {}
    }

    if let Some(offset) = self.free.take_last_fit(n) {
      debug!(kind = KIND.as_str(), offset, n, "reusing freed span");
      return Ok(self.hand_out(offset, n));
    }

    let available = self.capacity - self.cursor;
    warn!(kind = KIND.as_str(), requested = n, available, "no memory available");
    Err(AllocError::OutOfMemory {
      requested: n,
      available,
    })
  }

  fn deallocate(&mut self, block: Block<T>) -> Result<(), AllocError> {
    let offset = self.owned(&block)?;
    self.slots.release(offset, &block)?;
    self.free.push(Span::new(offset, block.len()));
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

impl<'buf, T> Drop for TypedArena<'buf, T> {
  fn drop(&mut self) {
    let reclaimed = self.reclaimed();
    if reclaimed != self.capacity {
      warn!(
        kind = KIND.as_str(),
        reclaimed,
        capacity = self.capacity,
        "arena dropped before every element was freed"
      );
    }
    leak::report(KIND, self.counters, self.leak_policy);
  }
}
