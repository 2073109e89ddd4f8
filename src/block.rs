//! Handles for allocated storage and the counters allocators keep about them.

use core::{
  fmt,
  marker::PhantomData,
  mem,
  ptr::NonNull,
};

use getset::CopyGetters;

/// Where the storage behind a [`Block`] came from.
///
/// The origin decides the release protocol: arena storage goes back to the
/// arena's cursor or free list, fallback and heap storage go back to the
/// system heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Origin {
  /// Carved out of an arena or caller-supplied buffer.
  Arena,
  /// The arena was exhausted and the request was served by the system heap.
  Fallback,
  /// Served by the system heap by a passthrough allocator.
  Heap,
}

/// Handle to `len` contiguous slots of `T` returned by `allocate`.
///
/// A block is an address, a length and a stamp unique to the allocation; it
/// does not own the storage and is only meaningful to the allocator that
/// produced it. Values are written and read through that allocator
/// (`construct`, `get`, `destroy`). Copies of a block go stale once it is
/// deallocated, even if the same storage is handed out again.
pub struct Block<T> {
  ptr: NonNull<T>,
  len: usize,
  origin: Origin,
  stamp: u64,
  _marker: PhantomData<*mut T>,
}

impl<T> Block<T> {
  pub(crate) fn new(ptr: NonNull<T>, len: usize, origin: Origin, stamp: u64) -> Self {
    Self {
      ptr,
      len,
      origin,
      stamp,
      _marker: PhantomData,
    }
  }

  /// Number of slots in the block.
  pub fn len(&self) -> usize {
    self.len
  }

  /// Always `false`; zero-length blocks are never handed out.
  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Where the storage came from.
  pub fn origin(&self) -> Origin {
    self.origin
  }

  /// Identity of the allocation this handle was issued for.
  pub fn stamp(&self) -> u64 {
    self.stamp
  }

  /// Start address of the block.
  pub fn addr(&self) -> usize {
    self.ptr.as_ptr() as usize
  }

  /// Raw pointer to the first slot.
  pub fn as_ptr(&self) -> *const T {
    self.ptr.as_ptr()
  }

  pub(crate) fn as_non_null(&self) -> NonNull<T> {
    self.ptr
  }

  /// Element offset of this block inside the buffer `[base, base + capacity)`,
  /// or `None` when the block was not carved out of that buffer.
  pub(crate) fn offset_in(&self, base: NonNull<T>, capacity: usize) -> Option<usize> {
    if self.origin != Origin::Arena {
      return None;
    }
    let offset = slot_offset(base, capacity, self.addr())?;
    (offset + self.len <= capacity).then_some(offset)
  }

  pub(crate) fn check_index(&self, index: usize) -> Result<(), crate::AllocError> {
    if index < self.len {
      Ok(())
    } else {
      Err(crate::AllocError::IndexOutOfBounds {
        index,
        len: self.len,
      })
    }
  }
}

/// Element offset of `addr` inside `[base, base + capacity)`, or `None` when
/// it is outside the buffer or not on a slot boundary.
pub(crate) fn slot_offset<T>(base: NonNull<T>, capacity: usize, addr: usize) -> Option<usize> {
  let size = mem::size_of::<T>();
  let start = base.as_ptr() as usize;
  if addr < start || addr >= start + capacity * size || (addr - start) % size != 0 {
    return None;
  }
  Some((addr - start) / size)
}

impl<T> Clone for Block<T> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<T> Copy for Block<T> {}

impl<T> PartialEq for Block<T> {
  fn eq(&self, other: &Self) -> bool {
    self.ptr == other.ptr
      && self.len == other.len
      && self.origin == other.origin
      && self.stamp == other.stamp
  }
}

impl<T> Eq for Block<T> {}

impl<T> fmt::Debug for Block<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Block")
      .field("addr", &format_args!("{:#x}", self.addr()))
      .field("len", &self.len)
      .field("origin", &self.origin)
      .field("stamp", &self.stamp)
      .finish()
  }
}

/// Outstanding allocations and constructions of one allocator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, CopyGetters)]
pub struct Counters {
  /// Blocks allocated and not yet deallocated.
  #[getset(get_copy = "pub")]
  allocations: usize,
  /// Values constructed and not yet destroyed.
  #[getset(get_copy = "pub")]
  constructions: usize,
}

impl Counters {
  /// `true` when nothing is outstanding.
  pub fn is_balanced(&self) -> bool {
    self.allocations == 0 && self.constructions == 0
  }

  pub(crate) fn allocated(&mut self) {
    self.allocations += 1;
  }

  pub(crate) fn deallocated(&mut self) {
    debug_assert!(self.allocations > 0);
    self.allocations -= 1;
  }

  pub(crate) fn constructed(&mut self) {
    self.constructions += 1;
  }

  pub(crate) fn destroyed(&mut self) {
    debug_assert!(self.constructions > 0);
    self.constructions -= 1;
  }
}
