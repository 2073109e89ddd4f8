//! The operation set every allocator in the crate implements.

use core::fmt;

use crate::{
  AllocError,
  Block,
  Counters,
};

/// Names the allocator variant, mostly for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AllocatorKind {
  /// [`PassthroughAllocator`](crate::PassthroughAllocator)
  Passthrough,
  /// [`LinearAllocator`](crate::LinearAllocator)
  Linear,
  /// [`NaiveArena`](crate::NaiveArena)
  NaiveArena,
  /// [`ReusingArena`](crate::ReusingArena)
  ReusingArena,
  /// [`TypedArena`](crate::TypedArena)
  TypedArena,
}

impl AllocatorKind {
  /// Short lowercase name used in log fields.
  pub const fn as_str(self) -> &'static str {
    match self {
      AllocatorKind::Passthrough => "passthrough",
      AllocatorKind::Linear => "linear",
      AllocatorKind::NaiveArena => "naive-arena",
      AllocatorKind::ReusingArena => "reusing-arena",
      AllocatorKind::TypedArena => "typed-arena",
    }
  }
}

impl fmt::Display for AllocatorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Raw storage for values of `T`, with explicit construction and destruction.
///
/// Storage handed out by [`allocate`](Self::allocate) is uninitialized. A
/// slot must be [`construct`](Self::construct)ed before it can be read and
/// [`destroy`](Self::destroy)ed before its block is deallocated. Every call
/// that breaks this order is rejected with an [`AllocError`] and leaves the
/// allocator untouched.
///
/// The trait is object safe, so callers can hold a
/// `Box<dyn RawAllocator<T>>` when the variant is chosen at runtime.
pub trait RawAllocator<T> {
  /// Which variant this is.
  fn kind(&self) -> AllocatorKind;

  /// Reserves `n` contiguous slots. The slots are not initialized.
  fn allocate(&mut self, n: usize) -> Result<Block<T>, AllocError>;

  /// Returns a block. Every slot must have been destroyed first.
  fn deallocate(&mut self, block: Block<T>) -> Result<(), AllocError>;

  /// Moves `value` into slot `index` of `block`.
  fn construct(&mut self, block: &Block<T>, index: usize, value: T) -> Result<(), AllocError>;

  /// Drops the value in slot `index` of `block` in place.
  fn destroy(&mut self, block: &Block<T>, index: usize) -> Result<(), AllocError>;

  /// Shared access to a constructed slot.
  fn get(&self, block: &Block<T>, index: usize) -> Result<&T, AllocError>;

  /// Exclusive access to a constructed slot.
  fn get_mut(&mut self, block: &Block<T>, index: usize) -> Result<&mut T, AllocError>;

  /// Outstanding allocations and constructions.
  fn counters(&self) -> Counters;

  /// Handle of the live block starting at `addr`, if this allocator handed
  /// one out there.
  fn block_at(&self, addr: usize) -> Option<Block<T>>;
}
