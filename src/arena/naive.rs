use crate::{
  AllocError,
  AllocatorKind,
  Block,
  Counters,
  LeakPolicy,
  RawAllocator,
  arena::base::ByteArena,
};

/// Byte arena that only reclaims the most recent allocation.
///
/// Freeing the tail block moves the cursor back; freeing anything else
/// loses that space until the arena is dropped. When the buffer runs out,
/// requests are served from the system heap as [`Origin::Fallback`] blocks.
///
/// [`Origin::Fallback`]: crate::Origin::Fallback
#[derive(Debug)]
pub struct NaiveArena<const ALIGN: usize> {
  base: ByteArena<ALIGN, false>,
}

impl<const ALIGN: usize> NaiveArena<ALIGN> {
  /// Fails with [`AllocError::AlignmentViolation`] unless `ALIGN` is a power
  /// of two.
  pub fn try_new(capacity: usize) -> Result<Self, AllocError> {
    Ok(Self {
      base: ByteArena::try_new(capacity)?,
    })
  }

  pub fn new(capacity: usize) -> Self {
    Self::try_new(capacity)
      .unwrap_or_else(|err| panic!("Failed to create NaiveArena of capacity {capacity}: {err}"))
  }

  pub fn with_leak_policy(mut self, policy: LeakPolicy) -> Self {
    self.base.set_leak_policy(policy);
    self
  }

  pub fn capacity(&self) -> usize {
    self.base.capacity()
  }

  /// Bump cursor, as a byte offset from the aligned base.
  pub fn cursor(&self) -> usize {
    self.base.cursor()
  }

  pub fn available(&self) -> usize {
    self.base.capacity() - self.base.cursor()
  }

  /// Byte offset of `block` from the aligned base, or `None` for blocks
  /// that do not live in this arena's buffer.
  pub fn offset_of(&self, block: &Block<u8>) -> Option<usize> {
    self.base.offset_of(block)
  }

  /// Fallback blocks handed out and not yet returned.
  pub fn fallback_count(&self) -> usize {
    self.base.fallback_count()
  }

  /// Runs the teardown leak check and returns it instead of applying the
  /// [`LeakPolicy`].
  pub fn finish(mut self) -> Result<(), AllocError> {
    self.base.finish()
  }
}

impl<const ALIGN: usize> RawAllocator<u8> for NaiveArena<ALIGN> {
  fn kind(&self) -> AllocatorKind {
    self.base.kind()
  }

  fn allocate(&mut self, n: usize) -> Result<Block<u8>, AllocError> {
    self.base.allocate(n)
  }

  fn deallocate(&mut self, block: Block<u8>) -> Result<(), AllocError> {
    self.base.deallocate(block)
  }

  fn construct(&mut self, block: &Block<u8>, index: usize, value: u8) -> Result<(), AllocError> {
    self.base.construct(block, index, value)
  }

  fn destroy(&mut self, block: &Block<u8>, index: usize) -> Result<(), AllocError> {
    self.base.destroy(block, index)
  }

  fn get(&self, block: &Block<u8>, index: usize) -> Result<&u8, AllocError> {
    self.base.get(block, index)
  }

  fn get_mut(&mut self, block: &Block<u8>, index: usize) -> Result<&mut u8, AllocError> {
    self.base.get_mut(block, index)
  }

  fn counters(&self) -> Counters {
    self.base.counters()
  }

  fn block_at(&self, addr: usize) -> Option<Block<u8>> {
    self.base.block_at(addr)
  }
}
