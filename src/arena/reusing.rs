use crate::{
  AllocError,
  AllocatorKind,
  Block,
  Counters,
  LeakPolicy,
  RawAllocator,
  arena::{
    base::ByteArena,
    freelist::Span,
  },
};

/// Byte arena that recycles freed blocks through a first-fit free list.
///
/// Allocation tries the bump cursor first, then the first freed span large
/// enough for the aligned request, then the system heap. Freeing the tail
/// block moves the cursor back instead of growing the free list. Spans are
/// never coalesced, so interleaved sizes fragment the list over time.
#[derive(Debug)]
pub struct ReusingArena<const ALIGN: usize> {
  base: ByteArena<ALIGN, true>,
}

impl<const ALIGN: usize> ReusingArena<ALIGN> {
  /// Fails with [`AllocError::AlignmentViolation`] unless `ALIGN` is a power
  /// of two.
  pub fn try_new(capacity: usize) -> Result<Self, AllocError> {
    Ok(Self {
      base: ByteArena::try_new(capacity)?,
    })
  }

  pub fn new(capacity: usize) -> Self {
    Self::try_new(capacity)
      .unwrap_or_else(|err| panic!("Failed to create ReusingArena of capacity {capacity}: {err}"))
  }

  pub fn with_leak_policy(mut self, policy: LeakPolicy) -> Self {
    self.base.set_leak_policy(policy);
    self
  }

  pub fn capacity(&self) -> usize {
    self.base.capacity()
  }

  pub fn cursor(&self) -> usize {
    self.base.cursor()
  }

  pub fn available(&self) -> usize {
    self.base.capacity() - self.base.cursor()
  }

  /// Freed spans waiting for reuse, oldest first.
  pub fn free_spans(&self) -> &[Span] {
    self.base.free_spans()
  }

  pub fn offset_of(&self, block: &Block<u8>) -> Option<usize> {
    self.base.offset_of(block)
  }

  pub fn fallback_count(&self) -> usize {
    self.base.fallback_count()
  }

  pub fn finish(mut self) -> Result<(), AllocError> {
    self.base.finish()
  }
}

impl<const ALIGN: usize> RawAllocator<u8> for ReusingArena<ALIGN> {
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
