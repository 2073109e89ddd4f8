//! Error type shared by every allocator in the crate.

use crate::capability::AllocatorKind;

/// Errors reported by [`RawAllocator`](crate::RawAllocator) operations.
///
/// Every variant is local and non-retryable. Only [`AllocError::OutOfMemory`]
/// has a recovery path on the caller's side (free something, then retry).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
  /// Neither the bump path nor the free list could satisfy the request.
  #[error("out of memory: requested {requested} units, {available} available")]
  OutOfMemory {
    /// Units (elements or bytes) requested.
    requested: usize,
    /// Units still available on the bump path.
    available: usize,
  },
  /// The system heap refused a request.
  #[error("system allocator refused a request of {bytes} bytes")]
  SystemExhausted {
    /// Size of the refused request in bytes.
    bytes: usize,
  },
  /// The block does not belong to this allocator.
  #[error("block at {addr:#x} is not owned by this allocator")]
  OwnershipViolation {
    /// Start address of the rejected block.
    addr: usize,
  },
  /// Outstanding allocations or constructions remained at teardown.
  #[error("{kind} leaked {allocations} allocation(s) and {constructions} construction(s)")]
  LeakDetected {
    /// Which allocator leaked.
    kind: AllocatorKind,
    /// Blocks never deallocated.
    allocations: usize,
    /// Values never destroyed.
    constructions: usize,
  },
  /// The configured alignment is not a power of two.
  #[error("alignment {align} is not a power of two")]
  AlignmentViolation {
    /// The rejected alignment.
    align: usize,
  },
  /// Zero-element requests and zero-sized element types are not supported.
  #[error("zero-sized allocations are not supported")]
  ZeroSized,
  /// The request does not fit in `usize` once scaled and aligned.
  #[error("allocation size overflows usize")]
  SizeOverflow,
  /// Slot index outside the block.
  #[error("index {index} out of bounds for block of {len} element(s)")]
  IndexOutOfBounds {
    /// The rejected index.
    index: usize,
    /// Length of the block.
    len: usize,
  },
  /// The storage has already been released.
  #[error("block at {addr:#x} is not currently allocated")]
  NotAllocated {
    /// Start address of the block.
    addr: usize,
  },
  /// `construct` on a slot that already holds a value.
  #[error("slot {index} already holds a constructed value")]
  AlreadyConstructed {
    /// The occupied slot.
    index: usize,
  },
  /// `destroy` or a read on a slot without a value.
  #[error("slot {index} holds no constructed value")]
  NotConstructed {
    /// The empty slot.
    index: usize,
  },
  /// `deallocate` on a block that still holds values.
  #[error("block still holds {count} constructed value(s)")]
  LiveValues {
    /// Number of slots still constructed.
    count: usize,
  },
}

impl AllocError {
  /// Logs and builds an [`AllocError::OwnershipViolation`].
  pub(crate) fn foreign(kind: AllocatorKind, addr: usize) -> Self {
    tracing::error!(
      kind = kind.as_str(),
      addr,
      "cannot release memory that does not belong to this allocator"
    );
    AllocError::OwnershipViolation { addr }
  }
}
