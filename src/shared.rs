//! `core::alloc::Allocator` support, so the allocators can back standard
//! collections (`Vec::new_in`, `Box::new_in`).
//!
//! The allocators mutate through `&mut self`, while `Allocator` works on
//! `&self`. [`Shared`] puts one behind a `RefCell` and maps byte layouts to
//! element counts.

use core::{
  alloc::{
    self,
    Allocator,
    Layout,
  },
  cell::{
    Ref,
    RefCell,
  },
  marker::PhantomData,
  mem,
  ptr::{
    self,
    NonNull,
  },
};

use tracing::warn;

use crate::RawAllocator;

/// An allocator of `T` usable wherever a `core::alloc::Allocator` is
/// expected.
///
/// Layouts must be a whole number of `T` elements. A layout whose alignment
/// the returned block does not meet is refused. Values written by the
/// collection bypass `construct`, so only allocations show up in the
/// counters.
pub struct Shared<T, A> {
  inner: RefCell<A>,
  _marker: PhantomData<fn() -> T>,
}

impl<T, A: RawAllocator<T>> Shared<T, A> {
  pub fn new(allocator: A) -> Self {
    Self {
      inner: RefCell::new(allocator),
      _marker: PhantomData,
    }
  }

  /// Shared access to the wrapped allocator for inspection.
  ///
  /// # Panics
  ///
  /// Panics when called from inside an allocation, which never happens from
  /// safe code.
  pub fn borrow(&self) -> Ref<'_, A> {
    self.inner.borrow()
  }

  /// Unwraps the allocator, e.g. to call its `finish`.
  pub fn into_inner(self) -> A {
    self.inner.into_inner()
  }
}

/// Number of `T` elements covering `layout` exactly.
fn elements<T>(layout: Layout) -> Option<usize> {
  let size = mem::size_of::<T>();
  if size == 0 || layout.size() % size != 0 {
    return None;
  }
  Some(layout.size() / size)
}

unsafe impl<T, A: RawAllocator<T>> Allocator for Shared<T, A> {
  fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, alloc::AllocError> {
    if layout.size() == 0 {
      let dangling = NonNull::new(ptr::without_provenance_mut::<u8>(layout.align())).ok_or(alloc::AllocError)?;
      return Ok(NonNull::slice_from_raw_parts(dangling, 0));
    }

    let n = elements::<T>(layout).ok_or(alloc::AllocError)?;
    let mut inner = self.inner.try_borrow_mut().map_err(|_| alloc::AllocError)?;
    let block = inner.allocate(n).map_err(|_| alloc::AllocError)?;
    if block.addr() % layout.align() != 0 {
      if let Err(err) = inner.deallocate(block) {
        warn!(kind = inner.kind().as_str(), %err, "misaligned block could not be returned");
      }
      return Err(alloc::AllocError);
    }
    Ok(NonNull::slice_from_raw_parts(
      block.as_non_null().cast::<u8>(),
      n * mem::size_of::<T>(),
    ))
  }

  unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
    if layout.size() == 0 {
      return;
    }
    let Ok(mut inner) = self.inner.try_borrow_mut() else {
      return;
    };
    let addr = ptr.as_ptr() as usize;
    let result = match inner.block_at(addr) {
      Some(block) => inner.deallocate(block),
      None => Err(crate::AllocError::NotAllocated { addr }),
    };
    if let Err(err) = result {
      warn!(kind = inner.kind().as_str(), addr, %err, "collection released an unknown block");
    }
  }
}
