//! Per-slot lifecycle tracking.
//!
//! Every slot an allocator can hand out moves through
//! `Free -> Allocated -> Constructed -> Allocated -> Free`. The table checks
//! each transition before applying it, so a rejected call leaves the table
//! untouched.
//!
//! Each claimed range is also recorded under its first slot together with
//! the stamp of the [`Block`] that was handed out for it. A handle is only
//! accepted while its start, length and stamp match a live entry, so a copy
//! of a released block stays rejected after its slots have been handed out
//! again.

use core::sync::atomic::{
  AtomicU64,
  Ordering,
};
use std::collections::HashMap;

use crate::{
  AllocError,
  Block,
};

/// Stamps are unique across every allocator in the process.
static NEXT_STAMP: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a single slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlotState {
  /// Not handed out.
  #[default]
  Free,
  /// Handed out, uninitialized.
  Allocated,
  /// Holds a live value.
  Constructed,
}

#[derive(Clone, Copy, Debug)]
struct Owner {
  len: usize,
  stamp: u64,
}

#[derive(Debug)]
pub(crate) struct SlotTable {
  states: Vec<SlotState>,
  owners: HashMap<usize, Owner>,
}

impl SlotTable {
  pub(crate) fn new(len: usize) -> Self {
    Self {
      states: vec![SlotState::Free; len],
      owners: HashMap::new(),
    }
  }

  #[cfg(test)]
  pub(crate) fn state(&self, index: usize) -> SlotState {
    self.states[index]
  }

  /// Marks `start..start + len` as handed out and returns the stamp the new
  /// block must carry. The range must be free.
  pub(crate) fn claim(&mut self, start: usize, len: usize) -> u64 {
    let range = start..start + len;
    debug_assert!(
      self.states[range.clone()].iter().all(|s| *s == SlotState::Free),
      "claiming slots that are still in use"
    );
    self.states[range].fill(SlotState::Allocated);
    let stamp = NEXT_STAMP.fetch_add(1, Ordering::Relaxed);
    self.owners.insert(start, Owner { len, stamp });
    stamp
  }

  /// Length and stamp of the live block starting at `start`.
  pub(crate) fn owner(&self, start: usize) -> Option<(usize, u64)> {
    self.owners.get(&start).map(|owner| (owner.len, owner.stamp))
  }

  /// Fails with [`AllocError::NotAllocated`] unless `block` is the live
  /// block recorded at `start`.
  fn verify<T>(&self, start: usize, block: &Block<T>) -> Result<(), AllocError> {
    match self.owners.get(&start) {
      Some(owner) if owner.len == block.len() && owner.stamp == block.stamp() => Ok(()),
      _ => Err(AllocError::NotAllocated { addr: block.addr() }),
    }
  }

  /// Returns the slots of `block`, which starts at slot `start`, to the free
  /// state.
  pub(crate) fn release<T>(&mut self, start: usize, block: &Block<T>) -> Result<(), AllocError> {
    self.verify(start, block)?;
    let range = start..start + block.len();
    let count = self.states[range.clone()]
      .iter()
      .filter(|s| **s == SlotState::Constructed)
      .count();
    if count > 0 {
      return Err(AllocError::LiveValues { count });
    }
    self.states[range].fill(SlotState::Free);
    self.owners.remove(&start);
    Ok(())
  }

  // The slot methods below address slot `start + index` of `block`; errors
  // report the block-relative `index`.

  pub(crate) fn construct<T>(&mut self, start: usize, block: &Block<T>, index: usize) -> Result<(), AllocError> {
    self.verify(start, block)?;
    let slot = &mut self.states[start + index];
    match *slot {
      SlotState::Free => Err(AllocError::NotAllocated { addr: block.addr() }),
      SlotState::Constructed => Err(AllocError::AlreadyConstructed { index }),
      SlotState::Allocated => {
        *slot = SlotState::Constructed;
        Ok(())
      }
    }
  }

  pub(crate) fn destroy<T>(&mut self, start: usize, block: &Block<T>, index: usize) -> Result<(), AllocError> {
    self.verify(start, block)?;
    let slot = &mut self.states[start + index];
    match *slot {
      SlotState::Free => Err(AllocError::NotAllocated { addr: block.addr() }),
      SlotState::Allocated => Err(AllocError::NotConstructed { index }),
      SlotState::Constructed => {
        *slot = SlotState::Allocated;
        Ok(())
      }
    }
  }

  pub(crate) fn expect_constructed<T>(&self, start: usize, block: &Block<T>, index: usize) -> Result<(), AllocError> {
    self.verify(start, block)?;
    match self.states[start + index] {
      SlotState::Constructed => Ok(()),
      SlotState::Allocated => Err(AllocError::NotConstructed { index }),
      SlotState::Free => Err(AllocError::NotAllocated { addr: block.addr() }),
    }
  }
}

#[cfg(test)]
mod tests {
  use core::ptr::NonNull;

  use super::*;
  use crate::Origin;

  fn handout(table: &mut SlotTable, start: usize, len: usize) -> Block<u64> {
    let stamp = table.claim(start, len);
    Block::new(NonNull::dangling(), len, Origin::Arena, stamp)
  }

  #[test]
  fn full_lifecycle() {
    let mut table = SlotTable::new(4);
    let block = handout(&mut table, 1, 2);
    assert_eq!(table.state(0), SlotState::Free);
    assert_eq!(table.state(1), SlotState::Allocated);

    table.construct(1, &block, 0).unwrap();
    assert_eq!(table.state(1), SlotState::Constructed);
    table.expect_constructed(1, &block, 0).unwrap();

    table.destroy(1, &block, 0).unwrap();
    table.release(1, &block).unwrap();
    assert_eq!(table.state(2), SlotState::Free);
    assert_eq!(table.owner(1), None);
  }

  #[test]
  fn release_with_live_value_is_rejected() {
    let mut table = SlotTable::new(2);
    let block = handout(&mut table, 0, 2);
    table.construct(0, &block, 0).unwrap();
    assert_eq!(table.release(0, &block), Err(AllocError::LiveValues { count: 1 }));
    assert_eq!(table.state(1), SlotState::Allocated);
  }

  #[test]
  fn double_release_is_rejected() {
    let mut table = SlotTable::new(2);
    let block = handout(&mut table, 0, 2);
    table.release(0, &block).unwrap();
    assert_eq!(
      table.release(0, &block),
      Err(AllocError::NotAllocated { addr: block.addr() })
    );
  }

  #[test]
  fn construct_twice_is_rejected() {
    let mut table = SlotTable::new(1);
    let block = handout(&mut table, 0, 1);
    table.construct(0, &block, 0).unwrap();
    assert_eq!(table.construct(0, &block, 0), Err(AllocError::AlreadyConstructed { index: 0 }));
    assert_eq!(table.destroy(0, &block, 0), Ok(()));
    assert_eq!(table.destroy(0, &block, 0), Err(AllocError::NotConstructed { index: 0 }));
  }

  #[test]
  fn released_handle_stays_stale_after_reuse() {
    let mut table = SlotTable::new(2);
    let old = handout(&mut table, 0, 2);
    table.release(0, &old).unwrap();
    let new = handout(&mut table, 0, 2);
    assert_ne!(old.stamp(), new.stamp());

    let stale = Err(AllocError::NotAllocated { addr: old.addr() });
    assert_eq!(table.release(0, &old), stale);
    assert_eq!(table.construct(0, &old, 0), stale);
    assert_eq!(table.state(0), SlotState::Allocated);
    assert_eq!(table.owner(0), Some((2, new.stamp())));
  }
}
