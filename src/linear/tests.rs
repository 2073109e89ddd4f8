use super::LinearAllocator;
use crate::{
  AllocError,
  Origin,
  RawAllocator,
};
use core::mem::MaybeUninit;

fn buffer<const N: usize>() -> [MaybeUninit<u64>; N] {
  [const { MaybeUninit::uninit() }; N]
}

#[test]
fn basic_allocation() {
  let mut buffer = buffer::<16>();
  let mut linear = LinearAllocator::new(&mut buffer);

  let first = linear.allocate(4).unwrap();
  assert_eq!(first.len(), 4);
  assert_eq!(first.origin(), Origin::Arena);
  assert_eq!(linear.offset_of(&first), Some(0));
  assert_eq!(linear.used(), 4);

  let second = linear.allocate(2).unwrap();
  assert_eq!(linear.offset_of(&second), Some(4));
  assert_eq!(linear.available(), 10);

  linear.deallocate(second).unwrap();
  linear.deallocate(first).unwrap();
  linear.finish().unwrap();
}

#[test]
fn deallocate_never_reclaims() {
  let mut buffer = buffer::<8>();
  let mut linear = LinearAllocator::new(&mut buffer);

  let block = linear.allocate(8).unwrap();
  linear.deallocate(block).unwrap();
  assert_eq!(linear.used(), 8);
  assert_eq!(linear.counters().allocations(), 0);
  assert_eq!(
    linear.allocate(1),
    Err(AllocError::OutOfMemory {
      requested: 1,
      available: 0,
    })
  );
}

#[test]
fn allocation_may_end_exactly_at_capacity() {
  let mut buffer = buffer::<6>();
  let mut linear = LinearAllocator::new(&mut buffer);
  let a = linear.allocate(4).unwrap();
  let b = linear.allocate(2).unwrap();
  assert_eq!(linear.available(), 0);
  linear.deallocate(a).unwrap();
  linear.deallocate(b).unwrap();
}

#[test]
fn out_of_memory() {
  let mut buffer = buffer::<4>();
  let mut linear = LinearAllocator::new(&mut buffer);
  let result = linear.allocate(5);
  assert_eq!(
    result,
    Err(AllocError::OutOfMemory {
      requested: 5,
      available: 4,
    })
  );
  assert_eq!(linear.used(), 0);
}

#[test]
fn construct_destroy_round_trip() {
  let mut buffer: [MaybeUninit<String>; 2] = [const { MaybeUninit::uninit() }; 2];
  let mut linear = LinearAllocator::new(&mut buffer);

  let block = linear.allocate(1).unwrap();
  linear.construct(&block, 0, "first".to_owned()).unwrap();
  linear.destroy(&block, 0).unwrap();
  linear.construct(&block, 0, "second".to_owned()).unwrap();
  assert_eq!(linear.get(&block, 0).unwrap(), "second");

  linear.destroy(&block, 0).unwrap();
  linear.deallocate(block).unwrap();
  linear.finish().unwrap();
}

#[test]
fn foreign_block_is_rejected() {
  let mut ours = buffer::<4>();
  let mut theirs = buffer::<4>();
  let mut linear = LinearAllocator::new(&mut ours);
  let mut other = LinearAllocator::new(&mut theirs);

  let block = other.allocate(2).unwrap();
  assert_eq!(
    linear.deallocate(block),
    Err(AllocError::OwnershipViolation { addr: block.addr() })
  );
  assert_eq!(linear.used(), 0);

  other.deallocate(block).unwrap();
}

#[test]
fn leak_is_reported_by_finish() {
  let mut buffer = buffer::<4>();
  let mut linear = LinearAllocator::new(&mut buffer);
  let block = linear.allocate(1).unwrap();
  linear.construct(&block, 0, 7).unwrap();

  let err = linear.finish().unwrap_err();
  assert!(matches!(
    err,
    AllocError::LeakDetected {
      allocations: 1,
      constructions: 1,
      ..
    }
  ));
}

#[test]
#[should_panic(expected = "linear leaked")]
fn leak_panics_on_drop() {
  let mut buffer = buffer::<4>();
  let mut linear = LinearAllocator::new(&mut buffer);
  let _ = linear.allocate(1).unwrap();
}

#[test]
fn zero_sized_types_are_rejected() {
  let mut buffer = [MaybeUninit::<()>::uninit(); 4];
  assert!(matches!(LinearAllocator::try_new(&mut buffer), Err(AllocError::ZeroSized)));
}

#[test]
fn released_block_is_rejected_without_side_effects() {
  let mut buffer = buffer::<4>();
  let mut linear = LinearAllocator::new(&mut buffer);
  let kept = linear.allocate(2).unwrap();
  let block = linear.allocate(2).unwrap();
  linear.deallocate(block).unwrap();

  assert_eq!(linear.deallocate(block), Err(AllocError::NotAllocated { addr: block.addr() }));
  assert_eq!(linear.construct(&block, 0, 1), Err(AllocError::NotAllocated { addr: block.addr() }));
  assert_eq!(linear.block_at(block.addr()), None);
  assert_eq!(linear.block_at(kept.addr()), Some(kept));
  assert_eq!(linear.counters().allocations(), 1);
  linear.deallocate(kept).unwrap();
  linear.finish().unwrap();
}
