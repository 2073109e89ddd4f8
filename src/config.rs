//! Teardown configuration.

use crate::capability::AllocatorKind;

/// How an allocator reports outstanding allocations when it is dropped.
///
/// Every allocator picks its default from [`LeakPolicy::default_for`] and
/// can be overridden with `with_leak_policy`. [`finish`] style teardown
/// bypasses the policy and hands the result to the caller instead.
///
/// [`finish`]: crate::PassthroughAllocator::finish
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LeakPolicy {
  /// Log the leak and panic, unless the thread is already unwinding.
  Panic,
  /// Log the leak at `error` level and carry on.
  #[default]
  Log,
  /// Say nothing.
  Ignore,
}

impl LeakPolicy {
  /// Default policy for each allocator variant.
  ///
  /// The heap-backed and linear allocators treat a leak as fatal; the arenas
  /// only emit a diagnostic since their storage is released as a unit anyway.
  pub const fn default_for(kind: AllocatorKind) -> Self {
    match kind {
      AllocatorKind::Passthrough | AllocatorKind::Linear => LeakPolicy::Panic,
      AllocatorKind::NaiveArena | AllocatorKind::ReusingArena | AllocatorKind::TypedArena => {
        LeakPolicy::Log
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn heap_and_linear_are_fatal() {
    assert_eq!(LeakPolicy::default_for(AllocatorKind::Passthrough), LeakPolicy::Panic);
    assert_eq!(LeakPolicy::default_for(AllocatorKind::Linear), LeakPolicy::Panic);
  }

  #[test]
  fn arenas_only_log() {
    assert_eq!(LeakPolicy::default_for(AllocatorKind::TypedArena), LeakPolicy::Log);
    assert_eq!(LeakPolicy::default_for(AllocatorKind::ReusingArena), LeakPolicy::Log);
  }
}
