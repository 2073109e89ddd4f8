//! Teardown leak checks shared by every allocator.
//!
//! Allocators run [`check`] from `finish` and [`report`] from `Drop`. The
//! check is the same in both; only what happens with a leak differs.

use tracing::{
  debug,
  error,
};

use crate::{
  AllocError,
  AllocatorKind,
  Counters,
  LeakPolicy,
};

/// Fails with [`AllocError::LeakDetected`] when anything is outstanding.
pub(crate) fn check(kind: AllocatorKind, counters: Counters) -> Result<(), AllocError> {
  if counters.is_balanced() {
    debug!(kind = kind.as_str(), "allocator torn down clean");
    Ok(())
  } else {
    Err(AllocError::LeakDetected {
      kind,
      allocations: counters.allocations(),
      constructions: counters.constructions(),
    })
  }
}

/// Applies `policy` to the outcome of [`check`].
pub(crate) fn report(kind: AllocatorKind, counters: Counters, policy: LeakPolicy) {
  let Err(leak) = check(kind, counters) else {
    return;
  };
  match policy {
    LeakPolicy::Ignore => {}
    LeakPolicy::Log => {
      error!(
        kind = kind.as_str(),
        allocations = counters.allocations(),
        constructions = counters.constructions(),
        "leak detected at teardown"
      );
    }
    LeakPolicy::Panic => {
      error!(
        kind = kind.as_str(),
        allocations = counters.allocations(),
        constructions = counters.constructions(),
        "leak detected at teardown"
      );
      // A second panic while unwinding would abort.
      if !std::thread::panicking() {
        panic!("{leak}");
      }
    }
  }
}
