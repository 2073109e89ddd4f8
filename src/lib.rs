//! A small family of single-threaded allocators behind one capability trait.
//!
//! Every allocator implements [`RawAllocator`]: raw storage is reserved with
//! `allocate`, values are placed and dropped in it with `construct` and
//! `destroy`, and the storage goes back with `deallocate`. The variants
//! differ in where storage comes from and how it is reclaimed:
//!
//! - [`PassthroughAllocator`] forwards to the system heap.
//! - [`LinearAllocator`] bumps through a caller buffer and never reclaims.
//! - [`NaiveArena`] bumps through an aligned byte buffer and only reclaims
//!   the tail block.
//! - [`ReusingArena`] adds a first-fit free list on top of that.
//! - [`TypedArena`] bumps through a caller buffer of `T` and recycles freed
//!   spans, most recent first.
//!
//! Allocators track the state of every slot they hand out, so calls made out
//! of order are rejected with an [`AllocError`] instead of corrupting memory.
//!
//! With the `allocator` feature (nightly only), `Shared` wraps any of them
//! as a `core::alloc::Allocator` for use with `Vec::new_in` and friends.

#![cfg_attr(feature = "allocator", feature(allocator_api))]
#![allow(clippy::len_without_is_empty)]

pub mod arena;
pub mod block;
pub mod capability;
pub mod config;
pub mod error;
mod leak;
pub mod linear;
pub mod passthrough;
#[cfg(feature = "allocator")]
pub mod shared;
pub mod slots;


pub use arena::{
  NaiveArena,
  ReusingArena,
  Span,
  TypedArena,
};
pub use block::{
  Block,
  Counters,
  Origin,
};
pub use capability::{
  AllocatorKind,
  RawAllocator,
};
pub use config::LeakPolicy;
pub use error::AllocError;
pub use linear::LinearAllocator;
pub use passthrough::PassthroughAllocator;
#[cfg(feature = "allocator")]
pub use shared::Shared;
pub use slots::SlotState;
