//! Buffer-backed arenas: two byte arenas sharing one core, and a typed arena.

mod base;
pub mod freelist;
pub mod naive;
pub mod reusing;
pub mod typed;


pub use freelist::Span;
pub use naive::NaiveArena;
pub use reusing::ReusingArena;
pub use typed::TypedArena;
