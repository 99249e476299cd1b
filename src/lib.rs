//! cflatc: an ahead-of-time compiler for a conservative subset of C11,
//! targeting x86-64 assembly on Linux.
//!
//! This is the compiler as a library. See `src/bin/cflatc.rs` for the
//! executable driver that ties the phases below together.

pub mod common;
pub mod diagnostics;
pub mod types;
pub mod front;
pub mod middle;
pub mod back;
pub mod driver;
