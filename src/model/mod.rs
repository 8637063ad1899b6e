//! The decoded class model consumed by the decompiler.
//!
//! Everything in here is produced by an external class-file reader: constant
//! pool references are already resolved to owner/name/descriptor triples and
//! jump targets are absolute instruction offsets.

mod builder;
mod flags;
mod instruction;
mod types;

pub use builder::{CodeBuilder, Label};
pub use flags::*;
pub use instruction::*;
pub use types::*;
