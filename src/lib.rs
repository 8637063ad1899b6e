//! Reconstruct structured Java syntax trees from decoded JVM bytecode.
//!
//! The input is a [`model::ClassModel`]: a class whose constant pool has
//! already been resolved by some class-file reader. The output is a
//! [`decompile::java_ast::JavaClass`] declaration tree with one structured body
//! per method, ready for an external printer.
//!
//! ```rust
//! use classfile_decompiler::model::*;
//! use classfile_decompiler::decompile::decompile;
//!
//! let mut b = CodeBuilder::new();
//! b.load(ValueKind::Int, 0).load(ValueKind::Int, 1).arith(ArithOp::Add, ValueKind::Int);
//! b.return_value(ValueKind::Int);
//! let add = MethodModel::new("add", "(II)I", MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
//!     .with_code(b.build().unwrap());
//!
//! let class = ClassModel::new("demo/Calc").with_method(add);
//! let result = decompile(&class).unwrap();
//! assert!(result.failures.is_empty());
//! assert_eq!(result.class.name, "Calc");
//! ```

pub mod decompile;
pub mod error;
pub mod model;

pub use decompile::{decompile, DecompileOptions, DecompiledClass, DecompiledMethod, Decompiler};
pub use error::{DecompileError, FailureKind, MethodFailure, ReconstructError};
