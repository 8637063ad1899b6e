//! The bytecode to syntax tree pipeline.
//!
//! Per method: [`cfg`] splits the code into blocks, [`stack_sim`] replays each
//! block into expression trees, [`structuring`] rebuilds loops, conditionals,
//! switches and exception regions, [`type_inference`] names and types the
//! local variables, [`desugar`] re-sugars compiler idioms, and [`assembler`]
//! composes the per-class declaration tree.

pub mod assembler;
pub mod cfg;
pub mod cfg_types;
pub mod class_decompiler;
pub mod descriptor;
pub mod desugar;
pub mod expr;
pub mod java_ast;
pub mod signature;
pub mod stack_sim;
pub mod structured_types;
pub mod structuring;
pub mod type_inference;
pub mod util;

pub use class_decompiler::{decompile, DecompileOptions, DecompiledClass, DecompiledMethod, Decompiler};
pub use desugar::DesugarOptions;
