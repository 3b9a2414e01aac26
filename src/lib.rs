//! Mana compiler core.
//!
//! Mana programs arrive as syntax trees ([`mana_ast`]) and take one of two
//! routes: Cranelift code generation and in-process execution
//! ([`mana_cranelift`]), or translation to Rust source
//! ([`mana_transpile`]). [`pipeline`] strings the stages together.

pub mod pipeline;

pub use mana_ast as ast;
pub use pipeline::{JitRun, PipelineError, emit_ir, run_jit, transpile};
