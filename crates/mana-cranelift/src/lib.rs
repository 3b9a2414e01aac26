//! Cranelift backend for Mana
//!
//! This crate lowers Mana syntax trees to Cranelift IR and executes the
//! result in-process:
//!
//! ```text
//! &[Stmt] ──CodeGenerator──▶ CompilationUnit ──ExecutionEngine──▶ native code
//!                                  │
//!                                  └── display_ir() / from_ir()
//! ```

pub mod codegen;
pub mod engine;
pub mod errors;
pub mod runtime;
pub mod scope;
pub mod target;
pub mod types;
pub mod unit;


pub use codegen::{CodeGenerator, CodegenOptions, compile_program};
pub use engine::{ExecutionEngine, SymbolAddress, SymbolOrigin};
pub use errors::{
    CodegenError, CodegenErrorKind, CodegenResult, EngineError, EngineErrorKind, EngineResult,
    LinkFailure, TargetError,
};
pub use target::{EngineConfig, OptLevel, TargetInfo};
pub use types::ValueType;
pub use unit::{CompilationUnit, SymbolLinkage, UnitSymbol};
