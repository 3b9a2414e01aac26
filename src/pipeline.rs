//! Compilation pipeline for Mana.
//!
//! ```text
//! &[Stmt]
//!     │
//!     ├─► compile_program ─► CompilationUnit ─┬─► ExecutionEngine ─► run_jit
//!     │                                       └─► display_ir ─► emit_ir
//!     │
//!     └─► transpile ─► Rust source
//! ```

use derive_more::{Display, From};
use mana_ast::{ENTRY_POINT, Stmt};
use mana_cranelift::{CodegenError, EngineError, ExecutionEngine, TargetError, TargetInfo, compile_program};
use mana_runtime::capture_output;
use tracing::debug;

/// Outcome of running a program on the JIT.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JitRun {
    /// Value returned by the entry point.
    pub exit_status: i32,
    /// Everything the program printed.
    pub output: String,
}

#[derive(Debug, Display, From)]
pub enum PipelineError {
    #[display("code generation failed: {_0}")]
    Codegen(CodegenError),

    #[display("{_0}")]
    Target(TargetError),

    #[display("execution failed: {_0}")]
    Engine(EngineError),
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Codegen(e) => Some(e),
            PipelineError::Target(e) => Some(e),
            PipelineError::Engine(e) => Some(e),
        }
    }
}

/// Compile `statements`, link them into a fresh engine and run `main`.
///
/// The program's output is captured rather than written to stdout.
pub fn run_jit(module_name: &str, statements: &[Stmt]) -> Result<JitRun, PipelineError> {
    let mut engine = ExecutionEngine::create()?;
    let unit = compile_program(module_name, engine.target(), statements)?;
    engine.add_module(unit)?;

    let (status, output) = capture_output(|| engine.invoke_entry(ENTRY_POINT));
    let exit_status = status?;
    debug!(module = module_name, exit_status, "program finished");

    Ok(JitRun {
        exit_status,
        output,
    })
}

/// Compile `statements` for the host and return the textual IR dump.
pub fn emit_ir(module_name: &str, statements: &[Stmt]) -> Result<String, PipelineError> {
    let target = TargetInfo::host()?;
    let unit = compile_program(module_name, &target, statements)?;
    Ok(unit.display_ir())
}

/// Render `statements` as a standalone Rust program.
pub fn transpile(statements: &[Stmt]) -> String {
    mana_transpile::transpile(statements)
}
