//! Error types for code generation and execution

use derive_more::Display;
use mana_ast::Identifier;

use crate::types::ValueType;

pub type CodegenResult<T> = Result<T, CodegenError>;
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Display, Debug)]
#[display("{kind}")]
pub struct CodegenError {
    kind: Box<CodegenErrorKind>,
}

impl<E> From<E> for CodegenError
where
    CodegenErrorKind: From<E>,
{
    fn from(error: E) -> Self {
        CodegenError {
            kind: Box::new(CodegenErrorKind::from(error)),
        }
    }
}

impl CodegenError {
    pub fn kind(&self) -> &CodegenErrorKind {
        &self.kind
    }

    pub(crate) fn unresolved(name: &str, function: &str) -> Self {
        CodegenErrorKind::UnresolvedIdentifier {
            name: name.to_string(),
            function: function.to_string(),
        }
        .into()
    }

    pub(crate) fn type_mismatch(
        function: &str,
        context: impl std::fmt::Display,
        expected: impl std::fmt::Display,
        found: ValueType,
    ) -> Self {
        CodegenErrorKind::TypeMismatch {
            function: function.to_string(),
            context: context.to_string(),
            expected: expected.to_string(),
            found,
        }
        .into()
    }

    pub(crate) fn malformed_function(function: &str, message: impl std::fmt::Display) -> Self {
        CodegenErrorKind::MalformedFunction {
            function: function.to_string(),
            message: message.to_string(),
        }
        .into()
    }

    pub(crate) fn invalid_ir(message: impl std::fmt::Display) -> Self {
        CodegenErrorKind::InvalidIr(message.to_string()).into()
    }
}

#[derive(Display, Debug, Clone, PartialEq, Eq)]
pub enum CodegenErrorKind {
    #[display("unresolved identifier `{name}` in function `{function}`")]
    UnresolvedIdentifier {
        name: Identifier,
        function: Identifier,
    },

    #[display("function `{function}` failed verification: {message}")]
    MalformedFunction { function: Identifier, message: String },

    #[display("type mismatch in function `{function}`: {context} expects {expected}, found {found}")]
    TypeMismatch {
        function: Identifier,
        context: String,
        expected: String,
        found: ValueType,
    },

    #[display("function `{callee}` takes {expected} argument(s) but {found} were supplied")]
    ArityMismatch {
        callee: Identifier,
        expected: usize,
        found: usize,
    },

    #[display("function `{_0}` is already defined")]
    DuplicateFunction(Identifier),

    #[display("parameter `{parameter}` is declared more than once in function `{function}`")]
    DuplicateParameter {
        function: Identifier,
        parameter: Identifier,
    },

    #[display("cannot assign to constant `{name}` in function `{function}`")]
    AssignToConstant {
        name: Identifier,
        function: Identifier,
    },

    #[display("only named functions can be called (in function `{_0}`)")]
    UnsupportedCallee(Identifier),

    #[display("function `{name}` must be declared at the top level")]
    NestedFunction { name: Identifier },

    #[display("program defines `main` and also has top-level statements")]
    EntryConflict,

    #[display("entry point `main` must not take parameters")]
    InvalidEntryPoint,

    #[display("top-level statements need an entry point, but entry synthesis is disabled")]
    ScriptWithoutEntry,

    #[display("identifier `{_0}` is reserved")]
    ReservedIdentifier(Identifier),

    #[display("invalid IR: {_0}")]
    InvalidIr(String),
}

impl std::error::Error for CodegenError {}

/// Failure to describe or configure the compilation target.
#[derive(Display, Debug)]
pub enum TargetError {
    #[display("unsupported target `{triple}`: {reason}")]
    Unsupported { triple: String, reason: String },

    #[display("invalid code generator setting: {_0}")]
    Settings(cranelift_codegen::settings::SetError),

    #[display("failed to build target ISA: {_0}")]
    Isa(cranelift_codegen::CodegenError),
}

impl From<cranelift_codegen::settings::SetError> for TargetError {
    fn from(error: cranelift_codegen::settings::SetError) -> Self {
        TargetError::Settings(error)
    }
}

impl From<cranelift_codegen::CodegenError> for TargetError {
    fn from(error: cranelift_codegen::CodegenError) -> Self {
        TargetError::Isa(error)
    }
}

impl std::error::Error for TargetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TargetError::Settings(e) => Some(e),
            TargetError::Isa(e) => Some(e),
            TargetError::Unsupported { .. } => None,
        }
    }
}

#[derive(Display, Debug)]
#[display("{kind}")]
pub struct EngineError {
    kind: Box<EngineErrorKind>,
}

impl<E> From<E> for EngineError
where
    EngineErrorKind: From<E>,
{
    fn from(error: E) -> Self {
        EngineError {
            kind: Box::new(EngineErrorKind::from(error)),
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> &EngineErrorKind {
        &self.kind
    }

    pub(crate) fn link(unit: &str, reason: impl Into<LinkFailure>) -> Self {
        EngineErrorKind::Link {
            unit: unit.to_string(),
            reason: reason.into(),
        }
        .into()
    }

    pub(crate) fn symbol_not_found(name: &str) -> Self {
        EngineErrorKind::SymbolNotFound(name.to_string()).into()
    }

    pub(crate) fn invalid_entry(name: &str, reason: impl std::fmt::Display) -> Self {
        EngineErrorKind::InvalidEntry {
            name: name.to_string(),
            reason: reason.to_string(),
        }
        .into()
    }
}

#[derive(Display, Debug)]
pub enum EngineErrorKind {
    #[display("target detection failed: {_0}")]
    TargetDetection(TargetError),

    #[display("failed to link module `{unit}`: {reason}")]
    Link { unit: String, reason: LinkFailure },

    #[display("symbol `{_0}` not found")]
    SymbolNotFound(String),

    #[display("`{name}` cannot be invoked as an entry point: {reason}")]
    InvalidEntry { name: String, reason: String },
}

impl From<TargetError> for EngineErrorKind {
    fn from(error: TargetError) -> Self {
        EngineErrorKind::TargetDetection(error)
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &*self.kind {
            EngineErrorKind::TargetDetection(e) => Some(e),
            EngineErrorKind::Link {
                reason: LinkFailure::Module(e),
                ..
            } => Some(e),
            _ => None,
        }
    }
}

/// Why a compilation unit was rejected by the execution engine.
#[derive(Display, Debug)]
pub enum LinkFailure {
    #[display("unit was generated for `{found}` but the engine targets `{expected}`")]
    TargetMismatch { expected: String, found: String },

    #[display("function `{function}` failed verification: {message}")]
    Verification { function: String, message: String },

    #[display("symbol `{_0}` is already defined")]
    DuplicateSymbol(String),

    #[display("imported symbol `{_0}` cannot be resolved")]
    UnresolvedImport(String),

    #[display("imported symbol `{name}` is declared as `{expected}` but defined as `{found}`")]
    SignatureMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[display("function `{function}` references unknown external u{namespace}:{index}")]
    DanglingReference {
        function: String,
        namespace: u32,
        index: u32,
    },

    #[display("module error: {_0}")]
    Module(cranelift_module::ModuleError),
}

impl From<cranelift_module::ModuleError> for LinkFailure {
    fn from(error: cranelift_module::ModuleError) -> Self {
        LinkFailure::Module(error)
    }
}
