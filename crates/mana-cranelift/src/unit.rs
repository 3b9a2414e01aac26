//! Compilation units
//!
//! A [`CompilationUnit`] is everything one code generation session produced:
//! a symbol table, the Cranelift functions defined in it and the read-only
//! data objects they reference. Functions refer to other symbols through
//! unit-local external names: namespace [`FUNC_NAMESPACE`] indexes the symbol
//! table and namespace [`DATA_NAMESPACE`] indexes the data objects. The
//! execution engine rewrites these to its own identifiers when linking.
//!
//! The textual form written by [`CompilationUnit::display_ir`] is a header
//! of `;` comments followed by CLIF. Each function is preceded by a
//! `; names` line listing its external name table in order, since the CLIF
//! printer only spells out the names of call targets.

use std::fmt;

use cranelift_codegen::entity::EntityRef;
use cranelift_codegen::ir::immediates::Imm64;
use cranelift_codegen::ir::{
    ExtFuncData, ExternalName, FuncRef, Function, GlobalValue,
    GlobalValueData, Signature, UserExternalName, UserExternalNameRef, UserFuncName,
};
use cranelift_codegen::ir::function::FunctionParameters;
use cranelift_frontend::FunctionBuilder;

use crate::errors::{CodegenError, CodegenResult};
use crate::target::TargetInfo;

pub const FUNC_NAMESPACE: u32 = 0;
pub const DATA_NAMESPACE: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolLinkage {
    /// Defined in the unit and invisible outside it.
    Local,
    /// Defined in the unit and visible to lookups and later units.
    Export,
    /// Defined elsewhere: by the host process or a previously linked unit.
    Import,
}

impl SymbolLinkage {
    fn as_str(self) -> &'static str {
        match self {
            SymbolLinkage::Local => "local",
            SymbolLinkage::Export => "export",
            SymbolLinkage::Import => "import",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text {
            "local" => Some(SymbolLinkage::Local),
            "export" => Some(SymbolLinkage::Export),
            "import" => Some(SymbolLinkage::Import),
            _ => None,
        }
    }
}

impl fmt::Display for SymbolLinkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct UnitSymbol {
    pub name: String,
    pub linkage: SymbolLinkage,
    pub signature: Signature,
}

#[derive(Clone, Debug)]
pub struct UnitFunction {
    pub symbol: u32,
    pub function: Function,
}

/// Sizes of the unit's tables at a point in time.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Checkpoint {
    symbols: usize,
    functions: usize,
    data: usize,
}

#[derive(Clone, Debug)]
pub struct CompilationUnit {
    name: String,
    target: TargetInfo,
    symbols: Vec<UnitSymbol>,
    functions: Vec<UnitFunction>,
    data: Vec<Box<[u8]>>,
}

impl CompilationUnit {
    pub(crate) fn new(name: &str, target: &TargetInfo) -> Self {
        Self {
            name: name.to_string(),
            target: target.clone(),
            symbols: Vec::new(),
            functions: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &TargetInfo {
        &self.target
    }

    pub fn symbols(&self) -> &[UnitSymbol] {
        &self.symbols
    }

    pub fn symbol(&self, index: u32) -> Option<&UnitSymbol> {
        self.symbols.get(index as usize)
    }

    pub fn symbol_index(&self, name: &str) -> Option<u32> {
        self.symbols
            .iter()
            .position(|symbol| symbol.name == name)
            .map(|index| index as u32)
    }

    pub fn defined_functions(&self) -> &[UnitFunction] {
        &self.functions
    }

    /// The defined function with the given symbol name.
    pub fn function(&self, name: &str) -> Option<&Function> {
        let index = self.symbol_index(name)?;
        self.functions
            .iter()
            .find(|defined| defined.symbol == index)
            .map(|defined| &defined.function)
    }

    pub fn data_objects(&self) -> &[Box<[u8]>] {
        &self.data
    }

    pub fn exports(&self) -> impl Iterator<Item = &UnitSymbol> {
        self.symbols
            .iter()
            .filter(|symbol| symbol.linkage == SymbolLinkage::Export)
    }

    pub fn imports(&self) -> impl Iterator<Item = &UnitSymbol> {
        self.symbols
            .iter()
            .filter(|symbol| symbol.linkage == SymbolLinkage::Import)
    }

    pub(crate) fn declare_symbol(
        &mut self,
        name: &str,
        linkage: SymbolLinkage,
        signature: Signature,
    ) -> u32 {
        self.symbols.push(UnitSymbol {
            name: name.to_string(),
            linkage,
            signature,
        });
        (self.symbols.len() - 1) as u32
    }

    pub(crate) fn define_function(&mut self, symbol: u32, function: Function) {
        self.functions.push(UnitFunction { symbol, function });
    }

    /// Add a read-only data object, reusing an identical one if present.
    pub(crate) fn intern_data(&mut self, bytes: &[u8]) -> u32 {
        if let Some(index) = self.data.iter().position(|data| data.as_ref() == bytes) {
            return index as u32;
        }
        self.data.push(bytes.into());
        (self.data.len() - 1) as u32
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            symbols: self.symbols.len(),
            functions: self.functions.len(),
            data: self.data.len(),
        }
    }

    pub(crate) fn rollback(&mut self, checkpoint: Checkpoint) {
        self.symbols.truncate(checkpoint.symbols);
        self.functions.truncate(checkpoint.functions);
        self.data.truncate(checkpoint.data);
    }

    /// Textual form of the unit: a header of `;` comments describing the
    /// module, its symbols and data, followed by every function in CLIF.
    pub fn display_ir(&self) -> String {
        self.to_string()
    }

    /// Reassemble a unit from the output of [`CompilationUnit::display_ir`].
    pub fn from_ir(text: &str, target: &TargetInfo) -> CodegenResult<Self> {
        let mut unit = CompilationUnit::new("", target);
        let mut module_name = None;

        for line in text.lines().map(str::trim) {
            if line.is_empty() {
                continue;
            }
            let Some(comment) = line.strip_prefix(';') else {
                break;
            };
            let comment = comment.trim_start();
            let (keyword, rest) = comment.split_once(' ').unwrap_or((comment, ""));
            let mut fields = rest.split_whitespace();
            match keyword {
                "module" => module_name = Some(rest.trim().to_string()),
                "symbol" => {
                    let (namespace, index) = parse_external(fields.next())?;
                    let linkage = fields
                        .next()
                        .and_then(SymbolLinkage::parse)
                        .ok_or_else(|| CodegenError::invalid_ir("missing symbol linkage"))?;
                    let name = fields
                        .next()
                        .ok_or_else(|| CodegenError::invalid_ir("missing symbol name"))?;
                    if namespace != FUNC_NAMESPACE || index as usize != unit.symbols.len() {
                        return Err(CodegenError::invalid_ir(format!(
                            "symbol `{name}` is out of order"
                        )));
                    }
                    unit.declare_symbol(name, linkage, Signature::new(target.call_conv()));
                }
                "data" => {
                    let (namespace, index) = parse_external(fields.next())?;
                    if namespace != DATA_NAMESPACE || index as usize != unit.data.len() {
                        return Err(CodegenError::invalid_ir("data object is out of order"));
                    }
                    let bytes = parse_hex(fields.next().unwrap_or(""))?;
                    unit.data.push(bytes.into());
                }
                _ => {}
            }
        }

        unit.name =
            module_name.ok_or_else(|| CodegenError::invalid_ir("missing `; module` header"))?;

        let name_tables = text
            .lines()
            .filter_map(|line| line.trim().strip_prefix("; names"))
            .map(|names| {
                names
                    .split_whitespace()
                    .map(|field| {
                        parse_external(Some(field))
                            .map(|(namespace, index)| UserExternalName::new(namespace, index))
                    })
                    .collect::<CodegenResult<Vec<_>>>()
            })
            .collect::<CodegenResult<Vec<_>>>()?;

        let functions =
            cranelift_reader::parse_functions(text).map_err(CodegenError::invalid_ir)?;
        if functions.len() != name_tables.len() {
            return Err(CodegenError::invalid_ir(format!(
                "{} functions but {} `; names` lines",
                functions.len(),
                name_tables.len()
            )));
        }

        for (mut function, names) in functions.into_iter().zip(name_tables) {
            let symbol = match &function.name {
                UserFuncName::User(name) if name.namespace == FUNC_NAMESPACE => name.index,
                other => {
                    return Err(CodegenError::invalid_ir(format!(
                        "function {other} is not a unit symbol"
                    )));
                }
            };
            restore_external_names(&mut function, &names)?;

            let declared = unit.symbols.get_mut(symbol as usize).ok_or_else(|| {
                CodegenError::invalid_ir(format!("function u0:{symbol} is not declared"))
            })?;
            declared.signature = function.signature.clone();

            // Imports only appear as call targets; take their signatures from there.
            for ext in function.dfg.ext_funcs.values() {
                let ExternalName::User(reference) = &ext.name else {
                    continue;
                };
                let callee = &function.params.user_named_funcs()[*reference];
                if callee.namespace != FUNC_NAMESPACE {
                    continue;
                }
                if let Some(imported) = unit.symbols.get_mut(callee.index as usize) {
                    if imported.linkage == SymbolLinkage::Import {
                        imported.signature = function.dfg.signatures[ext.signature].clone();
                    }
                }
            }

            unit.define_function(symbol, function);
        }

        Ok(unit)
    }
}

impl fmt::Display for CompilationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        writeln!(f, "; target {}", self.target)?;
        for (index, symbol) in self.symbols.iter().enumerate() {
            writeln!(
                f,
                "; symbol u{FUNC_NAMESPACE}:{index} {} {}",
                symbol.linkage, symbol.name
            )?;
        }
        for (index, bytes) in self.data.iter().enumerate() {
            write!(f, "; data u{DATA_NAMESPACE}:{index} ")?;
            for byte in bytes.iter() {
                write!(f, "{byte:02x}")?;
            }
            writeln!(f)?;
        }
        for defined in &self.functions {
            writeln!(f)?;
            write!(f, "; names")?;
            for (_, name) in defined.function.params.user_named_funcs().iter() {
                write!(f, " u{}:{}", name.namespace, name.index)?;
            }
            writeln!(f)?;
            write!(f, "{}", defined.function.display())?;
        }
        Ok(())
    }
}

/// Rebuild the external name table of a parsed function from its `; names`
/// line. Call targets were parsed with their full names; symbol global values
/// only carry their index into `names`.
fn restore_external_names(
    function: &mut Function,
    names: &[UserExternalName],
) -> CodegenResult<()> {
    let unknown = |what: String| CodegenError::invalid_ir(format!("{what} is missing from `; names`"));

    let mut call_targets = Vec::new();
    for (func_ref, ext) in function.dfg.ext_funcs.iter() {
        if let ExternalName::User(parsed) = &ext.name {
            let name = &function.params.user_named_funcs()[*parsed];
            let index = names
                .iter()
                .position(|candidate| candidate == name)
                .ok_or_else(|| unknown(format!("u{}:{}", name.namespace, name.index)))?;
            call_targets.push((func_ref, index));
        }
    }
    for data in function.global_values.values() {
        if let GlobalValueData::Symbol {
            name: ExternalName::User(reference),
            ..
        } = data
        {
            if reference.index() >= names.len() {
                return Err(unknown(format!("userextname{}", reference.index())));
            }
        }
    }

    let mut params = FunctionParameters::new();
    for name in names {
        params.ensure_user_func_name(name.clone());
    }
    function.params = params;
    for (func_ref, index) in call_targets {
        function.dfg.ext_funcs[func_ref].name = ExternalName::user(UserExternalNameRef::new(index));
    }
    Ok(())
}

fn parse_external(field: Option<&str>) -> CodegenResult<(u32, u32)> {
    let malformed = || CodegenError::invalid_ir(format!("malformed external name {field:?}"));
    let (namespace, index) = field
        .and_then(|field| field.strip_prefix('u'))
        .and_then(|field| field.split_once(':'))
        .ok_or_else(malformed)?;
    Ok((
        namespace.parse().map_err(|_| malformed())?,
        index.parse().map_err(|_| malformed())?,
    ))
}

fn parse_hex(text: &str) -> CodegenResult<Vec<u8>> {
    if text.len() % 2 != 0 {
        return Err(CodegenError::invalid_ir("odd-length data literal"));
    }
    (0..text.len())
        .step_by(2)
        .map(|at| {
            u8::from_str_radix(&text[at..at + 2], 16)
                .map_err(|_| CodegenError::invalid_ir(format!("invalid data byte at {at}")))
        })
        .collect()
}

/// Make the unit symbol `symbol` callable from the function being built.
pub(crate) fn import_function(
    builder: &mut FunctionBuilder<'_>,
    symbol: u32,
    signature: &Signature,
) -> FuncRef {
    let name = builder
        .func
        .declare_imported_user_function(UserExternalName::new(FUNC_NAMESPACE, symbol));
    let signature = builder.import_signature(signature.clone());
    builder.import_function(ExtFuncData {
        name: ExternalName::user(name),
        signature,
        colocated: false,
    })
}

/// Make the unit data object `data` addressable from the function being built.
pub(crate) fn import_data(builder: &mut FunctionBuilder<'_>, data: u32) -> GlobalValue {
    let name = builder
        .func
        .declare_imported_user_function(UserExternalName::new(DATA_NAMESPACE, data));
    builder.create_global_value(GlobalValueData::Symbol {
        name: ExternalName::user(name),
        offset: Imm64::new(0),
        colocated: false,
        tls: false,
    })
}
