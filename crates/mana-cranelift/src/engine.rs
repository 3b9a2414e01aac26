//! JIT execution engine
//!
//! Each compilation unit handed to [`ExecutionEngine::add_module`] is linked
//! into its own [`JITModule`]. Exported functions of linked units and the
//! host runtime symbols form one namespace that later units import from and
//! [`ExecutionEngine::lookup`] resolves against. Names missing from that
//! namespace fall back to the symbols already loaded into the host process.

use std::collections::{HashMap, HashSet};
#[cfg(unix)]
use std::ffi::CString;
use std::marker::PhantomData;

use cranelift_codegen::Context;
use cranelift_codegen::ir::types::I32;
use cranelift_codegen::ir::{Function, Signature, UserExternalName};
use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_codegen::verify_function;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module, default_libcall_names};
use tracing::{debug, warn};

use crate::errors::{EngineError, EngineResult, LinkFailure};
use crate::target::{EngineConfig, TargetInfo};
use crate::unit::{CompilationUnit, DATA_NAMESPACE, FUNC_NAMESPACE, SymbolLinkage};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SymbolOrigin {
    /// Provided by the host process: a runtime symbol or any symbol loaded
    /// into the process.
    Host,
    /// Exported by the named compilation unit.
    Unit(String),
}

#[derive(Clone, Debug)]
struct ResolvedSymbol {
    address: *const u8,
    /// Known for unit functions only.
    signature: Option<Signature>,
    origin: SymbolOrigin,
}

/// Runtime address of a symbol. Borrows the engine that produced it, so it
/// cannot outlive the code it points into.
#[derive(Clone, Copy, Debug)]
pub struct SymbolAddress<'engine> {
    address: *const u8,
    _engine: PhantomData<&'engine ExecutionEngine>,
}

impl SymbolAddress<'_> {
    pub fn as_ptr(&self) -> *const u8 {
        self.address
    }
}

struct LinkedUnit {
    name: String,
    module: JITModule,
}

pub struct ExecutionEngine {
    target: TargetInfo,
    isa: OwnedTargetIsa,
    config: EngineConfig,
    units: Vec<LinkedUnit>,
    symbols: HashMap<String, ResolvedSymbol>,
}

impl ExecutionEngine {
    /// Create an engine for the host machine with default settings.
    pub fn create() -> EngineResult<Self> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> EngineResult<Self> {
        let target = TargetInfo::host()?;
        let isa = target.isa(&config)?;

        let symbols = mana_runtime::host_symbols()
            .into_iter()
            .map(|(name, address)| {
                let symbol = ResolvedSymbol {
                    address,
                    signature: None,
                    origin: SymbolOrigin::Host,
                };
                (name.to_string(), symbol)
            })
            .collect();

        debug!(%target, ?config, "created execution engine");
        Ok(Self {
            target,
            isa,
            config,
            units: Vec::new(),
            symbols,
        })
    }

    pub fn target(&self) -> &TargetInfo {
        &self.target
    }

    /// Names of the linked units, in link order.
    pub fn unit_names(&self) -> impl Iterator<Item = &str> {
        self.units.iter().map(|unit| unit.name.as_str())
    }

    /// Where a visible symbol comes from.
    pub fn symbol_origin(&self, name: &str) -> Option<SymbolOrigin> {
        match self.symbols.get(name) {
            Some(symbol) => Some(symbol.origin.clone()),
            None => process_symbol(name).map(|_| SymbolOrigin::Host),
        }
    }

    /// Link `unit` and make its exported functions visible.
    ///
    /// Linking is atomic: if any step fails the unit's code is released and
    /// none of its symbols become visible.
    pub fn add_module(&mut self, unit: CompilationUnit) -> EngineResult<()> {
        let unit_name = unit.name().to_string();

        if unit.target() != &self.target {
            return Err(EngineError::link(
                &unit_name,
                LinkFailure::TargetMismatch {
                    expected: self.target.to_string(),
                    found: unit.target().to_string(),
                },
            ));
        }
        if self.config.verify {
            self.verify_unit(&unit)
                .map_err(|failure| EngineError::link(&unit_name, failure))?;
        }
        let process_imports = self
            .check_symbols(&unit)
            .map_err(|failure| EngineError::link(&unit_name, failure))?;

        let mut module = self.new_module(&process_imports);
        let exports = match link_unit(&mut module, &unit) {
            Ok(exports) => exports,
            Err(failure) => {
                warn!(unit = %unit_name, %failure, "linking failed");
                // SAFETY: nothing from this module was published.
                unsafe { module.free_memory() };
                return Err(EngineError::link(&unit_name, failure));
            }
        };

        for (name, address) in process_imports {
            debug!(unit = %unit_name, symbol = %name, "resolved import from the host process");
            self.symbols.entry(name).or_insert(ResolvedSymbol {
                address,
                signature: None,
                origin: SymbolOrigin::Host,
            });
        }
        for (name, address, signature) in exports {
            debug!(unit = %unit_name, symbol = %name, "exported symbol");
            self.symbols.insert(
                name,
                ResolvedSymbol {
                    address,
                    signature: Some(signature),
                    origin: SymbolOrigin::Unit(unit_name.clone()),
                },
            );
        }
        debug!(unit = %unit_name, "linked unit");
        self.units.push(LinkedUnit {
            name: unit_name,
            module,
        });
        Ok(())
    }

    /// Resolve a unit export, a runtime symbol or a symbol of the host
    /// process to its address.
    pub fn lookup(&self, name: &str) -> EngineResult<SymbolAddress<'_>> {
        let address = match self.symbols.get(name) {
            Some(symbol) => symbol.address,
            None => process_symbol(name).ok_or_else(|| EngineError::symbol_not_found(name))?,
        };
        Ok(SymbolAddress {
            address,
            _engine: PhantomData,
        })
    }

    /// Call the linked function `name`, which must have the signature
    /// `() -> int`, and return its result.
    pub fn invoke_entry(&self, name: &str) -> EngineResult<i32> {
        let Some(symbol) = self.symbols.get(name) else {
            return Err(match process_symbol(name) {
                Some(_) => EngineError::invalid_entry(name, "not a compiled function"),
                None => EngineError::symbol_not_found(name),
            });
        };
        let Some(signature) = &symbol.signature else {
            return Err(EngineError::invalid_entry(name, "not a compiled function"));
        };
        let returns_int = matches!(signature.returns.as_slice(), [ret] if ret.value_type == I32);
        if !signature.params.is_empty() || !returns_int {
            return Err(EngineError::invalid_entry(
                name,
                format!("expected `() -> i32`, found `{signature}`"),
            ));
        }

        debug!(symbol = name, "invoking entry point");
        // SAFETY: the symbol is a finalized function taking no arguments and
        // returning an i32 in the target's default calling convention, which
        // is the host's C convention. Its code lives as long as `self`.
        let entry = unsafe { std::mem::transmute::<*const u8, extern "C" fn() -> i32>(symbol.address) };
        Ok(entry())
    }

    /// Release all linked code. Equivalent to dropping the engine.
    pub fn shutdown(self) {}

    fn new_module(&self, process_imports: &[(String, *const u8)]) -> JITModule {
        let mut builder = JITBuilder::with_isa(self.isa.clone(), default_libcall_names());
        for (name, symbol) in &self.symbols {
            builder.symbol(name.clone(), symbol.address);
        }
        for (name, address) in process_imports {
            builder.symbol(name.clone(), *address);
        }
        JITModule::new(builder)
    }

    fn verify_unit(&self, unit: &CompilationUnit) -> Result<(), LinkFailure> {
        for defined in unit.defined_functions() {
            if let Err(errors) = verify_function(&defined.function, &*self.isa) {
                let function = unit
                    .symbol(defined.symbol)
                    .map_or_else(|| format!("u0:{}", defined.symbol), |s| s.name.clone());
                return Err(LinkFailure::Verification {
                    function,
                    message: errors.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Check the unit's exports and imports against the visible symbols.
    /// Returns the imports that only the host process provides.
    fn check_symbols(
        &self,
        unit: &CompilationUnit,
    ) -> Result<Vec<(String, *const u8)>, LinkFailure> {
        let mut exported = HashSet::new();
        for symbol in unit.exports() {
            if self.symbols.contains_key(&symbol.name) || !exported.insert(symbol.name.as_str()) {
                return Err(LinkFailure::DuplicateSymbol(symbol.name.clone()));
            }
        }

        let mut process_imports = Vec::new();
        for symbol in unit.imports() {
            match self.symbols.get(&symbol.name) {
                Some(ResolvedSymbol {
                    signature: Some(defined),
                    ..
                }) if *defined != symbol.signature => {
                    return Err(LinkFailure::SignatureMismatch {
                        name: symbol.name.clone(),
                        expected: symbol.signature.to_string(),
                        found: defined.to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    let address = process_symbol(&symbol.name)
                        .ok_or_else(|| LinkFailure::UnresolvedImport(symbol.name.clone()))?;
                    process_imports.push((symbol.name.clone(), address));
                }
            }
        }
        Ok(process_imports)
    }
}

impl Drop for ExecutionEngine {
    fn drop(&mut self) {
        for unit in self.units.drain(..) {
            debug!(unit = %unit.name, "releasing unit");
            // SAFETY: every `SymbolAddress` borrows the engine, so no address
            // into this module is reachable any more.
            unsafe { unit.module.free_memory() };
        }
    }
}

/// Address of `name` among the symbols loaded into the host process.
#[cfg(unix)]
fn process_symbol(name: &str) -> Option<*const u8> {
    let name = CString::new(name).ok()?;
    // SAFETY: `name` is NUL-terminated and outlives the call. `dlsym` only
    // reads it.
    let address = unsafe { libc::dlsym(libc::RTLD_DEFAULT, name.as_ptr()) };
    (!address.is_null()).then_some(address as *const u8)
}

#[cfg(not(unix))]
fn process_symbol(_name: &str) -> Option<*const u8> {
    None
}

type Export = (String, *const u8, Signature);

fn link_unit(module: &mut JITModule, unit: &CompilationUnit) -> Result<Vec<Export>, LinkFailure> {
    let func_ids = unit
        .symbols()
        .iter()
        .map(|symbol| module.declare_function(&symbol.name, linkage(symbol.linkage), &symbol.signature))
        .collect::<Result<Vec<FuncId>, _>>()?;

    let mut data_ids = Vec::with_capacity(unit.data_objects().len());
    for bytes in unit.data_objects() {
        let id = module.declare_anonymous_data(false, false)?;
        let mut description = DataDescription::new();
        description.define(bytes.clone());
        module.define_data(id, &description)?;
        data_ids.push(id);
    }

    for defined in unit.defined_functions() {
        let name = unit
            .symbol(defined.symbol)
            .map(|symbol| symbol.name.clone())
            .unwrap_or_default();
        let mut function = defined.function.clone();
        relocate_external_names(&name, &mut function, &func_ids, &data_ids)?;

        let id = func_ids
            .get(defined.symbol as usize)
            .copied()
            .ok_or_else(|| LinkFailure::DanglingReference {
                function: name.clone(),
                namespace: FUNC_NAMESPACE,
                index: defined.symbol,
            })?;
        let mut context = Context::for_function(function);
        module.define_function(id, &mut context)?;
    }

    module.finalize_definitions()?;

    Ok(unit
        .symbols()
        .iter()
        .zip(&func_ids)
        .filter(|(symbol, _)| symbol.linkage == SymbolLinkage::Export)
        .map(|(symbol, id)| {
            (
                symbol.name.clone(),
                module.get_finalized_function(*id),
                symbol.signature.clone(),
            )
        })
        .collect())
}

/// Rewrite unit-local external names to the identifiers `module` assigned.
fn relocate_external_names(
    name: &str,
    function: &mut Function,
    func_ids: &[FuncId],
    data_ids: &[DataId],
) -> Result<(), LinkFailure> {
    let references: Vec<_> = function
        .params
        .user_named_funcs()
        .iter()
        .map(|(reference, external)| (reference, external.clone()))
        .collect();

    for (reference, external) in references {
        let relocated = match external.namespace {
            FUNC_NAMESPACE => func_ids
                .get(external.index as usize)
                .map(|id| UserExternalName::new(FUNC_NAMESPACE, id.as_u32())),
            DATA_NAMESPACE => data_ids
                .get(external.index as usize)
                .map(|id| UserExternalName::new(DATA_NAMESPACE, id.as_u32())),
            _ => None,
        }
        .ok_or_else(|| LinkFailure::DanglingReference {
            function: name.to_string(),
            namespace: external.namespace,
            index: external.index,
        })?;
        function.params.reset_user_func_name(reference, relocated);
    }
    Ok(())
}

fn linkage(linkage: SymbolLinkage) -> Linkage {
    match linkage {
        SymbolLinkage::Local => Linkage::Local,
        SymbolLinkage::Export => Linkage::Export,
        SymbolLinkage::Import => Linkage::Import,
    }
}
