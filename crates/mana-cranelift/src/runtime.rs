//! Runtime function declarations
//!
//! Every unit imports the host's `mana_print` symbol and defines a local
//! `print` function forwarding to it. Calls to the `print` builtin in user
//! code target the local function.

use cranelift_codegen::ir::{Function, InstBuilder, UserFuncName};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use mana_ast::PRINT_BUILTIN;
use mana_runtime::PRINT_SYMBOL;

use crate::types::ManaTypes;
use crate::unit::{CompilationUnit, FUNC_NAMESPACE, SymbolLinkage, import_function};

/// Unit symbol indices of the runtime functions
#[derive(Clone, Copy, Debug)]
pub struct RuntimeFunctions {
    /// Host `mana_print(tag, payload)`
    pub host_print: u32,
    /// Local `print(tag, payload)` builtin
    pub print: u32,
}

impl RuntimeFunctions {
    /// Declare all runtime functions in the unit and define the builtins.
    pub fn declare_all(unit: &mut CompilationUnit) -> Self {
        let signature = ManaTypes::print_signature(unit.target());

        let host_print = unit.declare_symbol(PRINT_SYMBOL, SymbolLinkage::Import, signature.clone());
        let print = unit.declare_symbol(PRINT_BUILTIN, SymbolLinkage::Local, signature.clone());

        let mut function =
            Function::with_name_signature(UserFuncName::user(FUNC_NAMESPACE, print), signature.clone());
        let mut func_ctx = FunctionBuilderContext::new();
        let mut builder = FunctionBuilder::new(&mut function, &mut func_ctx);

        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        builder.seal_block(entry);

        let arguments = builder.block_params(entry).to_vec();
        let callee = import_function(&mut builder, host_print, &signature);
        builder.ins().call(callee, &arguments);
        builder.ins().return_(&[]);
        builder.finalize();

        unit.define_function(print, function);

        RuntimeFunctions { host_print, print }
    }
}
