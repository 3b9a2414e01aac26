//! Code generation from the Mana syntax tree to Cranelift IR
//!
//! [`CodeGenerator`] owns a [`CompilationUnit`] and appends one function per
//! top-level declaration to it. Function bodies are lowered by a per-function
//! [`FunctionLowerer`], which implements both AST visitor traits: expression
//! visits return the lowered value together with its static type, statement
//! visits return nothing.
//!
//! Every declaration (parameter or `var`) gets its own explicit stack slot.
//! Names resolve through a lexical scope stack, so inner blocks may shadow
//! outer bindings.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;

use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::types::I64;
use cranelift_codegen::ir::{
    Block, FuncRef, Function, GlobalValue, InstBuilder, MemFlags, Signature, StackSlot,
    StackSlotData, StackSlotKind, Type, UserFuncName, Value,
};
use cranelift_codegen::settings;
use cranelift_codegen::verify_function;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use mana_ast::{
    self as ast, AssignExpression, BinaryExpression, BinaryOperator, CallExpression, ENTRY_POINT,
    Expr, ExprVisitor, FunctionDecl, IfStatement, Literal, PRINT_BUILTIN, ReturnStatement, Stmt,
    StmtVisitor, UnaryExpression, UnaryOperator, VarDecl, WhileStatement, is_reserved,
};
use tracing::{debug, trace, warn};

use crate::errors::{CodegenError, CodegenErrorKind, CodegenResult};
use crate::runtime::RuntimeFunctions;
use crate::scope::Scopes;
use crate::target::TargetInfo;
use crate::types::{ManaTypes, ValueType};
use crate::unit::{CompilationUnit, FUNC_NAMESPACE, SymbolLinkage, import_data, import_function};

#[derive(Clone, Debug)]
pub struct CodegenOptions {
    /// Wrap top-level statements in a generated `main` when the program does
    /// not define one. Disable for units that only provide functions to
    /// other units.
    pub synthesize_entry: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            synthesize_entry: true,
        }
    }
}

/// Code generator for Mana → Cranelift IR
pub struct CodeGenerator {
    unit: CompilationUnit,
    runtime: RuntimeFunctions,
    options: CodegenOptions,
    verifier_flags: settings::Flags,
}

impl CodeGenerator {
    /// Create a generator with an empty unit named `module_name`.
    pub fn initialize(module_name: &str, target: &TargetInfo) -> Self {
        Self::with_options(module_name, target, CodegenOptions::default())
    }

    pub fn with_options(module_name: &str, target: &TargetInfo, options: CodegenOptions) -> Self {
        let mut unit = CompilationUnit::new(module_name, target);
        let runtime = RuntimeFunctions::declare_all(&mut unit);
        debug!(module = module_name, %target, "initialized code generator");

        Self {
            unit,
            runtime,
            options,
            verifier_flags: settings::Flags::new(settings::builder()),
        }
    }

    /// Declare a function defined by another unit so that calls to it resolve.
    pub fn declare_external_function(&mut self, name: &str, arity: usize) -> CodegenResult<()> {
        self.check_new_function_name(name)?;
        let signature = ManaTypes::function_signature(self.unit.target(), arity);
        self.unit
            .declare_symbol(name, SymbolLinkage::Import, signature);
        Ok(())
    }

    /// Lower a whole program into the unit.
    ///
    /// Either every top-level definition is added, or, on error, the unit is
    /// left exactly as it was before the call.
    pub fn generate(&mut self, statements: &[Stmt]) -> CodegenResult<()> {
        let checkpoint = self.unit.checkpoint();
        let result = self.generate_program(statements);
        if let Err(error) = &result {
            warn!(module = self.unit.name(), %error, "code generation failed");
            self.unit.rollback(checkpoint);
        }
        result
    }

    pub fn dump_ir(&self) -> String {
        self.unit.display_ir()
    }

    pub fn unit(&self) -> &CompilationUnit {
        &self.unit
    }

    /// Hand the unit off, typically to an execution engine.
    pub fn into_unit(self) -> CompilationUnit {
        self.unit
    }

    fn generate_program(&mut self, statements: &[Stmt]) -> CodegenResult<()> {
        let mut functions = Vec::new();
        let mut script = Vec::new();
        for statement in statements {
            match statement {
                Stmt::Function(decl) => functions.push(decl),
                other => script.push(other),
            }
        }

        for statement in &script {
            check_no_nested_functions(statement)?;
        }

        let user_entry = functions.iter().find(|decl| decl.name == ENTRY_POINT);
        if let Some(entry) = user_entry {
            if !script.is_empty() {
                return Err(CodegenErrorKind::EntryConflict.into());
            }
            if !entry.parameters.is_empty() {
                return Err(CodegenErrorKind::InvalidEntryPoint.into());
            }
        } else if !self.options.synthesize_entry && !script.is_empty() {
            return Err(CodegenErrorKind::ScriptWithoutEntry.into());
        }

        // Declare everything first so that calls may refer to any function,
        // including ones defined later and the caller itself.
        for decl in &functions {
            self.check_function_decl(decl)?;
            let signature = ManaTypes::function_signature(self.unit.target(), decl.parameters.len());
            self.unit
                .declare_symbol(&decl.name, SymbolLinkage::Export, signature);
        }

        let synthesize_entry = user_entry.is_none() && self.options.synthesize_entry;
        if synthesize_entry {
            self.check_new_function_name(ENTRY_POINT)?;
            let signature = ManaTypes::function_signature(self.unit.target(), 0);
            self.unit
                .declare_symbol(ENTRY_POINT, SymbolLinkage::Export, signature);
        }

        for decl in &functions {
            self.lower_function(&decl.name, &decl.parameters, &decl.body)?;
        }
        if synthesize_entry {
            self.lower_function(ENTRY_POINT, &[], script.iter().copied())?;
        }

        debug!(
            module = self.unit.name(),
            functions = functions.len() + usize::from(synthesize_entry),
            "generated program"
        );
        Ok(())
    }

    fn check_new_function_name(&self, name: &str) -> CodegenResult<()> {
        if is_reserved(name) {
            return Err(CodegenErrorKind::ReservedIdentifier(name.to_string()).into());
        }
        if self.unit.symbol_index(name).is_some() {
            return Err(CodegenErrorKind::DuplicateFunction(name.to_string()).into());
        }
        Ok(())
    }

    fn check_function_decl(&self, decl: &FunctionDecl) -> CodegenResult<()> {
        self.check_new_function_name(&decl.name)?;

        let mut seen = HashSet::new();
        for parameter in &decl.parameters {
            if is_reserved(parameter) {
                return Err(CodegenErrorKind::ReservedIdentifier(parameter.clone()).into());
            }
            if !seen.insert(parameter.as_str()) {
                return Err(CodegenErrorKind::DuplicateParameter {
                    function: decl.name.clone(),
                    parameter: parameter.clone(),
                }
                .into());
            }
        }

        for statement in &decl.body {
            check_no_nested_functions(statement)?;
        }
        Ok(())
    }

    fn lower_function<'s>(
        &mut self,
        name: &str,
        parameters: &[String],
        body: impl IntoIterator<Item = &'s Stmt>,
    ) -> CodegenResult<()> {
        let symbol = self
            .unit
            .symbol_index(name)
            .ok_or_else(|| CodegenError::unresolved(name, name))?;
        let signature = self
            .unit
            .symbol(symbol)
            .map(|declared| declared.signature.clone())
            .ok_or_else(|| CodegenError::unresolved(name, name))?;

        let mut function =
            Function::with_name_signature(UserFuncName::user(FUNC_NAMESPACE, symbol), signature);
        let mut func_ctx = FunctionBuilderContext::new();
        let mut builder = FunctionBuilder::new(&mut function, &mut func_ctx);

        let entry_block = builder.create_block();
        builder.append_block_params_for_function_params(entry_block);
        builder.switch_to_block(entry_block);
        builder.seal_block(entry_block);
        let param_values = builder.block_params(entry_block).to_vec();

        let mut lowerer = FunctionLowerer::new(name, &mut builder, &mut self.unit, &self.runtime);
        for (parameter, value) in parameters.iter().zip(param_values) {
            lowerer.define_parameter(parameter, value);
        }
        lowerer.lower_statements(body)?;
        lowerer.finish();

        builder.seal_all_blocks();
        builder.finalize();

        verify_lowered(name, &function, &self.verifier_flags)?;
        trace!(function = name, ir = %function.display(), "lowered function");
        self.unit.define_function(symbol, function);
        Ok(())
    }
}

/// Lower `statements` into a fresh unit named `module_name`.
pub fn compile_program(
    module_name: &str,
    target: &TargetInfo,
    statements: &[Stmt],
) -> CodegenResult<CompilationUnit> {
    let mut generator = CodeGenerator::initialize(module_name, target);
    generator.generate(statements)?;
    Ok(generator.into_unit())
}

/// Run the Cranelift verifier over a finished function.
pub(crate) fn verify_lowered(
    name: &str,
    function: &Function,
    flags: &settings::Flags,
) -> CodegenResult<()> {
    verify_function(function, flags).map_err(|errors| CodegenError::malformed_function(name, errors))
}

fn check_no_nested_functions(statement: &Stmt) -> CodegenResult<()> {
    match statement {
        Stmt::Function(decl) => Err(CodegenErrorKind::NestedFunction {
            name: decl.name.clone(),
        }
        .into()),
        Stmt::Block(block) => block
            .statements
            .iter()
            .try_for_each(check_no_nested_functions),
        Stmt::If(stmt) => {
            check_no_nested_functions(&stmt.then_branch)?;
            match &stmt.else_branch {
                Some(else_branch) => check_no_nested_functions(else_branch),
                None => Ok(()),
            }
        }
        Stmt::While(stmt) => check_no_nested_functions(&stmt.body),
        Stmt::Expression(_) | Stmt::VarDecl(_) | Stmt::Return(_) => Ok(()),
    }
}

/// A lowered expression and its static type.
#[derive(Clone, Copy, Debug)]
struct Typed {
    value: Value,
    ty: ValueType,
}

impl Typed {
    fn new(value: Value, ty: ValueType) -> Self {
        Self { value, ty }
    }
}

/// A name visible in the current scope.
#[derive(Clone, Copy, Debug)]
struct Binding {
    slot: StackSlot,
    ty: ValueType,
    is_const: bool,
}

/// Per-function lowering context
struct FunctionLowerer<'a, 'b> {
    function_name: &'a str,
    builder: &'a mut FunctionBuilder<'b>,
    unit: &'a mut CompilationUnit,
    runtime: &'a RuntimeFunctions,
    pointer_type: Type,
    scopes: Scopes<Binding>,
    func_refs: HashMap<u32, FuncRef>,
    data_refs: HashMap<u32, GlobalValue>,
    /// The current block already ends in a return.
    terminated: bool,
}

impl<'a, 'b> FunctionLowerer<'a, 'b> {
    fn new(
        function_name: &'a str,
        builder: &'a mut FunctionBuilder<'b>,
        unit: &'a mut CompilationUnit,
        runtime: &'a RuntimeFunctions,
    ) -> Self {
        let pointer_type = unit.target().pointer_type();
        Self {
            function_name,
            builder,
            unit,
            runtime,
            pointer_type,
            scopes: Scopes::new(),
            func_refs: HashMap::new(),
            data_refs: HashMap::new(),
            terminated: false,
        }
    }

    fn define_parameter(&mut self, name: &str, value: Value) {
        let slot = self.create_slot();
        self.builder.ins().stack_store(value, slot, 0);
        self.scopes.declare(
            name,
            Binding {
                slot,
                ty: ValueType::Int,
                is_const: false,
            },
        );
    }

    /// Lower statements in order, stopping after the first one that ends the
    /// current block with a return.
    fn lower_statements<'s>(
        &mut self,
        statements: impl IntoIterator<Item = &'s Stmt>,
    ) -> CodegenResult<()> {
        let mut statements = statements.into_iter();
        for statement in statements.by_ref() {
            statement.accept(self)?;
            if self.terminated {
                break;
            }
        }

        let elided = statements.count();
        if elided > 0 {
            trace!(
                function = self.function_name,
                elided, "skipping unreachable statements"
            );
        }
        Ok(())
    }

    /// Lower `statement` inside its own scope frame.
    fn lower_scoped(&mut self, statement: &Stmt) -> CodegenResult<()> {
        if statement.is_block() {
            // Blocks open their own frame.
            return statement.accept(self);
        }
        self.scopes.push();
        let result = statement.accept(self);
        self.scopes.pop();
        result
    }

    /// Close the function with `return 0` if control can reach its end.
    fn finish(self) {
        if !self.terminated {
            let zero = self.builder.ins().iconst(ManaTypes::int_type(), 0);
            self.builder.ins().return_(&[zero]);
        }
    }

    fn switch_to(&mut self, block: Block) {
        self.builder.switch_to_block(block);
        self.terminated = false;
    }

    fn jump_if_open(&mut self, target: Block) {
        if !self.terminated {
            self.builder.ins().jump(target, &[]);
        }
    }

    fn create_slot(&mut self) -> StackSlot {
        self.builder.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            ManaTypes::SLOT_SIZE,
            ManaTypes::SLOT_ALIGN_SHIFT,
        ))
    }

    fn int_const(&mut self, value: i32) -> Value {
        // Narrow immediates are stored zero-extended.
        self.builder
            .ins()
            .iconst(ManaTypes::int_type(), i64::from(value as u32))
    }

    fn nil_value(&mut self) -> Value {
        self.builder.ins().iconst(self.pointer_type, 0)
    }

    fn string_address(&mut self, text: &str) -> Value {
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(0);

        let data = self.unit.intern_data(&bytes);
        let global = match self.data_refs.get(&data) {
            Some(global) => *global,
            None => {
                let global = import_data(self.builder, data);
                self.data_refs.insert(data, global);
                global
            }
        };
        self.builder.ins().symbol_value(self.pointer_type, global)
    }

    fn function_ref(&mut self, symbol: u32, signature: &Signature) -> FuncRef {
        if let Some(func_ref) = self.func_refs.get(&symbol) {
            return *func_ref;
        }
        let func_ref = import_function(self.builder, symbol, signature);
        self.func_refs.insert(symbol, func_ref);
        func_ref
    }

    fn lookup(&self, name: &str) -> CodegenResult<Binding> {
        self.scopes
            .lookup(name)
            .copied()
            .ok_or_else(|| CodegenError::unresolved(name, self.function_name))
    }

    fn expect(&self, typed: Typed, expected: ValueType, context: impl Display) -> CodegenResult<Value> {
        if typed.ty == expected {
            Ok(typed.value)
        } else {
            Err(CodegenError::type_mismatch(
                self.function_name,
                context,
                expected,
                typed.ty,
            ))
        }
    }

    /// Convert an `int` operand paired with a `float` one to `float`.
    fn promote(&mut self, left: Typed, right: Typed) -> (Typed, Typed) {
        match (left.ty, right.ty) {
            (ValueType::Int, ValueType::Float) => (self.int_to_float(left), right),
            (ValueType::Float, ValueType::Int) => (left, self.int_to_float(right)),
            _ => (left, right),
        }
    }

    fn int_to_float(&mut self, typed: Typed) -> Typed {
        let value = self
            .builder
            .ins()
            .fcvt_from_sint(ManaTypes::float_type(), typed.value);
        Typed::new(value, ValueType::Float)
    }

    /// Integer `/` and `%` never trap: a zero divisor yields 0 and
    /// `i32::MIN / -1` wraps.
    fn lower_int_division(&mut self, operator: BinaryOperator, left: Value, right: Value) -> Value {
        let zero = self.int_const(0);
        let one = self.int_const(1);
        let minus_one = self.int_const(-1);

        let by_zero = self.builder.ins().icmp(IntCC::Equal, right, zero);
        let by_minus_one = self.builder.ins().icmp(IntCC::Equal, right, minus_one);
        let special = self.builder.ins().bor(by_zero, by_minus_one);
        let divisor = self.builder.ins().select(special, one, right);

        if operator == BinaryOperator::Remainder {
            // Both special divisors leave a remainder of 0, as does 1.
            return self.builder.ins().srem(left, divisor);
        }
        let quotient = self.builder.ins().sdiv(left, divisor);
        let negated = self.builder.ins().ineg(left);
        let quotient = self.builder.ins().select(by_minus_one, negated, quotient);
        self.builder.ins().select(by_zero, zero, quotient)
    }

    fn lower_condition(&mut self, condition: &Expr, context: &str) -> CodegenResult<Value> {
        let typed = condition.accept(self)?;
        self.expect(typed, ValueType::Bool, context)
    }

    fn lower_print(&mut self, argument: Typed) -> CodegenResult<Typed> {
        let value = argument.value;
        let payload = match argument.ty {
            ValueType::Int => self.builder.ins().sextend(I64, value),
            ValueType::Float => self.builder.ins().bitcast(I64, MemFlags::new(), value),
            ValueType::Bool => self.builder.ins().uextend(I64, value),
            ValueType::Str if self.pointer_type == I64 => value,
            ValueType::Str => self.builder.ins().uextend(I64, value),
            ValueType::Nil => self.builder.ins().iconst(I64, 0),
        };
        let tag = self
            .builder
            .ins()
            .iconst(ManaTypes::tag_type(), i64::from(argument.ty.tag().as_raw()));

        let signature = self
            .unit
            .symbol(self.runtime.print)
            .map(|symbol| symbol.signature.clone())
            .ok_or_else(|| CodegenError::unresolved(PRINT_BUILTIN, self.function_name))?;
        let print = self.function_ref(self.runtime.print, &signature);
        self.builder.ins().call(print, &[tag, payload]);

        let nil = self.nil_value();
        Ok(Typed::new(nil, ValueType::Nil))
    }
}

fn int_cc(operator: BinaryOperator, signed: bool) -> Option<IntCC> {
    Some(match (operator, signed) {
        (BinaryOperator::Equal, _) => IntCC::Equal,
        (BinaryOperator::NotEqual, _) => IntCC::NotEqual,
        (BinaryOperator::Less, true) => IntCC::SignedLessThan,
        (BinaryOperator::Less, false) => IntCC::UnsignedLessThan,
        (BinaryOperator::LessEqual, true) => IntCC::SignedLessThanOrEqual,
        (BinaryOperator::LessEqual, false) => IntCC::UnsignedLessThanOrEqual,
        (BinaryOperator::Greater, true) => IntCC::SignedGreaterThan,
        (BinaryOperator::Greater, false) => IntCC::UnsignedGreaterThan,
        (BinaryOperator::GreaterEqual, true) => IntCC::SignedGreaterThanOrEqual,
        (BinaryOperator::GreaterEqual, false) => IntCC::UnsignedGreaterThanOrEqual,
        _ => return None,
    })
}

fn float_cc(operator: BinaryOperator) -> Option<FloatCC> {
    Some(match operator {
        BinaryOperator::Equal => FloatCC::Equal,
        BinaryOperator::NotEqual => FloatCC::NotEqual,
        BinaryOperator::Less => FloatCC::LessThan,
        BinaryOperator::LessEqual => FloatCC::LessThanOrEqual,
        BinaryOperator::Greater => FloatCC::GreaterThan,
        BinaryOperator::GreaterEqual => FloatCC::GreaterThanOrEqual,
        _ => return None,
    })
}

/// Operand types accepted by a binary operator, for error messages.
fn operand_expectation(operator: BinaryOperator) -> &'static str {
    match operator {
        BinaryOperator::Remainder => "int operands",
        BinaryOperator::And | BinaryOperator::Or => "bool operands",
        op if op.is_comparison() => "int, float or bool operands",
        _ => "int or float operands",
    }
}

impl ExprVisitor for FunctionLowerer<'_, '_> {
    type Output = CodegenResult<Typed>;

    fn visit_literal(&mut self, literal: &Literal) -> Self::Output {
        Ok(match literal {
            Literal::Int(value) => Typed::new(self.int_const(*value), ValueType::Int),
            Literal::Float(value) => Typed::new(self.builder.ins().f64const(*value), ValueType::Float),
            Literal::Bool(value) => Typed::new(
                self.builder
                    .ins()
                    .iconst(ManaTypes::bool_type(), i64::from(*value)),
                ValueType::Bool,
            ),
            Literal::Str(text) => Typed::new(self.string_address(text), ValueType::Str),
            Literal::Nil => Typed::new(self.nil_value(), ValueType::Nil),
        })
    }

    fn visit_unary(&mut self, expr: &UnaryExpression) -> Self::Output {
        let operand = expr.operand.accept(self)?;
        let value = operand.value;
        let result = match (expr.operator, operand.ty) {
            (UnaryOperator::Negate, ValueType::Int) => self.builder.ins().ineg(value),
            (UnaryOperator::Negate, ValueType::Float) => self.builder.ins().fneg(value),
            (UnaryOperator::Not, ValueType::Bool) => {
                self.builder.ins().icmp_imm(IntCC::Equal, value, 0)
            }
            (operator, found) => {
                let expected = match operator {
                    UnaryOperator::Negate => "an int or float operand",
                    UnaryOperator::Not => "a bool operand",
                };
                return Err(CodegenError::type_mismatch(
                    self.function_name,
                    format!("operator `{operator}`"),
                    expected,
                    found,
                ));
            }
        };
        Ok(Typed::new(result, operand.ty))
    }

    fn visit_binary(&mut self, expr: &BinaryExpression) -> Self::Output {
        // Both operands are always evaluated, left first; `&&` and `||` do
        // not short-circuit.
        let left = expr.left.accept(self)?;
        let right = expr.right.accept(self)?;
        let operator = expr.operator;
        let (left, right) = self.promote(left, right);

        if left.ty != right.ty {
            return Err(CodegenError::type_mismatch(
                self.function_name,
                format!("right operand of `{operator}`"),
                left.ty,
                right.ty,
            ));
        }

        let (l, r) = (left.value, right.value);
        if left.ty == ValueType::Int
            && matches!(operator, BinaryOperator::Divide | BinaryOperator::Remainder)
        {
            let value = self.lower_int_division(operator, l, r);
            return Ok(Typed::new(value, ValueType::Int));
        }

        let ins = self.builder.ins();
        let lowered = match (operator, left.ty) {
            (BinaryOperator::Add, ValueType::Int) => Some((ins.iadd(l, r), ValueType::Int)),
            (BinaryOperator::Subtract, ValueType::Int) => Some((ins.isub(l, r), ValueType::Int)),
            (BinaryOperator::Multiply, ValueType::Int) => Some((ins.imul(l, r), ValueType::Int)),
            (BinaryOperator::Add, ValueType::Float) => Some((ins.fadd(l, r), ValueType::Float)),
            (BinaryOperator::Subtract, ValueType::Float) => {
                Some((ins.fsub(l, r), ValueType::Float))
            }
            (BinaryOperator::Multiply, ValueType::Float) => {
                Some((ins.fmul(l, r), ValueType::Float))
            }
            (BinaryOperator::Divide, ValueType::Float) => Some((ins.fdiv(l, r), ValueType::Float)),
            (BinaryOperator::And, ValueType::Bool) => Some((ins.band(l, r), ValueType::Bool)),
            (BinaryOperator::Or, ValueType::Bool) => Some((ins.bor(l, r), ValueType::Bool)),
            (op, ValueType::Int) => {
                int_cc(op, true).map(|cc| (ins.icmp(cc, l, r), ValueType::Bool))
            }
            (op, ValueType::Bool) => {
                int_cc(op, false).map(|cc| (ins.icmp(cc, l, r), ValueType::Bool))
            }
            (op, ValueType::Float) => {
                float_cc(op).map(|cc| (ins.fcmp(cc, l, r), ValueType::Bool))
            }
            (_, ValueType::Str | ValueType::Nil) => None,
        };

        match lowered {
            Some((value, ty)) => Ok(Typed::new(value, ty)),
            None => Err(CodegenError::type_mismatch(
                self.function_name,
                format!("operator `{operator}`"),
                operand_expectation(operator),
                left.ty,
            )),
        }
    }

    fn visit_grouping(&mut self, inner: &Expr) -> Self::Output {
        inner.accept(self)
    }

    fn visit_variable(&mut self, name: &str) -> Self::Output {
        let binding = self.lookup(name)?;
        let ty = binding.ty.clif_type(self.unit.target());
        let value = self.builder.ins().stack_load(ty, binding.slot, 0);
        Ok(Typed::new(value, binding.ty))
    }

    fn visit_assign(&mut self, expr: &AssignExpression) -> Self::Output {
        let assigned = expr.value.accept(self)?;
        let binding = self.lookup(&expr.name)?;
        if binding.is_const {
            return Err(CodegenErrorKind::AssignToConstant {
                name: expr.name.clone(),
                function: self.function_name.to_string(),
            }
            .into());
        }

        let value = self.expect(
            assigned,
            binding.ty,
            format!("assignment to `{}`", expr.name),
        )?;
        self.builder.ins().stack_store(value, binding.slot, 0);
        Ok(Typed::new(value, binding.ty))
    }

    fn visit_call(&mut self, expr: &CallExpression) -> Self::Output {
        let Some(callee) = expr.callee_name() else {
            return Err(CodegenErrorKind::UnsupportedCallee(self.function_name.to_string()).into());
        };

        if callee == PRINT_BUILTIN {
            let [argument] = expr.arguments.as_slice() else {
                return Err(CodegenErrorKind::ArityMismatch {
                    callee: callee.to_string(),
                    expected: 1,
                    found: expr.arguments.len(),
                }
                .into());
            };
            let argument = argument.accept(self)?;
            return self.lower_print(argument);
        }

        let runtime = *self.runtime;
        let symbol = self
            .unit
            .symbol_index(callee)
            .filter(|&index| index != runtime.host_print && index != runtime.print)
            .ok_or_else(|| CodegenError::unresolved(callee, self.function_name))?;
        let signature = self
            .unit
            .symbol(symbol)
            .map(|declared| declared.signature.clone())
            .ok_or_else(|| CodegenError::unresolved(callee, self.function_name))?;

        if signature.params.len() != expr.arguments.len() {
            return Err(CodegenErrorKind::ArityMismatch {
                callee: callee.to_string(),
                expected: signature.params.len(),
                found: expr.arguments.len(),
            }
            .into());
        }

        let mut arguments = Vec::with_capacity(expr.arguments.len());
        for (position, argument) in expr.arguments.iter().enumerate() {
            let typed = argument.accept(self)?;
            arguments.push(self.expect(
                typed,
                ValueType::Int,
                format!("argument {} of `{callee}`", position + 1),
            )?);
        }

        let func_ref = self.function_ref(symbol, &signature);
        let call = self.builder.ins().call(func_ref, &arguments);
        let result = self.builder.inst_results(call)[0];
        Ok(Typed::new(result, ValueType::Int))
    }
}

impl StmtVisitor for FunctionLowerer<'_, '_> {
    type Output = CodegenResult<()>;

    fn visit_expression_stmt(&mut self, expr: &Expr) -> Self::Output {
        expr.accept(self)?;
        Ok(())
    }

    fn visit_var_decl(&mut self, decl: &VarDecl) -> Self::Output {
        if is_reserved(&decl.name) {
            return Err(CodegenErrorKind::ReservedIdentifier(decl.name.clone()).into());
        }

        // The initializer is evaluated before the new name is visible.
        let initial = match &decl.initializer {
            Some(initializer) => initializer.accept(self)?,
            None => Typed::new(self.int_const(0), ValueType::Int),
        };

        let slot = self.create_slot();
        self.builder.ins().stack_store(initial.value, slot, 0);
        self.scopes.declare(
            &decl.name,
            Binding {
                slot,
                ty: initial.ty,
                is_const: decl.is_const,
            },
        );
        Ok(())
    }

    fn visit_block(&mut self, block: &ast::Block) -> Self::Output {
        self.scopes.push();
        let result = self.lower_statements(&block.statements);
        self.scopes.pop();
        result
    }

    fn visit_if(&mut self, stmt: &IfStatement) -> Self::Output {
        let condition = self.lower_condition(&stmt.condition, "if condition")?;

        let then_block = self.builder.create_block();
        let merge_block = self.builder.create_block();
        let else_block = stmt
            .else_branch
            .as_ref()
            .map(|_| self.builder.create_block());

        self.builder.ins().brif(
            condition,
            then_block,
            &[],
            else_block.unwrap_or(merge_block),
            &[],
        );

        self.switch_to(then_block);
        self.lower_scoped(&stmt.then_branch)?;
        self.jump_if_open(merge_block);

        if let (Some(else_block), Some(else_branch)) = (else_block, &stmt.else_branch) {
            self.switch_to(else_block);
            self.lower_scoped(else_branch)?;
            self.jump_if_open(merge_block);
        }

        self.switch_to(merge_block);
        Ok(())
    }

    fn visit_while(&mut self, stmt: &WhileStatement) -> Self::Output {
        let header_block = self.builder.create_block();
        let body_block = self.builder.create_block();
        let exit_block = self.builder.create_block();

        self.builder.ins().jump(header_block, &[]);

        self.switch_to(header_block);
        let condition = self.lower_condition(&stmt.condition, "while condition")?;
        self.builder
            .ins()
            .brif(condition, body_block, &[], exit_block, &[]);

        self.switch_to(body_block);
        self.lower_scoped(&stmt.body)?;
        self.jump_if_open(header_block);

        self.switch_to(exit_block);
        Ok(())
    }

    fn visit_function(&mut self, decl: &FunctionDecl) -> Self::Output {
        Err(CodegenErrorKind::NestedFunction {
            name: decl.name.clone(),
        }
        .into())
    }

    fn visit_return(&mut self, stmt: &ReturnStatement) -> Self::Output {
        let value = match &stmt.value {
            Some(value) => {
                let typed = value.accept(self)?;
                self.expect(typed, ValueType::Int, "return value")?
            }
            None => self.int_const(0),
        };
        self.builder.ins().return_(&[value]);
        self.terminated = true;
        Ok(())
    }
}
