//! Rust source emitter.
//!
//! Expressions render to strings through [`ExprVisitor`]; statements append
//! indented lines to the output buffer through [`StmtVisitor`]. The emitter
//! tracks the static kind of every variable so that an `int` operand next to
//! a `float` one is converted, and integer `/` and `%` go through the
//! non-trapping runtime helpers.
//!
//! # Example output
//!
//! ```text
//! fn __mana_main() -> i32 {
//!     let mut x = 1;
//!     while (x < 3) {
//!         __mana_rt::print("x");
//!         x = (x + 1);
//!     }
//!     0
//! }
//! ```

use std::collections::HashMap;
use std::fmt;

use mana_ast::{
    AssignExpression, BinaryExpression, BinaryOperator, Block, CallExpression, ENTRY_POINT, Expr,
    ExprVisitor, FunctionDecl, IfStatement, Literal, PRINT_BUILTIN, ReturnStatement, Stmt,
    StmtVisitor, UnaryExpression, UnaryOperator, VarDecl, WhileStatement,
};
use tracing::debug;

use crate::names::{function_name, local_name};

const INDENT: &str = "    ";

/// Path of the runtime module inside the generated file.
const RUNTIME: &str = "__mana_rt";

/// Holds top-level statements when the program defines its own `main`.
const SCRIPT_FUNCTION: &str = "__mana_script";

/// Everything the generated file contains before the first function.
pub(crate) const PRELUDE: &str = r#"// Generated by mana-transpile. Do not edit.
#![allow(
    arithmetic_overflow,
    dead_code,
    non_snake_case,
    path_statements,
    unreachable_code,
    unused_assignments,
    unused_braces,
    unused_must_use,
    unused_mut,
    unused_parens,
    unused_variables,
    while_true
)]

mod __mana_rt {
    use std::fmt;

    #[derive(Clone, Copy, Debug)]
    pub struct Nil;

    impl fmt::Display for Nil {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("nil")
        }
    }

    pub fn print(value: impl fmt::Display) -> Nil {
        println!("{value}");
        Nil
    }

    pub fn div(left: i32, right: i32) -> i32 {
        if right == 0 { 0 } else { left.wrapping_div(right) }
    }

    pub fn rem(left: i32, right: i32) -> i32 {
        if right == 0 { 0 } else { left.wrapping_rem(right) }
    }
}
"#;

/// Translate a Mana program into a complete Rust source file.
///
/// Every user function becomes an `fn(i32, ...) -> i32` item. Top-level
/// statements are collected into the program's entry function, and a host
/// `fn main` exits with whatever that entry function returns.
pub fn transpile(statements: &[Stmt]) -> String {
    let mut emitter = RustEmitter::new();
    emitter.emit_program(statements);
    emitter.finish()
}

/// Static kind of a rendered expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Int,
    Float,
    Bool,
    Str,
    Nil,
}

/// A rendered expression and its kind, when known.
struct Rendered {
    text: String,
    kind: Option<Kind>,
}

impl Rendered {
    fn new(text: impl Into<String>, kind: Option<Kind>) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    /// The expression as an `f64` operand.
    fn into_float(self) -> String {
        match self.kind {
            Some(Kind::Int) => format!("({} as f64)", self.text),
            _ => self.text,
        }
    }
}

impl fmt::Display for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

struct RustEmitter {
    output: String,
    /// Current nesting depth, in units of [`INDENT`].
    indent: usize,
    /// Kinds of the visible variables, innermost scope last.
    scopes: Vec<HashMap<String, Option<Kind>>>,
}

impl RustEmitter {
    fn new() -> Self {
        Self {
            output: String::new(),
            indent: 0,
            scopes: Vec::new(),
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str, kind: Option<Kind>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), kind);
        }
    }

    fn kind_of(&self, name: &str) -> Option<Kind> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .copied()
            .flatten()
    }

    fn finish(self) -> String {
        self.output
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.output.push_str(INDENT);
        }
        self.output.push_str(text);
        self.output.push('\n');
    }

    fn emit_program(&mut self, statements: &[Stmt]) {
        self.output.push_str(PRELUDE);

        let mut functions = Vec::new();
        let mut script = Vec::new();
        for statement in statements {
            match statement {
                Stmt::Function(decl) => functions.push(decl),
                other => script.push(other),
            }
        }

        for decl in &functions {
            self.output.push('\n');
            self.emit_function(&function_name(&decl.name), &decl.parameters, &decl.body);
        }

        let has_entry = functions.iter().any(|decl| decl.name == ENTRY_POINT);
        if !has_entry || !script.is_empty() {
            let name = if has_entry {
                SCRIPT_FUNCTION.to_string()
            } else {
                function_name(ENTRY_POINT)
            };
            self.output.push('\n');
            self.emit_function(&name, &[], script.iter().copied());
        }

        self.output.push('\n');
        self.line("fn main() {");
        self.indent += 1;
        self.line(&format!(
            "::std::process::exit({}());",
            function_name(ENTRY_POINT)
        ));
        self.indent -= 1;
        self.line("}");

        debug!(
            functions = functions.len(),
            script = script.len(),
            "transpiled program"
        );
    }

    fn emit_function<'s>(
        &mut self,
        name: &str,
        parameters: &[String],
        body: impl IntoIterator<Item = &'s Stmt>,
    ) {
        let parameter_list = parameters
            .iter()
            .map(|parameter| format!("mut {}: i32", local_name(parameter)))
            .collect::<Vec<_>>()
            .join(", ");
        self.line(&format!("fn {name}({parameter_list}) -> i32 {{"));
        self.indent += 1;
        self.push_scope();
        for parameter in parameters {
            self.declare(parameter, Some(Kind::Int));
        }
        if !self.emit_statements(body) {
            self.line("0");
        }
        self.pop_scope();
        self.indent -= 1;
        self.line("}");
    }

    /// Emit statements up to and including the first diverging one. Returns
    /// whether that statement was reached.
    fn emit_statements<'s>(&mut self, statements: impl IntoIterator<Item = &'s Stmt>) -> bool {
        for statement in statements {
            statement.accept(self);
            if statement.diverges() {
                return true;
            }
        }
        false
    }

    /// Emit a branch or loop body. A block is inlined into the enclosing
    /// braces; any other statement becomes the braces' only content.
    fn emit_body(&mut self, body: &Stmt) {
        self.indent += 1;
        self.push_scope();
        match body {
            Stmt::Block(block) => {
                self.emit_statements(&block.statements);
            }
            other => other.accept(self),
        }
        self.pop_scope();
        self.indent -= 1;
    }

    fn emit_if(&mut self, keyword: &str, stmt: &IfStatement) {
        let condition = stmt.condition.accept(self);
        self.line(&format!("{keyword} {condition} {{"));
        self.emit_body(&stmt.then_branch);

        match stmt.else_branch.as_deref() {
            Some(Stmt::If(nested)) => self.emit_if("} else if", nested),
            Some(else_branch) => {
                self.line("} else {");
                self.emit_body(else_branch);
                self.line("}");
            }
            None => self.line("}"),
        }
    }

    fn render_arguments(&mut self, arguments: &[Expr]) -> String {
        arguments
            .iter()
            .map(|argument| argument.accept(self).text)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn render_float(value: f64) -> String {
    if value.is_nan() {
        "f64::NAN".to_string()
    } else if value.is_infinite() {
        let constant = if value > 0.0 { "f64::INFINITY" } else { "f64::NEG_INFINITY" };
        constant.to_string()
    } else if value.is_sign_negative() {
        format!("({value:?})")
    } else {
        format!("{value:?}")
    }
}

fn render_int(value: i32) -> String {
    match value {
        i32::MIN => "i32::MIN".to_string(),
        v if v < 0 => format!("({v})"),
        v => v.to_string(),
    }
}

fn binary_symbol(operator: BinaryOperator) -> String {
    match operator {
        // Both operands are evaluated, as in the JIT backend.
        BinaryOperator::And => "&".to_string(),
        BinaryOperator::Or => "|".to_string(),
        other => other.to_string(),
    }
}

impl ExprVisitor for RustEmitter {
    type Output = Rendered;

    fn visit_literal(&mut self, literal: &Literal) -> Rendered {
        match literal {
            Literal::Int(value) => Rendered::new(render_int(*value), Some(Kind::Int)),
            Literal::Float(value) => Rendered::new(render_float(*value), Some(Kind::Float)),
            Literal::Bool(value) => Rendered::new(value.to_string(), Some(Kind::Bool)),
            Literal::Str(text) => Rendered::new(format!("{text:?}"), Some(Kind::Str)),
            Literal::Nil => Rendered::new(format!("{RUNTIME}::Nil"), Some(Kind::Nil)),
        }
    }

    fn visit_unary(&mut self, expr: &UnaryExpression) -> Rendered {
        let operand = expr.operand.accept(self);
        let (operator, kind) = match expr.operator {
            UnaryOperator::Negate => ("-", operand.kind),
            UnaryOperator::Not => ("!", Some(Kind::Bool)),
        };
        Rendered::new(format!("({operator}{operand})"), kind)
    }

    fn visit_binary(&mut self, expr: &BinaryExpression) -> Rendered {
        let left = expr.left.accept(self);
        let right = expr.right.accept(self);
        let operator = expr.operator;

        let mixed = matches!(
            (left.kind, right.kind),
            (Some(Kind::Int), Some(Kind::Float)) | (Some(Kind::Float), Some(Kind::Int))
        );
        let operands = if mixed { Some(Kind::Float) } else { left.kind };
        let (left, right) = if mixed {
            (left.into_float(), right.into_float())
        } else {
            (left.text, right.text)
        };

        match operator {
            BinaryOperator::Divide if operands == Some(Kind::Int) => {
                Rendered::new(format!("{RUNTIME}::div({left}, {right})"), Some(Kind::Int))
            }
            BinaryOperator::Remainder => {
                Rendered::new(format!("{RUNTIME}::rem({left}, {right})"), Some(Kind::Int))
            }
            _ => {
                let kind = if operator.is_comparison()
                    || matches!(operator, BinaryOperator::And | BinaryOperator::Or)
                {
                    Some(Kind::Bool)
                } else {
                    operands
                };
                Rendered::new(format!("({left} {} {right})", binary_symbol(operator)), kind)
            }
        }
    }

    fn visit_grouping(&mut self, inner: &Expr) -> Rendered {
        let inner = inner.accept(self);
        Rendered::new(format!("({inner})"), inner.kind)
    }

    fn visit_variable(&mut self, name: &str) -> Rendered {
        Rendered::new(local_name(name), self.kind_of(name))
    }

    fn visit_assign(&mut self, expr: &AssignExpression) -> Rendered {
        let name = local_name(&expr.name);
        let value = expr.value.accept(self);
        Rendered::new(format!("{{ {name} = {value}; {name} }}"), value.kind)
    }

    fn visit_call(&mut self, expr: &CallExpression) -> Rendered {
        let arguments = self.render_arguments(&expr.arguments);
        match expr.callee_name() {
            Some(PRINT_BUILTIN) => {
                Rendered::new(format!("{RUNTIME}::print({arguments})"), Some(Kind::Nil))
            }
            Some(name) => {
                let text = format!("{}({arguments})", function_name(name));
                Rendered::new(text, Some(Kind::Int))
            }
            None => {
                let callee = expr.callee.accept(self);
                Rendered::new(format!("({callee})({arguments})"), None)
            }
        }
    }
}

impl StmtVisitor for RustEmitter {
    type Output = ();

    fn visit_expression_stmt(&mut self, expr: &Expr) {
        let text = match expr {
            Expr::Assign(assign) => {
                format!("{} = {};", local_name(&assign.name), assign.value.accept(self))
            }
            other => format!("{};", other.accept(self)),
        };
        self.line(&text);
    }

    fn visit_var_decl(&mut self, decl: &VarDecl) {
        let name = local_name(&decl.name);
        let binding = if decl.is_const {
            name
        } else {
            format!("mut {name}")
        };
        let (text, kind) = match &decl.initializer {
            Some(initializer) => {
                let value = initializer.accept(self);
                (format!("let {binding} = {value};"), value.kind)
            }
            None => (format!("let {binding}: i32 = 0;"), Some(Kind::Int)),
        };
        self.declare(&decl.name, kind);
        self.line(&text);
    }

    fn visit_block(&mut self, block: &Block) {
        self.line("{");
        self.indent += 1;
        self.push_scope();
        self.emit_statements(&block.statements);
        self.pop_scope();
        self.indent -= 1;
        self.line("}");
    }

    fn visit_if(&mut self, stmt: &IfStatement) {
        self.emit_if("if", stmt);
    }

    fn visit_while(&mut self, stmt: &WhileStatement) {
        let condition = stmt.condition.accept(self);
        self.line(&format!("while {condition} {{"));
        self.emit_body(&stmt.body);
        self.line("}");
    }

    fn visit_function(&mut self, decl: &FunctionDecl) {
        self.emit_function(&function_name(&decl.name), &decl.parameters, &decl.body);
    }

    fn visit_return(&mut self, stmt: &ReturnStatement) {
        let value = match &stmt.value {
            Some(value) => value.accept(self).text,
            None => "0".to_string(),
        };
        self.line(&format!("return {value};"));
    }
}
