//! Visitor contract implemented by every backend.
//!
//! Each `visit_*` method returns the backend's own `Output`. Code generation
//! returns one typed IR value per expression; the transpiler returns rendered
//! text. Traversal order is fixed by the backends themselves: statements in
//! source order, binary operands and call arguments left to right.

use crate::ast::*;

pub trait ExprVisitor {
    type Output;

    fn visit_literal(&mut self, literal: &Literal) -> Self::Output;
    fn visit_unary(&mut self, expr: &UnaryExpression) -> Self::Output;
    fn visit_binary(&mut self, expr: &BinaryExpression) -> Self::Output;
    fn visit_grouping(&mut self, inner: &Expr) -> Self::Output;
    fn visit_variable(&mut self, name: &str) -> Self::Output;
    fn visit_assign(&mut self, expr: &AssignExpression) -> Self::Output;
    fn visit_call(&mut self, expr: &CallExpression) -> Self::Output;
}

pub trait StmtVisitor {
    type Output;

    fn visit_expression_stmt(&mut self, expr: &Expr) -> Self::Output;
    fn visit_var_decl(&mut self, decl: &VarDecl) -> Self::Output;
    fn visit_block(&mut self, block: &Block) -> Self::Output;
    fn visit_if(&mut self, stmt: &IfStatement) -> Self::Output;
    fn visit_while(&mut self, stmt: &WhileStatement) -> Self::Output;
    fn visit_function(&mut self, decl: &FunctionDecl) -> Self::Output;
    fn visit_return(&mut self, stmt: &ReturnStatement) -> Self::Output;
}

impl Expr {
    pub fn accept<V: ExprVisitor + ?Sized>(&self, visitor: &mut V) -> V::Output {
        match self {
            Expr::Literal(literal) => visitor.visit_literal(literal),
            Expr::Unary(expr) => visitor.visit_unary(expr),
            Expr::Binary(expr) => visitor.visit_binary(expr),
            Expr::Grouping(inner) => visitor.visit_grouping(inner),
            Expr::Variable(name) => visitor.visit_variable(name),
            Expr::Assign(expr) => visitor.visit_assign(expr),
            Expr::Call(expr) => visitor.visit_call(expr),
        }
    }
}

impl Stmt {
    pub fn accept<V: StmtVisitor + ?Sized>(&self, visitor: &mut V) -> V::Output {
        match self {
            Stmt::Expression(expr) => visitor.visit_expression_stmt(expr),
            Stmt::VarDecl(decl) => visitor.visit_var_decl(decl),
            Stmt::Block(block) => visitor.visit_block(block),
            Stmt::If(stmt) => visitor.visit_if(stmt),
            Stmt::While(stmt) => visitor.visit_while(stmt),
            Stmt::Function(decl) => visitor.visit_function(decl),
            Stmt::Return(stmt) => visitor.visit_return(stmt),
        }
    }
}
