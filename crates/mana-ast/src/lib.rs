//! Abstract syntax tree for Mana programs.
//!
//! The tree is produced by a front end and only ever borrowed by the
//! backends in `mana-cranelift` and `mana-transpile`.

pub mod ast;
pub mod visit;

pub use ast::*;
pub use visit::{ExprVisitor, StmtVisitor};

#[cfg(test)]
mod tests {
    use super::*;

    /// Records the order in which expression nodes are visited.
    struct Trace(Vec<String>);

    impl ExprVisitor for Trace {
        type Output = ();

        fn visit_literal(&mut self, literal: &Literal) {
            self.0.push(format!("{literal:?}"));
        }

        fn visit_unary(&mut self, expr: &UnaryExpression) {
            expr.operand.accept(self);
            self.0.push(expr.operator.to_string());
        }

        fn visit_binary(&mut self, expr: &BinaryExpression) {
            expr.left.accept(self);
            expr.right.accept(self);
            self.0.push(expr.operator.to_string());
        }

        fn visit_grouping(&mut self, inner: &Expr) {
            inner.accept(self);
        }

        fn visit_variable(&mut self, name: &str) {
            self.0.push(name.to_string());
        }

        fn visit_assign(&mut self, expr: &AssignExpression) {
            expr.value.accept(self);
            self.0.push(format!("{}=", expr.name));
        }

        fn visit_call(&mut self, expr: &CallExpression) {
            for argument in &expr.arguments {
                argument.accept(self);
            }
            self.0.push(format!("call {}", expr.callee_name().unwrap_or("?")));
        }
    }

    #[test]
    fn test_accept_dispatches_in_operand_order() {
        let expr = Expr::call(
            "f",
            vec![
                Expr::binary(Expr::variable("a"), BinaryOperator::And, Expr::bool(true)),
                Expr::grouping(Expr::unary(UnaryOperator::Negate, Expr::int(2))),
                Expr::assign("x", Expr::nil()),
            ],
        );

        let mut trace = Trace(Vec::new());
        expr.accept(&mut trace);

        assert_eq!(
            trace.0,
            [
                "a",
                "Bool(true)",
                "&&",
                "Int(2)",
                "-",
                "Nil",
                "x=",
                "call f"
            ]
        );
    }

    #[test]
    fn test_block_discriminant() {
        assert!(Stmt::block(vec![]).is_block());
        assert!(!Stmt::print(Expr::int(1)).is_block());
        assert!(!Stmt::if_then(Expr::bool(true), Stmt::block(vec![])).is_block());
    }

    #[test]
    fn test_divergence() {
        assert!(Stmt::return_void().diverges());
        assert!(Stmt::block(vec![Stmt::print(Expr::int(1)), Stmt::return_void()]).diverges());
        assert!(!Stmt::if_then(Expr::bool(true), Stmt::return_void()).diverges());
        assert!(!Stmt::while_loop(Expr::bool(true), Stmt::return_void()).diverges());

        let body = vec![
            Stmt::print(Expr::int(1)),
            Stmt::block(vec![Stmt::return_value(Expr::int(2))]),
            Stmt::print(Expr::int(3)),
        ];
        assert!(diverges(&body));
        assert!(!diverges(&body[..1]));
    }

    #[test]
    fn test_reserved_names() {
        assert!(is_reserved("__mana_main"));
        assert!(!is_reserved("mana"));
        assert!(!is_reserved("_x"));
    }
}
