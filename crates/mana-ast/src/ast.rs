use derive_more::Display;

pub type Identifier = String;

/// Name of the function every runnable program starts from.
pub const ENTRY_POINT: &str = "main";

/// Name of the single built-in function.
pub const PRINT_BUILTIN: &str = "print";

/// Identifiers starting with this prefix are reserved for generated code.
pub const RESERVED_PREFIX: &str = "__mana";

pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Int(i32),
    Float(f64),
    Bool(bool),
    Str(String),
    Nil,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum UnaryOperator {
    #[display("-")]
    Negate,
    #[display("!")]
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum BinaryOperator {
    #[display("+")]
    Add,
    #[display("-")]
    Subtract,
    #[display("*")]
    Multiply,
    #[display("/")]
    Divide,
    #[display("%")]
    Remainder,
    #[display("==")]
    Equal,
    #[display("!=")]
    NotEqual,
    #[display("<")]
    Less,
    #[display("<=")]
    LessEqual,
    #[display(">")]
    Greater,
    #[display(">=")]
    GreaterEqual,
    #[display("&&")]
    And,
    #[display("||")]
    Or,
}

impl BinaryOperator {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Equal
                | Self::NotEqual
                | Self::Less
                | Self::LessEqual
                | Self::Greater
                | Self::GreaterEqual
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Unary(UnaryExpression),
    Binary(BinaryExpression),
    Grouping(Box<Expr>),
    Variable(Identifier),
    Assign(AssignExpression),
    Call(CallExpression),
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnaryExpression {
    pub operator: UnaryOperator,
    pub operand: Box<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BinaryExpression {
    pub left: Box<Expr>,
    pub operator: BinaryOperator,
    pub right: Box<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssignExpression {
    pub name: Identifier,
    pub value: Box<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CallExpression {
    pub callee: Box<Expr>,
    pub arguments: Vec<Expr>,
}

impl CallExpression {
    /// The callee's name when it is a plain identifier.
    pub fn callee_name(&self) -> Option<&str> {
        match self.callee.as_ref() {
            Expr::Variable(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Expression(Expr),
    VarDecl(VarDecl),
    Block(Block),
    If(IfStatement),
    While(WhileStatement),
    Function(FunctionDecl),
    Return(ReturnStatement),
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarDecl {
    pub name: Identifier,
    pub is_const: bool,
    pub initializer: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IfStatement {
    pub condition: Expr,
    pub then_branch: Box<Stmt>,
    pub else_branch: Option<Box<Stmt>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WhileStatement {
    pub condition: Expr,
    pub body: Box<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDecl {
    pub name: Identifier,
    pub parameters: Vec<Identifier>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReturnStatement {
    pub value: Option<Expr>,
}

impl Stmt {
    pub fn is_block(&self) -> bool {
        matches!(self, Stmt::Block(_))
    }

    /// Whether control never continues past this statement in its enclosing
    /// statement list. Statements after a diverging one are not lowered.
    pub fn diverges(&self) -> bool {
        match self {
            Stmt::Return(_) => true,
            Stmt::Block(block) => diverges(&block.statements),
            _ => false,
        }
    }
}

pub fn diverges(statements: &[Stmt]) -> bool {
    statements.iter().any(Stmt::diverges)
}

// Constructors used by front ends and tests.

impl Expr {
    pub fn int(value: i32) -> Self {
        Expr::Literal(Literal::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Expr::Literal(Literal::Float(value))
    }

    pub fn bool(value: bool) -> Self {
        Expr::Literal(Literal::Bool(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::Str(value.into()))
    }

    pub fn nil() -> Self {
        Expr::Literal(Literal::Nil)
    }

    pub fn variable(name: impl Into<Identifier>) -> Self {
        Expr::Variable(name.into())
    }

    pub fn unary(operator: UnaryOperator, operand: Expr) -> Self {
        Expr::Unary(UnaryExpression {
            operator,
            operand: Box::new(operand),
        })
    }

    pub fn binary(left: Expr, operator: BinaryOperator, right: Expr) -> Self {
        Expr::Binary(BinaryExpression {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        })
    }

    pub fn grouping(inner: Expr) -> Self {
        Expr::Grouping(Box::new(inner))
    }

    pub fn assign(name: impl Into<Identifier>, value: Expr) -> Self {
        Expr::Assign(AssignExpression {
            name: name.into(),
            value: Box::new(value),
        })
    }

    pub fn call(callee: impl Into<Identifier>, arguments: Vec<Expr>) -> Self {
        Expr::Call(CallExpression {
            callee: Box::new(Expr::Variable(callee.into())),
            arguments,
        })
    }
}

impl Stmt {
    pub fn expression(expr: Expr) -> Self {
        Stmt::Expression(expr)
    }

    pub fn var(name: impl Into<Identifier>, initializer: Expr) -> Self {
        Stmt::VarDecl(VarDecl {
            name: name.into(),
            is_const: false,
            initializer: Some(initializer),
        })
    }

    pub fn var_uninit(name: impl Into<Identifier>) -> Self {
        Stmt::VarDecl(VarDecl {
            name: name.into(),
            is_const: false,
            initializer: None,
        })
    }

    pub fn constant(name: impl Into<Identifier>, initializer: Expr) -> Self {
        Stmt::VarDecl(VarDecl {
            name: name.into(),
            is_const: true,
            initializer: Some(initializer),
        })
    }

    pub fn block(statements: Vec<Stmt>) -> Self {
        Stmt::Block(Block { statements })
    }

    pub fn if_then(condition: Expr, then_branch: Stmt) -> Self {
        Stmt::If(IfStatement {
            condition,
            then_branch: Box::new(then_branch),
            else_branch: None,
        })
    }

    pub fn if_else(condition: Expr, then_branch: Stmt, else_branch: Stmt) -> Self {
        Stmt::If(IfStatement {
            condition,
            then_branch: Box::new(then_branch),
            else_branch: Some(Box::new(else_branch)),
        })
    }

    pub fn while_loop(condition: Expr, body: Stmt) -> Self {
        Stmt::While(WhileStatement {
            condition,
            body: Box::new(body),
        })
    }

    pub fn function(name: impl Into<Identifier>, parameters: &[&str], body: Vec<Stmt>) -> Self {
        Stmt::Function(FunctionDecl {
            name: name.into(),
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
            body,
        })
    }

    pub fn return_value(value: Expr) -> Self {
        Stmt::Return(ReturnStatement { value: Some(value) })
    }

    pub fn return_void() -> Self {
        Stmt::Return(ReturnStatement { value: None })
    }

    /// `print(value);`
    pub fn print(value: Expr) -> Self {
        Stmt::Expression(Expr::call(PRINT_BUILTIN, vec![value]))
    }
}
