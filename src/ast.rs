//! Dana abstract syntax tree.
//!
//! The tree is produced by an upstream parser and handed to the evaluator
//! already validated. Every node kind is a variant of a closed enum so the
//! evaluator's dispatch is checked for completeness by the compiler.

use core::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Source location of a statement (1-based). `Span::default()` means unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The four variable namespaces of a sandbox context.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Local,
    Private,
    Public,
    System,
}

impl ScopeKind {
    /// Resolution order for unprefixed names.
    pub const PRECEDENCE: [ScopeKind; 4] = [
        ScopeKind::Local,
        ScopeKind::Private,
        ScopeKind::Public,
        ScopeKind::System,
    ];
}

/// A variable name, optionally pinned to a scope (`private:x`, `public.y`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopedName {
    pub scope: Option<ScopeKind>,
    pub name: String,
}

impl ScopedName {
    pub fn new(scope: Option<ScopeKind>, name: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
        }
    }

    pub fn unscoped(name: impl Into<String>) -> Self {
        Self::new(None, name)
    }

    pub fn scoped(scope: ScopeKind, name: impl Into<String>) -> Self {
        Self::new(Some(scope), name)
    }

    /// Parses `scope:name`, `scope.name` or a bare `name`. A prefix that is not
    /// a scope keyword is kept as part of the name.
    pub fn parse(text: &str) -> Self {
        for separator in [':', '.'] {
            if let Some((prefix, rest)) = text.split_once(separator) {
                if let Ok(scope) = ScopeKind::from_str(prefix) {
                    if !rest.is_empty() {
                        return Self::scoped(scope, rest);
                    }
                }
            }
        }
        Self::unscoped(text)
    }
}

impl From<&str> for ScopedName {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl fmt::Display for ScopedName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.scope {
            Some(scope) => write!(f, "{}:{}", scope, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// How a Dana call delivers its value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// `deliver`: dispatched as soon as the promise is created.
    Eager,
    /// `return`: runs on first force.
    #[default]
    Lazy,
}

/// A validated program: an ordered list of top-level statements.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub statements: Arc<Vec<Statement>>,
}

impl Program {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self {
            statements: Arc::new(statements),
        }
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl From<Vec<Statement>> for Program {
    fn from(statements: Vec<Statement>) -> Self {
        Self::new(statements)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
}

impl Statement {
    pub fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            span: Span::default(),
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.span = Span::new(line, column);
        self
    }

    pub fn expression(expr: Expression) -> Self {
        Self::new(StatementKind::Expression(expr))
    }

    pub fn assign(target: impl Into<ScopedName>, value: Expression) -> Self {
        Self::new(StatementKind::Assignment {
            target: vec![Expression::Identifier(target.into())],
            value,
        })
    }

    pub fn ret(value: Expression) -> Self {
        Self::new(StatementKind::Return(Some(value)))
    }

    pub fn deliver(value: Expression) -> Self {
        Self::new(StatementKind::Deliver(Some(value)))
    }

    pub fn function(def: FunctionDef) -> Self {
        Self::new(StatementKind::FunctionDef(Arc::new(def)))
    }
}

impl From<StatementKind> for Statement {
    fn from(kind: StatementKind) -> Self {
        Self::new(kind)
    }
}

impl From<Expression> for Statement {
    fn from(expr: Expression) -> Self {
        Self::expression(expr)
    }
}

#[derive(Debug, Clone, PartialEq, strum::IntoStaticStr)]
pub enum StatementKind {
    Expression(Expression),
    /// Several targets unpack a tuple or list value.
    Assignment {
        target: Vec<Expression>,
        value: Expression,
    },
    If {
        condition: Expression,
        then_block: Vec<Statement>,
        else_block: Option<Vec<Statement>>,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    For {
        variable: String,
        iterable: Expression,
        body: Vec<Statement>,
    },
    FunctionDef(Arc<FunctionDef>),
    StructDef(Arc<StructDef>),
    Return(Option<Expression>),
    Deliver(Option<Expression>),
    Break,
    Continue,
    Pass,
    TryCatch {
        body: Vec<Statement>,
        error_binding: Option<String>,
        handler: Vec<Statement>,
        finally: Option<Vec<Statement>>,
    },
    Raise(Expression),
    Assert {
        condition: Expression,
        message: Option<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub default: Option<Expression>,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: Expression) -> Self {
        Self {
            name: name.into(),
            default: Some(default),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub body: Vec<Statement>,
}

impl FunctionDef {
    pub fn new(name: impl Into<String>, parameters: Vec<Parameter>, body: Vec<Statement>) -> Self {
        Self {
            name: name.into(),
            parameters,
            body,
        }
    }

    /// A body that delivers anywhere outside nested definitions is eager.
    pub fn delivery_mode(&self) -> DeliveryMode {
        if Self::delivers(&self.body) {
            DeliveryMode::Eager
        } else {
            DeliveryMode::Lazy
        }
    }

    fn delivers(block: &[Statement]) -> bool {
        block.iter().any(|statement| match &statement.kind {
            StatementKind::Deliver(_) => true,
            StatementKind::If {
                then_block,
                else_block,
                ..
            } => {
                Self::delivers(then_block)
                    || else_block.as_deref().is_some_and(Self::delivers)
            }
            StatementKind::While { body, .. } | StatementKind::For { body, .. } => {
                Self::delivers(body)
            }
            StatementKind::TryCatch {
                body,
                handler,
                finally,
                ..
            } => {
                Self::delivers(body)
                    || Self::delivers(handler)
                    || finally.as_deref().is_some_and(Self::delivers)
            }
            _ => false,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: String,
    pub default: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<StructField>,
}

#[derive(Debug, Clone, PartialEq, strum::IntoStaticStr)]
pub enum Expression {
    Literal(Literal),
    Identifier(ScopedName),
    Binary {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    Call {
        function: Box<Expression>,
        arguments: Vec<Argument>,
    },
    MethodCall {
        object: Box<Expression>,
        method: String,
        arguments: Vec<Argument>,
    },
    Attribute {
        object: Box<Expression>,
        name: String,
    },
    Index {
        object: Box<Expression>,
        index: Box<Expression>,
    },
    Slice {
        object: Box<Expression>,
        start: Option<Box<Expression>>,
        end: Option<Box<Expression>>,
        step: Option<Box<Expression>>,
    },
    List(Vec<Expression>),
    Dict(Vec<(Expression, Expression)>),
    Tuple(Vec<Expression>),
    Conditional {
        condition: Box<Expression>,
        then_expr: Box<Expression>,
        else_expr: Box<Expression>,
    },
    FString(Vec<FStringPart>),
    /// `deliver f(...)`: the call is dispatched eagerly regardless of how `f`
    /// is written.
    Deliver(Box<Expression>),
}

impl Expression {
    pub fn kind_name(&self) -> &'static str {
        self.into()
    }

    pub fn int(value: i64) -> Self {
        Expression::Literal(Literal::Integer(value))
    }

    pub fn float(value: f64) -> Self {
        Expression::Literal(Literal::Float(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expression::Literal(Literal::String(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Expression::Literal(Literal::Boolean(value))
    }

    pub fn none() -> Self {
        Expression::Literal(Literal::None)
    }

    pub fn ident(name: &str) -> Self {
        Expression::Identifier(ScopedName::parse(name))
    }

    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn call(function: &str, arguments: Vec<Expression>) -> Self {
        Expression::Call {
            function: Box::new(Expression::ident(function)),
            arguments: arguments.into_iter().map(Argument::Positional).collect(),
        }
    }

    pub fn method(object: Expression, method: &str, arguments: Vec<Expression>) -> Self {
        Expression::MethodCall {
            object: Box::new(object),
            method: method.to_string(),
            arguments: arguments.into_iter().map(Argument::Positional).collect(),
        }
    }

    pub fn deliver(call: Expression) -> Self {
        Expression::Deliver(Box::new(call))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Positional(Expression),
    Named { name: String, value: Expression },
}

impl Argument {
    pub fn value(&self) -> &Expression {
        match self {
            Argument::Positional(value) | Argument::Named { value, .. } => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Text(String),
    Expr(Expression),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum BinaryOperator {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "//")]
    FloorDivide,
    #[strum(serialize = "%")]
    Modulo,
    #[strum(serialize = "**")]
    Power,
    #[strum(serialize = "==")]
    Equal,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "<=")]
    LessThanEqual,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = ">=")]
    GreaterThanEqual,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "not in")]
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum UnaryOperator {
    #[strum(serialize = "not")]
    Not,
    #[strum(serialize = "-")]
    Negate,
}
