//! Typed semantic graph consumed by the compiler.

use std::sync::Arc;

use crate::values::binary::Operator;
use crate::values::time::{Duration, Time};
use crate::values::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: String,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    /// Regular expression literal, the pattern is compiled during lowering.
    Regexp(String),
    DateTime(Time),
    Duration(Duration),
    Identifier(String),
    Member {
        object: Box<Expression>,
        property: String,
    },
    Index {
        array: Box<Expression>,
        index: Box<Expression>,
    },
    Array(Vec<Expression>),
    Object(Vec<Property>),
    Unary {
        op: UnaryOperator,
        argument: Box<Expression>,
    },
    Logical {
        op: LogicalOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Binary {
        op: Operator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Conditional {
        test: Box<Expression>,
        consequent: Box<Expression>,
        alternate: Box<Expression>,
    },
    Call {
        callee: Box<Expression>,
        arguments: Vec<Property>,
    },
    Function(Arc<FunctionExpression>),
    /// Pipe forwarding, only meaningful when building query pipelines.
    Pipe {
        argument: Box<Expression>,
        call: Box<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Variable { name: String, init: Expression },
    Expression(Expression),
    Return(Expression),
    /// Assignment to a global option.
    Option { name: String, init: Expression },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Expression(Expression),
    Block(Vec<Statement>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionParameter {
    pub key: String,
    pub default: Option<Expression>,
    /// Declared type, may contain type variables.
    pub annotation: Option<Type>,
}

impl FunctionParameter {
    pub fn new(key: impl Into<String>) -> Self {
        FunctionParameter {
            key: key.into(),
            default: None,
            annotation: None,
        }
    }

    pub fn with_default(mut self, default: Expression) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_annotation(mut self, typ: Type) -> Self {
        self.annotation = Some(typ);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionExpression {
    pub params: Vec<FunctionParameter>,
    pub body: FunctionBody,
}

impl FunctionExpression {
    pub fn new(params: Vec<FunctionParameter>, body: FunctionBody) -> Self {
        FunctionExpression { params, body }
    }
}

pub fn ident(name: impl Into<String>) -> Expression {
    Expression::Identifier(name.into())
}

pub fn member(object: Expression, property: impl Into<String>) -> Expression {
    Expression::Member {
        object: Box::new(object),
        property: property.into(),
    }
}

pub fn binary(op: Operator, left: Expression, right: Expression) -> Expression {
    Expression::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn logical(op: LogicalOperator, left: Expression, right: Expression) -> Expression {
    Expression::Logical {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn call<S: Into<String>>(
    callee: Expression,
    arguments: impl IntoIterator<Item = (S, Expression)>,
) -> Expression {
    Expression::Call {
        callee: Box::new(callee),
        arguments: arguments
            .into_iter()
            .map(|(key, value)| Property {
                key: key.into(),
                value,
            })
            .collect(),
    }
}

pub fn function(params: Vec<FunctionParameter>, body: FunctionBody) -> Expression {
    Expression::Function(Arc::new(FunctionExpression::new(params, body)))
}
