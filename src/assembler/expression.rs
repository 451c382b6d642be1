//! # Expressions
//!
//! Operand and directive arguments are expressions like `(BASE + 4) << 2`. They are split into
//! tokens by a rule based [`tokenizer::Tokenizer`] and reduced to a single value by an
//! [`compiler::ExpressionCompiler`]. Which operators, functions and literals exist is not hard
//! coded but described by an [`definition::ExpressionDefinition`]; the C-like integer dialect used
//! by the assembler lives in [`clike`].
//!
//! Named symbols are resolved through the [`ValueLookup`] trait.

use std::collections::HashMap;

use thiserror::Error;

pub mod clike;
pub mod compiler;
pub mod definition;
pub mod tokenizer;

pub use compiler::ExpressionCompiler;
pub use definition::{
    Associativity, BinaryOperator, ExpressionDefinition, Function, Literal, LiteralDecoder,
    TernaryOperator, UnaryOperator,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("Unrecognized token at: '{0}'")]
    UnrecognizedToken(String),
    #[error("Missing opening bracket")]
    MissingOpeningBracket,
    #[error("Missing closing bracket")]
    MissingClosingBracket,
    #[error("Missing {0} operand(s)")]
    MissingOperands(usize),
    #[error("Unknown unary operator: '{0}'")]
    UnknownUnaryOperator(String),
    #[error("Unknown binary operator: '{0}'")]
    UnknownBinaryOperator(String),
    #[error("Unknown function: '{0}'")]
    UnknownFunction(String),
    #[error("Unknown symbol: '{0}'")]
    UnknownSymbol(String),
    #[error("Ternary operator is missing its condition part")]
    MalformedTernary,
    #[error("Ternary operator is missing its second branch")]
    MissingTernaryBranch,
    #[error("Malformed expression")]
    MalformedExpression,
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Invalid literal: '{0}'")]
    InvalidLiteral(String),
    #[error("Comma outside of a function argument list")]
    UnexpectedComma,
    #[error("Function '{function}' expects {expected} argument(s), found {found}")]
    WrongArgumentCount {
        function: String,
        expected: usize,
        found: usize,
    },
    #[error("Function '{0}' has to be followed by an argument list")]
    MissingFunctionArguments(String),
}

/// Source of values for named symbols inside expressions.
pub trait ValueLookup<T> {
    fn lookup(&self, name: &str) -> Option<T>;
}

impl<T: Clone> ValueLookup<T> for HashMap<String, T> {
    fn lookup(&self, name: &str) -> Option<T> {
        self.get(name).cloned()
    }
}

/// Lookup that knows no symbols at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSymbols;

impl<T> ValueLookup<T> for NoSymbols {
    fn lookup(&self, _name: &str) -> Option<T> {
        None
    }
}
