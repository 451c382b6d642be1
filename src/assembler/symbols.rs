use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use super::{
    error::CompileErrorList,
    expression::{
        clike,
        tokenizer::{Token, TokenKind},
    },
    source_position::PositionedString,
};

pub use self::{
    graph::{SymbolGraph, SymbolGraphEvaluation},
    resolve::SymbolTable,
};

/// Dependency analysis of symbols: duplicates, invalid names, cycles and evaluation order.
mod graph;

/// Resolving of symbols to values in evaluation order.
mod resolve;

lazy_static! {
    static ref SYMBOL_NAME: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    #[error("Symbol '{0}' has got an invalid name")]
    InvalidName(String),
    #[error("Symbol '{0}' defined multiple times")]
    DuplicateName(String),
    #[error("Symbol '{name}' is part of a dependency cycle: {cycle}")]
    Cycle { name: String, cycle: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolBehavior {
    /// Value is fixed at the point of definition, e.g. a constant
    Static,
    /// Value depends on the memory layout, e.g. the address of a label
    Dynamic,
}

impl fmt::Display for SymbolBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolBehavior::Static => write!(f, "static"),
            SymbolBehavior::Dynamic => write!(f, "dynamic"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Name of the symbol
    pub name: PositionedString,
    /// Expression source the value is compiled from
    pub value: PositionedString,
    pub behavior: SymbolBehavior,
}

impl Symbol {
    pub fn new(name: PositionedString, value: PositionedString, behavior: SymbolBehavior) -> Self {
        Self {
            name,
            value,
            behavior,
        }
    }

    /// A valid name is an identifier the expression dialect reads as a constant, so function
    /// names like `max` are rejected.
    pub fn is_valid(&self) -> bool {
        SYMBOL_NAME.is_match(self.name.as_str())
            && matches!(
                constant_tokens(&self.name).as_slice(),
                [token] if token.text.as_str() == self.name.as_str()
            )
    }

    /// All constants the value refers to, in order of appearance.
    ///
    /// Character literals and function names are not references. A value that fails to tokenize
    /// refers to nothing; its error is reported when it is compiled.
    pub fn references(&self) -> Vec<String> {
        constant_tokens(&self.value)
            .into_iter()
            .map(|token| token.text.as_str().to_owned())
            .collect()
    }
}

fn constant_tokens(text: &PositionedString) -> Vec<Token> {
    let mut ignored = CompileErrorList::new();
    clike::compiler()
        .and_then(|compiler| compiler.tokenizer().tokenize(text, &mut ignored))
        .unwrap_or_default()
        .into_iter()
        .filter(|token| token.kind == TokenKind::Constant)
        .collect()
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {} ({})", self.name, self.value, self.behavior)
    }
}
