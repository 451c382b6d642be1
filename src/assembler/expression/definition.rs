use std::fmt;

use super::ExpressionError;

/// Associativity of a binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

pub type BinaryHandler<T> = fn(&T, &T) -> Result<T, ExpressionError>;
pub type UnaryHandler<T> = fn(&T) -> Result<T, ExpressionError>;
pub type FunctionHandler<T> = fn(&[T]) -> Result<T, ExpressionError>;
pub type LiteralDecoder<T> = fn(&str) -> Result<T, ExpressionError>;
pub type ConditionHandler<T> = fn(&T) -> bool;

/// A binary operator, e.g. `+`.
#[derive(Clone)]
pub struct BinaryOperator<T> {
    pub identifier: String,
    /// The lower, the earlier the operator is evaluated.
    pub precedence: u16,
    pub associativity: Associativity,
    pub handler: BinaryHandler<T>,
}

impl<T> BinaryOperator<T> {
    pub fn new(
        identifier: &str,
        precedence: u16,
        associativity: Associativity,
        handler: BinaryHandler<T>,
    ) -> Self {
        Self {
            identifier: identifier.to_owned(),
            precedence,
            associativity,
            handler,
        }
    }

    pub fn left(identifier: &str, precedence: u16, handler: BinaryHandler<T>) -> Self {
        Self::new(identifier, precedence, Associativity::Left, handler)
    }
}

impl<T> fmt::Debug for BinaryOperator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryOperator")
            .field("identifier", &self.identifier)
            .field("precedence", &self.precedence)
            .field("associativity", &self.associativity)
            .finish()
    }
}

/// A prefix operator, e.g. `-` or `~`. Unary operators bind tighter than any binary operator.
#[derive(Clone)]
pub struct UnaryOperator<T> {
    pub identifier: String,
    pub handler: UnaryHandler<T>,
}

impl<T> UnaryOperator<T> {
    pub fn new(identifier: &str, handler: UnaryHandler<T>) -> Self {
        Self {
            identifier: identifier.to_owned(),
            handler,
        }
    }
}

impl<T> fmt::Debug for UnaryOperator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnaryOperator")
            .field("identifier", &self.identifier)
            .finish()
    }
}

/// A function with a fixed number of arguments, e.g. `max(a, b)`.
#[derive(Clone)]
pub struct Function<T> {
    pub identifier: String,
    pub arity: usize,
    pub handler: FunctionHandler<T>,
}

impl<T> Function<T> {
    pub fn new(identifier: &str, arity: usize, handler: FunctionHandler<T>) -> Self {
        Self {
            identifier: identifier.to_owned(),
            arity,
            handler,
        }
    }
}

impl<T> fmt::Debug for Function<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("identifier", &self.identifier)
            .field("arity", &self.arity)
            .finish()
    }
}

/// The conditional operator `condition ? a : b`. It is always right associative.
#[derive(Clone)]
pub struct TernaryOperator<T> {
    pub left: String,
    pub right: String,
    pub precedence: u16,
    pub condition: ConditionHandler<T>,
}

impl<T> fmt::Debug for TernaryOperator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TernaryOperator")
            .field("left", &self.left)
            .field("right", &self.right)
            .field("precedence", &self.precedence)
            .finish()
    }
}

/// A literal pattern (regex syntax) and how to turn matching text into a value.
#[derive(Clone)]
pub struct Literal<T> {
    pub pattern: String,
    pub decoder: LiteralDecoder<T>,
}

impl<T> Literal<T> {
    pub fn new(pattern: &str, decoder: LiteralDecoder<T>) -> Self {
        Self {
            pattern: pattern.to_owned(),
            decoder,
        }
    }
}

impl<T> fmt::Debug for Literal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Literal")
            .field("pattern", &self.pattern)
            .finish()
    }
}

/// Everything needed to build an expression compiler for one dialect.
///
/// A new dialect is expressed purely by supplying a different definition.
#[derive(Debug, Clone)]
pub struct ExpressionDefinition<T> {
    pub binary_operators: Vec<BinaryOperator<T>>,
    pub unary_operators: Vec<UnaryOperator<T>>,
    pub functions: Vec<Function<T>>,
    pub literals: Vec<Literal<T>>,
    pub ternary: Option<TernaryOperator<T>>,
    /// Pattern for symbol names
    pub constant: String,
    pub left_bracket: String,
    pub right_bracket: String,
    pub comma: String,
}
