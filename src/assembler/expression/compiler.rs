use std::collections::HashMap;

use regex::Regex;

use super::{
    definition::{BinaryOperator, ExpressionDefinition, Function, TernaryOperator, UnaryOperator},
    tokenizer::{Token, TokenKind, TokenRule, Tokenizer},
    Associativity, ExpressionError, LiteralDecoder, ValueLookup,
};
use crate::assembler::{
    error::CompileErrorList,
    source_position::{PositionedString, SourcePositionSpan},
};

/// Unary operators on the stack are popped by every binary operator.
const UNARY_PRECEDENCE: i32 = -1;
/// Brackets, `?` and functions are only removed explicitly.
const BARRIER_PRECEDENCE: i32 = 0x10000;
/// The end of the expression flushes everything.
const END_PRECEDENCE: i32 = 0x1ffff;

#[derive(Debug)]
struct Failure {
    error: ExpressionError,
    span: SourcePositionSpan,
}

type Step<R = ()> = Result<R, Failure>;

#[derive(Debug, Clone, Copy)]
enum StackItem<'t> {
    Unary(&'t Token),
    Binary(&'t Token),
    Function(&'t Token),
    /// Opening bracket, the height of the value stack when the current argument started and the
    /// number of arguments completed by a comma.
    Bracket {
        token: &'t Token,
        height: usize,
        arguments: usize,
    },
    TernaryLeft(&'t Token),
    TernaryRight(&'t Token),
}

impl<'t> StackItem<'t> {
    fn token(&self) -> &'t Token {
        match *self {
            StackItem::Unary(token)
            | StackItem::Binary(token)
            | StackItem::Function(token)
            | StackItem::Bracket { token, .. }
            | StackItem::TernaryLeft(token)
            | StackItem::TernaryRight(token) => token,
        }
    }
}

struct ParseState<'t, T> {
    last: TokenKind,
    current: Option<&'t Token>,
    operators: Vec<StackItem<'t>>,
    values: Vec<T>,
    whole: SourcePositionSpan,
}

impl<'t, T> ParseState<'t, T> {
    fn fail<R>(&self, error: ExpressionError) -> Step<R> {
        let span = self.current.map(|t| t.text.span).unwrap_or(self.whole);
        Err(Failure { error, span })
    }
}

/// Operator-precedence evaluator producing a single value from an expression.
///
/// The compiler works on two stacks, one for pending operators and one for values, and never
/// builds a syntax tree.
pub struct ExpressionCompiler<T> {
    tokenizer: Tokenizer,
    binary_operators: HashMap<String, BinaryOperator<T>>,
    unary_operators: HashMap<String, UnaryOperator<T>>,
    functions: HashMap<String, Function<T>>,
    literals: Vec<(Regex, LiteralDecoder<T>)>,
    ternary: Option<TernaryOperator<T>>,
}

impl<T> std::fmt::Debug for ExpressionCompiler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionCompiler")
            .field("binary_operators", &self.binary_operators.len())
            .field("unary_operators", &self.unary_operators.len())
            .field("functions", &self.functions.len())
            .field("literals", &self.literals.len())
            .finish()
    }
}

fn alternation<'a>(identifiers: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut identifiers: Vec<&str> = identifiers.collect();
    identifiers.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    identifiers.dedup();
    if identifiers.is_empty() {
        None
    } else {
        Some(
            identifiers
                .iter()
                .map(|i| regex::escape(i))
                .collect::<Vec<_>>()
                .join("|"),
        )
    }
}

impl<T: Clone + Default> ExpressionCompiler<T> {
    pub fn new(definition: ExpressionDefinition<T>) -> Result<Self, regex::Error> {
        let mut rules: Vec<TokenRule> = definition
            .literals
            .iter()
            .map(|literal| TokenRule::new(&literal.pattern, TokenKind::Literal))
            .collect();
        rules.push(TokenRule::new(&definition.left_bracket, TokenKind::LeftBracket));
        rules.push(TokenRule::new(&definition.right_bracket, TokenKind::RightBracket));
        rules.push(TokenRule::new(&definition.comma, TokenKind::Comma));
        if let Some(ternary) = &definition.ternary {
            rules.push(TokenRule::new(&regex::escape(&ternary.left), TokenKind::TernaryLeft));
            rules.push(TokenRule::new(&regex::escape(&ternary.right), TokenKind::TernaryRight));
        }
        let operators = definition
            .binary_operators
            .iter()
            .map(|o| o.identifier.as_str())
            .chain(definition.unary_operators.iter().map(|o| o.identifier.as_str()));
        if let Some(pattern) = alternation(operators) {
            rules.push(TokenRule::new(&pattern, TokenKind::Operator));
        }
        if let Some(pattern) = alternation(definition.functions.iter().map(|f| f.identifier.as_str()))
        {
            rules.push(TokenRule::new(
                &format!("(?:{})\\b", pattern),
                TokenKind::FunctionName,
            ));
        }
        rules.push(TokenRule::new(&definition.constant, TokenKind::Constant));

        let literals = definition
            .literals
            .iter()
            .map(|literal| -> Result<_, regex::Error> {
                let regex = Regex::new(&format!("^(?:{})$", literal.pattern))?;
                Ok((regex, literal.decoder))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            tokenizer: Tokenizer::new(&rules)?,
            binary_operators: definition
                .binary_operators
                .into_iter()
                .map(|o| (o.identifier.clone(), o))
                .collect(),
            unary_operators: definition
                .unary_operators
                .into_iter()
                .map(|o| (o.identifier.clone(), o))
                .collect(),
            functions: definition
                .functions
                .into_iter()
                .map(|f| (f.identifier.clone(), f))
                .collect(),
            literals,
            ternary: definition.ternary,
        })
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Compiles the expression into a value, falling back to `T::default()` on failure.
    ///
    /// Any failure is recorded in `errors`.
    pub fn compile(
        &self,
        expression: &PositionedString,
        symbols: &dyn ValueLookup<T>,
        errors: &mut CompileErrorList,
    ) -> T {
        self.try_compile(expression, symbols, errors)
            .unwrap_or_default()
    }

    /// Compiles the expression, returning `None` if an error has been recorded.
    #[tracing::instrument(skip_all, fields(expression = %expression))]
    pub fn try_compile(
        &self,
        expression: &PositionedString,
        symbols: &dyn ValueLookup<T>,
        errors: &mut CompileErrorList,
    ) -> Option<T> {
        let tokens = self.tokenizer.tokenize(expression, errors)?;
        match self.evaluate(&tokens, expression.span, symbols) {
            Ok(value) => Some(value),
            Err(failure) => {
                errors.push_error(failure.span, failure.error);
                None
            }
        }
    }

    fn evaluate(
        &self,
        tokens: &[Token],
        whole: SourcePositionSpan,
        symbols: &dyn ValueLookup<T>,
    ) -> Step<T> {
        let mut state = ParseState {
            last: TokenKind::Invalid,
            current: None,
            operators: Vec::new(),
            values: Vec::new(),
            whole,
        };

        for token in tokens {
            state.current = Some(token);
            if state.last == TokenKind::FunctionName && token.kind != TokenKind::LeftBracket {
                let name = state.operators.last().map(|i| i.token().text.text.clone());
                return state.fail(ExpressionError::MissingFunctionArguments(
                    name.unwrap_or_default(),
                ));
            }
            self.handle_token(&mut state, token, symbols)?;
            state.last = token.kind;
        }

        state.current = None;
        if state.last == TokenKind::FunctionName {
            let name = state.operators.last().map(|i| i.token().text.text.clone());
            return state.fail(ExpressionError::MissingFunctionArguments(
                name.unwrap_or_default(),
            ));
        }
        self.decrease_stack(&mut state, END_PRECEDENCE, false)?;

        if state.values.len() != 1 {
            return state.fail(ExpressionError::MalformedExpression);
        }
        Ok(state.values.remove(0))
    }

    fn handle_token<'t>(
        &self,
        state: &mut ParseState<'t, T>,
        token: &'t Token,
        symbols: &dyn ValueLookup<T>,
    ) -> Step {
        match token.kind {
            TokenKind::Literal => {
                let value = self.decode_literal(state, token)?;
                state.values.push(value);
                Ok(())
            }
            TokenKind::Constant => match symbols.lookup(token.text.as_str()) {
                Some(value) => {
                    state.values.push(value);
                    Ok(())
                }
                None => state.fail(ExpressionError::UnknownSymbol(token.text.text.clone())),
            },
            TokenKind::Operator => {
                if Self::is_unary(state) {
                    self.push_unary(state, token)
                } else {
                    self.push_binary(state, token)
                }
            }
            TokenKind::FunctionName => {
                if !self.functions.contains_key(token.text.as_str()) {
                    return state.fail(ExpressionError::UnknownFunction(token.text.text.clone()));
                }
                state.operators.push(StackItem::Function(token));
                Ok(())
            }
            TokenKind::LeftBracket => {
                state.operators.push(StackItem::Bracket {
                    token,
                    height: state.values.len(),
                    arguments: 0,
                });
                Ok(())
            }
            TokenKind::RightBracket => self.close_bracket(state),
            TokenKind::Comma => {
                self.decrease_stack(state, BARRIER_PRECEDENCE, false)?;
                let len = state.operators.len();
                let inside_call = matches!(
                    (
                        len.checked_sub(2).map(|i| &state.operators[i]),
                        state.operators.last(),
                    ),
                    (Some(StackItem::Function(_)), Some(StackItem::Bracket { .. }))
                );
                if !inside_call {
                    return state.fail(ExpressionError::UnexpectedComma);
                }

                // Every argument has to reduce to exactly one value
                let values = state.values.len();
                let completed = match state.operators.last_mut() {
                    Some(StackItem::Bracket {
                        height, arguments, ..
                    }) if values == *height + 1 => {
                        *height = values;
                        *arguments += 1;
                        true
                    }
                    _ => false,
                };
                if completed {
                    Ok(())
                } else {
                    state.fail(ExpressionError::MalformedExpression)
                }
            }
            TokenKind::TernaryLeft => {
                let precedence = self.ternary_precedence();
                self.decrease_stack(state, precedence, false)?;
                state.operators.push(StackItem::TernaryLeft(token));
                Ok(())
            }
            TokenKind::TernaryRight => {
                self.decrease_stack(state, BARRIER_PRECEDENCE, false)?;
                match state.operators.last() {
                    Some(StackItem::TernaryLeft(_)) => {
                        state.operators.pop();
                        state.operators.push(StackItem::TernaryRight(token));
                        Ok(())
                    }
                    _ => state.fail(ExpressionError::MalformedTernary),
                }
            }
            TokenKind::Invalid => state.fail(ExpressionError::UnrecognizedToken(
                token.text.text.clone(),
            )),
        }
    }

    /// An operator is unary if there is no left operand available.
    fn is_unary(state: &ParseState<'_, T>) -> bool {
        !matches!(
            state.last,
            TokenKind::Literal | TokenKind::Constant | TokenKind::RightBracket
        )
    }

    fn push_unary<'t>(&self, state: &mut ParseState<'t, T>, token: &'t Token) -> Step {
        if !self.unary_operators.contains_key(token.text.as_str()) {
            return state.fail(ExpressionError::UnknownUnaryOperator(
                token.text.text.clone(),
            ));
        }
        self.decrease_stack(state, UNARY_PRECEDENCE, false)?;
        state.operators.push(StackItem::Unary(token));
        Ok(())
    }

    fn push_binary<'t>(&self, state: &mut ParseState<'t, T>, token: &'t Token) -> Step {
        let (precedence, associativity) = match self.binary_operators.get(token.text.as_str()) {
            Some(operator) => (operator.precedence as i32, operator.associativity),
            None => {
                return state.fail(ExpressionError::UnknownBinaryOperator(
                    token.text.text.clone(),
                ))
            }
        };
        self.decrease_stack(state, precedence, associativity == Associativity::Left)?;
        state.operators.push(StackItem::Binary(token));
        Ok(())
    }

    fn close_bracket(&self, state: &mut ParseState<'_, T>) -> Step {
        self.decrease_stack(state, BARRIER_PRECEDENCE, false)?;
        let (height, completed) = match state.operators.pop() {
            Some(StackItem::Bracket {
                height, arguments, ..
            }) => (height, arguments),
            Some(StackItem::TernaryLeft(_)) => {
                return state.fail(ExpressionError::MissingTernaryBranch)
            }
            _ => return state.fail(ExpressionError::MissingOpeningBracket),
        };
        let pending = state.values.len().saturating_sub(height);

        if let Some(StackItem::Function(function_token)) = state.operators.last().copied() {
            state.operators.pop();
            let function = &self.functions[function_token.text.as_str()];
            let arguments = match (completed, pending) {
                (0, 0) => 0,
                (_, 1) => completed + 1,
                _ => return state.fail(ExpressionError::MalformedExpression),
            };
            if arguments != function.arity {
                return state.fail(ExpressionError::WrongArgumentCount {
                    function: function.identifier.clone(),
                    expected: function.arity,
                    found: arguments,
                });
            }
            let args = state.values.split_off(state.values.len() - arguments);
            match (function.handler)(&args) {
                Ok(value) => state.values.push(value),
                Err(error) => return state.fail(error),
            }
        } else if pending != 1 {
            return state.fail(ExpressionError::MalformedExpression);
        }
        Ok(())
    }

    /// Pops and applies every operator that binds tighter than the incoming precedence.
    fn decrease_stack(
        &self,
        state: &mut ParseState<'_, T>,
        precedence: i32,
        pop_equal: bool,
    ) -> Step {
        while let Some(top) = state.operators.last().copied() {
            let top_precedence = self.precedence(&top);
            if top_precedence < precedence || (pop_equal && top_precedence == precedence) {
                state.operators.pop();
                self.apply(state, top)?;
            } else {
                break;
            }
        }
        Ok(())
    }

    fn precedence(&self, item: &StackItem<'_>) -> i32 {
        match item {
            StackItem::Unary(_) => UNARY_PRECEDENCE,
            StackItem::Binary(token) => self
                .binary_operators
                .get(token.text.as_str())
                .map(|o| o.precedence as i32)
                .unwrap_or(BARRIER_PRECEDENCE),
            StackItem::TernaryRight(_) => self.ternary_precedence(),
            StackItem::Function(_) | StackItem::Bracket { .. } | StackItem::TernaryLeft(_) => {
                BARRIER_PRECEDENCE
            }
        }
    }

    fn ternary_precedence(&self) -> i32 {
        self.ternary
            .as_ref()
            .map(|t| t.precedence as i32)
            .unwrap_or(BARRIER_PRECEDENCE - 1)
    }

    fn apply(&self, state: &mut ParseState<'_, T>, item: StackItem<'_>) -> Step {
        let result = match item {
            StackItem::Bracket { .. } | StackItem::Function(_) => {
                return state.fail(ExpressionError::MissingClosingBracket)
            }
            StackItem::TernaryLeft(_) => return state.fail(ExpressionError::MissingTernaryBranch),
            StackItem::Unary(token) => {
                let args = Self::take_values(state, 1)?;
                let operator = &self.unary_operators[token.text.as_str()];
                (operator.handler)(&args[0])
            }
            StackItem::Binary(token) => {
                let args = Self::take_values(state, 2)?;
                let operator = &self.binary_operators[token.text.as_str()];
                (operator.handler)(&args[0], &args[1])
            }
            StackItem::TernaryRight(_) => {
                let mut args = Self::take_values(state, 3)?;
                let condition = match &self.ternary {
                    Some(ternary) => (ternary.condition)(&args[0]),
                    None => return state.fail(ExpressionError::MalformedTernary),
                };
                let otherwise = args.pop().unwrap_or_default();
                let then = args.pop().unwrap_or_default();
                Ok(if condition { then } else { otherwise })
            }
        };

        match result {
            Ok(value) => {
                state.values.push(value);
                Ok(())
            }
            Err(error) => state.fail(error),
        }
    }

    /// Pops `count` values, returned in the order they were pushed.
    fn take_values(state: &mut ParseState<'_, T>, count: usize) -> Step<Vec<T>> {
        if state.values.len() < count {
            let missing = count - state.values.len();
            return state.fail(ExpressionError::MissingOperands(missing));
        }
        Ok(state.values.split_off(state.values.len() - count))
    }

    fn decode_literal(&self, state: &ParseState<'_, T>, token: &Token) -> Step<T> {
        let decoder = self
            .literals
            .iter()
            .find(|(regex, _)| regex.is_match(token.text.as_str()))
            .map(|(_, decoder)| decoder);
        match decoder {
            Some(decoder) => match decoder(token.text.as_str()) {
                Ok(value) => Ok(value),
                Err(error) => state.fail(error),
            },
            None => state.fail(ExpressionError::InvalidLiteral(token.text.text.clone())),
        }
    }
}
