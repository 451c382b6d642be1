//! C-like integer expressions over `i64`.
//!
//! Precedence follows C: multiplicative operators bind tightest, logical or loosest. All
//! arithmetic wraps on overflow.

use lazy_static::lazy_static;

use super::{
    definition::TernaryOperator, BinaryOperator, ExpressionCompiler, ExpressionDefinition,
    ExpressionError, Function, Literal, UnaryOperator, ValueLookup,
};
use crate::assembler::{error::CompileErrorList, source_position::PositionedString};

pub type Value = i64;

type Binary = BinaryOperator<Value>;
type Unary = UnaryOperator<Value>;
type Call = Function<Value>;

pub const CONSTANT_PATTERN: &str = "[_A-Za-z][_A-Za-z0-9]*";

fn boolean(value: bool) -> Value {
    value as Value
}

fn shift_amount(amount: Value) -> u32 {
    (amount & 0x3f) as u32
}

fn divide(a: &Value, b: &Value) -> Result<Value, ExpressionError> {
    if *b == 0 {
        return Err(ExpressionError::DivisionByZero);
    }
    Ok(a.wrapping_div(*b))
}

fn remainder(a: &Value, b: &Value) -> Result<Value, ExpressionError> {
    if *b == 0 {
        return Err(ExpressionError::DivisionByZero);
    }
    Ok(a.wrapping_rem(*b))
}

fn parse_radix(text: &str, radix: u32) -> Result<Value, ExpressionError> {
    u64::from_str_radix(text, radix)
        .map(|v| v as Value)
        .map_err(|_| ExpressionError::InvalidLiteral(text.to_owned()))
}

fn decode_hexadecimal(text: &str) -> Result<Value, ExpressionError> {
    parse_radix(&text[2..], 16)
}

fn decode_binary(text: &str) -> Result<Value, ExpressionError> {
    parse_radix(&text[2..], 2)
}

fn decode_decimal(text: &str) -> Result<Value, ExpressionError> {
    parse_radix(text, 10)
}

fn decode_character(text: &str) -> Result<Value, ExpressionError> {
    let invalid = || ExpressionError::InvalidLiteral(text.to_owned());
    let inner = text
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .ok_or_else(invalid)?;
    let mut chars = inner.chars();
    let ch = match (chars.next(), chars.next(), chars.next()) {
        (Some('\\'), Some(escaped), None) => match escaped {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '\\' => '\\',
            '\'' => '\'',
            _ => return Err(invalid()),
        },
        (Some(ch), None, None) => ch,
        _ => return Err(invalid()),
    };
    Ok(ch as Value)
}

fn binary_operators() -> Vec<BinaryOperator<Value>> {
    vec![
        Binary::left("*", 30, |a, b| Ok(a.wrapping_mul(*b))),
        Binary::left("/", 30, divide),
        Binary::left("%", 30, remainder),
        Binary::left("+", 40, |a, b| Ok(a.wrapping_add(*b))),
        Binary::left("-", 40, |a, b| Ok(a.wrapping_sub(*b))),
        Binary::left("<<", 50, |a, b| Ok(a.wrapping_shl(shift_amount(*b)))),
        Binary::left(">>", 50, |a, b| Ok(a.wrapping_shr(shift_amount(*b)))),
        Binary::left("<", 60, |a, b| Ok(boolean(a < b))),
        Binary::left("<=", 60, |a, b| Ok(boolean(a <= b))),
        Binary::left(">", 60, |a, b| Ok(boolean(a > b))),
        Binary::left(">=", 60, |a, b| Ok(boolean(a >= b))),
        Binary::left("==", 70, |a, b| Ok(boolean(a == b))),
        Binary::left("!=", 70, |a, b| Ok(boolean(a != b))),
        Binary::left("&", 80, |a, b| Ok(a & b)),
        Binary::left("^", 90, |a, b| Ok(a ^ b)),
        Binary::left("|", 100, |a, b| Ok(a | b)),
        Binary::left("&&", 110, |a, b| Ok(boolean(*a != 0 && *b != 0))),
        Binary::left("||", 120, |a, b| Ok(boolean(*a != 0 || *b != 0))),
    ]
}

fn unary_operators() -> Vec<UnaryOperator<Value>> {
    vec![
        Unary::new("+", |a| Ok(*a)),
        Unary::new("-", |a| Ok(a.wrapping_neg())),
        Unary::new("!", |a| Ok(boolean(*a == 0))),
        Unary::new("~", |a| Ok(!a)),
    ]
}

fn functions() -> Vec<Function<Value>> {
    vec![
        Call::new("min", 2, |args| Ok(args[0].min(args[1]))),
        Call::new("max", 2, |args| Ok(args[0].max(args[1]))),
        Call::new("abs", 1, |args| Ok(args[0].wrapping_abs())),
    ]
}

/// The C-like dialect: integer literals in hex, binary, decimal and character notation.
pub fn definition() -> ExpressionDefinition<Value> {
    ExpressionDefinition {
        binary_operators: binary_operators(),
        unary_operators: unary_operators(),
        functions: functions(),
        literals: vec![
            Literal::new("0x[0-9a-fA-F]+", decode_hexadecimal),
            Literal::new("0b[01]+", decode_binary),
            Literal::new("[0-9]+", decode_decimal),
            Literal::new(r"'(?:\\.|[^'\\])'", decode_character),
        ],
        ternary: Some(TernaryOperator {
            left: "?".to_owned(),
            right: ":".to_owned(),
            precedence: 130,
            condition: |a: &Value| *a != 0,
        }),
        constant: CONSTANT_PATTERN.to_owned(),
        left_bracket: r"\(".to_owned(),
        right_bracket: r"\)".to_owned(),
        comma: ",".to_owned(),
    }
}

lazy_static! {
    static ref COMPILER: Option<ExpressionCompiler<Value>> = match ExpressionCompiler::new(definition()) {
        Ok(compiler) => Some(compiler),
        Err(error) => {
            tracing::error!(%error, "invalid expression definition");
            None
        }
    };
}

pub fn compiler() -> Option<&'static ExpressionCompiler<Value>> {
    COMPILER.as_ref()
}

/// Compiles an integer expression, recording failures in `errors` and returning `None`.
pub fn try_compile(
    expression: &PositionedString,
    symbols: &dyn ValueLookup<Value>,
    errors: &mut CompileErrorList,
) -> Option<Value> {
    compiler()?.try_compile(expression, symbols, errors)
}

/// Compiles an integer expression, evaluating to `0` on failure.
pub fn compile(
    expression: &PositionedString,
    symbols: &dyn ValueLookup<Value>,
    errors: &mut CompileErrorList,
) -> Value {
    try_compile(expression, symbols, errors).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::assembler::expression::NoSymbols;

    use pretty_assertions::assert_eq;

    fn eval(expression: &str) -> Result<Value, CompileErrorList> {
        let mut errors = CompileErrorList::new();
        match try_compile(
            &PositionedString::unpositioned(expression),
            &NoSymbols,
            &mut errors,
        ) {
            Some(value) => Ok(value),
            None => Err(errors),
        }
    }

    fn error_of(expression: &str) -> ExpressionError {
        let errors = eval(expression).unwrap_err();
        match &errors.iter().next().unwrap().kind {
            crate::assembler::error::CompileErrorKind::Expression(error) => error.clone(),
            other => panic!("unexpected error kind {:?}", other),
        }
    }

    #[test]
    fn test_literals() {
        assert_eq!(eval("0xff"), Ok(255));
        assert_eq!(eval("0b101"), Ok(5));
        assert_eq!(eval("42"), Ok(42));
        assert_eq!(eval("'A'"), Ok(65));
        assert_eq!(eval(r"'\n'"), Ok(10));
        assert_eq!(eval("0xffffffffffffffff"), Ok(-1));
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("2 + 3 * 4"), Ok(14));
        assert_eq!(eval("(2+3)*(4+5)"), Ok(45));
        assert_eq!(eval("1 << 2 + 1"), Ok(8));
        assert_eq!(eval("1 | 2 & 3"), Ok(3));
        assert_eq!(eval("1 + 2 == 3 && 4 > 3"), Ok(1));
    }

    #[test]
    fn test_left_associativity() {
        assert_eq!(eval("10 - 4 - 3"), Ok(3));
        assert_eq!(eval("64 / 4 / 2"), Ok(8));
        assert_eq!(eval("7 % 4 * 3"), Ok(9));
    }

    #[test]
    fn test_unary() {
        assert_eq!(eval("-3"), Ok(-3));
        assert_eq!(eval("2 * -3"), Ok(-6));
        assert_eq!(eval("-2 * 3 + 1"), Ok(-5));
        assert_eq!(eval("--4"), Ok(4));
        assert_eq!(eval("!0 + ~0"), Ok(0));
        assert_eq!(eval("-(1 + 2)"), Ok(-3));
    }

    #[test]
    fn test_ternary() {
        assert_eq!(eval("1 ? 2 : 3"), Ok(2));
        assert_eq!(eval("0 ? 2 : 3 + 4"), Ok(7));
        assert_eq!(eval("0 ? 1 : 0 ? 2 : 3"), Ok(3));
        assert_eq!(eval("1 ? 0 ? 5 : 6 : 7"), Ok(6));
        assert_eq!(eval("(1 > 2 ? 10 : 20) * 2"), Ok(40));
    }

    #[test]
    fn test_functions() {
        assert_eq!(eval("max(3, 7)"), Ok(7));
        assert_eq!(eval("min(3, 7) + abs(-2)"), Ok(5));
        assert_eq!(eval("max(1 + 1, min(10, 4 * 2))"), Ok(8));
    }

    #[test]
    fn test_symbols() {
        let mut symbols = HashMap::new();
        symbols.insert("BASE".to_string(), 0x100);
        symbols.insert("_offset2".to_string(), 4);

        let mut errors = CompileErrorList::new();
        let value = compile(
            &PositionedString::unpositioned("BASE + _offset2 * 2"),
            &symbols,
            &mut errors,
        );
        assert!(errors.is_empty());
        assert_eq!(value, 0x108);
    }

    #[test]
    fn test_errors() {
        assert_eq!(error_of("1 +"), ExpressionError::MissingOperands(1));
        assert_eq!(error_of("(1 + 2"), ExpressionError::MissingClosingBracket);
        assert_eq!(error_of("1 + 2)"), ExpressionError::MissingOpeningBracket);
        assert_eq!(error_of("1 / 0"), ExpressionError::DivisionByZero);
        assert_eq!(error_of("4 % (2 - 2)"), ExpressionError::DivisionByZero);
        assert_eq!(
            error_of("foo + 1"),
            ExpressionError::UnknownSymbol("foo".to_string())
        );
        assert_eq!(error_of("1 2"), ExpressionError::MalformedExpression);
        assert_eq!(error_of(""), ExpressionError::MalformedExpression);
        assert_eq!(error_of("1 : 2"), ExpressionError::MalformedTernary);
        assert_eq!(error_of("1 ? 2"), ExpressionError::MissingTernaryBranch);
        assert_eq!(error_of("1, 2"), ExpressionError::UnexpectedComma);
        assert_eq!(
            error_of("max(1)"),
            ExpressionError::WrongArgumentCount {
                function: "max".to_string(),
                expected: 2,
                found: 1
            }
        );
        assert_eq!(error_of("max(1 2)"), ExpressionError::MalformedExpression);
        assert_eq!(error_of("max(1,,2)"), ExpressionError::MalformedExpression);
        assert_eq!(error_of("max(, 1)"), ExpressionError::MalformedExpression);
        assert_eq!(
            error_of("abs()"),
            ExpressionError::WrongArgumentCount {
                function: "abs".to_string(),
                expected: 1,
                found: 0
            }
        );
        assert_eq!(
            error_of("abs 1"),
            ExpressionError::MissingFunctionArguments("abs".to_string())
        );
        assert_eq!(
            error_of("1 # 2"),
            ExpressionError::UnrecognizedToken("# 2".to_string())
        );
    }

    #[test]
    fn test_compile_defaults_to_zero() {
        let mut errors = CompileErrorList::new();
        let value = compile(
            &PositionedString::unpositioned("1 +"),
            &NoSymbols,
            &mut errors,
        );
        assert_eq!(value, 0);
        assert!(errors.has_errors());
    }

    #[test]
    fn test_error_position() {
        use crate::assembler::source_position::SourcePosition;

        let mut errors = CompileErrorList::new();
        let input = PositionedString::at("1 + nope", SourcePosition::new(4, 10));
        compile(&input, &NoSymbols, &mut errors);
        assert_eq!(
            errors.iter().next().unwrap().span.start,
            SourcePosition::new(4, 14)
        );
    }
}
