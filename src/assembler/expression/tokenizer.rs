use regex::Regex;

use crate::assembler::{
    error::CompileErrorList, expression::ExpressionError, source_position::PositionedString,
};

/// Number of characters of unmatched input shown in an error.
const UNRECOGNIZED_PREVIEW_LENGTH: usize = 20;

/// TokenKind defines the kinds of lexemes found in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Placeholder for "no token", e.g. before the first token has been read
    Invalid,
    /// Unary or binary operator, the arity is decided by the compiler
    Operator,
    /// Number or character literal
    Literal,
    /// `(`
    LeftBracket,
    /// `)`
    RightBracket,
    /// Reference to a named symbol, e.g. a constant or a label
    Constant,
    /// Name of a function, always followed by a bracketed argument list
    FunctionName,
    /// `?`
    TernaryLeft,
    /// `:`
    TernaryRight,
    /// `,` separating function arguments
    Comma,
}

/// Token is a lexical unit of an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Positioned text of the token
    pub text: PositionedString,
    pub kind: TokenKind,
    /// Byte offset of the token inside the expression
    pub index: usize,
}

/// A single pattern rule, the pattern is matched at the start of the unconsumed input.
#[derive(Debug, Clone)]
pub struct TokenRule {
    pub pattern: String,
    pub kind: TokenKind,
}

impl TokenRule {
    pub fn new(pattern: &str, kind: TokenKind) -> Self {
        Self {
            pattern: pattern.to_owned(),
            kind,
        }
    }
}

/// Splits expressions into tokens using an ordered list of rules where the first matching rule
/// wins.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    rules: Vec<(Regex, TokenKind)>,
}

impl Tokenizer {
    pub fn new(rules: &[TokenRule]) -> Result<Self, regex::Error> {
        let rules = rules
            .iter()
            .map(|rule| -> Result<_, regex::Error> {
                Ok((Regex::new(&format!("^(?:{})", rule.pattern))?, rule.kind))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    fn match_rule(&self, input: &str) -> Option<(usize, TokenKind)> {
        self.rules.iter().find_map(|(regex, kind)| {
            regex
                .find(input)
                .filter(|m| !m.as_str().is_empty())
                .map(|m| (m.end(), *kind))
        })
    }

    /// Tokenizes the whole expression.
    ///
    /// Returns `None` and records an error if some part of the input matches no rule.
    #[tracing::instrument(skip(self, errors))]
    pub fn tokenize(
        &self,
        data: &PositionedString,
        errors: &mut CompileErrorList,
    ) -> Option<Vec<Token>> {
        let text = data.as_str();
        let mut tokens = Vec::new();
        let mut position = 0;

        loop {
            let rest = &text[position..];
            let trimmed = rest.trim_start();
            position += rest.len() - trimmed.len();
            if trimmed.is_empty() {
                break;
            }

            match self.match_rule(trimmed) {
                Some((length, kind)) => {
                    tokens.push(Token {
                        text: data.slice(position, length),
                        kind,
                        index: position,
                    });
                    position += length;
                }
                None => {
                    let preview: String = trimmed.chars().take(UNRECOGNIZED_PREVIEW_LENGTH).collect();
                    errors.push_error(
                        data.slice(position, trimmed.len()).span,
                        ExpressionError::UnrecognizedToken(preview),
                    );
                    return None;
                }
            }
        }

        tracing::trace!(count = tokens.len(), "tokenized expression");
        Some(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::source_position::SourcePosition;

    use pretty_assertions::assert_eq;

    fn tokenizer() -> Tokenizer {
        Tokenizer::new(&[
            TokenRule::new("[0-9]+", TokenKind::Literal),
            TokenRule::new("<<", TokenKind::Operator),
            TokenRule::new("<|\\+", TokenKind::Operator),
            TokenRule::new("\\(", TokenKind::LeftBracket),
            TokenRule::new("\\)", TokenKind::RightBracket),
            TokenRule::new("[A-Za-z_][A-Za-z0-9_]*", TokenKind::Constant),
        ])
        .unwrap()
    }

    fn kinds_and_text(tokens: &[Token]) -> Vec<(TokenKind, &str)> {
        tokens.iter().map(|t| (t.kind, t.text.as_str())).collect()
    }

    #[test]
    fn test_tokenize() {
        let mut errors = CompileErrorList::new();
        let input = PositionedString::at("  (a +12)<< 3", SourcePosition::default());
        let tokens = tokenizer().tokenize(&input, &mut errors).unwrap();

        assert!(errors.is_empty());
        assert_eq!(
            kinds_and_text(&tokens),
            vec![
                (TokenKind::LeftBracket, "("),
                (TokenKind::Constant, "a"),
                (TokenKind::Operator, "+"),
                (TokenKind::Literal, "12"),
                (TokenKind::RightBracket, ")"),
                (TokenKind::Operator, "<<"),
                (TokenKind::Literal, "3"),
            ]
        );
        assert_eq!(tokens[3].index, 6);
        assert_eq!(tokens[3].text.span.start, SourcePosition::new(1, 7));
    }

    #[test]
    fn test_first_rule_wins() {
        // `<<` is listed before `<`, so it must not be split up
        let mut errors = CompileErrorList::new();
        let input = PositionedString::unpositioned("1<<2<3");
        let tokens = tokenizer().tokenize(&input, &mut errors).unwrap();
        let operators: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Operator)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(operators, vec!["<<", "<"]);
    }

    #[test]
    fn test_unrecognized_input() {
        let mut errors = CompileErrorList::new();
        let input = PositionedString::unpositioned("1 + $abcdefghijklmnopqrstuvwxyz");
        let tokens = tokenizer().tokenize(&input, &mut errors);

        assert!(tokens.is_none());
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.iter().next().unwrap().kind,
            ExpressionError::UnrecognizedToken("$abcdefghijklmnopqrs".to_string()).into()
        );
    }

    #[test]
    fn test_empty_input() {
        let mut errors = CompileErrorList::new();
        let tokens = tokenizer()
            .tokenize(&PositionedString::unpositioned("   "), &mut errors)
            .unwrap();
        assert!(tokens.is_empty());
        assert!(errors.is_empty());
    }
}
