//! Tokenizer for directive arguments and placeholder expressions.

use super::error::{LegacyError, LegacyResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Assign,
    Op(&'static str),
}

pub fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

const OPERATORS: &[&str] = &["==", "!=", "<=", ">=", "<", ">", "+", "-", "*", "/", "%"];

/// Splits an expression into tokens. A `$` before a name is optional and
/// dropped.
pub fn tokenize(input: &str) -> LegacyResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '$' if chars.get(i + 1).copied().is_some_and(is_ident_start) => i += 1,
            c if is_ident_start(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let is_float = chars.get(i) == Some(&'.')
                    && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit());
                if is_float {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let token = if is_float {
                    text.parse().map(Token::Float).ok()
                } else {
                    text.parse().map(Token::Int).ok()
                };
                tokens.push(token.ok_or_else(|| {
                    LegacyError::type_error(format!("invalid number literal '{text}'"))
                })?);
            }
            '\'' | '"' => {
                let (literal, next) = read_string(&chars, i)?;
                tokens.push(Token::Str(literal));
                i = next;
            }
            '(' => push(&mut tokens, &mut i, Token::LParen),
            ')' => push(&mut tokens, &mut i, Token::RParen),
            '[' => push(&mut tokens, &mut i, Token::LBracket),
            ']' => push(&mut tokens, &mut i, Token::RBracket),
            ',' => push(&mut tokens, &mut i, Token::Comma),
            '.' => push(&mut tokens, &mut i, Token::Dot),
            _ => {
                let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
                match OPERATORS.iter().find(|op| rest.starts_with(**op)) {
                    Some(&op) => {
                        tokens.push(Token::Op(op));
                        i += op.len();
                    }
                    None if c == '=' => push(&mut tokens, &mut i, Token::Assign),
                    None => {
                        return Err(LegacyError::type_error(format!(
                            "unexpected character '{c}' in expression"
                        )))
                    }
                }
            }
        }
    }

    Ok(tokens)
}

fn push(tokens: &mut Vec<Token>, i: &mut usize, token: Token) {
    tokens.push(token);
    *i += 1;
}

fn read_string(chars: &[char], start: usize) -> LegacyResult<(String, usize)> {
    let quote = chars[start];
    let mut literal = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                literal.push(match chars[i + 1] {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                i += 2;
            }
            c if c == quote => return Ok((literal, i + 1)),
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }
    Err(LegacyError::type_error("unterminated string literal"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_comparison_with_sigils() {
        let tokens = tokenize("$arch == 'x86_64'").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("arch".into()),
                Token::Op("=="),
                Token::Str("x86_64".into())
            ]
        );
    }

    #[test]
    fn tokenizes_numbers_and_calls() {
        let tokens = tokenize("getVar('size', 10.5)").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("getVar".into()),
                Token::LParen,
                Token::Str("size".into()),
                Token::Comma,
                Token::Float(10.5),
                Token::RParen
            ]
        );
    }

    #[test]
    fn assignment_is_distinct_from_equality() {
        let tokens = tokenize("$x = 1").unwrap();
        assert_eq!(tokens, vec![Token::Ident("x".into()), Token::Assign, Token::Int(1)]);
    }

    #[test]
    fn string_escapes() {
        let tokens = tokenize(r#""a\"b\n""#).unwrap();
        assert_eq!(tokens, vec![Token::Str("a\"b\n".into())]);
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(tokenize("'open").is_err());
    }
}
