//! Tokenizer for condition source text.

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Number(String),
    Ident(String),
    Dollar,
    True,
    False,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Gt,
    Ge,
    Lt,
    Le,
    EqEq,
    Ne,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Self::Number(n) => format!("number {n}"),
            Self::Ident(i) => format!("identifier \"{i}\""),
            Self::Dollar => "\"$\"".to_string(),
            Self::True => "true".to_string(),
            Self::False => "false".to_string(),
            Self::And => "AND".to_string(),
            Self::Or => "OR".to_string(),
            Self::Not => "NOT".to_string(),
            Self::Plus => "\"+\"".to_string(),
            Self::Minus => "\"-\"".to_string(),
            Self::Star => "\"*\"".to_string(),
            Self::Slash => "\"/\"".to_string(),
            Self::LParen => "\"(\"".to_string(),
            Self::RParen => "\")\"".to_string(),
            Self::Gt => "\">\"".to_string(),
            Self::Ge => "\">=\"".to_string(),
            Self::Lt => "\"<\"".to_string(),
            Self::Le => "\"<=\"".to_string(),
            Self::EqEq => "\"==\"".to_string(),
            Self::Ne => "\"!=\"".to_string(),
        }
    }
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub fn tokenize(src: &str) -> Result<Vec<Spanned>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let starts_number =
            c.is_ascii_digit() || (c == '.' && src[offset + 1..].starts_with(|d: char| d.is_ascii_digit()));
        if starts_number {
            let mut end = offset;
            while let Some(&(i, d)) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    end = i + d.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Spanned {
                token: Token::Number(src[offset..end].to_string()),
                offset,
            });
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let mut end = offset;
            while let Some(&(i, d)) = chars.peek() {
                if d.is_ascii_alphanumeric() || d == '_' {
                    end = i + d.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let word = &src[offset..end];
            let token = match word.to_ascii_lowercase().as_str() {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "true" => Token::True,
                "false" => Token::False,
                _ => Token::Ident(word.to_string()),
            };
            tokens.push(Spanned { token, offset });
            continue;
        }

        chars.next();
        let next_is = |chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>, want: char| {
            if chars.peek().map(|&(_, n)| n) == Some(want) {
                chars.next();
                true
            } else {
                false
            }
        };
        let token = match c {
            '$' => Token::Dollar,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' | '×' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '>' if next_is(&mut chars, '=') => Token::Ge,
            '>' => Token::Gt,
            '<' if next_is(&mut chars, '=') => Token::Le,
            '<' => Token::Lt,
            '=' if next_is(&mut chars, '=') => Token::EqEq,
            '=' => return Err(ParseError::at(offset, "use \"==\" for equality")),
            '!' if next_is(&mut chars, '=') => Token::Ne,
            '!' => Token::Not,
            '&' if next_is(&mut chars, '&') => Token::And,
            '|' if next_is(&mut chars, '|') => Token::Or,
            other => {
                return Err(ParseError::at(
                    offset,
                    format!("unexpected character '{other}'"),
                ))
            }
        };
        tokens.push(Spanned { token, offset });
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            kinds("a and B Or not c"),
            vec![
                Token::Ident("a".into()),
                Token::And,
                Token::Ident("B".into()),
                Token::Or,
                Token::Not,
                Token::Ident("c".into()),
            ]
        );
    }

    #[test]
    fn symbolic_operators() {
        assert_eq!(
            kinds(">= <= == != && || ! × $"),
            vec![
                Token::Ge,
                Token::Le,
                Token::EqEq,
                Token::Ne,
                Token::And,
                Token::Or,
                Token::Not,
                Token::Star,
                Token::Dollar,
            ]
        );
    }

    #[test]
    fn numbers_and_offsets() {
        let tokens = tokenize("spend > 0.8").unwrap();
        assert_eq!(tokens[2].token, Token::Number("0.8".into()));
        assert_eq!(tokens[2].offset, 8);
        assert_eq!(kinds(".5"), vec![Token::Number(".5".into())]);
    }

    #[test]
    fn single_equals_is_rejected_with_hint() {
        let err = tokenize("conversions = 0").unwrap_err();
        assert_eq!(err.column, 13);
        assert!(err.message.contains("=="));
    }

    #[test]
    fn unknown_character_is_rejected() {
        assert!(tokenize("spend # 3").is_err());
        assert!(tokenize("a & b").is_err());
    }
}
