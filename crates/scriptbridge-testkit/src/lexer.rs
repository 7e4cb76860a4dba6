//! Tokenizer with Python-style indentation tokens.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (line {line})")]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

const TWO_CHAR_OPS: [&str; 4] = ["==", "!=", "+=", "-="];
const ONE_CHAR_OPS: [&str; 13] = ["(", ")", "[", "]", "{", "}", ",", ":", ".", "=", "+", "-", ";"];
const TAB_WIDTH: usize = 8;

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    depth: usize,
    indents: Vec<usize>,
    tokens: Vec<Spanned>,
}

/// Split `source` into tokens.
///
/// # Errors
/// Returns the first lexical error.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, SyntaxError> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        depth: 0,
        indents: vec![0],
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer {
    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, token: Token) {
        self.tokens.push(Spanned {
            token,
            line: self.line,
        });
    }

    fn run(&mut self) -> Result<(), SyntaxError> {
        let mut at_line_start = true;
        while self.pos < self.chars.len() {
            if at_line_start && self.depth == 0 {
                at_line_start = false;
                if !self.indentation()? {
                    at_line_start = true;
                    continue;
                }
            }
            let c = self.chars[self.pos];
            match c {
                ' ' | '\t' | '\r' | '\x0c' => self.pos += 1,
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.pos += 2;
                    self.line += 1;
                }
                '\n' => {
                    if self.depth == 0 {
                        self.push(Token::Newline);
                        at_line_start = true;
                    }
                    self.pos += 1;
                    self.line += 1;
                }
                '#' => self.skip_comment(),
                '"' | '\'' => {
                    let s = self.string(false)?;
                    self.push(Token::Str(s));
                }
                c if c.is_ascii_digit() => self.number()?,
                c if c.is_alphabetic() || c == '_' => self.name()?,
                _ => self.operator(c)?,
            }
        }

        if self
            .tokens
            .last()
            .is_some_and(|t| !matches!(t.token, Token::Newline))
        {
            self.push(Token::Newline);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Token::Dedent);
        }
        self.push(Token::Eof);
        Ok(())
    }

    /// Handle leading whitespace. Returns `false` for blank or comment-only
    /// lines, which produce no tokens.
    fn indentation(&mut self) -> Result<bool, SyntaxError> {
        let mut col = 0;
        while let Some(c) = self.peek_at(0) {
            match c {
                ' ' => col += 1,
                '\t' => col = (col / TAB_WIDTH + 1) * TAB_WIDTH,
                '\x0c' | '\r' => {}
                _ => break,
            }
            self.pos += 1;
        }
        match self.peek_at(0) {
            None => return Ok(false),
            Some('\n') => {
                self.pos += 1;
                self.line += 1;
                return Ok(false);
            }
            Some('#') => {
                self.skip_comment();
                return Ok(false);
            }
            _ => {}
        }

        let current = self.indents.last().copied().unwrap_or(0);
        if col > current {
            self.indents.push(col);
            self.push(Token::Indent);
        } else {
            while self.indents.last().is_some_and(|&level| level > col) {
                self.indents.pop();
                self.push(Token::Dedent);
            }
            if self.indents.last() != Some(&col) {
                return Err(SyntaxError::new(
                    "unindent does not match any outer indentation level",
                    self.line,
                ));
            }
        }
        Ok(true)
    }

    fn skip_comment(&mut self) {
        while self.peek_at(0).is_some_and(|c| c != '\n') {
            self.pos += 1;
        }
    }

    fn string(&mut self, raw: bool) -> Result<String, SyntaxError> {
        let quote = self.chars[self.pos];
        let start_line = self.line;
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut out = String::new();
        loop {
            let Some(c) = self.peek_at(0) else {
                let what = if triple {
                    "unterminated triple-quoted string literal"
                } else {
                    "unterminated string literal"
                };
                return Err(SyntaxError::new(what, start_line));
            };
            if c == quote {
                if !triple {
                    self.pos += 1;
                    return Ok(out);
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    return Ok(out);
                }
            }
            match c {
                '\n' if !triple => {
                    return Err(SyntaxError::new("unterminated string literal", start_line));
                }
                '\n' => {
                    self.line += 1;
                    out.push(c);
                    self.pos += 1;
                }
                '\\' if !raw => {
                    let escaped = self.peek_at(1).ok_or_else(|| {
                        SyntaxError::new("unterminated string literal", start_line)
                    })?;
                    self.pos += 2;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' | '\'' | '"' => out.push(escaped),
                        '\n' => self.line += 1,
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                _ => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn number(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        let mut is_float = false;
        while let Some(c) = self.peek_at(0) {
            if c.is_ascii_digit() || c == '_' {
                self.pos += 1;
            } else if c == '.' && !is_float && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
                is_float = true;
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().filter(|&&c| c != '_').collect();
        let token = if is_float {
            text.parse().map(Token::Float).ok()
        } else {
            text.parse().map(Token::Int).ok()
        };
        let token = token.ok_or_else(|| SyntaxError::new(format!("invalid number {text:?}"), self.line))?;
        self.push(token);
        Ok(())
    }

    fn name(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        while self
            .peek_at(0)
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();

        if matches!(self.peek_at(0), Some('"' | '\'')) {
            match name.to_ascii_lowercase().as_str() {
                "r" => {
                    let s = self.string(true)?;
                    self.push(Token::Str(s));
                    return Ok(());
                }
                "u" | "b" => {
                    let s = self.string(false)?;
                    self.push(Token::Str(s));
                    return Ok(());
                }
                "f" | "rf" | "fr" => {
                    return Err(SyntaxError::new("f-strings are not supported", self.line));
                }
                _ => {}
            }
        }
        self.push(Token::Name(name));
        Ok(())
    }

    fn operator(&mut self, c: char) -> Result<(), SyntaxError> {
        let two: String = self.chars[self.pos..].iter().take(2).collect();
        if let Some(op) = TWO_CHAR_OPS.into_iter().find(|op| *op == two) {
            self.pos += 2;
            self.push(Token::Op(op));
            return Ok(());
        }
        let Some(op) = ONE_CHAR_OPS.into_iter().find(|op| op.starts_with(c)) else {
            return Err(SyntaxError::new(format!("invalid character {c:?}"), self.line));
        };
        match c {
            '(' | '[' | '{' => self.depth += 1,
            ')' | ']' | '}' => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
        self.pos += 1;
        self.push(Token::Op(op));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_simple_statement() {
        assert_eq!(
            kinds("x = 'a'; print(x)"),
            vec![
                Token::Name("x".into()),
                Token::Op("="),
                Token::Str("a".into()),
                Token::Op(";"),
                Token::Name("print".into()),
                Token::Op("("),
                Token::Name("x".into()),
                Token::Op(")"),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_indent_and_dedent() {
        let tokens = kinds("if x:\n    y\n\n    # note\nz\n");
        assert!(tokens.contains(&Token::Indent));
        let dedent = tokens.iter().position(|t| *t == Token::Dedent).unwrap();
        assert_eq!(tokens[dedent + 1], Token::Name("z".into()));
    }

    #[test]
    fn test_brackets_join_lines() {
        let tokens = kinds("d = {\n  'a': 1,\n}\n");
        assert_eq!(tokens.iter().filter(|t| **t == Token::Newline).count(), 1);
    }

    #[test]
    fn test_triple_quoted_and_escapes() {
        let tokens = kinds("s = \"\"\"a\nb\"\"\"\nt = 'x\\ty'");
        assert_eq!(tokens[2], Token::Str("a\nb".into()));
        assert_eq!(tokens[6], Token::Str("x\ty".into()));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("1_000 2.5")[..2], [Token::Int(1000), Token::Float(2.5)]);
    }

    #[test]
    fn test_errors_carry_lines() {
        let err = tokenize("a = 1\nb = '''never").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("triple-quoted"));

        let err = tokenize("if x:\n    y\n  z").unwrap_err();
        assert!(err.message.contains("unindent"));
    }
}
