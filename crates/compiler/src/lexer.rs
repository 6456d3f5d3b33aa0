//! Lexer for SIN source text.
//!
//! A character-classification state machine: each call to the tokenizer
//! inspects the next character to decide which class of token to read.
//! Comments start with `#` and run to the end of the line.
//!
//! `asm< dialect > { ... }` blocks are captured raw: the lexer emits the
//! `asm` keyword, a tag token with the dialect, and a body token with the
//! unlexed assembly text, so assembly syntax never has to survive the SIN
//! tokenizer.

use crate::error::ParserError;

/// Token classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Int,
    Float,
    Str,
    Bool,
    Ident,
    Keyword,
    Punc,
    Op,
    AsmTag,
    AsmBody,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub line: usize,
}

impl Token {
    fn new(kind: TokenKind, value: impl Into<String>, line: usize) -> Self {
        Token {
            kind,
            value: value.into(),
            line,
        }
    }

    pub fn is(&self, kind: TokenKind, value: &str) -> bool {
        self.kind == kind && self.value == value
    }
}

pub const KEYWORDS: &[&str] = &[
    "alloc", "let", "if", "else", "while", "def", "return", "include", "decl", "free", "asm",
    "pass", "sizeof", "int", "float", "bool", "string", "void", "ptr", "array", "struct", "raw",
    "const", "static", "dynamic", "signed", "unsigned", "and", "or", "not",
];

fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

fn is_op_char(c: char) -> bool {
    matches!(
        c,
        '+' | '-' | '*' | '/' | '&' | '|' | '^' | '%' | '<' | '>' | '=' | '!' | '@' | '?' | '$'
    )
}

fn is_punc(c: char) -> bool {
    matches!(c, '.' | ',' | ';' | ':' | '(' | ')' | '{' | '}' | '[' | ']')
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            chars: source.chars().peekable(),
            line: 1,
        }
    }

    /// Tokenize the whole input.
    pub fn tokenize(source: &'a str) -> Result<Vec<Token>, ParserError> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        while let Some(token) = lexer.next_token()? {
            let lex_asm = token.is(TokenKind::Keyword, "asm");
            tokens.push(token);
            if lex_asm {
                lexer.lex_asm_block(&mut tokens)?;
            }
        }
        Ok(tokens)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.chars.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, ParserError> {
        self.skip_whitespace_and_comments();
        let line = self.line;
        let Some(&c) = self.chars.peek() else {
            return Ok(None);
        };

        if c.is_ascii_digit() {
            return Ok(Some(self.read_number(line)));
        }
        if c == '"' {
            return self.read_string(line).map(Some);
        }
        if c.is_ascii_alphabetic() || c == '_' {
            return Ok(Some(self.read_word(line)));
        }
        if is_op_char(c) {
            return Ok(Some(self.read_operator(line)));
        }
        if is_punc(c) {
            self.bump();
            return Ok(Some(Token::new(TokenKind::Punc, c, line)));
        }

        Err(ParserError::plain(
            format!("unexpected character '{}'", c),
            line,
        ))
    }

    fn read_number(&mut self, line: usize) -> Token {
        let mut text = String::new();
        let mut is_float = false;
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else if c == '.' && !is_float {
                // a decimal point makes it a float; a second one ends it
                is_float = true;
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let kind = if is_float { TokenKind::Float } else { TokenKind::Int };
        Token::new(kind, text, line)
    }

    fn read_string(&mut self, line: usize) -> Result<Token, ParserError> {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some(other) => text.push(other),
                    None => {
                        return Err(ParserError::plain("unexpected end of file in string", line))
                    }
                },
                Some(c) => text.push(c),
                None => return Err(ParserError::plain("unexpected end of file in string", line)),
            }
        }
        Ok(Token::new(TokenKind::Str, text, line))
    }

    fn read_word(&mut self, line: usize) -> Token {
        let mut text = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let kind = if text == "true" || text == "false" {
            TokenKind::Bool
        } else if is_keyword(&text) {
            TokenKind::Keyword
        } else {
            TokenKind::Ident
        };
        Token::new(kind, text, line)
    }

    fn read_operator(&mut self, line: usize) -> Token {
        let first = self.bump().unwrap_or_default();
        // two-character comparisons
        if matches!(first, '!' | '<' | '>') && self.chars.peek() == Some(&'=') {
            self.bump();
            return Token::new(TokenKind::Op, format!("{}=", first), line);
        }
        Token::new(TokenKind::Op, first, line)
    }

    /// Capture `< dialect > { raw assembly }` following the `asm` keyword.
    fn lex_asm_block(&mut self, tokens: &mut Vec<Token>) -> Result<(), ParserError> {
        self.skip_whitespace_and_comments();
        let line = self.line;
        if self.bump() != Some('<') {
            return Err(ParserError::plain("expected '<' after 'asm'", line));
        }
        let mut dialect = String::new();
        loop {
            match self.bump() {
                Some('>') => break,
                Some(c) if c.is_ascii_alphanumeric() || c == '_' => dialect.push(c),
                Some(c) if c.is_whitespace() => {}
                _ => {
                    return Err(ParserError::plain(
                        "expected assembly dialect in angle brackets",
                        line,
                    ))
                }
            }
        }
        tokens.push(Token::new(TokenKind::AsmTag, dialect, line));

        self.skip_whitespace_and_comments();
        let body_line = self.line;
        if self.bump() != Some('{') {
            return Err(ParserError::plain("expected '{' to open asm block", body_line));
        }
        let mut body = String::new();
        let mut depth = 1usize;
        loop {
            match self.bump() {
                Some('{') => {
                    depth += 1;
                    body.push('{');
                }
                Some('}') => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    body.push('}');
                }
                Some(c) => body.push(c),
                None => {
                    return Err(ParserError::plain(
                        "unexpected end of file in asm block",
                        body_line,
                    ))
                }
            }
        }
        tokens.push(Token::new(TokenKind::AsmBody, body, body_line));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<(TokenKind, String)> {
        Lexer::tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.value))
            .collect()
    }

    #[test]
    fn test_allocation_statement() {
        let tokens = kinds("alloc int x: 10;");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Keyword, "alloc".to_string()),
                (TokenKind::Keyword, "int".to_string()),
                (TokenKind::Ident, "x".to_string()),
                (TokenKind::Punc, ":".to_string()),
                (TokenKind::Int, "10".to_string()),
                (TokenKind::Punc, ";".to_string()),
            ]
        );
    }

    #[test]
    fn test_line_numbers() {
        let tokens = Lexer::tokenize("let x = 1;\nlet y = 2;").unwrap();
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[5].line, 2);
    }

    #[test]
    fn test_comments_skipped() {
        let tokens = kinds("# a comment\nfree x; # trailing");
        assert_eq!(tokens[0], (TokenKind::Keyword, "free".to_string()));
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn test_two_char_operators() {
        let tokens = kinds("a != b >= c <= d");
        assert!(tokens.contains(&(TokenKind::Op, "!=".to_string())));
        assert!(tokens.contains(&(TokenKind::Op, ">=".to_string())));
        assert!(tokens.contains(&(TokenKind::Op, "<=".to_string())));
    }

    #[test]
    fn test_string_literal_with_escapes() {
        let tokens = kinds(r#"let s = "ab\ncd";"#);
        assert!(tokens.contains(&(TokenKind::Str, "ab\ncd".to_string())));
    }

    #[test]
    fn test_float_and_int_literals() {
        let tokens = kinds("1.5 42");
        assert_eq!(tokens[0], (TokenKind::Float, "1.5".to_string()));
        assert_eq!(tokens[1], (TokenKind::Int, "42".to_string()));
    }

    #[test]
    fn test_bool_literals() {
        let tokens = kinds("true false");
        assert_eq!(tokens[0].0, TokenKind::Bool);
        assert_eq!(tokens[1].0, TokenKind::Bool);
    }

    #[test]
    fn test_asm_block_is_captured_raw() {
        let tokens = kinds("asm<sinasm16> {\n\tloada #$01\n}");
        assert_eq!(tokens[0], (TokenKind::Keyword, "asm".to_string()));
        assert_eq!(tokens[1], (TokenKind::AsmTag, "sinasm16".to_string()));
        assert_eq!(tokens[2].0, TokenKind::AsmBody);
        assert!(tokens[2].1.contains("loada #$01"));
    }

    #[test]
    fn test_unexpected_character_rejected() {
        assert!(Lexer::tokenize("let x = `;").is_err());
    }
}
