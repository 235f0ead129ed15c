// ABOUTME: Lexer turning Lunite source text into a located token stream

use crate::error::LuniteError;
use crate::token::{Keyword, Location, Token, TokenKind};

/// Consumes a character stream and emits tokens on demand.
///
/// Tracks line/column across `advance()` the same way the reference
/// implementation's `Lexer.get_next_token()` loop does, skipping whitespace
/// and comments (`~~` line, `~* ... *~` block) before each token.
pub struct Lexer<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn loc(&self) -> Location {
        Location::new(self.line, self.col)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('~') if self.peek_at(1) == Some('~') => {
                    // line comment
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('~') if self.peek_at(1) == Some('*') => {
                    // block comment, non-nesting
                    self.advance();
                    self.advance();
                    loop {
                        match self.peek() {
                            None => break,
                            Some('*') if self.peek_at(1) == Some('~') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            _ => {
                                self.advance();
                            }
                        }
                    }
                }
                _ => break,
            }
        }
    }

    /// Returns the next token, or a located syntax error for malformed input.
    pub fn next_token(&mut self) -> Result<Token, LuniteError> {
        self.skip_whitespace_and_comments();
        let loc = self.loc();

        let c = match self.peek() {
            None => return Ok(Token::new(TokenKind::Eof, loc)),
            Some(c) => c,
        };

        if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit()))
        {
            return self.read_number(loc);
        }

        if c == '_' || c.is_alphabetic() {
            return Ok(self.read_ident_or_keyword(loc));
        }

        if c == '"' {
            return self.read_string(loc);
        }

        if c == '\'' {
            return self.read_char(loc);
        }

        self.read_operator(loc)
    }

    /// Tokenizes the entire source, terminated by a single `Eof` token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LuniteError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn read_number(&mut self, loc: Location) -> Result<Token, LuniteError> {
        let mut text = String::new();
        let mut seen_dot = false;

        if self.peek() == Some('.') {
            seen_dot = true;
            text.push('.');
            self.advance();
        }

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else if c == '.' && !seen_dot {
                seen_dot = true;
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }

        if seen_dot {
            let value: f64 = text.parse().map_err(|_| {
                LuniteError::syntax(format!("invalid number literal '{}'", text), loc)
            })?;
            Ok(Token::new(TokenKind::Float(value), loc))
        } else {
            let value: i64 = text.parse().map_err(|_| {
                LuniteError::syntax(format!("invalid number literal '{}'", text), loc)
            })?;
            Ok(Token::new(TokenKind::Int(value), loc))
        }
    }

    fn read_ident_or_keyword(&mut self, loc: Location) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }

        // f-strings: an identifier literally "f" immediately followed by a
        // quote becomes a dedicated FSTRING token carrying the raw body.
        if text == "f" && self.peek() == Some('"') {
            return self.read_fstring(loc);
        }

        match text.as_str() {
            "and" => Token::new(TokenKind::And, loc),
            "or" => Token::new(TokenKind::Or, loc),
            "not" => Token::new(TokenKind::Not, loc),
            "is" => Token::new(TokenKind::Is, loc),
            _ => match Keyword::from_str(&text) {
                Some(kw) => Token::new(TokenKind::Keyword(kw), loc),
                None => Token::new(TokenKind::Ident(text), loc),
            },
        }
    }

    /// Reads the raw (un-expanded) body of an f-string. The parser is
    /// responsible for splitting this into literal/expression regions and
    /// re-lexing the expression regions (spec 4.1/4.2).
    fn read_fstring(&mut self, loc: Location) -> Token {
        self.advance(); // opening quote
        let mut depth = 0usize;
        let mut body = String::new();

        while let Some(c) = self.peek() {
            match c {
                '"' if depth == 0 => {
                    self.advance();
                    break;
                }
                '{' => {
                    depth += 1;
                    body.push(c);
                    self.advance();
                }
                '}' => {
                    depth = depth.saturating_sub(1);
                    body.push(c);
                    self.advance();
                }
                '\\' => {
                    body.push(c);
                    self.advance();
                    if let Some(next) = self.peek() {
                        body.push(next);
                        self.advance();
                    }
                }
                _ => {
                    body.push(c);
                    self.advance();
                }
            }
        }

        Token::new(TokenKind::FString(body), loc)
    }

    fn read_string(&mut self, loc: Location) -> Result<Token, LuniteError> {
        self.advance(); // opening quote
        let mut out = String::new();

        loop {
            match self.peek() {
                None => {
                    return Err(LuniteError::syntax("unterminated string literal", loc));
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    out.push_str(&self.read_escape(loc)?);
                }
                Some(c) => {
                    out.push(c);
                    self.advance();
                }
            }
        }

        Ok(Token::new(TokenKind::Str(out), loc))
    }

    fn read_char(&mut self, loc: Location) -> Result<Token, LuniteError> {
        self.advance(); // opening quote
        let mut body = String::new();

        loop {
            match self.peek() {
                None => return Err(LuniteError::syntax("unterminated char literal", loc)),
                Some('\'') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    body.push_str(&self.read_escape(loc)?);
                }
                Some(c) => {
                    body.push(c);
                    self.advance();
                }
            }
        }

        let mut chars = body.chars();
        let value = chars.next();
        if value.is_none() || chars.next().is_some() {
            // The original implementation's error path here attaches the
            // bare quote character's (non-existent) location; we instead
            // attach the enclosing string's start location (spec 9).
            return Err(LuniteError::syntax(
                format!("char literal must have length 1, got '{}'", body),
                loc,
            ));
        }

        Ok(Token::new(TokenKind::Char(value.unwrap()), loc))
    }

    /// Expands a single escape sequence following a consumed backslash.
    /// Unknown escapes pass the backslash through literally (spec 4.1).
    /// `loc` is the enclosing literal's start, attached to any malformed-escape error.
    fn read_escape(&mut self, loc: Location) -> Result<String, LuniteError> {
        Ok(match self.peek() {
            Some('n') => {
                self.advance();
                "\n".to_string()
            }
            Some('t') => {
                self.advance();
                "\t".to_string()
            }
            Some('r') => {
                self.advance();
                "\r".to_string()
            }
            Some('\\') => {
                self.advance();
                "\\".to_string()
            }
            Some('"') => {
                self.advance();
                "\"".to_string()
            }
            Some('\'') => {
                self.advance();
                "'".to_string()
            }
            Some('b') => {
                self.advance();
                "\u{8}".to_string()
            }
            Some('0') => {
                self.advance();
                "\0".to_string()
            }
            Some('h') => {
                // legacy alias for tab
                self.advance();
                "\t".to_string()
            }
            Some('u') => {
                self.advance();
                let mut hex = String::new();
                for _ in 0..4 {
                    match self.peek() {
                        Some(c) if c.is_ascii_hexdigit() => {
                            hex.push(c);
                            self.advance();
                        }
                        _ => break,
                    }
                }
                if hex.len() != 4 {
                    return Err(LuniteError::syntax(
                        format!("malformed \\u escape, expected exactly 4 hex digits, got '{}'", hex),
                        loc,
                    ));
                }
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
                    .ok_or_else(|| {
                        LuniteError::syntax(format!("malformed \\u escape '\\u{}'", hex), loc)
                    })?
            }
            Some(other) => {
                self.advance();
                format!("\\{}", other)
            }
            None => "\\".to_string(),
        })
    }

    fn read_operator(&mut self, loc: Location) -> Result<Token, LuniteError> {
        let c = self.advance().unwrap();
        let kind = match c {
            '+' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::PlusEq
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::MinusEq
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::StarEq
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::SlashEq
                } else {
                    TokenKind::Slash
                }
            }
            '%' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::PercentEq
                } else {
                    TokenKind::Percent
                }
            }
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ':' => TokenKind::Colon,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '?' => TokenKind::Question,
            '=' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::Eq
                } else if self.peek() == Some('>') {
                    self.advance();
                    TokenKind::FatArrow
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            '>' => {
                if self.peek() == Some('>') {
                    self.advance();
                    TokenKind::Shr
                } else {
                    TokenKind::Gt
                }
            }
            '<' => {
                if self.peek() == Some('<') {
                    self.advance();
                    TokenKind::Shl
                } else {
                    TokenKind::Lt
                }
            }
            '&' => {
                if self.peek() == Some('&') {
                    self.advance();
                    TokenKind::AndAnd
                } else {
                    TokenKind::Amp
                }
            }
            '|' => {
                if self.peek() == Some('|') {
                    self.advance();
                    TokenKind::OrOr
                } else {
                    TokenKind::Pipe
                }
            }
            '^' => TokenKind::Caret,
            '~' => TokenKind::Tilde,
            other => {
                return Err(LuniteError::syntax(
                    format!("unexpected character '{}'", other),
                    loc,
                ));
            }
        };

        Ok(Token::new(kind, loc))
    }

    pub fn source(&self) -> &'a str {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn ends_with_eof() {
        let toks = kinds("1 + 2");
        assert_eq!(*toks.last().unwrap(), TokenKind::Eof);
    }

    #[test]
    fn tracks_line_and_column() {
        let toks = Lexer::new("a\nbc").tokenize().unwrap();
        assert_eq!(toks[0].loc, Location::new(1, 1));
        assert_eq!(toks[1].loc, Location::new(2, 1));
    }

    #[test]
    fn skips_line_and_block_comments() {
        let toks = kinds("1 ~~ trailing\n2 ~* block *~ 3");
        assert_eq!(
            toks,
            vec![
                TokenKind::Int(1),
                TokenKind::Int(2),
                TokenKind::Int(3),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn lone_tilde_is_bitwise_not() {
        let toks = kinds("~1");
        assert_eq!(toks[0], TokenKind::Tilde);
    }

    #[test]
    fn lexes_numbers() {
        assert_eq!(kinds("42")[0], TokenKind::Int(42));
        assert_eq!(kinds("3.14")[0], TokenKind::Float(3.14));
        assert_eq!(kinds(".5")[0], TokenKind::Float(0.5));
    }

    #[test]
    fn lexes_string_escapes() {
        let toks = kinds(r#""a\nb\tc\"d""#);
        assert_eq!(toks[0], TokenKind::Str("a\nb\tc\"d".to_string()));
    }

    #[test]
    fn lexes_unicode_escape() {
        let toks = kinds(r#""A""#);
        assert_eq!(toks[0], TokenKind::Str("A".to_string()));
    }

    #[test]
    fn lexes_char_literal() {
        let toks = kinds("'x'");
        assert_eq!(toks[0], TokenKind::Char('x'));
    }

    #[test]
    fn rejects_multi_char_literal() {
        let err = Lexer::new("'ab'").tokenize();
        assert!(err.is_err());
    }

    #[test]
    fn lexes_fstring_raw_body_with_braces() {
        let toks = kinds(r#"f"x={1+2}""#);
        match &toks[0] {
            TokenKind::FString(body) => assert_eq!(body, "x={1+2}"),
            other => panic!("expected fstring, got {:?}", other),
        }
    }

    #[test]
    fn lexes_keywords_and_identifiers() {
        let toks = kinds("let func x");
        assert_eq!(toks[0], TokenKind::Keyword(Keyword::Let));
        assert_eq!(toks[1], TokenKind::Keyword(Keyword::Func));
        assert_eq!(toks[2], TokenKind::Ident("x".to_string()));
    }

    #[test]
    fn lexes_double_char_operators() {
        let toks = kinds("== != << >> += -= *= /= %= => && ||");
        assert_eq!(
            toks,
            vec![
                TokenKind::Eq,
                TokenKind::NotEq,
                TokenKind::Shl,
                TokenKind::Shr,
                TokenKind::PlusEq,
                TokenKind::MinusEq,
                TokenKind::StarEq,
                TokenKind::SlashEq,
                TokenKind::PercentEq,
                TokenKind::FatArrow,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn no_lte_or_gte_tokens() {
        // spec 4.1: only '<' and '>' exist, no '<=' / '>='
        let toks = kinds("< >");
        assert_eq!(toks, vec![TokenKind::Lt, TokenKind::Gt, TokenKind::Eof]);
    }

    #[test]
    fn and_or_not_is_get_dedicated_kinds() {
        let toks = kinds("and or not is");
        assert_eq!(
            toks,
            vec![
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::Is,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn errors_carry_location() {
        let err = Lexer::new("  @").tokenize().unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 3);
    }
}
