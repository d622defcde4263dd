use crate::error::{ErrorKind, TemplateError};
use serde::Serialize;

/// Position in source code, tracked as a byte offset plus 0-indexed line and column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    /// Byte offset in source
    pub byte: usize,
    /// Line number (0-indexed)
    pub line: usize,
    /// Column number (0-indexed, in characters)
    pub col: usize,
}

impl Position {
    pub fn new() -> Self {
        Self { byte: 0, line: 0, col: 0 }
    }

    /// Move past `ch`
    pub fn advance(&mut self, ch: char) {
        self.byte += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
    }
}

/// Span in source code (a range from start position to end position)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Zero-width span at `position`
    pub fn point(position: Position) -> Self {
        Self { start: position, end: position }
    }

    /// Span from the start of `self` to the end of `other`
    pub fn to(self, other: Span) -> Span {
        Span { start: self.start, end: other.end }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    Identifier,
    Integer,
    Float,
    Str,
    True,
    False,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Or,
    And,
    Equal,
    Not,
    Assign,
    In,
    If,
    Then,
    Else,
    ElseIf,
    Range,
    EndOfInput,
}

impl TokenKind {
    /// How the token reads in diagnostics
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Identifier => "a name",
            TokenKind::Integer => "an integer",
            TokenKind::Float => "a float",
            TokenKind::Str => "a string",
            TokenKind::True => "'true'",
            TokenKind::False => "'false'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Comma => "','",
            TokenKind::Or => "'||'",
            TokenKind::And => "'&&'",
            TokenKind::Equal => "'=='",
            TokenKind::Not => "'!'",
            TokenKind::Assign => "'='",
            TokenKind::In => "'in'",
            TokenKind::If => "'if'",
            TokenKind::Then => "'then'",
            TokenKind::Else => "'else'",
            TokenKind::ElseIf => "'elseif'",
            TokenKind::Range => "'..'",
            TokenKind::EndOfInput => "the end of the expression",
        }
    }
}

/// Token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text; for strings, the contents without quotes
    pub text: String,
    pub span: Span,
}

/// Reserved words of the expression language
fn keyword(word: &str) -> Option<TokenKind> {
    match word {
        "in" => Some(TokenKind::In),
        "if" => Some(TokenKind::If),
        "then" => Some(TokenKind::Then),
        "else" => Some(TokenKind::Else),
        "elseif" => Some(TokenKind::ElseIf),
        "true" => Some(TokenKind::True),
        "false" => Some(TokenKind::False),
        _ => None,
    }
}

/// Tokenizer for embedded expressions
pub struct Lexer<'a> {
    source: &'a str,
    offset: usize,
    position: Position,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::with_origin(source, Position::new())
    }

    /// Lexer whose spans start at `origin` (the expression's place in the document)
    pub fn with_origin(source: &'a str, origin: Position) -> Self {
        Self { source, offset: 0, position: origin }
    }

    /// Tokenize the entire expression, terminated by `EndOfInput`
    pub fn tokenize(mut self) -> Result<Vec<Token>, TemplateError> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek() {
            let from = self.offset;
            let start = self.position;

            // `;` separates statements but carries no token
            if ch.is_whitespace() || ch == ';' {
                self.bump();
                continue;
            }

            if ch.is_ascii_digit() {
                let kind = self.number();
                tokens.push(self.token(kind, from, start));
                continue;
            }

            if ch.is_alphabetic() || ch == '_' {
                self.eat_while(|c| c.is_alphanumeric() || c == '_');
                let kind = keyword(&self.source[from..self.offset]).unwrap_or(TokenKind::Identifier);
                tokens.push(self.token(kind, from, start));
                continue;
            }

            if ch == '"' {
                tokens.push(self.string(start)?);
                continue;
            }

            let (kind, len) = match (ch, self.peek_second()) {
                ('(', _) => (TokenKind::LParen, 1),
                (')', _) => (TokenKind::RParen, 1),
                ('[', _) => (TokenKind::LBracket, 1),
                (']', _) => (TokenKind::RBracket, 1),
                (',', _) => (TokenKind::Comma, 1),
                ('!', _) => (TokenKind::Not, 1),
                ('|', Some('|')) => (TokenKind::Or, 2),
                ('&', Some('&')) => (TokenKind::And, 2),
                ('=', Some('=')) => (TokenKind::Equal, 2),
                ('=', _) => (TokenKind::Assign, 1),
                ('.', Some('.')) => (TokenKind::Range, 2),
                _ => {
                    self.bump();
                    let mut err = TemplateError::new(
                        ErrorKind::UnexpectedCharacter,
                        format!("Unexpected character '{}'.", ch),
                        Span::new(start, self.position),
                    );
                    err = match ch {
                        '|' => err.with_help("Logical or is written '||'"),
                        '&' => err.with_help("Logical and is written '&&'"),
                        '.' => err.with_help("Ranges are written 'start..end'"),
                        _ => err,
                    };
                    return Err(err);
                }
            };

            for _ in 0..len {
                self.bump();
            }
            tokens.push(self.token(kind, from, start));
        }

        tokens.push(Token {
            kind: TokenKind::EndOfInput,
            text: String::new(),
            span: Span::point(self.position),
        });
        Ok(tokens)
    }

    /// Digits, optionally followed by `.digits`. A `.` followed by another
    /// `.` is a range operator and ends the integer.
    fn number(&mut self) -> TokenKind {
        self.eat_while(|c| c.is_ascii_digit());
        if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            self.eat_while(|c| c.is_ascii_digit());
            TokenKind::Float
        } else {
            TokenKind::Integer
        }
    }

    /// `"..."` with no escape processing
    fn string(&mut self, start: Position) -> Result<Token, TemplateError> {
        self.bump();
        let content_from = self.offset;
        self.eat_while(|c| c != '"');
        if self.peek().is_none() {
            return Err(TemplateError::new(
                ErrorKind::UnterminatedString,
                "This string is never closed.",
                Span::new(start, self.position),
            )
            .with_help("Close the string with '\"'"));
        }
        let text = self.source[content_from..self.offset].to_string();
        self.bump();
        Ok(Token {
            kind: TokenKind::Str,
            text,
            span: Span::new(start, self.position),
        })
    }

    fn token(&self, kind: TokenKind, from: usize, start: Position) -> Token {
        Token {
            kind,
            text: self.source[from..self.offset].to_string(),
            span: Span::new(start, self.position),
        }
    }

    fn peek(&self) -> Option<char> {
        self.source[self.offset..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.source[self.offset..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.offset += ch.len_utf8();
        self.position.advance(ch);
        Some(ch)
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(ch) = self.peek() {
            if !pred(ch) {
                break;
            }
            self.bump();
        }
    }
}

/// Tokenize an expression that starts at the beginning of its own source
pub fn tokenize(source: &str) -> Result<Vec<Token>, TemplateError> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_operators() {
        use TokenKind::*;
        assert_eq!(
            kinds("a || b && c == !d"),
            vec![Identifier, Or, Identifier, And, Identifier, Equal, Not, Identifier, EndOfInput]
        );
        assert_eq!(kinds("x = 1"), vec![Identifier, Assign, Integer, EndOfInput]);
        assert_eq!(kinds("f(a, b)"), vec![Identifier, LParen, Identifier, Comma, Identifier, RParen, EndOfInput]);
        assert_eq!(kinds("a[1][2]"), vec![Identifier, LBracket, Integer, RBracket, LBracket, Integer, RBracket, EndOfInput]);
    }

    #[test]
    fn test_keywords_need_whole_words() {
        use TokenKind::*;
        assert_eq!(
            kinds("if a then b elseif c then d else e"),
            vec![If, Identifier, Then, Identifier, ElseIf, Identifier, Then, Identifier, Else, Identifier, EndOfInput]
        );
        assert_eq!(kinds("index"), vec![Identifier, EndOfInput]);
        assert_eq!(kinds("elsewhere"), vec![Identifier, EndOfInput]);
        assert_eq!(kinds("iffy"), vec![Identifier, EndOfInput]);
        assert_eq!(kinds("true false"), vec![True, False, EndOfInput]);
        assert_eq!(kinds("x in xs"), vec![Identifier, In, Identifier, EndOfInput]);
    }

    #[test]
    fn test_integer_before_range() {
        let tokens = tokenize("0..10").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Integer);
        assert_eq!(tokens[0].text, "0");
        assert_eq!(tokens[1].kind, TokenKind::Range);
        assert_eq!(tokens[2].kind, TokenKind::Integer);
        assert_eq!(tokens[2].text, "10");
    }

    #[test]
    fn test_float() {
        let tokens = tokenize("1.25 3").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Float);
        assert_eq!(tokens[0].text, "1.25");
        assert_eq!(tokens[1].kind, TokenKind::Integer);

        let tokens = tokenize("1.5..4").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Float);
        assert_eq!(tokens[1].kind, TokenKind::Range);
    }

    #[test]
    fn test_string_has_no_escapes() {
        let tokens = tokenize(r#""a\n b""#).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].text, r"a\n b");
    }

    #[test]
    fn test_semicolon_is_skipped() {
        assert_eq!(kinds("x = 1;"), vec![TokenKind::Identifier, TokenKind::Assign, TokenKind::Integer, TokenKind::EndOfInput]);
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("a + b").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedCharacter);
        assert_eq!(err.span.unwrap().start.col, 2);

        let err = tokenize("a | b").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedCharacter);
        assert!(err.help.is_some());
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("\"open").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnterminatedString);
    }

    #[test]
    fn test_origin_offsets_spans() {
        let origin = Position { byte: 10, line: 2, col: 4 };
        let tokens = Lexer::with_origin("ab cd", origin).tokenize().unwrap();
        assert_eq!(tokens[1].span.start, Position { byte: 13, line: 2, col: 7 });
        assert_eq!(tokens[1].span.end, Position { byte: 15, line: 2, col: 9 });
    }
}
