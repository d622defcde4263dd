//! Recursive-descent expression parser.
//!
//! Binding strength, loosest first: `||`, `&&`, `==`, `in`, `..`, primary.
//! Every binary level is left-associative except `..`, which takes exactly
//! two primaries.

use super::ast::{ElseIfArm, Expr, ExprKind};
use super::lexer::{Lexer, Position, Span, Token, TokenKind};
use crate::error::{ErrorKind, TemplateError};

/// Parse an expression that starts at the beginning of its own source
pub fn parse_expression(source: &str) -> Result<Expr, TemplateError> {
    parse_expression_at(source, Position::new())
}

/// Parse an expression embedded in a document at `origin`
pub fn parse_expression_at(source: &str, origin: Position) -> Result<Expr, TemplateError> {
    let tokens = Lexer::with_origin(source, origin).tokenize()?;
    ExprParser::new(tokens).parse()
}

/// Builds an expression tree from a token stream
pub struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse(mut self) -> Result<Expr, TemplateError> {
        if self.check(TokenKind::EndOfInput) {
            return Err(TemplateError::new(
                ErrorKind::UnexpectedToken,
                "Expected an expression, found nothing.",
                self.peek().span,
            ));
        }

        let expr = self.parse_statement()?;
        if !self.check(TokenKind::EndOfInput) {
            let token = self.peek();
            return Err(TemplateError::new(
                ErrorKind::UnexpectedToken,
                format!("Unexpected {} after the expression.", token.kind.describe()),
                token.span,
            ));
        }
        Ok(expr)
    }

    /// `name = expr` or a plain expression
    fn parse_statement(&mut self) -> Result<Expr, TemplateError> {
        if self.check(TokenKind::Identifier) && self.peek_second_kind() == Some(TokenKind::Assign) {
            let name = self.advance();
            self.advance();
            let value = self.parse_or()?;
            let span = name.span.to(value.span);
            return Ok(Expr::new(
                ExprKind::Assign { name: name.text, value: Box::new(value) },
                span,
            ));
        }
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, TemplateError> {
        let mut node = self.parse_and()?;
        while self.eat(TokenKind::Or).is_some() {
            let right = self.parse_and()?;
            let span = node.span.to(right.span);
            node = Expr::new(ExprKind::Or(Box::new(node), Box::new(right)), span);
        }
        Ok(node)
    }

    fn parse_and(&mut self) -> Result<Expr, TemplateError> {
        let mut node = self.parse_equal()?;
        while self.eat(TokenKind::And).is_some() {
            let right = self.parse_equal()?;
            let span = node.span.to(right.span);
            node = Expr::new(ExprKind::And(Box::new(node), Box::new(right)), span);
        }
        Ok(node)
    }

    fn parse_equal(&mut self) -> Result<Expr, TemplateError> {
        let mut node = self.parse_in()?;
        while self.eat(TokenKind::Equal).is_some() {
            let right = self.parse_in()?;
            let span = node.span.to(right.span);
            node = Expr::new(ExprKind::Equal(Box::new(node), Box::new(right)), span);
        }
        Ok(node)
    }

    fn parse_in(&mut self) -> Result<Expr, TemplateError> {
        let mut node = self.parse_range()?;
        while self.eat(TokenKind::In).is_some() {
            let source = self.parse_range()?;
            let span = node.span.to(source.span);
            node = Expr::new(
                ExprKind::In { item: Box::new(node), source: Box::new(source) },
                span,
            );
        }
        Ok(node)
    }

    fn parse_range(&mut self) -> Result<Expr, TemplateError> {
        let start = self.parse_primary()?;
        if self.eat(TokenKind::Range).is_none() {
            return Ok(start);
        }
        let end = self.parse_primary()?;
        let span = start.span.to(end.span);
        Ok(Expr::new(
            ExprKind::Range { start: Box::new(start), end: Box::new(end) },
            span,
        ))
    }

    fn parse_primary(&mut self) -> Result<Expr, TemplateError> {
        let token = self.advance();
        let span = token.span;

        match token.kind {
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                let close = self.expect_closing(TokenKind::RParen, ErrorKind::UnclosedParen, span)?;
                Ok(Expr::new(inner.kind, span.to(close.span)))
            }

            TokenKind::Integer => {
                let value = token.text.parse::<i32>().map_err(|_| {
                    TemplateError::new(
                        ErrorKind::InvalidLiteral,
                        format!("'{}' does not fit in a 32-bit integer.", token.text),
                        span,
                    )
                })?;
                Ok(Expr::new(ExprKind::Integer(value), span))
            }

            TokenKind::Float => {
                let value = token.text.parse::<f32>().map_err(|_| {
                    TemplateError::new(
                        ErrorKind::InvalidLiteral,
                        format!("'{}' is not a valid float.", token.text),
                        span,
                    )
                })?;
                Ok(Expr::new(ExprKind::Float(value), span))
            }

            TokenKind::Str => Ok(Expr::new(ExprKind::Str(token.text), span)),
            TokenKind::True => Ok(Expr::new(ExprKind::Bool(true), span)),
            TokenKind::False => Ok(Expr::new(ExprKind::Bool(false), span)),

            TokenKind::If => self.parse_if(span),

            TokenKind::Not => {
                let operand = self.parse_primary()?;
                let span = span.to(operand.span);
                Ok(Expr::new(ExprKind::Not(Box::new(operand)), span))
            }

            TokenKind::Identifier => {
                if self.check(TokenKind::LParen) {
                    self.parse_call(token)
                } else if self.check(TokenKind::LBracket) {
                    self.parse_array_access(token)
                } else {
                    Ok(Expr::new(ExprKind::Variable(token.text), span))
                }
            }

            TokenKind::EndOfInput => Err(TemplateError::new(
                ErrorKind::UnexpectedToken,
                "Expected a value, but the expression ended.",
                span,
            )),

            other => Err(TemplateError::new(
                ErrorKind::UnexpectedToken,
                format!("Expected a value, found {}.", other.describe()),
                span,
            )),
        }
    }

    /// After `if`: condition `then` body (`elseif` condition `then` body)* `else` body
    fn parse_if(&mut self, if_span: Span) -> Result<Expr, TemplateError> {
        let condition = self.parse_or()?;
        self.expect(TokenKind::Then, "after the 'if' condition")?;
        let body = self.parse_or()?;

        let mut else_ifs = Vec::new();
        while self.eat(TokenKind::ElseIf).is_some() {
            let condition = self.parse_or()?;
            self.expect(TokenKind::Then, "after the 'elseif' condition")?;
            let body = self.parse_or()?;
            else_ifs.push(ElseIfArm { condition, body });
        }

        if self.eat(TokenKind::Else).is_none() {
            return Err(TemplateError::new(
                ErrorKind::MissingElse,
                "An 'if' expression must end with an 'else' branch.",
                self.peek().span,
            )
            .with_related(if_span)
            .with_related_label("'if' starts here")
            .with_help("Syntax: if cond then a else b"));
        }
        let else_body = self.parse_or()?;
        let span = if_span.to(else_body.span);

        Ok(Expr::new(
            ExprKind::If {
                condition: Box::new(condition),
                body: Box::new(body),
                else_ifs,
                else_body: Some(Box::new(else_body)),
            },
            span,
        ))
    }

    fn parse_call(&mut self, name: Token) -> Result<Expr, TemplateError> {
        let open = self.advance();
        let mut args = Vec::new();

        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_or()?);
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }

        let close = self.expect_closing(TokenKind::RParen, ErrorKind::UnclosedParen, open.span)?;
        Ok(Expr::new(
            ExprKind::Call { name: name.text, args },
            name.span.to(close.span),
        ))
    }

    /// `name[index]...`, each index a full primary so indices can nest
    fn parse_array_access(&mut self, name: Token) -> Result<Expr, TemplateError> {
        let mut indices = Vec::new();
        let mut end = name.span;

        while let Some(open) = self.eat(TokenKind::LBracket) {
            indices.push(self.parse_primary()?);
            let close = self.expect_closing(TokenKind::RBracket, ErrorKind::UnclosedBracket, open.span)?;
            end = close.span;
        }

        Ok(Expr::new(
            ExprKind::ArrayAccess { name: name.text, indices },
            name.span.to(end),
        ))
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> Result<Token, TemplateError> {
        if let Some(token) = self.eat(kind) {
            return Ok(token);
        }
        let found = self.peek();
        Err(TemplateError::new(
            ErrorKind::UnexpectedToken,
            format!("Expected {} {}, found {}.", kind.describe(), context, found.kind.describe()),
            found.span,
        ))
    }

    /// Expect a closing delimiter, reporting the opener when it is missing
    fn expect_closing(&mut self, kind: TokenKind, error: ErrorKind, open: Span) -> Result<Token, TemplateError> {
        if let Some(token) = self.eat(kind) {
            return Ok(token);
        }
        let found = self.peek();
        let message = if found.kind == TokenKind::EndOfInput {
            format!("This is never closed; expected {}.", kind.describe())
        } else {
            format!("Expected {}, found {}.", kind.describe(), found.kind.describe())
        };
        Err(TemplateError::new(error, message, found.span)
            .with_related(open)
            .with_help(format!("Close with {}", kind.describe())))
    }

    fn peek(&self) -> &Token {
        // The lexer always terminates the stream with EndOfInput
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_second_kind(&self) -> Option<TokenKind> {
        self.tokens.get(self.pos + 1).map(|t| t.kind)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ExprKind {
        parse_expression(source).unwrap().kind
    }

    fn var(expr: &Expr) -> &str {
        match &expr.kind {
            ExprKind::Variable(name) => name,
            other => panic!("expected variable, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        // a || b && c == d  =>  a || (b && (c == d))
        let ExprKind::Or(left, right) = parse("a || b && c == d") else {
            panic!("expected or");
        };
        assert_eq!(var(&left), "a");
        let ExprKind::And(b, eq) = right.kind else {
            panic!("expected and");
        };
        assert_eq!(var(&b), "b");
        assert!(matches!(eq.kind, ExprKind::Equal(_, _)));
    }

    #[test]
    fn test_left_associative() {
        let ExprKind::Or(left, right) = parse("a || b || c") else {
            panic!("expected or");
        };
        assert!(matches!(left.kind, ExprKind::Or(_, _)));
        assert_eq!(var(&right), "c");
    }

    #[test]
    fn test_in_with_range() {
        let ExprKind::In { item, source } = parse("i in 0..4") else {
            panic!("expected in");
        };
        assert_eq!(var(&item), "i");
        let ExprKind::Range { start, end } = source.kind else {
            panic!("expected range");
        };
        assert_eq!(start.kind, ExprKind::Integer(0));
        assert_eq!(end.kind, ExprKind::Integer(4));
    }

    #[test]
    fn test_equal_binds_looser_than_in() {
        let ExprKind::Equal(left, right) = parse("x in xs == true") else {
            panic!("expected equal");
        };
        assert!(matches!(left.kind, ExprKind::In { .. }));
        assert_eq!(right.kind, ExprKind::Bool(true));
    }

    #[test]
    fn test_parentheses() {
        let ExprKind::And(left, _) = parse("(a || b) && c") else {
            panic!("expected and");
        };
        assert!(matches!(left.kind, ExprKind::Or(_, _)));
    }

    #[test]
    fn test_array_access_chain() {
        let ExprKind::ArrayAccess { name, indices } = parse("m[i][1][k[0]]") else {
            panic!("expected array access");
        };
        assert_eq!(name, "m");
        assert_eq!(indices.len(), 3);
        assert_eq!(var(&indices[0]), "i");
        assert_eq!(indices[1].kind, ExprKind::Integer(1));
        assert!(matches!(indices[2].kind, ExprKind::ArrayAccess { .. }));
    }

    #[test]
    fn test_if_expression() {
        let ExprKind::If { else_ifs, else_body, .. } = parse("if a then 1 elseif b then 2 elseif c then 3 else 4") else {
            panic!("expected if");
        };
        assert_eq!(else_ifs.len(), 2);
        assert_eq!(else_ifs[1].body.kind, ExprKind::Integer(3));
        assert_eq!(else_body.unwrap().kind, ExprKind::Integer(4));
    }

    #[test]
    fn test_if_requires_else() {
        let err = parse_expression("if a then 1").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingElse);
    }

    #[test]
    fn test_not_binds_tightest() {
        let ExprKind::Equal(left, _) = parse("!a == b") else {
            panic!("expected equal");
        };
        assert!(matches!(left.kind, ExprKind::Not(_)));
    }

    #[test]
    fn test_call() {
        let ExprKind::Call { name, args } = parse("mix(a, 1, \"s\")") else {
            panic!("expected call");
        };
        assert_eq!(name, "mix");
        assert_eq!(args.len(), 3);
        assert_eq!(args[2].kind, ExprKind::Str("s".to_string()));

        let ExprKind::Call { args, .. } = parse("now()") else {
            panic!("expected call");
        };
        assert!(args.is_empty());
    }

    #[test]
    fn test_assignment() {
        let ExprKind::Assign { name, value } = parse("total = a == 1;") else {
            panic!("expected assignment");
        };
        assert_eq!(name, "total");
        assert!(matches!(value.kind, ExprKind::Equal(_, _)));
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse("42"), ExprKind::Integer(42));
        assert_eq!(parse("2.5"), ExprKind::Float(2.5));
        assert_eq!(parse("false"), ExprKind::Bool(false));
    }

    #[test]
    fn test_unclosed_paren() {
        let err = parse_expression("(a || b").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnclosedParen);
        assert!(err.related_span.is_some());
    }

    #[test]
    fn test_unclosed_bracket() {
        let err = parse_expression("a[1").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnclosedBracket);
    }

    #[test]
    fn test_unexpected_tokens() {
        assert_eq!(parse_expression("a b").unwrap_err().kind, ErrorKind::UnexpectedToken);
        assert_eq!(parse_expression("a ||").unwrap_err().kind, ErrorKind::UnexpectedToken);
        assert_eq!(parse_expression("").unwrap_err().kind, ErrorKind::UnexpectedToken);
        assert_eq!(parse_expression(") a").unwrap_err().kind, ErrorKind::UnexpectedToken);
    }

    #[test]
    fn test_integer_overflow() {
        let err = parse_expression("99999999999").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidLiteral);
    }

    #[test]
    fn test_spans_cover_operands() {
        let expr = parse_expression("ab == cd").unwrap();
        assert_eq!(expr.span.start.col, 0);
        assert_eq!(expr.span.end.col, 8);
    }
}
