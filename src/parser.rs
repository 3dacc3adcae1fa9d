use crate::{
    ast::{BinaryOp, Chunk, Expr, ExprKind, Literal, Stmt, StmtKind, UnaryOp},
    diagnostics::{Diagnostic, DiagnosticKind, SourceSpan},
    lexer::{Keyword, Lexer, Token, TokenKind},
};

/// Lexes and parses one chunk of module source.
pub fn parse_chunk(source: &str) -> Result<Chunk, Diagnostic> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse()
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    pub fn parse(mut self) -> Result<Chunk, Diagnostic> {
        let mut items = Vec::new();
        while !self.is_at_end() {
            items.push(self.parse_statement()?);
        }
        Ok(Chunk { items })
    }

    fn parse_statement(&mut self) -> Result<Stmt, Diagnostic> {
        if self.matches_keyword(Keyword::Var) {
            self.parse_var_decl()
        } else if self.matches_keyword(Keyword::Const) {
            self.parse_const_decl()
        } else if self.matches_keyword(Keyword::If) {
            self.parse_if()
        } else if self.matches_keyword(Keyword::While) {
            self.parse_while()
        } else if self.matches_keyword(Keyword::For) {
            self.parse_for()
        } else if self.matches_keyword(Keyword::Return) {
            self.parse_return()
        } else if self.check(TokenKind::LBrace) {
            let start = self.peek_span().start;
            let body = self.parse_block()?;
            Ok(Stmt {
                span: SourceSpan::new(start, self.previous().span.end),
                kind: StmtKind::Block(body),
            })
        } else {
            self.parse_expression_statement()
        }
    }

    fn parse_var_decl(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.previous().span.start;
        let mutable = self.matches_keyword(Keyword::Mut);
        let name = self.consume_identifier("expected variable name after `var`")?;
        let initializer = if self.matches(TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.consume_optional_semicolon();
        Ok(Stmt {
            span: SourceSpan::new(start, self.previous().span.end),
            kind: StmtKind::VarDecl {
                name: name.lexeme,
                mutable,
                initializer,
            },
        })
    }

    fn parse_const_decl(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.previous().span.start;
        let name = self.consume_identifier("expected constant name after `const`")?;
        self.consume(TokenKind::Assign, "expected `=` after constant name")?;
        let value = self.parse_expression()?;
        self.consume_optional_semicolon();
        Ok(Stmt {
            span: SourceSpan::new(start, self.previous().span.end),
            kind: StmtKind::ConstDecl {
                name: name.lexeme,
                value,
            },
        })
    }

    fn parse_if(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.previous().span.start;
        let condition = self.parse_expression()?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.matches_keyword(Keyword::Else) {
            if self.matches_keyword(Keyword::If) {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Stmt {
            span: SourceSpan::new(start, self.previous().span.end),
            kind: StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.previous().span.start;
        let condition = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(Stmt {
            span: SourceSpan::new(start, self.previous().span.end),
            kind: StmtKind::While { condition, body },
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.previous().span.start;
        let binding = self.consume_identifier("expected loop variable after `for`")?;
        if !self.matches_keyword(Keyword::In) {
            let message = "expected `in` after loop variable";
            return Err(self
                .peek()
                .map(|tok| self.error(tok, message))
                .unwrap_or_else(|| self.error_eof(message)));
        }
        let iterable = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(Stmt {
            span: SourceSpan::new(start, self.previous().span.end),
            kind: StmtKind::For {
                binding: binding.lexeme,
                iterable,
                body,
            },
        })
    }

    fn parse_return(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.previous().span.start;
        let value = if self.check(TokenKind::Semicolon)
            || self.check(TokenKind::RBrace)
            || self.is_at_end()
        {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_optional_semicolon();
        Ok(Stmt {
            span: SourceSpan::new(start, self.previous().span.end),
            kind: StmtKind::Return(value),
        })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        self.consume(TokenKind::LBrace, "expected `{` to start block")?;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            statements.push(self.parse_statement()?);
        }
        self.consume(TokenKind::RBrace, "expected `}` after block")?;
        Ok(statements)
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let expr = self.parse_expression()?;
        self.consume_optional_semicolon();
        Ok(Stmt {
            span: expr.span,
            kind: StmtKind::Expr(expr),
        })
    }

    fn parse_expression(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, Diagnostic> {
        let expr = self.parse_or()?;
        if self.matches(TokenKind::Assign) {
            let equals = self.previous().span;
            let value = self.parse_assignment()?;
            match expr.kind {
                ExprKind::Variable(_) | ExprKind::Index { .. } | ExprKind::Field { .. } => {
                    Ok(Expr {
                        span: SourceSpan::new(expr.span.start, value.span.end),
                        kind: ExprKind::Assign {
                            target: Box::new(expr),
                            value: Box::new(value),
                        },
                    })
                }
                _ => Err(
                    Diagnostic::new(DiagnosticKind::Parser, "invalid assignment target")
                        .with_span(equals),
                ),
            }
        } else {
            Ok(expr)
        }
    }

    /// Parses one left-associative precedence level.
    fn parse_binary_level(
        &mut self,
        operators: &[(TokenKind, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, Diagnostic>,
    ) -> Result<Expr, Diagnostic> {
        let mut expr = next(self)?;
        'outer: loop {
            for (kind, op) in operators {
                if *kind == TokenKind::Minus && self.at_line_start() {
                    continue;
                }
                if self.matches(kind.clone()) {
                    let right = next(self)?;
                    expr = Expr {
                        span: SourceSpan::new(expr.span.start, right.span.end),
                        kind: ExprKind::Binary {
                            op: *op,
                            left: Box::new(expr),
                            right: Box::new(right),
                        },
                    };
                    continue 'outer;
                }
            }
            return Ok(expr);
        }
    }

    fn parse_or(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_binary_level(&[(TokenKind::DoublePipe, BinaryOp::Or)], Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_binary_level(
            &[(TokenKind::DoubleAmpersand, BinaryOp::And)],
            Self::parse_equality,
        )
    }

    fn parse_equality(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_binary_level(
            &[
                (TokenKind::EqualEqual, BinaryOp::Equal),
                (TokenKind::BangEqual, BinaryOp::NotEqual),
            ],
            Self::parse_comparison,
        )
    }

    fn parse_comparison(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_binary_level(
            &[
                (TokenKind::LessEqual, BinaryOp::LessEqual),
                (TokenKind::GreaterEqual, BinaryOp::GreaterEqual),
                (TokenKind::Less, BinaryOp::Less),
                (TokenKind::Greater, BinaryOp::Greater),
            ],
            Self::parse_term,
        )
    }

    fn parse_term(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_binary_level(
            &[
                (TokenKind::Plus, BinaryOp::Add),
                (TokenKind::Minus, BinaryOp::Sub),
            ],
            Self::parse_factor,
        )
    }

    fn parse_factor(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_binary_level(
            &[
                (TokenKind::Star, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
                (TokenKind::Percent, BinaryOp::Mod),
            ],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        let op = if self.matches(TokenKind::Minus) {
            UnaryOp::Negate
        } else if self.matches(TokenKind::Bang) {
            UnaryOp::Not
        } else {
            return self.parse_call();
        };
        let operator = self.previous().span;
        let right = self.parse_unary()?;
        Ok(Expr {
            span: SourceSpan::new(operator.start, right.span.end),
            kind: ExprKind::Unary {
                op,
                expr: Box::new(right),
            },
        })
    }

    fn parse_call(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.at_line_start()
                && (self.check(TokenKind::LParen) || self.check(TokenKind::LBracket))
            {
                break;
            }
            if self.matches(TokenKind::LParen) {
                let mut args = Vec::new();
                if !self.check(TokenKind::RParen) {
                    loop {
                        args.push(self.parse_expression()?);
                        if !self.matches(TokenKind::Comma) || self.check(TokenKind::RParen) {
                            break;
                        }
                    }
                }
                let paren = self.consume(TokenKind::RParen, "expected `)` after arguments")?;
                expr = Expr {
                    span: SourceSpan::new(expr.span.start, paren.span.end),
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                };
            } else if self.matches(TokenKind::LBracket) {
                let index = self.parse_expression()?;
                let bracket = self.consume(TokenKind::RBracket, "expected `]` after index")?;
                expr = Expr {
                    span: SourceSpan::new(expr.span.start, bracket.span.end),
                    kind: ExprKind::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    },
                };
            } else if self.matches(TokenKind::Dot) {
                let ident = self.consume_identifier("expected field after `.`")?;
                expr = Expr {
                    span: SourceSpan::new(expr.span.start, ident.span.end),
                    kind: ExprKind::Field {
                        target: Box::new(expr),
                        field: ident.lexeme,
                    },
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let Some(token) = self.peek() else {
            return Err(self.error_eof("unexpected end of expression"));
        };
        let literal = match &token.kind {
            TokenKind::Keyword(Keyword::True) => Literal::Bool(true),
            TokenKind::Keyword(Keyword::False) => Literal::Bool(false),
            TokenKind::Keyword(Keyword::None) => Literal::None,
            TokenKind::Number => number_literal(token)?,
            TokenKind::String => Literal::String(token.lexeme.clone()),
            TokenKind::Identifier => {
                let tok = self.advance();
                return Ok(Expr {
                    span: tok.span,
                    kind: ExprKind::Variable(tok.lexeme),
                });
            }
            TokenKind::LParen => {
                let lparen = self.advance();
                let inner = self.parse_expression()?;
                let rparen = self.consume(TokenKind::RParen, "expected `)` after expression")?;
                return Ok(Expr {
                    span: SourceSpan::new(lparen.span.start, rparen.span.end),
                    kind: ExprKind::Group(Box::new(inner)),
                });
            }
            TokenKind::LBracket => return self.parse_array_literal(),
            TokenKind::LBrace => return self.parse_map_literal(),
            _ => return Err(self.error(token, "unexpected token in expression")),
        };
        let tok = self.advance();
        Ok(Expr {
            span: tok.span,
            kind: ExprKind::Literal(literal),
        })
    }

    fn parse_array_literal(&mut self) -> Result<Expr, Diagnostic> {
        let lbracket = self.advance();
        let mut elements = Vec::new();
        while !self.check(TokenKind::RBracket) && !self.is_at_end() {
            elements.push(self.parse_expression()?);
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        let rbracket = self.consume(TokenKind::RBracket, "expected `]` after array literal")?;
        Ok(Expr {
            span: SourceSpan::new(lbracket.span.start, rbracket.span.end),
            kind: ExprKind::ArrayLiteral(elements),
        })
    }

    /// `{ key: value, "quoted key": value }`
    fn parse_map_literal(&mut self) -> Result<Expr, Diagnostic> {
        let lbrace = self.advance();
        let mut entries = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            let key = match self.peek() {
                Some(tok) if matches!(tok.kind, TokenKind::Identifier | TokenKind::String) => {
                    self.advance().lexeme
                }
                Some(tok) => return Err(self.error(tok, "expected map key")),
                None => return Err(self.error_eof("expected map key")),
            };
            self.consume(TokenKind::Colon, "expected `:` after map key")?;
            let value = self.parse_expression()?;
            entries.push((key, value));
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        let rbrace = self.consume(TokenKind::RBrace, "expected `}` after map literal")?;
        Ok(Expr {
            span: SourceSpan::new(lbrace.span.start, rbrace.span.end),
            kind: ExprKind::MapLiteral(entries),
        })
    }

    fn consume_optional_semicolon(&mut self) {
        let _ = self.matches(TokenKind::Semicolon);
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn matches_keyword(&mut self, keyword: Keyword) -> bool {
        self.matches(TokenKind::Keyword(keyword))
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token, Diagnostic> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self
                .peek()
                .map(|tok| self.error(tok, message))
                .unwrap_or_else(|| self.error_eof(message)))
        }
    }

    fn consume_identifier(&mut self, message: &str) -> Result<Token, Diagnostic> {
        self.consume(TokenKind::Identifier, message)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|token| token.kind == kind)
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous().clone()
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current)
    }

    fn peek_span(&self) -> SourceSpan {
        self.peek()
            .map(|token| token.span)
            .unwrap_or_else(|| SourceSpan::new(0, 0))
    }

    /// `-`, `(` and `[` opening a new line begin a new statement rather than
    /// continuing the expression above.
    fn at_line_start(&self) -> bool {
        self.peek().is_some_and(|token| token.starts_line)
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Eof) | None)
    }

    fn error(&self, token: &Token, message: &str) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::Parser, message.to_string()).with_span(token.span)
    }

    fn error_eof(&self, message: &str) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::Parser, message.to_string())
    }
}

fn number_literal(token: &Token) -> Result<Literal, Diagnostic> {
    let digits = token.lexeme.replace('_', "");
    let literal = if digits.contains('.') {
        digits.parse().map(Literal::Float).ok()
    } else {
        digits.parse().map(Literal::Int).ok()
    };
    literal.ok_or_else(|| {
        Diagnostic::new(
            DiagnosticKind::Parser,
            format!("invalid number literal `{}`", token.lexeme),
        )
        .with_span(token.span)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_binds_tighter_than_term() {
        let chunk = parse_chunk("1 + 2 * 3").unwrap();
        let StmtKind::Expr(expr) = &chunk.items[0].kind else {
            panic!("expected expression statement");
        };
        let ExprKind::Binary { op, right, .. } = &expr.kind else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn braces_open_a_block_in_statement_position_and_a_map_otherwise() {
        let chunk = parse_chunk("{ var x = 1 }\nvar m = { a: 1, \"b c\": 2 }").unwrap();
        assert!(matches!(chunk.items[0].kind, StmtKind::Block(_)));
        let StmtKind::VarDecl {
            initializer: Some(init),
            ..
        } = &chunk.items[1].kind
        else {
            panic!("expected var declaration");
        };
        let ExprKind::MapLiteral(entries) = &init.kind else {
            panic!("expected map literal");
        };
        let keys: Vec<_> = entries.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, ["a", "b c"]);
    }

    #[test]
    fn a_line_starting_with_a_prefix_token_is_a_new_statement() {
        let chunk = parse_chunk("var x = 1\n-x\nx\n[1, 2]\nx(1)\n- 2").unwrap();
        assert_eq!(chunk.items.len(), 6);
        assert!(matches!(
            &chunk.items[1].kind,
            StmtKind::Expr(Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Negate,
                    ..
                },
                ..
            })
        ));
        assert!(matches!(
            &chunk.items[2].kind,
            StmtKind::Expr(Expr {
                kind: ExprKind::Variable(_),
                ..
            })
        ));
        assert!(matches!(
            &chunk.items[3].kind,
            StmtKind::Expr(Expr {
                kind: ExprKind::ArrayLiteral(_),
                ..
            })
        ));
        assert!(matches!(
            &chunk.items[4].kind,
            StmtKind::Expr(Expr {
                kind: ExprKind::Call { .. },
                ..
            })
        ));
    }

    #[test]
    fn operators_ending_a_line_continue_the_expression() {
        let chunk = parse_chunk("var total = 1 -\n  2").unwrap();
        assert_eq!(chunk.items.len(), 1);
    }

    #[test]
    fn rejects_assignment_to_call() {
        let err = parse_chunk("f() = 1").unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::Parser);
        assert_eq!(err.message, "invalid assignment target");
    }

    #[test]
    fn else_if_chains_nest() {
        let chunk = parse_chunk("if a { } else if b { } else { }").unwrap();
        let StmtKind::If {
            else_branch: Some(else_branch),
            ..
        } = &chunk.items[0].kind
        else {
            panic!("expected if statement");
        };
        assert!(matches!(
            else_branch[0].kind,
            StmtKind::If {
                else_branch: Some(_),
                ..
            }
        ));
    }
}
