use std::rc::Rc;

use crate::{
    ast::{
        BinaryOp, Expr, ExprKind, FunctionDecl, Literal, LogicalOp, Param, Program, Stmt,
        StmtKind, SwitchCase, UnaryOp,
    },
    diagnostics::Diagnostic,
    lexer::{Keyword, Op, Token, TokenKind},
};

/// Builds a `Program` from a token stream.
///
/// Statement dispatch is keyed on the leading keyword; expressions use
/// precedence climbing, tightest to loosest:
/// `primary < unary < factor < range < term < comparison < equality
/// < logical < nil-coalescing < ternary`.
pub fn parse(tokens: Vec<Token>, file_path: Option<&str>) -> Result<Program, Diagnostic> {
    let mut parser = Parser::new(tokens, file_path);
    let mut statements = Vec::new();
    loop {
        parser.skip_newlines();
        if parser.check(&TokenKind::Eof) {
            break;
        }
        statements.push(parser.parse_statement()?);
    }
    Ok(statements)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    current: usize,
    file_path: Option<&'a str>,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token>, file_path: Option<&'a str>) -> Parser<'a> {
        Parser {
            tokens,
            current: 0,
            file_path,
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt, Diagnostic> {
        self.skip_newlines();
        let token = self.peek().clone();
        let (line, column) = (token.line, token.column);
        let kind = match &token.kind {
            TokenKind::Keyword(Keyword::Say) => {
                self.advance();
                self.parse_say()?
            }
            TokenKind::Keyword(Keyword::Set) => {
                self.advance();
                self.parse_set()?
            }
            TokenKind::Keyword(Keyword::Const) => {
                self.advance();
                self.parse_const()?
            }
            TokenKind::Keyword(Keyword::Check) => {
                self.advance();
                self.parse_check()?
            }
            TokenKind::Keyword(Keyword::Loop) => {
                self.advance();
                self.parse_loop()?
            }
            TokenKind::Keyword(Keyword::For) => {
                self.advance();
                self.parse_for()?
            }
            TokenKind::Keyword(Keyword::Fn) => {
                self.advance();
                self.parse_function()?
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                self.parse_return()?
            }
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                self.expect_newline()?;
                StmtKind::Break
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.advance();
                self.expect_newline()?;
                StmtKind::Continue
            }
            TokenKind::Keyword(Keyword::Try) => {
                self.advance();
                self.parse_try()?
            }
            TokenKind::Keyword(Keyword::Switch) => {
                self.advance();
                self.parse_switch()?
            }
            TokenKind::Keyword(Keyword::Import) => {
                self.advance();
                self.parse_import()?
            }
            TokenKind::Keyword(Keyword::Export) => {
                self.advance();
                self.parse_export()?
            }
            TokenKind::Keyword(Keyword::Use) => {
                self.advance();
                self.parse_use()?
            }
            _ => return Err(self.error(&token, "Expected statement")),
        };
        Ok(Stmt { kind, line, column })
    }

    fn parse_say(&mut self) -> Result<StmtKind, Diagnostic> {
        let expression = self.parse_expression()?;
        self.expect_newline()?;
        Ok(StmtKind::Say(expression))
    }

    fn parse_set(&mut self) -> Result<StmtKind, Diagnostic> {
        let name = self.expect_identifier("Expected variable name")?.lexeme;
        if self.check(&TokenKind::Op(Op::EqEq)) {
            let token = self.peek().clone();
            return Err(self
                .error(&token, "Expected =")
                .with_hint("Use \"=\" for assignment, not \"==\""));
        }
        self.expect_op(Op::Assign, "Expected =")?;
        let expression = self.parse_expression()?;
        self.expect_newline()?;
        Ok(StmtKind::Set { name, expression })
    }

    fn parse_const(&mut self) -> Result<StmtKind, Diagnostic> {
        let name = self.expect_identifier("Expected variable name")?.lexeme;
        self.expect_op(Op::Assign, "Expected =")?;
        let expression = self.parse_expression()?;
        self.expect_newline()?;
        Ok(StmtKind::Const { name, expression })
    }

    fn parse_check(&mut self) -> Result<StmtKind, Diagnostic> {
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::BlockStart, "Expected {")?;
        let body = self.parse_block()?;
        self.skip_newlines();
        let else_body = if self.match_keyword(Keyword::Else) {
            self.expect(&TokenKind::BlockStart, "Expected {")?;
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(StmtKind::Check {
            condition,
            body,
            else_body,
        })
    }

    fn parse_loop(&mut self) -> Result<StmtKind, Diagnostic> {
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::BlockStart, "Expected {")?;
        let body = self.parse_block()?;
        Ok(StmtKind::Loop { condition, body })
    }

    fn parse_for(&mut self) -> Result<StmtKind, Diagnostic> {
        let variable = self.expect_identifier("Expected variable name")?.lexeme;
        if !self.match_keyword(Keyword::In) {
            let token = self.peek().clone();
            return Err(self.error(&token, "Expected in"));
        }
        let iterable = self.parse_expression()?;
        self.expect(&TokenKind::BlockStart, "Expected {")?;
        let body = self.parse_block()?;
        Ok(StmtKind::For {
            variable,
            iterable,
            body,
        })
    }

    fn parse_function(&mut self) -> Result<StmtKind, Diagnostic> {
        let name = self.expect_identifier("Expected function name")?.lexeme;
        self.expect_op(Op::LParen, "Expected (")?;
        let mut params = Vec::new();
        let mut rest = None;
        if !self.check(&TokenKind::Op(Op::RParen)) {
            loop {
                if self.match_op(Op::Ellipsis) {
                    let rest_name = self.expect_identifier("Expected parameter name")?;
                    if rest.is_some() || !self.check(&TokenKind::Op(Op::RParen)) {
                        return Err(self.error(&rest_name, "Rest parameter must be last"));
                    }
                    rest = Some(rest_name.lexeme);
                    break;
                }
                let param_name = self.expect_identifier("Expected parameter name")?.lexeme;
                let default = if self.match_op(Op::Assign) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                params.push(Param {
                    name: param_name,
                    default,
                });
                if !self.match_op(Op::Comma) {
                    break;
                }
            }
        }
        self.expect_op(Op::RParen, "Expected )")?;
        self.expect(&TokenKind::BlockStart, "Expected {")?;
        let body = self.parse_block()?;
        Ok(StmtKind::Function(Rc::new(FunctionDecl {
            name,
            params,
            rest,
            body,
        })))
    }

    fn parse_return(&mut self) -> Result<StmtKind, Diagnostic> {
        let expression = if self.check_statement_end() {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_newline()?;
        Ok(StmtKind::Return(expression))
    }

    fn parse_try(&mut self) -> Result<StmtKind, Diagnostic> {
        self.expect(&TokenKind::BlockStart, "Expected {")?;
        let body = self.parse_block()?;
        self.skip_newlines();
        let catch = if self.match_keyword(Keyword::Catch) {
            let param = self.expect_identifier("Expected catch parameter")?.lexeme;
            self.expect(&TokenKind::BlockStart, "Expected {")?;
            Some((param, self.parse_block()?))
        } else {
            None
        };
        self.skip_newlines();
        let finally = if self.match_keyword(Keyword::Finally) {
            self.expect(&TokenKind::BlockStart, "Expected {")?;
            Some(self.parse_block()?)
        } else {
            None
        };
        if catch.is_none() && finally.is_none() {
            let token = self.peek().clone();
            return Err(self.error(&token, "Expected catch or finally"));
        }
        Ok(StmtKind::Try {
            body,
            catch,
            finally,
        })
    }

    fn parse_switch(&mut self) -> Result<StmtKind, Diagnostic> {
        let subject = self.parse_expression()?;
        self.expect(&TokenKind::BlockStart, "Expected {")?;
        self.skip_newlines();
        let mut cases = Vec::new();
        while self.match_keyword(Keyword::Case) {
            let value = self.parse_expression()?;
            self.expect_op(Op::Colon, "Expected :")?;
            let body = self.parse_case_body()?;
            cases.push(SwitchCase { value, body });
        }
        let default = if self.match_keyword(Keyword::Default) {
            self.expect_op(Op::Colon, "Expected :")?;
            Some(self.parse_case_body()?)
        } else {
            None
        };
        self.expect(&TokenKind::BlockEnd, "Expected }")?;
        Ok(StmtKind::Switch {
            subject,
            cases,
            default,
        })
    }

    /// Case bodies run until the next `case`, `default`, or the switch's
    /// closing brace.
    fn parse_case_body(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        let mut statements = Vec::new();
        loop {
            self.skip_newlines();
            match &self.peek().kind {
                TokenKind::Keyword(Keyword::Case)
                | TokenKind::Keyword(Keyword::Default)
                | TokenKind::BlockEnd
                | TokenKind::Eof => break,
                _ => statements.push(self.parse_statement()?),
            }
        }
        Ok(statements)
    }

    /// `import { a, b } from "module"` is a thin alias for
    /// `use module { a, b }` and produces the same node.
    fn parse_import(&mut self) -> Result<StmtKind, Diagnostic> {
        self.expect(&TokenKind::BlockStart, "Expected {")?;
        let names = self.parse_name_list()?;
        let from = self.expect_identifier("Expected from")?;
        if from.lexeme != "from" {
            return Err(self.error(&from, "Expected from"));
        }
        let module = self.expect(&TokenKind::Str, "Expected module path")?.lexeme;
        self.expect_newline()?;
        Ok(StmtKind::Use { module, names })
    }

    fn parse_export(&mut self) -> Result<StmtKind, Diagnostic> {
        let name = self.expect_identifier("Expected export name")?.lexeme;
        let expression = if self.check_statement_end() {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_newline()?;
        Ok(StmtKind::Export { name, expression })
    }

    fn parse_use(&mut self) -> Result<StmtKind, Diagnostic> {
        let module = self.expect_identifier("Expected module name")?.lexeme;
        self.skip_newlines();
        self.expect(&TokenKind::BlockStart, "Expected {")?;
        let names = self.parse_name_list()?;
        self.expect_newline()?;
        Ok(StmtKind::Use { module, names })
    }

    fn parse_name_list(&mut self) -> Result<Vec<String>, Diagnostic> {
        self.skip_newlines();
        let mut names = Vec::new();
        while !self.check(&TokenKind::BlockEnd) {
            names.push(self.expect_identifier("Expected identifier in import list")?.lexeme);
            self.skip_newlines();
            if !self.check(&TokenKind::BlockEnd) {
                self.expect_op(Op::Comma, "Expected , or }")?;
                self.skip_newlines();
            }
        }
        self.advance();
        Ok(names)
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        let mut statements = Vec::new();
        loop {
            self.skip_newlines();
            if self.check(&TokenKind::BlockEnd) || self.check(&TokenKind::Eof) {
                break;
            }
            statements.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::BlockEnd, "Expected }")?;
        Ok(statements)
    }

    fn parse_expression(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<Expr, Diagnostic> {
        let expression = self.parse_nil_coalescing()?;
        if self.match_op(Op::Question) {
            let then_branch = self.parse_expression()?;
            self.expect_op(Op::Colon, "Expected :")?;
            let else_branch = self.parse_ternary()?;
            return Ok(Expr {
                line: expression.line,
                column: expression.column,
                kind: ExprKind::Ternary {
                    condition: Box::new(expression),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                },
            });
        }
        Ok(expression)
    }

    fn parse_nil_coalescing(&mut self) -> Result<Expr, Diagnostic> {
        let expression = self.parse_logical()?;
        if self.match_op(Op::QuestionQuestion) {
            let right = self.parse_nil_coalescing()?;
            return Ok(Expr {
                line: expression.line,
                column: expression.column,
                kind: ExprKind::NilCoalescing {
                    left: Box::new(expression),
                    right: Box::new(right),
                },
            });
        }
        Ok(expression)
    }

    fn parse_logical(&mut self) -> Result<Expr, Diagnostic> {
        let mut expression = self.parse_equality()?;
        loop {
            let op = if self.match_keyword(Keyword::And) {
                LogicalOp::And
            } else if self.match_keyword(Keyword::Or) {
                LogicalOp::Or
            } else {
                break;
            };
            let right = self.parse_equality()?;
            expression = Expr {
                line: expression.line,
                column: expression.column,
                kind: ExprKind::Logical {
                    op,
                    left: Box::new(expression),
                    right: Box::new(right),
                },
            };
        }
        Ok(expression)
    }

    fn parse_equality(&mut self) -> Result<Expr, Diagnostic> {
        let mut expression = self.parse_comparison()?;
        loop {
            let op = if self.match_op(Op::EqEq) {
                BinaryOp::Equal
            } else if self.match_op(Op::NotEq) {
                BinaryOp::NotEqual
            } else {
                break;
            };
            let right = self.parse_comparison()?;
            expression = self.binary(expression, op, right);
        }
        Ok(expression)
    }

    fn parse_comparison(&mut self) -> Result<Expr, Diagnostic> {
        let mut expression = self.parse_term()?;
        loop {
            let op = if self.match_op(Op::GreaterEq) {
                BinaryOp::GreaterEqual
            } else if self.match_op(Op::LessEq) {
                BinaryOp::LessEqual
            } else if self.match_op(Op::Greater) {
                BinaryOp::Greater
            } else if self.match_op(Op::Less) {
                BinaryOp::Less
            } else {
                break;
            };
            let right = self.parse_term()?;
            expression = self.binary(expression, op, right);
        }
        Ok(expression)
    }

    fn parse_term(&mut self) -> Result<Expr, Diagnostic> {
        let mut expression = self.parse_range()?;
        loop {
            let op = if self.match_op(Op::Plus) {
                BinaryOp::Add
            } else if self.match_op(Op::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.parse_range()?;
            expression = self.binary(expression, op, right);
        }
        Ok(expression)
    }

    fn parse_range(&mut self) -> Result<Expr, Diagnostic> {
        let expression = self.parse_factor()?;
        if self.match_op(Op::DotDot) {
            let end = self.parse_factor()?;
            return Ok(Expr {
                line: expression.line,
                column: expression.column,
                kind: ExprKind::Range {
                    start: Box::new(expression),
                    end: Box::new(end),
                },
            });
        }
        Ok(expression)
    }

    fn parse_factor(&mut self) -> Result<Expr, Diagnostic> {
        let mut expression = self.parse_unary()?;
        loop {
            let op = if self.match_op(Op::Star) {
                BinaryOp::Mul
            } else if self.match_op(Op::Slash) {
                BinaryOp::Div
            } else if self.match_op(Op::Percent) {
                BinaryOp::Mod
            } else {
                break;
            };
            let right = self.parse_unary()?;
            expression = self.binary(expression, op, right);
        }
        Ok(expression)
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        let token = self.peek().clone();
        if self.match_keyword(Keyword::Not) {
            let right = self.parse_unary()?;
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(right),
                },
                line: token.line,
                column: token.column,
            });
        }
        if self.match_op(Op::Minus) {
            let right = self.parse_unary()?;
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Negate,
                    expr: Box::new(right),
                },
                line: token.line,
                column: token.column,
            });
        }
        if self.match_keyword(Keyword::Await) {
            let expression = self.parse_unary()?;
            return Ok(Expr {
                kind: ExprKind::Await(Box::new(expression)),
                line: token.line,
                column: token.column,
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let token = self.peek().clone();
        let (line, column) = (token.line, token.column);
        let kind = match &token.kind {
            TokenKind::Number => {
                self.advance();
                let value = token.lexeme.parse::<f64>().unwrap_or(0.0);
                ExprKind::Literal(Literal::Number(value))
            }
            TokenKind::Str => {
                self.advance();
                ExprKind::Literal(Literal::Str(token.lexeme.clone()))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                ExprKind::Literal(Literal::Bool(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                ExprKind::Literal(Literal::Bool(false))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                ExprKind::Literal(Literal::Null)
            }
            TokenKind::ArrayStart => {
                self.advance();
                self.parse_array()?
            }
            TokenKind::BlockStart => {
                self.advance();
                self.parse_object()?
            }
            TokenKind::Ident => {
                self.advance();
                return self.parse_identifier_suffixes(token);
            }
            TokenKind::Op(Op::LParen) => {
                self.advance();
                let expression = self.parse_expression()?;
                self.expect_op(Op::RParen, "Expected )")?;
                return Ok(expression);
            }
            _ => return Err(self.error(&token, "Expected expression")),
        };
        Ok(Expr { kind, line, column })
    }

    /// An identifier primary may chain `[index]` suffixes, one optional
    /// `?.prop`, and one optional call.
    fn parse_identifier_suffixes(&mut self, ident: Token) -> Result<Expr, Diagnostic> {
        let mut expression = Expr {
            kind: ExprKind::Variable(ident.lexeme.clone()),
            line: ident.line,
            column: ident.column,
        };
        if self.check(&TokenKind::Op(Op::LParen)) {
            self.advance();
            let args = self.parse_call_args()?;
            return Ok(Expr {
                kind: ExprKind::Call {
                    name: ident.lexeme,
                    args,
                },
                line: ident.line,
                column: ident.column,
            });
        }
        while self.match_op_token(&TokenKind::ArrayStart) {
            let index = self.parse_expression()?;
            self.expect(&TokenKind::ArrayEnd, "Expected ]")?;
            expression = Expr {
                line: expression.line,
                column: expression.column,
                kind: ExprKind::Index {
                    object: Box::new(expression),
                    index: Box::new(index),
                },
            };
        }
        if self.match_op(Op::QuestionDot) {
            let property = self.expect_identifier("Expected property name")?.lexeme;
            expression = Expr {
                line: expression.line,
                column: expression.column,
                kind: ExprKind::OptionalChain {
                    object: Box::new(expression),
                    property,
                },
            };
        }
        Ok(expression)
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, Diagnostic> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::Op(Op::RParen)) {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_op(Op::Comma) {
                    break;
                }
            }
        }
        self.expect_op(Op::RParen, "Expected )")?;
        Ok(args)
    }

    fn parse_array(&mut self) -> Result<ExprKind, Diagnostic> {
        let mut elements = Vec::new();
        self.skip_newlines();
        if !self.check(&TokenKind::ArrayEnd) {
            loop {
                elements.push(self.parse_expression()?);
                self.skip_newlines();
                if !self.match_op(Op::Comma) {
                    break;
                }
                self.skip_newlines();
            }
        }
        self.expect(&TokenKind::ArrayEnd, "Expected ]")?;
        Ok(ExprKind::Array(elements))
    }

    fn parse_object(&mut self) -> Result<ExprKind, Diagnostic> {
        let mut properties = Vec::new();
        self.skip_newlines();
        if !self.check(&TokenKind::BlockEnd) {
            loop {
                let key = self.expect_identifier("Expected property name")?.lexeme;
                self.expect_op(Op::Colon, "Expected :")?;
                let value = self.parse_expression()?;
                properties.push((key, value));
                self.skip_newlines();
                if !self.match_op(Op::Comma) {
                    break;
                }
                self.skip_newlines();
            }
        }
        self.expect(&TokenKind::BlockEnd, "Expected }")?;
        Ok(ExprKind::Object(properties))
    }

    fn binary(&self, left: Expr, op: BinaryOp, right: Expr) -> Expr {
        Expr {
            line: left.line,
            column: left.column,
            kind: ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        }
    }

    fn match_op(&mut self, op: Op) -> bool {
        if self.check(&TokenKind::Op(op)) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_op_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_keyword(&mut self, keyword: Keyword) -> bool {
        if self.check(&TokenKind::Keyword(keyword)) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, message: &str) -> Result<Token, Diagnostic> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            let token = self.peek().clone();
            Err(self.error(&token, message))
        }
    }

    fn expect_op(&mut self, op: Op, message: &str) -> Result<Token, Diagnostic> {
        self.expect(&TokenKind::Op(op), message)
    }

    fn expect_identifier(&mut self, message: &str) -> Result<Token, Diagnostic> {
        self.expect(&TokenKind::Ident, message)
    }

    /// Every statement ends at a newline, a closing brace, or end of input;
    /// trailing newlines are then consumed.
    fn expect_newline(&mut self) -> Result<(), Diagnostic> {
        match &self.peek().kind {
            TokenKind::Newline | TokenKind::BlockEnd | TokenKind::Eof => {}
            _ => {
                let token = self.peek().clone();
                return Err(self.error(&token, "Expected newline"));
            }
        }
        self.skip_newlines();
        Ok(())
    }

    fn check_statement_end(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Newline | TokenKind::BlockEnd | TokenKind::Eof
        )
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek().kind == *kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !matches!(token.kind, TokenKind::Eof) {
            self.current += 1;
        }
        token
    }

    fn peek(&self) -> &Token {
        // The stream always ends with Eof, so `current` stays in bounds.
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek().kind, TokenKind::Newline) {
            self.advance();
        }
    }

    fn error(&self, token: &Token, message: &str) -> Diagnostic {
        let mut diagnostic =
            Diagnostic::syntax(message).with_position(token.line, token.column);
        if let Some(file) = self.file_path {
            diagnostic = diagnostic.with_file(file);
        }
        diagnostic
    }
}
