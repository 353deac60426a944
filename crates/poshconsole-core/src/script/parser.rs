use std::sync::Arc;

use poshconsole_types::PsValue;

use super::ast::{
    Argument, BinaryOp, CommandCall, CommandName, Element, Expr, Invocation, ParamDecl, ParseError,
    Pipeline, ScriptBlockAst, Span, Statement, StringPart, UnaryOp,
};
use super::lexer::{Lexer, Token, TokenKind};

/// Parses a whole script. The result owns its source text.
pub fn parse(source: &str) -> Result<ScriptBlockAst, ParseError> {
    let source: Arc<str> = Arc::from(source);
    let tokens = Lexer::new(&source).tokenize()?;
    let mut parser = Parser {
        source: Arc::clone(&source),
        tokens,
        pos: 0,
    };
    let (params, statements) = parser.block_body(None)?;
    parser.expect_eof()?;
    Ok(ScriptBlockAst {
        text: source.to_string(),
        source,
        params,
        statements,
    })
}

struct Parser {
    source: Arc<str>,
    tokens: Vec<Token>,
    pos: usize,
}

fn is_keyword(word: &str, keyword: &str) -> bool {
    word.eq_ignore_ascii_case(keyword)
}

impl Parser {
    // --- token plumbing ---

    fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_nth(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + n).min(last)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn at_word(&self, keyword: &str) -> bool {
        matches!(self.peek_kind(), TokenKind::Word(w) if is_keyword(w, keyword))
    }

    fn skip_newlines(&mut self) {
        while self.at(&TokenKind::NewLine) {
            self.advance();
        }
    }

    fn unexpected(&self) -> ParseError {
        let token = self.peek();
        match token.kind {
            TokenKind::Eof => ParseError::new(
                "Unexpected end of input.",
                "UnexpectedEndOfInput",
                token.span,
            ),
            _ => ParseError::new(
                format!(
                    "Unexpected token '{}' in expression or statement.",
                    token.kind.describe()
                ),
                "UnexpectedToken",
                token.span,
            ),
        }
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        if self.at(&TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_close(&mut self, close: &TokenKind, open: Span) -> Result<Span, ParseError> {
        if self.at(close) {
            return Ok(self.advance().span);
        }
        Err(match close {
            TokenKind::RBrace => ParseError::new(
                "Missing closing '}' in statement block or type definition.",
                "MissingEndCurlyBrace",
                open,
            ),
            _ if self.at(&TokenKind::Eof) => ParseError::new(
                "Missing closing ')' in expression.",
                "MissingEndParenthesisInExpression",
                open,
            ),
            _ => self.unexpected(),
        })
    }

    // --- statements ---

    /// Optional `param(...)` followed by statements up to `close` (or end of input).
    fn block_body(
        &mut self,
        close: Option<&TokenKind>,
    ) -> Result<(Vec<ParamDecl>, Vec<Statement>), ParseError> {
        self.skip_separators();
        let params = if self.at_word("param") && self.peek_nth(1).kind == TokenKind::LParen {
            self.advance();
            self.param_list()?
        } else {
            Vec::new()
        };
        let statements = self.statements(close)?;
        Ok((params, statements))
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek_kind(), TokenKind::NewLine | TokenKind::Semi) {
            self.advance();
        }
    }

    fn statements(&mut self, close: Option<&TokenKind>) -> Result<Vec<Statement>, ParseError> {
        let mut out = Vec::new();
        loop {
            self.skip_separators();
            if self.at(&TokenKind::Eof) || close.is_some_and(|c| self.at(c)) {
                return Ok(out);
            }
            out.push(self.statement()?);
            match self.peek_kind() {
                TokenKind::NewLine | TokenKind::Semi | TokenKind::Eof => {}
                kind if close.is_some_and(|c| c == kind) => {}
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn statement(&mut self) -> Result<Statement, ParseError> {
        let token = self.peek().clone();
        if let TokenKind::Word(word) = &token.kind {
            let next_is_paren = self.peek_nth(1).kind == TokenKind::LParen;
            match word.to_ascii_lowercase().as_str() {
                "function" | "filter" => return self.function(),
                "if" => return self.if_statement(),
                "foreach" if next_is_paren => return self.foreach_statement(),
                "while" => return self.while_statement(),
                "throw" => {
                    self.advance();
                    let value = self.optional_pipeline()?;
                    return Ok(Statement::Throw {
                        value,
                        span: token.span,
                    });
                }
                "exit" => {
                    self.advance();
                    return Ok(Statement::Exit(self.optional_pipeline()?));
                }
                "return" => {
                    self.advance();
                    return Ok(Statement::Return(self.optional_pipeline()?));
                }
                "break" => {
                    self.advance();
                    return Ok(Statement::Break);
                }
                "continue" => {
                    self.advance();
                    return Ok(Statement::Continue);
                }
                _ => {}
            }
        }

        if let TokenKind::Variable(name) = &token.kind
            && self.peek_nth(1).kind == TokenKind::Assign
        {
            self.advance();
            self.advance();
            self.skip_newlines();
            let value = self.pipeline()?;
            return Ok(Statement::Assignment {
                name: name.clone(),
                value,
            });
        }

        Ok(Statement::Pipeline(self.pipeline()?))
    }

    fn optional_pipeline(&mut self) -> Result<Option<Pipeline>, ParseError> {
        match self.peek_kind() {
            TokenKind::NewLine
            | TokenKind::Semi
            | TokenKind::Eof
            | TokenKind::RBrace
            | TokenKind::RParen => Ok(None),
            _ => self.pipeline().map(Some),
        }
    }

    fn param_list(&mut self) -> Result<Vec<ParamDecl>, ParseError> {
        let open = self.advance().span;
        let mut params = Vec::new();
        loop {
            self.skip_newlines();
            if self.at(&TokenKind::RParen) {
                self.advance();
                return Ok(params);
            }

            let mut switch = false;
            while self.at(&TokenKind::LBracket) {
                self.advance();
                if let TokenKind::Word(type_name) = self.peek_kind() {
                    switch |= is_keyword(type_name, "switch");
                }
                while !matches!(self.peek_kind(), TokenKind::RBracket | TokenKind::Eof) {
                    self.advance();
                }
                self.expect_close(&TokenKind::RBracket, open)?;
                self.skip_newlines();
            }

            let TokenKind::Variable(name) = self.peek_kind().clone() else {
                return Err(self.unexpected());
            };
            self.advance();
            let default = if self.at(&TokenKind::Assign) {
                self.advance();
                Some(self.expression()?)
            } else {
                None
            };
            params.push(ParamDecl {
                name,
                switch,
                default,
            });

            self.skip_newlines();
            if self.at(&TokenKind::Comma) {
                self.advance();
            } else if !self.at(&TokenKind::RParen) {
                self.expect_close(&TokenKind::RParen, open)?;
                return Ok(params);
            }
        }
    }

    fn function(&mut self) -> Result<Statement, ParseError> {
        let keyword = self.advance();
        let TokenKind::Word(name) = self.peek_kind().clone() else {
            return Err(ParseError::new(
                "Missing name after function keyword.",
                "MissingNameAfterKeyword",
                keyword.span,
            ));
        };
        self.advance();

        let outer_params = if self.at(&TokenKind::LParen) {
            Some(self.param_list()?)
        } else {
            None
        };
        self.skip_newlines();
        if !self.at(&TokenKind::LBrace) {
            return Err(ParseError::new(
                "Missing function body in function declaration.",
                "MissingFunctionBody",
                keyword.span,
            ));
        }
        let mut body = self.script_block()?;
        if let Some(params) = outer_params {
            body.params = params;
        }
        Ok(Statement::Function {
            name,
            body: Arc::new(body),
        })
    }

    fn condition(&mut self, keyword: &str, span: Span) -> Result<Pipeline, ParseError> {
        if !self.at(&TokenKind::LParen) {
            return Err(ParseError::new(
                format!("Missing '(' after '{keyword}' in {keyword} statement."),
                "MissingOpenParenthesisInIfStatement",
                span,
            ));
        }
        let open = self.advance().span;
        self.skip_newlines();
        let pipeline = self.pipeline()?;
        self.skip_newlines();
        self.expect_close(&TokenKind::RParen, open)?;
        Ok(pipeline)
    }

    fn statement_block(&mut self, after: &str, span: Span) -> Result<Vec<Statement>, ParseError> {
        self.skip_newlines();
        if !self.at(&TokenKind::LBrace) {
            return Err(ParseError::new(
                format!("Missing statement block after {after}."),
                "MissingStatementBlock",
                span,
            ));
        }
        let open = self.advance().span;
        let body = self.statements(Some(&TokenKind::RBrace))?;
        self.expect_close(&TokenKind::RBrace, open)?;
        Ok(body)
    }

    fn if_statement(&mut self) -> Result<Statement, ParseError> {
        let keyword = self.advance();
        let mut clauses = Vec::new();
        let condition = self.condition("if", keyword.span)?;
        let body = self.statement_block("if ( condition )", keyword.span)?;
        clauses.push((condition, body));

        let mut else_body = None;
        loop {
            let save = self.pos;
            self.skip_newlines();
            if self.at_word("elseif") {
                let span = self.advance().span;
                let condition = self.condition("elseif", span)?;
                let body = self.statement_block("elseif ( condition )", span)?;
                clauses.push((condition, body));
            } else if self.at_word("else") {
                let span = self.advance().span;
                else_body = Some(self.statement_block("else", span)?);
                break;
            } else {
                self.pos = save;
                break;
            }
        }
        Ok(Statement::If { clauses, else_body })
    }

    fn foreach_statement(&mut self) -> Result<Statement, ParseError> {
        let keyword = self.advance();
        let open = self.advance().span;
        let TokenKind::Variable(variable) = self.peek_kind().clone() else {
            return Err(ParseError::new(
                "Missing variable name after foreach.",
                "MissingVariableNameAfterForeach",
                self.peek().span,
            ));
        };
        self.advance();
        if !self.at_word("in") {
            return Err(ParseError::new(
                "Missing 'in' after variable in foreach loop.",
                "MissingInInForeach",
                self.peek().span,
            ));
        }
        self.advance();
        let items = self.pipeline()?;
        self.expect_close(&TokenKind::RParen, open)?;
        let body = self.statement_block("foreach ( ... )", keyword.span)?;
        Ok(Statement::Foreach {
            variable,
            items,
            body,
        })
    }

    fn while_statement(&mut self) -> Result<Statement, ParseError> {
        let keyword = self.advance();
        let condition = self.condition("while", keyword.span)?;
        let body = self.statement_block("while ( condition )", keyword.span)?;
        Ok(Statement::While { condition, body })
    }

    // --- pipelines and commands ---

    fn pipeline(&mut self) -> Result<Pipeline, ParseError> {
        let start = self.peek().span;
        let mut elements = vec![self.element()?];
        while self.at(&TokenKind::Pipe) {
            let pipe = self.advance();
            self.skip_newlines();
            if matches!(self.peek_kind(), TokenKind::Eof | TokenKind::Semi | TokenKind::RBrace | TokenKind::RParen) {
                return Err(ParseError::new(
                    "An empty pipe element is not allowed.",
                    "EmptyPipeElement",
                    pipe.span,
                ));
            }
            let element = self.element()?;
            if matches!(element, Element::Expression(_)) {
                return Err(ParseError::new(
                    "Expressions are only allowed as the first element of a pipeline.",
                    "ExpressionsMustBeFirstInPipeline",
                    pipe.span,
                ));
            }
            elements.push(element);
        }
        let end = self.tokens[self.pos.saturating_sub(1)].span;
        Ok(Pipeline {
            elements,
            span: start.to(end),
        })
    }

    fn element(&mut self) -> Result<Element, ParseError> {
        match self.peek_kind() {
            TokenKind::Word(_) => self.command(Invocation::Direct).map(Element::Command),
            TokenKind::Ampersand => {
                self.advance();
                self.command(Invocation::Call).map(Element::Command)
            }
            TokenKind::Dot if self.peek_nth(1).space_before => {
                self.advance();
                self.command(Invocation::DotSource).map(Element::Command)
            }
            _ => self.expression().map(Element::Expression),
        }
    }

    fn command(&mut self, invocation: Invocation) -> Result<CommandCall, ParseError> {
        let start = self.peek().span;
        let name = match self.peek_kind().clone() {
            TokenKind::Word(word) => {
                self.advance();
                CommandName::Bare(word)
            }
            TokenKind::Str(_)
            | TokenKind::ExpandableStr(_)
            | TokenKind::Variable(_)
            | TokenKind::LBrace
            | TokenKind::LParen
                if invocation != Invocation::Direct =>
            {
                CommandName::Expr(Box::new(self.postfix()?))
            }
            _ => {
                return Err(ParseError::new(
                    "The expression after '&' in a pipeline element produced an object that was not valid.",
                    "BadExpression",
                    start,
                ));
            }
        };

        let mut args = Vec::new();
        loop {
            match self.peek_kind().clone() {
                TokenKind::Pipe
                | TokenKind::Semi
                | TokenKind::NewLine
                | TokenKind::RParen
                | TokenKind::RBrace
                | TokenKind::Eof => break,
                TokenKind::Parameter { name, colon } => {
                    self.advance();
                    let value = if colon {
                        Some(self.command_argument()?)
                    } else {
                        None
                    };
                    args.push(Argument::Parameter { name, value });
                }
                _ => args.push(Argument::Value(self.command_argument()?)),
            }
        }

        let end = self.tokens[self.pos.saturating_sub(1)].span;
        Ok(CommandCall {
            invocation,
            name,
            args,
            span: start.to(end),
        })
    }

    /// An argument in command mode: barewords are strings, commas build arrays.
    fn command_argument(&mut self) -> Result<Expr, ParseError> {
        let mut items = vec![self.command_atom()?];
        while self.at(&TokenKind::Comma) {
            self.advance();
            self.skip_newlines();
            items.push(self.command_atom()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Array(items)
        })
    }

    fn command_atom(&mut self) -> Result<Expr, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::Word(word) => {
                self.advance();
                Ok(Expr::Literal(PsValue::from(word)))
            }
            TokenKind::Minus if !self.peek_nth(1).space_before => {
                self.advance();
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(self.postfix()?),
                })
            }
            _ => self.postfix(),
        }
    }

    // --- expressions ---

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.logical()
    }

    fn operator_param(&self) -> Option<BinaryOp> {
        match self.peek_kind() {
            TokenKind::Parameter { name, colon: false } => BinaryOp::from_operator(name),
            _ => None,
        }
    }

    fn operand(
        &mut self,
        op: BinaryOp,
        span: Span,
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        self.skip_newlines();
        if matches!(
            self.peek_kind(),
            TokenKind::Eof | TokenKind::RParen | TokenKind::RBrace | TokenKind::Semi | TokenKind::Pipe
        ) {
            return Err(ParseError::new(
                format!(
                    "You must provide a value expression following the '{}' operator.",
                    op.symbol()
                ),
                "ExpectedValueExpression",
                span,
            ));
        }
        next(self)
    }

    fn logical(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.comparison()?;
        while let Some(op @ (BinaryOp::And | BinaryOp::Or)) = self.operator_param() {
            let span = self.advance().span;
            let right = self.operand(op, span, Self::comparison)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.additive()?;
        while let Some(op) = self
            .operator_param()
            .filter(|op| !matches!(op, BinaryOp::And | BinaryOp::Or))
        {
            let span = self.advance().span;
            let right = self.operand(op, span, Self::additive)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            let span = self.advance().span;
            let right = self.operand(op, span, Self::multiplicative)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.array()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Word(w) if w == "%" => BinaryOp::Rem,
                _ => return Ok(left),
            };
            let span = self.advance().span;
            let right = self.operand(op, span, Self::array)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
    }

    fn array(&mut self) -> Result<Expr, ParseError> {
        let first = self.unary()?;
        if !self.at(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.at(&TokenKind::Comma) {
            self.advance();
            self.skip_newlines();
            items.push(self.unary()?);
        }
        Ok(Expr::Array(items))
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek_kind() {
            TokenKind::Minus => {
                self.advance();
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(self.unary()?),
                })
            }
            TokenKind::Bang => {
                self.advance();
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(self.unary()?),
                })
            }
            TokenKind::Parameter { name, colon: false } if is_keyword(name, "not") => {
                self.advance();
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(self.unary()?),
                })
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            let token = self.peek().clone();
            if token.space_before {
                return Ok(expr);
            }
            match token.kind {
                TokenKind::Dot => {
                    let member = self.peek_nth(1).clone();
                    let TokenKind::Word(name) = member.kind else {
                        return Err(ParseError::new(
                            "Missing property name after reference operator.",
                            "MissingPropertyName",
                            member.span,
                        ));
                    };
                    self.advance();
                    self.advance();
                    if self.at(&TokenKind::LParen) && !self.peek().space_before {
                        let open = self.advance().span;
                        let args = self.method_args(open)?;
                        expr = Expr::MethodCall {
                            object: Box::new(expr),
                            name,
                            args,
                            span: member.span,
                        };
                    } else {
                        expr = Expr::Member {
                            object: Box::new(expr),
                            name,
                        };
                    }
                }
                TokenKind::LBracket => {
                    let open = self.advance().span;
                    let index = self.expression()?;
                    self.expect_close(&TokenKind::RBracket, open)?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        span: open,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn method_args(&mut self, open: Span) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        self.skip_newlines();
        if self.at(&TokenKind::RParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.unary_chain()?);
            self.skip_newlines();
            if self.at(&TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
            } else {
                self.expect_close(&TokenKind::RParen, open)?;
                return Ok(args);
            }
        }
    }

    /// A full expression without the comma operator, for method arguments.
    fn unary_chain(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => return Ok(left),
            };
            let span = self.advance().span;
            let right = self.operand(op, span, Self::unary)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number(value) => {
                self.advance();
                Ok(Expr::Literal(value))
            }
            TokenKind::Str(text) => {
                self.advance();
                Ok(Expr::Literal(PsValue::from(text)))
            }
            TokenKind::ExpandableStr(raw) => {
                self.advance();
                expandable(&raw, token.span).map(Expr::Expandable)
            }
            TokenKind::Variable(name) => {
                self.advance();
                Ok(Expr::Variable(name))
            }
            TokenKind::DollarParen => {
                self.advance();
                let body = self.statements(Some(&TokenKind::RParen))?;
                self.expect_close(&TokenKind::RParen, token.span)?;
                Ok(Expr::SubExpr(body))
            }
            TokenKind::AtParen => {
                self.advance();
                let body = self.statements(Some(&TokenKind::RParen))?;
                self.expect_close(&TokenKind::RParen, token.span)?;
                Ok(Expr::ArrayExpr(body))
            }
            TokenKind::LParen => {
                self.advance();
                let body = self.statements(Some(&TokenKind::RParen))?;
                self.expect_close(&TokenKind::RParen, token.span)?;
                Ok(Expr::Paren(body))
            }
            TokenKind::LBrace => {
                let block = self.script_block()?;
                Ok(Expr::ScriptBlock(block.text))
            }
            _ => Err(self.unexpected()),
        }
    }

    /// `{ ... }` at the current token. The block's text is the source between the braces.
    fn script_block(&mut self) -> Result<ScriptBlockAst, ParseError> {
        let open = self.advance().span;
        let (params, statements) = self.block_body(Some(&TokenKind::RBrace))?;
        let close = self.expect_close(&TokenKind::RBrace, open)?;
        Ok(ScriptBlockAst {
            text: self.source[open.end..close.start].to_string(),
            source: Arc::clone(&self.source),
            params,
            statements,
        })
    }
}

/// Splits a double-quoted body into literal text, variables and sub-expressions.
fn expandable(raw: &str, span: Span) -> Result<Vec<StringPart>, ParseError> {
    let chars: Vec<char> = raw.chars().collect();
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    let flush = |text: &mut String, parts: &mut Vec<StringPart>| {
        if !text.is_empty() {
            parts.push(StringPart::Text(std::mem::take(text)));
        }
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            '`' if i + 1 < chars.len() => {
                text.push(match chars[i + 1] {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    'a' => '\u{7}',
                    'e' => '\u{1b}',
                    other => other,
                });
                i += 2;
            }
            '"' if chars.get(i + 1) == Some(&'"') => {
                text.push('"');
                i += 2;
            }
            '$' if chars.get(i + 1) == Some(&'(') => {
                let start = i + 2;
                let mut depth = 1;
                let mut j = start;
                let mut quoted = false;
                while j < chars.len() {
                    match chars[j] {
                        '"' | '\'' => quoted = !quoted,
                        '(' if !quoted => depth += 1,
                        ')' if !quoted => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    j += 1;
                }
                if depth != 0 {
                    return Err(ParseError::new(
                        "Missing closing ')' in subexpression.",
                        "MissingEndParenthesisInSubexpression",
                        span,
                    ));
                }
                let inner: String = chars[start..j].iter().collect();
                let block = parse(&inner).map_err(|mut e| {
                    e.span = span;
                    e
                })?;
                flush(&mut text, &mut parts);
                parts.push(StringPart::SubExpr(block.statements));
                i = j + 1;
            }
            '$' if chars
                .get(i + 1)
                .is_some_and(|n| n.is_alphanumeric() || *n == '_') =>
            {
                let mut j = i + 1;
                let mut name = String::new();
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                    name.push(chars[j]);
                    j += 1;
                }
                if chars.get(j) == Some(&':')
                    && chars
                        .get(j + 1)
                        .is_some_and(|n| n.is_alphanumeric() || *n == '_')
                {
                    name.push(':');
                    j += 1;
                    while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                        name.push(chars[j]);
                        j += 1;
                    }
                }
                flush(&mut text, &mut parts);
                parts.push(StringPart::Variable(name));
                i = j;
            }
            _ => {
                text.push(c);
                i += 1;
            }
        }
    }
    flush(&mut text, &mut parts);
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_pipeline(src: &str) -> Pipeline {
        match parse(src).unwrap().statements.remove(0) {
            Statement::Pipeline(p) => p,
            other => panic!("expected a pipeline, got {other:?}"),
        }
    }

    #[test]
    fn command_pipeline() {
        let pipeline = first_pipeline("Get-Thing -Name x -Force | Out-Default");
        assert_eq!(pipeline.elements.len(), 2);
        let Element::Command(call) = &pipeline.elements[0] else {
            panic!("expected a command");
        };
        assert_eq!(call.name, CommandName::Bare("Get-Thing".into()));
        assert_eq!(
            call.args,
            vec![
                Argument::Parameter {
                    name: "Name".into(),
                    value: None
                },
                Argument::Value(Expr::Literal(PsValue::from("x"))),
                Argument::Parameter {
                    name: "Force".into(),
                    value: None
                },
            ]
        );
    }

    #[test]
    fn arithmetic_precedence() {
        let pipeline = first_pipeline("1 + 2 * 3");
        let Element::Expression(Expr::Binary { op, right, .. }) = &pipeline.elements[0] else {
            panic!("expected a binary expression");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(**right, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn missing_close_brace() {
        let err = parse("{").unwrap_err();
        assert_eq!(err.error_id, "MissingEndCurlyBrace");
        assert_eq!((err.span.line, err.span.column), (1, 1));
    }

    #[test]
    fn expression_after_pipe_is_rejected() {
        let err = parse("Get-Thing | 1").unwrap_err();
        assert_eq!(err.error_id, "ExpressionsMustBeFirstInPipeline");
    }

    #[test]
    fn function_with_param_block() {
        let script = parse("function Greet { param($Name, [switch]$Loud) \"hi $Name\" }").unwrap();
        let Statement::Function { name, body } = &script.statements[0] else {
            panic!("expected a function");
        };
        assert_eq!(name, "Greet");
        assert_eq!(body.params.len(), 2);
        assert!(body.params[1].switch);
        assert!(body.text.contains("param($Name"));
    }

    #[test]
    fn if_elseif_else_across_lines() {
        let script = parse("if ($a) { 1 }\nelseif ($b) { 2 }\nelse { 3 }").unwrap();
        let Statement::If { clauses, else_body } = &script.statements[0] else {
            panic!("expected an if statement");
        };
        assert_eq!(clauses.len(), 2);
        assert!(else_body.is_some());
    }

    #[test]
    fn expandable_string_parts() {
        let parts = expandable("a $x b $(1 + 2) `$y", Span::default()).unwrap();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[1], StringPart::Variable("x".into()));
        assert!(matches!(parts[3], StringPart::SubExpr(_)));
        assert_eq!(parts[4], StringPart::Text(" $y".into()));
    }

    #[test]
    fn dot_source_and_call_operator() {
        let pipeline = first_pipeline(". 'C:\\p.ps1'");
        let Element::Command(call) = &pipeline.elements[0] else {
            panic!("expected a command");
        };
        assert_eq!(call.invocation, Invocation::DotSource);

        let pipeline = first_pipeline("& { 1 }");
        let Element::Command(call) = &pipeline.elements[0] else {
            panic!("expected a command");
        };
        assert_eq!(call.invocation, Invocation::Call);
        assert!(matches!(call.name, CommandName::Expr(_)));
    }

    #[test]
    fn member_access_binds_without_space() {
        let pipeline = first_pipeline("$x.Name.Length");
        assert!(matches!(
            &pipeline.elements[0],
            Element::Expression(Expr::Member { name, .. }) if name == "Length"
        ));
    }
}
