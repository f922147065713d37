//! Recursive-descent parser.
//!
//! Consumes the flat token stream from [`crate::lex`] and produces
//! positionally-annotated AST nodes. Expression parsing is precedence
//! climbing: ternary < or < and < not < comparison-chain < `|` < `^` < `&` <
//! shift < additive < multiplicative < unary < power < postfix < atom.
//!
//! The parser never panics on malformed input; every failure returns a
//! structured error with a line number.

use std::rc::Rc;

use crate::{
    ast::{
        BinOp, Block, CallArg, CmpOp, CompClause, DictItem, ExceptHandler, Expr, ExprLoc, FuncDecl, Literal,
        MatchCase, Param, Params, Pattern, Stmt, StmtLoc, Target, UnaryOp, stmt_contains_yield,
    },
    error::Error,
    lex::{Op, Token, TokenKind, tokenize},
};

/// Maximum combined expression and block nesting depth. Prevents stack
/// overflow from inputs like `((((((…))))))` or thousands of nested `if`
/// suites before the host's stack runs out.
const MAX_NESTING_DEPTH: u32 = 120;

/// Parses a complete module source into a statement list.
pub(crate) fn parse_module(source: &str) -> Result<Vec<StmtLoc>, Error> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let body = parser.parse_statements_until_end()?;
    Ok(body)
}

/// Parses a single expression (used for f-string interpolations).
pub(crate) fn parse_expression(source: &str, line: u32) -> Result<ExprLoc, Error> {
    let mut tokens = tokenize(source).map_err(|e| Error::syntax(e.message, line))?;
    // The embedded expression inherits the line of its enclosing f-string.
    for t in &mut tokens {
        t.line = line;
    }
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_testlist()?;
    parser.skip_newlines();
    if !parser.at_end() {
        return Err(parser.unexpected("end of expression"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: u32,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0, depth: 0 }
    }

    // --- token access -------------------------------------------------------

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn line(&self) -> u32 {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map_or(1, |t| t.line)
    }

    fn bump(&mut self) -> Option<TokenKind> {
        let t = self.tokens.get(self.pos).map(|t| t.kind.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn at_op(&self, op: Op) -> bool {
        matches!(self.peek(), Some(TokenKind::Op(o)) if *o == op)
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(TokenKind::Keyword(k)) if *k == kw)
    }

    fn at_name(&self, name: &str) -> bool {
        matches!(self.peek(), Some(TokenKind::Name(n)) if n == name)
    }

    fn eat_op(&mut self, op: Op) -> bool {
        if self.at_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.at_keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: Op) -> Result<(), Error> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", op.symbol())))
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), Error> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{kw}'")))
        }
    }

    fn expect_name(&mut self) -> Result<String, Error> {
        match self.peek() {
            Some(TokenKind::Name(_)) => {
                let Some(TokenKind::Name(n)) = self.bump() else {
                    unreachable!()
                };
                Ok(n)
            }
            _ => Err(self.unexpected("a name")),
        }
    }

    fn unexpected(&self, wanted: &str) -> Error {
        let found = self
            .peek()
            .map_or_else(|| "end of input".to_string(), TokenKind::describe);
        Error::syntax(format!("SyntaxError: expected {wanted}, found {found}"), self.line())
    }

    fn syntax_error(&self, message: impl Into<String>) -> Error {
        Error::syntax(format!("SyntaxError: {}", message.into()), self.line())
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Some(TokenKind::Newline)) {
            self.pos += 1;
        }
    }

    /// Recursion-depth bookkeeping, shared by expression parsing and block
    /// parsing. Increments leak on the error path, which is fine: any parse
    /// error aborts the whole parse.
    fn enter(&mut self) -> Result<(), Error> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(self.syntax_error("nesting is too deep"));
        }
        Ok(())
    }

    // --- statements ---------------------------------------------------------

    fn parse_statements_until_end(&mut self) -> Result<Vec<StmtLoc>, Error> {
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            if self.at_end() {
                return Ok(body);
            }
            self.parse_statement_into(&mut body)?;
        }
    }

    /// Parses one logical line (which may hold several `;`-separated simple
    /// statements, appended individually) or one compound statement.
    fn parse_statement_into(&mut self, out: &mut Vec<StmtLoc>) -> Result<(), Error> {
        let line = self.line();
        match self.peek() {
            Some(TokenKind::Keyword(kw)) => match *kw {
                "if" => {
                    let stmt = self.parse_if()?;
                    out.push(StmtLoc { line, node: stmt });
                    Ok(())
                }
                "while" => {
                    let stmt = self.parse_while()?;
                    out.push(StmtLoc { line, node: stmt });
                    Ok(())
                }
                "for" => {
                    let stmt = self.parse_for()?;
                    out.push(StmtLoc { line, node: stmt });
                    Ok(())
                }
                "def" => {
                    let stmt = self.parse_def(Vec::new())?;
                    out.push(StmtLoc { line, node: stmt });
                    Ok(())
                }
                "class" => {
                    let stmt = self.parse_class(Vec::new())?;
                    out.push(StmtLoc { line, node: stmt });
                    Ok(())
                }
                "try" => {
                    let stmt = self.parse_try()?;
                    out.push(StmtLoc { line, node: stmt });
                    Ok(())
                }
                "with" => {
                    let stmt = self.parse_with()?;
                    out.push(StmtLoc { line, node: stmt });
                    Ok(())
                }
                _ => self.parse_simple_statement_line(out),
            },
            Some(TokenKind::Op(Op::At)) => {
                let stmt = self.parse_decorated()?;
                out.push(StmtLoc { line, node: stmt });
                Ok(())
            }
            Some(TokenKind::Name(n)) if n == "match" => {
                // `match` is contextual: attempt a match statement, fall back
                // to an ordinary expression line on any failure.
                let saved = (self.pos, self.depth);
                match self.parse_match() {
                    Ok(stmt) => {
                        out.push(StmtLoc { line, node: stmt });
                        Ok(())
                    }
                    Err(_) => {
                        (self.pos, self.depth) = saved;
                        self.parse_simple_statement_line(out)
                    }
                }
            }
            Some(_) => self.parse_simple_statement_line(out),
            None => Ok(()),
        }
    }

    /// Parses `;`-separated simple statements up to the end of the line.
    fn parse_simple_statement_line(&mut self, out: &mut Vec<StmtLoc>) -> Result<(), Error> {
        loop {
            let line = self.line();
            let node = self.parse_simple_statement()?;
            out.push(StmtLoc { line, node });
            if self.eat_op(Op::Semicolon) {
                if matches!(self.peek(), Some(TokenKind::Newline | TokenKind::Dedent) | None) {
                    // Trailing semicolon.
                    self.skip_one_newline();
                    return Ok(());
                }
                continue;
            }
            self.expect_end_of_line()?;
            return Ok(());
        }
    }

    fn skip_one_newline(&mut self) {
        if matches!(self.peek(), Some(TokenKind::Newline)) {
            self.pos += 1;
        }
    }

    fn expect_end_of_line(&mut self) -> Result<(), Error> {
        match self.peek() {
            Some(TokenKind::Newline) => {
                self.pos += 1;
                Ok(())
            }
            None | Some(TokenKind::Dedent) => Ok(()),
            _ => Err(self.unexpected("end of line")),
        }
    }

    fn parse_simple_statement(&mut self) -> Result<Stmt, Error> {
        match self.peek() {
            Some(TokenKind::Keyword(kw)) => match *kw {
                "return" => {
                    self.pos += 1;
                    if self.at_line_end() {
                        Ok(Stmt::Return(None))
                    } else {
                        Ok(Stmt::Return(Some(self.parse_testlist_or_yield()?)))
                    }
                }
                "pass" => {
                    self.pos += 1;
                    Ok(Stmt::Pass)
                }
                "break" => {
                    self.pos += 1;
                    Ok(Stmt::Break)
                }
                "continue" => {
                    self.pos += 1;
                    Ok(Stmt::Continue)
                }
                "raise" => {
                    self.pos += 1;
                    if self.at_line_end() {
                        Ok(Stmt::Raise(None))
                    } else {
                        let exc = self.parse_test()?;
                        // `raise X from Y` - the cause is parsed and discarded.
                        if self.eat_keyword("from") {
                            let _cause = self.parse_test()?;
                        }
                        Ok(Stmt::Raise(Some(exc)))
                    }
                }
                "assert" => {
                    self.pos += 1;
                    let cond = self.parse_test()?;
                    let msg = if self.eat_op(Op::Comma) {
                        Some(self.parse_test()?)
                    } else {
                        None
                    };
                    Ok(Stmt::Assert { cond, msg })
                }
                "del" => {
                    self.pos += 1;
                    let mut targets = Vec::new();
                    loop {
                        let expr = self.parse_test()?;
                        targets.push(self.expr_to_target(expr)?);
                        if !self.eat_op(Op::Comma) {
                            break;
                        }
                    }
                    Ok(Stmt::Del(targets))
                }
                "global" => {
                    self.pos += 1;
                    Ok(Stmt::Global(self.parse_name_list()?))
                }
                "nonlocal" => {
                    self.pos += 1;
                    Ok(Stmt::Nonlocal(self.parse_name_list()?))
                }
                "import" => {
                    self.pos += 1;
                    let mut names = Vec::new();
                    loop {
                        let module = self.parse_dotted_name()?;
                        let alias = if self.eat_keyword("as") {
                            Some(self.expect_name()?)
                        } else {
                            None
                        };
                        names.push((module, alias));
                        if !self.eat_op(Op::Comma) {
                            break;
                        }
                    }
                    Ok(Stmt::Import(names))
                }
                "from" => {
                    self.pos += 1;
                    let module = self.parse_dotted_name()?;
                    self.expect_keyword("import")?;
                    if self.at_op(Op::Star) {
                        return Err(self.syntax_error("'from x import *' is not supported"));
                    }
                    let parenthesized = self.eat_op(Op::LParen);
                    let mut names = Vec::new();
                    loop {
                        let name = self.expect_name()?;
                        let alias = if self.eat_keyword("as") {
                            Some(self.expect_name()?)
                        } else {
                            None
                        };
                        names.push((name, alias));
                        if !self.eat_op(Op::Comma) {
                            break;
                        }
                        if parenthesized && self.at_op(Op::RParen) {
                            break;
                        }
                    }
                    if parenthesized {
                        self.expect_op(Op::RParen)?;
                    }
                    Ok(Stmt::FromImport { module, names })
                }
                "yield" => {
                    let expr = self.parse_yield_expr()?;
                    Ok(Stmt::Expr(expr))
                }
                _ => self.parse_assign_or_expr(),
            },
            _ => self.parse_assign_or_expr(),
        }
    }

    fn at_line_end(&self) -> bool {
        matches!(
            self.peek(),
            None | Some(TokenKind::Newline | TokenKind::Dedent | TokenKind::Op(Op::Semicolon))
        )
    }

    fn parse_name_list(&mut self) -> Result<Vec<String>, Error> {
        let mut names = vec![self.expect_name()?];
        while self.eat_op(Op::Comma) {
            names.push(self.expect_name()?);
        }
        Ok(names)
    }

    fn parse_dotted_name(&mut self) -> Result<String, Error> {
        let mut name = self.expect_name()?;
        while self.eat_op(Op::Dot) {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    /// Parses an expression statement, or an assignment recognised by
    /// look-ahead once a complete target expression has been consumed.
    fn parse_assign_or_expr(&mut self) -> Result<Stmt, Error> {
        let first = self.parse_testlist()?;
        match self.peek() {
            Some(TokenKind::Op(Op::Assign)) => {
                let mut targets = vec![self.expr_to_target(first)?];
                let mut value;
                loop {
                    self.pos += 1;
                    value = self.parse_testlist_or_yield()?;
                    if self.at_op(Op::Assign) {
                        targets.push(self.expr_to_target(value)?);
                    } else {
                        break;
                    }
                }
                Ok(Stmt::Assign { targets, value })
            }
            Some(TokenKind::Op(op)) => {
                if let Some(bin) = aug_assign_op(*op) {
                    self.pos += 1;
                    let value = self.parse_testlist()?;
                    let target = self.expr_to_target(first)?;
                    if matches!(target, Target::Tuple(_)) {
                        return Err(self.syntax_error("illegal target for augmented assignment"));
                    }
                    Ok(Stmt::AugAssign { target, op: bin, value })
                } else if *op == Op::Colon {
                    // Annotated assignment; the annotation is discarded.
                    self.pos += 1;
                    let _annotation = self.parse_test()?;
                    let value = if self.eat_op(Op::Assign) {
                        Some(self.parse_testlist_or_yield()?)
                    } else {
                        None
                    };
                    let target = self.expr_to_target(first)?;
                    if matches!(target, Target::Tuple(_)) {
                        return Err(self.syntax_error("only single targets can be annotated"));
                    }
                    Ok(Stmt::AnnAssign { target, value })
                } else {
                    Ok(Stmt::Expr(first))
                }
            }
            _ => Ok(Stmt::Expr(first)),
        }
    }

    /// Converts an already-parsed expression into an assignment target.
    ///
    /// Tuple targets nested deeper than one level are rejected.
    fn expr_to_target(&self, expr: ExprLoc) -> Result<Target, Error> {
        self.expr_to_target_inner(expr, false)
    }

    fn expr_to_target_inner(&self, expr: ExprLoc, nested: bool) -> Result<Target, Error> {
        let line = expr.line;
        match expr.node {
            Expr::Var(name) => Ok(Target::Name(name)),
            Expr::GetAttr { obj, attr } => Ok(Target::Attr { obj: *obj, attr }),
            Expr::Subscript { obj, index } => Ok(Target::Subscript {
                obj: *obj,
                index: *index,
            }),
            Expr::Tuple(items) | Expr::List(items) => {
                if nested {
                    return Err(Error::syntax(
                        "SyntaxError: tuple assignment targets deeper than one level are not supported".to_string(),
                        line,
                    ));
                }
                let mut targets = Vec::with_capacity(items.len());
                for item in items {
                    targets.push(self.expr_to_target_inner(item, true)?);
                }
                Ok(Target::Tuple(targets))
            }
            other => Err(Error::syntax(
                format!("SyntaxError: cannot assign to {}", other.type_name()),
                line,
            )),
        }
    }

    // --- compound statements ------------------------------------------------

    /// Parses a `:`-introduced block: either inline simple statements on the
    /// same line, or a newline-indent-dedent suite.
    ///
    /// Every compound statement parses its suites through here, so the depth
    /// guard bounds block nesting the same way it bounds expressions.
    fn parse_block(&mut self) -> Result<Block, Error> {
        self.enter()?;
        let result = self.parse_block_inner();
        self.depth -= 1;
        result
    }

    fn parse_block_inner(&mut self) -> Result<Block, Error> {
        self.expect_op(Op::Colon)?;
        let mut body = Vec::new();
        if matches!(self.peek(), Some(TokenKind::Newline)) {
            self.pos += 1;
            self.skip_newlines();
            if !matches!(self.peek(), Some(TokenKind::Indent)) {
                return Err(self.syntax_error("expected an indented block"));
            }
            self.pos += 1;
            loop {
                self.skip_newlines();
                match self.peek() {
                    Some(TokenKind::Dedent) => {
                        self.pos += 1;
                        break;
                    }
                    None => break,
                    Some(_) => self.parse_statement_into(&mut body)?,
                }
            }
        } else {
            self.parse_simple_statement_line(&mut body)?;
        }
        if body.is_empty() {
            return Err(self.syntax_error("expected an indented block"));
        }
        Ok(Rc::new(body))
    }

    fn parse_if(&mut self) -> Result<Stmt, Error> {
        self.expect_keyword("if")?;
        let mut branches = Vec::new();
        let cond = self.parse_namedexpr()?;
        let body = self.parse_block()?;
        branches.push((cond, body));
        let mut or_else = None;
        loop {
            self.skip_newlines();
            if self.eat_keyword("elif") {
                let cond = self.parse_namedexpr()?;
                let body = self.parse_block()?;
                branches.push((cond, body));
            } else if self.eat_keyword("else") {
                or_else = Some(self.parse_block()?);
                break;
            } else {
                break;
            }
        }
        Ok(Stmt::If { branches, or_else })
    }

    fn parse_while(&mut self) -> Result<Stmt, Error> {
        self.expect_keyword("while")?;
        let cond = self.parse_namedexpr()?;
        let body = self.parse_block()?;
        self.skip_newlines();
        let or_else = if self.eat_keyword("else") {
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Stmt::While { cond, body, or_else })
    }

    fn parse_for(&mut self) -> Result<Stmt, Error> {
        self.expect_keyword("for")?;
        let target = self.parse_for_target()?;
        self.expect_keyword("in")?;
        let iter = self.parse_testlist()?;
        let body = self.parse_block()?;
        self.skip_newlines();
        let or_else = if self.eat_keyword("else") {
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Stmt::For {
            target,
            iter,
            body,
            or_else,
        })
    }

    /// Parses the loop-variable target of a `for` or comprehension clause.
    fn parse_for_target(&mut self) -> Result<Target, Error> {
        let mut exprs = vec![self.parse_postfix_only()?];
        let mut tuple = false;
        while self.eat_op(Op::Comma) {
            tuple = true;
            if self.at_keyword("in") {
                break;
            }
            exprs.push(self.parse_postfix_only()?);
        }
        if tuple {
            let line = exprs.first().map_or(1, |e| e.line);
            let items = exprs;
            self.expr_to_target(ExprLoc::new(line, Expr::Tuple(items)))
        } else {
            let expr = exprs.pop().ok_or_else(|| self.unexpected("a target"))?;
            self.expr_to_target(expr)
        }
    }

    /// A restricted expression for targets: atom plus postfix trailers only.
    fn parse_postfix_only(&mut self) -> Result<ExprLoc, Error> {
        if self.at_op(Op::LParen) || self.at_op(Op::LBracket) {
            // Parenthesized tuple target `for (a, b) in ...`.
            let expr = self.parse_atom()?;
            return Ok(expr);
        }
        let atom = self.parse_atom()?;
        self.parse_trailers(atom)
    }

    fn parse_decorated(&mut self) -> Result<Stmt, Error> {
        let mut decorators = Vec::new();
        while self.eat_op(Op::At) {
            decorators.push(self.parse_test()?);
            self.expect_end_of_line()?;
            self.skip_newlines();
        }
        if self.at_keyword("def") {
            self.parse_def(decorators)
        } else if self.at_keyword("class") {
            self.parse_class(decorators)
        } else {
            Err(self.unexpected("'def' or 'class' after decorators"))
        }
    }

    fn parse_def(&mut self, decorators: Vec<ExprLoc>) -> Result<Stmt, Error> {
        let line = self.line();
        self.expect_keyword("def")?;
        let name = self.expect_name()?;
        self.expect_op(Op::LParen)?;
        let params = self.parse_params(Op::RParen)?;
        self.expect_op(Op::RParen)?;
        if self.eat_op(Op::Arrow) {
            // Return annotations are parsed and discarded.
            let _annotation = self.parse_test()?;
        }
        let body = self.parse_block()?;
        let is_generator = body.iter().any(|s| stmt_contains_yield(&s.node));
        Ok(Stmt::Def(Rc::new(FuncDecl {
            name,
            params,
            body,
            decorators,
            is_generator,
            line,
        })))
    }

    fn parse_params(&mut self, end: Op) -> Result<Params, Error> {
        let mut params = Params::default();
        let mut after_star = false;
        loop {
            if self.at_op(end) {
                break;
            }
            if self.eat_op(Op::Star) {
                if after_star {
                    return Err(self.syntax_error("only one '*' separator is allowed"));
                }
                after_star = true;
                if !self.at_op(Op::Comma) && !self.at_op(end) {
                    params.var_args = Some(self.expect_name()?);
                }
            } else if self.eat_op(Op::DoubleStar) {
                params.var_kwargs = Some(self.expect_name()?);
                if !self.at_op(end) && !self.at_op(Op::Comma) {
                    return Err(self.syntax_error("'**kwargs' must be the last parameter"));
                }
            } else {
                let name = self.expect_name()?;
                let annotation = if self.eat_op(Op::Colon) {
                    let ann = self.parse_test()?;
                    match ann.node {
                        Expr::Var(n) => Some(n),
                        _ => None,
                    }
                } else {
                    None
                };
                let default = if self.eat_op(Op::Assign) {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                let param = Param {
                    name,
                    default,
                    annotation,
                };
                if after_star {
                    params.kw_only.push(param);
                } else {
                    params.pos.push(param);
                }
            }
            if !self.eat_op(Op::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_class(&mut self, decorators: Vec<ExprLoc>) -> Result<Stmt, Error> {
        self.expect_keyword("class")?;
        let name = self.expect_name()?;
        let mut bases = Vec::new();
        if self.eat_op(Op::LParen) {
            while !self.at_op(Op::RParen) {
                // Keyword class arguments (metaclass=...) are not supported;
                // a plain base list covers the subset.
                bases.push(self.parse_test()?);
                if !self.eat_op(Op::Comma) {
                    break;
                }
            }
            self.expect_op(Op::RParen)?;
        }
        let body = self.parse_block()?;
        Ok(Stmt::Class {
            name,
            bases,
            body,
            decorators,
        })
    }

    fn parse_try(&mut self) -> Result<Stmt, Error> {
        self.expect_keyword("try")?;
        let body = self.parse_block()?;
        let mut handlers = Vec::new();
        self.skip_newlines();
        while self.eat_keyword("except") {
            let mut classes = Vec::new();
            let mut name = None;
            if !self.at_op(Op::Colon) {
                let expr = self.parse_test()?;
                match expr.node {
                    Expr::Tuple(items) => classes.extend(items),
                    _ => classes.push(expr),
                }
                if self.eat_keyword("as") {
                    name = Some(self.expect_name()?);
                }
            }
            let handler_body = self.parse_block()?;
            handlers.push(ExceptHandler {
                classes,
                name,
                body: handler_body,
            });
            self.skip_newlines();
        }
        let or_else = if self.eat_keyword("else") {
            let b = self.parse_block()?;
            self.skip_newlines();
            Some(b)
        } else {
            None
        };
        let finally = if self.eat_keyword("finally") {
            Some(self.parse_block()?)
        } else {
            None
        };
        if handlers.is_empty() && finally.is_none() {
            return Err(self.syntax_error("expected 'except' or 'finally' block"));
        }
        if or_else.is_some() && handlers.is_empty() {
            return Err(self.syntax_error("'else' clause requires at least one 'except'"));
        }
        Ok(Stmt::Try {
            body,
            handlers,
            or_else,
            finally,
        })
    }

    fn parse_with(&mut self) -> Result<Stmt, Error> {
        self.expect_keyword("with")?;
        let expr = self.parse_test()?;
        let name = if self.eat_keyword("as") {
            Some(self.expect_name()?)
        } else {
            None
        };
        if self.at_op(Op::Comma) {
            return Err(self.syntax_error("multi-item with statements are not supported"));
        }
        let body = self.parse_block()?;
        Ok(Stmt::With { expr, name, body })
    }

    // --- match statement ----------------------------------------------------

    fn parse_match(&mut self) -> Result<Stmt, Error> {
        // Caller has verified the `match` name token.
        self.pos += 1;
        let subject = self.parse_testlist()?;
        self.expect_op(Op::Colon)?;
        if !matches!(self.peek(), Some(TokenKind::Newline)) {
            return Err(self.syntax_error("expected an indented block of case clauses"));
        }
        self.pos += 1;
        self.skip_newlines();
        if !matches!(self.peek(), Some(TokenKind::Indent)) {
            return Err(self.syntax_error("expected an indented block of case clauses"));
        }
        self.pos += 1;
        let mut cases = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                Some(TokenKind::Dedent) => {
                    self.pos += 1;
                    break;
                }
                None => break,
                Some(TokenKind::Name(n)) if n == "case" => {
                    self.pos += 1;
                    let pattern = self.parse_or_pattern()?;
                    let guard = if self.eat_keyword("if") {
                        Some(self.parse_namedexpr()?)
                    } else {
                        None
                    };
                    let body = self.parse_block()?;
                    cases.push(MatchCase { pattern, guard, body });
                }
                _ => return Err(self.unexpected("'case'")),
            }
        }
        if cases.is_empty() {
            return Err(self.syntax_error("match statement must have at least one case"));
        }
        Ok(Stmt::Match { subject, cases })
    }

    fn parse_or_pattern(&mut self) -> Result<Pattern, Error> {
        let first = self.parse_closed_pattern()?;
        if !self.at_op(Op::Pipe) {
            return Ok(first);
        }
        let mut alts = vec![first];
        while self.eat_op(Op::Pipe) {
            alts.push(self.parse_closed_pattern()?);
        }
        Ok(Pattern::Or(alts))
    }

    fn parse_closed_pattern(&mut self) -> Result<Pattern, Error> {
        let line = self.line();
        match self.peek() {
            Some(TokenKind::Name(n)) if n == "_" => {
                self.pos += 1;
                Ok(Pattern::Wildcard)
            }
            Some(TokenKind::Op(Op::Star)) => {
                self.pos += 1;
                let name = self.expect_name()?;
                if name == "_" {
                    Ok(Pattern::Star(None))
                } else {
                    Ok(Pattern::Star(Some(name)))
                }
            }
            Some(TokenKind::Name(_)) => {
                let name = self.expect_name()?;
                // Dotted value or class pattern.
                if self.at_op(Op::Dot) || self.at_op(Op::LParen) {
                    let mut class_expr = ExprLoc::new(line, Expr::Var(name));
                    while self.eat_op(Op::Dot) {
                        let attr = self.expect_name()?;
                        class_expr = ExprLoc::new(
                            line,
                            Expr::GetAttr {
                                obj: Box::new(class_expr),
                                attr,
                            },
                        );
                    }
                    if self.eat_op(Op::LParen) {
                        let mut positional = Vec::new();
                        let mut keyword = Vec::new();
                        while !self.at_op(Op::RParen) {
                            if let (Some(TokenKind::Name(_)), Some(TokenKind::Op(Op::Assign))) =
                                (self.peek(), self.peek_at(1))
                            {
                                let kw = self.expect_name()?;
                                self.expect_op(Op::Assign)?;
                                keyword.push((kw, self.parse_or_pattern()?));
                            } else {
                                positional.push(self.parse_or_pattern()?);
                            }
                            if !self.eat_op(Op::Comma) {
                                break;
                            }
                        }
                        self.expect_op(Op::RParen)?;
                        Ok(Pattern::Class {
                            class: class_expr,
                            positional,
                            keyword,
                        })
                    } else {
                        // Dotted value pattern: compared by equality.
                        Ok(Pattern::Literal(class_expr))
                    }
                } else {
                    Ok(Pattern::Capture(name))
                }
            }
            Some(TokenKind::Op(Op::LBracket | Op::LParen)) => {
                let close = if self.at_op(Op::LBracket) {
                    Op::RBracket
                } else {
                    Op::RParen
                };
                self.pos += 1;
                let mut items = Vec::new();
                while !self.at_op(close) {
                    items.push(self.parse_or_pattern()?);
                    if !self.eat_op(Op::Comma) {
                        break;
                    }
                }
                self.expect_op(close)?;
                Ok(Pattern::Sequence(items))
            }
            Some(TokenKind::Op(Op::LBrace)) => {
                self.pos += 1;
                let mut items = Vec::new();
                let mut rest = None;
                while !self.at_op(Op::RBrace) {
                    if self.eat_op(Op::DoubleStar) {
                        rest = Some(self.expect_name()?);
                    } else {
                        let key = self.parse_test()?;
                        self.expect_op(Op::Colon)?;
                        items.push((key, self.parse_or_pattern()?));
                    }
                    if !self.eat_op(Op::Comma) {
                        break;
                    }
                }
                self.expect_op(Op::RBrace)?;
                Ok(Pattern::Mapping { items, rest })
            }
            _ => {
                // Literal pattern, including negative numbers.
                let expr = self.parse_unary()?;
                Ok(Pattern::Literal(expr))
            }
        }
    }

    // --- expressions --------------------------------------------------------

    /// `a, b, c` - produces a tuple node when more than one item (or a
    /// trailing comma) is present.
    fn parse_testlist(&mut self) -> Result<ExprLoc, Error> {
        let line = self.line();
        let first = self.parse_test()?;
        if !self.at_op(Op::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(Op::Comma) {
            if self.testlist_ends() {
                break;
            }
            items.push(self.parse_test()?);
        }
        Ok(ExprLoc::new(line, Expr::Tuple(items)))
    }

    fn testlist_ends(&self) -> bool {
        matches!(
            self.peek(),
            None | Some(
                TokenKind::Newline
                    | TokenKind::Dedent
                    | TokenKind::Op(
                        Op::Assign
                            | Op::RParen
                            | Op::RBracket
                            | Op::RBrace
                            | Op::Colon
                            | Op::Semicolon
                    )
            )
        ) || self.at_keyword("in")
    }

    fn parse_testlist_or_yield(&mut self) -> Result<ExprLoc, Error> {
        if self.at_keyword("yield") {
            self.parse_yield_expr()
        } else {
            self.parse_testlist()
        }
    }

    fn parse_yield_expr(&mut self) -> Result<ExprLoc, Error> {
        let line = self.line();
        self.expect_keyword("yield")?;
        if self.eat_keyword("from") {
            let inner = self.parse_test()?;
            return Ok(ExprLoc::new(line, Expr::YieldFrom(Box::new(inner))));
        }
        if self.at_line_end() || self.at_op(Op::RParen) {
            Ok(ExprLoc::new(line, Expr::Yield(None)))
        } else {
            let inner = self.parse_testlist()?;
            Ok(ExprLoc::new(line, Expr::Yield(Some(Box::new(inner)))))
        }
    }

    /// `test` with an optional leading walrus: `name := test`.
    fn parse_namedexpr(&mut self) -> Result<ExprLoc, Error> {
        if let (Some(TokenKind::Name(_)), Some(TokenKind::Op(Op::Walrus))) = (self.peek(), self.peek_at(1)) {
            let line = self.line();
            let name = self.expect_name()?;
            self.expect_op(Op::Walrus)?;
            let value = self.parse_test()?;
            return Ok(ExprLoc::new(
                line,
                Expr::Walrus {
                    name,
                    value: Box::new(value),
                },
            ));
        }
        self.parse_test()
    }

    fn parse_test(&mut self) -> Result<ExprLoc, Error> {
        self.enter()?;
        let result = self.parse_test_inner();
        self.depth -= 1;
        result
    }

    fn parse_test_inner(&mut self) -> Result<ExprLoc, Error> {
        if self.at_keyword("lambda") {
            return self.parse_lambda();
        }
        let line = self.line();
        let expr = self.parse_or()?;
        if self.at_keyword("if") {
            // Conditional expression: `then if cond else or_else`.
            self.pos += 1;
            let cond = self.parse_or()?;
            self.expect_keyword("else")?;
            let or_else = self.parse_test()?;
            return Ok(ExprLoc::new(
                line,
                Expr::Ternary {
                    cond: Box::new(cond),
                    then: Box::new(expr),
                    or_else: Box::new(or_else),
                },
            ));
        }
        Ok(expr)
    }

    fn parse_lambda(&mut self) -> Result<ExprLoc, Error> {
        let line = self.line();
        self.expect_keyword("lambda")?;
        let params = self.parse_params(Op::Colon)?;
        self.expect_op(Op::Colon)?;
        let body = self.parse_test()?;
        Ok(ExprLoc::new(
            line,
            Expr::Lambda {
                params: Rc::new(params),
                body: Rc::new(body),
            },
        ))
    }

    fn parse_or(&mut self) -> Result<ExprLoc, Error> {
        let line = self.line();
        let mut left = self.parse_and()?;
        while self.eat_keyword("or") {
            let right = self.parse_and()?;
            left = ExprLoc::new(
                line,
                Expr::BoolOp {
                    is_or: true,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<ExprLoc, Error> {
        let line = self.line();
        let mut left = self.parse_not()?;
        while self.eat_keyword("and") {
            let right = self.parse_not()?;
            left = ExprLoc::new(
                line,
                Expr::BoolOp {
                    is_or: false,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<ExprLoc, Error> {
        let line = self.line();
        if self.eat_keyword("not") {
            let operand = self.parse_not()?;
            return Ok(ExprLoc::new(
                line,
                Expr::UnaryOp {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
            ));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<ExprLoc, Error> {
        let line = self.line();
        let first = self.parse_bitor()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Some(TokenKind::Op(Op::Eq)) => CmpOp::Eq,
                Some(TokenKind::Op(Op::Ne)) => CmpOp::Ne,
                Some(TokenKind::Op(Op::Lt)) => CmpOp::Lt,
                Some(TokenKind::Op(Op::Le)) => CmpOp::Le,
                Some(TokenKind::Op(Op::Gt)) => CmpOp::Gt,
                Some(TokenKind::Op(Op::Ge)) => CmpOp::Ge,
                Some(TokenKind::Keyword(k)) if *k == "in" => CmpOp::In,
                Some(TokenKind::Keyword(k)) if *k == "is" => {
                    if matches!(self.peek_at(1), Some(TokenKind::Keyword(k2)) if *k2 == "not") {
                        self.pos += 1;
                        CmpOp::IsNot
                    } else {
                        CmpOp::Is
                    }
                }
                Some(TokenKind::Keyword(k)) if *k == "not" => {
                    if matches!(self.peek_at(1), Some(TokenKind::Keyword(k2)) if *k2 == "in") {
                        self.pos += 1;
                        CmpOp::NotIn
                    } else {
                        break;
                    }
                }
                _ => break,
            };
            self.pos += 1;
            let operand = self.parse_bitor()?;
            rest.push((op, operand));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(ExprLoc::new(
                line,
                Expr::Compare {
                    first: Box::new(first),
                    rest,
                },
            ))
        }
    }

    fn parse_bitor(&mut self) -> Result<ExprLoc, Error> {
        self.parse_binop_level(&[(Op::Pipe, BinOp::BitOr)], Self::parse_bitxor)
    }

    fn parse_bitxor(&mut self) -> Result<ExprLoc, Error> {
        self.parse_binop_level(&[(Op::Caret, BinOp::BitXor)], Self::parse_bitand)
    }

    fn parse_bitand(&mut self) -> Result<ExprLoc, Error> {
        self.parse_binop_level(&[(Op::Amp, BinOp::BitAnd)], Self::parse_shift)
    }

    fn parse_shift(&mut self) -> Result<ExprLoc, Error> {
        self.parse_binop_level(&[(Op::Shl, BinOp::Shl), (Op::Shr, BinOp::Shr)], Self::parse_arith)
    }

    fn parse_arith(&mut self) -> Result<ExprLoc, Error> {
        self.parse_binop_level(&[(Op::Plus, BinOp::Add), (Op::Minus, BinOp::Sub)], Self::parse_term)
    }

    fn parse_term(&mut self) -> Result<ExprLoc, Error> {
        self.parse_binop_level(
            &[
                (Op::Star, BinOp::Mul),
                (Op::Slash, BinOp::Div),
                (Op::DoubleSlash, BinOp::FloorDiv),
                (Op::Percent, BinOp::Mod),
                (Op::At, BinOp::MatMul),
            ],
            Self::parse_unary,
        )
    }

    fn parse_binop_level(
        &mut self,
        table: &[(Op, BinOp)],
        next: fn(&mut Self) -> Result<ExprLoc, Error>,
    ) -> Result<ExprLoc, Error> {
        let line = self.line();
        let mut left = next(self)?;
        'outer: loop {
            for (tok, bin) in table {
                if self.at_op(*tok) {
                    self.pos += 1;
                    let right = next(self)?;
                    left = ExprLoc::new(
                        line,
                        Expr::BinOp {
                            op: *bin,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                    );
                    continue 'outer;
                }
            }
            break;
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<ExprLoc, Error> {
        self.enter()?;
        let result = self.parse_unary_inner();
        self.depth -= 1;
        result
    }

    fn parse_unary_inner(&mut self) -> Result<ExprLoc, Error> {
        let line = self.line();
        let op = match self.peek() {
            Some(TokenKind::Op(Op::Minus)) => Some(UnaryOp::Neg),
            Some(TokenKind::Op(Op::Plus)) => Some(UnaryOp::Pos),
            Some(TokenKind::Op(Op::Tilde)) => Some(UnaryOp::Invert),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let operand = self.parse_unary()?;
            return Ok(ExprLoc::new(
                line,
                Expr::UnaryOp {
                    op,
                    operand: Box::new(operand),
                },
            ));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<ExprLoc, Error> {
        let line = self.line();
        let base = self.parse_postfix()?;
        if self.eat_op(Op::DoubleStar) {
            // Right-associative; `-` on the right binds tighter than `**`.
            let exp = self.parse_unary()?;
            return Ok(ExprLoc::new(
                line,
                Expr::BinOp {
                    op: BinOp::Pow,
                    left: Box::new(base),
                    right: Box::new(exp),
                },
            ));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<ExprLoc, Error> {
        let atom = self.parse_atom()?;
        self.parse_trailers(atom)
    }

    fn parse_trailers(&mut self, mut expr: ExprLoc) -> Result<ExprLoc, Error> {
        loop {
            if self.eat_op(Op::LParen) {
                let args = self.parse_call_args()?;
                expr = ExprLoc::new(
                    expr.line,
                    Expr::Call {
                        func: Box::new(expr),
                        args,
                    },
                );
            } else if self.eat_op(Op::LBracket) {
                let index = self.parse_subscript()?;
                self.expect_op(Op::RBracket)?;
                expr = ExprLoc::new(
                    expr.line,
                    Expr::Subscript {
                        obj: Box::new(expr),
                        index: Box::new(index),
                    },
                );
            } else if self.eat_op(Op::Dot) {
                let attr = self.expect_name()?;
                expr = ExprLoc::new(
                    expr.line,
                    Expr::GetAttr {
                        obj: Box::new(expr),
                        attr,
                    },
                );
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<CallArg>, Error> {
        let mut args = Vec::new();
        while !self.at_op(Op::RParen) {
            if self.eat_op(Op::Star) {
                args.push(CallArg::Star(self.parse_test()?));
            } else if self.eat_op(Op::DoubleStar) {
                args.push(CallArg::DoubleStar(self.parse_test()?));
            } else if let (Some(TokenKind::Name(_)), Some(TokenKind::Op(Op::Assign))) =
                (self.peek(), self.peek_at(1))
            {
                let name = self.expect_name()?;
                self.expect_op(Op::Assign)?;
                args.push(CallArg::Kw(name, self.parse_test()?));
            } else {
                let expr = self.parse_namedexpr()?;
                // A bare generator expression argument: `f(x for x in y)`.
                if args.is_empty() && self.at_keyword("for") {
                    let clauses = self.parse_comp_clauses()?;
                    let line = expr.line;
                    args.push(CallArg::Pos(ExprLoc::new(
                        line,
                        Expr::GenExp {
                            elt: Box::new(expr),
                            clauses,
                        },
                    )));
                } else {
                    args.push(CallArg::Pos(expr));
                }
            }
            if !self.eat_op(Op::Comma) {
                break;
            }
        }
        self.expect_op(Op::RParen)?;
        Ok(args)
    }

    fn parse_subscript(&mut self) -> Result<ExprLoc, Error> {
        let line = self.line();
        let start = if self.at_op(Op::Colon) {
            None
        } else {
            Some(Box::new(self.parse_test()?))
        };
        if !self.at_op(Op::Colon) {
            return start
                .map(|b| *b)
                .ok_or_else(|| self.unexpected("a subscript expression"));
        }
        self.pos += 1;
        let stop = if self.at_op(Op::Colon) || self.at_op(Op::RBracket) {
            None
        } else {
            Some(Box::new(self.parse_test()?))
        };
        let step = if self.eat_op(Op::Colon) {
            if self.at_op(Op::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_test()?))
            }
        } else {
            None
        };
        Ok(ExprLoc::new(line, Expr::Slice { start, stop, step }))
    }

    fn parse_comp_clauses(&mut self) -> Result<Vec<CompClause>, Error> {
        let mut clauses = Vec::new();
        self.expect_keyword("for")?;
        let target = self.parse_for_target()?;
        self.expect_keyword("in")?;
        let iter = self.parse_or()?;
        clauses.push(CompClause::For { target, iter });
        loop {
            if self.eat_keyword("for") {
                let target = self.parse_for_target()?;
                self.expect_keyword("in")?;
                let iter = self.parse_or()?;
                clauses.push(CompClause::For { target, iter });
            } else if self.eat_keyword("if") {
                clauses.push(CompClause::If(self.parse_namedexpr_no_ternary()?));
            } else {
                return Ok(clauses);
            }
        }
    }

    /// Comprehension `if` conditions stop before a trailing ternary `else`
    /// would be swallowed; they also accept a walrus.
    fn parse_namedexpr_no_ternary(&mut self) -> Result<ExprLoc, Error> {
        if let (Some(TokenKind::Name(_)), Some(TokenKind::Op(Op::Walrus))) = (self.peek(), self.peek_at(1)) {
            let line = self.line();
            let name = self.expect_name()?;
            self.expect_op(Op::Walrus)?;
            let value = self.parse_or()?;
            return Ok(ExprLoc::new(
                line,
                Expr::Walrus {
                    name,
                    value: Box::new(value),
                },
            ));
        }
        self.parse_or()
    }

    fn parse_atom(&mut self) -> Result<ExprLoc, Error> {
        self.enter()?;
        let result = self.parse_atom_inner();
        self.depth -= 1;
        result
    }

    fn parse_atom_inner(&mut self) -> Result<ExprLoc, Error> {
        let line = self.line();
        match self.peek() {
            Some(TokenKind::Int(_)) => {
                let Some(TokenKind::Int(v)) = self.bump() else {
                    unreachable!()
                };
                Ok(ExprLoc::new(line, Expr::Lit(Literal::Int(v))))
            }
            Some(TokenKind::Float(_)) => {
                let Some(TokenKind::Float(v)) = self.bump() else {
                    unreachable!()
                };
                Ok(ExprLoc::new(line, Expr::Lit(Literal::Float(v))))
            }
            Some(TokenKind::Str(_)) => {
                // Adjacent string literals concatenate.
                let mut text = String::new();
                while let Some(TokenKind::Str(s)) = self.peek() {
                    text.push_str(s);
                    self.pos += 1;
                }
                Ok(ExprLoc::new(line, Expr::Lit(Literal::Str(Rc::from(text.as_str())))))
            }
            Some(TokenKind::FString { .. }) => {
                let Some(TokenKind::FString { template, raw }) = self.bump() else {
                    unreachable!()
                };
                Ok(ExprLoc::new(line, Expr::FString { template, raw }))
            }
            Some(TokenKind::Keyword(kw)) => match *kw {
                "None" => {
                    self.pos += 1;
                    Ok(ExprLoc::new(line, Expr::Lit(Literal::None)))
                }
                "True" => {
                    self.pos += 1;
                    Ok(ExprLoc::new(line, Expr::Lit(Literal::Bool(true))))
                }
                "False" => {
                    self.pos += 1;
                    Ok(ExprLoc::new(line, Expr::Lit(Literal::Bool(false))))
                }
                "lambda" => self.parse_lambda(),
                "yield" => self.parse_yield_expr(),
                other => Err(self.syntax_error(format!("unexpected keyword '{other}'"))),
            },
            Some(TokenKind::Name(_)) => {
                let name = self.expect_name()?;
                Ok(ExprLoc::new(line, Expr::Var(name)))
            }
            Some(TokenKind::Op(Op::LParen)) => {
                self.pos += 1;
                if self.eat_op(Op::RParen) {
                    return Ok(ExprLoc::new(line, Expr::Tuple(Vec::new())));
                }
                let first = self.parse_namedexpr_or_yield()?;
                if self.at_keyword("for") {
                    let clauses = self.parse_comp_clauses()?;
                    self.expect_op(Op::RParen)?;
                    return Ok(ExprLoc::new(
                        line,
                        Expr::GenExp {
                            elt: Box::new(first),
                            clauses,
                        },
                    ));
                }
                if self.at_op(Op::Comma) {
                    let mut items = vec![first];
                    while self.eat_op(Op::Comma) {
                        if self.at_op(Op::RParen) {
                            break;
                        }
                        items.push(self.parse_test()?);
                    }
                    self.expect_op(Op::RParen)?;
                    return Ok(ExprLoc::new(line, Expr::Tuple(items)));
                }
                self.expect_op(Op::RParen)?;
                Ok(first)
            }
            Some(TokenKind::Op(Op::LBracket)) => {
                self.pos += 1;
                if self.eat_op(Op::RBracket) {
                    return Ok(ExprLoc::new(line, Expr::List(Vec::new())));
                }
                let first = if self.at_op(Op::Star) {
                    self.pos += 1;
                    let inner = self.parse_test()?;
                    ExprLoc::new(line, Expr::Starred(Box::new(inner)))
                } else {
                    self.parse_namedexpr()?
                };
                if self.at_keyword("for") {
                    let clauses = self.parse_comp_clauses()?;
                    self.expect_op(Op::RBracket)?;
                    return Ok(ExprLoc::new(
                        line,
                        Expr::ListComp {
                            elt: Box::new(first),
                            clauses,
                        },
                    ));
                }
                let mut items = vec![first];
                while self.eat_op(Op::Comma) {
                    if self.at_op(Op::RBracket) {
                        break;
                    }
                    if self.eat_op(Op::Star) {
                        let inner = self.parse_test()?;
                        items.push(ExprLoc::new(self.line(), Expr::Starred(Box::new(inner))));
                    } else {
                        items.push(self.parse_test()?);
                    }
                }
                self.expect_op(Op::RBracket)?;
                Ok(ExprLoc::new(line, Expr::List(items)))
            }
            Some(TokenKind::Op(Op::LBrace)) => {
                self.pos += 1;
                if self.eat_op(Op::RBrace) {
                    return Ok(ExprLoc::new(line, Expr::Dict(Vec::new())));
                }
                if self.eat_op(Op::DoubleStar) {
                    let inner = self.parse_or()?;
                    let mut items = vec![DictItem::DoubleStar(inner)];
                    while self.eat_op(Op::Comma) {
                        if self.at_op(Op::RBrace) {
                            break;
                        }
                        items.push(self.parse_dict_item()?);
                    }
                    self.expect_op(Op::RBrace)?;
                    return Ok(ExprLoc::new(line, Expr::Dict(items)));
                }
                let first = self.parse_namedexpr()?;
                if self.eat_op(Op::Colon) {
                    let value = self.parse_test()?;
                    if self.at_keyword("for") {
                        let clauses = self.parse_comp_clauses()?;
                        self.expect_op(Op::RBrace)?;
                        return Ok(ExprLoc::new(
                            line,
                            Expr::DictComp {
                                key: Box::new(first),
                                value: Box::new(value),
                                clauses,
                            },
                        ));
                    }
                    let mut items = vec![DictItem::Pair(first, value)];
                    while self.eat_op(Op::Comma) {
                        if self.at_op(Op::RBrace) {
                            break;
                        }
                        items.push(self.parse_dict_item()?);
                    }
                    self.expect_op(Op::RBrace)?;
                    return Ok(ExprLoc::new(line, Expr::Dict(items)));
                }
                if self.at_keyword("for") {
                    let clauses = self.parse_comp_clauses()?;
                    self.expect_op(Op::RBrace)?;
                    return Ok(ExprLoc::new(
                        line,
                        Expr::SetComp {
                            elt: Box::new(first),
                            clauses,
                        },
                    ));
                }
                let mut items = vec![first];
                while self.eat_op(Op::Comma) {
                    if self.at_op(Op::RBrace) {
                        break;
                    }
                    items.push(self.parse_test()?);
                }
                self.expect_op(Op::RBrace)?;
                Ok(ExprLoc::new(line, Expr::Set(items)))
            }
            Some(other) => {
                let found = other.describe();
                Err(self.syntax_error(format!("unexpected {found}")))
            }
            None => Err(self.syntax_error("unexpected end of input")),
        }
    }

    fn parse_dict_item(&mut self) -> Result<DictItem, Error> {
        if self.eat_op(Op::DoubleStar) {
            return Ok(DictItem::DoubleStar(self.parse_or()?));
        }
        let key = self.parse_test()?;
        self.expect_op(Op::Colon)?;
        let value = self.parse_test()?;
        Ok(DictItem::Pair(key, value))
    }

    fn parse_namedexpr_or_yield(&mut self) -> Result<ExprLoc, Error> {
        if self.at_keyword("yield") {
            self.parse_yield_expr()
        } else {
            self.parse_namedexpr()
        }
    }
}

fn aug_assign_op(op: Op) -> Option<BinOp> {
    match op {
        Op::PlusAssign => Some(BinOp::Add),
        Op::MinusAssign => Some(BinOp::Sub),
        Op::StarAssign => Some(BinOp::Mul),
        Op::SlashAssign => Some(BinOp::Div),
        Op::DoubleSlashAssign => Some(BinOp::FloorDiv),
        Op::PercentAssign => Some(BinOp::Mod),
        Op::DoubleStarAssign => Some(BinOp::Pow),
        Op::AmpAssign => Some(BinOp::BitAnd),
        Op::PipeAssign => Some(BinOp::BitOr),
        Op::CaretAssign => Some(BinOp::BitXor),
        Op::ShlAssign => Some(BinOp::Shl),
        Op::ShrAssign => Some(BinOp::Shr),
        Op::AtAssign => Some(BinOp::MatMul),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse_ok(source: &str) -> Vec<StmtLoc> {
        parse_module(source).unwrap()
    }

    fn parse_err(source: &str) -> Error {
        parse_module(source).unwrap_err()
    }

    #[test]
    fn expression_statement() {
        let body = parse_ok("2 + 3\n");
        assert_eq!(body.len(), 1);
        assert!(matches!(&body[0].node, Stmt::Expr(e) if matches!(e.node, Expr::BinOp { op: BinOp::Add, .. })));
    }

    #[test]
    fn precedence_shape() {
        let body = parse_ok("1 + 2 * 3");
        let Stmt::Expr(e) = &body[0].node else { panic!() };
        let Expr::BinOp { op, right, .. } = &e.node else { panic!() };
        assert_eq!(*op, BinOp::Add);
        assert!(matches!(right.node, Expr::BinOp { op: BinOp::Mul, .. }));
    }

    #[test]
    fn power_is_right_associative() {
        let body = parse_ok("2 ** 3 ** 2");
        let Stmt::Expr(e) = &body[0].node else { panic!() };
        let Expr::BinOp { op, right, .. } = &e.node else { panic!() };
        assert_eq!(*op, BinOp::Pow);
        assert!(matches!(right.node, Expr::BinOp { op: BinOp::Pow, .. }));
    }

    #[test]
    fn chained_comparison_node() {
        let body = parse_ok("a < b < c");
        let Stmt::Expr(e) = &body[0].node else { panic!() };
        let Expr::Compare { rest, .. } = &e.node else { panic!() };
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn chained_assignment() {
        let body = parse_ok("a = b = 1");
        let Stmt::Assign { targets, .. } = &body[0].node else { panic!() };
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn tuple_unpacking_target() {
        let body = parse_ok("a, b = 1, 2");
        let Stmt::Assign { targets, .. } = &body[0].node else { panic!() };
        assert!(matches!(&targets[0], Target::Tuple(items) if items.len() == 2));
    }

    #[test]
    fn deep_tuple_target_rejected() {
        let err = parse_err("a, (b, c) = 1, (2, 3)");
        assert!(err.message.contains("deeper than one level"));
    }

    #[test]
    fn annotated_assignment_discards_annotation() {
        let body = parse_ok("x: int = 5");
        assert!(matches!(&body[0].node, Stmt::AnnAssign { value: Some(_), .. }));
    }

    #[test]
    fn def_with_defaults_and_star_args() {
        let body = parse_ok("def f(a, b=2, *args, c=3, **kw):\n    return a\n");
        let Stmt::Def(decl) = &body[0].node else { panic!() };
        assert_eq!(decl.params.pos.len(), 2);
        assert_eq!(decl.params.var_args.as_deref(), Some("args"));
        assert_eq!(decl.params.kw_only.len(), 1);
        assert_eq!(decl.params.var_kwargs.as_deref(), Some("kw"));
        assert!(!decl.is_generator);
    }

    #[test]
    fn generator_detection() {
        let body = parse_ok("def g():\n    yield 1\n");
        let Stmt::Def(decl) = &body[0].node else { panic!() };
        assert!(decl.is_generator);

        // A nested def's yield does not make the outer function a generator.
        let body = parse_ok("def outer():\n    def inner():\n        yield 1\n    return inner\n");
        let Stmt::Def(decl) = &body[0].node else { panic!() };
        assert!(!decl.is_generator);
    }

    #[test]
    fn decorators_wrap_def() {
        let body = parse_ok("@dec\n@other(1)\ndef f():\n    pass\n");
        let Stmt::Def(decl) = &body[0].node else { panic!() };
        assert_eq!(decl.decorators.len(), 2);
    }

    #[test]
    fn class_with_bases() {
        let body = parse_ok("class A(B, C):\n    x = 1\n");
        let Stmt::Class { bases, .. } = &body[0].node else { panic!() };
        assert_eq!(bases.len(), 2);
    }

    #[test]
    fn try_except_else_finally() {
        let body = parse_ok(
            "try:\n    x = 1\nexcept ValueError as e:\n    pass\nexcept (KeyError, IndexError):\n    pass\nelse:\n    pass\nfinally:\n    pass\n",
        );
        let Stmt::Try {
            handlers,
            or_else,
            finally,
            ..
        } = &body[0].node
        else {
            panic!()
        };
        assert_eq!(handlers.len(), 2);
        assert_eq!(handlers[0].name.as_deref(), Some("e"));
        assert_eq!(handlers[1].classes.len(), 2);
        assert!(or_else.is_some());
        assert!(finally.is_some());
    }

    #[test]
    fn match_statement_patterns() {
        let source = "match point:\n    case (0, 0):\n        pass\n    case {'x': x, **rest}:\n        pass\n    case Point(0, y=1):\n        pass\n    case [1, *rest]:\n        pass\n    case 1 | 2:\n        pass\n    case _:\n        pass\n";
        let body = parse_ok(source);
        let Stmt::Match { cases, .. } = &body[0].node else { panic!() };
        assert_eq!(cases.len(), 6);
        assert!(matches!(cases[5].pattern, Pattern::Wildcard));
        assert!(matches!(&cases[4].pattern, Pattern::Or(alts) if alts.len() == 2));
    }

    #[test]
    fn match_as_a_variable_name_still_parses() {
        let body = parse_ok("match = 5\nx = match + 1\n");
        assert!(matches!(&body[0].node, Stmt::Assign { .. }));
    }

    #[test]
    fn comprehension_clauses() {
        let body = parse_ok("[x * y for x in a if x for y in b]");
        let Stmt::Expr(e) = &body[0].node else { panic!() };
        let Expr::ListComp { clauses, .. } = &e.node else { panic!() };
        assert_eq!(clauses.len(), 3);
    }

    #[test]
    fn dict_and_set_displays() {
        let body = parse_ok("{1: 'a', **extra}");
        let Stmt::Expr(e) = &body[0].node else { panic!() };
        assert!(matches!(&e.node, Expr::Dict(items) if items.len() == 2));

        let body = parse_ok("{1, 2, 3}");
        let Stmt::Expr(e) = &body[0].node else { panic!() };
        assert!(matches!(&e.node, Expr::Set(items) if items.len() == 3));
    }

    #[test]
    fn slice_forms() {
        let body = parse_ok("a[1:2:3]");
        let Stmt::Expr(e) = &body[0].node else { panic!() };
        let Expr::Subscript { index, .. } = &e.node else { panic!() };
        assert!(matches!(
            &index.node,
            Expr::Slice {
                start: Some(_),
                stop: Some(_),
                step: Some(_)
            }
        ));

        let body = parse_ok("a[::2]");
        let Stmt::Expr(e) = &body[0].node else { panic!() };
        let Expr::Subscript { index, .. } = &e.node else { panic!() };
        assert!(matches!(
            &index.node,
            Expr::Slice {
                start: None,
                stop: None,
                step: Some(_)
            }
        ));
    }

    #[test]
    fn star_import_rejected() {
        let err = parse_err("from os import *");
        assert!(err.message.contains("not supported"));
    }

    #[test]
    fn lines_survive_transformation() {
        let body = parse_ok("x = 1\n\n\ny = 2\nif x:\n    z = 3\n");
        assert_eq!(body[0].line, 1);
        assert_eq!(body[1].line, 4);
        let Stmt::If { branches, .. } = &body[2].node else { panic!() };
        assert_eq!(body[2].line, 5);
        assert_eq!(branches[0].1[0].line, 6);
    }

    #[test]
    fn errors_return_values_not_panics() {
        for bad in ["def f(:", "if", "a = ", "x ==", "class :", "1 +", "(((", "a[1", "f(,)"] {
            assert!(parse_module(bad).is_err(), "expected error for {bad:?}");
        }
    }

    #[test]
    fn walrus_in_condition() {
        let body = parse_ok("if (n := 10) > 5:\n    pass\n");
        let Stmt::If { branches, .. } = &body[0].node else { panic!() };
        assert!(matches!(&branches[0].0.node, Expr::Compare { first, .. } if matches!(first.node, Expr::Walrus { .. })));
    }

    #[test]
    fn genexp_call_argument() {
        let body = parse_ok("sum(x * x for x in data)");
        let Stmt::Expr(e) = &body[0].node else { panic!() };
        let Expr::Call { args, .. } = &e.node else { panic!() };
        assert!(matches!(&args[0], CallArg::Pos(a) if matches!(a.node, Expr::GenExp { .. })));
    }

    #[test]
    fn multi_item_with_rejected() {
        let err = parse_err("with open('a') as a, open('b') as b:\n    pass\n");
        assert!(err.message.contains("multi-item with statements"));
    }

    #[test]
    fn adjacent_string_concatenation() {
        let body = parse_ok("x = 'a' 'b'");
        let Stmt::Assign { value, .. } = &body[0].node else { panic!() };
        assert!(matches!(&value.node, Expr::Lit(Literal::Str(s)) if &**s == "ab"));
    }
}
