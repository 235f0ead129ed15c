// ABOUTME: Recursive-descent parser turning a token stream into a located AST (spec 4.2)

use crate::ast::{
    BinOp, ClassDef, FunctionDef, LambdaExpr, MatchCase, Node, NodeKind, UnOp,
};
use crate::error::{LeapTarget, LuniteError};
use crate::lexer::Lexer;
use crate::token::{Keyword, Location, Token, TokenKind};
use std::rc::Rc;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type PResult<T> = Result<T, LuniteError>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    pub fn parse_source(source: &str) -> PResult<Vec<Node>> {
        let tokens = Lexer::new(source).tokenize()?;
        Parser::new(tokens).parse_program()
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn loc(&self) -> Location {
        self.peek().loc
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn check_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek_kind(), TokenKind::Keyword(k) if *k == kw)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(LuniteError::syntax(
                format!("expected {:?}, got {:?}", kind, self.peek_kind()),
                self.loc(),
            ))
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> PResult<Token> {
        if self.check_keyword(kw) {
            Ok(self.advance())
        } else {
            Err(LuniteError::syntax(
                format!("expected keyword {:?}, got {:?}", kw, self.peek_kind()),
                self.loc(),
            ))
        }
    }

    fn expect_ident(&mut self) -> PResult<(String, Location)> {
        let loc = self.loc();
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok((name, loc))
            }
            other => Err(LuniteError::syntax(
                format!("expected identifier, got {:?}", other),
                loc,
            )),
        }
    }

    pub fn parse_program(&mut self) -> PResult<Vec<Node>> {
        let mut stmts = Vec::new();
        while !self.at_eof() {
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    // ===================== Statements =====================

    fn parse_statement(&mut self) -> PResult<Node> {
        let loc = self.loc();
        match self.peek_kind().clone() {
            TokenKind::Keyword(Keyword::Let) => self.parse_var_decl(false),
            TokenKind::Keyword(Keyword::Const) => self.parse_var_decl(true),
            TokenKind::Keyword(Keyword::Func) => self.parse_function_def(),
            TokenKind::Keyword(Keyword::Class) => self.parse_class_def(),
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Attempt) => self.parse_try(),
            TokenKind::Keyword(Keyword::Match) => self.parse_match(),
            TokenKind::Keyword(Keyword::Enum) => self.parse_enum(),
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                Ok(Node::new(NodeKind::BreakStmt, loc))
            }
            TokenKind::Keyword(Keyword::Advance) => {
                self.advance();
                Ok(Node::new(NodeKind::AdvanceStmt, loc))
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                if self.starts_expression() {
                    let expr = self.parse_expr()?;
                    Ok(Node::new(NodeKind::ReturnStmt(Some(Box::new(expr))), loc))
                } else {
                    Ok(Node::new(NodeKind::ReturnStmt(None), loc))
                }
            }
            TokenKind::Keyword(Keyword::Leap) => self.parse_leap(),
            TokenKind::Keyword(Keyword::Import) => self.parse_import(),
            TokenKind::Keyword(Keyword::ImportPy) => self.parse_import_host(),
            TokenKind::LBrace => self.parse_brace_statement(),
            _ => self.parse_expr_or_assignment_statement(),
        }
    }

    fn starts_expression(&self) -> bool {
        !matches!(
            self.peek_kind(),
            TokenKind::Eof | TokenKind::RBrace | TokenKind::Keyword(_)
        )
    }

    /// `{ … }` in statement position is either a label statement (a single
    /// bare identifier followed immediately by `}`) or a plain block (spec
    /// 4.2).
    fn parse_brace_statement(&mut self) -> PResult<Node> {
        let loc = self.loc();
        if let TokenKind::Ident(name) = self.peek_at(1).clone() {
            if matches!(self.peek_at(2), TokenKind::RBrace) {
                self.advance(); // {
                self.advance(); // ident
                self.advance(); // }
                return Ok(Node::new(NodeKind::LabelDef(name), loc));
            }
        }
        self.parse_block()
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn parse_block(&mut self) -> PResult<Node> {
        let loc = self.loc();
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            stmts.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Node::new(NodeKind::Block(stmts), loc))
    }

    fn parse_var_decl(&mut self, is_const: bool) -> PResult<Node> {
        let loc = self.loc();
        self.advance(); // let/const

        if self.check(&TokenKind::LBracket) {
            self.advance();
            let mut names = Vec::new();
            if !self.check(&TokenKind::RBracket) {
                loop {
                    let (name, _) = self.expect_ident()?;
                    names.push(name);
                    if self.check(&TokenKind::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RBracket)?;
            self.expect(TokenKind::Assign)?;
            let value = self.parse_expr()?;
            return Ok(Node::new(
                NodeKind::DestructuringDecl {
                    names,
                    value: Box::new(value),
                    is_const,
                },
                loc,
            ));
        }

        let (name, _) = self.expect_ident()?;
        self.expect(TokenKind::Assign)?;
        let value = self.parse_expr()?;
        Ok(Node::new(
            NodeKind::VarDecl {
                name,
                value: Box::new(value),
                is_const,
            },
            loc,
        ))
    }

    fn parse_params(&mut self) -> PResult<Vec<(String, Option<Node>)>> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let (name, _) = self.expect_ident()?;
                let default = if self.check(&TokenKind::Assign) {
                    self.advance();
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                params.push((name, default));
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_function_def(&mut self) -> PResult<Node> {
        let loc = self.loc();
        self.advance(); // func
        let (name, _) = self.expect_ident()?;
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        Ok(Node::new(
            NodeKind::FunctionDef(Rc::new(FunctionDef {
                name,
                params,
                body: Rc::new(body),
            })),
            loc,
        ))
    }

    fn parse_class_def(&mut self) -> PResult<Node> {
        let loc = self.loc();
        self.advance(); // class
        let (name, _) = self.expect_ident()?;
        let superclass = if self.check_keyword(Keyword::Extends) {
            self.advance();
            Some(self.expect_ident()?.0)
        } else {
            None
        };
        self.expect(TokenKind::LBrace)?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            body.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Node::new(
            NodeKind::ClassDef(Rc::new(ClassDef {
                name,
                superclass,
                body,
            })),
            loc,
        ))
    }

    fn parse_if(&mut self) -> PResult<Node> {
        let loc = self.loc();
        self.advance(); // if
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.check_keyword(Keyword::Else) {
            self.advance();
            // `else if` desugars to a nested if parsed as the else branch.
            if self.check_keyword(Keyword::If) {
                Some(Box::new(self.parse_if()?))
            } else {
                Some(Box::new(self.parse_block()?))
            }
        } else {
            None
        };
        Ok(Node::new(
            NodeKind::IfStmt {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch,
            },
            loc,
        ))
    }

    fn parse_while(&mut self) -> PResult<Node> {
        let loc = self.loc();
        self.advance(); // while
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(Node::new(
            NodeKind::WhileStmt {
                cond: Box::new(cond),
                body: Box::new(body),
            },
            loc,
        ))
    }

    fn parse_for(&mut self) -> PResult<Node> {
        let loc = self.loc();
        self.advance(); // for
        let (iter_name, _) = self.expect_ident()?;
        self.expect_keyword(Keyword::In)?;
        let iterable = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(Node::new(
            NodeKind::ForStmt {
                iter_name,
                iterable: Box::new(iterable),
                body: Box::new(body),
            },
            loc,
        ))
    }

    fn parse_try(&mut self) -> PResult<Node> {
        let loc = self.loc();
        self.advance(); // attempt
        let try_block = self.parse_block()?;
        self.expect_keyword(Keyword::Rescue)?;
        self.expect(TokenKind::LParen)?;
        let (error_var, _) = self.expect_ident()?;
        self.expect(TokenKind::RParen)?;
        let rescue_block = self.parse_block()?;
        let finally_block = if self.check_keyword(Keyword::Finally) {
            self.advance();
            Some(Box::new(self.parse_block()?))
        } else {
            None
        };
        Ok(Node::new(
            NodeKind::TryCatchStmt {
                try_block: Box::new(try_block),
                error_var,
                rescue_block: Box::new(rescue_block),
                finally_block,
            },
            loc,
        ))
    }

    /// A case ends when the next token starts a new case (an atom token, or
    /// `other` followed by `:`) or on `}` (spec 4.2).
    fn match_case_ends(&self) -> bool {
        if self.check(&TokenKind::RBrace) {
            return true;
        }
        if self.check_keyword(Keyword::Other) {
            return true;
        }
        self.starts_match_case_value()
    }

    fn starts_match_case_value(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Int(_)
                | TokenKind::Float(_)
                | TokenKind::Str(_)
                | TokenKind::Char(_)
                | TokenKind::Ident(_)
                | TokenKind::Keyword(Keyword::True)
                | TokenKind::Keyword(Keyword::False)
                | TokenKind::Keyword(Keyword::Null)
                | TokenKind::Minus
        )
    }

    fn parse_match(&mut self) -> PResult<Node> {
        let loc = self.loc();
        self.advance(); // match
        self.expect(TokenKind::LParen)?;
        let subject = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::LBrace)?;

        let mut cases = Vec::new();
        let mut default = None;
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            if self.check_keyword(Keyword::Other) {
                self.advance();
                self.expect(TokenKind::Colon)?;
                let mut stmts = Vec::new();
                while !self.match_case_ends() {
                    stmts.push(self.parse_statement()?);
                }
                default = Some(stmts);
                continue;
            }
            let value = self.parse_ternary()?;
            self.expect(TokenKind::Colon)?;
            let mut stmts = Vec::new();
            while !self.match_case_ends() {
                stmts.push(self.parse_statement()?);
            }
            cases.push(MatchCase { value, body: stmts });
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Node::new(
            NodeKind::MatchStmt {
                subject: Box::new(subject),
                cases,
                default,
            },
            loc,
        ))
    }

    fn parse_enum(&mut self) -> PResult<Node> {
        let loc = self.loc();
        self.advance(); // enum
        let (name, _) = self.expect_ident()?;
        self.expect(TokenKind::LBrace)?;
        let mut members = Vec::new();
        if !self.check(&TokenKind::RBrace) {
            loop {
                let (member, _) = self.expect_ident()?;
                members.push(member);
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Node::new(NodeKind::EnumDef { name, members }, loc))
    }

    fn parse_leap(&mut self) -> PResult<Node> {
        let loc = self.loc();
        self.advance(); // leap
        let target = match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                LeapTarget::Label(name)
            }
            TokenKind::Int(n) => {
                self.advance();
                LeapTarget::Line(n)
            }
            other => {
                return Err(LuniteError::syntax(
                    format!("expected label or line number after 'leap', got {:?}", other),
                    loc,
                ));
            }
        };
        Ok(Node::new(NodeKind::LeapStmt(target), loc))
    }

    fn parse_package_suffix(&mut self) -> PResult<Option<String>> {
        if self.check_keyword(Keyword::From) {
            self.advance();
            match self.peek_kind().clone() {
                TokenKind::Str(s) => {
                    self.advance();
                    Ok(Some(s))
                }
                other => Err(LuniteError::syntax(
                    format!("expected string after 'from', got {:?}", other),
                    self.loc(),
                )),
            }
        } else {
            Ok(None)
        }
    }

    fn parse_import(&mut self) -> PResult<Node> {
        let loc = self.loc();
        self.advance(); // import
        let (module, _) = self.expect_ident()?;
        let source = self.parse_package_suffix()?;
        Ok(Node::new(NodeKind::ImportStmt { module, source }, loc))
    }

    fn parse_import_host(&mut self) -> PResult<Node> {
        let loc = self.loc();
        self.advance(); // import_py
        let (module, _) = self.expect_ident()?;
        let source = self.parse_package_suffix()?;
        let alias = module.clone();
        Ok(Node::new(
            NodeKind::ImportHostStmt {
                module,
                alias,
                source,
            },
            loc,
        ))
    }

    /// Parses an expression statement, promoting it to an assignment if
    /// followed by `=` or a compound-assign operator (spec 4.2: only
    /// identifier, member access, and index access are legal L-values).
    fn parse_expr_or_assignment_statement(&mut self) -> PResult<Node> {
        let loc = self.loc();
        let expr = self.parse_expr()?;

        let compound = match self.peek_kind() {
            TokenKind::PlusEq => Some(BinOp::Add),
            TokenKind::MinusEq => Some(BinOp::Sub),
            TokenKind::StarEq => Some(BinOp::Mul),
            TokenKind::SlashEq => Some(BinOp::Div),
            TokenKind::PercentEq => Some(BinOp::Mod),
            _ => None,
        };

        if self.check(&TokenKind::Assign) {
            self.assert_lvalue(&expr)?;
            self.advance();
            let value = self.parse_expr()?;
            return Ok(Node::new(
                NodeKind::Assign {
                    target: Box::new(expr),
                    value: Box::new(value),
                },
                loc,
            ));
        }

        if let Some(op) = compound {
            self.assert_lvalue(&expr)?;
            self.advance();
            let value = self.parse_expr()?;
            return Ok(Node::new(
                NodeKind::CompoundAssign {
                    op,
                    target: Box::new(expr),
                    value: Box::new(value),
                },
                loc,
            ));
        }

        Ok(expr)
    }

    fn assert_lvalue(&self, node: &Node) -> PResult<()> {
        match &node.kind {
            NodeKind::Identifier(_) | NodeKind::MemberAccess { .. } | NodeKind::IndexAccess { .. } => {
                Ok(())
            }
            _ => Err(LuniteError::assignment(
                "invalid assignment target".to_string(),
            )),
        }
    }

    // ===================== Expressions =====================

    fn parse_expr(&mut self) -> PResult<Node> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> PResult<Node> {
        let loc = self.loc();
        let cond = self.parse_logic()?;
        if self.check(&TokenKind::Question) {
            self.advance();
            let then_branch = self.parse_expr()?;
            self.expect(TokenKind::Colon)?;
            let else_branch = self.parse_expr()?;
            return Ok(Node::new(
                NodeKind::TernaryOp {
                    cond: Box::new(cond),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                },
                loc,
            ));
        }
        Ok(cond)
    }

    fn parse_logic(&mut self) -> PResult<Node> {
        let mut left = self.parse_comp()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::And => BinOp::And,
                TokenKind::Or => BinOp::Or,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let right = self.parse_comp()?;
            left = Node::new(
                NodeKind::BinaryOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                loc,
            );
        }
        Ok(left)
    }

    fn parse_comp(&mut self) -> PResult<Node> {
        let mut left = self.parse_bitwise()?;
        loop {
            let loc = self.loc();
            if self.check(&TokenKind::Is) {
                self.advance();
                let (type_name, _) = self.expect_ident()?;
                left = Node::new(
                    NodeKind::TypeCheck {
                        expr: Box::new(left),
                        type_name,
                    },
                    loc,
                );
                continue;
            }
            let op = match self.peek_kind() {
                TokenKind::Eq => BinOp::Eq,
                TokenKind::NotEq => BinOp::NotEq,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Lt => BinOp::Lt,
                _ => break,
            };
            self.advance();
            let right = self.parse_bitwise()?;
            left = Node::new(
                NodeKind::BinaryOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                loc,
            );
        }
        Ok(left)
    }

    fn parse_bitwise(&mut self) -> PResult<Node> {
        let mut left = self.parse_shift()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Amp => BinOp::BitAnd,
                TokenKind::Pipe => BinOp::BitOr,
                TokenKind::Caret => BinOp::BitXor,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let right = self.parse_shift()?;
            left = Node::new(
                NodeKind::BinaryOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                loc,
            );
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> PResult<Node> {
        let mut left = self.parse_math()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Shl => BinOp::Shl,
                TokenKind::Shr => BinOp::Shr,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let right = self.parse_math()?;
            left = Node::new(
                NodeKind::BinaryOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                loc,
            );
        }
        Ok(left)
    }

    fn parse_math(&mut self) -> PResult<Node> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let right = self.parse_term()?;
            left = Node::new(
                NodeKind::BinaryOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                loc,
            );
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> PResult<Node> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let right = self.parse_factor()?;
            left = Node::new(
                NodeKind::BinaryOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                loc,
            );
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> PResult<Node> {
        let loc = self.loc();
        let op = match self.peek_kind() {
            TokenKind::Plus => {
                self.advance();
                return self.parse_factor();
            }
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Tilde => Some(UnOp::BitNot),
            TokenKind::Bang | TokenKind::Not => Some(UnOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.parse_factor()?;
            return Ok(Node::new(
                NodeKind::UnaryOp {
                    op,
                    expr: Box::new(expr),
                },
                loc,
            ));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Node> {
        let mut node = self.parse_atom()?;
        loop {
            let loc = self.loc();
            if self.check(&TokenKind::Dot) {
                self.advance();
                let (name, _) = self.expect_ident()?;
                if self.check(&TokenKind::LParen) {
                    let args = self.parse_args()?;
                    node = Node::new(
                        NodeKind::MethodCall {
                            obj: Box::new(node),
                            method: name,
                            args,
                        },
                        loc,
                    );
                } else {
                    node = Node::new(
                        NodeKind::MemberAccess {
                            obj: Box::new(node),
                            member: name,
                        },
                        loc,
                    );
                }
            } else if self.check(&TokenKind::LBracket) {
                self.advance();
                let index = self.parse_expr()?;
                self.expect(TokenKind::RBracket)?;
                node = Node::new(
                    NodeKind::IndexAccess {
                        target: Box::new(node),
                        index: Box::new(index),
                    },
                    loc,
                );
            } else {
                break;
            }
        }
        Ok(node)
    }

    fn parse_args(&mut self) -> PResult<Vec<Node>> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_atom(&mut self) -> PResult<Node> {
        let loc = self.loc();
        match self.peek_kind().clone() {
            TokenKind::Int(n) => {
                self.advance();
                Ok(Node::new(NodeKind::Int(n), loc))
            }
            TokenKind::Float(n) => {
                self.advance();
                Ok(Node::new(NodeKind::Number(n), loc))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Node::new(NodeKind::StringLit(s), loc))
            }
            TokenKind::Char(c) => {
                self.advance();
                Ok(Node::new(NodeKind::CharLit(c), loc))
            }
            TokenKind::FString(body) => {
                self.advance();
                self.desugar_fstring(&body, loc)
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Node::new(NodeKind::Boolean(true), loc))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Node::new(NodeKind::Boolean(false), loc))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(Node::new(NodeKind::Null, loc))
            }
            TokenKind::Keyword(Keyword::New) => self.parse_new(),
            TokenKind::Keyword(Keyword::In) => {
                // `in(...)` has no defined semantics in the grammar the
                // evaluator exercises (spec 9); reject it explicitly rather
                // than letting it fall through.
                self.advance();
                Err(LuniteError::syntax(
                    "'in(...)' has no defined semantics".to_string(),
                    loc,
                ))
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    let args = self.parse_args()?;
                    Ok(Node::new(NodeKind::FunctionCall { name, args }, loc))
                } else {
                    Ok(Node::new(NodeKind::Identifier(name), loc))
                }
            }
            TokenKind::LParen => self.parse_paren_or_lambda(),
            TokenKind::LBracket => self.parse_list_lit(),
            TokenKind::LBrace => self.parse_dict_or_set_lit(),
            other => Err(LuniteError::syntax(
                format!("unexpected token {:?}", other),
                loc,
            )),
        }
    }

    /// `new Name(args)` or `new mod.Cls(args)` (spec 4.2: qualified name).
    fn parse_new(&mut self) -> PResult<Node> {
        let loc = self.loc();
        self.advance(); // new
        let (first, first_loc) = self.expect_ident()?;
        let mut class_expr = Node::new(NodeKind::Identifier(first), first_loc);
        while self.check(&TokenKind::Dot) {
            let dot_loc = self.loc();
            self.advance();
            let (member, _) = self.expect_ident()?;
            class_expr = Node::new(
                NodeKind::MemberAccess {
                    obj: Box::new(class_expr),
                    member,
                },
                dot_loc,
            );
        }
        let args = self.parse_args()?;
        Ok(Node::new(
            NodeKind::NewInstance {
                class_expr: Box::new(class_expr),
                args,
            },
            loc,
        ))
    }

    /// `(...)`: grouping if a single expr; a tuple literal with ≥0 commas; a
    /// lambda parameter list if immediately followed by `=>` (spec 4.2).
    fn parse_paren_or_lambda(&mut self) -> PResult<Node> {
        let loc = self.loc();
        self.advance(); // (

        if self.check(&TokenKind::RParen) {
            self.advance();
            if self.check(&TokenKind::FatArrow) {
                return self.finish_lambda(Vec::new(), loc);
            }
            return Ok(Node::new(NodeKind::TupleLit(Vec::new()), loc));
        }

        let mut items = Vec::new();
        let mut is_lambda_candidate = true;
        loop {
            let item_loc = self.loc();
            let item = self.parse_expr()?;
            if !matches!(item.kind, NodeKind::Identifier(_)) {
                is_lambda_candidate = false;
            }
            items.push((item, item_loc));
            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;

        if self.check(&TokenKind::FatArrow) && is_lambda_candidate {
            let params = items
                .into_iter()
                .map(|(node, _)| match node.kind {
                    NodeKind::Identifier(name) => (name, None),
                    _ => unreachable!(),
                })
                .collect();
            return self.finish_lambda(params, loc);
        }

        if items.len() == 1 {
            Ok(items.into_iter().next().unwrap().0)
        } else {
            Ok(Node::new(
                NodeKind::TupleLit(items.into_iter().map(|(n, _)| n).collect()),
                loc,
            ))
        }
    }

    fn finish_lambda(&mut self, params: Vec<(String, Option<Node>)>, loc: Location) -> PResult<Node> {
        self.expect(TokenKind::FatArrow)?;
        let body = if self.check(&TokenKind::LBrace) {
            self.parse_block()?
        } else {
            let expr = self.parse_expr()?;
            let expr_loc = expr.loc;
            Node::new(NodeKind::ReturnStmt(Some(Box::new(expr))), expr_loc)
        };
        Ok(Node::new(
            NodeKind::LambdaExpr(Rc::new(LambdaExpr {
                params,
                body: Rc::new(body),
            })),
            loc,
        ))
    }

    fn parse_list_lit(&mut self) -> PResult<Node> {
        let loc = self.loc();
        self.advance(); // [
        let mut items = Vec::new();
        if !self.check(&TokenKind::RBracket) {
            loop {
                items.push(self.parse_expr()?);
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBracket)?;
        Ok(Node::new(NodeKind::ListLit(items), loc))
    }

    /// `{...}`: empty is an empty dict; otherwise peek at what follows the
    /// first expression to decide dict vs. set (spec 4.2).
    fn parse_dict_or_set_lit(&mut self) -> PResult<Node> {
        let loc = self.loc();
        self.advance(); // {
        if self.check(&TokenKind::RBrace) {
            self.advance();
            return Ok(Node::new(NodeKind::DictLit(Vec::new()), loc));
        }

        let first = self.parse_expr()?;
        if self.check(&TokenKind::Colon) {
            self.advance();
            let first_value = self.parse_expr()?;
            let mut pairs = vec![(first, first_value)];
            while self.check(&TokenKind::Comma) {
                self.advance();
                let k = self.parse_expr()?;
                self.expect(TokenKind::Colon)?;
                let v = self.parse_expr()?;
                pairs.push((k, v));
            }
            self.expect(TokenKind::RBrace)?;
            Ok(Node::new(NodeKind::DictLit(pairs), loc))
        } else {
            let mut items = vec![first];
            while self.check(&TokenKind::Comma) {
                self.advance();
                items.push(self.parse_expr()?);
            }
            self.expect(TokenKind::RBrace)?;
            Ok(Node::new(NodeKind::SetLit(items), loc))
        }
    }

    /// Splits a raw f-string body into literal and `{expr}` regions, unescapes
    /// literal parts, re-lexes/re-parses expression parts with line/column
    /// carried forward, and left-folds everything with `+` starting from an
    /// empty string (spec 4.2).
    fn desugar_fstring(&mut self, body: &str, loc: Location) -> PResult<Node> {
        let chars: Vec<char> = body.chars().collect();
        let mut parts: Vec<Node> = Vec::new();
        let mut literal = String::new();
        let mut i = 0;
        let mut col = loc.col + 2; // past `f"`

        while i < chars.len() {
            let c = chars[i];
            if c == '{' {
                if !literal.is_empty() {
                    parts.push(Node::new(
                        NodeKind::StringLit(unescape_fstring_literal(&literal)),
                        loc,
                    ));
                    literal.clear();
                }
                let mut depth = 1;
                let expr_start = i + 1;
                let expr_loc = Location::new(loc.line, col + 1);
                i += 1;
                col += 1;
                while i < chars.len() && depth > 0 {
                    match chars[i] {
                        '{' => depth += 1,
                        '}' => depth -= 1,
                        _ => {}
                    }
                    if depth > 0 {
                        i += 1;
                        col += 1;
                    }
                }
                let expr_src: String = chars[expr_start..i].iter().collect();
                i += 1; // consume closing '}'
                col += 1;

                let sub_tokens = Lexer::new(&expr_src).tokenize().map_err(|e| {
                    LuniteError::syntax(e.message, expr_loc)
                })?;
                let sub_tokens = rebase_tokens(sub_tokens, expr_loc);
                let mut sub_parser = Parser::new(sub_tokens);
                let expr = sub_parser.parse_expr()?;
                parts.push(Node::new(
                    NodeKind::FunctionCall {
                        name: "str".to_string(),
                        args: vec![expr],
                    },
                    expr_loc,
                ));
            } else {
                literal.push(c);
                i += 1;
                col += 1;
            }
        }
        if !literal.is_empty() {
            parts.push(Node::new(
                NodeKind::StringLit(unescape_fstring_literal(&literal)),
                loc,
            ));
        }

        let mut acc = Node::new(NodeKind::StringLit(String::new()), loc);
        for part in parts {
            acc = Node::new(
                NodeKind::BinaryOp {
                    op: BinOp::Add,
                    left: Box::new(acc),
                    right: Box::new(part),
                },
                loc,
            );
        }
        Ok(acc)
    }
}

/// Re-anchors a re-lexed token stream's locations onto the same line as the
/// original f-string, offsetting columns by where the sub-expression started.
fn rebase_tokens(tokens: Vec<Token>, base: Location) -> Vec<Token> {
    tokens
        .into_iter()
        .map(|t| {
            let new_loc = if t.loc.line == 1 {
                Location::new(base.line, base.col + t.loc.col - 1)
            } else {
                t.loc
            };
            Token::new(t.kind, new_loc)
        })
        .collect()
}

fn unescape_fstring_literal(s: &str) -> String {
    let mut out = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some('{') => out.push('{'),
                Some('}') => out.push('}'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Vec<Node> {
        Parser::parse_source(src).expect("parse failed")
    }

    #[test]
    fn parses_let_and_arithmetic_precedence() {
        let stmts = parse("let x = 2 + 3 * 4");
        assert_eq!(stmts.len(), 1);
        match &stmts[0].kind {
            NodeKind::VarDecl { name, value, is_const } => {
                assert_eq!(name, "x");
                assert!(!is_const);
                match &value.kind {
                    NodeKind::BinaryOp { op: BinOp::Add, right, .. } => {
                        assert!(matches!(right.kind, NodeKind::BinaryOp { op: BinOp::Mul, .. }));
                    }
                    other => panic!("expected add at top, got {:?}", other),
                }
            }
            other => panic!("expected var decl, got {:?}", other),
        }
    }

    #[test]
    fn precedence_pair_bitwise_over_comp() {
        // a == b & c  parses as  a == (b & c)
        let stmts = parse("let x = a == b & c");
        match &stmts[0].kind {
            NodeKind::VarDecl { value, .. } => match &value.kind {
                NodeKind::BinaryOp { op: BinOp::Eq, right, .. } => {
                    assert!(matches!(right.kind, NodeKind::BinaryOp { op: BinOp::BitAnd, .. }));
                }
                other => panic!("expected eq, got {:?}", other),
            },
            _ => panic!("expected var decl"),
        }
    }

    #[test]
    fn parses_function_with_default_arg() {
        let stmts = parse("func f(a, b=10) { return a + b }");
        match &stmts[0].kind {
            NodeKind::FunctionDef(def) => {
                assert_eq!(def.name, "f");
                assert_eq!(def.params.len(), 2);
                assert!(def.params[0].1.is_none());
                assert!(def.params[1].1.is_some());
            }
            other => panic!("expected function def, got {:?}", other),
        }
    }

    #[test]
    fn parses_class_with_extends() {
        let stmts = parse("class B extends A { func get() { return 1 } }");
        match &stmts[0].kind {
            NodeKind::ClassDef(def) => {
                assert_eq!(def.name, "B");
                assert_eq!(def.superclass.as_deref(), Some("A"));
            }
            other => panic!("expected class def, got {:?}", other),
        }
    }

    #[test]
    fn parses_if_else_if_as_nested_if() {
        let stmts = parse("if (a) { } else if (b) { } else { }");
        match &stmts[0].kind {
            NodeKind::IfStmt { else_branch, .. } => {
                let else_branch = else_branch.as_ref().unwrap();
                assert!(matches!(else_branch.kind, NodeKind::IfStmt { .. }));
            }
            other => panic!("expected if stmt, got {:?}", other),
        }
    }

    #[test]
    fn parses_attempt_rescue_finally() {
        let stmts = parse(r#"attempt { let d = {"a": 1} out(d["b"]) } rescue (e) { out("miss") } finally { out("done") }"#);
        assert!(matches!(stmts[0].kind, NodeKind::TryCatchStmt { .. }));
    }

    #[test]
    fn parses_match_with_other() {
        let stmts = parse(r#"match (2) { 1: out("one") 2: out("two") other: out("x") }"#);
        match &stmts[0].kind {
            NodeKind::MatchStmt { cases, default, .. } => {
                assert_eq!(cases.len(), 2);
                assert!(default.is_some());
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn parses_dict_vs_set_literal() {
        let stmts = parse(r#"let d = {"a": 1}"#);
        match &stmts[0].kind {
            NodeKind::VarDecl { value, .. } => assert!(matches!(value.kind, NodeKind::DictLit(_))),
            _ => panic!(),
        }
        let stmts = parse(r#"let s = {1, 2, 3}"#);
        match &stmts[0].kind {
            NodeKind::VarDecl { value, .. } => assert!(matches!(value.kind, NodeKind::SetLit(_))),
            _ => panic!(),
        }
    }

    #[test]
    fn parses_empty_tuple_and_grouping() {
        let stmts = parse("let t = ()");
        match &stmts[0].kind {
            NodeKind::VarDecl { value, .. } => {
                assert!(matches!(&value.kind, NodeKind::TupleLit(items) if items.is_empty()))
            }
            _ => panic!(),
        }
        let stmts = parse("let g = (1 + 2)");
        match &stmts[0].kind {
            NodeKind::VarDecl { value, .. } => {
                assert!(matches!(value.kind, NodeKind::BinaryOp { op: BinOp::Add, .. }))
            }
            _ => panic!(),
        }
    }

    #[test]
    fn parses_lambda_from_paren_param_list() {
        let stmts = parse("let f = (x, y) => x + y");
        match &stmts[0].kind {
            NodeKind::VarDecl { value, .. } => match &value.kind {
                NodeKind::LambdaExpr(def) => assert_eq!(def.params.len(), 2),
                other => panic!("expected lambda, got {:?}", other),
            },
            _ => panic!(),
        }
    }

    #[test]
    fn parses_leap_with_label_and_line() {
        let stmts = parse("leap foo");
        assert!(matches!(
            &stmts[0].kind,
            NodeKind::LeapStmt(LeapTarget::Label(name)) if name == "foo"
        ));
        let stmts = parse("leap 12");
        assert!(matches!(
            &stmts[0].kind,
            NodeKind::LeapStmt(LeapTarget::Line(12))
        ));
    }

    #[test]
    fn parses_label_statement_vs_block() {
        let stmts = parse("{ foo }");
        assert!(matches!(&stmts[0].kind, NodeKind::LabelDef(name) if name == "foo"));
        let stmts = parse("{ let x = 1 }");
        assert!(matches!(&stmts[0].kind, NodeKind::Block(_)));
    }

    #[test]
    fn parses_new_with_qualified_name() {
        let stmts = parse("let a = new mod.Cls(1, 2)");
        match &stmts[0].kind {
            NodeKind::VarDecl { value, .. } => match &value.kind {
                NodeKind::NewInstance { class_expr, args } => {
                    assert_eq!(args.len(), 2);
                    assert!(matches!(class_expr.kind, NodeKind::MemberAccess { .. }));
                }
                other => panic!("expected new instance, got {:?}", other),
            },
            _ => panic!(),
        }
    }

    #[test]
    fn desugars_fstring_to_concatenation_with_str_calls() {
        let stmts = parse(r#"let s = f"x={1+2}""#);
        match &stmts[0].kind {
            NodeKind::VarDecl { value, .. } => {
                // left-folded from empty string: ((("" + "x=") + str(1+2))
                assert!(matches!(value.kind, NodeKind::BinaryOp { op: BinOp::Add, .. }));
            }
            _ => panic!(),
        }
    }

    #[test]
    fn rejects_in_pseudo_call() {
        let result = Parser::parse_source("in(1, 2)");
        assert!(result.is_err());
    }

    #[test]
    fn assignment_to_index_and_member_are_legal_targets() {
        let stmts = parse("a.b = 1");
        assert!(matches!(&stmts[0].kind, NodeKind::Assign { .. }));
        let stmts = parse("a[0] = 1");
        assert!(matches!(&stmts[0].kind, NodeKind::Assign { .. }));
    }

    #[test]
    fn compound_assign_parses_op() {
        let stmts = parse("x += 1");
        assert!(matches!(
            &stmts[0].kind,
            NodeKind::CompoundAssign { op: BinOp::Add, .. }
        ));
    }
}
