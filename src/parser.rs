//! Parser for the Cascade language
//!
//! A recursive descent parser with operator-precedence climbing. Errors are
//! reported through the sink and recovered with panic-mode synchronization:
//! a failing rule unwinds to the nearest declaration or statement loop via
//! an internal sentinel, which then skips tokens to a likely boundary. The
//! parser never aborts; the returned program simply holds fewer
//! declarations than the source intended.

use crate::ast::*;
use crate::errors::{Diagnostic, ErrorCode, Reporter};
use crate::span::SourceInfo;
use crate::token::{Token, TokenKind};
use std::path::Path;
use std::sync::Arc;

/// Control-flow sentinel caught at the declaration/statement loops; it
/// carries nothing and never escapes the parser.
struct Recovered;

type ParseResult<T> = Result<T, Recovered>;

/// Parse a token stream into a [`Program`], reporting through the sink.
pub fn parse<'src>(
    tokens: Vec<Token<'src>>,
    path: Arc<Path>,
    reporter: &mut Reporter,
) -> Program {
    Parser::new(tokens, path, reporter).parse_program()
}

struct Parser<'src, 'r> {
    tokens: Vec<Token<'src>>,
    pos: usize,
    path: Arc<Path>,
    reporter: &'r mut Reporter,
    /// Set once a `module` declaration has been accepted for this file
    module_seen: bool,
    /// Struct initializers are ambiguous after `if`/`while`/`for`
    /// conditions, so they are disabled there
    no_struct: bool,
}

impl<'src, 'r> Parser<'src, 'r> {
    fn new(tokens: Vec<Token<'src>>, path: Arc<Path>, reporter: &'r mut Reporter) -> Self {
        Self {
            tokens,
            pos: 0,
            path,
            reporter,
            module_seen: false,
            no_struct: false,
        }
    }

    // ============ Token plumbing ============

    fn current(&self) -> Option<&Token<'src>> {
        self.tokens.get(self.pos)
    }

    fn current_kind(&self) -> Option<TokenKind> {
        self.current().map(|t| t.kind)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.tokens.get(self.pos + 1).map(|t| t.kind)
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current_kind() == Some(kind)
    }

    fn advance(&mut self) -> Token<'src> {
        let token = self.tokens[self.pos].clone();
        self.pos += 1;
        token
    }

    /// Consume the current token if it matches.
    fn consume(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn previous_info(&self) -> SourceInfo {
        if self.pos == 0 {
            self.eof_info()
        } else {
            self.tokens[self.pos - 1].info.clone()
        }
    }

    fn current_info(&self) -> SourceInfo {
        match self.current() {
            Some(token) => token.info.clone(),
            None => self.eof_info(),
        }
    }

    /// A one-byte span at the end of input, anchored to the last token.
    fn eof_info(&self) -> SourceInfo {
        match self.tokens.last() {
            Some(token) => token.info.clone(),
            None => SourceInfo::new(0, 1, 1, 1, self.path.clone()),
        }
    }

    // ============ Error reporting and recovery ============

    fn error_at(&mut self, code: ErrorCode, info: SourceInfo) -> Recovered {
        self.reporter.report(Diagnostic::node(code, info));
        Recovered
    }

    /// Report `code` at the current token, or `unexpected_end_of_input`
    /// when there is none.
    fn error_here(&mut self, code: ErrorCode) -> Recovered {
        if self.is_at_end() {
            let info = self.eof_info();
            self.error_at(ErrorCode::UnexpectedEndOfInput, info)
        } else {
            let info = self.current_info();
            self.error_at(code, info)
        }
    }

    fn expect(&mut self, kind: TokenKind, code: ErrorCode) -> ParseResult<Token<'src>> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(code))
        }
    }

    fn expect_identifier(&mut self) -> ParseResult<Token<'src>> {
        self.expect(TokenKind::Identifier, ErrorCode::ExpectedIdentifier)
    }

    /// A missing semicolon is reported at the offending token but does not
    /// unwind: the rule it terminates is already complete, so the node is
    /// kept and parsing resumes right here.
    fn expect_semi(&mut self) {
        if !self.consume(TokenKind::Semicolon) {
            let info = self.current_info();
            self.reporter
                .report(Diagnostic::node(ErrorCode::ExpectedSemi, info));
        }
    }

    /// Skip to a likely declaration or statement boundary: a semicolon
    /// (consumed) or a synchronizing keyword/closer (left in place).
    fn synchronize(&mut self) {
        while !self.is_at_end() {
            match self.current_kind() {
                Some(TokenKind::Semicolon) => {
                    self.advance();
                    return;
                }
                Some(
                    TokenKind::If
                    | TokenKind::Else
                    | TokenKind::Then
                    | TokenKind::Fn
                    | TokenKind::Let
                    | TokenKind::Mut
                    | TokenKind::Ret
                    | TokenKind::Import
                    | TokenKind::Export
                    | TokenKind::Module
                    | TokenKind::As
                    | TokenKind::Pub
                    | TokenKind::Assert
                    | TokenKind::CloseBrace
                    | TokenKind::CloseParen
                    | TokenKind::CloseBracket,
                ) => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ============ Declarations ============

    fn parse_program(mut self) -> Program {
        let mut declarations = Vec::new();

        while !self.is_at_end() {
            let before = self.pos;
            match self.parse_declaration() {
                Ok(decl) => declarations.push(decl),
                Err(Recovered) => {
                    self.synchronize();
                    // the sync point may be the very token that failed;
                    // stepping over it keeps recovery terminating
                    if self.pos == before && !self.is_at_end() {
                        self.advance();
                    }
                }
            }
        }

        Program {
            path: self.path,
            declarations,
        }
    }

    fn parse_declaration(&mut self) -> ParseResult<Decl> {
        match self.current_kind() {
            Some(TokenKind::Module) => self.parse_module(),
            Some(TokenKind::Import) => self.parse_import(),
            Some(TokenKind::Export) => self.parse_export(),
            Some(TokenKind::Const) => self.parse_const_or_static(),
            Some(TokenKind::Static) => self.parse_const_or_static(),
            Some(TokenKind::Fn) => self.parse_fn(),
            Some(TokenKind::Type) => self.parse_type_alias(),
            _ => Err(self.error_here(ErrorCode::ExpectedDeclaration)),
        }
    }

    fn parse_module(&mut self) -> ParseResult<Decl> {
        let start = self.current_info();
        self.advance();

        let name = self.expect_identifier()?;
        self.expect_semi();

        let info = start.merge(&self.previous_info());
        if self.module_seen {
            self.reporter
                .report(Diagnostic::node(ErrorCode::DuplicateModule, info.clone()));
        }
        self.module_seen = true;

        Ok(Decl {
            kind: DeclKind::Module {
                name: name.raw.to_string(),
            },
            info,
        })
    }

    fn parse_import(&mut self) -> ParseResult<Decl> {
        let start = self.current_info();
        self.advance();

        let mut module = self.expect_identifier()?.raw.to_string();
        while self.consume(TokenKind::Dot) {
            module.push('.');
            module.push_str(self.expect_identifier()?.raw);
        }

        let mut items = Vec::new();
        if self.consume(TokenKind::From) {
            self.expect(TokenKind::OpenBrace, ErrorCode::ExpectedOpeningBrace)?;
            loop {
                items.push(self.expect_identifier()?.raw.to_string());
                if !self.consume(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::CloseBrace, ErrorCode::UnmatchedBrace)?;
        }

        let alias = if self.consume(TokenKind::As) {
            Some(self.expect_identifier()?.raw.to_string())
        } else {
            None
        };

        self.expect_semi();

        Ok(Decl {
            kind: DeclKind::Import {
                module,
                items,
                alias,
            },
            info: start.merge(&self.previous_info()),
        })
    }

    fn parse_export(&mut self) -> ParseResult<Decl> {
        let start = self.current_info();
        self.advance();

        if self.check(TokenKind::Export) {
            return Err(self.error_here(ErrorCode::CannotExportExport));
        }

        let inner = self.parse_declaration()?;
        let info = start.merge(&inner.info);

        Ok(Decl {
            kind: DeclKind::Export(Box::new(inner)),
            info,
        })
    }

    fn parse_const_or_static(&mut self) -> ParseResult<Decl> {
        let start = self.current_info();
        let keyword = self.advance().kind;

        let (name, ty, init) = self.parse_binding()?;
        let info = start.merge(&self.previous_info());

        let kind = match keyword {
            TokenKind::Const => DeclKind::Const { name, ty, init },
            _ => DeclKind::Static { name, ty, init },
        };

        Ok(Decl { kind, info })
    }

    /// The shared tail of `const`/`static`/`let`/`mut`:
    /// `IDENT (':' type)? '=' expr ';'`
    fn parse_binding(&mut self) -> ParseResult<(String, TypeExpr, Expr)> {
        let name = self.expect_identifier()?;

        let ty = if self.consume(TokenKind::Colon) {
            self.parse_type()?
        } else {
            // the marker points at the spot the annotation would occupy
            TypeExpr::implied(name.info.clone())
        };

        if !self.consume(TokenKind::Equal) {
            let info = self.current_info();
            self.reporter.report(
                Diagnostic::node(ErrorCode::UnexpectedTok, info)
                    .with_note("Expected '=' after the declaration name."),
            );
            return Err(Recovered);
        }

        let init = self.parse_expression()?;
        self.expect_semi();

        Ok((name.raw.to_string(), ty, init))
    }

    fn parse_fn(&mut self) -> ParseResult<Decl> {
        let start = self.current_info();
        self.advance();

        let name = self.expect_identifier()?;

        if !self.consume(TokenKind::OpenParen) {
            let info = self.current_info();
            self.reporter.report(
                Diagnostic::node(ErrorCode::UnexpectedTok, info)
                    .with_note("Expected '(' after the function name."),
            );
            return Err(Recovered);
        }

        let mut args = Vec::new();
        if !self.check(TokenKind::CloseParen) {
            loop {
                args.push(self.parse_argument()?);
                if !self.consume(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::CloseParen, ErrorCode::UnclosedParen)?;

        let ret = if self.consume(TokenKind::Colon) {
            self.parse_type()?
        } else {
            TypeExpr::void(self.previous_info())
        };

        let body = self.parse_block()?;
        let info = start.merge(&body.info);

        Ok(Decl {
            kind: DeclKind::Fn {
                name: name.raw.to_string(),
                args,
                ret,
                body,
            },
            info,
        })
    }

    fn parse_argument(&mut self) -> ParseResult<Argument> {
        let name = self.expect_identifier()?;
        self.expect(TokenKind::Colon, ErrorCode::ExpectedType)?;
        let ty = self.parse_type()?;
        let info = name.info.merge(&ty.info);

        Ok(Argument {
            name: name.raw.to_string(),
            ty,
            info,
        })
    }

    fn parse_type_alias(&mut self) -> ParseResult<Decl> {
        let start = self.current_info();
        self.advance();

        let name = self.expect_identifier()?;

        if !self.consume(TokenKind::Equal) {
            let info = self.current_info();
            self.reporter.report(
                Diagnostic::node(ErrorCode::UnexpectedTok, info)
                    .with_note("Expected '=' in the type alias."),
            );
            return Err(Recovered);
        }

        let ty = self.parse_type()?;
        self.expect_semi();

        Ok(Decl {
            kind: DeclKind::TypeAlias {
                name: name.raw.to_string(),
                ty,
            },
            info: start.merge(&self.previous_info()),
        })
    }

    // ============ Types ============

    /// `('&' 'mut'?)? ('*' 'mut'? | '[' ']')* leaf` — references may only
    /// appear at the outermost position.
    fn parse_type(&mut self) -> ParseResult<TypeExpr> {
        let start = self.current_info();
        let mut modifiers = Vec::new();

        if self.consume(TokenKind::Amp) {
            if self.consume(TokenKind::Mut) {
                modifiers.push(TypeModifier::MutRef);
            } else {
                modifiers.push(TypeModifier::Ref);
            }
        }

        loop {
            if self.consume(TokenKind::Star) {
                if self.consume(TokenKind::Mut) {
                    modifiers.push(TypeModifier::MutPtr);
                } else {
                    modifiers.push(TypeModifier::Ptr);
                }
            } else if self.check(TokenKind::OpenBracket) {
                self.advance();
                self.expect(TokenKind::CloseBracket, ErrorCode::ExpectedClosingBracket)?;
                modifiers.push(TypeModifier::Array);
            } else if self.check(TokenKind::Amp) {
                let info = self.current_info();
                self.reporter.report(
                    Diagnostic::node(ErrorCode::ExpectedType, info)
                        .with_note("References may only appear at the start of a type."),
                );
                return Err(Recovered);
            } else {
                break;
            }
        }

        let leaf = self.expect(TokenKind::Identifier, ErrorCode::ExpectedType)?;
        let base = builtin_base(leaf.raw)
            .unwrap_or_else(|| TypeBase::UserDefined(leaf.raw.to_string()));

        let info = start.merge(&leaf.info);
        Ok(TypeExpr::new(TypeData::new(modifiers, base), info))
    }

    // ============ Statements ============

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        match self.current_kind() {
            Some(TokenKind::Let) | Some(TokenKind::Mut) => self.parse_let_or_mut(),
            Some(TokenKind::Ret) => self.parse_ret(),
            Some(TokenKind::Loop) | Some(TokenKind::While) | Some(TokenKind::For) => {
                self.parse_loop()
            }
            _ => {
                let start = self.current_info();
                let expr = self.parse_expression()?;
                // statements require a ';' unless they end with a '}'
                if ends_with_block(&expr) {
                    self.consume(TokenKind::Semicolon);
                } else {
                    self.expect_semi();
                }
                let info = start.merge(&self.previous_info());
                Ok(Stmt {
                    kind: StmtKind::Expression(expr),
                    info,
                })
            }
        }
    }

    fn parse_let_or_mut(&mut self) -> ParseResult<Stmt> {
        let start = self.current_info();
        let keyword = self.advance().kind;

        let (name, ty, init) = self.parse_binding()?;
        let info = start.merge(&self.previous_info());

        let kind = match keyword {
            TokenKind::Let => StmtKind::Let { name, ty, init },
            _ => StmtKind::Mut { name, ty, init },
        };

        Ok(Stmt { kind, info })
    }

    fn parse_ret(&mut self) -> ParseResult<Stmt> {
        let start = self.current_info();
        self.advance();

        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_semi();

        Ok(Stmt {
            kind: StmtKind::Ret(value),
            info: start.merge(&self.previous_info()),
        })
    }

    /// `loop body` runs forever; `while cond body` and `for cond body` test
    /// the condition each iteration.
    fn parse_loop(&mut self) -> ParseResult<Stmt> {
        let start = self.current_info();
        let keyword = self.advance().kind;

        let condition = if keyword == TokenKind::Loop {
            None
        } else {
            Some(self.parse_condition()?)
        };

        let body = self.parse_expression()?;
        let info = start.merge(&body.info);

        Ok(Stmt {
            kind: StmtKind::Loop { condition, body },
            info,
        })
    }

    // ============ Expressions ============

    fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.parse_assignment()
    }

    /// A condition position: struct initializers are disabled so that the
    /// `{` of the body is not swallowed as one.
    fn parse_condition(&mut self) -> ParseResult<Expr> {
        let saved = self.no_struct;
        self.no_struct = true;
        let result = self.parse_expression();
        self.no_struct = saved;
        result
    }

    fn parse_assignment(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_if_then()?;

        let op = match self.current_kind() {
            Some(TokenKind::Equal) => BinaryOp::Assign,
            Some(TokenKind::PlusEqual) => BinaryOp::AddAssign,
            Some(TokenKind::HyphenEqual) => BinaryOp::SubAssign,
            Some(TokenKind::StarEqual) => BinaryOp::MulAssign,
            Some(TokenKind::SlashEqual) => BinaryOp::DivAssign,
            Some(TokenKind::PercentEqual) => BinaryOp::RemAssign,
            Some(TokenKind::ShlEqual) => BinaryOp::ShlAssign,
            Some(TokenKind::ShrEqual) => BinaryOp::ShrAssign,
            Some(TokenKind::AmpEqual) => BinaryOp::BitAndAssign,
            Some(TokenKind::PipeEqual) => BinaryOp::BitOrAssign,
            Some(TokenKind::CaretEqual) => BinaryOp::BitXorAssign,
            _ => return Ok(lhs),
        };

        self.advance();
        // right-recursion gives assignment its right associativity
        let rhs = self.parse_assignment()?;
        let info = lhs.info.merge(&rhs.info);

        Ok(Expr {
            kind: ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            info,
        })
    }

    fn parse_if_then(&mut self) -> ParseResult<Expr> {
        if self.check(TokenKind::If) {
            self.parse_if()
        } else {
            self.parse_logical_or()
        }
    }

    /// `then` toggles the expression form: with it, both arms are
    /// expressions and `else` is mandatory; without it, both arms are
    /// blocks and `else` is optional.
    fn parse_if(&mut self) -> ParseResult<Expr> {
        let start = self.current_info();
        self.advance();

        let condition = self.parse_condition()?;

        let (then_branch, else_branch) = if self.consume(TokenKind::Then) {
            let then_branch = self.parse_expression()?;
            if !self.consume(TokenKind::Else) {
                return Err(self.error_here(ErrorCode::ExpectedElseAfterThen));
            }
            let else_branch = self.parse_expression()?;
            (then_branch, Some(else_branch))
        } else {
            let then_branch = self.parse_block()?;
            let else_branch = if self.consume(TokenKind::Else) {
                Some(self.parse_block()?)
            } else {
                None
            };
            (then_branch, else_branch)
        };

        let info = start.merge(
            else_branch
                .as_ref()
                .map(|e| &e.info)
                .unwrap_or(&then_branch.info),
        );

        Ok(Expr {
            kind: ExprKind::IfElse {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: else_branch.map(Box::new),
            },
            info,
        })
    }

    fn parse_binary_level(
        &mut self,
        ops: &[(TokenKind, BinaryOp)],
        next: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut expr = next(self)?;

        'peel: loop {
            for &(token, op) in ops {
                if self.check(token) {
                    self.advance();
                    let rhs = next(self)?;
                    let info = expr.info.merge(&rhs.info);
                    expr = Expr {
                        kind: ExprKind::Binary {
                            op,
                            lhs: Box::new(expr),
                            rhs: Box::new(rhs),
                        },
                        info,
                    };
                    continue 'peel;
                }
            }
            break;
        }

        Ok(expr)
    }

    fn parse_logical_or(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(&[(TokenKind::Or, BinaryOp::Or)], Self::parse_logical_xor)
    }

    fn parse_logical_xor(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(&[(TokenKind::Xor, BinaryOp::Xor)], Self::parse_logical_and)
    }

    fn parse_logical_and(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(&[(TokenKind::And, BinaryOp::And)], Self::parse_logical_not)
    }

    fn parse_logical_not(&mut self) -> ParseResult<Expr> {
        if self.check(TokenKind::Not) {
            let start = self.current_info();
            self.advance();
            let operand = self.parse_logical_not()?;
            let info = start.merge(&operand.info);
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                info,
            });
        }

        self.parse_equality()
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(
            &[
                (TokenKind::EqualEqual, BinaryOp::Eq),
                (TokenKind::BangEqual, BinaryOp::Ne),
            ],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(
            &[
                (TokenKind::Lt, BinaryOp::Lt),
                (TokenKind::Leq, BinaryOp::Le),
                (TokenKind::Gt, BinaryOp::Gt),
                (TokenKind::Geq, BinaryOp::Ge),
            ],
            Self::parse_bitwise_or,
        )
    }

    fn parse_bitwise_or(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(&[(TokenKind::Pipe, BinaryOp::BitOr)], Self::parse_bitwise_xor)
    }

    fn parse_bitwise_xor(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(&[(TokenKind::Caret, BinaryOp::BitXor)], Self::parse_bitwise_and)
    }

    fn parse_bitwise_and(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(&[(TokenKind::Amp, BinaryOp::BitAnd)], Self::parse_shift)
    }

    fn parse_shift(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(
            &[
                (TokenKind::Shl, BinaryOp::Shl),
                (TokenKind::Shr, BinaryOp::Shr),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(
            &[
                (TokenKind::Plus, BinaryOp::Add),
                (TokenKind::Hyphen, BinaryOp::Sub),
            ],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(
            &[
                (TokenKind::Star, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
                (TokenKind::Percent, BinaryOp::Rem),
            ],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let op = match self.current_kind() {
            Some(TokenKind::Tilde) => UnaryOp::BitNot,
            Some(TokenKind::Star) => UnaryOp::Deref,
            Some(TokenKind::Amp) => UnaryOp::Ref,
            Some(TokenKind::At) => UnaryOp::AddrOf,
            Some(TokenKind::Plus) => UnaryOp::Pos,
            Some(TokenKind::Hyphen) => UnaryOp::Neg,
            Some(TokenKind::Clone) => UnaryOp::Clone,
            _ => return self.parse_postfix(),
        };

        let start = self.current_info();
        self.advance();
        let operand = self.parse_unary()?;
        let info = start.merge(&operand.info);

        Ok(Expr {
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            info,
        })
    }

    /// Left-fold of calls, index accesses and field accesses.
    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.current_kind() {
                Some(TokenKind::OpenParen) => {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(TokenKind::CloseParen) {
                        loop {
                            args.push(self.parse_expression()?);
                            if !self.consume(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::CloseParen, ErrorCode::UnclosedParen)?;
                    let info = expr.info.merge(&self.previous_info());
                    expr = Expr {
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        info,
                    };
                }
                Some(TokenKind::OpenBracket) => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::CloseBracket, ErrorCode::ExpectedClosingBracket)?;
                    let info = expr.info.merge(&self.previous_info());
                    expr = Expr {
                        kind: ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        info,
                    };
                }
                Some(TokenKind::Dot) => {
                    self.advance();
                    let field = self.expect_identifier()?;
                    let info = expr.info.merge(&field.info);
                    expr = Expr {
                        kind: ExprKind::FieldAccess {
                            object: Box::new(expr),
                            field: field.raw.to_string(),
                        },
                        info,
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.current_kind() {
            Some(TokenKind::LiteralNumber) => {
                let token = self.advance();
                let value = match token.raw.parse::<i32>() {
                    Ok(value) => value,
                    Err(_) => {
                        self.reporter.report(Diagnostic::token(
                            ErrorCode::NumberLiteralTooLarge,
                            &token,
                        ));
                        0
                    }
                };
                Ok(Expr {
                    kind: ExprKind::Literal(Literal::Int(value)),
                    info: token.info,
                })
            }
            Some(TokenKind::LiteralFloat) => {
                let token = self.advance();
                let value = token.raw.parse::<f64>().unwrap_or(0.0);
                Ok(Expr {
                    kind: ExprKind::Literal(Literal::Float(value)),
                    info: token.info,
                })
            }
            Some(TokenKind::LiteralBool) => {
                let token = self.advance();
                Ok(Expr {
                    kind: ExprKind::Literal(Literal::Bool(token.raw == "true")),
                    info: token.info,
                })
            }
            Some(TokenKind::LiteralChar) => {
                let token = self.advance();
                let body = unescape(&token.raw[1..token.raw.len() - 1], '\'');
                let value = if body.len() == 1 {
                    body.bytes().next().unwrap() as char
                } else {
                    self.reporter
                        .report(Diagnostic::token(ErrorCode::InvalidCharLiteral, &token));
                    '\0'
                };
                Ok(Expr {
                    kind: ExprKind::Literal(Literal::Char(value)),
                    info: token.info,
                })
            }
            Some(TokenKind::LiteralString) => {
                let token = self.advance();
                let body = unescape(&token.raw[1..token.raw.len() - 1], '"');
                Ok(Expr {
                    kind: ExprKind::Literal(Literal::String(body)),
                    info: token.info,
                })
            }
            Some(TokenKind::Identifier) => {
                if !self.no_struct && self.peek_kind() == Some(TokenKind::OpenBrace) {
                    return self.parse_struct_init();
                }
                let token = self.advance();
                Ok(Expr {
                    kind: ExprKind::Identifier(token.raw.to_string()),
                    info: token.info,
                })
            }
            Some(TokenKind::OpenParen) => {
                let start = self.current_info();
                self.advance();

                // parentheses reset the condition ambiguity
                let saved = self.no_struct;
                self.no_struct = false;
                let inner = self.parse_expression();
                self.no_struct = saved;
                let mut expr = inner?;

                self.expect(TokenKind::CloseParen, ErrorCode::UnclosedParen)?;
                expr.info = start.merge(&self.previous_info());
                Ok(expr)
            }
            Some(TokenKind::OpenBrace) => self.parse_block(),
            None => Err(self.error_here(ErrorCode::UnexpectedEndOfInput)),
            _ => Err(self.error_here(ErrorCode::ExpectedExpression)),
        }
    }

    /// `'{' statement* '}'` — a block is itself an expression.
    fn parse_block(&mut self) -> ParseResult<Expr> {
        let start = self.current_info();
        self.expect(TokenKind::OpenBrace, ErrorCode::ExpectedOpeningBrace)?;

        let saved = self.no_struct;
        self.no_struct = false;

        let mut statements = Vec::new();
        while !self.check(TokenKind::CloseBrace) && !self.is_at_end() {
            let before = self.pos;
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(Recovered) => {
                    self.synchronize();
                    if self.pos == before && !self.is_at_end() && !self.check(TokenKind::CloseBrace)
                    {
                        self.advance();
                    }
                }
            }
        }

        self.no_struct = saved;
        self.expect(TokenKind::CloseBrace, ErrorCode::UnmatchedBrace)?;

        Ok(Expr {
            kind: ExprKind::Block(statements),
            info: start.merge(&self.previous_info()),
        })
    }

    /// `IDENT '{' (IDENT ':' expr (',' IDENT ':' expr)*)? '}'`
    fn parse_struct_init(&mut self) -> ParseResult<Expr> {
        let name = self.advance();
        self.advance(); // the opening brace the caller peeked

        let mut fields = Vec::new();
        if !self.check(TokenKind::CloseBrace) {
            loop {
                let field = self.expect_identifier()?;
                if !self.consume(TokenKind::Colon) {
                    let info = self.current_info();
                    self.reporter.report(
                        Diagnostic::node(ErrorCode::UnexpectedTok, info)
                            .with_note("Expected ':' between the field name and its value."),
                    );
                    return Err(Recovered);
                }
                let value = self.parse_expression()?;
                fields.push((field.raw.to_string(), value));
                if !self.consume(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::CloseBrace, ErrorCode::UnmatchedBrace)?;

        Ok(Expr {
            kind: ExprKind::StructInit {
                name: name.raw.to_string(),
                fields,
            },
            info: name.info.merge(&self.previous_info()),
        })
    }
}

/// Whether the expression's final token is a closing brace, which stands
/// in for the statement terminator.
fn ends_with_block(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Block(_) | ExprKind::StructInit { .. } => true,
        ExprKind::IfElse {
            then_branch,
            else_branch,
            ..
        } => match else_branch {
            Some(else_branch) => ends_with_block(else_branch),
            None => ends_with_block(then_branch),
        },
        _ => false,
    }
}

/// Resolve an escaped literal body; only `\<delim>` is an escape.
fn unescape(body: &str, delim: char) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&delim) {
            out.push(chars.next().unwrap());
        } else {
            out.push(c);
        }
    }

    out
}

fn builtin_base(name: &str) -> Option<TypeBase> {
    let base = match name {
        "bool" => TypeBase::Bool,
        "i8" => TypeBase::Int(IntWidth::W8),
        "i16" => TypeBase::Int(IntWidth::W16),
        "i32" => TypeBase::Int(IntWidth::W32),
        "i64" => TypeBase::Int(IntWidth::W64),
        "u8" => TypeBase::Uint(IntWidth::W8),
        "u16" => TypeBase::Uint(IntWidth::W16),
        "u32" => TypeBase::Uint(IntWidth::W32),
        "u64" => TypeBase::Uint(IntWidth::W64),
        "f32" => TypeBase::Float(FloatWidth::W32),
        "f64" => TypeBase::Float(FloatWidth::W64),
        _ => return None,
    };
    Some(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;

    fn test_path() -> Arc<Path> {
        Arc::from(Path::new("test.csc"))
    }

    fn parse_source(source: &str) -> (Program, Vec<ErrorCode>) {
        let mut reporter = Reporter::new();
        let path = test_path();
        let tokens = lexer::lex(source, &path, &mut reporter);
        let program = parse(tokens, path, &mut reporter);
        let codes = reporter.diagnostics().iter().map(|d| d.code).collect();
        (program, codes)
    }

    fn parse_clean(source: &str) -> Program {
        let (program, codes) = parse_source(source);
        assert!(codes.is_empty(), "unexpected diagnostics: {:?}", codes);
        program
    }

    #[test]
    fn test_module_and_const() {
        let program = parse_clean("module m;\nconst x = 5;");
        assert_eq!(program.declarations.len(), 2);

        match &program.declarations[0].kind {
            DeclKind::Module { name } => assert_eq!(name, "m"),
            other => panic!("expected module, got {:?}", other),
        }

        match &program.declarations[1].kind {
            DeclKind::Const { name, ty, init } => {
                assert_eq!(name, "x");
                assert!(ty.data.is_implied());
                assert!(matches!(init.kind, ExprKind::Literal(Literal::Int(5))));
            }
            other => panic!("expected const, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_module() {
        let (program, codes) = parse_source("module a; module b;");
        assert_eq!(codes, vec![ErrorCode::DuplicateModule]);
        match &program.declarations[0].kind {
            DeclKind::Module { name } => assert_eq!(name, "a"),
            other => panic!("expected module, got {:?}", other),
        }
    }

    #[test]
    fn test_fn_with_args_and_body() {
        let program = parse_clean("fn f(a: i32, b: i32): i32 { ret a + b; }");
        assert_eq!(program.declarations.len(), 1);

        let (args, ret, body) = match &program.declarations[0].kind {
            DeclKind::Fn { args, ret, body, .. } => (args, ret, body),
            other => panic!("expected fn, got {:?}", other),
        };

        assert_eq!(args.len(), 2);
        assert_eq!(args[0].name, "a");
        assert_eq!(args[0].ty.data, TypeData::int(IntWidth::W32));
        assert_eq!(ret.data, TypeData::int(IntWidth::W32));

        let statements = match &body.kind {
            ExprKind::Block(statements) => statements,
            other => panic!("expected block, got {:?}", other),
        };
        assert_eq!(statements.len(), 1);

        let value = match &statements[0].kind {
            StmtKind::Ret(Some(value)) => value,
            other => panic!("expected ret, got {:?}", other),
        };
        match &value.kind {
            ExprKind::Binary { op, lhs, rhs } => {
                assert_eq!(*op, BinaryOp::Add);
                assert!(matches!(&lhs.kind, ExprKind::Identifier(n) if n == "a"));
                assert!(matches!(&rhs.kind, ExprKind::Identifier(n) if n == "b"));
            }
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_semicolon_recovers() {
        let (program, codes) = parse_source("fn f() { let x = 1 let y = 2; }");
        assert_eq!(codes, vec![ErrorCode::ExpectedSemi]);

        let body = match &program.declarations[0].kind {
            DeclKind::Fn { body, .. } => body,
            other => panic!("expected fn, got {:?}", other),
        };
        let statements = match &body.kind {
            ExprKind::Block(statements) => statements,
            other => panic!("expected block, got {:?}", other),
        };
        // the first let is complete apart from its ';', so both survive
        assert_eq!(statements.len(), 2);
        assert!(matches!(&statements[0].kind, StmtKind::Let { name, .. } if name == "x"));
        assert!(matches!(&statements[1].kind, StmtKind::Let { name, .. } if name == "y"));
    }

    #[test]
    fn test_export_of_export_is_rejected() {
        let (_, codes) = parse_source("export export const x = 1;");
        assert!(codes.contains(&ErrorCode::CannotExportExport));
    }

    #[test]
    fn test_export_wraps_declaration() {
        let program = parse_clean("export fn f() { }");
        let inner = match &program.declarations[0].kind {
            DeclKind::Export(inner) => inner,
            other => panic!("expected export, got {:?}", other),
        };
        assert!(matches!(inner.kind, DeclKind::Fn { .. }));
    }

    #[test]
    fn test_import_forms() {
        let program = parse_clean(
            "import core.mem;\nimport core.io from { read, write } as io;",
        );

        match &program.declarations[0].kind {
            DeclKind::Import {
                module,
                items,
                alias,
            } => {
                assert_eq!(module, "core.mem");
                assert!(items.is_empty());
                assert!(alias.is_none());
            }
            other => panic!("expected import, got {:?}", other),
        }

        match &program.declarations[1].kind {
            DeclKind::Import {
                module,
                items,
                alias,
            } => {
                assert_eq!(module, "core.io");
                assert_eq!(items, &["read".to_string(), "write".to_string()]);
                assert_eq!(alias.as_deref(), Some("io"));
            }
            other => panic!("expected import, got {:?}", other),
        }
    }

    #[test]
    fn test_type_alias() {
        let program = parse_clean("type meters = u64;");
        match &program.declarations[0].kind {
            DeclKind::TypeAlias { name, ty } => {
                assert_eq!(name, "meters");
                assert_eq!(ty.data, TypeData::uint(IntWidth::W64));
            }
            other => panic!("expected type alias, got {:?}", other),
        }
    }

    #[test]
    fn test_type_modifier_stack() {
        let program = parse_clean("const p: &mut *[]i32 = x;");
        let ty = match &program.declarations[0].kind {
            DeclKind::Const { ty, .. } => ty,
            other => panic!("expected const, got {:?}", other),
        };
        assert_eq!(
            ty.data.modifiers,
            vec![TypeModifier::MutRef, TypeModifier::Ptr, TypeModifier::Array]
        );
        assert_eq!(ty.data.base, TypeBase::Int(IntWidth::W32));
    }

    #[test]
    fn test_nested_reference_is_rejected() {
        let (_, codes) = parse_source("const p: *&i32 = x;");
        assert!(codes.contains(&ErrorCode::ExpectedType));
    }

    #[test]
    fn test_precedence_mul_binds_tighter() {
        let program = parse_clean("const x = 1 + 2 * 3;");
        let init = match &program.declarations[0].kind {
            DeclKind::Const { init, .. } => init,
            other => panic!("expected const, got {:?}", other),
        };
        match &init.kind {
            ExprKind::Binary { op, rhs, .. } => {
                assert_eq!(*op, BinaryOp::Add);
                assert!(matches!(
                    &rhs.kind,
                    ExprKind::Binary {
                        op: BinaryOp::Mul,
                        ..
                    }
                ));
            }
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let program = parse_clean("fn f() { a = b = c; }");
        let body = match &program.declarations[0].kind {
            DeclKind::Fn { body, .. } => body,
            other => panic!("expected fn, got {:?}", other),
        };
        let statements = match &body.kind {
            ExprKind::Block(statements) => statements,
            other => panic!("expected block, got {:?}", other),
        };
        let expr = match &statements[0].kind {
            StmtKind::Expression(expr) => expr,
            other => panic!("expected expression statement, got {:?}", other),
        };
        match &expr.kind {
            ExprKind::Binary { op, rhs, .. } => {
                assert_eq!(*op, BinaryOp::Assign);
                assert!(matches!(
                    &rhs.kind,
                    ExprKind::Binary {
                        op: BinaryOp::Assign,
                        ..
                    }
                ));
            }
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[test]
    fn test_if_then_requires_else() {
        let (_, codes) = parse_source("const x = if a then 1;");
        assert!(codes.contains(&ErrorCode::ExpectedElseAfterThen));
    }

    #[test]
    fn test_if_then_else_expression_form() {
        let program = parse_clean("const x = if a then 1 else 2;");
        let init = match &program.declarations[0].kind {
            DeclKind::Const { init, .. } => init,
            other => panic!("expected const, got {:?}", other),
        };
        match &init.kind {
            ExprKind::IfElse {
                then_branch,
                else_branch,
                ..
            } => {
                assert!(matches!(
                    then_branch.kind,
                    ExprKind::Literal(Literal::Int(1))
                ));
                assert!(else_branch.is_some());
            }
            other => panic!("expected if-else, got {:?}", other),
        }
    }

    #[test]
    fn test_if_block_form_else_optional() {
        let program = parse_clean("fn f() { if a { ret; } }");
        let body = match &program.declarations[0].kind {
            DeclKind::Fn { body, .. } => body,
            other => panic!("expected fn, got {:?}", other),
        };
        let statements = match &body.kind {
            ExprKind::Block(statements) => statements,
            other => panic!("expected block, got {:?}", other),
        };
        let expr = match &statements[0].kind {
            StmtKind::Expression(expr) => expr,
            other => panic!("expected expression statement, got {:?}", other),
        };
        match &expr.kind {
            ExprKind::IfElse { else_branch, .. } => assert!(else_branch.is_none()),
            other => panic!("expected if-else, got {:?}", other),
        }
    }

    #[test]
    fn test_block_ending_statements_need_no_semicolon() {
        parse_clean("fn f() { if a { ret; } { ret; } }");
    }

    #[test]
    fn test_trailing_semicolon_after_block_is_tolerated() {
        parse_clean("fn f() { if a { ret; }; }");
    }

    #[test]
    fn test_then_form_if_statement_requires_semicolon() {
        let (_, codes) = parse_source("fn f() { if a then b else c }");
        assert_eq!(codes, vec![ErrorCode::ExpectedSemi]);
    }

    #[test]
    fn test_struct_init_statement_needs_no_semicolon() {
        let program = parse_clean("fn f() { vec2 { x: 1 } }");
        let body = match &program.declarations[0].kind {
            DeclKind::Fn { body, .. } => body,
            other => panic!("expected fn, got {:?}", other),
        };
        let statements = match &body.kind {
            ExprKind::Block(statements) => statements,
            other => panic!("expected block, got {:?}", other),
        };
        assert!(matches!(
            &statements[0].kind,
            StmtKind::Expression(expr) if matches!(&expr.kind, ExprKind::StructInit { .. })
        ));
    }

    #[test]
    fn test_loop_forms() {
        let program = parse_clean("fn f() { loop { ret; } while a < 10 { ret; } }");
        let body = match &program.declarations[0].kind {
            DeclKind::Fn { body, .. } => body,
            other => panic!("expected fn, got {:?}", other),
        };
        let statements = match &body.kind {
            ExprKind::Block(statements) => statements,
            other => panic!("expected block, got {:?}", other),
        };
        assert!(matches!(
            &statements[0].kind,
            StmtKind::Loop {
                condition: None,
                ..
            }
        ));
        assert!(matches!(
            &statements[1].kind,
            StmtKind::Loop {
                condition: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn test_postfix_chain() {
        let program = parse_clean("const x = f(1)[2].field;");
        let init = match &program.declarations[0].kind {
            DeclKind::Const { init, .. } => init,
            other => panic!("expected const, got {:?}", other),
        };
        let object = match &init.kind {
            ExprKind::FieldAccess { object, field } => {
                assert_eq!(field, "field");
                object
            }
            other => panic!("expected field access, got {:?}", other),
        };
        let object = match &object.kind {
            ExprKind::Index { object, .. } => object,
            other => panic!("expected index, got {:?}", other),
        };
        assert!(matches!(&object.kind, ExprKind::Call { .. }));
    }

    #[test]
    fn test_struct_init() {
        let program = parse_clean("const p = vec2 { x: 1, y: 2 };");
        let init = match &program.declarations[0].kind {
            DeclKind::Const { init, .. } => init,
            other => panic!("expected const, got {:?}", other),
        };
        match &init.kind {
            ExprKind::StructInit { name, fields } => {
                assert_eq!(name, "vec2");
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].0, "x");
            }
            other => panic!("expected struct init, got {:?}", other),
        }
    }

    #[test]
    fn test_condition_does_not_eat_body_as_struct_init() {
        let program = parse_clean("fn f() { while x { ret; } }");
        let body = match &program.declarations[0].kind {
            DeclKind::Fn { body, .. } => body,
            other => panic!("expected fn, got {:?}", other),
        };
        let statements = match &body.kind {
            ExprKind::Block(statements) => statements,
            other => panic!("expected block, got {:?}", other),
        };
        match &statements[0].kind {
            StmtKind::Loop {
                condition: Some(condition),
                body,
            } => {
                assert!(matches!(&condition.kind, ExprKind::Identifier(n) if n == "x"));
                assert!(matches!(&body.kind, ExprKind::Block(_)));
            }
            other => panic!("expected loop, got {:?}", other),
        }
    }

    #[test]
    fn test_unary_chain() {
        let program = parse_clean("const x = *&y;");
        let init = match &program.declarations[0].kind {
            DeclKind::Const { init, .. } => init,
            other => panic!("expected const, got {:?}", other),
        };
        match &init.kind {
            ExprKind::Unary { op, operand } => {
                assert_eq!(*op, UnaryOp::Deref);
                assert!(matches!(
                    &operand.kind,
                    ExprKind::Unary {
                        op: UnaryOp::Ref,
                        ..
                    }
                ));
            }
            other => panic!("expected unary, got {:?}", other),
        }
    }

    #[test]
    fn test_number_literal_too_large() {
        let (_, codes) = parse_source("const x = 99999999999;");
        assert_eq!(codes, vec![ErrorCode::NumberLiteralTooLarge]);
    }

    #[test]
    fn test_invalid_char_literal() {
        let (_, codes) = parse_source("const c = 'ab';");
        assert_eq!(codes, vec![ErrorCode::InvalidCharLiteral]);
    }

    #[test]
    fn test_unclosed_paren() {
        let (_, codes) = parse_source("const x = (1 + 2;");
        assert!(codes.contains(&ErrorCode::UnclosedParen));
    }

    #[test]
    fn test_node_spans_cover_descendants() {
        let source = "fn f(a: i32): i32 { ret a + 1; }";
        let program = parse_clean(source);
        let decl = &program.declarations[0];

        let body = match &decl.kind {
            DeclKind::Fn { body, .. } => body,
            other => panic!("expected fn, got {:?}", other),
        };
        assert!(decl.info.position <= body.info.position);
        assert!(decl.info.end() >= body.info.end());

        let statements = match &body.kind {
            ExprKind::Block(statements) => statements,
            other => panic!("expected block, got {:?}", other),
        };
        assert!(body.info.position <= statements[0].info.position);
        assert!(body.info.end() >= statements[0].info.end());
    }

    #[test]
    fn test_parsing_is_deterministic() {
        let source = "module m; fn f() { let x = if a then 1 else 2; }";
        let (first, codes_a) = parse_source(source);
        let (second, codes_b) = parse_source(source);
        assert_eq!(codes_a, codes_b);
        assert_eq!(format!("{:?}", first), format!("{:?}", second));
    }

    #[test]
    fn test_recovery_terminates_on_garbage() {
        let (_, codes) = parse_source(";;; ) } ] @@ fn f( { const = ;");
        assert!(!codes.is_empty());
    }

    #[test]
    fn test_expected_declaration_at_stray_token() {
        let (_, codes) = parse_source("+ const x = 1;");
        assert!(codes.contains(&ErrorCode::ExpectedDeclaration));
    }
}
