//! Typechecker for the Cascade language
//!
//! Checking runs in two passes per program. The first pass walks only the
//! top-level declarations and records their declared types, so bodies can
//! refer to anything in the file regardless of order. The second pass
//! visits every declaration and expression, computes a [`TypeData`] for
//! each, and rewrites `implied` annotations in place with the inferred
//! type.
//!
//! Errors never abort checking: a reported expression gets the error type,
//! which compares equal to everything, so one mistake is diagnosed once
//! instead of echoing through every enclosing expression.

use crate::ast::*;
use crate::errors::{Diagnostic, ErrorCode, Reporter};
use crate::span::SourceInfo;
use std::collections::HashMap;

/// Typecheck every program, reporting through the sink and annotating the
/// trees in place. Returns true iff any error was reported.
pub fn typecheck(programs: &mut [Program], reporter: &mut Reporter) -> bool {
    let before = reporter.len();

    for program in programs.iter_mut() {
        let mut checker = TypeChecker::new(reporter);
        checker.register_global_symbols(program);
        for decl in &mut program.declarations {
            checker.check_declaration(decl);
        }
    }

    reporter.len() > before
}

/// The declared shape of a function, recorded in pass one.
#[derive(Debug, Clone)]
pub struct FnSig {
    pub params: Vec<TypeData>,
    pub ret: TypeData,
}

/// One lexical scope: name bindings introduced by declarations and
/// statements. Lookup walks outward through the enclosing scopes; inserts
/// are always local.
#[derive(Debug, Default)]
pub struct Scope {
    bindings: HashMap<String, TypeData>,
}

pub struct TypeChecker<'r> {
    reporter: &'r mut Reporter,
    /// Innermost scope last
    scopes: Vec<Scope>,
    functions: HashMap<String, FnSig>,
    aliases: HashMap<String, TypeData>,
    /// Names whose initializers are currently being checked; a stack so
    /// nested initializers diagnose correctly
    initializing: Vec<String>,
    /// Declared return type of the function being checked
    current_ret: Option<TypeData>,
}

impl<'r> TypeChecker<'r> {
    pub fn new(reporter: &'r mut Reporter) -> Self {
        Self {
            reporter,
            scopes: vec![Scope::default()],
            functions: HashMap::new(),
            aliases: HashMap::new(),
            initializing: Vec::new(),
            current_ret: None,
        }
    }

    // ============ Pass one: symbol collection ============

    /// Record every top-level declared type without looking at bodies.
    pub fn register_global_symbols(&mut self, program: &Program) {
        for decl in &program.declarations {
            self.register_declaration(decl);
        }
    }

    fn register_declaration(&mut self, decl: &Decl) {
        match &decl.kind {
            DeclKind::Const { name, ty, .. } | DeclKind::Static { name, ty, .. } => {
                let declared = self.resolve_alias(&ty.data);
                self.bind(name, declared);
            }
            DeclKind::Fn { name, args, ret, .. } => {
                let sig = FnSig {
                    params: args.iter().map(|a| self.resolve_alias(&a.ty.data)).collect(),
                    ret: self.resolve_alias(&ret.data),
                };
                self.functions.insert(name.clone(), sig);
            }
            DeclKind::TypeAlias { name, ty } => {
                let target = self.resolve_alias(&ty.data);
                self.aliases.insert(name.clone(), target);
            }
            // exports are transparent; what they wrap is what gets registered
            DeclKind::Export(inner) => self.register_declaration(inner),
            // imports bind to external definitions in a later phase
            DeclKind::Module { .. } | DeclKind::Import { .. } => {}
        }
    }

    /// Chase a user-defined name through the alias table, splicing the
    /// written modifiers outside the aliased ones.
    fn resolve_alias(&self, data: &TypeData) -> TypeData {
        let mut result = data.clone();

        // bounded so a cyclic alias cannot hang the checker
        for _ in 0..32 {
            let TypeBase::UserDefined(name) = &result.base else {
                break;
            };
            let Some(target) = self.aliases.get(name) else {
                break;
            };
            if result.modifiers.is_empty() && target.modifiers.is_empty() {
                result = target.clone();
            } else if matches!(
                target.base,
                TypeBase::Implied | TypeBase::Void | TypeBase::Error
            ) {
                break;
            } else {
                let mut modifiers = result.modifiers.clone();
                modifiers.extend(target.modifiers.iter().copied());
                result = TypeData::new(modifiers, target.base.clone());
            }
        }

        result
    }

    // ============ Pass two: checking ============

    pub fn check_declaration(&mut self, decl: &mut Decl) {
        match &mut decl.kind {
            DeclKind::Const { name, ty, init } | DeclKind::Static { name, ty, init } => {
                let name = name.clone();
                self.check_binding(&name, ty, init);
            }
            DeclKind::Fn { args, ret, body, .. } => {
                self.scopes.push(Scope::default());
                for arg in args.iter() {
                    let declared = self.resolve_alias(&arg.ty.data);
                    self.bind(&arg.name, declared);
                }
                self.current_ret = Some(self.resolve_alias(&ret.data));
                self.check_expr(body);
                self.current_ret = None;
                self.scopes.pop();
            }
            DeclKind::Export(inner) => self.check_declaration(inner),
            DeclKind::Module { .. } | DeclKind::Import { .. } | DeclKind::TypeAlias { .. } => {}
        }
    }

    /// The shared rule for `const`/`static`/`let`/`mut`: check the
    /// initializer with the name on the initializing stack, then either
    /// rewrite an implied annotation or require the initializer to promote
    /// to the declared type.
    fn check_binding(&mut self, name: &str, ty: &mut TypeExpr, init: &mut Expr) {
        self.initializing.push(name.to_string());
        let init_ty = self.check_expr(init);
        self.initializing.pop();

        if ty.data.is_implied() {
            ty.data = init_ty.clone();
            self.bind(name, init_ty);
        } else {
            let declared = self.resolve_alias(&ty.data);
            self.expect_assignable(&declared, &init_ty, &init.info);
            self.bind(name, declared);
        }
    }

    fn check_stmt(&mut self, stmt: &mut Stmt) {
        let stmt_info = stmt.info.clone();
        match &mut stmt.kind {
            StmtKind::Let { name, ty, init } | StmtKind::Mut { name, ty, init } => {
                let name = name.clone();
                self.check_binding(&name, ty, init);
            }
            StmtKind::Ret(value) => {
                let expected = self.current_ret.clone().unwrap_or_else(TypeData::void);
                match value {
                    Some(expr) => {
                        let found = self.check_expr(expr);
                        let info = expr.info.clone();
                        self.expect_assignable(&expected, &found, &info);
                    }
                    None => {
                        self.expect_assignable(&expected, &TypeData::void(), &stmt_info);
                    }
                }
            }
            StmtKind::Loop { condition, body } => {
                if let Some(condition) = condition {
                    let found = self.check_expr(condition);
                    let info = condition.info.clone();
                    self.expect_assignable(&TypeData::bool(), &found, &info);
                }
                self.check_expr(body);
            }
            StmtKind::Expression(expr) => {
                self.check_expr(expr);
            }
        }
    }

    fn check_expr(&mut self, expr: &mut Expr) -> TypeData {
        let info = expr.info.clone();

        match &mut expr.kind {
            ExprKind::Literal(literal) => match literal {
                Literal::Char(_) => TypeData::int(IntWidth::W8),
                Literal::Int(_) => TypeData::int(IntWidth::W32),
                Literal::Float(_) => TypeData::float(FloatWidth::W64),
                Literal::Bool(_) => TypeData::bool(),
                // a proper slice design is still pending; until then a
                // string is an array of its char type
                Literal::String(_) => {
                    TypeData::new(vec![TypeModifier::Array], TypeBase::Int(IntWidth::W8))
                }
            },

            ExprKind::Identifier(name) => {
                let name = name.clone();
                if self.initializing.iter().any(|n| *n == name) {
                    self.reporter.report(Diagnostic::of_type(
                        ErrorCode::UsingVariableInInitializer,
                        info,
                    ));
                    return TypeData::error();
                }

                match self.lookup(&name) {
                    // a forward reference to a not-yet-inferred global;
                    // nothing useful can be said about it yet
                    Some(found) if found.is_implied() => TypeData::error(),
                    Some(found) => found,
                    None => {
                        let note = format!("No binding named '{}' is in scope here.", name);
                        self.reporter.report(
                            Diagnostic::of_type(ErrorCode::UnknownIdentifier, info)
                                .with_note(note),
                        );
                        TypeData::error()
                    }
                }
            }

            ExprKind::Unary { op, operand } => {
                let op = *op;
                let operand_ty = self.check_expr(operand);
                if operand_ty.is_error() {
                    return TypeData::error();
                }

                match op {
                    UnaryOp::AddrOf => operand_ty.with_outer_modifier(TypeModifier::MutPtr),
                    UnaryOp::Ref => operand_ty.with_outer_modifier(TypeModifier::MutRef),
                    UnaryOp::Deref => match operand_ty.outer_modifier() {
                        Some(TypeModifier::Ptr) | Some(TypeModifier::MutPtr) => {
                            operand_ty.without_outer_modifier()
                        }
                        _ => {
                            self.reporter.report(Diagnostic::of_type(
                                ErrorCode::DereferenceRequiresPointerType,
                                info,
                            ));
                            TypeData::error()
                        }
                    },
                    UnaryOp::Neg
                    | UnaryOp::Pos
                    | UnaryOp::BitNot
                    | UnaryOp::Not
                    | UnaryOp::Clone => operand_ty,
                }
            }

            ExprKind::Binary { op, lhs, rhs } => {
                let op = *op;
                let lhs_ty = self.check_expr(lhs);
                let rhs_ty = self.check_expr(rhs);

                if op.is_assignment() {
                    let rhs_info = rhs.info.clone();
                    self.expect_assignable(&lhs_ty, &rhs_ty, &rhs_info);
                    return lhs_ty;
                }

                let common = self.binary_convert(&lhs_ty, &rhs_ty, &info);
                if common.is_error() {
                    common
                } else if op.is_boolean_valued() {
                    TypeData::bool()
                } else {
                    common
                }
            }

            ExprKind::Call { callee, args } => {
                let mut arg_types = Vec::with_capacity(args.len());
                for arg in args.iter_mut() {
                    arg_types.push(self.check_expr(arg));
                }

                let ExprKind::Identifier(name) = &callee.kind else {
                    let callee_info = callee.info.clone();
                    self.reporter.report(
                        Diagnostic::of_type(ErrorCode::MismatchedTypes, callee_info)
                            .with_note("This expression is not callable."),
                    );
                    return TypeData::error();
                };

                let Some(sig) = self.functions.get(name).cloned() else {
                    let note = format!("No function named '{}' is in scope here.", name);
                    let callee_info = callee.info.clone();
                    self.reporter.report(
                        Diagnostic::of_type(ErrorCode::UnknownIdentifier, callee_info)
                            .with_note(note),
                    );
                    return TypeData::error();
                };

                if sig.params.len() != arg_types.len() {
                    let note = format!(
                        "Expected {} argument(s), got {}.",
                        sig.params.len(),
                        arg_types.len()
                    );
                    self.reporter.report(
                        Diagnostic::of_type(ErrorCode::MismatchedTypes, info).with_note(note),
                    );
                    return TypeData::error();
                }

                for ((param, found), arg) in sig.params.iter().zip(&arg_types).zip(args.iter()) {
                    let arg_info = arg.info.clone();
                    self.expect_assignable(param, found, &arg_info);
                }

                sig.ret
            }

            // field layouts belong to the deferred struct design; until
            // they exist no access can resolve, and a silent error type
            // would let a broken tree typecheck cleanly
            ExprKind::FieldAccess { object, field } => {
                let field = field.clone();
                let object_ty = self.check_expr(object);
                if object_ty.is_error() {
                    return TypeData::error();
                }

                let note = format!(
                    "Type '{}' has no known field named '{}'.",
                    object_ty, field
                );
                self.reporter.report(
                    Diagnostic::of_type(ErrorCode::UnknownIdentifier, info).with_note(note),
                );
                TypeData::error()
            }

            ExprKind::Index { object, index } => {
                let object_ty = self.check_expr(object);
                let index_ty = self.check_expr(index);

                if !index_ty.is_error()
                    && !(index_ty.modifiers.is_empty()
                        && matches!(index_ty.base, TypeBase::Int(_) | TypeBase::Uint(_)))
                {
                    let note = format!("Expected an integer index, got type '{}'.", index_ty);
                    let index_info = index.info.clone();
                    self.reporter.report(
                        Diagnostic::of_type(ErrorCode::MismatchedTypes, index_info)
                            .with_note(note),
                    );
                }

                if object_ty.is_error() {
                    return TypeData::error();
                }
                match object_ty.outer_modifier() {
                    Some(TypeModifier::Array) => object_ty.without_outer_modifier(),
                    _ => {
                        let note = format!("Expected an array type, got type '{}'.", object_ty);
                        self.reporter.report(
                            Diagnostic::of_type(ErrorCode::MismatchedTypes, info).with_note(note),
                        );
                        TypeData::error()
                    }
                }
            }

            ExprKind::IfElse {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition_ty = self.check_expr(condition);
                let condition_info = condition.info.clone();
                self.expect_assignable(&TypeData::bool(), &condition_ty, &condition_info);

                let then_ty = self.check_expr(then_branch);
                match else_branch {
                    Some(else_branch) => {
                        let else_ty = self.check_expr(else_branch);
                        self.binary_convert(&then_ty, &else_ty, &info)
                    }
                    None => TypeData::void(),
                }
            }

            ExprKind::Block(statements) => {
                self.scopes.push(Scope::default());
                for stmt in statements.iter_mut() {
                    self.check_stmt(stmt);
                }
                self.scopes.pop();
                TypeData::void()
            }

            ExprKind::StructInit { name, fields } => {
                let name = name.clone();
                for (_, value) in fields.iter_mut() {
                    self.check_expr(value);
                }
                TypeData::user_defined(name)
            }
        }
    }

    // ============ Conversions ============

    /// Promote two operand types to a common type, or report
    /// `mismatched_types` and hand back the absorbing error type.
    fn binary_convert(&mut self, lhs: &TypeData, rhs: &TypeData, info: &SourceInfo) -> TypeData {
        if lhs.is_error() || rhs.is_error() {
            return TypeData::error();
        }

        if let Some(common) = promoted(lhs, rhs) {
            return common;
        }

        let note = format!("Expected type '{}', got type '{}'.", lhs, rhs);
        self.reporter.report(
            Diagnostic::of_type(ErrorCode::MismatchedTypes, info.clone()).with_note(note),
        );
        TypeData::error()
    }

    /// Require `found` to equal `expected` or widen to it.
    fn expect_assignable(&mut self, expected: &TypeData, found: &TypeData, info: &SourceInfo) {
        if promotable(found, expected) {
            return;
        }

        let note = format!("Expected type '{}', got type '{}'.", expected, found);
        self.reporter.report(
            Diagnostic::of_type(ErrorCode::MismatchedTypes, info.clone()).with_note(note),
        );
    }

    // ============ Scopes ============

    fn bind(&mut self, name: &str, ty: TypeData) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .bindings
            .insert(name.to_string(), ty);
    }

    fn lookup(&self, name: &str) -> Option<TypeData> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.bindings.get(name))
            .cloned()
    }
}

/// Whether `from` is `to` or widens to it. Promotion never crosses bases,
/// never narrows, and never applies under modifiers.
pub fn promotable(from: &TypeData, to: &TypeData) -> bool {
    if from == to {
        return true;
    }
    if !from.modifiers.is_empty() || !to.modifiers.is_empty() {
        return false;
    }
    match (&from.base, &to.base) {
        (TypeBase::Int(a), TypeBase::Int(b)) => a <= b,
        (TypeBase::Uint(a), TypeBase::Uint(b)) => a <= b,
        (TypeBase::Float(a), TypeBase::Float(b)) => a <= b,
        _ => false,
    }
}

/// The common promotion target of two types, when one exists.
pub fn promoted(a: &TypeData, b: &TypeData) -> Option<TypeData> {
    if promotable(b, a) {
        Some(a.clone())
    } else if promotable(a, b) {
        Some(b.clone())
    } else {
        None
    }
}
