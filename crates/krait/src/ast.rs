//! Positionally-annotated AST produced by the parser.
//!
//! Every node carries the line number of its first meaningful token; line
//! numbers are never lost on transformation. Statement bodies are stored
//! behind `Rc` so generator continuation frames can capture the remainder of
//! a block without cloning subtrees.

use std::rc::Rc;

use num_bigint::BigInt;

/// A block of statements. Shared by the owning node and any continuation
/// frames created while suspending inside it.
pub(crate) type Block = Rc<Vec<StmtLoc>>;

/// A statement with its source line.
#[derive(Debug, Clone)]
pub(crate) struct StmtLoc {
    pub line: u32,
    pub node: Stmt,
}

/// An expression with its source line.
#[derive(Debug, Clone)]
pub(crate) struct ExprLoc {
    pub line: u32,
    pub node: Expr,
}

impl ExprLoc {
    pub(crate) fn new(line: u32, node: Expr) -> Self {
        Self { line, node }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Stmt {
    Expr(ExprLoc),
    /// `target = value`, or `a = b = value` when `targets.len() > 1`.
    Assign {
        targets: Vec<Target>,
        value: ExprLoc,
    },
    /// `target op= value`.
    AugAssign {
        target: Target,
        op: BinOp,
        value: ExprLoc,
    },
    /// `target: annotation [= value]` - the annotation is parsed and discarded.
    AnnAssign {
        target: Target,
        value: Option<ExprLoc>,
    },
    /// `if`/`elif` chain: one (condition, body) per branch.
    If {
        branches: Vec<(ExprLoc, Block)>,
        or_else: Option<Block>,
    },
    While {
        cond: ExprLoc,
        body: Block,
        or_else: Option<Block>,
    },
    For {
        target: Target,
        iter: ExprLoc,
        body: Block,
        or_else: Option<Block>,
    },
    Def(Rc<FuncDecl>),
    Class {
        name: String,
        bases: Vec<ExprLoc>,
        body: Block,
        decorators: Vec<ExprLoc>,
    },
    Return(Option<ExprLoc>),
    Pass,
    Break,
    Continue,
    /// `raise [exc]`; a bare raise re-raises the active exception.
    Raise(Option<ExprLoc>),
    Try {
        body: Block,
        handlers: Vec<ExceptHandler>,
        or_else: Option<Block>,
        finally: Option<Block>,
    },
    With {
        expr: ExprLoc,
        name: Option<String>,
        body: Block,
    },
    Assert {
        cond: ExprLoc,
        msg: Option<ExprLoc>,
    },
    Del(Vec<Target>),
    Global(Vec<String>),
    Nonlocal(Vec<String>),
    /// `import x [as y], z [as w]`.
    Import(Vec<(String, Option<String>)>),
    /// `from module import a [as b], c`.
    FromImport {
        module: String,
        names: Vec<(String, Option<String>)>,
    },
    Match {
        subject: ExprLoc,
        cases: Vec<MatchCase>,
    },
}

/// An assignment target. Tuple targets deeper than one level are rejected by
/// the parser, so `Tuple` elements are never themselves tuples.
#[derive(Debug, Clone)]
pub(crate) enum Target {
    Name(String),
    Attr { obj: ExprLoc, attr: String },
    Subscript { obj: ExprLoc, index: ExprLoc },
    Tuple(Vec<Target>),
}

/// `except [classes] [as name]:` clause. An empty class list is a bare
/// `except:` catching everything catchable.
#[derive(Debug, Clone)]
pub(crate) struct ExceptHandler {
    pub classes: Vec<ExprLoc>,
    pub name: Option<String>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub(crate) struct MatchCase {
    pub pattern: Pattern,
    pub guard: Option<ExprLoc>,
    pub body: Block,
}

/// A `case` pattern.
#[derive(Debug, Clone)]
pub(crate) enum Pattern {
    /// A literal or dotted-value pattern, compared by equality.
    Literal(ExprLoc),
    /// `_` - matches anything, binds nothing.
    Wildcard,
    /// A bare name - matches anything and binds it.
    Capture(String),
    /// `[a, b, *rest]` or `(a, b)`.
    Sequence(Vec<Pattern>),
    /// `*rest` inside a sequence pattern; `None` for `*_`.
    Star(Option<String>),
    /// `{key: pat, **rest}` - keys are literal expressions.
    Mapping {
        items: Vec<(ExprLoc, Pattern)>,
        rest: Option<String>,
    },
    /// `Cls(p1, attr=p2)`.
    Class {
        class: ExprLoc,
        positional: Vec<Pattern>,
        keyword: Vec<(String, Pattern)>,
    },
    /// `p1 | p2 | p3` - first alternative that matches wins.
    Or(Vec<Pattern>),
}

/// A function or lambda declaration.
///
/// Default-value expressions are kept unevaluated and evaluated at call time
/// in the caller's context. `is_generator` is set when the body lexically
/// contains `yield` or `yield from`.
#[derive(Debug, Clone)]
pub(crate) struct FuncDecl {
    pub name: String,
    pub params: Params,
    pub body: Block,
    pub decorators: Vec<ExprLoc>,
    pub is_generator: bool,
    pub line: u32,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Params {
    /// Positional-or-keyword parameters, in declaration order.
    pub pos: Vec<Param>,
    /// `*args` name, if declared.
    pub var_args: Option<String>,
    /// Keyword-only parameters (after `*` or `*args`).
    pub kw_only: Vec<Param>,
    /// `**kwargs` name, if declared.
    pub var_kwargs: Option<String>,
}

impl Params {
    /// Declared formal parameter names in order, excluding `*args`/`**kwargs`.
    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.pos.iter().chain(self.kw_only.iter()).map(|p| p.name.as_str())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Param {
    pub name: String,
    pub default: Option<ExprLoc>,
    /// The annotation's name when it is a plain identifier; retained for the
    /// request dispatcher's body-model hook. Other annotation shapes are
    /// parsed and discarded.
    pub annotation: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Literal {
    None,
    Bool(bool),
    Int(BigInt),
    Float(f64),
    Str(Rc<str>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    MatMul,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    /// Source spelling, used in TypeError messages.
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::MatMul => "@",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::Shl => "<<",
            Self::Shr => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Pos,
    Invert,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Is => "is",
            Self::IsNot => "is not",
        }
    }
}

/// One argument at a call site.
#[derive(Debug, Clone)]
pub(crate) enum CallArg {
    Pos(ExprLoc),
    Star(ExprLoc),
    Kw(String, ExprLoc),
    DoubleStar(ExprLoc),
}

/// One entry of a dict display.
#[derive(Debug, Clone)]
pub(crate) enum DictItem {
    Pair(ExprLoc, ExprLoc),
    DoubleStar(ExprLoc),
}

/// One `for` or `if` clause of a comprehension.
#[derive(Debug, Clone)]
pub(crate) enum CompClause {
    For { target: Target, iter: ExprLoc },
    If(ExprLoc),
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Lit(Literal),
    Var(String),
    /// Raw f-string template; split and sub-parsed on demand at evaluation.
    FString {
        template: String,
        raw: bool,
    },
    List(Vec<ExprLoc>),
    Tuple(Vec<ExprLoc>),
    Set(Vec<ExprLoc>),
    Dict(Vec<DictItem>),
    ListComp {
        elt: Box<ExprLoc>,
        clauses: Vec<CompClause>,
    },
    SetComp {
        elt: Box<ExprLoc>,
        clauses: Vec<CompClause>,
    },
    DictComp {
        key: Box<ExprLoc>,
        value: Box<ExprLoc>,
        clauses: Vec<CompClause>,
    },
    GenExp {
        elt: Box<ExprLoc>,
        clauses: Vec<CompClause>,
    },
    /// `then if cond else or_else`.
    Ternary {
        cond: Box<ExprLoc>,
        then: Box<ExprLoc>,
        or_else: Box<ExprLoc>,
    },
    /// Short-circuiting `and`/`or`; yields the last evaluated operand.
    BoolOp {
        is_or: bool,
        left: Box<ExprLoc>,
        right: Box<ExprLoc>,
    },
    /// `a < b < c` - preserves single evaluation and short-circuit semantics.
    Compare {
        first: Box<ExprLoc>,
        rest: Vec<(CmpOp, ExprLoc)>,
    },
    BinOp {
        op: BinOp,
        left: Box<ExprLoc>,
        right: Box<ExprLoc>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<ExprLoc>,
    },
    Call {
        func: Box<ExprLoc>,
        args: Vec<CallArg>,
    },
    GetAttr {
        obj: Box<ExprLoc>,
        attr: String,
    },
    Subscript {
        obj: Box<ExprLoc>,
        index: Box<ExprLoc>,
    },
    /// Slice descriptor; only valid directly under a subscript.
    Slice {
        start: Option<Box<ExprLoc>>,
        stop: Option<Box<ExprLoc>>,
        step: Option<Box<ExprLoc>>,
    },
    Lambda {
        params: Rc<Params>,
        body: Rc<ExprLoc>,
    },
    Yield(Option<Box<ExprLoc>>),
    YieldFrom(Box<ExprLoc>),
    /// `(name := value)`.
    Walrus {
        name: String,
        value: Box<ExprLoc>,
    },
    /// `*expr` - valid only where the parser placed it (call args handle
    /// their own star forms; this appears in display literals).
    Starred(Box<ExprLoc>),
}

impl Expr {
    /// The node-type name reported in internal errors.
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::Lit(_) => "lit",
            Self::Var(_) => "var",
            Self::FString { .. } => "fstring",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Set(_) => "set",
            Self::Dict(_) => "dict",
            Self::ListComp { .. } => "list_comp",
            Self::SetComp { .. } => "set_comp",
            Self::DictComp { .. } => "dict_comp",
            Self::GenExp { .. } => "gen_expr",
            Self::Ternary { .. } => "ternary",
            Self::BoolOp { .. } => "boolop",
            Self::Compare { .. } => "chained_compare",
            Self::BinOp { .. } => "binop",
            Self::UnaryOp { .. } => "unaryop",
            Self::Call { .. } => "call",
            Self::GetAttr { .. } => "getattr",
            Self::Subscript { .. } => "subscript",
            Self::Slice { .. } => "slice",
            Self::Lambda { .. } => "lambda",
            Self::Yield(_) => "yield",
            Self::YieldFrom(_) => "yield_from",
            Self::Walrus { .. } => "walrus",
            Self::Starred(_) => "star_arg",
        }
    }

    /// Whether this expression lexically contains a `yield`/`yield from`,
    /// without descending into nested function bodies.
    pub(crate) fn contains_yield(&self) -> bool {
        match self {
            Self::Yield(_) | Self::YieldFrom(_) => true,
            Self::Lit(_) | Self::Var(_) | Self::FString { .. } | Self::Lambda { .. } => false,
            Self::List(items) | Self::Tuple(items) | Self::Set(items) => {
                items.iter().any(|e| e.node.contains_yield())
            }
            Self::Dict(items) => items.iter().any(|item| match item {
                DictItem::Pair(k, v) => k.node.contains_yield() || v.node.contains_yield(),
                DictItem::DoubleStar(e) => e.node.contains_yield(),
            }),
            Self::ListComp { elt, clauses }
            | Self::SetComp { elt, clauses }
            | Self::GenExp { elt, clauses } => {
                elt.node.contains_yield() || clauses_contain_yield(clauses)
            }
            Self::DictComp { key, value, clauses } => {
                key.node.contains_yield() || value.node.contains_yield() || clauses_contain_yield(clauses)
            }
            Self::Ternary { cond, then, or_else } => {
                cond.node.contains_yield() || then.node.contains_yield() || or_else.node.contains_yield()
            }
            Self::BoolOp { left, right, .. } | Self::BinOp { left, right, .. } => {
                left.node.contains_yield() || right.node.contains_yield()
            }
            Self::Compare { first, rest } => {
                first.node.contains_yield() || rest.iter().any(|(_, e)| e.node.contains_yield())
            }
            Self::UnaryOp { operand, .. } | Self::Starred(operand) => operand.node.contains_yield(),
            Self::Call { func, args } => {
                func.node.contains_yield()
                    || args.iter().any(|a| match a {
                        CallArg::Pos(e) | CallArg::Star(e) | CallArg::Kw(_, e) | CallArg::DoubleStar(e) => {
                            e.node.contains_yield()
                        }
                    })
            }
            Self::GetAttr { obj, .. } => obj.node.contains_yield(),
            Self::Subscript { obj, index } => obj.node.contains_yield() || index.node.contains_yield(),
            Self::Slice { start, stop, step } => [start, stop, step]
                .into_iter()
                .flatten()
                .any(|e| e.node.contains_yield()),
            Self::Walrus { value, .. } => value.node.contains_yield(),
        }
    }
}

fn clauses_contain_yield(clauses: &[CompClause]) -> bool {
    clauses.iter().any(|c| match c {
        CompClause::For { iter, .. } => iter.node.contains_yield(),
        CompClause::If(e) => e.node.contains_yield(),
    })
}

/// Whether a statement lexically contains a `yield`, without descending into
/// nested `def`/`lambda` bodies. Used to classify functions as generators.
pub(crate) fn stmt_contains_yield(stmt: &Stmt) -> bool {
    let expr_yields = |e: &ExprLoc| e.node.contains_yield();
    let block_yields = |b: &Block| b.iter().any(|s| stmt_contains_yield(&s.node));
    let opt_block_yields = |b: &Option<Block>| b.as_ref().is_some_and(block_yields);
    match stmt {
        Stmt::Expr(e) | Stmt::Return(Some(e)) | Stmt::Raise(Some(e)) => expr_yields(e),
        Stmt::Assign { value, .. } | Stmt::AugAssign { value, .. } => expr_yields(value),
        Stmt::AnnAssign { value, .. } => value.as_ref().is_some_and(expr_yields),
        Stmt::If { branches, or_else } => {
            branches.iter().any(|(c, b)| expr_yields(c) || b.iter().any(|s| stmt_contains_yield(&s.node)))
                || opt_block_yields(or_else)
        }
        Stmt::While { cond, body, or_else } => {
            expr_yields(cond) || block_yields(body) || opt_block_yields(or_else)
        }
        Stmt::For { iter, body, or_else, .. } => {
            expr_yields(iter) || block_yields(body) || opt_block_yields(or_else)
        }
        Stmt::Try {
            body,
            handlers,
            or_else,
            finally,
        } => {
            block_yields(body)
                || handlers.iter().any(|h| h.body.iter().any(|s| stmt_contains_yield(&s.node)))
                || opt_block_yields(or_else)
                || opt_block_yields(finally)
        }
        Stmt::With { expr, body, .. } => expr_yields(expr) || block_yields(body),
        Stmt::Assert { cond, msg } => expr_yields(cond) || msg.as_ref().is_some_and(expr_yields),
        Stmt::Match { subject, cases } => {
            expr_yields(subject)
                || cases.iter().any(|c| {
                    c.guard.as_ref().is_some_and(expr_yields) || c.body.iter().any(|s| stmt_contains_yield(&s.node))
                })
        }
        // Nested defs and classes own their yields.
        Stmt::Def(_) | Stmt::Class { .. } => false,
        _ => false,
    }
}
