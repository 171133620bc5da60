//! Expression trees for function bodies and initializers.
//!
//! Bodies are owned trees rather than arena nodes: they are small, copied
//! wholesale when a body moves between declarations, and rewritten with
//! the post-order [`Expr::rewrite`] walker.

use rustc_hash::FxHashMap;

use crate::decl::ValueParam;
use crate::ids::{ClassId, FieldId, FunctionId, GlobalId, PropertyId, ValueId};
use crate::ty::{TypeRef, TypeSubst};

#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Unit,
    Null,
    Bool(bool),
    Int(i64),
    Long(i64),
    Double(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Lt,
    /// Structural equality (`==`, dispatches to `equals` on objects).
    Eq,
    NotEq,
    /// Reference identity (`===`).
    Identical,
    NotIdentical,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Lt => "<",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Identical => "===",
            BinOp::NotIdentical => "!==",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

/// Operations provided by the runtime rather than by declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    /// `mutableMapOf()`, insertion ordered.
    MapOf,
    /// `map.put(key, value)`, returns the previous value or null.
    MapPut,
    /// `map[key]`, null when absent.
    MapGet,
    /// `lazy(producer)`.
    LazyOf,
    /// `lazy.value`: forces the computation at most once.
    LazyValue,
    /// Name of a callable or property reference.
    CallableName,
    ToString,
    HashCode,
    /// Three-way comparison of two comparable values.
    Compare,
    IdentityHashCode,
    /// `Any.toString()`: class name and identity.
    DefaultToString,
    /// `String.toIntOrNull()`.
    ParseInt,
    /// Numeric conversion to `Int`.
    ToInt,
}

impl Intrinsic {
    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::MapOf => "mutableMapOf",
            Intrinsic::MapPut => "put",
            Intrinsic::MapGet => "get",
            Intrinsic::LazyOf => "lazy",
            Intrinsic::LazyValue => "value",
            Intrinsic::CallableName => "name",
            Intrinsic::ToString => "toString",
            Intrinsic::HashCode => "hashCode",
            Intrinsic::Compare => "compareValues",
            Intrinsic::IdentityHashCode => "identityHashCode",
            Intrinsic::DefaultToString => "defaultToString",
            Intrinsic::ParseInt => "toIntOrNull",
            Intrinsic::ToInt => "toInt",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Intrinsic::MapOf => 0,
            Intrinsic::MapPut => 3,
            Intrinsic::MapGet | Intrinsic::Compare => 2,
            _ => 1,
        }
    }
}

/// An anonymous function value.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<ValueParam>,
    pub ret: TypeRef,
    pub body: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Const),
    /// Read of a receiver, parameter or local.
    Get(ValueId),
    /// Local declaration; only meaningful as a statement of a block.
    Let {
        local: ValueId,
        name: String,
        ty: TypeRef,
        value: Box<Expr>,
    },
    GetField {
        receiver: Box<Expr>,
        field: FieldId,
    },
    SetField {
        receiver: Box<Expr>,
        field: FieldId,
        value: Box<Expr>,
    },
    GetGlobal(GlobalId),
    /// Call of `function`. With a receiver the call is virtual: the
    /// implementation is chosen from the receiver's runtime class.
    Call {
        function: FunctionId,
        receiver: Option<Box<Expr>>,
        type_args: Vec<TypeRef>,
        args: Vec<Expr>,
    },
    New {
        class: ClassId,
        type_args: Vec<TypeRef>,
        args: Vec<Expr>,
    },
    /// Invocation of a function value.
    Invoke {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Lambda(Box<Lambda>),
    FunctionRef(FunctionId),
    PropertyRef(PropertyId),
    Intrinsic {
        op: Intrinsic,
        args: Vec<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    /// Statements evaluated in order; the value is that of the last one.
    Block(Vec<Expr>),
    Return(Box<Expr>),
    Throw(Box<Expr>),
    /// Unchecked cast, recorded for typing only.
    Cast {
        expr: Box<Expr>,
        ty: TypeRef,
    },
    Is {
        expr: Box<Expr>,
        class: ClassId,
    },
}

// ── Constructors ──────────────────────────────────────────────────────

impl Expr {
    pub fn unit() -> Expr {
        Expr::Const(Const::Unit)
    }

    pub fn null() -> Expr {
        Expr::Const(Const::Null)
    }

    pub fn bool(value: bool) -> Expr {
        Expr::Const(Const::Bool(value))
    }

    pub fn int(value: i64) -> Expr {
        Expr::Const(Const::Int(value))
    }

    pub fn long(value: i64) -> Expr {
        Expr::Const(Const::Long(value))
    }

    pub fn double(value: f64) -> Expr {
        Expr::Const(Const::Double(value))
    }

    pub fn str(value: impl Into<String>) -> Expr {
        Expr::Const(Const::Str(value.into()))
    }

    pub fn get(value: ValueId) -> Expr {
        Expr::Get(value)
    }

    pub fn let_(local: ValueId, name: impl Into<String>, ty: TypeRef, value: Expr) -> Expr {
        Expr::Let {
            local,
            name: name.into(),
            ty,
            value: Box::new(value),
        }
    }

    pub fn get_field(receiver: Expr, field: FieldId) -> Expr {
        Expr::GetField {
            receiver: Box::new(receiver),
            field,
        }
    }

    pub fn set_field(receiver: Expr, field: FieldId, value: Expr) -> Expr {
        Expr::SetField {
            receiver: Box::new(receiver),
            field,
            value: Box::new(value),
        }
    }

    /// Virtual call through `receiver`.
    pub fn member_call(function: FunctionId, receiver: Expr, args: Vec<Expr>) -> Expr {
        Expr::Call {
            function,
            receiver: Some(Box::new(receiver)),
            type_args: Vec::new(),
            args,
        }
    }

    /// Call of a function without a dispatch receiver.
    pub fn static_call(function: FunctionId, args: Vec<Expr>) -> Expr {
        Expr::Call {
            function,
            receiver: None,
            type_args: Vec::new(),
            args,
        }
    }

    /// Set the type arguments of a call or constructor call.
    pub fn with_type_args(mut self, types: Vec<TypeRef>) -> Expr {
        match &mut self {
            Expr::Call { type_args, .. } | Expr::New { type_args, .. } => *type_args = types,
            _ => {}
        }
        self
    }

    pub fn new_object(class: ClassId, args: Vec<Expr>) -> Expr {
        Expr::New {
            class,
            type_args: Vec::new(),
            args,
        }
    }

    pub fn invoke(callee: Expr, args: Vec<Expr>) -> Expr {
        Expr::Invoke {
            callee: Box::new(callee),
            args,
        }
    }

    pub fn lambda(params: Vec<ValueParam>, ret: TypeRef, body: Expr) -> Expr {
        Expr::Lambda(Box::new(Lambda { params, ret, body }))
    }

    pub fn intrinsic(op: Intrinsic, args: Vec<Expr>) -> Expr {
        Expr::Intrinsic { op, args }
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn not(expr: Expr) -> Expr {
        Expr::Not(Box::new(expr))
    }

    pub fn if_else(cond: Expr, then_branch: Expr, else_branch: Expr) -> Expr {
        Expr::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        }
    }

    pub fn block(stmts: Vec<Expr>) -> Expr {
        Expr::Block(stmts)
    }

    pub fn ret(value: Expr) -> Expr {
        Expr::Return(Box::new(value))
    }

    pub fn throw(message: impl Into<String>) -> Expr {
        Expr::Throw(Box::new(Expr::str(message)))
    }

    pub fn cast(expr: Expr, ty: TypeRef) -> Expr {
        Expr::Cast {
            expr: Box::new(expr),
            ty,
        }
    }

    pub fn is(expr: Expr, class: ClassId) -> Expr {
        Expr::Is {
            expr: Box::new(expr),
            class,
        }
    }
}

// ── Walkers ───────────────────────────────────────────────────────────

impl Expr {
    /// Direct sub-expressions, in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Const(_)
            | Expr::Get(_)
            | Expr::GetGlobal(_)
            | Expr::FunctionRef(_)
            | Expr::PropertyRef(_) => Vec::new(),
            Expr::Let { value, .. } => vec![&**value],
            Expr::GetField { receiver, .. } => vec![&**receiver],
            Expr::SetField {
                receiver, value, ..
            } => vec![&**receiver, &**value],
            Expr::Call { receiver, args, .. } => {
                let mut out: Vec<&Expr> = receiver.iter().map(|r| &**r).collect();
                out.extend(args.iter());
                out
            }
            Expr::New { args, .. } | Expr::Intrinsic { args, .. } | Expr::Block(args) => {
                args.iter().collect()
            }
            Expr::Invoke { callee, args } => {
                let mut out = vec![&**callee];
                out.extend(args.iter());
                out
            }
            Expr::Lambda(lambda) => vec![&lambda.body],
            Expr::Binary { lhs, rhs, .. } => vec![&**lhs, &**rhs],
            Expr::Not(e) | Expr::Return(e) | Expr::Throw(e) => vec![&**e],
            Expr::Cast { expr, .. } | Expr::Is { expr, .. } => vec![&**expr],
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => vec![&**cond, &**then_branch, &**else_branch],
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::Const(_)
            | Expr::Get(_)
            | Expr::GetGlobal(_)
            | Expr::FunctionRef(_)
            | Expr::PropertyRef(_) => Vec::new(),
            Expr::Let { value, .. } => vec![&mut **value],
            Expr::GetField { receiver, .. } => vec![&mut **receiver],
            Expr::SetField {
                receiver, value, ..
            } => vec![&mut **receiver, &mut **value],
            Expr::Call { receiver, args, .. } => {
                let mut out: Vec<&mut Expr> = receiver.iter_mut().map(|r| &mut **r).collect();
                out.extend(args.iter_mut());
                out
            }
            Expr::New { args, .. } | Expr::Intrinsic { args, .. } | Expr::Block(args) => {
                args.iter_mut().collect()
            }
            Expr::Invoke { callee, args } => {
                let mut out = vec![&mut **callee];
                out.extend(args.iter_mut());
                out
            }
            Expr::Lambda(lambda) => vec![&mut lambda.body],
            Expr::Binary { lhs, rhs, .. } => vec![&mut **lhs, &mut **rhs],
            Expr::Not(e) | Expr::Return(e) | Expr::Throw(e) => vec![&mut **e],
            Expr::Cast { expr, .. } | Expr::Is { expr, .. } => vec![&mut **expr],
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => vec![&mut **cond, &mut **then_branch, &mut **else_branch],
        }
    }

    /// Pre-order traversal.
    pub fn walk(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// Pre-order mutable traversal. `f` sees a node before its children.
    pub fn walk_mut(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        f(self);
        for child in self.children_mut() {
            child.walk_mut(f);
        }
    }

    /// First node in pre-order satisfying `pred`.
    pub fn find_first(&self, pred: &mut dyn FnMut(&Expr) -> bool) -> Option<&Expr> {
        if pred(self) {
            return Some(self);
        }
        for child in self.children() {
            if let Some(found) = child.find_first(pred) {
                return Some(found);
            }
        }
        None
    }

    /// Post-order rebuild: children are rewritten first, then `f` receives
    /// the node by value and returns its replacement. Nodes produced by `f`
    /// are not visited again.
    pub fn rewrite(&mut self, f: &mut dyn FnMut(Expr) -> Expr) {
        for child in self.children_mut() {
            child.rewrite(f);
        }
        let node = std::mem::replace(self, Expr::unit());
        *self = f(node);
    }

    pub fn uses_value(&self, value: ValueId) -> bool {
        self.find_first(&mut |e| matches!(e, Expr::Get(v) if *v == value))
            .is_some()
    }

    pub fn reads_field(&self, field: FieldId) -> bool {
        self.find_first(&mut |e| matches!(e, Expr::GetField { field: f, .. } if *f == field))
            .is_some()
    }

    /// Rename value ids, both uses and declarations.
    pub fn remap_values(&mut self, map: &FxHashMap<ValueId, ValueId>) {
        if map.is_empty() {
            return;
        }
        self.walk_mut(&mut |e| match e {
            Expr::Get(v) | Expr::Let { local: v, .. } => {
                if let Some(new) = map.get(v) {
                    *v = *new;
                }
            }
            Expr::Lambda(lambda) => {
                for p in &mut lambda.params {
                    if let Some(new) = map.get(&p.id) {
                        p.id = *new;
                    }
                }
            }
            _ => {}
        });
    }

    /// Apply a type substitution to every type mentioned in the tree.
    pub fn substitute_types(&mut self, subst: &TypeSubst) {
        if subst.is_empty() {
            return;
        }
        self.walk_mut(&mut |e| match e {
            Expr::Let { ty, .. } | Expr::Cast { ty, .. } => *ty = ty.substitute(subst),
            Expr::Call { type_args, .. } | Expr::New { type_args, .. } => {
                for t in type_args.iter_mut() {
                    *t = t.substitute(subst);
                }
            }
            Expr::Lambda(lambda) => {
                for p in &mut lambda.params {
                    p.ty = p.ty.substitute(subst);
                }
                lambda.ret = lambda.ret.substitute(subst);
            }
            _ => {}
        });
    }
}
