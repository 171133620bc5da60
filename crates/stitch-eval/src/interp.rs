//! Tree-walking evaluation of a declaration tree.
//!
//! Calls with a receiver dispatch on the receiver's runtime class through
//! the override relation. Objects are built superclass first, then the
//! class's own field initialisers run in member order.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use stitch_ir::{
    BinOp, ClassId, ClassKind, Const, Expr, FunctionId, GlobalId, Intrinsic, Tree, ValueParam,
};

use crate::error::EvalError;
use crate::value::{format_double, Closure, Env, LazyCell, LazyState, Object, Value};

/// Non-local exits while evaluating a body.
enum Control {
    Return(Value),
    Error(EvalError),
}

impl From<EvalError> for Control {
    fn from(e: EvalError) -> Self {
        Control::Error(e)
    }
}

type Flow<T> = Result<T, Control>;

fn finish(flow: Flow<Value>) -> Result<Value, EvalError> {
    match flow {
        Ok(v) | Err(Control::Return(v)) => Ok(v),
        Err(Control::Error(e)) => Err(e),
    }
}

pub struct Interpreter<'t> {
    tree: &'t Tree,
    globals: FxHashMap<GlobalId, Value>,
}

impl<'t> Interpreter<'t> {
    pub fn new(tree: &'t Tree) -> Self {
        Self {
            tree,
            globals: FxHashMap::default(),
        }
    }

    // ── Public API ────────────────────────────────────────────────────

    /// Construct an instance of `class` with constructor arguments.
    pub fn instantiate(&mut self, class: ClassId, args: Vec<Value>) -> Result<Value, EvalError> {
        let object = Rc::new(Object {
            class,
            class_name: self.tree.class(class).name.clone(),
            fields: RefCell::new(FxHashMap::default()),
        });
        let value = Value::Object(object);
        self.construct(class, &value, args).map_err(|c| match c {
            Control::Error(e) => e,
            Control::Return(_) => EvalError::Thrown("return from constructor".into()),
        })?;
        Ok(value)
    }

    /// Call the member function `name` on `receiver`.
    pub fn call(
        &mut self,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, EvalError> {
        let object = receiver
            .as_object()
            .ok_or_else(|| EvalError::NullReceiver(name.to_string()))?;
        let target = self.find_member(object.class, name, args.len())?;
        self.invoke_virtual(target, receiver.clone(), args)
    }

    /// Read the property `name` of `receiver` through its getter.
    pub fn get(&mut self, receiver: &Value, name: &str) -> Result<Value, EvalError> {
        let getter = self.accessor(receiver, name, false)?;
        self.invoke_virtual(getter, receiver.clone(), Vec::new())
    }

    /// Write the property `name` of `receiver` through its setter.
    pub fn set(&mut self, receiver: &Value, name: &str, value: Value) -> Result<(), EvalError> {
        let setter = self.accessor(receiver, name, true)?;
        self.invoke_virtual(setter, receiver.clone(), vec![value])?;
        Ok(())
    }

    /// Call a top-level function.
    pub fn call_static(
        &mut self,
        function: FunctionId,
        args: Vec<Value>,
    ) -> Result<Value, EvalError> {
        self.call_function(function, None, args)
    }

    pub fn to_display_string(&mut self, value: &Value) -> Result<String, EvalError> {
        match self.stringify(value) {
            Ok(s) => Ok(s),
            Err(Control::Return(v)) => Ok(format!("{v:?}")),
            Err(Control::Error(e)) => Err(e),
        }
    }

    // ── Lookup ────────────────────────────────────────────────────────

    fn find_member(
        &self,
        class: ClassId,
        name: &str,
        arity: usize,
    ) -> Result<FunctionId, EvalError> {
        let tree = self.tree;
        let mut candidates = Vec::new();
        for ty in tree.supertype_closure(&tree.this_type(class)) {
            if let Some(c) = ty.class_id() {
                candidates.extend(tree.functions_named(c, name));
            }
        }
        let exact = candidates
            .iter()
            .copied()
            .find(|f| tree.function(*f).params.len() == arity);
        let with_defaults = candidates.iter().copied().find(|f| {
            let params = &tree.function(*f).params;
            params.len() > arity && (arity..params.len()).all(|i| self.default_arg(*f, i).is_some())
        });
        exact.or(with_defaults).ok_or_else(|| EvalError::UnknownMember {
            class: tree.class(class).name.clone(),
            name: name.to_string(),
            arity,
        })
    }

    fn accessor(
        &self,
        receiver: &Value,
        name: &str,
        setter: bool,
    ) -> Result<FunctionId, EvalError> {
        let tree = self.tree;
        let object = receiver
            .as_object()
            .ok_or_else(|| EvalError::NullReceiver(name.to_string()))?;
        for ty in tree.supertype_closure(&tree.this_type(object.class)) {
            let Some(class) = ty.class_id() else {
                continue;
            };
            if let Some(property) = tree.property_named(class, name) {
                let decl = tree.property(property);
                let accessor = if setter { decl.setter } else { decl.getter };
                if let Some(f) = accessor {
                    return Ok(f);
                }
            }
        }
        Err(EvalError::UnknownMember {
            class: object.class_name.clone(),
            name: name.to_string(),
            arity: usize::from(setter),
        })
    }

    /// Default value expression for parameter `index`, inherited through
    /// overridden functions.
    fn default_arg(&self, function: FunctionId, index: usize) -> Option<&'t Expr> {
        let tree = self.tree;
        let decl = tree.function(function);
        if let Some(default) = decl.params.get(index).and_then(|p| p.default.as_ref()) {
            return Some(default);
        }
        decl.overridden
            .iter()
            .find_map(|f| self.default_arg(*f, index))
    }

    // ── Calls ─────────────────────────────────────────────────────────

    fn invoke_virtual(
        &mut self,
        target: FunctionId,
        receiver: Value,
        args: Vec<Value>,
    ) -> Result<Value, EvalError> {
        let tree = self.tree;
        let object = match &receiver {
            Value::Object(o) => o.clone(),
            Value::Null => return Err(EvalError::NullReceiver(tree.function(target).name.clone())),
            _ => return finish(self.builtin_member(target, &receiver, &args)),
        };
        let implementation = tree
            .resolve_dispatch(object.class, target)
            .ok_or_else(|| EvalError::Abstract(tree.function_fq_name(target)))?;
        self.call_function(implementation, Some(receiver), args)
    }

    /// `Any` members called on primitive receivers.
    fn builtin_member(
        &mut self,
        target: FunctionId,
        receiver: &Value,
        args: &[Value],
    ) -> Flow<Value> {
        let tree = self.tree;
        match tree.function(target).name.as_str() {
            "toString" => Ok(Value::str(&self.stringify(receiver)?)),
            "hashCode" => Ok(Value::Int(self.hash(receiver)?)),
            "equals" => match args.first() {
                Some(other) => Ok(Value::Bool(self.equals(receiver, other)?)),
                None => Err(EvalError::MissingArgument {
                    function: "equals".into(),
                    param: "other".into(),
                }
                .into()),
            },
            other => Err(EvalError::UnknownMember {
                class: receiver.kind().into(),
                name: other.into(),
                arity: args.len(),
            }
            .into()),
        }
    }

    fn call_function(
        &mut self,
        function: FunctionId,
        receiver: Option<Value>,
        args: Vec<Value>,
    ) -> Result<Value, EvalError> {
        let tree = self.tree;
        let decl = tree.function(function);
        let Some(body) = decl.body.as_ref() else {
            return Err(EvalError::Abstract(tree.function_fq_name(function)));
        };
        let mut env = Env::default();
        if let (Some(this), Some(receiver)) = (decl.dispatch_receiver, receiver) {
            env.insert(this, receiver);
        }
        finish(self.bind_params(function, &decl.params, args, &mut env))?;
        finish(self.eval(body, &mut env))
    }

    fn bind_params(
        &mut self,
        function: FunctionId,
        params: &[ValueParam],
        args: Vec<Value>,
        env: &mut Env,
    ) -> Flow<Value> {
        let mut args = args.into_iter();
        for (index, param) in params.iter().enumerate() {
            let value = match args.next() {
                Some(v) => v,
                None => match self.default_arg(function, index) {
                    Some(default) => self.eval(default, env)?,
                    None => {
                        return Err(EvalError::MissingArgument {
                            function: self.tree.function(function).name.clone(),
                            param: param.name.clone(),
                        }
                        .into())
                    }
                },
            };
            env.insert(param.id, value);
        }
        Ok(Value::Unit)
    }

    /// Run the constructor chain of `class` on `this`.
    fn construct(&mut self, class: ClassId, this: &Value, args: Vec<Value>) -> Flow<()> {
        let tree = self.tree;
        let decl = tree.class(class);
        let mut env = Env::default();
        env.insert(decl.this_receiver, this.clone());

        let mut args = args.into_iter();
        if let Some(ctor) = &decl.constructor {
            for param in &ctor.params {
                let value = match args.next() {
                    Some(v) => v,
                    None => match &param.default {
                        Some(default) => self.eval(default, &mut env)?,
                        None => {
                            return Err(EvalError::MissingArgument {
                                function: decl.name.clone(),
                                param: param.name.clone(),
                            }
                            .into())
                        }
                    },
                };
                env.insert(param.id, value);
            }
            match &ctor.super_call {
                Some(call) => {
                    let mut super_args = Vec::with_capacity(call.args.len());
                    for arg in &call.args {
                        super_args.push(self.eval(arg, &mut env)?);
                    }
                    self.construct(call.class, this, super_args)?;
                }
                None => {
                    let superclass = decl.supertypes.iter().filter_map(|t| t.class_id()).find(|c| {
                        tree.class(*c).kind == ClassKind::Class && *c != tree.any_class()
                    });
                    if let Some(superclass) = superclass {
                        self.construct(superclass, this, Vec::new())?;
                    }
                }
            }
        }

        let Value::Object(object) = this else {
            return Ok(());
        };
        for field in tree.storage_fields(class) {
            if let Some(init) = &tree.field(field).initializer {
                let value = self.eval(init, &mut env)?;
                object.fields.borrow_mut().insert(field, value);
            }
        }
        Ok(())
    }

    fn invoke_closure(&mut self, callee: &Value, args: Vec<Value>) -> Flow<Value> {
        let Value::Closure(closure) = callee else {
            return Err(EvalError::TypeMismatch {
                expected: "function",
                found: callee.kind().into(),
            }
            .into());
        };
        let mut env = closure.env.clone();
        for (param, arg) in closure.params.iter().zip(args) {
            env.insert(*param, arg);
        }
        let body = closure.body.clone();
        match self.eval(&body, &mut env) {
            Ok(v) | Err(Control::Return(v)) => Ok(v),
            Err(e) => Err(e),
        }
    }

    // ── Expressions ───────────────────────────────────────────────────

    fn eval_all(&mut self, exprs: &[Expr], env: &mut Env) -> Flow<Vec<Value>> {
        let mut out = Vec::with_capacity(exprs.len());
        for e in exprs {
            out.push(self.eval(e, env)?);
        }
        Ok(out)
    }

    fn eval(&mut self, expr: &Expr, env: &mut Env) -> Flow<Value> {
        let tree = self.tree;
        match expr {
            Expr::Const(c) => Ok(match c {
                Const::Unit => Value::Unit,
                Const::Null => Value::Null,
                Const::Bool(b) => Value::Bool(*b),
                Const::Int(i) => Value::Int(*i),
                Const::Long(i) => Value::Long(*i),
                Const::Double(d) => Value::Double(*d),
                Const::Str(s) => Value::str(s),
            }),
            Expr::Get(v) => Ok(env.get(v).cloned().unwrap_or(Value::Null)),
            Expr::Let { local, value, .. } => {
                let value = self.eval(value, env)?;
                env.insert(*local, value);
                Ok(Value::Unit)
            }
            Expr::GetField { receiver, field } => {
                let receiver = self.eval(receiver, env)?;
                match receiver {
                    Value::Object(o) => Ok(o.field(*field).unwrap_or(Value::Null)),
                    other => Err(self.not_an_object(&other, &tree.field(*field).name)),
                }
            }
            Expr::SetField {
                receiver,
                field,
                value,
            } => {
                let receiver = self.eval(receiver, env)?;
                let value = self.eval(value, env)?;
                match receiver {
                    Value::Object(o) => {
                        o.fields.borrow_mut().insert(*field, value);
                        Ok(Value::Unit)
                    }
                    other => Err(self.not_an_object(&other, &tree.field(*field).name)),
                }
            }
            Expr::GetGlobal(g) => {
                if let Some(v) = self.globals.get(g) {
                    return Ok(v.clone());
                }
                let init = &tree.global(*g).initializer;
                let value = self.eval(init, &mut Env::default())?;
                self.globals.insert(*g, value.clone());
                Ok(value)
            }
            Expr::Call {
                function,
                receiver,
                args,
                ..
            } => {
                let receiver = match receiver {
                    Some(r) => Some(self.eval(r, env)?),
                    None => None,
                };
                let args = self.eval_all(args, env)?;
                let result = match receiver {
                    Some(r) => self.invoke_virtual(*function, r, args),
                    None => self.call_function(*function, None, args),
                };
                result.map_err(Control::Error)
            }
            Expr::New { class, args, .. } => {
                let args = self.eval_all(args, env)?;
                self.instantiate(*class, args).map_err(Control::Error)
            }
            Expr::Invoke { callee, args } => {
                let callee = self.eval(callee, env)?;
                let args = self.eval_all(args, env)?;
                self.invoke_closure(&callee, args)
            }
            Expr::Lambda(lambda) => Ok(Value::Closure(Rc::new(Closure {
                params: lambda.params.iter().map(|p| p.id).collect(),
                body: lambda.body.clone(),
                env: env.clone(),
            }))),
            Expr::FunctionRef(f) => Ok(Value::FunctionRef(*f)),
            Expr::PropertyRef(p) => Ok(Value::PropertyRef(*p)),
            Expr::Intrinsic { op, args } => {
                let args = self.eval_all(args, env)?;
                self.intrinsic(*op, args)
            }
            Expr::Binary { op, lhs, rhs } => match op {
                BinOp::And | BinOp::Or => {
                    let lhs = self.eval(lhs, env)?;
                    let lhs = self.truthy(lhs)?;
                    if lhs == (*op == BinOp::Or) {
                        return Ok(Value::Bool(lhs));
                    }
                    let rhs = self.eval(rhs, env)?;
                    Ok(Value::Bool(self.truthy(rhs)?))
                }
                _ => {
                    let lhs = self.eval(lhs, env)?;
                    let rhs = self.eval(rhs, env)?;
                    self.binary(*op, lhs, rhs)
                }
            },
            Expr::Not(e) => {
                let v = self.eval(e, env)?;
                Ok(Value::Bool(!self.truthy(v)?))
            }
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.eval(cond, env)?;
                if self.truthy(cond)? {
                    self.eval(then_branch, env)
                } else {
                    self.eval(else_branch, env)
                }
            }
            Expr::Block(stmts) => {
                let mut last = Value::Unit;
                for stmt in stmts {
                    last = self.eval(stmt, env)?;
                }
                Ok(last)
            }
            Expr::Return(e) => {
                let v = self.eval(e, env)?;
                Err(Control::Return(v))
            }
            Expr::Throw(e) => {
                let v = self.eval(e, env)?;
                let message = self.stringify(&v)?;
                Err(EvalError::Thrown(message).into())
            }
            Expr::Cast { expr, .. } => self.eval(expr, env),
            Expr::Is { expr, class } => {
                let v = self.eval(expr, env)?;
                Ok(Value::Bool(match v {
                    Value::Object(o) => tree.is_subclass(o.class, *class),
                    _ => false,
                }))
            }
        }
    }

    fn not_an_object(&self, value: &Value, member: &str) -> Control {
        match value {
            Value::Null => EvalError::NullReceiver(member.to_string()).into(),
            other => EvalError::TypeMismatch {
                expected: "object",
                found: other.kind().into(),
            }
            .into(),
        }
    }

    fn truthy(&self, value: Value) -> Flow<bool> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError::TypeMismatch {
                expected: "Boolean",
                found: other.kind().into(),
            }
            .into()),
        }
    }

    fn binary(&mut self, op: BinOp, lhs: Value, rhs: Value) -> Flow<Value> {
        use Value::{Double, Int, Long};
        let mismatch = |lhs: &Value, rhs: &Value| -> Control {
            EvalError::TypeMismatch {
                expected: "numbers",
                found: format!("{} {} {}", lhs.kind(), op.symbol(), rhs.kind()),
            }
            .into()
        };
        match op {
            BinOp::Eq => Ok(Value::Bool(self.equals(&lhs, &rhs)?)),
            BinOp::NotEq => Ok(Value::Bool(!self.equals(&lhs, &rhs)?)),
            BinOp::Identical => Ok(Value::Bool(lhs.identical(&rhs))),
            BinOp::NotIdentical => Ok(Value::Bool(!lhs.identical(&rhs))),
            BinOp::Add if matches!(lhs, Value::Str(_)) => {
                let rhs = self.stringify(&rhs)?;
                let lhs = self.stringify(&lhs)?;
                Ok(Value::str(&(lhs + &rhs)))
            }
            BinOp::Lt => match (&lhs, &rhs) {
                (Int(a) | Long(a), Int(b) | Long(b)) => Ok(Value::Bool(a < b)),
                (Double(a), Double(b)) => Ok(Value::Bool(a < b)),
                (Value::Str(a), Value::Str(b)) => Ok(Value::Bool(a < b)),
                _ => Err(mismatch(&lhs, &rhs)),
            },
            BinOp::Add | BinOp::Sub | BinOp::Mul => {
                let int = |a: i64, b: i64| match op {
                    BinOp::Add => a.wrapping_add(b),
                    BinOp::Sub => a.wrapping_sub(b),
                    _ => a.wrapping_mul(b),
                };
                let float = |a: f64, b: f64| match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    _ => a * b,
                };
                match (&lhs, &rhs) {
                    (Int(a), Int(b)) => Ok(Int(int(*a, *b))),
                    (Int(a) | Long(a), Int(b) | Long(b)) => Ok(Long(int(*a, *b))),
                    (Double(a), Double(b)) => Ok(Double(float(*a, *b))),
                    (Double(a), Int(b) | Long(b)) => Ok(Double(float(*a, *b as f64))),
                    (Int(a) | Long(a), Double(b)) => Ok(Double(float(*a as f64, *b))),
                    _ => Err(mismatch(&lhs, &rhs)),
                }
            }
            BinOp::And | BinOp::Or => {
                let a = self.truthy(lhs)?;
                let b = self.truthy(rhs)?;
                Ok(Value::Bool(if op == BinOp::And { a && b } else { a || b }))
            }
        }
    }

    fn any_member(&self, name: &str) -> Option<FunctionId> {
        self.tree
            .functions_named(self.tree.any_class(), name)
            .into_iter()
            .next()
    }

    /// Structural equality: `equals` on objects, value equality otherwise.
    fn equals(&mut self, lhs: &Value, rhs: &Value) -> Flow<bool> {
        match (lhs, rhs) {
            (Value::Object(_), _) => {
                let Some(equals) = self.any_member("equals") else {
                    return Ok(lhs.identical(rhs));
                };
                let v = self.invoke_virtual(equals, lhs.clone(), vec![rhs.clone()])?;
                self.truthy(v)
            }
            (Value::Map(a), Value::Map(b)) => {
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                if a.len() != b.len() {
                    return Ok(false);
                }
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    if !self.equals(ka, kb)? || !self.equals(va, vb)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(lhs.identical(rhs)),
        }
    }

    fn hash(&mut self, value: &Value) -> Flow<i64> {
        Ok(match value {
            Value::Object(_) => {
                let Some(hash_code) = self.any_member("hashCode") else {
                    return Ok(identity_hash(value));
                };
                let v = self.invoke_virtual(hash_code, value.clone(), Vec::new())?;
                v.as_int().unwrap_or(0)
            }
            Value::Unit | Value::Null => 0,
            Value::Bool(b) => i64::from(*b),
            Value::Int(i) | Value::Long(i) => *i,
            Value::Double(d) => (d.to_bits() ^ (d.to_bits() >> 32)) as i32 as i64,
            Value::Str(s) => s
                .chars()
                .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
                as i64,
            _ => identity_hash(value),
        })
    }

    fn stringify(&mut self, value: &Value) -> Flow<String> {
        Ok(match value {
            Value::Unit => "kotlin.Unit".into(),
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) | Value::Long(i) => i.to_string(),
            Value::Double(d) => format_double(*d),
            Value::Str(s) => s.to_string(),
            Value::Object(_) => {
                let Some(to_string) = self.any_member("toString") else {
                    return Ok(format!("{value:?}"));
                };
                match self.invoke_virtual(to_string, value.clone(), Vec::new())? {
                    Value::Str(s) => s.to_string(),
                    other => format!("{other:?}"),
                }
            }
            Value::FunctionRef(f) => format!("fun {}", self.tree.function(*f).name),
            Value::PropertyRef(p) => format!("property {}", self.tree.property(*p).name),
            other => format!("{other:?}"),
        })
    }

    fn intrinsic(&mut self, op: Intrinsic, args: Vec<Value>) -> Flow<Value> {
        if args.len() != op.arity() {
            return Err(EvalError::TypeMismatch {
                expected: "intrinsic arguments",
                found: format!("{} argument(s) to {}", args.len(), op.name()),
            }
            .into());
        }
        let mut args = args.into_iter();
        let mut next = || args.next().unwrap_or(Value::Null);
        match op {
            Intrinsic::MapOf => Ok(Value::Map(Rc::new(RefCell::new(Vec::new())))),
            Intrinsic::MapPut => {
                let (map, key, value) = (next(), next(), next());
                let Value::Map(map) = map else {
                    return Err(type_mismatch("Map", &map));
                };
                let mut entries = map.borrow_mut();
                match entries.iter_mut().find(|(k, _)| k.identical(&key)) {
                    Some((_, slot)) => Ok(std::mem::replace(slot, value)),
                    None => {
                        entries.push((key, value));
                        Ok(Value::Null)
                    }
                }
            }
            Intrinsic::MapGet => {
                let (map, key) = (next(), next());
                let Value::Map(map) = map else {
                    return Err(type_mismatch("Map", &map));
                };
                let entries = map.borrow();
                Ok(entries
                    .iter()
                    .find(|(k, _)| k.identical(&key))
                    .map(|(_, v)| v.clone())
                    .unwrap_or(Value::Null))
            }
            Intrinsic::LazyOf => Ok(Value::Lazy(Rc::new(LazyCell::new(next())))),
            Intrinsic::LazyValue => {
                let lazy = next();
                let Value::Lazy(cell) = lazy else {
                    return Err(type_mismatch("Lazy", &lazy));
                };
                self.force(&cell)
            }
            Intrinsic::CallableName => {
                let reference = next();
                match reference {
                    Value::FunctionRef(f) => Ok(Value::str(&self.tree.function(f).name)),
                    Value::PropertyRef(p) => Ok(Value::str(&self.tree.property(p).name)),
                    other => Err(type_mismatch("callable reference", &other)),
                }
            }
            Intrinsic::ToString => {
                let v = next();
                Ok(Value::str(&self.stringify(&v)?))
            }
            Intrinsic::HashCode => {
                let v = next();
                Ok(Value::Int(self.hash(&v)?))
            }
            Intrinsic::Compare => {
                let (a, b) = (next(), next());
                let ordering = match (&a, &b) {
                    (Value::Int(x) | Value::Long(x), Value::Int(y) | Value::Long(y)) => x.cmp(y),
                    (Value::Str(x), Value::Str(y)) => x.cmp(y),
                    (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
                    (Value::Double(x), Value::Double(y)) => x.total_cmp(y),
                    (Value::Null, Value::Null) => std::cmp::Ordering::Equal,
                    (Value::Null, _) => std::cmp::Ordering::Less,
                    (_, Value::Null) => std::cmp::Ordering::Greater,
                    _ => return Err(type_mismatch("comparable values", &a)),
                };
                Ok(Value::Int(ordering as i64))
            }
            Intrinsic::IdentityHashCode => Ok(Value::Int(identity_hash(&next()))),
            Intrinsic::DefaultToString => {
                let v = next();
                match &v {
                    Value::Object(o) => Ok(Value::str(&format!(
                        "{}@{:x}",
                        o.class_name,
                        identity_hash(&v)
                    ))),
                    other => Ok(Value::str(&self.stringify(other)?)),
                }
            }
            Intrinsic::ParseInt => match next() {
                Value::Str(s) => Ok(s.parse::<i64>().map(Value::Int).unwrap_or(Value::Null)),
                other => Err(type_mismatch("String", &other)),
            },
            Intrinsic::ToInt => match next() {
                Value::Int(i) | Value::Long(i) => Ok(Value::Int(i)),
                Value::Double(d) => Ok(Value::Int(d.trunc() as i64)),
                other => Err(type_mismatch("number", &other)),
            },
        }
    }

    /// Evaluate a lazy cell at most once.
    fn force(&mut self, cell: &Rc<LazyCell>) -> Flow<Value> {
        let pending = {
            let mut state = cell.state.borrow_mut();
            match std::mem::replace(&mut *state, LazyState::Evaluating) {
                LazyState::Evaluated(v) => {
                    *state = LazyState::Evaluated(v.clone());
                    return Ok(v);
                }
                LazyState::Evaluating => return Err(EvalError::RecursiveLazy.into()),
                LazyState::Unevaluated(producer) => producer,
            }
        };
        match self.invoke_closure(&pending, Vec::new()) {
            Ok(v) => {
                *cell.state.borrow_mut() = LazyState::Evaluated(v.clone());
                Ok(v)
            }
            Err(e) => {
                *cell.state.borrow_mut() = LazyState::Unevaluated(pending);
                Err(e)
            }
        }
    }
}

fn type_mismatch(expected: &'static str, found: &Value) -> Control {
    EvalError::TypeMismatch {
        expected,
        found: found.kind().into(),
    }
    .into()
}

fn identity_hash(value: &Value) -> i64 {
    let ptr = match value {
        Value::Object(o) => Rc::as_ptr(o) as *const u8 as usize,
        Value::Closure(c) => Rc::as_ptr(c) as *const u8 as usize,
        Value::Map(m) => Rc::as_ptr(m) as *const u8 as usize,
        Value::Lazy(l) => Rc::as_ptr(l) as *const u8 as usize,
        _ => 0,
    };
    (ptr as i64 >> 3) & 0x7fff_ffff
}
