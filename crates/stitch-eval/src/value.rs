//! Runtime values.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use stitch_ir::{ClassId, Expr, FieldId, FunctionId, PropertyId, ValueId};

/// Bindings of receivers, parameters and locals.
pub type Env = FxHashMap<ValueId, Value>;

#[derive(Clone)]
pub enum Value {
    Unit,
    Null,
    Bool(bool),
    Int(i64),
    Long(i64),
    Double(f64),
    Str(Rc<str>),
    Object(Rc<Object>),
    Closure(Rc<Closure>),
    /// Insertion-ordered map.
    Map(Rc<RefCell<Vec<(Value, Value)>>>),
    Lazy(Rc<LazyCell>),
    FunctionRef(FunctionId),
    PropertyRef(PropertyId),
}

pub struct Object {
    pub class: ClassId,
    pub class_name: String,
    pub(crate) fields: RefCell<FxHashMap<FieldId, Value>>,
}

impl Object {
    pub fn field(&self, field: FieldId) -> Option<Value> {
        self.fields.borrow().get(&field).cloned()
    }
}

pub struct Closure {
    pub(crate) params: Vec<ValueId>,
    pub(crate) body: Expr,
    pub(crate) env: Env,
}

/// At-most-once computation.
pub struct LazyCell {
    pub(crate) state: RefCell<LazyState>,
}

pub enum LazyState {
    Unevaluated(Value),
    Evaluating,
    Evaluated(Value),
}

impl LazyCell {
    pub fn new(producer: Value) -> LazyCell {
        LazyCell {
            state: RefCell::new(LazyState::Unevaluated(producer)),
        }
    }

    pub fn is_evaluated(&self) -> bool {
        matches!(*self.state.borrow(), LazyState::Evaluated(_))
    }
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Unit => "Unit",
            Value::Null => "null",
            Value::Bool(_) => "Boolean",
            Value::Int(_) => "Int",
            Value::Long(_) => "Long",
            Value::Double(_) => "Double",
            Value::Str(_) => "String",
            Value::Object(_) => "object",
            Value::Closure(_) => "function",
            Value::Map(_) => "Map",
            Value::Lazy(_) => "Lazy",
            Value::FunctionRef(_) => "KFunction",
            Value::PropertyRef(_) => "KProperty",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) | Value::Long(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Rc<Object>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Reference identity (`===`); primitives compare by value.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) | (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            (Value::Lazy(a), Value::Lazy(b)) => Rc::ptr_eq(a, b),
            (Value::FunctionRef(a), Value::FunctionRef(b)) => a == b,
            (Value::PropertyRef(a), Value::PropertyRef(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "Unit"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Long(i) => write!(f, "{i}L"),
            Value::Double(d) => write!(f, "{d:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Object(o) => write!(f, "{}@{:p}", o.class_name, Rc::as_ptr(o)),
            Value::Closure(_) => write!(f, "<closure>"),
            Value::Map(m) => f
                .debug_map()
                .entries(m.borrow().iter().map(|(k, v)| (k.clone(), v.clone())))
                .finish(),
            Value::Lazy(l) => match &*l.state.borrow() {
                LazyState::Evaluated(v) => write!(f, "Lazy({v:?})"),
                _ => write!(f, "Lazy(<pending>)"),
            },
            Value::FunctionRef(id) => write!(f, "::{id}"),
            Value::PropertyRef(id) => write!(f, "::{id}"),
        }
    }
}

/// Kotlin-style rendering of primitive values.
pub fn format_double(d: f64) -> String {
    if d.is_finite() && d.fract() == 0.0 {
        format!("{d:.1}")
    } else {
        format!("{d}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_of_primitives_and_references() {
        assert!(Value::Int(3).identical(&Value::Int(3)));
        assert!(!Value::Int(3).identical(&Value::Long(3)));
        assert!(Value::str("a").identical(&Value::str("a")));
        let map = Value::Map(Rc::new(RefCell::new(Vec::new())));
        assert!(map.identical(&map.clone()));
        assert!(!map.identical(&Value::Map(Rc::new(RefCell::new(Vec::new())))));
    }

    #[test]
    fn test_format_double() {
        assert_eq!(format_double(3.0), "3.0");
        assert_eq!(format_double(3.14), "3.14");
    }
}
