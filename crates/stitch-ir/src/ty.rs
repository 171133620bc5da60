//! Type references.
//!
//! Types are nominal: a class type names its [`ClassId`] and carries its
//! type arguments. The handful of library shapes the rewriter has to build
//! (`Lazy<T>`, `Map<K, V>`, callable and property references) are builtin
//! variants so that no library declarations need to exist in the tree.

use rustc_hash::FxHashMap;

use crate::ids::{ClassId, TypeParamId};

/// Mapping from type parameters to the arguments that replace them.
pub type TypeSubst = FxHashMap<TypeParamId, TypeRef>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Any,
    NullableAny,
    Unit,
    /// Bottom type; the type of `throw`.
    Nothing,
    Bool,
    Int,
    Long,
    Double,
    String,
    Class { class: ClassId, args: Vec<TypeRef> },
    Param(TypeParamId),
    Function { params: Vec<TypeRef>, ret: Box<TypeRef> },
    /// Deferred computation of `T`.
    Lazy(Box<TypeRef>),
    Map(Box<TypeRef>, Box<TypeRef>),
    /// Reference to a callable member producing `T`.
    Callable(Box<TypeRef>),
    /// Reference to a property of type `T`.
    Property(Box<TypeRef>),
}

impl TypeRef {
    pub fn class(class: ClassId) -> TypeRef {
        TypeRef::Class {
            class,
            args: Vec::new(),
        }
    }

    pub fn generic(class: ClassId, args: Vec<TypeRef>) -> TypeRef {
        TypeRef::Class { class, args }
    }

    pub fn function(params: Vec<TypeRef>, ret: TypeRef) -> TypeRef {
        TypeRef::Function {
            params,
            ret: Box::new(ret),
        }
    }

    pub fn lazy(inner: TypeRef) -> TypeRef {
        TypeRef::Lazy(Box::new(inner))
    }

    pub fn map(key: TypeRef, value: TypeRef) -> TypeRef {
        TypeRef::Map(Box::new(key), Box::new(value))
    }

    pub fn callable(ret: TypeRef) -> TypeRef {
        TypeRef::Callable(Box::new(ret))
    }

    pub fn property(ty: TypeRef) -> TypeRef {
        TypeRef::Property(Box::new(ty))
    }

    /// `Map<String, Any?>`, the argument map handed to `callMember`.
    pub fn argument_map() -> TypeRef {
        TypeRef::map(TypeRef::String, TypeRef::NullableAny)
    }

    /// The class a nominal type names.
    pub fn class_id(&self) -> Option<ClassId> {
        match self {
            TypeRef::Class { class, .. } => Some(*class),
            _ => None,
        }
    }

    /// Type arguments of a nominal type (empty for everything else).
    pub fn args(&self) -> &[TypeRef] {
        match self {
            TypeRef::Class { args, .. } => args,
            _ => &[],
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, TypeRef::Function { .. })
    }

    /// Replace type parameters according to `subst`. Parameters without a
    /// mapping are kept.
    pub fn substitute(&self, subst: &TypeSubst) -> TypeRef {
        if subst.is_empty() {
            return self.clone();
        }
        match self {
            TypeRef::Param(p) => subst.get(p).cloned().unwrap_or(TypeRef::Param(*p)),
            TypeRef::Class { class, args } => TypeRef::Class {
                class: *class,
                args: args.iter().map(|a| a.substitute(subst)).collect(),
            },
            TypeRef::Function { params, ret } => TypeRef::Function {
                params: params.iter().map(|p| p.substitute(subst)).collect(),
                ret: Box::new(ret.substitute(subst)),
            },
            TypeRef::Lazy(t) => TypeRef::Lazy(Box::new(t.substitute(subst))),
            TypeRef::Map(k, v) => {
                TypeRef::Map(Box::new(k.substitute(subst)), Box::new(v.substitute(subst)))
            }
            TypeRef::Callable(t) => TypeRef::Callable(Box::new(t.substitute(subst))),
            TypeRef::Property(t) => TypeRef::Property(Box::new(t.substitute(subst))),
            other => other.clone(),
        }
    }

    /// Whether `param` occurs anywhere in this type.
    pub fn mentions(&self, param: TypeParamId) -> bool {
        match self {
            TypeRef::Param(p) => *p == param,
            TypeRef::Class { args, .. } => args.iter().any(|a| a.mentions(param)),
            TypeRef::Function { params, ret } => {
                params.iter().any(|p| p.mentions(param)) || ret.mentions(param)
            }
            TypeRef::Lazy(t) | TypeRef::Callable(t) | TypeRef::Property(t) => t.mentions(param),
            TypeRef::Map(k, v) => k.mentions(param) || v.mentions(param),
            _ => false,
        }
    }
}

/// Build the substitution that instantiates `params` with `args`
/// positionally. Extra parameters or arguments are ignored.
pub fn zip_subst(params: &[TypeParamId], args: &[TypeRef]) -> TypeSubst {
    params
        .iter()
        .copied()
        .zip(args.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitute_replaces_nested_params() {
        let t = TypeParamId(0);
        let u = TypeParamId(1);
        let ty = TypeRef::function(
            vec![TypeRef::Param(t)],
            TypeRef::map(TypeRef::String, TypeRef::Param(u)),
        );
        let subst = zip_subst(&[t], &[TypeRef::Int]);
        assert_eq!(
            ty.substitute(&subst),
            TypeRef::function(
                vec![TypeRef::Int],
                TypeRef::map(TypeRef::String, TypeRef::Param(u)),
            )
        );
    }

    #[test]
    fn mentions_looks_through_builtins() {
        let t = TypeParamId(3);
        assert!(TypeRef::lazy(TypeRef::callable(TypeRef::Param(t))).mentions(t));
        assert!(!TypeRef::argument_map().mentions(t));
    }

    #[test]
    fn class_accessors() {
        let ty = TypeRef::generic(ClassId(4), vec![TypeRef::Long]);
        assert_eq!(ty.class_id(), Some(ClassId(4)));
        assert_eq!(ty.args(), &[TypeRef::Long]);
        assert_eq!(TypeRef::Int.class_id(), None);
        assert!(TypeRef::Int.args().is_empty());
    }
}
