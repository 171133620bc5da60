//! Arena handles.
//!
//! Every node of the declaration tree lives in a `Vec` owned by
//! [`Tree`](crate::Tree) and is addressed by one of these `Copy` handles.
//! Handles stay valid after a node is detached from its owner, so side
//! tables keyed by id never dangle.

use std::fmt;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// A class, interface or annotation class.
    ClassId, "class#"
);
define_id!(
    /// A field (backing storage) of a class.
    FieldId, "field#"
);
define_id!(
    /// A function: member, top-level, or property accessor.
    FunctionId, "fun#"
);
define_id!(
    /// A property; its accessors are functions.
    PropertyId, "prop#"
);
define_id!(
    /// A type parameter of a class or function.
    TypeParamId, "T#"
);
define_id!(
    /// A package-level value, initialised on first read.
    GlobalId, "global#"
);
define_id!(
    /// A receiver, value parameter, local or lambda parameter.
    ValueId, "v#"
);

/// A declaration listed in a class body, in textual order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Member {
    Field(FieldId),
    Function(FunctionId),
    Property(PropertyId),
    Class(ClassId),
}

/// Where a declaration lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Parent {
    /// Top level of a package (empty string for the root package).
    Package(String),
    Class(ClassId),
}
