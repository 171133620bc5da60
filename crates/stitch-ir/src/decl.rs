//! Declaration nodes stored in the [`Tree`](crate::Tree) arenas.

use stitch_common::span::Span;

use crate::expr::Expr;
use crate::ids::{ClassId, FieldId, FunctionId, Member, Parent, PropertyId, TypeParamId, ValueId};
use crate::ty::TypeRef;

/// Who created a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    UserDeclared,
    /// Storage for interface delegation (`class C : I by expr`).
    DelegateStorage,
    /// Storage behind a delegated property (`val x by Holder()`).
    PropertyDelegate,
    /// Naive forwarder generated for interface delegation.
    DelegatedMember,
    /// Inherited member without a body of its own.
    FakeOverride,
    PluginGenerated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    Class,
    Interface,
    AnnotationClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    Final,
    Open,
    Abstract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Private,
    Local,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeParam {
    pub name: String,
    pub bounds: Vec<TypeRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueParam {
    pub id: ValueId,
    pub name: String,
    pub ty: TypeRef,
    pub default: Option<Expr>,
}

impl ValueParam {
    pub fn new(id: ValueId, name: impl Into<String>, ty: TypeRef) -> ValueParam {
        ValueParam {
            id,
            name: name.into(),
            ty,
            default: None,
        }
    }
}

/// Call of the superclass constructor made by a primary constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct SuperCall {
    pub class: ClassId,
    pub type_args: Vec<TypeRef>,
    pub args: Vec<Expr>,
}

/// Primary constructor. Parameters are in scope in field initialisers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Constructor {
    pub params: Vec<ValueParam>,
    pub super_call: Option<SuperCall>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub parent: Parent,
    pub kind: ClassKind,
    pub modality: Modality,
    pub type_params: Vec<TypeParamId>,
    /// Ordered; resolution is first match wins.
    pub supertypes: Vec<TypeRef>,
    /// Textual order; determines layout.
    pub members: Vec<Member>,
    pub this_receiver: ValueId,
    pub constructor: Option<Constructor>,
    /// Annotation classes applied to this class.
    pub annotations: Vec<ClassId>,
    pub origin: Origin,
    pub span: Span,
}

impl ClassDecl {
    pub fn is_interface(&self) -> bool {
        self.kind == ClassKind::Interface
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.members.iter().filter_map(|m| match m {
            Member::Field(f) => Some(*f),
            _ => None,
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.members.iter().filter_map(|m| match m {
            Member::Function(f) => Some(*f),
            _ => None,
        })
    }

    pub fn properties(&self) -> impl Iterator<Item = PropertyId> + '_ {
        self.members.iter().filter_map(|m| match m {
            Member::Property(p) => Some(*p),
            _ => None,
        })
    }

    pub fn nested_classes(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.members.iter().filter_map(|m| match m {
            Member::Class(c) => Some(*c),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeRef,
    pub initializer: Option<Expr>,
    pub origin: Origin,
    pub owner: ClassId,
    pub mutable: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub owner: Parent,
    pub type_params: Vec<TypeParamId>,
    /// `this` of a member function; `None` for top-level and static helpers.
    pub dispatch_receiver: Option<ValueId>,
    pub params: Vec<ValueParam>,
    pub return_type: TypeRef,
    pub body: Option<Expr>,
    pub origin: Origin,
    pub modality: Modality,
    pub visibility: Visibility,
    pub is_operator: bool,
    pub is_inline: bool,
    pub is_suspend: bool,
    /// Functions this one directly overrides.
    pub overridden: Vec<FunctionId>,
    /// Set on property accessors.
    pub property: Option<PropertyId>,
    pub span: Span,
}

impl FunctionDecl {
    pub fn is_fake_override(&self) -> bool {
        self.origin == Origin::FakeOverride
    }

    pub fn is_accessor(&self) -> bool {
        self.property.is_some()
    }

    pub fn param_types(&self) -> Vec<TypeRef> {
        self.params.iter().map(|p| p.ty.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDecl {
    pub name: String,
    pub owner: ClassId,
    pub ty: TypeRef,
    pub mutable: bool,
    pub getter: Option<FunctionId>,
    pub setter: Option<FunctionId>,
    pub backing_field: Option<FieldId>,
    pub origin: Origin,
    pub modality: Modality,
    /// `val x by holder`.
    pub is_delegated: bool,
    pub overridden: Vec<PropertyId>,
    pub span: Span,
}

impl PropertyDecl {
    pub fn is_fake_override(&self) -> bool {
        self.origin == Origin::FakeOverride
    }
}

/// Package-level value, evaluated once on first read.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalDecl {
    pub name: String,
    pub package: String,
    pub ty: TypeRef,
    pub initializer: Expr,
}
