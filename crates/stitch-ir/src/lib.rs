//! Declaration tree model for the Stitch delegation rewriter.
//!
//! A [`Tree`] holds one compilation unit after the host front-end has
//! resolved and type-checked it: classes, fields, functions, properties,
//! their types and expression bodies, and the override relation between
//! members. The rewriter mutates it in place.

pub mod decl;
pub mod expr;
pub mod hierarchy;
pub mod ids;
pub mod lowering;
pub mod printer;
pub mod tree;
pub mod ty;

pub use decl::{
    ClassDecl, ClassKind, Constructor, FieldDecl, FunctionDecl, GlobalDecl, Modality, Origin,
    PropertyDecl, SuperCall, TypeParam, ValueParam, Visibility,
};
pub use expr::{BinOp, Const, Expr, Intrinsic, Lambda};
pub use ids::{
    ClassId, FieldId, FunctionId, GlobalId, Member, Parent, PropertyId, TypeParamId, ValueId,
};
pub use tree::{SourceFile, Tree};
pub use ty::{zip_subst, TypeRef, TypeSubst};
