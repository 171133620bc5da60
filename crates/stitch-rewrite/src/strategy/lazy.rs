//! Lazy delegation.
//!
//! The delegate storage is replaced by a `Lazy<I>` field and every read
//! of the old field becomes a forced read of the new one. The naive
//! forwarders stay as they are and now reach the delegate through the
//! memoised computation.

use stitch_ir::{ClassId, Expr, FieldId, FunctionId, Intrinsic, Member, Origin, Tree, TypeRef};
use tracing::debug;

use crate::classify::trigger_call;
use crate::error::RewriteError;

/// How the trigger's single argument becomes the lazy initializer.
enum Source {
    /// Already a `Lazy<I>`; used as is.
    Deferred(Expr),
    /// A `() -> I` producer; wrapped.
    Producer(Expr),
}

fn argument_source(tree: &Tree, function: FunctionId, args: &[Expr]) -> Option<Source> {
    let [param] = tree.function(function).params.as_slice() else {
        return None;
    };
    let [arg] = args else {
        return None;
    };
    match &param.ty {
        TypeRef::Lazy(_) => Some(Source::Deferred(arg.clone())),
        TypeRef::Function { params, .. } if params.is_empty() => {
            Some(Source::Producer(arg.clone()))
        }
        _ => None,
    }
}

/// Replace `field` with lazy storage. Returns the new field.
pub fn rewrite_lazy(
    tree: &mut Tree,
    class: ClassId,
    field: FieldId,
) -> Result<FieldId, RewriteError> {
    let decl = tree.field(field).clone();
    let unknown = || {
        RewriteError::configuration(
            "Unknown lazyDelegate() function invocation",
            decl.span,
        )
    };
    let (function, _, args) = decl.initializer.as_ref().and_then(trigger_call).ok_or_else(unknown)?;
    let initializer = match argument_source(tree, function, args).ok_or_else(unknown)? {
        Source::Deferred(lazy) => lazy,
        Source::Producer(producer) => Expr::intrinsic(Intrinsic::LazyOf, vec![producer]),
    };

    let lazy = tree.new_detached_field(
        class,
        &decl.name,
        TypeRef::lazy(decl.ty.clone()),
        Some(initializer),
        Origin::PluginGenerated,
    );
    tree.field_mut(lazy).span = decl.span;
    let index = tree
        .member_index(class, Member::Field(field))
        .map_or(usize::MAX, |i| i + 1);
    tree.insert_member(class, index, Member::Field(lazy));
    debug!(field = %decl.name, "replaced delegate storage with lazy storage");

    tree.for_each_body_mut(class, &mut |body| {
        body.rewrite(&mut |e| match e {
            Expr::GetField { receiver, field: f } if f == field => Expr::intrinsic(
                Intrinsic::LazyValue,
                vec![Expr::GetField {
                    receiver,
                    field: lazy,
                }],
            ),
            other => other,
        });
    });
    Ok(lazy)
}
