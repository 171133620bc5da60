//! Mixin delegation.
//!
//! The delegate becomes an instance of a generated class nested in the
//! delegating class. It extends the mixin type and the delegated
//! interface, answers `self` with the delegating instance it was built
//! with, and forwards every interface member the mixin leaves open back
//! to that instance.

use stitch_common::span::Span;
use stitch_ir::printer::print_type;
use stitch_ir::{
    ClassId, ClassKind, Constructor, Expr, FieldId, FunctionId, Member, Modality, Origin, Parent,
    SuperCall, Tree, TypeRef, ValueParam,
};
use tracing::debug;

use crate::classify::trigger_call;
use crate::error::RewriteError;
use crate::interfaces::owner_supertype;
use crate::synth::{override_function, override_property};

/// Name of the back-reference field of a generated mixin class.
pub const OUTER_FIELD: &str = "$outer";

/// Rewrite the mixin-initialised `field` of `class`, which delegates
/// `iface`. Returns the generated class. The field itself stays; only its
/// initializer changes.
pub fn rewrite_mixin(
    tree: &mut Tree,
    class: ClassId,
    field: FieldId,
    iface: ClassId,
) -> Result<ClassId, RewriteError> {
    let decl = tree.field(field).clone();
    let Some((_, type_args, _)) = decl.initializer.as_ref().and_then(trigger_call) else {
        return Err(RewriteError::internal(
            format!("`{}` is not initialised by a mixin() call", decl.name),
            decl.span,
        ));
    };
    let mixin_ty = match type_args {
        [mixin] | [_, mixin] => mixin.clone(),
        other => {
            return Err(RewriteError::configuration(
                format!("mixin() expects one or two type arguments, found {}", other.len()),
                decl.span,
            ))
        }
    };
    let Some(mixin) = mixin_ty.class_id() else {
        return Err(RewriteError::configuration(
            format!("mixin type {} is not a class or interface", print_type(tree, &mixin_ty)),
            decl.span,
        ));
    };
    let iface_ty = owner_supertype(tree, class, iface)?;

    tree.add_fake_overrides(mixin);
    let forwarded = open_members(tree, class, mixin, iface, &decl.name)?;

    let generated = generate_class(tree, class, mixin, &mixin_ty, iface_ty, decl.span)?;
    let outer = tree
        .class(generated)
        .fields()
        .find(|f| tree.field(*f).name == OUTER_FIELD)
        .ok_or_else(|| {
            RewriteError::internal("generated mixin class has no outer field", decl.span)
        })?;

    override_self(tree, generated, mixin, outer, decl.span)?;
    for member in forwarded {
        forward(tree, generated, member, outer)?;
    }

    let this = tree.class(class).this_receiver;
    tree.field_mut(field).initializer = Some(Expr::new_object(generated, vec![Expr::get(this)]));
    debug!(
        field = %decl.name,
        class = %tree.class(generated).name,
        "mixin delegate instantiated"
    );
    Ok(generated)
}

/// Interface members `mixin` does not implement. Each must already have
/// a real override in `class`; checked for all members before anything
/// is generated.
fn open_members(
    tree: &Tree,
    class: ClassId,
    mixin: ClassId,
    iface: ClassId,
    field: &str,
) -> Result<Vec<Member>, RewriteError> {
    let span = tree.class(class).span;
    let mut open = Vec::new();
    for member in tree.interface_members(iface) {
        let (target, what) = match member {
            Member::Function(f) => (f, describe_function(tree, f)),
            Member::Property(p) => {
                let decl = tree.property(p);
                let Some(getter) = decl.getter else {
                    continue;
                };
                let what = format!("property {}: {}", decl.name, print_type(tree, &decl.ty));
                (getter, what)
            }
            Member::Field(_) | Member::Class(_) => continue,
        };
        if mixin_implements(tree, mixin, target) {
            continue;
        }
        if !tree.has_real_override(class, target) {
            return Err(RewriteError::configuration(
                format!("Neither mixin class nor declaration overrides {what}"),
                span,
            ));
        }
        debug!(field, member = %what, "mixin forwards to delegating class");
        open.push(member);
    }
    Ok(open)
}

fn mixin_implements(tree: &Tree, mixin: ClassId, target: FunctionId) -> bool {
    tree.resolve_dispatch(mixin, target)
        .is_some_and(|f| f != target)
}

fn describe_function(tree: &Tree, function: FunctionId) -> String {
    let decl = tree.function(function);
    let params: Vec<String> = decl
        .params
        .iter()
        .map(|p| format!("{}: {}", p.name, print_type(tree, &p.ty)))
        .collect();
    format!(
        "function {}({}): {}",
        decl.name,
        params.join(", "),
        print_type(tree, &decl.return_type)
    )
}

fn generate_class(
    tree: &mut Tree,
    class: ClassId,
    mixin: ClassId,
    mixin_ty: &TypeRef,
    iface_ty: TypeRef,
    span: Span,
) -> Result<ClassId, RewriteError> {
    let super_call = match tree.class(mixin).kind {
        ClassKind::Class => {
            let required = tree
                .class(mixin)
                .constructor
                .as_ref()
                .is_some_and(|c| c.params.iter().any(|p| p.default.is_none()));
            if required {
                return Err(RewriteError::configuration(
                    format!(
                        "mixin class {} must be constructible without arguments",
                        tree.fq_name(mixin)
                    ),
                    span,
                ));
            }
            Some(SuperCall {
                class: mixin,
                type_args: mixin_ty.args().to_vec(),
                args: Vec::new(),
            })
        }
        ClassKind::Interface | ClassKind::AnnotationClass => None,
    };

    let index = tree
        .class(class)
        .nested_classes()
        .filter(|c| tree.class(*c).origin == Origin::PluginGenerated)
        .count();
    let name = format!("{}$Impl{index}", tree.class(mixin).name);
    let generated = tree.add_class(Parent::Class(class), &name, ClassKind::Class);
    let outer_ty = tree.this_type(class);
    let outer_param = tree.fresh_value();
    {
        let decl = tree.class_mut(generated);
        decl.origin = Origin::PluginGenerated;
        decl.modality = Modality::Final;
        decl.supertypes = vec![mixin_ty.clone(), iface_ty];
        decl.constructor = Some(Constructor {
            params: vec![ValueParam::new(outer_param, "outer", outer_ty.clone())],
            super_call,
        });
    }
    tree.add_field(
        generated,
        OUTER_FIELD,
        outer_ty,
        Some(Expr::get(outer_param)),
        Origin::PluginGenerated,
    );
    tree.add_fake_overrides(generated);
    Ok(generated)
}

/// `override val self get() = this.$outer`
fn override_self(
    tree: &mut Tree,
    generated: ClassId,
    mixin: ClassId,
    outer: FieldId,
    span: Span,
) -> Result<(), RewriteError> {
    let Some(inherited) = tree.property_named(generated, "self") else {
        return Err(RewriteError::configuration(
            format!("mixin type {} does not declare a `self` property", tree.fq_name(mixin)),
            span,
        ));
    };
    let property = override_property(tree, generated, inherited)?;
    if let Some(getter) = tree.property(property).getter {
        let this = tree.this_of(getter);
        tree.set_body(getter, Expr::ret(Expr::get_field(Expr::get(this), outer)));
    }
    Ok(())
}

/// Forward one interface member from the generated class to the
/// delegating instance.
fn forward(
    tree: &mut Tree,
    generated: ClassId,
    member: Member,
    outer: FieldId,
) -> Result<(), RewriteError> {
    match member {
        Member::Function(target) => {
            let function = override_function(tree, generated, target)?;
            let decl = tree.function(function).clone();
            let this = tree.this_of(function);
            let args = decl.params.iter().map(|p| Expr::get(p.id)).collect();
            let type_args = decl.type_params.iter().map(|p| TypeRef::Param(*p)).collect();
            let call = Expr::member_call(target, Expr::get_field(Expr::get(this), outer), args)
                .with_type_args(type_args);
            tree.set_body(function, Expr::ret(call));
        }
        Member::Property(target) => {
            let property = override_property(tree, generated, target)?;
            let decl = tree.property(property).clone();
            let base = tree.property(target).clone();
            if let (Some(getter), Some(base_getter)) = (decl.getter, base.getter) {
                let this = tree.this_of(getter);
                let outer_ref = Expr::get_field(Expr::get(this), outer);
                let call = Expr::member_call(base_getter, outer_ref, Vec::new());
                tree.set_body(getter, Expr::ret(call));
            }
            if let (Some(setter), Some(base_setter)) = (decl.setter, base.setter) {
                let this = tree.this_of(setter);
                let value = tree.function(setter).params[0].id;
                let call = Expr::member_call(
                    base_setter,
                    Expr::get_field(Expr::get(this), outer),
                    vec![Expr::get(value)],
                );
                tree.set_body(setter, call);
            }
        }
        Member::Field(_) | Member::Class(_) => {}
    }
    Ok(())
}
