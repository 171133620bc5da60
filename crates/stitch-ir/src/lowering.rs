//! Lowerings performed by the host front-end before rewriting.
//!
//! These build the shapes the rewriter consumes: interface delegation
//! (`class C : I by expr`) becomes a storage field plus naive forwarders,
//! and a delegated property (`val x by holder`) becomes a property whose
//! accessors call the holder's `getValue`/`setValue` operators.

use crate::decl::{Modality, Origin, ValueParam};
use crate::expr::Expr;
use crate::ids::{ClassId, FieldId, FunctionId, Member, Parent, PropertyId};
use crate::tree::Tree;
use crate::ty::{zip_subst, TypeRef};

/// Lower `class : iface<args> by initializer`.
///
/// Adds the supertype if missing, a `$$delegate_N` storage field and one
/// forwarder per interface member the class does not implement itself.
/// Forwarders read the storage field and call the interface member on it.
/// Members inherited from `Any` are not forwarded.
pub fn implement_by_delegation(
    tree: &mut Tree,
    class: ClassId,
    iface: ClassId,
    args: Vec<TypeRef>,
    initializer: Expr,
) -> FieldId {
    tree.add_fake_overrides(iface);
    let iface_ty = TypeRef::generic(iface, args);
    if !tree.class(class).supertypes.contains(&iface_ty) {
        tree.class_mut(class).supertypes.push(iface_ty.clone());
    }

    let index = tree
        .class(class)
        .fields()
        .filter(|f| tree.field(*f).origin == Origin::DelegateStorage)
        .count();
    let field = tree.add_field(
        class,
        &format!("$$delegate_{index}"),
        iface_ty.clone(),
        Some(initializer),
        Origin::DelegateStorage,
    );
    let subst = zip_subst(&tree.class(iface).type_params, iface_ty.args());

    let functions: Vec<FunctionId> = tree.class(iface).functions().collect();
    for target in functions {
        if is_any_member(tree, target) {
            continue;
        }
        let decl = tree.function(target).clone();
        let params: Vec<TypeRef> = decl.params.iter().map(|p| p.ty.substitute(&subst)).collect();
        let existing = tree
            .class(class)
            .functions()
            .find(|f| tree.has_signature(*f, &decl.name, &params, &decl.type_params));
        if let Some(own) = existing {
            if tree.function(own).origin != Origin::FakeOverride {
                tree.add_function_override(own, target);
                continue;
            }
            tree.remove_member(class, Member::Function(own));
        }

        let forwarder = tree.add_function(
            Parent::Class(class),
            &decl.name,
            decl.return_type.substitute(&subst),
        );
        for (param, ty) in decl.params.iter().zip(params) {
            tree.add_param(forwarder, &param.name, ty);
        }
        let receiver = tree.this_of(forwarder);
        let args = tree
            .function(forwarder)
            .params
            .iter()
            .map(|p| Expr::get(p.id))
            .collect();
        let type_args = decl.type_params.iter().map(|p| TypeRef::Param(*p)).collect();
        let call = Expr::member_call(target, Expr::get_field(Expr::get(receiver), field), args)
            .with_type_args(type_args);
        let fwd = tree.function_mut(forwarder);
        fwd.type_params = decl.type_params.clone();
        fwd.origin = Origin::DelegatedMember;
        fwd.is_operator = decl.is_operator;
        fwd.overridden = vec![target];
        fwd.body = Some(Expr::ret(call));
    }

    let properties: Vec<PropertyId> = tree.class(iface).properties().collect();
    for target in properties {
        let decl = tree.property(target).clone();
        if let Some(own) = tree.property_named(class, &decl.name) {
            if tree.property(own).origin != Origin::FakeOverride {
                tree.add_property_override(own, target);
                continue;
            }
            tree.remove_member(class, Member::Property(own));
        }
        let forwarder =
            forwarding_property(tree, class, target, field, &decl.ty.substitute(&subst));
        tree.add_property_override(forwarder, target);
    }

    field
}

fn forwarding_property(
    tree: &mut Tree,
    class: ClassId,
    target: PropertyId,
    field: FieldId,
    ty: &TypeRef,
) -> PropertyId {
    let decl = tree.property(target).clone();
    let prop = tree.push_property(class, &decl.name, ty.clone(), decl.mutable);
    tree.property_mut(prop).origin = Origin::DelegatedMember;
    tree.property_mut(prop).modality = Modality::Open;

    if let (Some(getter), Some(base)) = (tree.property(prop).getter, decl.getter) {
        let this = tree.this_of(getter);
        let call = Expr::member_call(base, Expr::get_field(Expr::get(this), field), Vec::new());
        tree.set_body(getter, Expr::ret(call));
        tree.function_mut(getter).origin = Origin::DelegatedMember;
    }
    if let (Some(setter), Some(base)) = (tree.property(prop).setter, decl.setter) {
        let this = tree.this_of(setter);
        let value = tree.function(setter).params[0].id;
        let call = Expr::member_call(
            base,
            Expr::get_field(Expr::get(this), field),
            vec![Expr::get(value)],
        );
        tree.set_body(setter, call);
        tree.function_mut(setter).origin = Origin::DelegatedMember;
    }
    tree.push_member(class, Member::Property(prop));
    prop
}

/// Whether `function` is, or overrides, a member of `Any`.
pub fn is_any_member(tree: &Tree, function: FunctionId) -> bool {
    let any = tree.any_class();
    if tree.owner_class(function) == Some(any) {
        return true;
    }
    tree.class(any)
        .functions()
        .any(|f| tree.overrides_transitively(function, f))
}

/// Lower `val name: ty by holder` (or `var` when `mutable`).
///
/// The holder is stored in a `name$delegate` field and the accessors call
/// the holder class's `getValue`/`setValue` operators with the owning
/// instance and a reference to the property. Returns `None` when the
/// holder type has no `getValue` operator (or no `setValue` for a `var`).
pub fn delegate_property(
    tree: &mut Tree,
    class: ClassId,
    name: &str,
    ty: TypeRef,
    mutable: bool,
    holder: Expr,
    holder_ty: TypeRef,
) -> Option<PropertyId> {
    let holder_class = holder_ty.class_id()?;
    let get_value = operator_named(tree, holder_class, "getValue")?;
    let set_value = match mutable {
        true => Some(operator_named(tree, holder_class, "setValue")?),
        false => None,
    };

    let prop = tree.push_property(class, name, ty.clone(), mutable);
    let field = tree.new_detached_field(
        class,
        &format!("{name}$delegate"),
        holder_ty,
        Some(holder),
        Origin::PropertyDelegate,
    );
    {
        let decl = tree.property_mut(prop);
        decl.is_delegated = true;
        decl.backing_field = Some(field);
    }

    if let Some(getter) = tree.property(prop).getter {
        let this = tree.this_of(getter);
        let call = Expr::member_call(
            get_value,
            Expr::get_field(Expr::get(this), field),
            vec![Expr::get(this), Expr::PropertyRef(prop)],
        );
        tree.set_body(getter, Expr::ret(Expr::cast(call, ty.clone())));
    }
    if let (Some(setter), Some(set_value)) = (tree.property(prop).setter, set_value) {
        let this = tree.this_of(setter);
        let value = tree.function(setter).params[0].id;
        let call = Expr::member_call(
            set_value,
            Expr::get_field(Expr::get(this), field),
            vec![Expr::get(this), Expr::PropertyRef(prop), Expr::get(value)],
        );
        tree.set_body(setter, call);
    }
    tree.push_member(class, Member::Property(prop));
    Some(prop)
}

/// An operator function declared directly in `class`.
pub fn operator_named(tree: &Tree, class: ClassId, name: &str) -> Option<FunctionId> {
    tree.functions_named(class, name)
        .into_iter()
        .find(|f| tree.function(*f).is_operator)
}

/// Run [`Tree::add_fake_overrides`] on every class of the unit.
pub fn complete_hierarchy(tree: &mut Tree) {
    for class in tree.all_classes() {
        tree.add_fake_overrides(class);
    }
}

/// Fresh copies of `params` with new identities.
pub fn copy_params(tree: &mut Tree, params: &[ValueParam]) -> Vec<ValueParam> {
    params
        .iter()
        .map(|p| ValueParam {
            id: tree.fresh_value(),
            name: p.name.clone(),
            ty: p.ty.clone(),
            default: p.default.clone(),
        })
        .collect()
}
