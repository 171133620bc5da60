//! Member override synthesis.
//!
//! Replaces the member of a class that corresponds to an inherited member
//! with a fresh final, public override. The replacement takes the old
//! member's signature with new parameter identities, keeps its override
//! links, and is appended to the member list after the old one is
//! detached. Bodies are supplied by the caller.

use stitch_ir::{
    zip_subst, ClassId, FunctionId, Member, Modality, Origin, Parent, PropertyId, Tree, TypeRef,
    TypeSubst, ValueParam, Visibility,
};

use crate::error::RewriteError;

/// Substitution from the type parameters of `owner` to the arguments
/// `class` supplies for it.
fn member_subst(tree: &Tree, class: ClassId, owner: &Parent) -> TypeSubst {
    let Parent::Class(owner) = owner else {
        return TypeSubst::default();
    };
    match tree.as_supertype(&tree.this_type(class), *owner) {
        Some(sup) => zip_subst(&tree.class(*owner).type_params, sup.args()),
        None => TypeSubst::default(),
    }
}

/// Parameters with fresh identities. Defaults are not copied: overrides
/// inherit them from the member they override.
fn fresh_params(tree: &mut Tree, params: &[ValueParam]) -> Vec<ValueParam> {
    params
        .iter()
        .map(|p| ValueParam::new(tree.fresh_value(), p.name.clone(), p.ty.clone()))
        .collect()
}

/// Replace the member of `class` matching `original` (same name, same
/// receiver shape, same parameter types after substitution) with a new
/// bodiless final override, and return it.
pub fn override_function(
    tree: &mut Tree,
    class: ClassId,
    original: FunctionId,
) -> Result<FunctionId, RewriteError> {
    let target = tree.function(original).clone();
    let subst = member_subst(tree, class, &target.owner);
    let params: Vec<TypeRef> = target.params.iter().map(|p| p.ty.substitute(&subst)).collect();
    let has_receiver = target.dispatch_receiver.is_some();

    let matches: Vec<FunctionId> = tree
        .class(class)
        .functions()
        .filter(|f| {
            tree.function(*f).dispatch_receiver.is_some() == has_receiver
                && tree.has_signature(*f, &target.name, &params, &target.type_params)
        })
        .collect();
    let existing = match matches.as_slice() {
        [one] => *one,
        other => {
            return Err(RewriteError::internal(
                format!(
                    "expected exactly one member `{}` in {}, found {}",
                    target.name,
                    tree.fq_name(class),
                    other.len()
                ),
                tree.class(class).span,
            ))
        }
    };

    let old = tree.function(existing).clone();
    let replacement = tree.add_function(Parent::Class(class), &old.name, old.return_type.clone());
    let params = fresh_params(tree, &old.params);
    let decl = tree.function_mut(replacement);
    decl.type_params = old.type_params;
    decl.params = params;
    decl.overridden = old.overridden;
    decl.origin = Origin::PluginGenerated;
    decl.modality = Modality::Final;
    decl.visibility = Visibility::Public;
    decl.is_operator = old.is_operator;
    decl.is_suspend = false;
    tree.remove_member(class, Member::Function(existing));
    Ok(replacement)
}

/// Replace the property of `class` named like `original` with a new final
/// property whose accessors have no bodies, and return it.
pub fn override_property(
    tree: &mut Tree,
    class: ClassId,
    original: PropertyId,
) -> Result<PropertyId, RewriteError> {
    let name = tree.property(original).name.clone();
    let matches: Vec<PropertyId> = tree
        .class(class)
        .properties()
        .filter(|p| tree.property(*p).name == name)
        .collect();
    let existing = match matches.as_slice() {
        [one] => *one,
        other => {
            return Err(RewriteError::internal(
                format!(
                    "expected exactly one property `{name}` in {}, found {}",
                    tree.fq_name(class),
                    other.len()
                ),
                tree.class(class).span,
            ))
        }
    };

    let old = tree.property(existing).clone();
    let replacement = tree.new_detached_property(class, &old.name, old.ty.clone(), old.mutable);
    {
        let decl = tree.property_mut(replacement);
        decl.origin = Origin::PluginGenerated;
        decl.modality = Modality::Final;
        decl.overridden = old.overridden.clone();
    }
    let accessors = [
        (tree.property(replacement).getter, old.getter),
        (tree.property(replacement).setter, old.setter),
    ];
    for (new, previous) in accessors {
        let Some(new) = new else {
            continue;
        };
        let overridden = previous
            .map(|f| tree.function(f).overridden.clone())
            .unwrap_or_default();
        let decl = tree.function_mut(new);
        decl.overridden = overridden;
        decl.origin = Origin::PluginGenerated;
        decl.modality = Modality::Final;
    }
    tree.remove_member(class, Member::Property(existing));
    tree.push_member(class, Member::Property(replacement));
    Ok(replacement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stitch_ir::lowering::implement_by_delegation;
    use stitch_ir::{ClassKind, Expr};

    fn app() -> Parent {
        Parent::Package("app".into())
    }

    #[test]
    fn test_override_function_replaces_forwarder() {
        let mut tree = Tree::new();
        let iface = tree.add_class(app(), "Box", ClassKind::Interface);
        let t = tree.add_class_type_param(iface, "T");
        let put = tree.add_function(Parent::Class(iface), "put", TypeRef::Unit);
        tree.add_param(put, "item", TypeRef::Param(t));
        let c = tree.add_class(app(), "C", ClassKind::Class);
        tree.add_function(Parent::Class(c), "other", TypeRef::Unit);
        implement_by_delegation(&mut tree, c, iface, vec![TypeRef::String], Expr::null());
        let forwarder = tree.functions_named(c, "put")[0];

        let new = override_function(&mut tree, c, put).unwrap();
        let decl = tree.function(new);
        assert_ne!(new, forwarder);
        assert_eq!(decl.origin, Origin::PluginGenerated);
        assert_eq!(decl.modality, Modality::Final);
        assert_eq!(decl.overridden, vec![put]);
        assert_eq!(decl.params[0].ty, TypeRef::String);
        assert_ne!(decl.params[0].id, tree.function(forwarder).params[0].id);
        assert!(decl.body.is_none());
        // Old member detached, new one appended.
        assert_eq!(tree.functions_named(c, "put"), vec![new]);
        assert_eq!(tree.class(c).members.last(), Some(&Member::Function(new)));
    }

    #[test]
    fn test_override_function_requires_a_match() {
        let mut tree = Tree::new();
        let iface = tree.add_class(app(), "Job", ClassKind::Interface);
        let run = tree.add_function(Parent::Class(iface), "run", TypeRef::Unit);
        let c = tree.add_class(app(), "C", ClassKind::Class);
        let err = override_function(&mut tree, c, run).unwrap_err();
        assert_eq!(err.message(), "expected exactly one member `run` in app.C, found 0");
    }

    #[test]
    fn test_override_property_links_accessors() {
        let mut tree = Tree::new();
        let iface = tree.add_class(app(), "Sized", ClassKind::Interface);
        let size = tree.add_property(iface, "size", TypeRef::Long, true, None);
        let c = tree.add_class(app(), "C", ClassKind::Class);
        implement_by_delegation(&mut tree, c, iface, vec![], Expr::null());

        let new = override_property(&mut tree, c, size).unwrap();
        let decl = tree.property(new).clone();
        assert_eq!(decl.overridden, vec![size]);
        assert_eq!(decl.modality, Modality::Final);
        let getter = tree.function(decl.getter.unwrap());
        assert_eq!(getter.overridden, vec![tree.property(size).getter.unwrap()]);
        assert!(getter.body.is_none());
        assert_eq!(tree.property_named(c, "size"), Some(new));
    }
}
