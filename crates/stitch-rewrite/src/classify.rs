//! Delegate field classification.
//!
//! A field is a candidate when it is compiler-made delegate storage whose
//! initializer is a single call of a trigger, or when it is the storage of
//! a delegated property whose holder class is an erasable delegate.

use stitch_ir::{ClassId, Expr, FieldId, FunctionId, Origin, PropertyId, Tree, TypeRef};
use tracing::debug;

use crate::markers::{DelegateKind, TriggerSet};

#[derive(Debug, Clone, PartialEq)]
pub struct DelegateField {
    pub field: FieldId,
    pub kind: DelegateKind,
    /// The trigger overload named by the initializer.
    pub trigger: Option<FunctionId>,
    /// Owning property of an erasable-delegate field.
    pub property: Option<PropertyId>,
}

/// The parts of a trigger call: callee, explicit type arguments and
/// arguments.
pub fn trigger_call(expr: &Expr) -> Option<(FunctionId, &[TypeRef], &[Expr])> {
    match expr {
        Expr::Call {
            function,
            receiver: None,
            type_args,
            args,
        } => Some((*function, type_args, args)),
        _ => None,
    }
}

/// Candidate delegate fields of `class`, in member order.
pub fn classify(tree: &Tree, class: ClassId, triggers: &TriggerSet) -> Vec<DelegateField> {
    let mut out = Vec::new();
    for field in tree.class(class).fields() {
        let decl = tree.field(field);
        if decl.origin != Origin::DelegateStorage {
            continue;
        }
        let Some((function, _, _)) = decl.initializer.as_ref().and_then(trigger_call) else {
            continue;
        };
        match triggers.kind_of(function) {
            Some(DelegateKind::Erasable) | None => {}
            Some(kind) => {
                debug!(field = %decl.name, kind = kind.name(), "classified delegate field");
                out.push(DelegateField {
                    field,
                    kind,
                    trigger: Some(function),
                    property: None,
                });
            }
        }
    }

    for property in tree.class(class).properties() {
        let decl = tree.property(property);
        let Some(field) = decl.backing_field.filter(|_| decl.is_delegated) else {
            continue;
        };
        let storage = tree.field(field);
        if storage.origin != Origin::PropertyDelegate {
            continue;
        }
        let Some(holder) = storage.ty.class_id() else {
            continue;
        };
        if triggers.is_erasable_holder(tree, holder) {
            debug!(
                property = %decl.name,
                holder = %tree.fq_name(holder),
                "classified erasable use site"
            );
            out.push(DelegateField {
                field,
                kind: DelegateKind::Erasable,
                trigger: None,
                property: Some(property),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use stitch_ir::lowering::implement_by_delegation;
    use stitch_ir::{ClassKind, Parent};

    use crate::config::RewriteConfig;

    #[test]
    fn test_only_trigger_initialised_storage_is_a_candidate() {
        let mut tree = Tree::new();
        let lib = Parent::Package("stitch".into());
        let app = Parent::Package("app".into());
        let proxy = tree.add_function(lib, "proxyDelegate", TypeRef::Any);
        let other = tree.add_function(app.clone(), "make", TypeRef::Any);
        let iface = tree.add_class(app.clone(), "Runnable", ClassKind::Interface);
        let a = tree.add_class(app.clone(), "A", ClassKind::Class);
        let b = tree.add_class(app.clone(), "B", ClassKind::Class);
        let c = tree.add_class(app, "C", ClassKind::Class);

        let by_proxy = implement_by_delegation(
            &mut tree,
            a,
            iface,
            vec![],
            Expr::static_call(proxy, vec![]),
        );
        implement_by_delegation(&mut tree, b, iface, vec![], Expr::static_call(other, vec![]));
        // A user field initialised with a trigger is not delegate storage.
        tree.add_field(
            c,
            "plain",
            TypeRef::class(iface),
            Some(Expr::static_call(proxy, vec![])),
            Origin::UserDeclared,
        );

        let triggers = TriggerSet::resolve(&tree, &RewriteConfig::default());
        assert_eq!(
            classify(&tree, a, &triggers),
            vec![DelegateField {
                field: by_proxy,
                kind: DelegateKind::Proxy,
                trigger: Some(proxy),
                property: None,
            }]
        );
        assert!(classify(&tree, b, &triggers).is_empty());
        assert!(classify(&tree, c, &triggers).is_empty());
    }
}
