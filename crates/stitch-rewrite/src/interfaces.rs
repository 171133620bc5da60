//! Interface member resolution.
//!
//! The front-end has already lowered `C : I by expr` into a storage field
//! and naive forwarders. Each forwarder reads the storage field it
//! forwards to and overrides the interface member it implements, which
//! together tell us which interface a delegate field services.

use rustc_hash::FxHashMap;
use stitch_ir::{ClassId, Expr, FieldId, FunctionId, Member, Origin, Tree, TypeRef};

use crate::error::RewriteError;

/// Delegate storage field to the interface it services, for one class.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DelegateInterfaces {
    by_field: FxHashMap<FieldId, ClassId>,
}

impl DelegateInterfaces {
    /// Scan the delegated members of `class`.
    ///
    /// Fails when a forwarder reads no field, overrides nothing, or
    /// overrides members of more than one interface.
    pub fn resolve(tree: &Tree, class: ClassId) -> Result<DelegateInterfaces, RewriteError> {
        let mut by_field: FxHashMap<FieldId, ClassId> = FxHashMap::default();
        for (name, forwarder, overridden) in delegated_members(tree, class) {
            let span = tree.function(forwarder).span.or(tree.class(class).span);
            let Some(field) = first_field_read(tree, forwarder) else {
                return Err(RewriteError::internal(
                    format!(
                        "delegated member `{name}` of {} does not read a delegate field",
                        tree.fq_name(class)
                    ),
                    span,
                ));
            };
            let field_span = tree.field(field).span.or(span);

            let mut candidates: Vec<ClassId> = Vec::new();
            for owner in overridden {
                if !candidates.contains(&owner) {
                    candidates.push(owner);
                }
            }
            let iface = match candidates.as_slice() {
                [one] => *one,
                [] => {
                    return Err(RewriteError::internal(
                        format!(
                            "delegated member `{name}` of {} overrides nothing",
                            tree.fq_name(class)
                        ),
                        span,
                    ))
                }
                many => {
                    return Err(RewriteError::ambiguity(
                        ambiguous_message(tree, &tree.field(field).name, many),
                        field_span,
                    ))
                }
            };

            match by_field.get(&field) {
                Some(previous) if *previous != iface => {
                    return Err(RewriteError::ambiguity(
                        ambiguous_message(tree, &tree.field(field).name, &[*previous, iface]),
                        field_span,
                    ));
                }
                _ => {
                    by_field.insert(field, iface);
                }
            }
        }
        Ok(DelegateInterfaces { by_field })
    }

    /// The interface `field` delegates. A field no forwarder reads (every
    /// member implemented by the class, or an empty interface) services
    /// the interface of its own type.
    pub fn interface_of(&self, tree: &Tree, field: FieldId) -> Result<ClassId, RewriteError> {
        if let Some(iface) = self.by_field.get(&field) {
            return Ok(*iface);
        }
        let decl = tree.field(field);
        decl.ty
            .class_id()
            .filter(|c| tree.class(*c).is_interface())
            .ok_or_else(|| {
                RewriteError::internal(
                    format!("cannot determine the interface delegated by `{}`", decl.name),
                    decl.span,
                )
            })
    }

    pub fn len(&self) -> usize {
        self.by_field.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_field.is_empty()
    }
}

/// The supertype entry of `class` naming `iface`, with its arguments.
pub fn owner_supertype(
    tree: &Tree,
    class: ClassId,
    iface: ClassId,
) -> Result<TypeRef, RewriteError> {
    let matches: Vec<&TypeRef> = tree
        .class(class)
        .supertypes
        .iter()
        .filter(|t| t.class_id() == Some(iface))
        .collect();
    match matches.as_slice() {
        [one] => Ok((*one).clone()),
        [] => Err(RewriteError::internal(
            format!("{} does not list {} as a supertype", tree.fq_name(class), tree.fq_name(iface)),
            tree.class(class).span,
        )),
        _ => Err(RewriteError::ambiguity(
            format!("{} lists {} more than once", tree.fq_name(class), tree.fq_name(iface)),
            tree.class(class).span,
        )),
    }
}

/// `(name, body holder, owners of overridden members)` for each
/// delegated member of `class`. Properties are represented by their
/// getter.
fn delegated_members(tree: &Tree, class: ClassId) -> Vec<(String, FunctionId, Vec<ClassId>)> {
    let mut out = Vec::new();
    for member in &tree.class(class).members {
        match *member {
            Member::Function(f) if tree.function(f).origin == Origin::DelegatedMember => {
                let decl = tree.function(f);
                let owners = decl
                    .overridden
                    .iter()
                    .filter_map(|o| tree.owner_class(*o))
                    .collect();
                out.push((decl.name.clone(), f, owners));
            }
            Member::Property(p) if tree.property(p).origin == Origin::DelegatedMember => {
                let decl = tree.property(p);
                let Some(getter) = decl.getter else {
                    continue;
                };
                let owners = decl
                    .overridden
                    .iter()
                    .map(|o| tree.property(*o).owner)
                    .collect();
                out.push((decl.name.clone(), getter, owners));
            }
            _ => {}
        }
    }
    out
}

fn first_field_read(tree: &Tree, function: FunctionId) -> Option<FieldId> {
    let body = tree.function(function).body.as_ref()?;
    match body.find_first(&mut |e| matches!(e, Expr::GetField { .. }))? {
        Expr::GetField { field, .. } => Some(*field),
        _ => None,
    }
}

fn ambiguous_message(tree: &Tree, field: &str, candidates: &[ClassId]) -> String {
    let names: Vec<String> = candidates.iter().map(|c| tree.fq_name(*c)).collect();
    format!(
        "cannot determine the interface delegated by `{field}`: candidates are {}",
        names.join(", ")
    )
}
