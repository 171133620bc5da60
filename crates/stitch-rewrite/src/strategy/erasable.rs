//! Erasable delegates.
//!
//! A holder class annotated as erasable keeps its single value in one
//! backing field and exposes it through `getValue`/`setValue` operators.
//! Compiling the holder produces `getValue-impl`/`setValue-impl`: static
//! inline copies of the operators that reach the storage only through a
//! getter and a setter closure passed in by the caller. The holder's own
//! operators are rewritten to call them with closures over their field.
//!
//! At every property delegated to such a holder the inliner moves the
//! holder's storage into the property's backing field and makes the
//! accessors call the impl functions with closures over that field, so no
//! holder object is ever created.

use rustc_hash::FxHashMap;
use stitch_ir::lowering::operator_named;
use stitch_ir::{
    zip_subst, ClassId, Expr, FieldId, FunctionId, Member, Modality, Origin, Parent, PropertyId,
    Tree, TypeRef, TypeSubst, ValueId, ValueParam,
};
use tracing::debug;

use crate::error::RewriteError;

/// Result of compiling a holder class.
#[derive(Debug, Clone, PartialEq)]
pub struct ErasableImpl {
    pub holder: ClassId,
    /// The holder's single stored property and its backing field.
    pub property: PropertyId,
    pub field: FieldId,
    pub get_value: FunctionId,
    pub get_impl: FunctionId,
    pub set_value: Option<FunctionId>,
    pub set_impl: Option<FunctionId>,
}

/// Compiled holders of one run, each compiled once on first need.
#[derive(Debug, Default)]
pub struct HolderCache {
    compiled: FxHashMap<ClassId, ErasableImpl>,
}

impl HolderCache {
    pub fn ensure(
        &mut self,
        tree: &mut Tree,
        holder: ClassId,
    ) -> Result<ErasableImpl, RewriteError> {
        if let Some(done) = self.compiled.get(&holder) {
            return Ok(done.clone());
        }
        let done = compile_holder(tree, holder)?;
        self.compiled.insert(holder, done.clone());
        Ok(done)
    }

    pub fn holders(&self) -> Vec<ClassId> {
        let mut out: Vec<ClassId> = self.compiled.keys().copied().collect();
        out.sort();
        out
    }
}

/// Where the holder keeps its value, and the names it is reachable by.
struct Storage {
    field: FieldId,
    getter: Option<FunctionId>,
    setter: Option<FunctionId>,
}

/// Compile `holder`: check its shape, add the impl functions and route
/// its operators through them.
pub fn compile_holder(tree: &mut Tree, holder: ClassId) -> Result<ErasableImpl, RewriteError> {
    let fq_name = tree.fq_name(holder);
    let span = tree.class(holder).span;

    let stored = tree.storage_fields(holder);
    let (property, field) = match stored.as_slice() {
        [field] => {
            let property = tree
                .class(holder)
                .properties()
                .find(|p| tree.property(*p).backing_field == Some(*field));
            match property {
                Some(p) => (p, *field),
                None => {
                    return Err(RewriteError::configuration(
                        format!("Erasable delegate {fq_name} must store its value in a property"),
                        span,
                    ))
                }
            }
        }
        _ => {
            return Err(RewriteError::configuration(
                format!("Erasable delegate {fq_name} must have a single field"),
                span,
            ))
        }
    };
    let Some(get_value) = operator_named(tree, holder, "getValue") else {
        return Err(RewriteError::configuration(
            format!("No getValue operator function found for erasable delegate class {fq_name}"),
            span,
        ));
    };
    let set_value = operator_named(tree, holder, "setValue");

    let storage = Storage {
        field,
        getter: tree.property(property).getter,
        setter: tree.property(property).setter,
    };
    let get_impl = build_impl(tree, holder, get_value, &storage)?;
    route_through_impl(tree, holder, get_value, get_impl, field);
    let set_impl = match set_value {
        Some(set_value) => {
            let set_impl = build_impl(tree, holder, set_value, &storage)?;
            route_through_impl(tree, holder, set_value, set_impl, field);
            Some(set_impl)
        }
        None => None,
    };
    debug!(holder = %fq_name, "compiled erasable delegate");

    Ok(ErasableImpl {
        holder,
        property,
        field,
        get_value,
        get_impl,
        set_value,
        set_impl,
    })
}

/// Static copy of `op` taking trailing `getter`/`setter` closures.
///
/// Type parameters are the operator's own followed by copies of the
/// holder's, so the copy can be called without a holder instance.
fn build_impl(
    tree: &mut Tree,
    holder: ClassId,
    op: FunctionId,
    storage: &Storage,
) -> Result<FunctionId, RewriteError> {
    let decl = tree.function(op).clone();
    let fq_name = tree.fq_name(holder);
    let Some(this) = decl.dispatch_receiver else {
        return Err(RewriteError::internal(
            format!("operator {} of {fq_name} has no receiver", decl.name),
            decl.span,
        ));
    };
    let Some(mut body) = decl.body.clone() else {
        return Err(RewriteError::configuration(
            format!("operator {} of erasable delegate class {fq_name} has no body", decl.name),
            decl.span,
        ));
    };

    let mut subst = TypeSubst::default();
    let mut type_params = decl.type_params.clone();
    for param in tree.class(holder).type_params.clone() {
        let name = tree.type_param(param).name.clone();
        let copy = tree.add_type_param(&name);
        subst.insert(param, TypeRef::Param(copy));
        type_params.push(copy);
    }
    let field_ty = tree.field(storage.field).ty.substitute(&subst);

    let mut remap: FxHashMap<ValueId, ValueId> = FxHashMap::default();
    let mut params = Vec::with_capacity(decl.params.len() + 2);
    for param in &decl.params {
        let id = tree.fresh_value();
        remap.insert(param.id, id);
        params.push(ValueParam::new(id, param.name.clone(), param.ty.substitute(&subst)));
    }
    let getter = tree.fresh_value();
    let setter = tree.fresh_value();
    params.push(ValueParam::new(getter, "getter", TypeRef::function(Vec::new(), field_ty.clone())));
    let setter_ty = TypeRef::function(vec![field_ty], TypeRef::Unit);
    params.push(ValueParam::new(setter, "setter", setter_ty));

    body.remap_values(&remap);
    body.substitute_types(&subst);
    body.rewrite(&mut |e| redirect_storage(e, this, storage, getter, setter));
    if body.uses_value(this) {
        return Err(RewriteError::configuration(
            format!(
                "operator {} of erasable delegate class {fq_name} \
                 may use `this` only to access its field",
                decl.name
            ),
            decl.span,
        ));
    }

    let name = format!("{}-impl", decl.name);
    let function = tree.new_detached_function(
        Parent::Class(holder),
        &name,
        decl.return_type.substitute(&subst),
    );
    let new = tree.function_mut(function);
    new.type_params = type_params;
    new.dispatch_receiver = None;
    new.params = params;
    new.body = Some(body);
    new.origin = Origin::PluginGenerated;
    new.modality = Modality::Final;
    new.is_inline = true;
    tree.push_member(holder, Member::Function(function));
    Ok(function)
}

fn is_this(expr: &Expr, this: ValueId) -> bool {
    matches!(expr, Expr::Get(v) if *v == this)
}

/// Storage accesses through `this` become closure invocations.
fn redirect_storage(
    e: Expr,
    this: ValueId,
    storage: &Storage,
    getter: ValueId,
    setter: ValueId,
) -> Expr {
    match e {
        Expr::GetField { receiver, field }
            if field == storage.field && is_this(&receiver, this) =>
        {
            Expr::invoke(Expr::get(getter), Vec::new())
        }
        Expr::SetField {
            receiver,
            field,
            value,
        } if field == storage.field && is_this(&receiver, this) => {
            Expr::invoke(Expr::get(setter), vec![*value])
        }
        Expr::Call {
            function,
            receiver: Some(receiver),
            args,
            ..
        } if Some(function) == storage.getter && is_this(&receiver, this) => {
            Expr::invoke(Expr::get(getter), args)
        }
        Expr::Call {
            function,
            receiver: Some(receiver),
            args,
            ..
        } if Some(function) == storage.setter && is_this(&receiver, this) => {
            Expr::invoke(Expr::get(setter), args)
        }
        other => other,
    }
}

/// Closures reading and writing `field` of `receiver`.
fn storage_closures(tree: &mut Tree, receiver: ValueId, field: FieldId) -> (Expr, Expr) {
    let ty = tree.field(field).ty.clone();
    let value = tree.fresh_value();
    let getter = Expr::lambda(Vec::new(), ty.clone(), Expr::get_field(Expr::get(receiver), field));
    let setter = Expr::lambda(
        vec![ValueParam::new(value, "value", ty)],
        TypeRef::Unit,
        Expr::set_field(Expr::get(receiver), field, Expr::get(value)),
    );
    (getter, setter)
}

/// Make the holder's own operator call its impl with closures over the
/// holder's field.
fn route_through_impl(
    tree: &mut Tree,
    holder: ClassId,
    op: FunctionId,
    imp: FunctionId,
    field: FieldId,
) {
    let decl = tree.function(op).clone();
    let Some(this) = decl.dispatch_receiver else {
        return;
    };
    let (getter, setter) = storage_closures(tree, this, field);
    let mut args: Vec<Expr> = decl.params.iter().map(|p| Expr::get(p.id)).collect();
    args.push(getter);
    args.push(setter);
    let type_args = decl
        .type_params
        .iter()
        .chain(&tree.class(holder).type_params)
        .map(|p| TypeRef::Param(*p))
        .collect();
    let call = Expr::static_call(imp, args).with_type_args(type_args);
    let body = match decl.return_type {
        TypeRef::Unit => call,
        _ => Expr::ret(call),
    };
    tree.function_mut(op).body = Some(body);
}

/// Inline the holder behind `property` of `class`.
pub fn inline_use_site(
    tree: &mut Tree,
    class: ClassId,
    property: PropertyId,
    compiled: &ErasableImpl,
) -> Result<(), RewriteError> {
    let prop = tree.property(property).clone();
    let span = prop.span.or(tree.class(class).span);
    let Some(field) = prop.backing_field else {
        return Err(RewriteError::internal(
            format!("delegated property `{}` has no storage", prop.name),
            span,
        ));
    };
    let holder = compiled.holder;
    let holder_name = tree.fq_name(holder);
    let holder_ty = tree.field(field).ty.clone();
    let subst = zip_subst(&tree.class(holder).type_params, holder_ty.args());

    let stored = tree.field(compiled.field).clone();
    let mut initializer = stored.initializer.clone();
    if let Some(init) = initializer.as_mut() {
        let holder_this = tree.class(holder).this_receiver;
        let ctor_params: Vec<ValueId> = tree
            .class(holder)
            .constructor
            .iter()
            .flat_map(|c| c.params.iter().map(|p| p.id))
            .collect();
        if init.uses_value(holder_this) || ctor_params.iter().any(|p| init.uses_value(*p)) {
            return Err(RewriteError::configuration(
                format!(
                    "the field initializer of erasable delegate {holder_name} \
                     must not depend on the instance"
                ),
                span,
            ));
        }
        init.substitute_types(&subst);
    }

    // Calls the accessors made of the holder's operators, captured before
    // the storage changes type.
    let get_call = match prop.getter {
        Some(g) => Some(operator_call(tree, g, compiled.get_value, &prop.name)?),
        None => None,
    };
    let set_call = match (prop.setter, compiled.set_value) {
        (Some(s), Some(set_value)) => Some(operator_call(tree, s, set_value, &prop.name)?),
        (Some(_), None) => {
            return Err(RewriteError::configuration(
                format!(
                    "No setValue operator function found for erasable delegate class {holder_name}"
                ),
                span,
            ))
        }
        (None, _) => None,
    };

    {
        let storage = tree.field_mut(field);
        storage.ty = stored.ty.substitute(&subst);
        storage.initializer = initializer;
        storage.mutable = true;
        storage.origin = Origin::PluginGenerated;
    }
    tree.property_mut(property).is_delegated = false;

    if let (Some(getter), Some((type_args, args))) = (prop.getter, get_call) {
        let this = tree.this_of(getter);
        let call = impl_call(tree, compiled.get_impl, this, field, type_args, args, &holder_ty);
        tree.set_body(getter, Expr::ret(Expr::cast(call, prop.ty.clone())));
    }
    if let (Some(setter), Some((type_args, args)), Some(set_impl)) =
        (prop.setter, set_call, compiled.set_impl)
    {
        let this = tree.this_of(setter);
        let call = impl_call(tree, set_impl, this, field, type_args, args, &holder_ty);
        tree.set_body(setter, call);
    }
    debug!(property = %prop.name, holder = %holder_name, "inlined erasable delegate");
    Ok(())
}

/// Type arguments and arguments of the call of `op` in `accessor`.
fn operator_call(
    tree: &Tree,
    accessor: FunctionId,
    op: FunctionId,
    property: &str,
) -> Result<(Vec<TypeRef>, Vec<Expr>), RewriteError> {
    let found = tree.function(accessor).body.as_ref().and_then(|body| {
        body.find_first(&mut |e| matches!(e, Expr::Call { function, .. } if *function == op))
    });
    match found {
        Some(Expr::Call { type_args, args, .. }) => Ok((type_args.clone(), args.clone())),
        _ => Err(RewriteError::internal(
            format!(
                "accessor of delegated property `{property}` does not call {}",
                tree.function(op).name
            ),
            tree.function(accessor).span,
        )),
    }
}

fn impl_call(
    tree: &mut Tree,
    imp: FunctionId,
    receiver: ValueId,
    field: FieldId,
    type_args: Vec<TypeRef>,
    mut args: Vec<Expr>,
    holder_ty: &TypeRef,
) -> Expr {
    let (getter, setter) = storage_closures(tree, receiver, field);
    args.push(getter);
    args.push(setter);
    let type_args = type_args.into_iter().chain(holder_ty.args().iter().cloned()).collect();
    Expr::static_call(imp, args).with_type_args(type_args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stitch_ir::{ClassKind, Intrinsic};

    fn app() -> Parent {
        Parent::Package("app".into())
    }

    /// ```text
    /// class Cell<T>(var stored: T?) {
    ///     operator fun getValue(thisRef: Any?, property: KProperty<*>): T = stored as T
    /// }
    /// ```
    fn cell(tree: &mut Tree) -> (ClassId, FunctionId) {
        let holder = tree.add_class(app(), "Cell", ClassKind::Class);
        let t = tree.add_class_type_param(holder, "T");
        let stored =
            tree.add_property(holder, "stored", TypeRef::NullableAny, true, Some(Expr::null()));
        let field = tree.property(stored).backing_field.unwrap();
        let get = tree.add_function(Parent::Class(holder), "getValue", TypeRef::Param(t));
        tree.function_mut(get).is_operator = true;
        tree.add_param(get, "thisRef", TypeRef::NullableAny);
        tree.add_param(get, "property", TypeRef::property(TypeRef::NullableAny));
        let this = tree.this_of(get);
        tree.set_body(
            get,
            Expr::ret(Expr::cast(Expr::get_field(Expr::get(this), field), TypeRef::Param(t))),
        );
        (holder, get)
    }

    #[test]
    fn test_impl_reads_through_getter_closure() {
        let mut tree = Tree::new();
        let (holder, get) = cell(&mut tree);
        let compiled = compile_holder(&mut tree, holder).unwrap();
        assert_eq!(compiled.get_value, get);
        assert!(compiled.set_impl.is_none());

        let imp = tree.function(compiled.get_impl).clone();
        assert_eq!(imp.name, "getValue-impl");
        assert!(imp.is_inline);
        assert!(imp.dispatch_receiver.is_none());
        assert_eq!(imp.type_params.len(), 1);
        let names: Vec<&str> = imp.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["thisRef", "property", "getter", "setter"]);
        let body = imp.body.as_ref().unwrap();
        assert!(!body.reads_field(compiled.field));
        assert!(body.find_first(&mut |e| matches!(e, Expr::Invoke { .. })).is_some());
        // The return type refers to the impl's own copy of `T`.
        assert_eq!(imp.return_type, TypeRef::Param(imp.type_params[0]));

        // The holder's operator now delegates to the impl.
        let own = tree.function(get).body.as_ref().unwrap();
        let routed = own.find_first(&mut |e| {
            matches!(e, Expr::Call { function, .. } if *function == compiled.get_impl)
        });
        assert!(routed.is_some());
    }

    #[test]
    fn test_holder_needs_exactly_one_field() {
        let mut tree = Tree::new();
        let (holder, _) = cell(&mut tree);
        tree.add_property(holder, "extra", TypeRef::Int, false, Some(Expr::int(0)));
        let err = compile_holder(&mut tree, holder).unwrap_err();
        assert_eq!(err.message(), "Erasable delegate app.Cell must have a single field");
    }

    #[test]
    fn test_holder_needs_get_value() {
        let mut tree = Tree::new();
        let holder = tree.add_class(app(), "Empty", ClassKind::Class);
        tree.add_property(holder, "stored", TypeRef::Int, false, Some(Expr::int(0)));
        let err = compile_holder(&mut tree, holder).unwrap_err();
        assert_eq!(
            err.message(),
            "No getValue operator function found for erasable delegate class app.Empty"
        );
    }

    #[test]
    fn test_other_uses_of_this_are_rejected() {
        let mut tree = Tree::new();
        let (holder, get) = cell(&mut tree);
        let this = tree.this_of(get);
        tree.set_body(
            get,
            Expr::ret(Expr::intrinsic(Intrinsic::HashCode, vec![Expr::get(this)])),
        );
        let err = compile_holder(&mut tree, holder).unwrap_err();
        assert_eq!(err.code(), "R0001");
    }
}
