//! Proxy delegation.
//!
//! Every interface member becomes a final override that routes through
//! operators the class declares itself: property accessors call
//! `getValue`/`setValue` with a reference to the property, functions call
//! `callMember` with a reference to themselves and a map from parameter
//! name to argument.

use stitch_ir::{
    ClassId, Expr, FunctionId, Intrinsic, Member, Origin, PropertyId, Tree, TypeRef,
};
use tracing::debug;

use crate::error::RewriteError;
use crate::synth::{override_function, override_property};

const CALL_MEMBER_SIGNATURE: &str = "callMember should have exactly this signature:\n\
     fun <T> callMember(thisRef: Any?, member: KCallable<T>, arguments: Map<String, Any?>): T";

/// Operators of the delegating class, looked up when first needed so that
/// a class only has to declare what its interface actually uses.
struct Operators {
    class: ClassId,
    get_value: Option<FunctionId>,
    set_value: Option<FunctionId>,
    call_member: Option<FunctionId>,
}

impl Operators {
    fn new(class: ClassId) -> Self {
        Self {
            class,
            get_value: None,
            set_value: None,
            call_member: None,
        }
    }

    fn get_value(&mut self, tree: &Tree) -> Result<FunctionId, RewriteError> {
        if let Some(f) = self.get_value {
            return Ok(f);
        }
        let f = operator(tree, self.class, "getValue")?;
        self.get_value = Some(f);
        Ok(f)
    }

    fn set_value(&mut self, tree: &Tree) -> Result<FunctionId, RewriteError> {
        if let Some(f) = self.set_value {
            return Ok(f);
        }
        let f = operator(tree, self.class, "setValue")?;
        self.set_value = Some(f);
        Ok(f)
    }

    fn call_member(&mut self, tree: &Tree) -> Result<FunctionId, RewriteError> {
        if let Some(f) = self.call_member {
            return Ok(f);
        }
        let f = find_call_member(tree, self.class)?;
        self.call_member = Some(f);
        Ok(f)
    }
}

fn operator(tree: &Tree, class: ClassId, name: &str) -> Result<FunctionId, RewriteError> {
    tree.functions_named(class, name)
        .into_iter()
        .find(|f| tree.function(*f).is_operator && tree.function(*f).params.len() >= 2)
        .ok_or_else(|| {
            RewriteError::configuration(
                format!("operator fun {name}() not found in class {}", tree.fq_name(class)),
                tree.class(class).span,
            )
        })
}

/// `<T> callMember(Any?, KCallable<T>, Map<String, Any?>): T`, checked
/// structurally.
fn find_call_member(tree: &Tree, class: ClassId) -> Result<FunctionId, RewriteError> {
    let candidates = tree.functions_named(class, "callMember");
    let span = candidates
        .first()
        .map(|f| tree.function(*f).span)
        .unwrap_or(tree.class(class).span);
    candidates
        .into_iter()
        .find(|f| call_member_shape_ok(tree, *f))
        .ok_or_else(|| RewriteError::configuration(CALL_MEMBER_SIGNATURE, span))
}

fn call_member_shape_ok(tree: &Tree, function: FunctionId) -> bool {
    let decl = tree.function(function);
    let ([t], [this_ref, member, arguments]) = (decl.type_params.as_slice(), decl.params.as_slice())
    else {
        return false;
    };
    this_ref.ty == TypeRef::NullableAny
        && tree.is_subtype(&TypeRef::callable(TypeRef::Param(*t)), &member.ty)
        && tree.is_subtype(&TypeRef::argument_map(), &arguments.ty)
}

/// Rewrite `class` so that the members of `iface` go through its proxy
/// operators. Members the class implements itself are kept.
pub fn rewrite_proxy(tree: &mut Tree, class: ClassId, iface: ClassId) -> Result<(), RewriteError> {
    let mut operators = Operators::new(class);
    for member in tree.interface_members(iface) {
        match member {
            Member::Property(target) => {
                if implemented_property(tree, class, target) {
                    continue;
                }
                proxy_property(tree, class, target, &mut operators)?;
            }
            Member::Function(target) => {
                if implemented_function(tree, class, target) {
                    continue;
                }
                proxy_function(tree, class, target, &mut operators)?;
            }
            Member::Field(_) | Member::Class(_) => {}
        }
    }
    Ok(())
}

fn implemented_function(tree: &Tree, class: ClassId, target: FunctionId) -> bool {
    tree.member_overriding(class, target)
        .is_some_and(|f| tree.function(f).origin == Origin::UserDeclared)
}

fn implemented_property(tree: &Tree, class: ClassId, target: PropertyId) -> bool {
    tree.property_overriding(class, target)
        .is_some_and(|p| tree.property(p).origin == Origin::UserDeclared)
}

fn proxy_property(
    tree: &mut Tree,
    class: ClassId,
    target: PropertyId,
    operators: &mut Operators,
) -> Result<(), RewriteError> {
    let property = override_property(tree, class, target)?;
    let decl = tree.property(property).clone();
    debug!(property = %decl.name, "proxying property");

    if let Some(getter) = decl.getter {
        let get_value = operators.get_value(tree)?;
        let this = tree.this_of(getter);
        let reference = tree.fresh_value();
        let type_args = match tree.function(get_value).type_params.len() {
            1 => vec![decl.ty.clone()],
            _ => Vec::new(),
        };
        let call = Expr::member_call(
            get_value,
            Expr::get(this),
            vec![Expr::get(this), Expr::get(reference)],
        )
        .with_type_args(type_args);
        let body = Expr::block(vec![
            Expr::let_(
                reference,
                "ref",
                TypeRef::property(decl.ty.clone()),
                Expr::PropertyRef(property),
            ),
            Expr::ret(Expr::cast(call, decl.ty.clone())),
        ]);
        tree.set_body(getter, body);
    }
    if let Some(setter) = decl.setter {
        let set_value = operators.set_value(tree)?;
        let this = tree.this_of(setter);
        let value = tree.function(setter).params[0].id;
        let reference = tree.fresh_value();
        let type_args = match tree.function(set_value).type_params.len() {
            1 => vec![decl.ty.clone()],
            _ => Vec::new(),
        };
        let call = Expr::member_call(
            set_value,
            Expr::get(this),
            vec![Expr::get(this), Expr::get(reference), Expr::get(value)],
        )
        .with_type_args(type_args);
        let body = Expr::block(vec![
            Expr::let_(
                reference,
                "ref",
                TypeRef::property(decl.ty.clone()),
                Expr::PropertyRef(property),
            ),
            call,
        ]);
        tree.set_body(setter, body);
    }
    Ok(())
}

fn proxy_function(
    tree: &mut Tree,
    class: ClassId,
    target: FunctionId,
    operators: &mut Operators,
) -> Result<(), RewriteError> {
    let call_member = operators.call_member(tree)?;
    let function = override_function(tree, class, target)?;
    let decl = tree.function(function).clone();
    debug!(function = %decl.name, "proxying function");

    let this = tree.this_of(function);
    let reference = tree.fresh_value();
    let arguments = tree.fresh_value();
    let mut body = vec![
        Expr::let_(
            reference,
            "ref",
            TypeRef::callable(decl.return_type.clone()),
            Expr::FunctionRef(function),
        ),
        Expr::let_(
            arguments,
            "argMap",
            TypeRef::argument_map(),
            Expr::intrinsic(Intrinsic::MapOf, Vec::new()),
        ),
    ];
    for param in &decl.params {
        body.push(Expr::intrinsic(
            Intrinsic::MapPut,
            vec![Expr::get(arguments), Expr::str(param.name.clone()), Expr::get(param.id)],
        ));
    }
    let call = Expr::member_call(
        call_member,
        Expr::get(this),
        vec![Expr::get(this), Expr::get(reference), Expr::get(arguments)],
    )
    .with_type_args(vec![decl.return_type.clone()]);
    body.push(Expr::ret(Expr::cast(call, decl.return_type.clone())));
    tree.set_body(function, Expr::block(body));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stitch_ir::lowering::implement_by_delegation;
    use stitch_ir::{ClassKind, Parent};

    fn app() -> Parent {
        Parent::Package("app".into())
    }

    fn add_call_member(
        tree: &mut Tree,
        class: ClassId,
        member_ty: impl Fn(TypeRef) -> TypeRef,
    ) -> FunctionId {
        let f = tree.add_function(Parent::Class(class), "callMember", TypeRef::Unit);
        let t = tree.add_function_type_param(f, "T");
        tree.function_mut(f).return_type = TypeRef::Param(t);
        tree.add_param(f, "thisRef", TypeRef::NullableAny);
        tree.add_param(f, "member", member_ty(TypeRef::Param(t)));
        tree.add_param(f, "arguments", TypeRef::argument_map());
        tree.set_body(f, Expr::throw("unused"));
        f
    }

    fn job_delegate(tree: &mut Tree) -> (ClassId, ClassId) {
        let iface = tree.add_class(app(), "Job", ClassKind::Interface);
        let run = tree.add_function(Parent::Class(iface), "run", TypeRef::Int);
        tree.add_param(run, "times", TypeRef::Int);
        let c = tree.add_class(app(), "C", ClassKind::Class);
        implement_by_delegation(tree, c, iface, vec![], Expr::null());
        (iface, c)
    }

    #[test]
    fn test_call_member_shape_accepts_wider_parameters() {
        let mut tree = Tree::new();
        let (iface, c) = job_delegate(&mut tree);
        // KProperty<T> is narrower than KCallable<T>, so it is rejected;
        // a KCallable<T> parameter is accepted.
        add_call_member(&mut tree, c, TypeRef::property);
        let err = rewrite_proxy(&mut tree.clone(), c, iface).unwrap_err();
        assert_eq!(err.message(), CALL_MEMBER_SIGNATURE);

        add_call_member(&mut tree, c, TypeRef::callable);
        rewrite_proxy(&mut tree, c, iface).unwrap();
        let run = tree.functions_named(c, "run")[0];
        assert_eq!(tree.function(run).origin, Origin::PluginGenerated);
    }

    #[test]
    fn test_missing_get_value_is_reported_by_name() {
        let mut tree = Tree::new();
        let iface = tree.add_class(app(), "Sized", ClassKind::Interface);
        tree.add_property(iface, "size", TypeRef::Long, false, None);
        let c = tree.add_class(app(), "C", ClassKind::Class);
        implement_by_delegation(&mut tree, c, iface, vec![], Expr::null());
        let err = rewrite_proxy(&mut tree, c, iface).unwrap_err();
        assert_eq!(err.message(), "operator fun getValue() not found in class app.C");
    }

    #[test]
    fn test_user_override_is_kept() {
        let mut tree = Tree::new();
        let iface = tree.add_class(app(), "Job", ClassKind::Interface);
        tree.add_function(Parent::Class(iface), "run", TypeRef::Int);
        let c = tree.add_class(app(), "C", ClassKind::Class);
        let own = tree.add_function(Parent::Class(c), "run", TypeRef::Int);
        tree.set_body(own, Expr::ret(Expr::int(1)));
        implement_by_delegation(&mut tree, c, iface, vec![], Expr::null());
        // No callMember needed: nothing is proxied.
        rewrite_proxy(&mut tree, c, iface).unwrap();
        assert_eq!(tree.functions_named(c, "run"), vec![own]);
    }
}
