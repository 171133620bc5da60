//! Structural members for data-like classes.
//!
//! `equals`, `hashCode` and `toString` are generated from the class's
//! stored properties, in declaration order, unless the class defines them
//! itself. `compareTo` is generated only when the class declares it
//! through a comparable supertype without implementing it.

use stitch_ir::{BinOp, ClassId, Expr, FunctionId, Intrinsic, Origin, PropertyId, Tree, TypeRef};
use tracing::debug;

use crate::error::RewriteError;
use crate::synth::override_function;

/// Generate the structural members of `class`. Returns the new functions.
pub fn generate_data_members(
    tree: &mut Tree,
    class: ClassId,
) -> Result<Vec<FunctionId>, RewriteError> {
    tree.add_fake_overrides(class);
    let values: Vec<PropertyId> = tree
        .class(class)
        .properties()
        .filter(|p| {
            let decl = tree.property(*p);
            decl.origin == Origin::UserDeclared && decl.backing_field.is_some()
        })
        .collect();

    let mut generated = Vec::new();
    for name in ["equals", "hashCode", "toString"] {
        let base = any_member(tree, name)?;
        let explicit = tree
            .member_overriding(class, base)
            .is_some_and(|f| tree.function(f).origin != Origin::FakeOverride);
        if explicit {
            continue;
        }
        let function = override_function(tree, class, base)?;
        let body = match name {
            "equals" => equals_body(tree, class, function, &values),
            "hashCode" => hash_code_body(tree, function, &values),
            _ => to_string_body(tree, class, function, &values),
        };
        tree.set_body(function, body);
        generated.push(function);
    }

    if let Some(declared) = unimplemented_compare_to(tree, class) {
        let function = override_function(tree, class, declared)?;
        let body = compare_to_body(tree, function, &values);
        tree.set_body(function, body);
        generated.push(function);
    }
    debug!(class = %tree.fq_name(class), members = generated.len(), "generated data-like members");
    Ok(generated)
}

fn any_member(tree: &Tree, name: &str) -> Result<FunctionId, RewriteError> {
    let any = tree.any_class();
    tree.functions_named(any, name)
        .first()
        .copied()
        .ok_or_else(|| {
            RewriteError::internal(format!("Any.{name} is missing"), tree.class(any).span)
        })
}

fn unimplemented_compare_to(tree: &Tree, class: ClassId) -> Option<FunctionId> {
    let this_ty = tree.this_type(class);
    tree.functions_named(class, "compareTo").into_iter().find(|f| {
        let decl = tree.function(*f);
        decl.params.len() == 1
            && decl.params[0].ty == this_ty
            && tree.implementation_of(*f).is_none()
    })
}

fn read(tree: &Tree, receiver: Expr, property: PropertyId) -> Expr {
    match tree.property(property).getter {
        Some(getter) => Expr::member_call(getter, receiver, Vec::new()),
        None => Expr::unit(),
    }
}

/// ```text
/// if (this === other) return true
/// if (other !is C) return false
/// return this.a == (other as C).a && ...
/// ```
fn equals_body(tree: &Tree, class: ClassId, function: FunctionId, values: &[PropertyId]) -> Expr {
    let this = tree.this_of(function);
    let other = tree.function(function).params[0].id;
    let this_ty = tree.this_type(class);
    let same = values
        .iter()
        .map(|p| {
            Expr::binary(
                BinOp::Eq,
                read(tree, Expr::get(this), *p),
                read(tree, Expr::cast(Expr::get(other), this_ty.clone()), *p),
            )
        })
        .reduce(|acc, next| Expr::binary(BinOp::And, acc, next))
        .unwrap_or_else(|| Expr::bool(true));
    Expr::block(vec![
        Expr::if_else(
            Expr::binary(BinOp::Identical, Expr::get(this), Expr::get(other)),
            Expr::ret(Expr::bool(true)),
            Expr::unit(),
        ),
        Expr::if_else(
            Expr::not(Expr::is(Expr::get(other), class)),
            Expr::ret(Expr::bool(false)),
            Expr::unit(),
        ),
        Expr::ret(same),
    ])
}

/// `31 * (31 * a.hashCode() + b.hashCode()) + ...`
fn hash_code_body(tree: &Tree, function: FunctionId, values: &[PropertyId]) -> Expr {
    let this = tree.this_of(function);
    let hash = values
        .iter()
        .map(|p| Expr::intrinsic(Intrinsic::HashCode, vec![read(tree, Expr::get(this), *p)]))
        .reduce(|acc, next| {
            Expr::binary(BinOp::Add, Expr::binary(BinOp::Mul, acc, Expr::int(31)), next)
        })
        .unwrap_or_else(|| Expr::int(0));
    Expr::ret(hash)
}

/// `"C(a=" + a + ", b=" + b + ")"`
fn to_string_body(
    tree: &Tree,
    class: ClassId,
    function: FunctionId,
    values: &[PropertyId],
) -> Expr {
    let this = tree.this_of(function);
    let mut literal = format!("{}(", tree.class(class).name);
    let mut text: Option<Expr> = None;
    for (i, p) in values.iter().enumerate() {
        if i > 0 {
            literal.push_str(", ");
        }
        literal.push_str(&format!("{}=", tree.property(*p).name));
        let value = Expr::intrinsic(Intrinsic::ToString, vec![read(tree, Expr::get(this), *p)]);
        let head = concat(text.take(), Expr::str(std::mem::take(&mut literal)));
        text = Some(Expr::binary(BinOp::Add, head, value));
    }
    literal.push(')');
    Expr::ret(concat(text, Expr::str(literal)))
}

fn concat(lhs: Option<Expr>, rhs: Expr) -> Expr {
    match lhs {
        Some(lhs) => Expr::binary(BinOp::Add, lhs, rhs),
        None => rhs,
    }
}

/// Lexicographic comparison over the stored properties.
fn compare_to_body(tree: &mut Tree, function: FunctionId, values: &[PropertyId]) -> Expr {
    let this = tree.this_of(function);
    let other = tree.function(function).params[0].id;
    let mut stmts = Vec::new();
    for p in values {
        let local = tree.fresh_value();
        let compared = Expr::intrinsic(
            Intrinsic::Compare,
            vec![read(tree, Expr::get(this), *p), read(tree, Expr::get(other), *p)],
        );
        stmts.push(Expr::let_(local, "cmp", TypeRef::Int, compared));
        stmts.push(Expr::if_else(
            Expr::binary(BinOp::NotEq, Expr::get(local), Expr::int(0)),
            Expr::ret(Expr::get(local)),
            Expr::unit(),
        ));
    }
    stmts.push(Expr::ret(Expr::int(0)));
    Expr::block(stmts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stitch_ir::printer::print_function;
    use stitch_ir::{ClassKind, Parent};

    fn point(tree: &mut Tree) -> ClassId {
        let c = tree.add_class(Parent::Package("app".into()), "Point", ClassKind::Class);
        tree.add_property(c, "x", TypeRef::Int, false, Some(Expr::int(0)));
        tree.add_property(c, "y", TypeRef::Int, false, Some(Expr::int(0)));
        c
    }

    #[test]
    fn test_generates_three_members() {
        let mut tree = Tree::new();
        let c = point(&mut tree);
        let generated = generate_data_members(&mut tree, c).unwrap();
        let names: Vec<&str> = generated.iter().map(|f| tree.function(*f).name.as_str()).collect();
        assert_eq!(names, vec!["equals", "hashCode", "toString"]);
        for f in generated {
            assert_eq!(tree.function(f).origin, Origin::PluginGenerated);
            assert_eq!(tree.functions_named(c, &tree.function(f).name).len(), 1);
        }
    }

    #[test]
    fn test_explicit_to_string_is_kept() {
        let mut tree = Tree::new();
        let c = point(&mut tree);
        let own = tree.add_function(Parent::Class(c), "toString", TypeRef::String);
        tree.set_body(own, Expr::ret(Expr::str("P")));
        let generated = generate_data_members(&mut tree, c).unwrap();
        assert_eq!(generated.len(), 2);
        assert_eq!(tree.functions_named(c, "toString"), vec![own]);
    }

    #[test]
    fn test_to_string_shape() {
        let mut tree = Tree::new();
        let c = point(&mut tree);
        generate_data_members(&mut tree, c).unwrap();
        let f = tree.functions_named(c, "toString")[0];
        insta::assert_snapshot!(print_function(&tree, f), @r###"
        /* generated */ override fun toString(): String {
          return ((("Point(x=" + this.x.toString()) + ", y=") + this.y.toString()) + ")"
        }
        "###);
    }
}
