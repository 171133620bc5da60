//! Interpreter behaviour on hand-built trees.

use stitch_eval::{EvalError, Interpreter, Value};
use stitch_ir::{
    BinOp, ClassKind, Expr, Intrinsic, Modality, Parent, Tree, TypeRef, ValueParam,
};

// ── Helpers ────────────────────────────────────────────────────────────

fn pkg() -> Parent {
    Parent::Package("demo".into())
}

/// `class Counter { var count: Int = start; fun bump(by: Int = 1): Int }`
fn counter_tree(start: i64) -> Tree {
    let mut tree = Tree::new();
    let c = tree.add_class(pkg(), "Counter", ClassKind::Class);
    tree.add_property(c, "count", TypeRef::Int, true, Some(Expr::int(start)));
    let count = tree.property_named(c, "count").unwrap();
    let getter = tree.property(count).getter.unwrap();
    let setter = tree.property(count).setter.unwrap();

    let bump = tree.add_function(Parent::Class(c), "bump", TypeRef::Int);
    let by = tree.add_param(bump, "by", TypeRef::Int);
    tree.function_mut(bump).params[0].default = Some(Expr::int(1));
    let this = tree.this_of(bump);
    tree.set_body(
        bump,
        Expr::block(vec![
            Expr::member_call(
                setter,
                Expr::get(this),
                vec![Expr::binary(
                    BinOp::Add,
                    Expr::member_call(getter, Expr::get(this), Vec::new()),
                    Expr::get(by),
                )],
            ),
            Expr::ret(Expr::member_call(getter, Expr::get(this), Vec::new())),
        ]),
    );
    tree
}

// ── Tests ──────────────────────────────────────────────────────────────

#[test]
fn test_fields_initialise_and_defaults_apply() {
    let tree = counter_tree(10);
    let class = tree.find_class("demo.Counter").unwrap();
    let mut interp = Interpreter::new(&tree);
    let counter = interp.instantiate(class, Vec::new()).unwrap();

    assert_eq!(interp.get(&counter, "count").unwrap().as_int(), Some(10));
    assert_eq!(interp.call(&counter, "bump", vec![]).unwrap().as_int(), Some(11));
    assert_eq!(
        interp.call(&counter, "bump", vec![Value::Int(5)]).unwrap().as_int(),
        Some(16)
    );
    interp.set(&counter, "count", Value::Int(0)).unwrap();
    assert_eq!(interp.get(&counter, "count").unwrap().as_int(), Some(0));
}

#[test]
fn test_unknown_member_is_reported() {
    let tree = counter_tree(0);
    let class = tree.find_class("demo.Counter").unwrap();
    let mut interp = Interpreter::new(&tree);
    let counter = interp.instantiate(class, Vec::new()).unwrap();
    let err = interp.call(&counter, "missing", vec![]).unwrap_err();
    assert!(matches!(err, EvalError::UnknownMember { .. }), "{err}");
}

#[test]
fn test_virtual_dispatch_reaches_override() {
    let mut tree = Tree::new();
    let base = tree.add_class(pkg(), "Base", ClassKind::Class);
    tree.class_mut(base).modality = Modality::Open;
    let name = tree.add_function(Parent::Class(base), "name", TypeRef::String);
    tree.function_mut(name).modality = Modality::Open;
    tree.set_body(name, Expr::ret(Expr::str("base")));
    let describe = tree.add_function(Parent::Class(base), "describe", TypeRef::String);
    let this = tree.this_of(describe);
    tree.set_body(
        describe,
        Expr::ret(Expr::binary(
            BinOp::Add,
            Expr::str("I am "),
            Expr::member_call(name, Expr::get(this), Vec::new()),
        )),
    );

    let derived = tree.add_class(pkg(), "Derived", ClassKind::Class);
    tree.class_mut(derived).supertypes = vec![TypeRef::class(base)];
    let own = tree.add_function(Parent::Class(derived), "name", TypeRef::String);
    tree.set_body(own, Expr::ret(Expr::str("derived")));
    stitch_ir::lowering::complete_hierarchy(&mut tree);

    let mut interp = Interpreter::new(&tree);
    let obj = interp.instantiate(derived, Vec::new()).unwrap();
    let text = interp.call(&obj, "describe", vec![]).unwrap();
    assert_eq!(interp.to_display_string(&text).unwrap(), "I am derived");
}

#[test]
fn test_lazy_producer_runs_once() {
    // class Box { var runs: Int = 0; val cell = lazy { runs = runs + 1; 42 } }
    let mut tree = Tree::new();
    let c = tree.add_class(pkg(), "Box", ClassKind::Class);
    let this = tree.class(c).this_receiver;
    let runs = tree.add_field(
        c,
        "runs",
        TypeRef::Int,
        Some(Expr::int(0)),
        stitch_ir::Origin::UserDeclared,
    );
    let producer = Expr::lambda(
        Vec::new(),
        TypeRef::Int,
        Expr::block(vec![
            Expr::set_field(
                Expr::get(this),
                runs,
                Expr::binary(BinOp::Add, Expr::get_field(Expr::get(this), runs), Expr::int(1)),
            ),
            Expr::int(42),
        ]),
    );
    let cell = tree.add_field(
        c,
        "cell",
        TypeRef::lazy(TypeRef::Int),
        Some(Expr::intrinsic(Intrinsic::LazyOf, vec![producer])),
        stitch_ir::Origin::UserDeclared,
    );
    let read = tree.add_function(Parent::Class(c), "read", TypeRef::Int);
    let recv = tree.this_of(read);
    tree.set_body(
        read,
        Expr::ret(Expr::intrinsic(
            Intrinsic::LazyValue,
            vec![Expr::get_field(Expr::get(recv), cell)],
        )),
    );

    let mut interp = Interpreter::new(&tree);
    let obj = interp.instantiate(c, Vec::new()).unwrap();
    let object = obj.as_object().unwrap().clone();
    assert_eq!(object.field(runs).unwrap().as_int(), Some(0));
    for _ in 0..3 {
        assert_eq!(interp.call(&obj, "read", vec![]).unwrap().as_int(), Some(42));
    }
    assert_eq!(object.field(runs).unwrap().as_int(), Some(1));
}

#[test]
fn test_throw_surfaces_message_and_closures_capture() {
    // fun check(x: Int): Int = { y -> if (y < 0) throw "negative" else y }(x)
    let mut tree = Tree::new();
    let check = tree.add_function(pkg(), "check", TypeRef::Int);
    let x = tree.add_param(check, "x", TypeRef::Int);
    let y = tree.fresh_value();
    let lambda = Expr::lambda(
        vec![ValueParam::new(y, "y", TypeRef::Int)],
        TypeRef::Int,
        Expr::if_else(
            Expr::binary(BinOp::Lt, Expr::get(y), Expr::int(0)),
            Expr::throw("negative"),
            Expr::get(y),
        ),
    );
    tree.set_body(check, Expr::ret(Expr::invoke(lambda, vec![Expr::get(x)])));

    let mut interp = Interpreter::new(&tree);
    assert_eq!(interp.call_static(check, vec![Value::Int(4)]).unwrap().as_int(), Some(4));
    let err = interp.call_static(check, vec![Value::Int(-1)]).unwrap_err();
    assert_eq!(err.thrown_message(), Some("negative"));
}

#[test]
fn test_maps_keep_insertion_order_and_replace() {
    let mut tree = Tree::new();
    let f = tree.add_function(pkg(), "build", TypeRef::argument_map());
    let m = tree.fresh_value();
    tree.set_body(
        f,
        Expr::block(vec![
            Expr::let_(m, "m", TypeRef::argument_map(), Expr::intrinsic(Intrinsic::MapOf, vec![])),
            Expr::intrinsic(Intrinsic::MapPut, vec![Expr::get(m), Expr::str("b"), Expr::int(1)]),
            Expr::intrinsic(Intrinsic::MapPut, vec![Expr::get(m), Expr::str("a"), Expr::int(2)]),
            Expr::intrinsic(Intrinsic::MapPut, vec![Expr::get(m), Expr::str("b"), Expr::int(3)]),
            Expr::ret(Expr::get(m)),
        ]),
    );
    let mut interp = Interpreter::new(&tree);
    let Value::Map(map) = interp.call_static(f, vec![]).unwrap() else {
        panic!("expected a map");
    };
    let entries: Vec<(String, i64)> = map
        .borrow()
        .iter()
        .map(|(k, v)| (format!("{k:?}"), v.as_int().unwrap()))
        .collect();
    assert_eq!(entries, vec![("\"b\"".to_string(), 3), ("\"a\"".to_string(), 2)]);
}
