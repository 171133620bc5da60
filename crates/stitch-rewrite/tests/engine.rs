//! Pass-level behaviour: untouched units, failure reporting, configuration
//! and data-like classes.

use std::io::Write;

use stitch_common::diagnostic::{Diagnostic, Severity};
use stitch_common::span::Span;
use stitch_eval::{Interpreter, Value};
use stitch_ir::lowering::{delegate_property, implement_by_delegation};
use stitch_ir::{
    ClassId, ClassKind, Constructor, Expr, FunctionId, Parent, Tree, TypeRef, ValueParam,
};
use stitch_rewrite::config::ConfigError;
use stitch_rewrite::diagnostics::render_error;
use stitch_rewrite::{rewrite_file, RewriteConfig, RewriteError, RewriteSummary, TriggerSet};

// ── Helpers ────────────────────────────────────────────────────────────

fn app() -> Parent {
    Parent::Package("app".into())
}

fn run(
    tree: &mut Tree,
    config: &RewriteConfig,
) -> (Result<RewriteSummary, RewriteError>, Vec<Diagnostic>) {
    let triggers = TriggerSet::resolve(tree, config);
    let mut sink: Vec<Diagnostic> = Vec::new();
    let result = rewrite_file(tree, &triggers, config, &mut sink);
    (result, sink)
}

fn proxy_marker(tree: &mut Tree, package: &str) -> FunctionId {
    tree.add_function(Parent::Package(package.into()), "proxyDelegate", TypeRef::Any)
}

/// `class Sized : Measured by proxyDelegate()` where `Measured` only has
/// `val size: Long` and the class answers it with `getValue`.
fn sized_proxy(tree: &mut Tree, marker: FunctionId) -> ClassId {
    let measured = tree.add_class(app(), "Measured", ClassKind::Interface);
    tree.add_property(measured, "size", TypeRef::Long, false, None);
    let class = tree.add_class(app(), "Sized", ClassKind::Class);
    let get_value = tree.add_function(Parent::Class(class), "getValue", TypeRef::NullableAny);
    tree.function_mut(get_value).is_operator = true;
    tree.add_param(get_value, "thisRef", TypeRef::NullableAny);
    tree.add_param(get_value, "property", TypeRef::property(TypeRef::NullableAny));
    tree.set_body(get_value, Expr::ret(Expr::long(9)));
    let init = Expr::static_call(marker, Vec::new());
    implement_by_delegation(tree, class, measured, Vec::new(), init);
    class
}

fn assert_unique_signatures(tree: &Tree, class: ClassId) {
    let mut seen: Vec<(String, Vec<TypeRef>)> = Vec::new();
    for f in tree.class(class).functions() {
        let decl = tree.function(f);
        let key = (decl.name.clone(), decl.param_types());
        assert!(!seen.contains(&key), "duplicate member {key:?}");
        seen.push(key);
    }
}

// ── Pass-through ───────────────────────────────────────────────────────

#[test]
fn test_unit_without_markers_is_unchanged() {
    let mut tree = Tree::new();
    proxy_marker(&mut tree, "stitch");
    let job = tree.add_class(app(), "Job", ClassKind::Interface);
    tree.add_function(Parent::Class(job), "run", TypeRef::Unit);
    let worker = tree.add_class(app(), "Worker", ClassKind::Class);
    let run_fn = tree.add_function(Parent::Class(worker), "run", TypeRef::Unit);
    tree.class_mut(worker).supertypes.push(TypeRef::class(job));
    tree.set_body(run_fn, Expr::unit());
    let plain = tree.add_class(app(), "Plain", ClassKind::Class);
    let init = Expr::new_object(worker, Vec::new());
    implement_by_delegation(&mut tree, plain, job, Vec::new(), init);

    let before = tree.clone();
    let (result, sink) = run(&mut tree, &RewriteConfig::default());
    assert!(result.unwrap().is_empty());
    assert!(sink.is_empty());
    assert_eq!(tree, before);
}

// ── Failures ───────────────────────────────────────────────────────────

#[test]
fn test_ambiguous_forwarder_is_reported_at_the_field() {
    let mut tree = Tree::new();
    let marker = proxy_marker(&mut tree, "stitch");
    let first = tree.add_class(app(), "First", ClassKind::Interface);
    tree.add_function(Parent::Class(first), "run", TypeRef::Unit);
    let second = tree.add_class(app(), "Second", ClassKind::Interface);
    let second_run = tree.add_function(Parent::Class(second), "run", TypeRef::Unit);

    let class = tree.add_class(app(), "Both", ClassKind::Class);
    tree.class_mut(class).supertypes.push(TypeRef::class(second));
    let init = Expr::static_call(marker, Vec::new());
    let field = implement_by_delegation(&mut tree, class, first, Vec::new(), init);
    tree.field_mut(field).span = Span::new(40, 55);
    let forwarder = tree.functions_named(class, "run")[0];
    tree.add_function_override(forwarder, second_run);

    let (result, sink) = run(&mut tree, &RewriteConfig::default());
    let err = result.unwrap_err();
    assert!(matches!(err, RewriteError::Ambiguity { .. }), "{err:?}");
    assert_eq!(sink.len(), 1);
    assert_eq!(sink[0].severity, Severity::Error);
    assert!(
        sink[0].message.contains("candidates are app.First, app.Second"),
        "{}",
        sink[0].message
    );
    assert_eq!(sink[0].span, Some(Span::new(40, 55)));
}

#[test]
fn test_missing_call_member_is_a_configuration_error() {
    let source = "class Service : Runnable by proxyDelegate() {\n    fun stop() {}\n}\n";
    let mut tree = Tree::new();
    let marker = proxy_marker(&mut tree, "stitch");
    let runnable = tree.add_class(app(), "Runnable", ClassKind::Interface);
    tree.add_function(Parent::Class(runnable), "start", TypeRef::Unit);
    let service = tree.add_class(app(), "Service", ClassKind::Class);
    tree.class_mut(service).span = Span::new(0, 64);
    let init = Expr::static_call(marker, Vec::new());
    let field = implement_by_delegation(&mut tree, service, runnable, Vec::new(), init);
    tree.field_mut(field).span = Span::new(28, 43);

    let (result, sink) = run(&mut tree, &RewriteConfig::default());
    let err = result.unwrap_err();
    assert_eq!(err.code(), "R0001");
    assert!(err.message().starts_with("callMember should have exactly this signature"));
    assert_eq!(sink.len(), 1);
    assert!(sink[0].is_error());

    let rendered = render_error(&err, source, "service.kt");
    assert!(rendered.contains("[R0001]"), "{rendered}");
    assert!(rendered.contains("service.kt"));
}

// ── Configuration ──────────────────────────────────────────────────────

#[test]
fn test_markers_come_from_the_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "markers = [\"acme.proxyDelegate\"]").unwrap();
    let config = RewriteConfig::from_file(file.path()).unwrap();

    // The default package is no longer a trigger.
    let mut tree = Tree::new();
    let default_marker = proxy_marker(&mut tree, "stitch");
    sized_proxy(&mut tree, default_marker);
    let (result, _) = run(&mut tree, &config);
    assert!(result.unwrap().rewritten.is_empty());

    let mut tree = Tree::new();
    let acme = proxy_marker(&mut tree, "acme");
    let class = sized_proxy(&mut tree, acme);
    let (result, sink) = run(&mut tree, &config);
    assert_eq!(result.unwrap().rewritten.len(), 1);
    assert!(sink.is_empty());

    let mut interp = Interpreter::new(&tree);
    let instance = interp.instantiate(class, Vec::new()).unwrap();
    assert_eq!(interp.get(&instance, "size").unwrap().as_int(), Some(9));
}

#[test]
fn test_bad_config_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "marker = 3").unwrap();
    let err = RewriteConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)), "{err}");

    let dir = tempfile::tempdir().unwrap();
    let err = RewriteConfig::from_file(&dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "{err}");
}

#[test]
fn test_dump_reports_rewritten_class_as_warning() {
    let mut tree = Tree::new();
    let marker = proxy_marker(&mut tree, "stitch");
    sized_proxy(&mut tree, marker);
    let config = RewriteConfig {
        dump_rewritten: true,
        ..RewriteConfig::default()
    };
    let (result, sink) = run(&mut tree, &config);
    result.unwrap();
    assert_eq!(sink.len(), 1);
    assert_eq!(sink[0].severity, Severity::Warning);
    assert!(sink[0].message.contains("class Sized"), "{}", sink[0].message);
    assert!(sink[0].message.contains("getValue"));
}

#[test]
fn test_dump_shows_inlined_erasable_accessors() {
    let mut tree = Tree::new();
    let stitch = Parent::Package("stitch".into());
    let erasable = tree.add_class(stitch, "ErasableDelegate", ClassKind::AnnotationClass);
    let holder = tree.add_class(app(), "Cell", ClassKind::Class);
    tree.class_mut(holder).annotations.push(erasable);
    let t = tree.add_class_type_param(holder, "T");
    let stored =
        tree.add_property(holder, "stored", TypeRef::NullableAny, true, Some(Expr::null()));
    let field = tree.property(stored).backing_field.unwrap();
    let get_value = tree.add_function(Parent::Class(holder), "getValue", TypeRef::Param(t));
    tree.function_mut(get_value).is_operator = true;
    tree.add_param(get_value, "thisRef", TypeRef::NullableAny);
    tree.add_param(get_value, "property", TypeRef::property(TypeRef::NullableAny));
    let this = tree.this_of(get_value);
    tree.set_body(
        get_value,
        Expr::ret(Expr::cast(Expr::get_field(Expr::get(this), field), TypeRef::Param(t))),
    );

    let account = tree.add_class(app(), "Account", ClassKind::Class);
    delegate_property(
        &mut tree,
        account,
        "name",
        TypeRef::String,
        false,
        Expr::new_object(holder, Vec::new()).with_type_args(vec![TypeRef::String]),
        TypeRef::generic(holder, vec![TypeRef::String]),
    )
    .unwrap();

    let config = RewriteConfig {
        dump_rewritten: true,
        ..RewriteConfig::default()
    };
    let (result, sink) = run(&mut tree, &config);
    result.unwrap();
    let dump = sink
        .iter()
        .find(|d| d.message.contains("class Account"))
        .expect("no dump for the using class");
    assert_eq!(dump.severity, Severity::Warning);
    assert!(dump.message.contains("getValue-impl"), "{}", dump.message);
    assert!(!dump.message.contains("Cell"), "{}", dump.message);
}

// ── Data-like ──────────────────────────────────────────────────────────

/// ```text
/// @DataLike class Point(x: Int, y: Int) : Comparable<Point> {
///     val x = x
///     val y = y
/// }
/// ```
fn point_unit() -> (Tree, ClassId) {
    let mut tree = Tree::new();
    let stitch = Parent::Package("stitch".into());
    let data_like = tree.add_class(stitch, "DataLike", ClassKind::AnnotationClass);
    let kotlin = Parent::Package("kotlin".into());
    let comparable = tree.add_class(kotlin, "Comparable", ClassKind::Interface);
    let t = tree.add_class_type_param(comparable, "T");
    let compare_to = tree.add_function(Parent::Class(comparable), "compareTo", TypeRef::Int);
    tree.add_param(compare_to, "other", TypeRef::Param(t));

    let point = tree.add_class(app(), "Point", ClassKind::Class);
    tree.class_mut(point).annotations.push(data_like);
    tree.class_mut(point)
        .supertypes
        .push(TypeRef::generic(comparable, vec![TypeRef::class(point)]));
    let x = tree.fresh_value();
    let y = tree.fresh_value();
    tree.class_mut(point).constructor = Some(Constructor {
        params: vec![ValueParam::new(x, "x", TypeRef::Int), ValueParam::new(y, "y", TypeRef::Int)],
        super_call: None,
    });
    tree.add_property(point, "x", TypeRef::Int, false, Some(Expr::get(x)));
    tree.add_property(point, "y", TypeRef::Int, false, Some(Expr::get(y)));
    (tree, point)
}

#[test]
fn test_data_like_members_compare_structurally() {
    let (mut tree, point) = point_unit();
    let (result, sink) = run(&mut tree, &RewriteConfig::default());
    let summary = result.unwrap();
    assert!(sink.is_empty());
    assert_eq!(summary.data_like, vec![point]);
    assert_unique_signatures(&tree, point);

    let mut interp = Interpreter::new(&tree);
    let a = interp.instantiate(point, vec![Value::Int(1), Value::Int(2)]).unwrap();
    let b = interp.instantiate(point, vec![Value::Int(1), Value::Int(2)]).unwrap();
    let c = interp.instantiate(point, vec![Value::Int(1), Value::Int(3)]).unwrap();

    assert!(matches!(interp.call(&a, "equals", vec![b.clone()]), Ok(Value::Bool(true))));
    assert!(matches!(interp.call(&a, "equals", vec![c.clone()]), Ok(Value::Bool(false))));
    let ha = interp.call(&a, "hashCode", vec![]).unwrap().as_int();
    let hb = interp.call(&b, "hashCode", vec![]).unwrap().as_int();
    assert!(ha.is_some());
    assert_eq!(ha, hb);

    match interp.call(&a, "toString", vec![]) {
        Ok(Value::Str(s)) => assert_eq!(&*s, "Point(x=1, y=2)"),
        other => panic!("unexpected toString result {other:?}"),
    }

    let ordering: Vec<Option<i64>> = [(&a, &c), (&a, &b), (&c, &a)]
        .into_iter()
        .map(|(l, r)| interp.call(l, "compareTo", vec![r.clone()]).unwrap().as_int())
        .collect();
    assert_eq!(ordering, vec![Some(-1), Some(0), Some(1)]);
}

#[test]
fn test_data_like_needs_its_marker() {
    let (mut tree, point) = point_unit();
    let config = RewriteConfig {
        markers: vec!["stitch.proxyDelegate".into()],
        ..RewriteConfig::default()
    };
    let before = tree.clone();
    let (result, _) = run(&mut tree, &config);
    assert!(result.unwrap().data_like.is_empty());
    assert_eq!(tree.class(point), before.class(point));
}
