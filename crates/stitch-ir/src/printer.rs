//! Kotlin-like rendering of declarations, expressions and types.
//!
//! Used for rewritten-class dumps and in tests. Non-user declarations are
//! tagged with their origin (`/* fake */`, `/* delegated */`, ...). Field
//! accesses print as `receiver.#field` to tell them apart from property
//! accessor calls.

use rustc_hash::FxHashMap;

use crate::decl::{ClassKind, Modality, Origin};
use crate::expr::{Const, Expr, Intrinsic};
use crate::ids::{ClassId, FieldId, FunctionId, Member, PropertyId, ValueId};
use crate::tree::Tree;
use crate::ty::TypeRef;

const INDENT: &str = "  ";

/// Render a class and everything nested in it.
pub fn print_class(tree: &Tree, class: ClassId) -> String {
    let mut p = Printer::new(tree);
    p.class(class);
    p.out
}

/// Render every top-level declaration of the unit.
pub fn print_tree(tree: &Tree) -> String {
    let mut p = Printer::new(tree);
    for member in tree.top_level() {
        p.member(*member);
    }
    p.out
}

pub fn print_function(tree: &Tree, function: FunctionId) -> String {
    let mut p = Printer::new(tree);
    p.function(function, "fun");
    p.out
}

pub fn print_expr(tree: &Tree, expr: &Expr) -> String {
    Printer::new(tree).expr(expr)
}

pub fn print_type(tree: &Tree, ty: &TypeRef) -> String {
    match ty {
        TypeRef::Any => "Any".into(),
        TypeRef::NullableAny => "Any?".into(),
        TypeRef::Unit => "Unit".into(),
        TypeRef::Nothing => "Nothing".into(),
        TypeRef::Bool => "Boolean".into(),
        TypeRef::Int => "Int".into(),
        TypeRef::Long => "Long".into(),
        TypeRef::Double => "Double".into(),
        TypeRef::String => "String".into(),
        TypeRef::Class { class, args } => {
            format!("{}{}", tree.class(*class).name, type_args(tree, args))
        }
        TypeRef::Param(p) => tree.type_param(*p).name.clone(),
        TypeRef::Function { params, ret } => {
            let params: Vec<String> = params.iter().map(|t| print_type(tree, t)).collect();
            format!("({}) -> {}", params.join(", "), print_type(tree, ret))
        }
        TypeRef::Lazy(t) => format!("Lazy<{}>", print_type(tree, t)),
        TypeRef::Map(k, v) => format!("Map<{}, {}>", print_type(tree, k), print_type(tree, v)),
        TypeRef::Callable(t) => format!("KCallable<{}>", print_type(tree, t)),
        TypeRef::Property(t) => format!("KProperty<{}>", print_type(tree, t)),
    }
}

fn type_args(tree: &Tree, args: &[TypeRef]) -> String {
    if args.is_empty() {
        return String::new();
    }
    let args: Vec<String> = args.iter().map(|t| print_type(tree, t)).collect();
    format!("<{}>", args.join(", "))
}

fn origin_tag(origin: Origin) -> &'static str {
    match origin {
        Origin::UserDeclared => "",
        Origin::DelegateStorage => "/* delegate */ ",
        Origin::PropertyDelegate => "/* property delegate */ ",
        Origin::DelegatedMember => "/* delegated */ ",
        Origin::FakeOverride => "/* fake */ ",
        Origin::PluginGenerated => "/* generated */ ",
    }
}

struct Printer<'a> {
    tree: &'a Tree,
    names: FxHashMap<ValueId, String>,
    out: String,
    depth: usize,
}

impl<'a> Printer<'a> {
    fn new(tree: &'a Tree) -> Self {
        Self {
            tree,
            names: FxHashMap::default(),
            out: String::new(),
            depth: 0,
        }
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn member(&mut self, member: Member) {
        match member {
            Member::Class(c) => self.class(c),
            Member::Function(f) => self.function(f, "fun"),
            Member::Property(p) => self.property(p),
            Member::Field(f) => self.field(f),
        }
    }

    fn class(&mut self, class: ClassId) {
        let tree = self.tree;
        let decl = tree.class(class);
        for annotation in &decl.annotations {
            self.line(&format!("@{}", tree.class(*annotation).name));
        }
        let kind = match decl.kind {
            ClassKind::Class => match decl.modality {
                Modality::Final => "class",
                Modality::Open => "open class",
                Modality::Abstract => "abstract class",
            },
            ClassKind::Interface => "interface",
            ClassKind::AnnotationClass => "annotation class",
        };
        let params: Vec<String> = decl
            .type_params
            .iter()
            .map(|p| tree.type_param(*p).name.clone())
            .collect();
        let mut header = format!("{}{kind} {}", origin_tag(decl.origin), decl.name);
        if !params.is_empty() {
            header.push_str(&format!("<{}>", params.join(", ")));
        }
        if let Some(ctor) = &decl.constructor {
            if !ctor.params.is_empty() {
                let params: Vec<String> = ctor
                    .params
                    .iter()
                    .map(|p| format!("{}: {}", p.name, print_type(tree, &p.ty)))
                    .collect();
                header.push_str(&format!("({})", params.join(", ")));
            }
            for p in &ctor.params {
                self.names.insert(p.id, p.name.clone());
            }
        }
        if !decl.supertypes.is_empty() {
            let supers: Vec<String> = decl
                .supertypes
                .iter()
                .map(|t| {
                    let mut s = print_type(tree, t);
                    let called = decl
                        .constructor
                        .as_ref()
                        .and_then(|c| c.super_call.as_ref())
                        .filter(|call| t.class_id() == Some(call.class));
                    if let Some(call) = called {
                        let args: Vec<String> = call.args.iter().map(|a| self.expr(a)).collect();
                        s.push_str(&format!("({})", args.join(", ")));
                    }
                    s
                })
                .collect();
            header.push_str(&format!(" : {}", supers.join(", ")));
        }
        if decl.members.is_empty() {
            self.line(&header);
            return;
        }
        self.line(&format!("{header} {{"));
        self.names.insert(decl.this_receiver, "this".into());
        self.depth += 1;
        for member in &decl.members {
            self.member(*member);
        }
        self.depth -= 1;
        self.line("}");
    }

    fn field(&mut self, field: FieldId) {
        let decl = self.tree.field(field);
        let keyword = if decl.mutable { "var" } else { "val" };
        let mut text = format!(
            "{}{keyword} #{}: {}",
            origin_tag(decl.origin),
            decl.name,
            print_type(self.tree, &decl.ty)
        );
        if let Some(init) = &decl.initializer {
            text.push_str(&format!(" = {}", self.expr(init)));
        }
        self.line(&text);
    }

    fn property(&mut self, property: PropertyId) {
        let tree = self.tree;
        let decl = tree.property(property);
        let keyword = if decl.mutable { "var" } else { "val" };
        let modifier = if decl.overridden.is_empty() { "" } else { "override " };
        let mut text = format!(
            "{}{modifier}{keyword} {}: {}",
            origin_tag(decl.origin),
            decl.name,
            print_type(tree, &decl.ty)
        );
        if let Some(field) = decl.backing_field {
            let backing = tree.field(field);
            if decl.is_delegated {
                let holder = backing.initializer.as_ref().map(|e| self.expr(e));
                text.push_str(&format!(" by {}", holder.unwrap_or_default()));
            } else if let Some(init) = &backing.initializer {
                text.push_str(&format!(" = {}", self.expr(init)));
            }
        }
        self.line(&text);
        // Accessors are implied unless the property or its storage was rewritten.
        let storage_rewritten = decl
            .backing_field
            .is_some_and(|f| tree.field(f).origin == Origin::PluginGenerated);
        let user_default =
            decl.origin == Origin::UserDeclared && !decl.is_delegated && !storage_rewritten;
        if user_default {
            return;
        }
        self.depth += 1;
        for (accessor, head) in [(decl.getter, "get()"), (decl.setter, "set(value)")] {
            if let Some(f) = accessor {
                if tree.function(f).body.is_some() {
                    self.function(f, head);
                }
            }
        }
        self.depth -= 1;
    }

    fn function(&mut self, function: FunctionId, keyword: &str) {
        let tree = self.tree;
        let decl = tree.function(function);
        if let Some(receiver) = decl.dispatch_receiver {
            self.names.insert(receiver, "this".into());
        }
        for p in &decl.params {
            self.names.insert(p.id, p.name.clone());
        }

        let header = if decl.is_accessor() {
            keyword.to_string()
        } else {
            let mut modifiers = String::new();
            if !decl.overridden.is_empty() {
                modifiers.push_str("override ");
            }
            if decl.is_inline {
                modifiers.push_str("inline ");
            }
            if decl.is_operator {
                modifiers.push_str("operator ");
            }
            let type_params: Vec<String> = decl
                .type_params
                .iter()
                .map(|p| tree.type_param(*p).name.clone())
                .collect();
            let generics = if type_params.is_empty() {
                String::new()
            } else {
                format!("<{}> ", type_params.join(", "))
            };
            let params: Vec<String> = decl
                .params
                .iter()
                .map(|p| {
                    let mut s = format!("{}: {}", p.name, print_type(tree, &p.ty));
                    if let Some(default) = &p.default {
                        s.push_str(&format!(" = {}", self.expr(default)));
                    }
                    s
                })
                .collect();
            format!(
                "{}{modifiers}{keyword} {generics}{}({}): {}",
                origin_tag(decl.origin),
                decl.name,
                params.join(", "),
                print_type(tree, &decl.return_type)
            )
        };

        match &decl.body {
            None => self.line(&header),
            Some(body) => {
                self.line(&format!("{header} {{"));
                self.depth += 1;
                self.statements(body);
                self.depth -= 1;
                self.line("}");
            }
        }
    }

    fn statements(&mut self, body: &Expr) {
        match body {
            Expr::Block(stmts) => {
                for stmt in stmts {
                    self.statements(stmt);
                }
            }
            other => {
                let text = self.expr(other);
                self.line(&text);
            }
        }
    }

    fn name_of(&self, value: ValueId) -> String {
        self.names
            .get(&value)
            .cloned()
            .unwrap_or_else(|| value.to_string())
    }

    fn args(&mut self, args: &[Expr]) -> String {
        let args: Vec<String> = args.iter().map(|a| self.expr(a)).collect();
        args.join(", ")
    }

    fn operand(&mut self, expr: &Expr) -> String {
        let text = self.expr(expr);
        match expr {
            Expr::Binary { .. } | Expr::Cast { .. } | Expr::Is { .. } | Expr::If { .. } => {
                format!("({text})")
            }
            _ => text,
        }
    }

    fn expr(&mut self, expr: &Expr) -> String {
        let tree = self.tree;
        match expr {
            Expr::Const(c) => match c {
                Const::Unit => "Unit".into(),
                Const::Null => "null".into(),
                Const::Bool(b) => b.to_string(),
                Const::Int(i) => i.to_string(),
                Const::Long(i) => format!("{i}L"),
                Const::Double(d) => format!("{d:?}"),
                Const::Str(s) => format!("{s:?}"),
            },
            Expr::Get(v) => self.name_of(*v),
            Expr::Let {
                local, name, value, ..
            } => {
                self.names.insert(*local, name.clone());
                format!("val {name} = {}", self.expr(value))
            }
            Expr::GetField { receiver, field } => {
                format!("{}.#{}", self.operand(receiver), tree.field(*field).name)
            }
            Expr::SetField {
                receiver,
                field,
                value,
            } => format!(
                "{}.#{} = {}",
                self.operand(receiver),
                tree.field(*field).name,
                self.expr(value)
            ),
            Expr::GetGlobal(g) => tree.global(*g).name.clone(),
            Expr::Call {
                function,
                receiver,
                type_args: targs,
                args,
            } => {
                let decl = tree.function(*function);
                let prefix = match receiver {
                    Some(r) => format!("{}.", self.operand(r)),
                    None => String::new(),
                };
                if let Some(property) = decl.property {
                    let name = &tree.property(property).name;
                    return match args.first() {
                        Some(value) if decl.name.starts_with("<set-") => {
                            format!("{prefix}{name} = {}", self.expr(value))
                        }
                        _ => format!("{prefix}{name}"),
                    };
                }
                format!(
                    "{prefix}{}{}({})",
                    decl.name,
                    type_args(tree, targs),
                    self.args(args)
                )
            }
            Expr::New {
                class,
                type_args: targs,
                args,
            } => format!(
                "{}{}({})",
                tree.class(*class).name,
                type_args(tree, targs),
                self.args(args)
            ),
            Expr::Invoke { callee, args } => {
                format!("{}.invoke({})", self.operand(callee), self.args(args))
            }
            Expr::Lambda(lambda) => {
                let params: Vec<String> = lambda
                    .params
                    .iter()
                    .map(|p| {
                        self.names.insert(p.id, p.name.clone());
                        format!("{}: {}", p.name, print_type(tree, &p.ty))
                    })
                    .collect();
                let body = match &lambda.body {
                    Expr::Block(stmts) => {
                        let stmts: Vec<String> = stmts.iter().map(|s| self.expr(s)).collect();
                        stmts.join("; ")
                    }
                    other => self.expr(other),
                };
                if params.is_empty() {
                    format!("{{ {body} }}")
                } else {
                    format!("{{ {} -> {body} }}", params.join(", "))
                }
            }
            Expr::FunctionRef(f) => format!("::{}", tree.function(*f).name),
            Expr::PropertyRef(p) => format!("::{}", tree.property(*p).name),
            Expr::Intrinsic { op, args } => self.intrinsic(*op, args),
            Expr::Binary { op, lhs, rhs } => format!(
                "{} {} {}",
                self.operand(lhs),
                op.symbol(),
                self.operand(rhs)
            ),
            Expr::Not(e) => format!("!{}", self.operand(e)),
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => format!(
                "if ({}) {} else {}",
                self.expr(cond),
                self.expr(then_branch),
                self.expr(else_branch)
            ),
            Expr::Block(stmts) => {
                let stmts: Vec<String> = stmts.iter().map(|s| self.expr(s)).collect();
                format!("{{ {} }}", stmts.join("; "))
            }
            Expr::Return(e) => match &**e {
                Expr::Const(Const::Unit) => "return".into(),
                other => format!("return {}", self.expr(other)),
            },
            Expr::Throw(e) => format!("throw {}", self.expr(e)),
            Expr::Cast { expr, ty } => {
                format!("{} as {}", self.operand(expr), print_type(tree, ty))
            }
            Expr::Is { expr, class } => {
                format!("{} is {}", self.operand(expr), tree.class(*class).name)
            }
        }
    }

    fn intrinsic(&mut self, op: Intrinsic, args: &[Expr]) -> String {
        match (op, args) {
            (Intrinsic::MapGet, [map, key]) => {
                format!("{}[{}]", self.operand(map), self.expr(key))
            }
            (
                Intrinsic::MapPut
                | Intrinsic::LazyValue
                | Intrinsic::CallableName
                | Intrinsic::ToString
                | Intrinsic::HashCode
                | Intrinsic::ParseInt
                | Intrinsic::ToInt,
                [receiver, rest @ ..],
            ) => {
                let receiver = self.operand(receiver);
                match op {
                    Intrinsic::LazyValue | Intrinsic::CallableName => {
                        format!("{receiver}.{}", op.name())
                    }
                    _ => format!("{receiver}.{}({})", op.name(), self.args(rest)),
                }
            }
            _ => format!("{}({})", op.name(), self.args(args)),
        }
    }
}
