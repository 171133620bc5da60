//! The declaration tree: arenas of declarations addressed by ids.
//!
//! [`Tree`] owns every node of one compilation unit. Builders attach new
//! declarations to their owner's member list; [`Tree::remove_member`]
//! detaches them again while the arena slot stays readable.

use stitch_common::span::Span;

use crate::decl::{
    ClassDecl, ClassKind, Constructor, FieldDecl, FunctionDecl, GlobalDecl, Modality, Origin,
    PropertyDecl, TypeParam, ValueParam, Visibility,
};
use crate::expr::{BinOp, Expr, Intrinsic};
use crate::ids::{
    ClassId, FieldId, FunctionId, GlobalId, Member, Parent, PropertyId, TypeParamId, ValueId,
};
use crate::ty::TypeRef;

/// Source text the tree was built from, kept for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    classes: Vec<ClassDecl>,
    fields: Vec<FieldDecl>,
    functions: Vec<FunctionDecl>,
    properties: Vec<PropertyDecl>,
    type_params: Vec<TypeParam>,
    globals: Vec<GlobalDecl>,
    /// Top-level classes and functions in textual order.
    top_level: Vec<Member>,
    next_value: u32,
    source: Option<SourceFile>,
    any: ClassId,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// Create a tree containing only the builtin `Any` class.
    pub fn new() -> Self {
        let mut tree = Tree {
            classes: Vec::new(),
            fields: Vec::new(),
            functions: Vec::new(),
            properties: Vec::new(),
            type_params: Vec::new(),
            globals: Vec::new(),
            top_level: Vec::new(),
            next_value: 0,
            source: None,
            any: ClassId(0),
        };
        tree.any = tree.push_class(Parent::Package("kotlin".into()), "Any", ClassKind::Class);
        tree.classes[0].modality = Modality::Open;
        let any = tree.any;

        let equals = tree.add_function(Parent::Class(any), "equals", TypeRef::Bool);
        let other = tree.add_param(equals, "other", TypeRef::NullableAny);
        let this = tree.this_of(equals);
        tree.functions[equals.index()].body = Some(Expr::ret(Expr::binary(
            BinOp::Identical,
            Expr::get(this),
            Expr::get(other),
        )));

        let hash = tree.add_function(Parent::Class(any), "hashCode", TypeRef::Int);
        let this = tree.this_of(hash);
        tree.functions[hash.index()].body = Some(Expr::ret(Expr::intrinsic(
            Intrinsic::IdentityHashCode,
            vec![Expr::get(this)],
        )));

        let to_string = tree.add_function(Parent::Class(any), "toString", TypeRef::String);
        let this = tree.this_of(to_string);
        tree.functions[to_string.index()].body = Some(Expr::ret(Expr::intrinsic(
            Intrinsic::DefaultToString,
            vec![Expr::get(this)],
        )));

        for f in [equals, hash, to_string] {
            let decl = &mut tree.functions[f.index()];
            decl.modality = Modality::Open;
            decl.is_operator = f == equals;
        }
        tree
    }

    /// The builtin root class every class implicitly extends.
    pub fn any_class(&self) -> ClassId {
        self.any
    }

    pub fn set_source(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.source = Some(SourceFile {
            name: name.into(),
            text: text.into(),
        });
    }

    pub fn source(&self) -> Option<&SourceFile> {
        self.source.as_ref()
    }

    /// Allocate a new receiver/parameter/local identity.
    pub fn fresh_value(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    // ── Builders ──────────────────────────────────────────────────────

    fn push_class(&mut self, parent: Parent, name: &str, kind: ClassKind) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        let this_receiver = self.fresh_value();
        let (modality, constructor) = match kind {
            ClassKind::Class => (Modality::Final, Some(Constructor::default())),
            ClassKind::Interface => (Modality::Abstract, None),
            ClassKind::AnnotationClass => (Modality::Final, None),
        };
        self.classes.push(ClassDecl {
            name: name.to_string(),
            parent,
            kind,
            modality,
            type_params: Vec::new(),
            supertypes: Vec::new(),
            members: Vec::new(),
            this_receiver,
            constructor,
            annotations: Vec::new(),
            origin: Origin::UserDeclared,
            span: Span::SYNTHETIC,
        });
        id
    }

    /// Add a class, interface or annotation class under `parent`.
    pub fn add_class(&mut self, parent: Parent, name: &str, kind: ClassKind) -> ClassId {
        let id = self.push_class(parent.clone(), name, kind);
        match parent {
            Parent::Package(_) => self.top_level.push(Member::Class(id)),
            Parent::Class(owner) => self.classes[owner.index()].members.push(Member::Class(id)),
        }
        id
    }

    pub fn add_class_type_param(&mut self, class: ClassId, name: &str) -> TypeParamId {
        let id = self.add_type_param(name);
        self.classes[class.index()].type_params.push(id);
        id
    }

    pub fn add_function_type_param(&mut self, function: FunctionId, name: &str) -> TypeParamId {
        let id = self.add_type_param(name);
        self.functions[function.index()].type_params.push(id);
        id
    }

    pub fn add_type_param(&mut self, name: &str) -> TypeParamId {
        let id = TypeParamId(self.type_params.len() as u32);
        self.type_params.push(TypeParam {
            name: name.to_string(),
            bounds: Vec::new(),
        });
        id
    }

    /// Add a field to `owner`'s member list.
    pub fn add_field(
        &mut self,
        owner: ClassId,
        name: &str,
        ty: TypeRef,
        initializer: Option<Expr>,
        origin: Origin,
    ) -> FieldId {
        let id = self.push_field(owner, name, ty, initializer, origin);
        self.classes[owner.index()].members.push(Member::Field(id));
        id
    }

    /// Create a field that is not listed as a class member (property
    /// backing storage).
    fn push_field(
        &mut self,
        owner: ClassId,
        name: &str,
        ty: TypeRef,
        initializer: Option<Expr>,
        origin: Origin,
    ) -> FieldId {
        let id = FieldId(self.fields.len() as u32);
        self.fields.push(FieldDecl {
            name: name.to_string(),
            ty,
            initializer,
            origin,
            owner,
            mutable: false,
            span: Span::SYNTHETIC,
        });
        id
    }

    /// Add a function. Member functions get a dispatch receiver; functions
    /// declared in an interface start out abstract.
    pub fn add_function(&mut self, owner: Parent, name: &str, return_type: TypeRef) -> FunctionId {
        let id = self.push_function(owner.clone(), name, return_type);
        match owner {
            Parent::Package(_) => self.top_level.push(Member::Function(id)),
            Parent::Class(class) => self.classes[class.index()]
                .members
                .push(Member::Function(id)),
        }
        id
    }

    fn push_function(&mut self, owner: Parent, name: &str, return_type: TypeRef) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        let (dispatch_receiver, modality) = match &owner {
            Parent::Package(_) => (None, Modality::Final),
            Parent::Class(class) => {
                let modality = if self.classes[class.index()].is_interface() {
                    Modality::Abstract
                } else {
                    Modality::Final
                };
                (Some(self.fresh_value()), modality)
            }
        };
        self.functions.push(FunctionDecl {
            name: name.to_string(),
            owner,
            type_params: Vec::new(),
            dispatch_receiver,
            params: Vec::new(),
            return_type,
            body: None,
            origin: Origin::UserDeclared,
            modality,
            visibility: Visibility::Public,
            is_operator: false,
            is_inline: false,
            is_suspend: false,
            overridden: Vec::new(),
            property: None,
            span: Span::SYNTHETIC,
        });
        id
    }

    /// Append a value parameter and return its identity.
    pub fn add_param(&mut self, function: FunctionId, name: &str, ty: TypeRef) -> ValueId {
        let id = self.fresh_value();
        self.functions[function.index()]
            .params
            .push(ValueParam::new(id, name, ty));
        id
    }

    /// Give a function a body. An interface function with a body becomes a
    /// default (open) implementation.
    pub fn set_body(&mut self, function: FunctionId, body: Expr) {
        let decl = &mut self.functions[function.index()];
        decl.body = Some(body);
        if decl.modality == Modality::Abstract {
            decl.modality = Modality::Open;
        }
    }

    /// Add a property with accessors.
    ///
    /// In a class the property gets a backing field holding `initializer`
    /// and default accessors reading and writing it. In an interface the
    /// accessors are abstract and there is no field.
    pub fn add_property(
        &mut self,
        owner: ClassId,
        name: &str,
        ty: TypeRef,
        mutable: bool,
        initializer: Option<Expr>,
    ) -> PropertyId {
        let id = self.push_property(owner, name, ty.clone(), mutable);
        self.classes[owner.index()].members.push(Member::Property(id));
        if self.classes[owner.index()].is_interface() {
            return id;
        }

        let field = self.push_field(owner, name, ty, initializer, Origin::UserDeclared);
        self.fields[field.index()].mutable = mutable;
        self.properties[id.index()].backing_field = Some(field);

        if let Some(getter) = self.properties[id.index()].getter {
            let this = self.this_of(getter);
            self.set_body(getter, Expr::ret(Expr::get_field(Expr::get(this), field)));
        }
        if let Some(setter) = self.properties[id.index()].setter {
            let this = self.this_of(setter);
            let value = self.functions[setter.index()].params[0].id;
            self.set_body(
                setter,
                Expr::set_field(Expr::get(this), field, Expr::get(value)),
            );
        }
        id
    }

    /// Create a property and its (bodiless) accessors without listing it
    /// in the owner's members.
    pub(crate) fn push_property(
        &mut self,
        owner: ClassId,
        name: &str,
        ty: TypeRef,
        mutable: bool,
    ) -> PropertyId {
        let id = PropertyId(self.properties.len() as u32);
        let modality = if self.classes[owner.index()].is_interface() {
            Modality::Abstract
        } else {
            Modality::Final
        };
        self.properties.push(PropertyDecl {
            name: name.to_string(),
            owner,
            ty: ty.clone(),
            mutable,
            getter: None,
            setter: None,
            backing_field: None,
            origin: Origin::UserDeclared,
            modality,
            is_delegated: false,
            overridden: Vec::new(),
            span: Span::SYNTHETIC,
        });

        let getter = self.push_function(Parent::Class(owner), &getter_name(name), ty.clone());
        self.functions[getter.index()].property = Some(id);
        self.properties[id.index()].getter = Some(getter);
        if mutable {
            let setter =
                self.push_function(Parent::Class(owner), &setter_name(name), TypeRef::Unit);
            self.functions[setter.index()].property = Some(id);
            self.add_param(setter, "value", ty);
            self.properties[id.index()].setter = Some(setter);
        }
        id
    }

    /// Record that `property` overrides `overridden`, accessors included.
    pub fn add_property_override(&mut self, property: PropertyId, overridden: PropertyId) {
        let decl = &mut self.properties[property.index()];
        if !decl.overridden.contains(&overridden) {
            decl.overridden.push(overridden);
        }
        let pairs = [
            (
                self.properties[property.index()].getter,
                self.properties[overridden.index()].getter,
            ),
            (
                self.properties[property.index()].setter,
                self.properties[overridden.index()].setter,
            ),
        ];
        for pair in pairs {
            if let (Some(own), Some(base)) = pair {
                self.add_function_override(own, base);
            }
        }
    }

    pub fn add_function_override(&mut self, function: FunctionId, overridden: FunctionId) {
        let decl = &mut self.functions[function.index()];
        if !decl.overridden.contains(&overridden) {
            decl.overridden.push(overridden);
        }
    }

    pub fn add_global(
        &mut self,
        package: &str,
        name: &str,
        ty: TypeRef,
        initializer: Expr,
    ) -> GlobalId {
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(GlobalDecl {
            name: name.to_string(),
            package: package.to_string(),
            ty,
            initializer,
        });
        id
    }

    /// Detach a member from its class. The node stays in its arena.
    pub fn remove_member(&mut self, class: ClassId, member: Member) {
        self.classes[class.index()].members.retain(|m| *m != member);
    }

    /// Append an already created member to a class.
    pub fn push_member(&mut self, class: ClassId, member: Member) {
        self.classes[class.index()].members.push(member);
    }

    /// Create a member function without listing it in its owner.
    pub fn new_detached_function(
        &mut self,
        owner: Parent,
        name: &str,
        return_type: TypeRef,
    ) -> FunctionId {
        self.push_function(owner, name, return_type)
    }

    /// Create a field without listing it in its owner.
    pub fn new_detached_field(
        &mut self,
        owner: ClassId,
        name: &str,
        ty: TypeRef,
        initializer: Option<Expr>,
        origin: Origin,
    ) -> FieldId {
        self.push_field(owner, name, ty, initializer, origin)
    }

    /// Create a property with bodiless accessors and no backing field,
    /// without listing it in its owner.
    pub fn new_detached_property(
        &mut self,
        owner: ClassId,
        name: &str,
        ty: TypeRef,
        mutable: bool,
    ) -> PropertyId {
        self.push_property(owner, name, ty, mutable)
    }

    /// Insert an already created member at `index` in the member list.
    pub fn insert_member(&mut self, class: ClassId, index: usize, member: Member) {
        let members = &mut self.classes[class.index()].members;
        let index = index.min(members.len());
        members.insert(index, member);
    }

    /// Position of `member` in its class's member list.
    pub fn member_index(&self, class: ClassId, member: Member) -> Option<usize> {
        self.classes[class.index()]
            .members
            .iter()
            .position(|m| *m == member)
    }

    // ── Accessors ─────────────────────────────────────────────────────

    pub fn class(&self, id: ClassId) -> &ClassDecl {
        &self.classes[id.index()]
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut ClassDecl {
        &mut self.classes[id.index()]
    }

    pub fn field(&self, id: FieldId) -> &FieldDecl {
        &self.fields[id.index()]
    }

    pub fn field_mut(&mut self, id: FieldId) -> &mut FieldDecl {
        &mut self.fields[id.index()]
    }

    pub fn function(&self, id: FunctionId) -> &FunctionDecl {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut FunctionDecl {
        &mut self.functions[id.index()]
    }

    pub fn property(&self, id: PropertyId) -> &PropertyDecl {
        &self.properties[id.index()]
    }

    pub fn property_mut(&mut self, id: PropertyId) -> &mut PropertyDecl {
        &mut self.properties[id.index()]
    }

    pub fn type_param(&self, id: TypeParamId) -> &TypeParam {
        &self.type_params[id.index()]
    }

    pub fn global(&self, id: GlobalId) -> &GlobalDecl {
        &self.globals[id.index()]
    }

    pub fn top_level(&self) -> &[Member] {
        &self.top_level
    }

    /// Number of classes in the arena, detached and builtin ones included.
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Receiver of a member function. Panics on top-level functions.
    pub fn this_of(&self, function: FunctionId) -> ValueId {
        match self.functions[function.index()].dispatch_receiver {
            Some(v) => v,
            None => panic!("{} has no dispatch receiver", self.functions[function.index()].name),
        }
    }

    /// The class owning a member function, if any.
    pub fn owner_class(&self, function: FunctionId) -> Option<ClassId> {
        match self.functions[function.index()].owner {
            Parent::Class(c) => Some(c),
            Parent::Package(_) => None,
        }
    }

    /// `C<T1, .., Tn>` as seen from inside `C`.
    pub fn this_type(&self, class: ClassId) -> TypeRef {
        let args = self.classes[class.index()]
            .type_params
            .iter()
            .map(|p| TypeRef::Param(*p))
            .collect();
        TypeRef::generic(class, args)
    }

    /// Package of a declaration, following enclosing classes.
    pub fn package_of(&self, parent: &Parent) -> String {
        match parent {
            Parent::Package(p) => p.clone(),
            Parent::Class(c) => self.package_of(&self.classes[c.index()].parent),
        }
    }

    /// Dotted name, e.g. `pkg.Outer.Inner`.
    pub fn fq_name(&self, class: ClassId) -> String {
        let decl = &self.classes[class.index()];
        let prefix = match &decl.parent {
            Parent::Package(p) => p.clone(),
            Parent::Class(c) => self.fq_name(*c),
        };
        join_name(&prefix, &decl.name)
    }

    pub fn function_fq_name(&self, function: FunctionId) -> String {
        let decl = &self.functions[function.index()];
        let prefix = match &decl.owner {
            Parent::Package(p) => p.clone(),
            Parent::Class(c) => self.fq_name(*c),
        };
        join_name(&prefix, &decl.name)
    }

    /// Every class reachable from the top level, outer classes first.
    pub fn all_classes(&self) -> Vec<ClassId> {
        let mut out = Vec::new();
        let mut stack: Vec<ClassId> = self
            .top_level
            .iter()
            .rev()
            .filter_map(|m| match m {
                Member::Class(c) => Some(*c),
                _ => None,
            })
            .collect();
        while let Some(class) = stack.pop() {
            out.push(class);
            let nested: Vec<ClassId> = self.classes[class.index()].nested_classes().collect();
            stack.extend(nested.into_iter().rev());
        }
        out
    }

    pub fn find_class(&self, fq_name: &str) -> Option<ClassId> {
        self.all_classes()
            .into_iter()
            .find(|c| self.fq_name(*c) == fq_name)
    }

    /// Top-level functions with the given dotted name (all overloads).
    pub fn find_functions(&self, fq_name: &str) -> Vec<FunctionId> {
        self.top_level
            .iter()
            .filter_map(|m| match m {
                Member::Function(f) => Some(*f),
                _ => None,
            })
            .filter(|f| self.function_fq_name(*f) == fq_name)
            .collect()
    }

    /// Own member functions (accessors excluded) named `name`.
    pub fn functions_named(&self, class: ClassId, name: &str) -> Vec<FunctionId> {
        self.classes[class.index()]
            .functions()
            .filter(|f| self.functions[f.index()].name == name)
            .collect()
    }

    pub fn property_named(&self, class: ClassId, name: &str) -> Option<PropertyId> {
        self.classes[class.index()]
            .properties()
            .find(|p| self.properties[p.index()].name == name)
    }

    /// Member functions and the accessors of member properties.
    pub fn callable_members(&self, class: ClassId) -> Vec<FunctionId> {
        let mut out = Vec::new();
        for member in &self.classes[class.index()].members {
            match member {
                Member::Function(f) => out.push(*f),
                Member::Property(p) => {
                    let decl = &self.properties[p.index()];
                    out.extend(decl.getter);
                    out.extend(decl.setter);
                }
                Member::Field(_) | Member::Class(_) => {}
            }
        }
        out
    }

    /// Fields in initialisation order: member fields and property backing
    /// fields as they appear in the member list.
    pub fn storage_fields(&self, class: ClassId) -> Vec<FieldId> {
        self.classes[class.index()]
            .members
            .iter()
            .filter_map(|m| match m {
                Member::Field(f) => Some(*f),
                Member::Property(p) => self.properties[p.index()].backing_field,
                _ => None,
            })
            .collect()
    }

    /// Apply `f` to every expression owned by `class`: member bodies,
    /// accessors, field initialisers, the superclass constructor call and,
    /// recursively, nested classes.
    pub fn for_each_body_mut(&mut self, class: ClassId, f: &mut dyn FnMut(&mut Expr)) {
        for field in self.storage_fields(class) {
            if let Some(init) = self.fields[field.index()].initializer.as_mut() {
                f(init);
            }
        }
        for function in self.callable_members(class) {
            let decl = &mut self.functions[function.index()];
            if let Some(body) = decl.body.as_mut() {
                f(body);
            }
            for param in decl.params.iter_mut() {
                if let Some(default) = param.default.as_mut() {
                    f(default);
                }
            }
        }
        if let Some(ctor) = self.classes[class.index()].constructor.as_mut() {
            if let Some(call) = ctor.super_call.as_mut() {
                for arg in call.args.iter_mut() {
                    f(arg);
                }
            }
        }
        let nested: Vec<ClassId> = self.classes[class.index()].nested_classes().collect();
        for inner in nested {
            self.for_each_body_mut(inner, f);
        }
    }
}

pub fn getter_name(property: &str) -> String {
    format!("<get-{property}>")
}

pub fn setter_name(property: &str) -> String {
    format!("<set-{property}>")
}

fn join_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tree_has_any() {
        let tree = Tree::new();
        let any = tree.any_class();
        assert_eq!(tree.fq_name(any), "kotlin.Any");
        let names: Vec<&str> = tree
            .class(any)
            .functions()
            .map(|f| tree.function(f).name.as_str())
            .collect();
        assert_eq!(names, vec!["equals", "hashCode", "toString"]);
        // Any is not part of the unit.
        assert!(tree.all_classes().is_empty());
    }

    #[test]
    fn test_nested_fq_names_and_lookup() {
        let mut tree = Tree::new();
        let outer = tree.add_class(Parent::Package("app".into()), "Outer", ClassKind::Class);
        let inner = tree.add_class(Parent::Class(outer), "Inner", ClassKind::Interface);
        assert_eq!(tree.fq_name(inner), "app.Outer.Inner");
        assert_eq!(tree.find_class("app.Outer.Inner"), Some(inner));
        assert_eq!(tree.all_classes(), vec![outer, inner]);
        assert_eq!(tree.package_of(&Parent::Class(inner)), "app");
    }

    #[test]
    fn test_property_in_class_gets_backing_field_and_accessors() {
        let mut tree = Tree::new();
        let c = tree.add_class(Parent::Package(String::new()), "C", ClassKind::Class);
        let p = tree.add_property(c, "size", TypeRef::Long, true, Some(Expr::long(1)));
        let decl = tree.property(p).clone();
        let field = decl.backing_field.expect("backing field");
        assert_eq!(tree.field(field).name, "size");
        assert!(tree.field(field).mutable);
        assert_eq!(tree.function(decl.getter.unwrap()).name, "<get-size>");
        assert_eq!(tree.function(decl.setter.unwrap()).params[0].name, "value");
        assert_eq!(tree.storage_fields(c), vec![field]);
        assert_eq!(tree.callable_members(c).len(), 2);
    }

    #[test]
    fn test_property_in_interface_is_abstract() {
        let mut tree = Tree::new();
        let i = tree.add_class(Parent::Package(String::new()), "I", ClassKind::Interface);
        let p = tree.add_property(i, "size", TypeRef::Long, false, None);
        let decl = tree.property(p);
        assert!(decl.backing_field.is_none());
        assert!(decl.setter.is_none());
        let getter = tree.function(decl.getter.unwrap());
        assert_eq!(getter.modality, Modality::Abstract);
        assert!(getter.body.is_none());
    }

    #[test]
    fn test_remove_member_keeps_arena_slot() {
        let mut tree = Tree::new();
        let c = tree.add_class(Parent::Package(String::new()), "C", ClassKind::Class);
        let f = tree.add_field(c, "x", TypeRef::Int, Some(Expr::int(1)), Origin::UserDeclared);
        tree.remove_member(c, Member::Field(f));
        assert!(tree.class(c).members.is_empty());
        assert_eq!(tree.field(f).name, "x");
    }

    #[test]
    fn test_overloads_found_by_fq_name() {
        let mut tree = Tree::new();
        let pkg = Parent::Package("stitch".into());
        let a = tree.add_function(pkg.clone(), "mixin", TypeRef::Any);
        let b = tree.add_function(pkg, "mixin", TypeRef::Any);
        assert_eq!(tree.find_functions("stitch.mixin"), vec![a, b]);
        assert!(tree.find_functions("other.mixin").is_empty());
    }
}
