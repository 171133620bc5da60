//! Supertypes, subtyping and the override relation.
//!
//! Overrides are explicit: every function lists the functions it directly
//! overrides. Fake overrides make inherited members visible in a subclass
//! so that each class can answer "what is my member for X" locally.

use rustc_hash::FxHashSet;

use crate::decl::{ClassKind, Modality, Origin, ValueParam};
use crate::ids::{ClassId, FunctionId, Member, Parent, PropertyId, TypeParamId};
use crate::tree::Tree;
use crate::ty::{zip_subst, TypeRef};

impl Tree {
    /// Declared supertypes followed by the implicit `Any`.
    pub fn direct_supertypes(&self, class: ClassId) -> Vec<TypeRef> {
        let mut out = self.class(class).supertypes.clone();
        let any = self.any_class();
        if class != any && !out.iter().any(|t| t.class_id() == Some(any)) {
            out.push(TypeRef::class(any));
        }
        out
    }

    /// `ty` and all of its supertypes, arguments substituted, breadth first.
    pub fn supertype_closure(&self, ty: &TypeRef) -> Vec<TypeRef> {
        let mut out = vec![ty.clone()];
        let mut i = 0;
        while i < out.len() {
            if let TypeRef::Class { class, args } = &out[i] {
                let subst = zip_subst(&self.class(*class).type_params, args);
                for sup in self.direct_supertypes(*class) {
                    let sup = sup.substitute(&subst);
                    if !out.contains(&sup) {
                        out.push(sup);
                    }
                }
            }
            i += 1;
        }
        out
    }

    /// The supertype of `ty` whose class is `target`, with arguments.
    pub fn as_supertype(&self, ty: &TypeRef, target: ClassId) -> Option<TypeRef> {
        self.supertype_closure(ty)
            .into_iter()
            .find(|t| t.class_id() == Some(target))
    }

    pub fn is_subclass(&self, sub: ClassId, sup: ClassId) -> bool {
        self.supertype_closure(&self.this_type(sub))
            .iter()
            .any(|t| t.class_id() == Some(sup))
    }

    /// Structural subtyping. Class arguments are invariant; the builtin
    /// shapes are covariant in their result.
    pub fn is_subtype(&self, sub: &TypeRef, sup: &TypeRef) -> bool {
        if sub == sup {
            return true;
        }
        match (sub, sup) {
            (_, TypeRef::NullableAny) | (TypeRef::Nothing, _) => true,
            (TypeRef::NullableAny, _) => false,
            (_, TypeRef::Any) => true,
            (TypeRef::Class { .. }, TypeRef::Class { class, .. }) => self
                .as_supertype(sub, *class)
                .is_some_and(|t| &t == sup),
            (
                TypeRef::Function { params: p1, ret: r1 },
                TypeRef::Function { params: p2, ret: r2 },
            ) => {
                p1.len() == p2.len()
                    && p1.iter().zip(p2).all(|(a, b)| self.is_subtype(b, a))
                    && self.is_subtype(r1, r2)
            }
            (TypeRef::Lazy(a), TypeRef::Lazy(b))
            | (TypeRef::Callable(a), TypeRef::Callable(b))
            | (TypeRef::Property(a), TypeRef::Property(b)) => self.is_subtype(a, b),
            (TypeRef::Property(a), TypeRef::Callable(b)) => self.is_subtype(a, b),
            (TypeRef::Map(k1, v1), TypeRef::Map(k2, v2)) => k1 == k2 && self.is_subtype(v1, v2),
            _ => false,
        }
    }

    /// Whether `function` overrides `target` directly or through a chain.
    pub fn overrides_transitively(&self, function: FunctionId, target: FunctionId) -> bool {
        let mut seen = FxHashSet::default();
        let mut stack = self.function(function).overridden.clone();
        while let Some(f) = stack.pop() {
            if f == target {
                return true;
            }
            if seen.insert(f) {
                stack.extend(self.function(f).overridden.iter().copied());
            }
        }
        false
    }

    pub fn property_overrides_transitively(
        &self,
        property: PropertyId,
        target: PropertyId,
    ) -> bool {
        let mut seen = FxHashSet::default();
        let mut stack = self.property(property).overridden.clone();
        while let Some(p) = stack.pop() {
            if p == target {
                return true;
            }
            if seen.insert(p) {
                stack.extend(self.property(p).overridden.iter().copied());
            }
        }
        false
    }

    /// The implementation a virtual call of `target` reaches on an
    /// instance of `class`.
    pub fn resolve_dispatch(&self, class: ClassId, target: FunctionId) -> Option<FunctionId> {
        let mut visited = FxHashSet::default();
        self.dispatch_in(class, target, &mut visited)
    }

    fn dispatch_in(
        &self,
        class: ClassId,
        target: FunctionId,
        visited: &mut FxHashSet<ClassId>,
    ) -> Option<FunctionId> {
        if !visited.insert(class) {
            return None;
        }
        let own = self
            .callable_members(class)
            .into_iter()
            .find(|f| *f == target || self.overrides_transitively(*f, target));
        if let Some(member) = own {
            if let Some(found) = self.implementation_of(member) {
                return Some(found);
            }
        }
        for sup in self.direct_supertypes(class) {
            if let Some(sup) = sup.class_id() {
                if let Some(found) = self.dispatch_in(sup, target, visited) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// `function` itself when it has a body, otherwise the first concrete
    /// function it overrides, in supertype order.
    pub fn implementation_of(&self, function: FunctionId) -> Option<FunctionId> {
        let decl = self.function(function);
        if decl.body.is_some() && decl.modality != Modality::Abstract {
            return Some(function);
        }
        decl.overridden
            .iter()
            .find_map(|f| self.implementation_of(*f))
    }

    /// Whether `class` (or a superclass) supplies a concrete override of
    /// `target` that is not a naive delegation forwarder.
    pub fn has_real_override(&self, class: ClassId, target: FunctionId) -> bool {
        self.real_override_in(class, target).is_some()
    }

    pub fn real_override_in(&self, class: ClassId, target: FunctionId) -> Option<FunctionId> {
        let member = self
            .callable_members(class)
            .into_iter()
            .find(|f| *f != target && self.overrides_transitively(*f, target))?;
        let decl = self.function(member);
        match decl.origin {
            Origin::DelegatedMember => None,
            Origin::FakeOverride => {
                let implementation = self.implementation_of(member)?;
                (implementation != target
                    && self.function(implementation).origin != Origin::DelegatedMember
                    && self.overrides_transitively(implementation, target))
                .then_some(implementation)
            }
            _ => decl.body.is_some().then_some(member),
        }
    }

    /// Whether a function with this name and parameter types (modulo
    /// renaming of its own type parameters) is `function`.
    pub fn has_signature(
        &self,
        function: FunctionId,
        name: &str,
        params: &[TypeRef],
        type_params: &[TypeParamId],
    ) -> bool {
        let decl = self.function(function);
        if decl.name != name
            || decl.params.len() != params.len()
            || decl.type_params.len() != type_params.len()
        {
            return false;
        }
        let renamed: Vec<TypeRef> = type_params.iter().map(|p| TypeRef::Param(*p)).collect();
        let subst = zip_subst(&decl.type_params, &renamed);
        decl.params
            .iter()
            .zip(params)
            .all(|(p, t)| p.ty.substitute(&subst) == *t)
    }

    /// Populate `class` with fake overrides for every inherited function
    /// and property it does not declare, and link declared members to the
    /// inherited members they match. Safe to call repeatedly.
    pub fn add_fake_overrides(&mut self, class: ClassId) {
        let mut visited = FxHashSet::default();
        self.add_fake_overrides_in(class, &mut visited);
    }

    fn add_fake_overrides_in(&mut self, class: ClassId, visited: &mut FxHashSet<ClassId>) {
        if class == self.any_class() || !visited.insert(class) {
            return;
        }
        for sup_ty in self.direct_supertypes(class) {
            let Some(sup) = sup_ty.class_id() else {
                continue;
            };
            self.add_fake_overrides_in(sup, visited);
            let subst = zip_subst(&self.class(sup).type_params, sup_ty.args());

            let inherited: Vec<FunctionId> = self.class(sup).functions().collect();
            for base in inherited {
                let base_decl = self.function(base).clone();
                let params: Vec<TypeRef> =
                    base_decl.params.iter().map(|p| p.ty.substitute(&subst)).collect();
                let existing = self.class(class).functions().find(|f| {
                    self.has_signature(*f, &base_decl.name, &params, &base_decl.type_params)
                });
                match existing {
                    Some(own) => self.add_function_override(own, base),
                    None => {
                        let fake = self.new_detached_function(
                            Parent::Class(class),
                            &base_decl.name,
                            base_decl.return_type.substitute(&subst),
                        );
                        let fresh: Vec<ValueParam> = base_decl
                            .params
                            .iter()
                            .zip(params)
                            .map(|(p, ty)| ValueParam::new(self.fresh_value(), p.name.clone(), ty))
                            .collect();
                        let decl = self.function_mut(fake);
                        decl.params = fresh;
                        decl.type_params = base_decl.type_params.clone();
                        decl.origin = Origin::FakeOverride;
                        decl.modality = base_decl.modality;
                        decl.is_operator = base_decl.is_operator;
                        decl.is_suspend = base_decl.is_suspend;
                        decl.overridden = vec![base];
                        self.push_member(class, Member::Function(fake));
                    }
                }
            }

            let inherited: Vec<PropertyId> = self.class(sup).properties().collect();
            for base in inherited {
                let base_decl = self.property(base).clone();
                match self.property_named(class, &base_decl.name) {
                    Some(own) => self.add_property_override(own, base),
                    None => {
                        let fake = self.push_property(
                            class,
                            &base_decl.name,
                            base_decl.ty.substitute(&subst),
                            base_decl.mutable,
                        );
                        self.property_mut(fake).origin = Origin::FakeOverride;
                        self.property_mut(fake).modality = base_decl.modality;
                        let accessors = [self.property(fake).getter, self.property(fake).setter];
                        for accessor in accessors.into_iter().flatten() {
                            let decl = self.function_mut(accessor);
                            decl.origin = Origin::FakeOverride;
                            decl.modality = base_decl.modality;
                        }
                        self.add_property_override(fake, base);
                        self.push_member(class, Member::Property(fake));
                    }
                }
            }
        }
    }

    /// Real functions and properties an interface declares, its own and
    /// those inherited from super-interfaces. Members of `Any` are not
    /// included.
    pub fn interface_members(&self, iface: ClassId) -> Vec<Member> {
        let mut out = Vec::new();
        let mut seen_functions: FxHashSet<FunctionId> = FxHashSet::default();
        let mut seen_properties: FxHashSet<PropertyId> = FxHashSet::default();
        let mut stack = vec![iface];
        let mut visited = FxHashSet::default();
        while let Some(class) = stack.pop() {
            if class == self.any_class() || !visited.insert(class) {
                continue;
            }
            for member in &self.class(class).members {
                match member {
                    Member::Function(f) if !self.function(*f).is_fake_override() => {
                        let shadowed = seen_functions
                            .iter()
                            .any(|s| self.overrides_transitively(*s, *f));
                        if seen_functions.insert(*f) && !shadowed {
                            out.push(*member);
                        }
                    }
                    Member::Property(p) if !self.property(*p).is_fake_override() => {
                        let shadowed = seen_properties
                            .iter()
                            .any(|s| self.property_overrides_transitively(*s, *p));
                        if seen_properties.insert(*p) && !shadowed {
                            out.push(*member);
                        }
                    }
                    _ => {}
                }
            }
            let supers: Vec<ClassId> = self
                .class(class)
                .supertypes
                .iter()
                .filter_map(|t| t.class_id())
                .filter(|c| self.class(*c).kind == ClassKind::Interface)
                .collect();
            stack.extend(supers.into_iter().rev());
        }
        out
    }

    /// The member of `class` (own, fake or real) that overrides `target`.
    pub fn member_overriding(&self, class: ClassId, target: FunctionId) -> Option<FunctionId> {
        self.class(class)
            .functions()
            .find(|f| *f == target || self.overrides_transitively(*f, target))
    }

    pub fn property_overriding(&self, class: ClassId, target: PropertyId) -> Option<PropertyId> {
        self.class(class)
            .properties()
            .find(|p| *p == target || self.property_overrides_transitively(*p, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;

    fn root() -> Parent {
        Parent::Package("app".into())
    }

    #[test]
    fn test_fake_overrides_substitute_type_arguments() {
        let mut tree = Tree::new();
        let box_iface = tree.add_class(root(), "Box", ClassKind::Interface);
        let t = tree.add_class_type_param(box_iface, "T");
        let put = tree.add_function(Parent::Class(box_iface), "put", TypeRef::Unit);
        tree.add_param(put, "item", TypeRef::Param(t));
        tree.add_property(box_iface, "item", TypeRef::Param(t), false, None);

        let c = tree.add_class(root(), "IntBox", ClassKind::Class);
        tree.class_mut(c).supertypes = vec![TypeRef::generic(box_iface, vec![TypeRef::Int])];
        tree.add_fake_overrides(c);

        let fake = tree.functions_named(c, "put")[0];
        assert_eq!(tree.function(fake).origin, Origin::FakeOverride);
        assert_eq!(tree.function(fake).params[0].ty, TypeRef::Int);
        assert_eq!(tree.function(fake).overridden, vec![put]);
        let prop = tree.property_named(c, "item").unwrap();
        assert_eq!(tree.property(prop).ty, TypeRef::Int);

        // Any members are inherited as well; a second call adds nothing.
        let count = tree.class(c).members.len();
        assert!(!tree.functions_named(c, "toString").is_empty());
        tree.add_fake_overrides(c);
        assert_eq!(tree.class(c).members.len(), count);
    }

    #[test]
    fn test_dispatch_prefers_most_derived_body() {
        let mut tree = Tree::new();
        let i = tree.add_class(root(), "I", ClassKind::Interface);
        let f = tree.add_function(Parent::Class(i), "f", TypeRef::Int);
        let base = tree.add_class(root(), "Base", ClassKind::Class);
        tree.class_mut(base).modality = Modality::Open;
        tree.class_mut(base).supertypes = vec![TypeRef::class(i)];
        let base_f = tree.add_function(Parent::Class(base), "f", TypeRef::Int);
        tree.set_body(base_f, Expr::ret(Expr::int(1)));
        let derived = tree.add_class(root(), "Derived", ClassKind::Class);
        tree.class_mut(derived).supertypes = vec![TypeRef::class(base)];
        tree.add_fake_overrides(derived);

        assert!(tree.overrides_transitively(base_f, f));
        assert_eq!(tree.resolve_dispatch(derived, f), Some(base_f));
        let to_string = tree.functions_named(tree.any_class(), "toString")[0];
        assert_eq!(tree.resolve_dispatch(derived, to_string), Some(to_string));
    }

    #[test]
    fn test_subtyping_of_builtin_shapes() {
        let mut tree = Tree::new();
        let i = tree.add_class(root(), "I", ClassKind::Interface);
        let c = tree.add_class(root(), "C", ClassKind::Class);
        tree.class_mut(c).supertypes = vec![TypeRef::class(i)];
        let (ci, ii) = (TypeRef::class(c), TypeRef::class(i));
        assert!(tree.is_subtype(&ci, &ii));
        assert!(!tree.is_subtype(&ii, &ci));
        assert!(tree.is_subtype(&TypeRef::lazy(ci.clone()), &TypeRef::lazy(ii.clone())));
        assert!(tree.is_subtype(
            &TypeRef::function(vec![ii.clone()], ci.clone()),
            &TypeRef::function(vec![ci.clone()], ii.clone()),
        ));
        assert!(tree.is_subtype(
            &TypeRef::argument_map(),
            &TypeRef::map(TypeRef::String, TypeRef::NullableAny)
        ));
        assert!(!tree.is_subtype(&TypeRef::NullableAny, &TypeRef::Any));
    }

    #[test]
    fn test_interface_members_include_inherited_real_members_once() {
        let mut tree = Tree::new();
        let a = tree.add_class(root(), "A", ClassKind::Interface);
        let fa = tree.add_function(Parent::Class(a), "fa", TypeRef::Int);
        let b = tree.add_class(root(), "B", ClassKind::Interface);
        tree.class_mut(b).supertypes = vec![TypeRef::class(a)];
        let fb = tree.add_function(Parent::Class(b), "fb", TypeRef::Int);
        let size = tree.add_property(b, "size", TypeRef::Long, false, None);
        tree.add_fake_overrides(b);

        let members = tree.interface_members(b);
        assert_eq!(
            members,
            vec![Member::Function(fb), Member::Property(size), Member::Function(fa)]
        );
    }
}
