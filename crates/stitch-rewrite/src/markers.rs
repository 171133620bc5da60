//! Marker resolution.
//!
//! Configured marker names are looked up once per run. Callable markers
//! map every one of their overloads to a [`DelegateKind`]; annotation
//! markers map to the annotation class. Names that do not resolve in the
//! current tree are dropped: the feature they enable is unavailable.

use rustc_hash::{FxHashMap, FxHashSet};
use stitch_ir::{ClassId, FunctionId, Tree};
use tracing::{debug, warn};

use crate::config::RewriteConfig;

/// Strategy requested by a delegate field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelegateKind {
    Proxy,
    Lazy,
    Mixin,
    Erasable,
}

impl DelegateKind {
    pub fn name(self) -> &'static str {
        match self {
            DelegateKind::Proxy => "proxy",
            DelegateKind::Lazy => "lazy",
            DelegateKind::Mixin => "mixin",
            DelegateKind::Erasable => "erasable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    Callable(DelegateKind),
    Erasable,
    DataLike,
}

fn marker_kind(simple_name: &str) -> Option<MarkerKind> {
    match simple_name {
        "proxyDelegate" => Some(MarkerKind::Callable(DelegateKind::Proxy)),
        "lazyDelegate" => Some(MarkerKind::Callable(DelegateKind::Lazy)),
        "mixin" => Some(MarkerKind::Callable(DelegateKind::Mixin)),
        "ErasableDelegate" => Some(MarkerKind::Erasable),
        "DataLike" => Some(MarkerKind::DataLike),
        _ => None,
    }
}

/// The resolved markers of one run. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerSet {
    callables: FxHashMap<FunctionId, DelegateKind>,
    erasable: FxHashSet<ClassId>,
    data_like: FxHashSet<ClassId>,
}

impl TriggerSet {
    pub fn resolve(tree: &Tree, config: &RewriteConfig) -> TriggerSet {
        let mut set = TriggerSet::default();
        for fq_name in &config.markers {
            let simple = fq_name.rsplit('.').next().unwrap_or(fq_name);
            let Some(kind) = marker_kind(simple) else {
                warn!(marker = %fq_name, "unknown marker name ignored");
                continue;
            };
            match kind {
                MarkerKind::Callable(kind) => {
                    let overloads = tree.find_functions(fq_name);
                    debug!(
                        marker = %fq_name,
                        overloads = overloads.len(),
                        "resolved callable marker"
                    );
                    for function in overloads {
                        set.callables.insert(function, kind);
                    }
                }
                MarkerKind::Erasable | MarkerKind::DataLike => {
                    let Some(class) = tree.find_class(fq_name) else {
                        debug!(marker = %fq_name, "annotation marker not present");
                        continue;
                    };
                    if kind == MarkerKind::Erasable {
                        set.erasable.insert(class);
                    } else {
                        set.data_like.insert(class);
                    }
                }
            }
        }
        set
    }

    /// Strategy requested by a call of `function`, if it is a trigger.
    pub fn kind_of(&self, function: FunctionId) -> Option<DelegateKind> {
        self.callables.get(&function).copied()
    }

    /// Whether `class` is annotated as an erasable delegate holder.
    pub fn is_erasable_holder(&self, tree: &Tree, class: ClassId) -> bool {
        tree.class(class)
            .annotations
            .iter()
            .any(|a| self.erasable.contains(a))
    }

    pub fn is_data_like(&self, tree: &Tree, class: ClassId) -> bool {
        tree.class(class)
            .annotations
            .iter()
            .any(|a| self.data_like.contains(a))
    }

    pub fn is_empty(&self) -> bool {
        self.callables.is_empty() && self.erasable.is_empty() && self.data_like.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stitch_ir::{ClassKind, Parent, TypeRef};

    fn library(tree: &mut Tree) -> (Vec<FunctionId>, ClassId) {
        let pkg = Parent::Package("stitch".into());
        let lazy_a = tree.add_function(pkg.clone(), "lazyDelegate", TypeRef::Any);
        let lazy_b = tree.add_function(pkg.clone(), "lazyDelegate", TypeRef::Any);
        let erasable = tree.add_class(pkg, "ErasableDelegate", ClassKind::AnnotationClass);
        (vec![lazy_a, lazy_b], erasable)
    }

    #[test]
    fn test_every_overload_is_a_trigger() {
        let mut tree = Tree::new();
        let (lazy, _) = library(&mut tree);
        let set = TriggerSet::resolve(&tree, &RewriteConfig::default());
        for f in lazy {
            assert_eq!(set.kind_of(f), Some(DelegateKind::Lazy));
        }
    }

    #[test]
    fn test_unresolved_markers_are_dropped() {
        let mut tree = Tree::new();
        library(&mut tree);
        let set = TriggerSet::resolve(&tree, &RewriteConfig::default());
        // proxyDelegate, mixin and DataLike are not declared in this tree.
        assert_eq!(set.callables.len(), 2);
        assert!(set.data_like.is_empty());
        assert_eq!(set.erasable.len(), 1);
    }

    #[test]
    fn test_unknown_simple_name_is_ignored() {
        let mut tree = Tree::new();
        tree.add_function(Parent::Package("acme".into()), "proxify", TypeRef::Any);
        let config = RewriteConfig {
            markers: vec!["acme.proxify".into()],
            dump_rewritten: false,
        };
        assert!(TriggerSet::resolve(&tree, &config).is_empty());
    }

    #[test]
    fn test_annotation_lookup() {
        let mut tree = Tree::new();
        let (_, erasable) = library(&mut tree);
        let holder = tree.add_class(Parent::Package("app".into()), "LateInit", ClassKind::Class);
        tree.class_mut(holder).annotations.push(erasable);
        let plain = tree.add_class(Parent::Package("app".into()), "Plain", ClassKind::Class);
        let set = TriggerSet::resolve(&tree, &RewriteConfig::default());
        assert!(set.is_erasable_holder(&tree, holder));
        assert!(!set.is_erasable_holder(&tree, plain));
        assert!(!set.is_data_like(&tree, holder));
    }
}
