//! Rewrite strategies, one per [`DelegateKind`].

pub mod erasable;
pub mod lazy;
pub mod mixin;
pub mod proxy;

use stitch_ir::{ClassId, FieldId, Tree};
use tracing::debug;

use crate::classify::DelegateField;
use crate::error::RewriteError;
use crate::interfaces::DelegateInterfaces;
use crate::markers::DelegateKind;

pub use erasable::{compile_holder, inline_use_site, ErasableImpl, HolderCache};
pub use lazy::rewrite_lazy;
pub use mixin::rewrite_mixin;
pub use proxy::rewrite_proxy;

/// What a strategy did with a delegate field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Members now go through the class's proxy operators.
    Proxied,
    /// The storage was replaced by this lazy field.
    Lazy(FieldId),
    /// The storage now holds an instance of this generated class.
    Mixin(ClassId),
    /// The delegated property was inlined.
    Inlined,
}

impl Outcome {
    /// Whether the original storage field is left unused and must go.
    pub fn removes_field(self) -> bool {
        matches!(self, Outcome::Proxied | Outcome::Lazy(_))
    }
}

/// Run the strategy `delegate` asks for.
pub fn apply(
    tree: &mut Tree,
    class: ClassId,
    delegate: &DelegateField,
    interfaces: &DelegateInterfaces,
    holders: &mut HolderCache,
) -> Result<Outcome, RewriteError> {
    debug!(
        field = %tree.field(delegate.field).name,
        kind = delegate.kind.name(),
        "applying strategy"
    );
    match delegate.kind {
        DelegateKind::Proxy => {
            let iface = interfaces.interface_of(tree, delegate.field)?;
            rewrite_proxy(tree, class, iface)?;
            Ok(Outcome::Proxied)
        }
        DelegateKind::Lazy => rewrite_lazy(tree, class, delegate.field).map(Outcome::Lazy),
        DelegateKind::Mixin => {
            let iface = interfaces.interface_of(tree, delegate.field)?;
            rewrite_mixin(tree, class, delegate.field, iface).map(Outcome::Mixin)
        }
        DelegateKind::Erasable => {
            let span = tree.field(delegate.field).span;
            let holder = tree.field(delegate.field).ty.class_id();
            let (Some(property), Some(holder)) = (delegate.property, holder) else {
                return Err(RewriteError::internal(
                    "erasable use site without a holder property",
                    span,
                ));
            };
            let compiled = holders.ensure(tree, holder)?;
            inline_use_site(tree, class, property, &compiled)?;
            Ok(Outcome::Inlined)
        }
    }
}
