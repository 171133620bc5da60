//! Reference interpreter for Stitch declaration trees.
//!
//! Executes a [`stitch_ir::Tree`] directly so that the behaviour of a
//! rewritten unit can be observed: proxies answering calls, lazy storage
//! forced once, mixins reading their host, inlined delegates guarding
//! their state.

pub mod error;
pub mod interp;
pub mod value;

pub use error::EvalError;
pub use interp::Interpreter;
pub use value::{LazyCell, LazyState, Object, Value};
