//! Compile-time rewriting of marked delegate fields.
//!
//! A class written as `class C : I by proxyDelegate()` (or `lazyDelegate`,
//! `mixin`) has already been lowered by the host front-end into a storage
//! field and naive forwarders. This crate finds those fields, works out
//! which interface each one services and replaces the placeholder with a
//! concrete implementation:
//!
//! - **proxy**: every interface member routes through the class's
//!   `getValue` / `setValue` / `callMember` operators.
//! - **lazy**: the storage becomes a memoised computation, forced on
//!   first use.
//! - **mixin**: the storage holds a generated subclass of the mixin whose
//!   `self` reads the live delegating instance.
//! - **erasable**: a delegated property whose holder class is marked
//!   erasable gets the holder's logic inlined, with no holder object left.
//!
//! Classes marked data-like additionally receive structural `equals`,
//! `hashCode`, `toString` and `compareTo` members.
//!
//! Entry points are [`TriggerSet::resolve`] and [`rewrite_file`].

pub mod classify;
pub mod config;
pub mod data_like;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod interfaces;
pub mod markers;
pub mod strategy;
pub mod synth;

pub use config::{ConfigError, RewriteConfig};
pub use engine::{rewrite_file, RewriteSummary, RewrittenField};
pub use error::RewriteError;
pub use markers::{DelegateKind, TriggerSet};
