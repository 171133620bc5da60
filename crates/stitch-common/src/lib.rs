//! Shared types for the Stitch delegation rewriter.
//!
//! - [`span`]: byte-offset spans and on-demand line/column lookup
//! - [`diagnostic`]: severities, diagnostic records and the sink the host provides

pub mod diagnostic;
pub mod span;
