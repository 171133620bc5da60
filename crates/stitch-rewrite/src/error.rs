//! Failures that abort rewriting of a file.

use stitch_common::span::Span;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    /// The declaration does not provide the shape a strategy needs.
    #[error("{message}")]
    Configuration { message: String, span: Span },

    /// The interface a delegate field services cannot be determined.
    #[error("{message}")]
    Ambiguity { message: String, span: Span },

    /// The tree handed over by the front-end is inconsistent.
    #[error("internal invariant violated: {message}")]
    InternalInvariant { message: String, span: Span },
}

impl RewriteError {
    pub fn configuration(message: impl Into<String>, span: Span) -> Self {
        RewriteError::Configuration {
            message: message.into(),
            span,
        }
    }

    pub fn ambiguity(message: impl Into<String>, span: Span) -> Self {
        RewriteError::Ambiguity {
            message: message.into(),
            span,
        }
    }

    pub fn internal(message: impl Into<String>, span: Span) -> Self {
        RewriteError::InternalInvariant {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            RewriteError::Configuration { span, .. }
            | RewriteError::Ambiguity { span, .. }
            | RewriteError::InternalInvariant { span, .. } => *span,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            RewriteError::Configuration { message, .. }
            | RewriteError::Ambiguity { message, .. }
            | RewriteError::InternalInvariant { message, .. } => message,
        }
    }

    /// Stable code shown by the renderer.
    pub fn code(&self) -> &'static str {
        match self {
            RewriteError::Configuration { .. } => "R0001",
            RewriteError::Ambiguity { .. } => "R0002",
            RewriteError::InternalInvariant { .. } => "R0003",
        }
    }

    /// Replace a synthetic span with `fallback`.
    pub fn or_span(mut self, fallback: Span) -> Self {
        match &mut self {
            RewriteError::Configuration { span, .. }
            | RewriteError::Ambiguity { span, .. }
            | RewriteError::InternalInvariant { span, .. } => *span = span.or(fallback),
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let span = Span::new(0, 1);
        assert_eq!(RewriteError::configuration("x", span).code(), "R0001");
        assert_eq!(RewriteError::ambiguity("x", span).code(), "R0002");
        assert_eq!(RewriteError::internal("x", span).code(), "R0003");
    }

    #[test]
    fn test_internal_display_is_prefixed() {
        let err = RewriteError::internal("no field read", Span::SYNTHETIC);
        assert_eq!(err.to_string(), "internal invariant violated: no field read");
        assert_eq!(err.message(), "no field read");
    }

    #[test]
    fn test_or_span_only_replaces_synthetic() {
        let fallback = Span::new(4, 9);
        let err = RewriteError::configuration("x", Span::SYNTHETIC).or_span(fallback);
        assert_eq!(err.span(), fallback);
        let err = RewriteError::configuration("x", Span::new(1, 2)).or_span(fallback);
        assert_eq!(err.span(), Span::new(1, 2));
    }
}
