//! Diagnostic records and the sink the host compiler hands to the rewriter.
//!
//! The rewriter never prints. Every message it produces goes through a
//! [`DiagnosticSink`] as a `(severity, message, span)` triple; the host
//! decides how to present it.

use std::fmt;

use serde::Serialize;

use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Aborts compilation of the file.
    Error,
    /// Informational, e.g. a dump of a rewritten class.
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// A single reported message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Source range of the declaration at fault, if it exists in source.
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            severity,
            message: message.into(),
            span: span.filter(|s| !s.is_synthetic()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// Receiver of diagnostics.
pub trait DiagnosticSink {
    fn report(&mut self, severity: Severity, message: String, span: Option<Span>);
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, severity: Severity, message: String, span: Option<Span>) {
        self.push(Diagnostic::new(severity, message, span));
    }
}

/// Serialize diagnostics as a JSON array for machine consumers.
pub fn to_json(diagnostics: &[Diagnostic]) -> String {
    serde_json::to_string(diagnostics).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_collects_and_drops_synthetic_spans() {
        let mut sink: Vec<Diagnostic> = Vec::new();
        sink.report(Severity::Error, "boom".into(), Some(Span::new(1, 4)));
        sink.report(Severity::Warning, "dump".into(), Some(Span::SYNTHETIC));
        assert_eq!(sink.len(), 2);
        assert!(sink[0].is_error());
        assert_eq!(sink[0].span, Some(Span::new(1, 4)));
        assert_eq!(sink[1].span, None);
        assert_eq!(sink[1].to_string(), "warning: dump");
    }

    #[test]
    fn json_export() {
        let diags = vec![Diagnostic::new(Severity::Error, "bad", Some(Span::new(0, 3)))];
        assert_eq!(
            to_json(&diags),
            r#"[{"severity":"error","message":"bad","span":{"start":0,"end":3}}]"#
        );
    }
}
