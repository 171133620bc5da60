//! Ariadne-based rendering of rewrite diagnostics.
//!
//! The rewriter itself only reports `(severity, message, span)` triples.
//! Hosts that own the source text can turn those, or a [`RewriteError`],
//! into labeled reports for a terminal.

use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};
use stitch_common::diagnostic::{Diagnostic, Severity};
use stitch_common::span::Span;

use crate::error::RewriteError;

// ── Help Text ──────────────────────────────────────────────────────────

fn help_for(error: &RewriteError) -> Option<&'static str> {
    match error {
        RewriteError::Configuration { .. } => {
            Some("the delegate declaration does not match what its marker requires")
        }
        RewriteError::Ambiguity { .. } => {
            Some("give the delegate field the exact interface it should implement")
        }
        RewriteError::InternalInvariant { .. } => None,
    }
}

// ── Span Helpers ───────────────────────────────────────────────────────

fn span_range(span: Option<Span>) -> Option<Range<usize>> {
    span.filter(|s| !s.is_synthetic())
        .map(|s| s.start as usize..s.end as usize)
}

fn report_kind(severity: Severity) -> ReportKind<'static> {
    match severity {
        Severity::Error => ReportKind::Error,
        Severity::Warning => ReportKind::Warning,
        Severity::Info => ReportKind::Advice,
    }
}

// ── Rendering ──────────────────────────────────────────────────────────

/// Render a reported diagnostic against the file it was reported for.
pub fn render_diagnostic(diagnostic: &Diagnostic, source: &str, filename: &str) -> String {
    render(
        report_kind(diagnostic.severity),
        None,
        &diagnostic.message,
        span_range(diagnostic.span),
        None,
        source,
        filename,
    )
}

/// Render a rewrite error with its code and, where useful, a hint.
pub fn render_error(error: &RewriteError, source: &str, filename: &str) -> String {
    render(
        ReportKind::Error,
        Some(error.code()),
        &error.to_string(),
        span_range(Some(error.span())),
        help_for(error),
        source,
        filename,
    )
}

fn render(
    kind: ReportKind<'_>,
    code: Option<&str>,
    message: &str,
    span: Option<Range<usize>>,
    help: Option<&str>,
    source: &str,
    filename: &str,
) -> String {
    let config = Config::default().with_color(false);
    let source_len = source.len();

    // Clamp a range to be valid within source bounds.
    let clamp = |r: Range<usize>| -> Range<usize> {
        let s = r.start.min(source_len);
        let e = r.end.min(source_len).max(s);
        if s == e && e < source_len {
            s..e + 1
        } else if s == e {
            s.saturating_sub(1)..e
        } else {
            s..e
        }
    };

    let primary = span.clone().map(clamp).unwrap_or(0..0);
    let mut builder = Report::build(kind, (filename, primary.clone()))
        .with_message(message)
        .with_config(config);
    if let Some(code) = code {
        builder = builder.with_code(code);
    }
    if span.is_some() {
        builder.add_label(
            Label::new((filename, primary))
                .with_message("declared here")
                .with_color(Color::Red),
        );
    }
    if let Some(help) = help {
        builder = builder.with_help(help);
    }

    let mut buf = Vec::new();
    match builder.finish().write((filename, Source::from(source)), &mut buf) {
        Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
        Err(_) => format!("{filename}: {message}"),
    }
}
