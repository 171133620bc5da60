//! The rewriting pass over one compilation unit.
//!
//! Classes are visited in textual order, each before the classes nested in
//! it. A class with nothing to rewrite is left exactly as it was. The first
//! failure is reported to the sink and aborts the pass; the tree is then in
//! a partially rewritten state and must be discarded by the host.

use stitch_common::diagnostic::{DiagnosticSink, Severity};
use stitch_ir::printer::print_class;
use stitch_ir::{ClassId, FieldId, Member, Tree};
use tracing::{debug, trace};

use crate::classify::classify;
use crate::config::RewriteConfig;
use crate::data_like::generate_data_members;
use crate::error::RewriteError;
use crate::interfaces::DelegateInterfaces;
use crate::markers::{DelegateKind, TriggerSet};
use crate::strategy::{self, HolderCache};

/// A delegate field the pass rewrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewrittenField {
    pub class: ClassId,
    pub field: FieldId,
    pub kind: DelegateKind,
}

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewriteSummary {
    pub rewritten: Vec<RewrittenField>,
    /// Erasable holders that received impl functions.
    pub erasable_holders: Vec<ClassId>,
    /// Classes that received generated structural members.
    pub data_like: Vec<ClassId>,
}

impl RewriteSummary {
    pub fn is_empty(&self) -> bool {
        self.rewritten.is_empty() && self.erasable_holders.is_empty() && self.data_like.is_empty()
    }
}

/// Rewrite every marked delegate in `tree`.
///
/// Errors are reported to `sink` with the location of the declaration at
/// fault before being returned.
pub fn rewrite_file(
    tree: &mut Tree,
    triggers: &TriggerSet,
    config: &RewriteConfig,
    sink: &mut dyn DiagnosticSink,
) -> Result<RewriteSummary, RewriteError> {
    let mut pass = Pass {
        triggers,
        config,
        holders: HolderCache::default(),
        summary: RewriteSummary::default(),
    };
    let roots: Vec<ClassId> = tree
        .top_level()
        .iter()
        .filter_map(|m| match m {
            Member::Class(c) => Some(*c),
            _ => None,
        })
        .collect();
    for class in roots {
        if let Err(err) = pass.visit(tree, class, sink) {
            sink.report(Severity::Error, err.to_string(), Some(err.span()));
            return Err(err);
        }
    }
    pass.summary.erasable_holders = pass.holders.holders();
    debug!(
        fields = pass.summary.rewritten.len(),
        holders = pass.summary.erasable_holders.len(),
        data_like = pass.summary.data_like.len(),
        "rewrite pass finished"
    );
    Ok(pass.summary)
}

struct Pass<'a> {
    triggers: &'a TriggerSet,
    config: &'a RewriteConfig,
    holders: HolderCache,
    summary: RewriteSummary,
}

impl Pass<'_> {
    fn visit(
        &mut self,
        tree: &mut Tree,
        class: ClassId,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<(), RewriteError> {
        let nested: Vec<ClassId> = tree.class(class).nested_classes().collect();
        let changed = self.rewrite_class(tree, class)?;
        if changed && self.config.dump_rewritten {
            sink.report(Severity::Warning, print_class(tree, class), Some(tree.class(class).span));
        }
        for inner in nested {
            self.visit(tree, inner, sink)?;
        }
        Ok(())
    }

    /// Returns whether `class` was modified.
    fn rewrite_class(&mut self, tree: &mut Tree, class: ClassId) -> Result<bool, RewriteError> {
        let class_span = tree.class(class).span;
        let is_holder = self.triggers.is_erasable_holder(tree, class);
        let is_data_like = self.triggers.is_data_like(tree, class);
        let candidates = classify(tree, class, self.triggers);
        if candidates.is_empty() && !is_holder && !is_data_like {
            trace!(class = %tree.fq_name(class), "nothing to rewrite");
            return Ok(false);
        }

        if is_holder {
            self.holders.ensure(tree, class).map_err(|e| e.or_span(class_span))?;
        }

        let interfaces = if candidates.iter().any(|c| c.kind != DelegateKind::Erasable) {
            DelegateInterfaces::resolve(tree, class)?
        } else {
            DelegateInterfaces::default()
        };
        for candidate in &candidates {
            let field_span = tree.field(candidate.field).span.or(class_span);
            let outcome = strategy::apply(tree, class, candidate, &interfaces, &mut self.holders)
                .map_err(|e| e.or_span(field_span))?;
            if outcome.removes_field() {
                tree.remove_member(class, Member::Field(candidate.field));
            }
            self.summary.rewritten.push(RewrittenField {
                class,
                field: candidate.field,
                kind: candidate.kind,
            });
        }

        if is_data_like {
            generate_data_members(tree, class).map_err(|e| e.or_span(class_span))?;
            self.summary.data_like.push(class);
        }
        Ok(true)
    }
}
