//! Per-pass render context: a label stack for nesting diagnostics and the
//! diagnostics collected along the way.

use crate::arena::NodeId;
use imagery_common::SynthError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A problem or notice raised while rendering one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub node: Option<NodeId>,
    /// Label path at the time of the report, `/` separated.
    pub label: String,
    pub code: String,
    pub message: String,
}

/// Explicit context threaded through a render pass.
#[derive(Debug, Default)]
pub struct RenderContext {
    labels: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_label(&mut self, label: impl Into<String>) {
        self.labels.push(label.into());
    }

    pub fn pop_label(&mut self) {
        self.labels.pop();
    }

    /// Run `f` with `label` pushed.
    pub fn with_label<R>(&mut self, label: impl Into<String>, f: impl FnOnce(&mut Self) -> R) -> R {
        self.push_label(label);
        let out = f(self);
        self.pop_label();
        out
    }

    pub fn label_path(&self) -> String {
        self.labels.join("/")
    }

    pub fn info(&mut self, node: Option<NodeId>, code: &str, message: impl Into<String>) {
        self.record(Severity::Info, node, code, message.into());
    }

    pub fn warn(&mut self, node: Option<NodeId>, code: &str, message: impl Into<String>) {
        self.record(Severity::Warning, node, code, message.into());
    }

    /// Record a node scoped failure.
    pub fn error(&mut self, node: Option<NodeId>, err: &SynthError) {
        self.record(Severity::Error, node, err.code(), err.to_string());
    }

    fn record(&mut self, severity: Severity, node: Option<NodeId>, code: &str, message: String) {
        let label = self.label_path();
        match severity {
            Severity::Info => tracing::info!(label = %label, node = ?node, code, "{}", message),
            Severity::Warning => tracing::warn!(label = %label, node = ?node, code, "{}", message),
            Severity::Error => tracing::error!(label = %label, node = ?node, code, "{}", message),
        }
        self.diagnostics.push(Diagnostic {
            severity,
            node,
            label,
            code: code.to_string(),
            message,
        });
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}
