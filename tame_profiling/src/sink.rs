// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::resolver::{
    DefaultLabelResolver, LabelResolver, default_entry_label, default_function_label,
};
use tame_engine::module::Module;
use tame_engine::trace::{ScopeKind, TraceMask, TraceOutcome, TraceSink};

type BackendGuard = tracy_client::Span;

struct ScopeEntry {
    kind: ScopeKind,
    depth: usize,
    label: String,
    // Closes the span when dropped.
    _span: Option<BackendGuard>,
}

/// A `TraceSink` that emits Tracy spans via `tracy-client`.
pub struct ProfilingTraceSink<R = DefaultLabelResolver> {
    resolver: R,
    request: Option<BackendGuard>,
    stack: Vec<ScopeEntry>,
}

impl ProfilingTraceSink<DefaultLabelResolver> {
    /// Create a new sink with element-based labels.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: LabelResolver> ProfilingTraceSink<R> {
    /// Create a new sink with a custom label resolver.
    #[must_use]
    pub fn with_resolver(resolver: R) -> Self {
        Self {
            resolver,
            request: None,
            stack: Vec::new(),
        }
    }

    /// Returns the resolver.
    #[must_use]
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Returns the number of scopes currently open.
    #[must_use]
    pub fn active_scopes(&self) -> usize {
        self.stack.len()
    }

    fn resolve_label(
        &mut self,
        module: &Module,
        kind: ScopeKind,
        element: &str,
        name: &str,
    ) -> String {
        match kind {
            ScopeKind::Entry(_) => self
                .resolver
                .entry_label(element, name, module)
                .unwrap_or_else(|| default_entry_label(element, name)),
            ScopeKind::Function => self
                .resolver
                .function_label(element, name, module)
                .unwrap_or_else(|| default_function_label(element, name)),
        }
    }

    fn start_span(function_name: &str, label: &str, depth: usize) -> Option<BackendGuard> {
        let client = tracy_client::Client::running()?;
        let line = u32::try_from(depth).unwrap_or(u32::MAX);
        Some(client.span_alloc(Some(label), function_name, "tame_engine", line, 0))
    }

    fn on_scope_exit(&mut self, kind: ScopeKind, depth: usize) {
        match self.stack.last() {
            Some(top) if top.kind == kind && top.depth == depth => {
                self.stack.pop();
            }
            // Out of sync: an exit was missed somewhere, so nothing open can be trusted.
            _ => self.drop_active_scopes(),
        }
    }

    // Innermost first, so nested spans close before their parents.
    fn drop_active_scopes(&mut self) {
        while self.stack.pop().is_some() {}
    }
}

impl<R: LabelResolver> TraceSink for ProfilingTraceSink<R> {
    fn mask(&self) -> TraceMask {
        TraceMask::REQUEST | TraceMask::SCOPE
    }

    fn request_start(&mut self, _module: &Module, label: &str) {
        self.drop_active_scopes();
        self.request = Self::start_span("tame_engine.request", &format!("request:{label}"), 0);
    }

    fn scope_enter(
        &mut self,
        module: &Module,
        kind: ScopeKind,
        depth: usize,
        element: &str,
        name: &str,
    ) {
        let label = self.resolve_label(module, kind, element, name);
        let function_name = match kind {
            ScopeKind::Entry(_) => "tame_engine.entry",
            ScopeKind::Function => "tame_engine.function",
        };
        let span = Self::start_span(function_name, &label, depth);
        self.stack.push(ScopeEntry {
            kind,
            depth,
            label,
            _span: span,
        });
    }

    fn scope_exit(
        &mut self,
        _module: &Module,
        kind: ScopeKind,
        depth: usize,
        _element: &str,
        _name: &str,
    ) {
        self.on_scope_exit(kind, depth);
    }

    fn request_end(&mut self, _module: &Module, _outcome: TraceOutcome<'_>) {
        self.drop_active_scopes();
        self.request = None;
    }
}

impl<R> Default for ProfilingTraceSink<R>
where
    R: LabelResolver + Default,
{
    fn default() -> Self {
        Self::with_resolver(R::default())
    }
}

impl<R> std::fmt::Debug for ProfilingTraceSink<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let open: Vec<&str> = self.stack.iter().map(|s| s.label.as_str()).collect();
        f.debug_struct("ProfilingTraceSink")
            .field("open", &open)
            .field("in_request", &self.request.is_some())
            .finish_non_exhaustive()
    }
}
