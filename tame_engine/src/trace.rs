// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing hooks for `tame_engine`.
//!
//! There are two channels, both selected by a [`TraceMask`]:
//!
//! - In-band: `TRACE-<type>` cues appended to the [`Response`] for the [`TraceType`]s enabled in
//!   [`RequestOptions::trace`]. Clients may show or ignore them.
//! - Out-of-band: a [`TraceSink`] passed in [`RequestOptions::sink`] receives request, operation and
//!   scope events for the bits its [`TraceSink::mask`] enables.
//!
//! [`Response`]: crate::request::Response
//! [`RequestOptions::trace`]: crate::request::RequestOptions::trace
//! [`RequestOptions::sink`]: crate::request::RequestOptions::sink

use core::fmt;

use crate::element::BlockEntryType;
use crate::interrupt::Interrupt;
use crate::module::Module;
use crate::opcode::Opcode;

/// The subtype of a `TRACE` cue.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TraceType {
    /// Request-level decisions: which action is processed, permission checks.
    Interpreter,
    /// Frames pushed and popped.
    Context,
    /// Entry blocks resolved and run.
    Entry,
    /// Branch and loop decisions.
    Control,
    /// Function calls and returns.
    Function,
    /// Variable reads and writes.
    Value,
    /// Every dispatched operation.
    Internal,
}

impl TraceType {
    /// Every trace type.
    pub const ALL: [Self; 7] = [
        Self::Interpreter,
        Self::Context,
        Self::Entry,
        Self::Control,
        Self::Function,
        Self::Value,
        Self::Internal,
    ];

    /// Returns the mask bit for this type.
    #[must_use]
    pub const fn mask(self) -> TraceMask {
        TraceMask(1 << (self as u32))
    }

    /// Returns the upper-case cue suffix.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Interpreter => "INTERPRETER",
            Self::Context => "CONTEXT",
            Self::Entry => "ENTRY",
            Self::Control => "CONTROL",
            Self::Function => "FUNCTION",
            Self::Value => "VALUE",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for TraceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of trace events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TraceMask(u32);

impl core::ops::BitOr for TraceMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for TraceMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl TraceMask {
    /// No tracing.
    pub const NONE: Self = Self(0);
    /// Every `TRACE` cue type.
    pub const ALL_CUES: Self = Self(0x7f);
    /// Trace request boundaries.
    ///
    /// Enables:
    /// - [`TraceSink::request_start`]
    /// - [`TraceSink::request_end`]
    pub const REQUEST: Self = Self(1 << 8);
    /// Trace each dispatched operation.
    ///
    /// Enables:
    /// - [`TraceSink::operation`]
    pub const OPERATION: Self = Self(1 << 9);
    /// Trace entry blocks and function calls.
    ///
    /// Enables:
    /// - [`TraceSink::scope_enter`]
    /// - [`TraceSink::scope_exit`]
    pub const SCOPE: Self = Self(1 << 10);

    /// Returns `true` if this mask includes all bits in `other`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Returns `true` if `TRACE` cues of type `t` are enabled.
    #[must_use]
    pub const fn traces(self, t: TraceType) -> bool {
        self.contains(t.mask())
    }
}

impl Default for TraceMask {
    fn default() -> Self {
        Self::NONE
    }
}

impl From<TraceType> for TraceMask {
    fn from(t: TraceType) -> Self {
        t.mask()
    }
}

/// The kind of scope being entered/exited.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    /// An entry block run by the dispatcher.
    Entry(BlockEntryType),
    /// A function activation.
    Function,
}

/// Request outcome for tracing.
#[derive(Clone, Debug)]
pub enum TraceOutcome<'a> {
    /// The request ran to completion, or was ended by `FINISH`, `QUIT` or `END`.
    Ok,
    /// The request was aborted by a signal that became an `ERROR` or `FATAL` cue.
    Interrupted(&'a Interrupt),
}

/// A trace sink that can receive engine events.
pub trait TraceSink {
    /// Returns the set of events the sink wants.
    fn mask(&self) -> TraceMask {
        TraceMask::NONE
    }

    /// Called at the start of a request.
    ///
    /// Called only if `mask()` includes [`TraceMask::REQUEST`].
    ///
    /// - `module`: module being executed
    /// - `label`: the action identity, or `"initialize"`
    fn request_start(&mut self, _module: &Module, _label: &str) {}

    /// Called for each dispatched operation.
    ///
    /// Called only if `mask()` includes [`TraceMask::OPERATION`].
    ///
    /// - `opcode`: the operation being dispatched
    /// - `count`: operations dispatched so far in this request, including this one
    fn operation(&mut self, _module: &Module, _opcode: Opcode, _count: u64) {}

    /// Called when entering an entry block or function.
    ///
    /// Called only if `mask()` includes [`TraceMask::SCOPE`].
    ///
    /// - `kind`: the kind of scope being entered
    /// - `depth`: frame depth after entering the scope
    /// - `element`: identity of the element the scope runs on
    /// - `name`: the entry key (e.g. `ONACTION(look)`) or function name
    fn scope_enter(
        &mut self,
        _module: &Module,
        _kind: ScopeKind,
        _depth: usize,
        _element: &str,
        _name: &str,
    ) {
    }

    /// Called when exiting an entry block or function, whether or not it was interrupted.
    ///
    /// Called only if `mask()` includes [`TraceMask::SCOPE`].
    ///
    /// - `depth`: frame depth before exiting the scope
    fn scope_exit(
        &mut self,
        _module: &Module,
        _kind: ScopeKind,
        _depth: usize,
        _element: &str,
        _name: &str,
    ) {
    }

    /// Called at the end of a request.
    ///
    /// Called only if `mask()` includes [`TraceMask::REQUEST`].
    fn request_end(&mut self, _module: &Module, _outcome: TraceOutcome<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cue_bits_do_not_overlap_sink_bits() {
        let mut all = TraceMask::NONE;
        for t in TraceType::ALL {
            all |= t.mask();
        }
        assert_eq!(all, TraceMask::ALL_CUES);
        assert!(!all.contains(TraceMask::REQUEST));
        assert!(!all.contains(TraceMask::OPERATION));
        assert!(!all.contains(TraceMask::SCOPE));
        assert!(TraceMask::ALL_CUES.traces(TraceType::Internal));
        assert!(!TraceMask::REQUEST.traces(TraceType::Entry));
    }
}
