// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Request inputs and the [`Response`] handed back to the client.

use core::fmt;

use crate::trace::{TraceMask, TraceSink, TraceType};
use crate::value::fold_identity;

/// What a cue asks the client to do.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CueKind {
    /// Stop the game.
    Quit,
    /// Save the game under the cue's name.
    Save,
    /// Load the game saved under the cue's name.
    Load,
    /// Show plain text.
    Text,
    /// Show formatted text.
    TextF,
    /// Wait the given number of milliseconds.
    Wait,
    /// Wait for the user.
    Pause,
    /// Diagnostic trace output.
    Trace(TraceType),
    /// A hint for the user.
    Tip,
    /// Out-of-story information.
    Info,
    /// A script error.
    Error,
    /// The request was aborted by the engine.
    Fatal,
}

impl fmt::Display for CueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quit => f.write_str("QUIT"),
            Self::Save => f.write_str("SAVE"),
            Self::Load => f.write_str("LOAD"),
            Self::Text => f.write_str("TEXT"),
            Self::TextF => f.write_str("TEXTF"),
            Self::Wait => f.write_str("WAIT"),
            Self::Pause => f.write_str("PAUSE"),
            Self::Trace(t) => write!(f, "TRACE-{t}"),
            Self::Tip => f.write_str("TIP"),
            Self::Info => f.write_str("INFO"),
            Self::Error => f.write_str("ERROR"),
            Self::Fatal => f.write_str("FATAL"),
        }
    }
}

/// The payload of a cue.
#[derive(Clone, Debug, PartialEq)]
pub enum CueContent {
    /// No payload.
    None,
    /// A boolean.
    Boolean(bool),
    /// An integer.
    Integer(i64),
    /// A float.
    Float(f64),
    /// A string.
    String(String),
}

/// One ordered instruction to the client.
#[derive(Clone, Debug, PartialEq)]
pub struct Cue {
    /// What to do.
    pub kind: CueKind,
    /// With what.
    pub content: CueContent,
}

impl Cue {
    /// Creates a cue with string content.
    #[must_use]
    pub fn text(kind: CueKind, s: impl Into<String>) -> Self {
        Self {
            kind,
            content: CueContent::String(s.into()),
        }
    }

    /// Creates a cue with no content.
    #[must_use]
    pub fn bare(kind: CueKind) -> Self {
        Self {
            kind,
            content: CueContent::None,
        }
    }

    /// Returns the string content, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.content {
            CueContent::String(s) => Some(s),
            _ => None,
        }
    }
}

/// The result of one request.
///
/// A response is valid even when the request was aborted: it holds every cue emitted up to that
/// point, followed by the `ERROR` or `FATAL` cue describing the abort.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Response {
    /// Cues in emission order.
    pub cues: Vec<Cue>,
    /// Operations dispatched.
    pub operations_executed: u64,
    /// Deepest function nesting reached.
    pub function_depth_peak: usize,
    /// Wall-clock time spent, in nanoseconds.
    pub request_nanos: u64,
}

impl Response {
    /// Iterates cues of `kind`.
    pub fn cues_of(&self, kind: CueKind) -> impl Iterator<Item = &Cue> {
        self.cues.iter().filter(move |c| c.kind == kind)
    }

    /// Concatenates the content of every `TEXT` and `TEXTF` cue.
    #[must_use]
    pub fn text(&self) -> String {
        self.cues
            .iter()
            .filter(|c| matches!(c.kind, CueKind::Text | CueKind::TextF))
            .filter_map(Cue::as_str)
            .collect()
    }

    /// Returns `true` if the request emitted a `QUIT` cue.
    #[must_use]
    pub fn quit(&self) -> bool {
        self.cues_of(CueKind::Quit).next().is_some()
    }

    /// Returns the first `ERROR` or `FATAL` cue.
    #[must_use]
    pub fn failure(&self) -> Option<&Cue> {
        self.cues
            .iter()
            .find(|c| matches!(c.kind, CueKind::Error | CueKind::Fatal))
    }
}

/// Per-request options.
#[derive(Default)]
pub struct RequestOptions<'a> {
    /// `TRACE` cue types to emit.
    pub trace: TraceMask,
    /// Out-of-band event sink.
    pub sink: Option<&'a mut dyn TraceSink>,
}

impl fmt::Debug for RequestOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("trace", &self.trace)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl<'a> RequestOptions<'a> {
    /// Options emitting the given `TRACE` cue types.
    #[must_use]
    pub fn traced(trace: TraceMask) -> Self {
        Self { trace, sink: None }
    }

    /// Attaches a sink.
    #[must_use]
    pub fn with_sink(mut self, sink: &'a mut dyn TraceSink) -> Self {
        self.sink = Some(sink);
        self
    }
}

/// The targets of an action invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionTarget {
    /// General actions.
    None,
    /// Transitive actions, or ditransitive actions given one object.
    Object(String),
    /// Ditransitive actions.
    Objects(String, String),
    /// Modal actions.
    Mode(String),
    /// Open actions.
    Text(String),
}

/// An action with its targets, already resolved from user input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionInvocation {
    /// Action identity.
    pub action: String,
    /// Targets.
    pub target: ActionTarget,
}

impl ActionInvocation {
    /// A general action.
    #[must_use]
    pub fn general(action: &str) -> Self {
        Self {
            action: fold_identity(action),
            target: ActionTarget::None,
        }
    }

    /// A transitive action on `object`.
    #[must_use]
    pub fn transitive(action: &str, object: &str) -> Self {
        Self {
            action: fold_identity(action),
            target: ActionTarget::Object(fold_identity(object)),
        }
    }

    /// A ditransitive action on `object` with `object2`.
    #[must_use]
    pub fn ditransitive(action: &str, object: &str, object2: &str) -> Self {
        Self {
            action: fold_identity(action),
            target: ActionTarget::Objects(fold_identity(object), fold_identity(object2)),
        }
    }

    /// A modal action in `mode`.
    #[must_use]
    pub fn modal(action: &str, mode: &str) -> Self {
        Self {
            action: fold_identity(action),
            target: ActionTarget::Mode(fold_identity(mode)),
        }
    }

    /// An open action with free `text`. The text keeps its case.
    #[must_use]
    pub fn open(action: &str, text: &str) -> Self {
        Self {
            action: fold_identity(action),
            target: ActionTarget::Text(text.into()),
        }
    }
}
