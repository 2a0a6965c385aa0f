// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Non-local control signals.
//!
//! Executors return `Result<(), Interrupt>`; `?` unwinds a signal through nested blocks until the
//! construct that consumes it (a loop for `Break`/`Continue`, a function call for `Return`, an
//! entry block for `End`, the request boundary for everything else).

use core::fmt;

use crate::context::ExecutionError;

/// Which runaway guard tripped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunawayKind {
    /// Too many operations in one request.
    Operations {
        /// The configured threshold.
        limit: u64,
    },
    /// Function calls nested too deeply.
    FunctionDepth {
        /// The configured threshold.
        limit: usize,
    },
}

/// A control signal raised during block execution.
#[derive(Clone, Debug, PartialEq)]
pub enum Interrupt {
    /// Leave the nearest loop.
    Break,
    /// Restart the nearest loop.
    Continue,
    /// End the current action handler.
    End,
    /// End the request.
    Finish,
    /// End the request; the QUIT cue has already been queued.
    Quit,
    /// Return from the running function. The value travels beside the signal.
    Return,
    /// A script raised an error.
    Error(String),
    /// A script misused a value at run time.
    RuntimeError(String),
    /// A runaway guard tripped.
    Runaway(RunawayKind),
    /// The engine could not resolve something it needed, or an engine invariant broke.
    Fatal(ExecutionError),
}

impl Interrupt {
    /// Returns `true` for signals that abort the whole request without reaching any handler.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Runaway(_) | Self::Fatal(_))
    }

    pub(crate) fn runtime(message: impl Into<String>) -> Self {
        Self::RuntimeError(message.into())
    }
}

impl From<ExecutionError> for Interrupt {
    fn from(e: ExecutionError) -> Self {
        Self::Fatal(e)
    }
}

impl fmt::Display for RunawayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operations { limit } => {
                write!(f, "request exceeded {limit} operations")
            }
            Self::FunctionDepth { limit } => {
                write!(f, "function calls nested deeper than {limit}")
            }
        }
    }
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Break => write!(f, "break"),
            Self::Continue => write!(f, "continue"),
            Self::End => write!(f, "end"),
            Self::Finish => write!(f, "finish"),
            Self::Quit => write!(f, "quit"),
            Self::Return => write!(f, "return"),
            Self::Error(m) => write!(f, "error: {m}"),
            Self::RuntimeError(m) => write!(f, "runtime error: {m}"),
            Self::Runaway(k) => write!(f, "runaway request: {k}"),
            Self::Fatal(e) => write!(f, "fatal: {e}"),
        }
    }
}

impl core::error::Error for Interrupt {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Fatal(e) => Some(e),
            _ => None,
        }
    }
}
