// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Mutable runtime state for one game session.
//!
//! A [`ModuleContext`] pairs a shared, immutable [`Module`] with one [`ElementContext`] per
//! non-archetype element, the [`OwnershipMap`], a random source and the runaway [`Limits`] read
//! from the module header.

use core::fmt;
use std::rc::Rc;

use hashbrown::HashMap;
use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::element::{ElementKind, ElementRef, WORLD_IDENTITY};
use crate::format::{DecodeError, Digest};
use crate::module::{HEADER_FUNCTION_DEPTH_MAX, HEADER_RUNAWAY_MAX, Header, Module, ModuleError};
use crate::opcode::Opcode;
use crate::ownership::OwnershipMap;
use crate::state;
use crate::value::{Value, fold_identity};

/// Default operation threshold per request.
pub const DEFAULT_RUNAWAY_MAX: u64 = 100_000;
/// Default function call depth threshold.
pub const DEFAULT_FUNCTION_DEPTH_MAX: usize = 256;

/// Runaway guards applied to every request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Limits {
    /// Operations allowed per request; the operation that reaches this count is refused.
    /// `0` disables the guard.
    pub runaway_max: u64,
    /// Maximum function nesting depth. `0` disables the guard.
    pub function_depth_max: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            runaway_max: DEFAULT_RUNAWAY_MAX,
            function_depth_max: DEFAULT_FUNCTION_DEPTH_MAX,
        }
    }
}

impl Limits {
    /// Reads limits from header attributes, using defaults for missing or unparseable values.
    #[must_use]
    pub fn from_header(header: &Header) -> Self {
        let d = Self::default();
        Self {
            runaway_max: header
                .get(HEADER_RUNAWAY_MAX)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(d.runaway_max),
            function_depth_max: header
                .get(HEADER_FUNCTION_DEPTH_MAX)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(d.function_depth_max),
        }
    }
}

/// An error resolving something the engine needs at run time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionError {
    /// No action has this identity.
    UnknownAction {
        /// The identity.
        identity: String,
    },
    /// No element has this identity (or it is of another kind).
    UnknownElement {
        /// The identity.
        identity: String,
    },
    /// An archetype was referenced as if it were live.
    ArchetypeReference {
        /// The identity.
        identity: String,
    },
    /// The current player was required but none is set.
    NoCurrentPlayer,
    /// The current room was required but none is set.
    NoCurrentRoom,
    /// A function could not be resolved through the element's lineage.
    UnknownFunction {
        /// Element the call resolved from.
        element: String,
        /// Function name.
        name: String,
    },
    /// An operation carried a missing or ill-typed operand.
    BadOperand {
        /// The operation.
        opcode: Opcode,
    },
    /// An action invocation did not fit the action's kind.
    BadInvocation {
        /// The action.
        action: String,
    },
    /// An operation popped an empty value stack.
    StackUnderflow {
        /// The operation.
        opcode: Opcode,
    },
    /// A block left values behind (or consumed values it did not push).
    StackImbalance {
        /// Stack depth at block entry.
        expected: usize,
        /// Stack depth at block exit.
        actual: usize,
    },
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAction { identity } => write!(f, "unknown action `{identity}`"),
            Self::UnknownElement { identity } => write!(f, "unknown element `{identity}`"),
            Self::ArchetypeReference { identity } => {
                write!(f, "archetype `{identity}` has no context")
            }
            Self::NoCurrentPlayer => write!(f, "no current player"),
            Self::NoCurrentRoom => write!(f, "no current room"),
            Self::UnknownFunction { element, name } => {
                write!(f, "no function `{name}` on `{element}`")
            }
            Self::BadOperand { opcode } => write!(f, "bad operand for {}", opcode.name()),
            Self::BadInvocation { action } => {
                write!(f, "invocation does not fit action `{action}`")
            }
            Self::StackUnderflow { opcode } => {
                write!(f, "value stack underflow in {}", opcode.name())
            }
            Self::StackImbalance { expected, actual } => write!(
                f,
                "value stack imbalance (depth {expected} at entry, {actual} at exit)"
            ),
        }
    }
}

impl core::error::Error for ExecutionError {}

/// Live variable bindings of one element.
#[derive(Clone, Debug, PartialEq)]
pub struct ElementContext {
    element: ElementRef,
    variables: HashMap<String, Value>,
}

impl ElementContext {
    pub(crate) fn new(element: ElementRef) -> Self {
        Self {
            element,
            variables: HashMap::new(),
        }
    }

    /// Returns the element this context belongs to.
    #[must_use]
    pub fn element(&self) -> &ElementRef {
        &self.element
    }

    /// Reads a variable. Names are case-insensitive.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(&fold_identity(name))
    }

    /// Sets a variable.
    pub fn set(&mut self, name: &str, value: Value) {
        self.variables.insert(fold_identity(name), value);
    }

    /// Removes a variable.
    pub fn clear(&mut self, name: &str) -> Option<Value> {
        self.variables.remove(&fold_identity(name))
    }

    /// Iterates variables in arbitrary order.
    pub fn variables(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn replace_variables(&mut self, variables: HashMap<String, Value>) {
        self.variables = variables;
    }
}

fn missing(module: &Module, identity: String) -> ExecutionError {
    if module.element(&identity).is_some() {
        ExecutionError::ArchetypeReference { identity }
    } else {
        ExecutionError::UnknownElement { identity }
    }
}

/// The mutable instance of a module.
#[derive(Debug)]
pub struct ModuleContext {
    module: Rc<Module>,
    digest: Digest,
    limits: Limits,
    contexts: HashMap<String, ElementContext>,
    ownership: OwnershipMap,
    rng: SmallRng,
}

impl ModuleContext {
    /// Creates a context with an entropy-seeded random source.
    pub fn new(module: Rc<Module>) -> Result<Self, ModuleError> {
        Self::with_rng(module, SmallRng::from_entropy())
    }

    /// Creates a context with a deterministic random source.
    pub fn with_seed(module: Rc<Module>, seed: u64) -> Result<Self, ModuleError> {
        Self::with_rng(module, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(module: Rc<Module>, rng: SmallRng) -> Result<Self, ModuleError> {
        let digest = module.digest()?;
        let limits = Limits::from_header(module.header());
        let mut contexts = HashMap::new();
        let mut ownership = OwnershipMap::new();
        contexts.insert(
            String::from(WORLD_IDENTITY),
            ElementContext::new(ElementRef::world()),
        );
        for kind in [
            ElementKind::Player,
            ElementKind::Room,
            ElementKind::Object,
            ElementKind::Container,
        ] {
            for e in module.elements(kind).filter(|e| !e.is_archetype()) {
                contexts.insert(e.identity().into(), ElementContext::new(e.to_ref()));
                for name in e.names() {
                    ownership.add_name(e.identity(), name);
                }
                for tag in e.tags() {
                    ownership.add_tag(e.identity(), tag);
                }
            }
        }
        Ok(Self {
            module,
            digest,
            limits,
            contexts,
            ownership,
            rng,
        })
    }

    /// Returns the module.
    #[must_use]
    pub fn module(&self) -> &Rc<Module> {
        &self.module
    }

    /// Returns the module digest.
    #[must_use]
    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// Returns the runaway limits.
    #[must_use]
    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Overrides the runaway limits read from the header.
    pub fn set_limits(&mut self, limits: Limits) {
        self.limits = limits;
    }

    /// Returns the ownership map.
    #[must_use]
    pub fn ownership(&self) -> &OwnershipMap {
        &self.ownership
    }

    /// Returns the ownership map for editing.
    pub fn ownership_mut(&mut self) -> &mut OwnershipMap {
        &mut self.ownership
    }

    pub(crate) fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    /// Returns the context of a live element.
    pub fn context(&self, identity: &str) -> Result<&ElementContext, ExecutionError> {
        let identity = fold_identity(identity);
        match self.contexts.get(&identity) {
            Some(c) => Ok(c),
            None => Err(missing(&self.module, identity)),
        }
    }

    /// Returns the context of a live element for editing.
    pub fn context_mut(&mut self, identity: &str) -> Result<&mut ElementContext, ExecutionError> {
        let identity = fold_identity(identity);
        match self.contexts.get_mut(&identity) {
            Some(c) => Ok(c),
            None => Err(missing(&self.module, identity)),
        }
    }

    /// Returns the current player.
    pub fn current_player(&self) -> Result<ElementRef, ExecutionError> {
        self.ownership
            .current_player()
            .map(|p| ElementRef::new(ElementKind::Player, p))
            .ok_or(ExecutionError::NoCurrentPlayer)
    }

    /// Returns the current room.
    pub fn current_room(&self) -> Result<ElementRef, ExecutionError> {
        self.ownership
            .current_room()
            .map(|r| ElementRef::new(ElementKind::Room, r))
            .ok_or(ExecutionError::NoCurrentRoom)
    }

    /// Resolves an element value to a live element.
    ///
    /// `player` and `room` values carrying the reserved identities of the same name resolve to
    /// the current player and current room. Returns `Ok(None)` if `value` does not reference an
    /// element at all.
    pub fn resolve_value(&self, value: &Value) -> Result<Option<ElementRef>, ExecutionError> {
        let (Some(kind), Some(identity)) = (value.element_kind(), value.identity()) else {
            return Ok(None);
        };
        match (kind, identity) {
            (ElementKind::Player, "player") => return self.current_player().map(Some),
            (ElementKind::Room, "room") => return self.current_room().map(Some),
            _ => {}
        }
        let c = self.context(identity)?;
        if c.element.kind != kind {
            return Err(ExecutionError::UnknownElement {
                identity: identity.into(),
            });
        }
        Ok(Some(c.element.clone()))
    }

    /// Iterates the live elements of `kind` in identity order.
    #[must_use]
    pub fn live_elements(&self, kind: ElementKind) -> Vec<ElementRef> {
        let mut out: Vec<ElementRef> = self
            .contexts
            .values()
            .filter(|c| c.element.kind == kind)
            .map(|c| c.element.clone())
            .collect();
        out.sort();
        out
    }

    /// Serializes the session state.
    #[must_use]
    pub fn save_state(&self) -> Vec<u8> {
        state::write_state(self)
    }

    /// Restores the session state. On failure the context is left unchanged.
    pub fn load_state(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        state::read_state(self, bytes)
    }

    pub(crate) fn replace_state(
        &mut self,
        variables: Vec<(String, HashMap<String, Value>)>,
        ownership: OwnershipMap,
    ) {
        for c in self.contexts.values_mut() {
            c.replace_variables(HashMap::new());
        }
        for (identity, vars) in variables {
            if let Some(c) = self.contexts.get_mut(&identity) {
                c.replace_variables(vars);
            }
        }
        self.ownership = ownership;
    }
}
