// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `tame_engine` is the runtime of an interactive-fiction virtual machine.
//!
//! A compiled [`Module`](module::Module) describes a world of elements (the world, players,
//! rooms, objects and containers) and the actions a player can take. Each element carries
//! blocks keyed by [`BlockEntry`](element::BlockEntry) and named functions; blocks are trees of
//! stack-machine [`Operation`](block::Operation)s.
//!
//! A [`ModuleContext`](context::ModuleContext) is one game session over a shared module: element
//! variables, object ownership, room stacks and a random source. Requests run against it:
//!
//! - [`initialize`] starts the game.
//! - [`process_action`] runs one command, already resolved to an
//!   [`ActionInvocation`](request::ActionInvocation).
//!
//! Each request returns a [`Response`](request::Response): an ordered list of
//! [`Cue`](request::Cue)s for the client (text to show, quit, save, load, ...) plus counters.
//!
//! ## Formats
//!
//! - [`codec`] reads and writes module files. The payload is protected by a SHA-1 digest.
//! - [`state`] reads and writes save states. Lists shared between variables stay shared across a
//!   save and load.
//!
//! ## Safety rails
//!
//! Requests are bounded by an operation count and a function depth, both configurable through
//! module header attributes (see [`context::Limits`]). Breaching either aborts the request with
//! a `FATAL` cue.
//!
//! ## Example
//! ```
//! use std::rc::Rc;
//!
//! use tame_engine::asm::Asm;
//! use tame_engine::context::ModuleContext;
//! use tame_engine::element::{Action, ActionKind, BlockEntry};
//! use tame_engine::module::Module;
//! use tame_engine::request::{ActionInvocation, RequestOptions};
//!
//! let mut module = Module::new();
//! module.add_action(Action::new("look", ActionKind::General)?)?;
//! module.world_mut().add_block(
//!     BlockEntry::on_action("look"),
//!     Asm::block(|a| {
//!         a.text_str("It is dark.");
//!     }),
//! );
//!
//! let mut ctx = ModuleContext::new(Rc::new(module))?;
//! tame_engine::initialize(&mut ctx, RequestOptions::default());
//! let response = tame_engine::process_action(
//!     &mut ctx,
//!     &ActionInvocation::general("look"),
//!     RequestOptions::default(),
//! );
//! assert_eq!(response.text(), "It is dark.");
//! # Ok::<(), tame_engine::module::ModuleError>(())
//! ```

pub mod asm;
pub mod block;
pub mod codec;
pub mod context;
pub mod element;
pub mod format;
pub mod interrupt;
pub mod module;
pub mod opcode;
pub mod operator;
pub mod ownership;
pub mod request;
pub mod state;
pub mod trace;
pub mod value;

mod logic;
mod vm;

pub use logic::{initialize, process_action};
