// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Profiling adapters for `tame_engine` (currently Tracy).
//!
//! This crate keeps `tame_engine` itself free of profiling dependencies. It listens for request
//! and scope callbacks and emits matching profiling spans: one per request, and one per entry
//! block or function call inside it.
//!
//! ## Backend
//! This crate currently supports the Tracy backend via `tracy-client`. Without a running Tracy
//! client the sink still tracks scopes but records nothing.
//!
//! ## Example
//! ```ignore
//! use tame_engine::request::{ActionInvocation, RequestOptions};
//! use tame_profiling::ProfilingTraceSink;
//!
//! let mut sink = ProfilingTraceSink::new();
//! let response = tame_engine::process_action(
//!     &mut ctx,
//!     &ActionInvocation::general("look"),
//!     RequestOptions::default().with_sink(&mut sink),
//! );
//! ```

mod resolver;
mod sink;

pub use resolver::{DefaultLabelResolver, LabelResolver, ModuleSymbolResolver};
pub use sink::ProfilingTraceSink;
