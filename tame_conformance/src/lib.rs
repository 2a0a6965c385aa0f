// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared fixtures for the `tame_engine` conformance tests.
//!
//! The tests themselves live under `tests/`; this crate only builds the small worlds they run.

use std::rc::Rc;

use tame_engine::asm::Asm;
use tame_engine::block::Block;
use tame_engine::context::ModuleContext;
use tame_engine::element::{Action, ActionKind, BlockEntry, BlockEntryType, Element, ElementKind};
use tame_engine::module::{Module, ModuleError};
use tame_engine::request::{RequestOptions, Response};
use tame_engine::value::Value;

/// Seed used for every fixture context, so random opcodes replay identically.
pub const SEED: u64 = 0x7a3e;

/// Builds a small world: player `hero` starting in room `cellar`, an object `lamp`, and the
/// general action `look`.
///
/// The world's `START` block selects the player and room.
pub fn cellar() -> Result<Module, ModuleError> {
    let mut m = Module::new();
    m.add_action(Action::new("look", ActionKind::General)?)?;
    m.add_element(Element::new(ElementKind::Player, "hero")?)?;
    m.add_element(Element::new(ElementKind::Room, "cellar")?)?;
    let mut lamp = Element::new(ElementKind::Object, "lamp")?;
    lamp.add_name("lamp")?;
    m.add_element(lamp)?;
    m.world_mut().add_block(
        BlockEntry::new(BlockEntryType::Start),
        Asm::block(|a| {
            a.push(Value::player("hero")).set_player();
            a.push(Value::room("cellar")).push_room();
        }),
    );
    Ok(m)
}

/// Sets the world's `ONACTION(look)` block.
pub fn on_look(m: &mut Module, block: Block) {
    m.world_mut().add_block(BlockEntry::on_action("look"), block);
}

/// Creates a seeded context and runs `initialize`, returning both.
pub fn start(m: Module) -> Result<(ModuleContext, Response), ModuleError> {
    let mut ctx = ModuleContext::with_seed(Rc::new(m), SEED)?;
    let r = tame_engine::initialize(&mut ctx, RequestOptions::default());
    Ok((ctx, r))
}
