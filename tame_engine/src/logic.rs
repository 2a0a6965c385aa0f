// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Request entry points.
//!
//! [`initialize`] starts a game; [`process_action`] runs one resolved player command. Both run
//! to completion and return a [`Response`]. Signals that escape a handler are translated at this
//! boundary: `END`, `BREAK`, `CONTINUE` and `RETURN` just end the handler, `FINISH` and `QUIT` end
//! the request quietly, and everything else ends it with an `ERROR` or `FATAL` cue.

use crate::context::{ExecutionError, ModuleContext};
use crate::element::{Action, ActionKind, BlockEntry, BlockEntryType, Element, ElementKind, ElementRef};
use crate::interrupt::Interrupt;
use crate::request::{ActionInvocation, ActionTarget, RequestOptions, Response};
use crate::trace::TraceType;
use crate::value::Value;
use crate::vm::{Locals, Request};

/// Starts a game.
///
/// Runs the `INIT` block of every live container, object, room and player (in that order, each
/// group in identity order), then the world's `INIT` and `START` blocks, then any actions those
/// blocks queued.
pub fn initialize(ctx: &mut ModuleContext, options: RequestOptions<'_>) -> Response {
    let mut r = Request::begin(ctx, options, "initialize");
    let result = run_initialize(&mut r);
    r.end(result)
}

/// Processes one action invocation.
///
/// The invocation runs first, then every action it queued (first in, first out), then the
/// world's `AFTERSUCCESSFULCOMMAND` or `AFTERFAILEDCOMMAND` block and its `AFTEREVERYCOMMAND`
/// block.
pub fn process_action(
    ctx: &mut ModuleContext,
    invocation: &ActionInvocation,
    options: RequestOptions<'_>,
) -> Response {
    let mut r = Request::begin(ctx, options, &invocation.action);
    let result = run_command(&mut r, invocation);
    r.end(result)
}

fn run_initialize(r: &mut Request<'_, '_>) -> Result<(), Interrupt> {
    let init = BlockEntry::new(BlockEntryType::Init);
    for kind in [
        ElementKind::Container,
        ElementKind::Object,
        ElementKind::Room,
        ElementKind::Player,
        ElementKind::World,
    ] {
        for element in r.ctx().live_elements(kind) {
            run_handler(r, &element, &init, Locals::new())?;
        }
    }
    run_handler(
        r,
        &ElementRef::world(),
        &BlockEntry::new(BlockEntryType::Start),
        Locals::new(),
    )?;
    drain_belayed(r)
}

fn run_command(r: &mut Request<'_, '_>, invocation: &ActionInvocation) -> Result<(), Interrupt> {
    let succeeded = dispatch(r, invocation)?;
    drain_belayed(r)?;
    let world = ElementRef::world();
    let after = if succeeded {
        BlockEntryType::AfterSuccessfulCommand
    } else {
        BlockEntryType::AfterFailedCommand
    };
    run_handler(r, &world, &BlockEntry::new(after), Locals::new())?;
    run_handler(
        r,
        &world,
        &BlockEntry::new(BlockEntryType::AfterEveryCommand),
        Locals::new(),
    )?;
    Ok(())
}

fn drain_belayed(r: &mut Request<'_, '_>) -> Result<(), Interrupt> {
    while let Some(next) = r.next_belayed() {
        dispatch(r, &next)?;
    }
    Ok(())
}

/// Runs a handler block; signals that only end a handler count as handled.
fn run_handler(
    r: &mut Request<'_, '_>,
    element: &ElementRef,
    entry: &BlockEntry,
    locals: Locals,
) -> Result<bool, Interrupt> {
    match r.run_entry(element, entry, locals) {
        Err(Interrupt::End | Interrupt::Break | Interrupt::Continue) => Ok(true),
        Err(Interrupt::Return) => {
            r.discard_return_value();
            Ok(true)
        }
        result => result,
    }
}

/// Current room, then current player, then world.
fn focus_chain(r: &Request<'_, '_>) -> Vec<ElementRef> {
    let mut chain = Vec::with_capacity(3);
    if let Ok(room) = r.ctx().current_room() {
        chain.push(room);
    }
    if let Ok(player) = r.ctx().current_player() {
        chain.push(player);
    }
    chain.push(ElementRef::world());
    chain
}

/// Runs `entry` on the first element of the focus chain that defines it.
fn run_on_chain(
    r: &mut Request<'_, '_>,
    entry: &BlockEntry,
    locals: &Locals,
) -> Result<bool, Interrupt> {
    for element in focus_chain(r) {
        if run_handler(r, &element, entry, locals.clone())? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Runs the action-specific variant of `entry_type`, falling back to the generic one.
fn run_specific_or_generic(
    r: &mut Request<'_, '_>,
    element: &ElementRef,
    entry_type: BlockEntryType,
    action: &str,
) -> Result<bool, Interrupt> {
    let specific = BlockEntry::with_values(entry_type, vec![Value::action(action)]);
    Ok(run_handler(r, element, &specific, Locals::new())?
        || run_handler(r, element, &BlockEntry::new(entry_type), Locals::new())?)
}

fn fits(kind: ActionKind, target: &ActionTarget) -> bool {
    matches!(
        (kind, target),
        (ActionKind::General, ActionTarget::None)
            | (ActionKind::Transitive, ActionTarget::Object(_))
            | (
                ActionKind::Ditransitive,
                ActionTarget::Object(_) | ActionTarget::Objects(..)
            )
            | (ActionKind::Modal, ActionTarget::Mode(_))
            | (ActionKind::Open, ActionTarget::Text(_))
    )
}

fn object_ref(r: &Request<'_, '_>, identity: &str) -> Result<ElementRef, Interrupt> {
    match r.ctx().resolve_value(&Value::object(identity))? {
        Some(e) => Ok(e),
        None => Err(ExecutionError::UnknownElement {
            identity: identity.into(),
        }
        .into()),
    }
}

/// Returns `true` if neither the current player nor the current room forbids `action`.
///
/// A forbidden action runs `ONFORBIDDENACTION` on the forbidding element, or on the world if the
/// forbidding element has no such block.
fn permitted(r: &mut Request<'_, '_>, action: &Action) -> Result<bool, Interrupt> {
    let module = r.module();
    let mut candidates = Vec::with_capacity(2);
    if let Ok(player) = r.ctx().current_player() {
        candidates.push(player);
    }
    if let Ok(room) = r.ctx().current_room() {
        candidates.push(room);
    }
    let forbidder = candidates.into_iter().find(|e| {
        module
            .lineage(&e.identity)
            .find_map(Element::permissions)
            .is_some_and(|table| !table.permits(action.identity()))
    });
    let Some(forbidder) = forbidder else {
        return Ok(true);
    };
    r.trace(TraceType::Interpreter, || {
        format!("{forbidder} forbids {}", action.identity())
    });
    if !run_specific_or_generic(
        r,
        &forbidder,
        BlockEntryType::OnForbiddenAction,
        action.identity(),
    )? {
        run_specific_or_generic(
            r,
            &ElementRef::world(),
            BlockEntryType::OnForbiddenAction,
            action.identity(),
        )?;
    }
    Ok(false)
}

/// Dispatches one invocation. Returns `true` if a handler ran for it.
fn dispatch(r: &mut Request<'_, '_>, invocation: &ActionInvocation) -> Result<bool, Interrupt> {
    let module = r.module();
    let Some(action) = module.action(&invocation.action) else {
        return Err(ExecutionError::UnknownAction {
            identity: invocation.action.clone(),
        }
        .into());
    };
    if !fits(action.kind(), &invocation.target) {
        return Err(ExecutionError::BadInvocation {
            action: invocation.action.clone(),
        }
        .into());
    }
    r.trace(TraceType::Interpreter, || {
        format!("processing {invocation:?}")
    });
    if !permitted(r, action)? {
        return Ok(false);
    }

    let id = action.identity();
    let handled = match &invocation.target {
        ActionTarget::None => run_on_chain(r, &BlockEntry::on_action(id), &Locals::new())?,
        ActionTarget::Text(text) => {
            let mut locals = Locals::new();
            if let Some(name) = action.extra_strings.first() {
                locals.insert(name.clone(), Value::string(text.as_str()));
            }
            run_on_chain(r, &BlockEntry::on_action(id), &locals)?
        }
        ActionTarget::Mode(mode) => {
            run_on_chain(r, &BlockEntry::on_modal_action(id, mode), &Locals::new())?
        }
        ActionTarget::Object(object) => {
            let object = object_ref(r, object)?;
            if action.kind() == ActionKind::Ditransitive && action.strict {
                false
            } else {
                run_handler(r, &object, &BlockEntry::on_action(id), Locals::new())?
            }
        }
        ActionTarget::Objects(first, second) => {
            let (first, second) = if action.reversed {
                (second, first)
            } else {
                (first, second)
            };
            let first = object_ref(r, first)?;
            let second = object_ref(r, second)?;
            run_handler(
                r,
                &first,
                &BlockEntry::on_action_with(id, &second.identity),
                Locals::new(),
            )? || run_handler(
                r,
                &first,
                &BlockEntry::with_values(BlockEntryType::OnActionWithOther, vec![Value::action(id)]),
                Locals::new(),
            )?
        }
    };

    if !handled {
        r.trace(TraceType::Interpreter, || format!("{id} was not handled"));
        for element in focus_chain(r) {
            if run_specific_or_generic(r, &element, BlockEntryType::OnUnhandledAction, id)? {
                break;
            }
        }
    }
    Ok(handled)
}
