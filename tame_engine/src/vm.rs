// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The block interpreter.
//!
//! A [`Request`] owns everything that lives for exactly one request: the value stack, the frame
//! stack, the belayed-action queue, the runaway counters and the cues emitted so far. It borrows
//! the [`ModuleContext`] mutably for its whole lifetime.
//!
//! Blocks run through [`Request::call_block`], which pushes a frame and enforces stack balance:
//! on exit the value stack must be exactly as deep as on entry. Sub-blocks of `IF`, `WHILE` and
//! `FOR` run in the enclosing frame without a balance check of their own.

use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;

use hashbrown::HashMap;
use rand::Rng as _;

use crate::block::{Block, Operation, SubBlock};
use crate::context::{ExecutionError, ModuleContext};
use crate::element::{ActionKind, BlockEntry, BlockEntryType, ElementKind, ElementRef};
use crate::interrupt::{Interrupt, RunawayKind};
use crate::module::Module;
use crate::opcode::Opcode;
use crate::operator::ArithmeticOperator;
use crate::request::{ActionInvocation, Cue, CueContent, CueKind, RequestOptions, Response};
use crate::trace::{ScopeKind, TraceMask, TraceOutcome, TraceSink, TraceType};
use crate::value::{ListRef, Value, fold_identity};

/// Local variables of one frame, keyed by case-folded name.
pub(crate) type Locals = HashMap<String, Value>;

#[derive(Debug)]
struct Frame {
    element: ElementRef,
    locals: Locals,
}

fn bad_operand(opcode: Opcode) -> Interrupt {
    ExecutionError::BadOperand { opcode }.into()
}

fn underflow(opcode: Opcode) -> Interrupt {
    ExecutionError::StackUnderflow { opcode }.into()
}

fn operand0(op: &Operation) -> Result<&Value, Interrupt> {
    op.operand0().ok_or_else(|| bad_operand(op.opcode()))
}

fn operand1(op: &Operation) -> Result<&Value, Interrupt> {
    op.operand1().ok_or_else(|| bad_operand(op.opcode()))
}

fn variable_name(opcode: Opcode, v: &Value) -> Result<String, Interrupt> {
    match v {
        Value::Variable(name) | Value::String(name) => Ok(fold_identity(name)),
        _ => Err(bad_operand(opcode)),
    }
}

fn sub_block(op: &Operation, slot: SubBlock) -> Result<&Block, Interrupt> {
    op.block(slot).ok_or_else(|| bad_operand(op.opcode()))
}

fn index(v: &Value) -> Option<usize> {
    usize::try_from(v.as_long()).ok()
}

/// The state of one running request.
pub(crate) struct Request<'c, 's> {
    ctx: &'c mut ModuleContext,
    module: Rc<Module>,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    belayed: VecDeque<ActionInvocation>,
    operations: u64,
    function_depth: usize,
    function_depth_peak: usize,
    return_value: Option<Value>,
    cues: Vec<Cue>,
    trace: TraceMask,
    sink: Option<&'s mut dyn TraceSink>,
    sink_mask: TraceMask,
    started: Instant,
}

impl core::fmt::Debug for Request<'_, '_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Request")
            .field("stack", &self.stack)
            .field("frames", &self.frames)
            .field("belayed", &self.belayed)
            .field("operations", &self.operations)
            .field("function_depth", &self.function_depth)
            .field("cues", &self.cues)
            .finish_non_exhaustive()
    }
}

impl<'c, 's> Request<'c, 's> {
    /// Starts a request. `label` names it for the sink.
    pub(crate) fn begin(
        ctx: &'c mut ModuleContext,
        options: RequestOptions<'s>,
        label: &str,
    ) -> Self {
        let module = Rc::clone(ctx.module());
        let mut sink = options.sink;
        let sink_mask = sink.as_ref().map_or(TraceMask::NONE, |s| s.mask());
        if sink_mask.contains(TraceMask::REQUEST)
            && let Some(s) = sink.as_deref_mut()
        {
            s.request_start(&module, label);
        }
        Self {
            ctx,
            module,
            stack: Vec::new(),
            frames: Vec::new(),
            belayed: VecDeque::new(),
            operations: 0,
            function_depth: 0,
            function_depth_peak: 0,
            return_value: None,
            cues: Vec::new(),
            trace: options.trace,
            sink,
            sink_mask,
            started: Instant::now(),
        }
    }

    /// Ends the request, translating an escaped signal into its cue.
    ///
    /// `FINISH`, `QUIT`, `END` and the loop and return signals end a request cleanly. Script
    /// errors become an `ERROR` cue; runaway and engine failures become a `FATAL` cue.
    pub(crate) fn end(mut self, result: Result<(), Interrupt>) -> Response {
        let failure = match result {
            Err(
                i @ (Interrupt::Error(_)
                | Interrupt::RuntimeError(_)
                | Interrupt::Runaway(_)
                | Interrupt::Fatal(_)),
            ) => Some(i),
            _ => None,
        };
        if let Some(i) = &failure {
            let cue = match i {
                Interrupt::Error(m) | Interrupt::RuntimeError(m) => {
                    Cue::text(CueKind::Error, m.clone())
                }
                Interrupt::Fatal(e) => Cue::text(CueKind::Fatal, e.to_string()),
                other => Cue::text(CueKind::Fatal, other.to_string()),
            };
            self.cues.push(cue);
        }
        if self.sink_mask.contains(TraceMask::REQUEST)
            && let Some(s) = self.sink.as_deref_mut()
        {
            let outcome = match &failure {
                Some(i) => TraceOutcome::Interrupted(i),
                None => TraceOutcome::Ok,
            };
            s.request_end(&self.module, outcome);
        }
        Response {
            cues: self.cues,
            operations_executed: self.operations,
            function_depth_peak: self.function_depth_peak,
            request_nanos: u64::try_from(self.started.elapsed().as_nanos()).unwrap_or(u64::MAX),
        }
    }

    pub(crate) fn ctx(&self) -> &ModuleContext {
        &*self.ctx
    }

    pub(crate) fn module(&self) -> Rc<Module> {
        Rc::clone(&self.module)
    }

    pub(crate) fn cue(&mut self, cue: Cue) {
        self.cues.push(cue);
    }

    /// Emits a `TRACE` cue if `t` is enabled. `message` only runs when it is.
    pub(crate) fn trace(&mut self, t: TraceType, message: impl FnOnce() -> String) {
        if self.trace.traces(t) {
            self.cues.push(Cue::text(CueKind::Trace(t), message()));
        }
    }

    pub(crate) fn next_belayed(&mut self) -> Option<ActionInvocation> {
        self.belayed.pop_front()
    }

    /// Drops a return value left by `FUNCTIONRETURN` outside of any function.
    pub(crate) fn discard_return_value(&mut self) {
        self.return_value = None;
    }

    /// Runs the block for `entry` resolved through `element`'s lineage.
    ///
    /// Returns `Ok(false)` if no block is defined.
    pub(crate) fn run_entry(
        &mut self,
        element: &ElementRef,
        entry: &BlockEntry,
        locals: Locals,
    ) -> Result<bool, Interrupt> {
        let module = Rc::clone(&self.module);
        let Some(block) = module.resolve_block(&element.identity, entry) else {
            return Ok(false);
        };
        let name = entry.to_string();
        self.trace(TraceType::Entry, || format!("{element} runs {name}"));
        self.call_block(
            element.clone(),
            ScopeKind::Entry(entry.entry_type()),
            &name,
            block,
            locals,
        )?;
        Ok(true)
    }

    /// Runs `block` in a fresh frame on `element`.
    pub(crate) fn call_block(
        &mut self,
        element: ElementRef,
        scope: ScopeKind,
        name: &str,
        block: &Block,
        locals: Locals,
    ) -> Result<(), Interrupt> {
        let depth = self.stack.len();
        self.trace(TraceType::Context, || format!("push frame {element}"));
        let scoped = self.sink_mask.contains(TraceMask::SCOPE);
        if scoped && let Some(s) = self.sink.as_deref_mut() {
            s.scope_enter(
                &self.module,
                scope,
                self.frames.len() + 1,
                &element.identity,
                name,
            );
        }
        self.frames.push(Frame { element, locals });

        let result = self.execute_block(block);

        let frame_depth = self.frames.len();
        if let Some(frame) = self.frames.pop() {
            if scoped && let Some(s) = self.sink.as_deref_mut() {
                s.scope_exit(
                    &self.module,
                    scope,
                    frame_depth,
                    &frame.element.identity,
                    name,
                );
            }
            self.trace(TraceType::Context, || format!("pop frame {}", frame.element));
        }
        self.settle_stack(depth, result)
    }

    fn settle_stack(
        &mut self,
        depth: usize,
        result: Result<(), Interrupt>,
    ) -> Result<(), Interrupt> {
        match result {
            Err(
                i @ (Interrupt::Error(_)
                | Interrupt::RuntimeError(_)
                | Interrupt::Runaway(_)
                | Interrupt::Fatal(_)),
            ) => {
                self.stack.truncate(depth);
                Err(i)
            }
            result => {
                let actual = self.stack.len();
                if actual != depth {
                    self.stack.truncate(depth);
                    return Err(ExecutionError::StackImbalance {
                        expected: depth,
                        actual,
                    }
                    .into());
                }
                result
            }
        }
    }

    fn execute_block(&mut self, block: &Block) -> Result<(), Interrupt> {
        for op in block.operations() {
            self.execute(op)?;
        }
        Ok(())
    }

    fn pop(&mut self, opcode: Opcode) -> Result<Value, Interrupt> {
        self.stack.pop().ok_or_else(|| underflow(opcode))
    }

    fn push(&mut self, v: impl Into<Value>) {
        self.stack.push(v.into());
    }

    fn frame(&self, opcode: Opcode) -> Result<&Frame, Interrupt> {
        self.frames.last().ok_or_else(|| bad_operand(opcode))
    }

    fn pop_element(&mut self, opcode: Opcode) -> Result<ElementRef, Interrupt> {
        let v = self.pop(opcode)?;
        match self.ctx.resolve_value(&v)? {
            Some(e) => Ok(e),
            None => Err(Interrupt::runtime(format!(
                "{} expected an element, got {}",
                opcode.name(),
                v.kind().name()
            ))),
        }
    }

    fn pop_element_where(
        &mut self,
        opcode: Opcode,
        what: &str,
        accept: fn(ElementKind) -> bool,
    ) -> Result<ElementRef, Interrupt> {
        let e = self.pop_element(opcode)?;
        if accept(e.kind) {
            Ok(e)
        } else {
            Err(Interrupt::runtime(format!(
                "{} expected {what}, got {e}",
                opcode.name()
            )))
        }
    }

    fn pop_object(&mut self, opcode: Opcode) -> Result<ElementRef, Interrupt> {
        self.pop_element_where(opcode, "an object", |k| k == ElementKind::Object)
    }

    fn pop_holder(&mut self, opcode: Opcode) -> Result<ElementRef, Interrupt> {
        self.pop_element_where(opcode, "an object holder", ElementKind::holds_objects)
    }

    fn pop_list(&mut self, opcode: Opcode) -> Result<ListRef, Interrupt> {
        match self.pop(opcode)? {
            Value::List(list) => Ok(list),
            other => Err(Interrupt::runtime(format!(
                "{} expected a list, got {}",
                opcode.name(),
                other.kind().name()
            ))),
        }
    }

    fn pop_action(&mut self, opcode: Opcode) -> Result<(String, ActionKind), Interrupt> {
        match self.pop(opcode)? {
            Value::Action(identity) => match self.module.action(&identity) {
                Some(a) => Ok((identity, a.kind())),
                None => Err(ExecutionError::UnknownAction { identity }.into()),
            },
            other => Err(Interrupt::runtime(format!(
                "{} expected an action, got {}",
                opcode.name(),
                other.kind().name()
            ))),
        }
    }

    fn execute(&mut self, op: &Operation) -> Result<(), Interrupt> {
        let opcode = op.opcode();
        self.operations += 1;
        let limit = self.ctx.limits().runaway_max;
        if limit > 0 && self.operations >= limit {
            return Err(Interrupt::Runaway(RunawayKind::Operations { limit }));
        }
        if self.sink_mask.contains(TraceMask::OPERATION)
            && let Some(s) = self.sink.as_deref_mut()
        {
            s.operation(&self.module, opcode, self.operations);
        }
        self.trace(TraceType::Internal, || match op.operand0() {
            Some(v) => format!("{} {v}", opcode.name()),
            None => opcode.name().into(),
        });

        match opcode {
            Opcode::Noop => {}
            Opcode::Pop => {
                self.pop(opcode)?;
            }
            Opcode::PushValue => self.push_value(op)?,
            Opcode::PopValue => self.pop_value(op, false)?,
            Opcode::PopLocalValue => self.pop_value(op, true)?,
            Opcode::ClearValue => self.clear_value(op)?,
            Opcode::PushElementValue => {
                let element = self.resolve_operand(op)?;
                let name = variable_name(opcode, operand1(op)?)?;
                let v = self
                    .ctx
                    .context(&element.identity)?
                    .get(&name)
                    .cloned()
                    .unwrap_or(Value::Boolean(false));
                self.trace(TraceType::Value, || format!("read {element}.{name} = {v}"));
                self.push(v);
            }
            Opcode::PopElementValue => {
                let element = self.resolve_operand(op)?;
                let name = variable_name(opcode, operand1(op)?)?;
                let v = self.pop(opcode)?;
                self.trace(TraceType::Value, || format!("set {element}.{name} = {v}"));
                self.ctx.context_mut(&element.identity)?.set(&name, v);
            }
            Opcode::ClearElementValue => {
                let element = self.resolve_operand(op)?;
                let name = variable_name(opcode, operand1(op)?)?;
                self.trace(TraceType::Value, || format!("clear {element}.{name}"));
                self.ctx.context_mut(&element.identity)?.clear(&name);
            }
            Opcode::PushThis => {
                let v = self.frame(opcode)?.element.to_value();
                self.push(v);
            }
            Opcode::PushNewList => self.push(Value::new_list()),
            Opcode::PushInitList => {
                let n = self.pop(opcode)?;
                let n = index(&n).ok_or_else(|| {
                    Interrupt::runtime(format!("PUSHINITLIST count {n} is negative"))
                })?;
                let base = self
                    .stack
                    .len()
                    .checked_sub(n)
                    .ok_or_else(|| underflow(opcode))?;
                let items = self.stack.split_off(base);
                self.push(Value::list(items));
            }

            Opcode::ArithmeticFunc => {
                let operator = match operand0(op)? {
                    Value::Integer(i) => ArithmeticOperator::from_ordinal(*i),
                    _ => None,
                }
                .ok_or_else(|| bad_operand(opcode))?;
                let result = if operator.is_binary() {
                    let b = self.pop(opcode)?;
                    let a = self.pop(opcode)?;
                    operator.apply_binary(&a, &b)
                } else {
                    let a = self.pop(opcode)?;
                    operator.apply_unary(&a)
                };
                self.push(result);
            }

            Opcode::If => {
                let taken = self.condition(op)?;
                self.trace(TraceType::Control, || format!("IF condition is {taken}"));
                let branch = if taken {
                    op.block(SubBlock::Success)
                } else {
                    op.block(SubBlock::Failure)
                };
                if let Some(block) = branch {
                    self.execute_block(block)?;
                }
            }
            Opcode::While => loop {
                let holds = self.condition(op)?;
                self.trace(TraceType::Control, || format!("WHILE condition is {holds}"));
                if !holds || !self.loop_body(op)? {
                    break;
                }
            },
            Opcode::For => {
                self.execute_block(sub_block(op, SubBlock::Init)?)?;
                loop {
                    let holds = self.condition(op)?;
                    self.trace(TraceType::Control, || format!("FOR condition is {holds}"));
                    if !holds || !self.loop_body(op)? {
                        break;
                    }
                    if let Some(step) = op.block(SubBlock::Step) {
                        self.execute_block(step)?;
                    }
                }
            }
            Opcode::Break => return Err(Interrupt::Break),
            Opcode::Continue => return Err(Interrupt::Continue),
            Opcode::End => return Err(Interrupt::End),
            Opcode::Finish => return Err(Interrupt::Finish),
            Opcode::Quit => {
                self.cue(Cue::bare(CueKind::Quit));
                return Err(Interrupt::Quit);
            }
            Opcode::Error => {
                let message = self.pop(opcode)?.as_string();
                return Err(Interrupt::Error(message));
            }

            Opcode::CallFunction => {
                let name = variable_name(opcode, operand0(op)?)?;
                let element = self.frame(opcode)?.element.clone();
                self.call_function(opcode, element, &name)?;
            }
            Opcode::CallElementFunction => {
                let name = variable_name(opcode, operand0(op)?)?;
                let element = self.pop_element(opcode)?;
                self.call_function(opcode, element, &name)?;
            }
            Opcode::FunctionReturn => {
                let v = self.pop(opcode)?;
                self.trace(TraceType::Function, || format!("return {v}"));
                self.return_value = Some(v);
                return Err(Interrupt::Return);
            }

            Opcode::Text | Opcode::TextLn | Opcode::TextF | Opcode::TextFLn => {
                let mut s = self.pop(opcode)?.as_string();
                if matches!(opcode, Opcode::TextLn | Opcode::TextFLn) {
                    s.push('\n');
                }
                let kind = if matches!(opcode, Opcode::TextF | Opcode::TextFLn) {
                    CueKind::TextF
                } else {
                    CueKind::Text
                };
                self.cue(Cue::text(kind, s));
            }
            Opcode::Pause => self.cue(Cue::bare(CueKind::Pause)),
            Opcode::Wait => {
                let millis = self.pop(opcode)?.as_long();
                self.cue(Cue {
                    kind: CueKind::Wait,
                    content: CueContent::Integer(millis),
                });
            }
            Opcode::Tip | Opcode::Info | Opcode::Save | Opcode::Load => {
                let s = self.pop(opcode)?.as_string();
                let kind = match opcode {
                    Opcode::Tip => CueKind::Tip,
                    Opcode::Info => CueKind::Info,
                    Opcode::Save => CueKind::Save,
                    _ => CueKind::Load,
                };
                self.cue(Cue::text(kind, s));
            }

            Opcode::QueueAction => {
                let (action, _) = self.pop_action(opcode)?;
                self.queue(ActionInvocation::general(&action));
            }
            Opcode::QueueActionString => {
                let text = self.pop(opcode)?.as_string();
                let (action, kind) = self.pop_action(opcode)?;
                self.queue(match kind {
                    ActionKind::Modal => ActionInvocation::modal(&action, &text),
                    _ => ActionInvocation::open(&action, &text),
                });
            }
            Opcode::QueueActionObject => {
                let object = self.pop_object(opcode)?;
                let (action, _) = self.pop_action(opcode)?;
                self.queue(ActionInvocation::transitive(&action, &object.identity));
            }
            Opcode::QueueActionObject2 => {
                let object2 = self.pop_object(opcode)?;
                let object = self.pop_object(opcode)?;
                let (action, _) = self.pop_action(opcode)?;
                self.queue(ActionInvocation::ditransitive(
                    &action,
                    &object.identity,
                    &object2.identity,
                ));
            }

            Opcode::GiveObject => {
                let object = self.pop_object(opcode)?;
                let holder = self.pop_holder(opcode)?;
                self.ctx
                    .ownership_mut()
                    .add_object(&holder, &object.identity);
            }
            Opcode::RemoveObject => {
                let object = self.pop_object(opcode)?;
                self.ctx.ownership_mut().remove_object(&object.identity);
            }
            Opcode::MoveObjectsTo => {
                let to = self.pop_holder(opcode)?;
                let from = self.pop_holder(opcode)?;
                self.ctx.ownership_mut().move_objects(&from, &to);
            }
            Opcode::HasObject => {
                let object = self.pop_object(opcode)?;
                let holder = self.pop_holder(opcode)?;
                let has = self.ctx.ownership().has_object(&holder, &object.identity);
                self.push(has);
            }
            Opcode::ObjectHasNoOwner => {
                let object = self.pop_object(opcode)?;
                let free = self.ctx.ownership().owner(&object.identity).is_none();
                self.push(free);
            }
            Opcode::ObjectCount => {
                let holder = self.pop_holder(opcode)?;
                let n = self.ctx.ownership().object_count(&holder);
                self.push(i64::try_from(n).unwrap_or(i64::MAX));
            }
            Opcode::AddObjectName
            | Opcode::RemoveObjectName
            | Opcode::ObjectHasName
            | Opcode::AddObjectTag
            | Opcode::RemoveObjectTag
            | Opcode::ObjectHasTag => {
                let word = self.pop(opcode)?.as_string();
                let object = self.pop_object(opcode)?;
                let id = object.identity.as_str();
                let ownership = self.ctx.ownership_mut();
                match opcode {
                    Opcode::AddObjectName => ownership.add_name(id, &word),
                    Opcode::RemoveObjectName => ownership.remove_name(id, &word),
                    Opcode::AddObjectTag => ownership.add_tag(id, &word),
                    Opcode::RemoveObjectTag => ownership.remove_tag(id, &word),
                    Opcode::ObjectHasName => {
                        let has = ownership.has_name(id, &word);
                        self.push(has);
                    }
                    _ => {
                        let has = ownership.has_tag(id, &word);
                        self.push(has);
                    }
                }
            }
            Opcode::Browse => self.browse(opcode)?,

            Opcode::SetPlayer => {
                let player =
                    self.pop_element_where(opcode, "a player", |k| k == ElementKind::Player)?;
                self.set_player(player)?;
            }
            Opcode::PushRoom => {
                let room = self.pop_element_where(opcode, "a room", |k| k == ElementKind::Room)?;
                let player = self.ctx.current_player()?;
                self.ctx
                    .ownership_mut()
                    .push_room(&player.identity, &room.identity);
                self.focus(&room, BlockEntryType::OnFocus)?;
            }
            Opcode::PopRoom => {
                let player = self.ctx.current_player()?;
                let room = self.ctx.current_room()?;
                self.focus(&room, BlockEntryType::OnUnfocus)?;
                self.ctx.ownership_mut().pop_room(&player.identity);
            }
            Opcode::SwapRoom => {
                let room = self.pop_element_where(opcode, "a room", |k| k == ElementKind::Room)?;
                let player = self.ctx.current_player()?;
                if let Ok(previous) = self.ctx.current_room() {
                    self.focus(&previous, BlockEntryType::OnUnfocus)?;
                }
                self.ctx
                    .ownership_mut()
                    .swap_room(&player.identity, &room.identity);
                self.focus(&room, BlockEntryType::OnFocus)?;
            }
            Opcode::CurrentPlayerIs => {
                let player =
                    self.pop_element_where(opcode, "a player", |k| k == ElementKind::Player)?;
                let is = self.ctx.ownership().current_player() == Some(player.identity.as_str());
                self.push(is);
            }
            Opcode::CurrentRoomIs => {
                let room = self.pop_element_where(opcode, "a room", |k| k == ElementKind::Room)?;
                let is = self.ctx.ownership().current_room() == Some(room.identity.as_str());
                self.push(is);
            }
            Opcode::NoCurrentPlayer => {
                let none = self.ctx.ownership().current_player().is_none();
                self.push(none);
            }
            Opcode::NoCurrentRoom => {
                let none = self.ctx.ownership().current_room().is_none();
                self.push(none);
            }

            Opcode::ListAdd => {
                let v = self.pop(opcode)?;
                let list = self.pop_list(opcode)?;
                list.borrow_mut().push(v);
                self.push(true);
            }
            Opcode::ListAddAt => {
                let at = self.pop(opcode)?;
                let v = self.pop(opcode)?;
                let list = self.pop_list(opcode)?;
                let mut items = list.borrow_mut();
                let done = match index(&at) {
                    Some(i) if i <= items.len() => {
                        items.insert(i, v);
                        true
                    }
                    _ => false,
                };
                drop(items);
                self.push(done);
            }
            Opcode::ListGet | Opcode::ListRemoveIndex => {
                let at = self.pop(opcode)?;
                let list = self.pop_list(opcode)?;
                let mut items = list.borrow_mut();
                let v = match index(&at) {
                    Some(i) if i < items.len() => {
                        if opcode == Opcode::ListGet {
                            items[i].clone()
                        } else {
                            items.remove(i)
                        }
                    }
                    _ => Value::Boolean(false),
                };
                drop(items);
                self.push(v);
            }
            Opcode::ListSet => {
                let v = self.pop(opcode)?;
                let at = self.pop(opcode)?;
                let list = self.pop_list(opcode)?;
                let mut items = list.borrow_mut();
                let done = match index(&at) {
                    Some(i) if i < items.len() => {
                        items[i] = v;
                        true
                    }
                    _ => false,
                };
                drop(items);
                self.push(done);
            }
            Opcode::ListRemove | Opcode::ListIndexOf | Opcode::ListContains => {
                let v = self.pop(opcode)?;
                let list = self.pop_list(opcode)?;
                let position = list.borrow().iter().position(|x| x.equals(&v));
                let result = match opcode {
                    Opcode::ListRemove => {
                        if let Some(i) = position {
                            list.borrow_mut().remove(i);
                        }
                        Value::Boolean(position.is_some())
                    }
                    Opcode::ListIndexOf => Value::Integer(
                        position.map_or(-1, |i| i64::try_from(i).unwrap_or(i64::MAX)),
                    ),
                    _ => Value::Boolean(position.is_some()),
                };
                self.push(result);
            }

            Opcode::Length => {
                let n = self.pop(opcode)?.length();
                self.push(i64::try_from(n).unwrap_or(i64::MAX));
            }
            Opcode::StrUpper => {
                let s = self.pop(opcode)?.as_string().to_uppercase();
                self.push(s);
            }
            Opcode::StrLower => {
                let s = self.pop(opcode)?.as_string().to_lowercase();
                self.push(s);
            }
            Opcode::StrTrim => {
                let s = self.pop(opcode)?.as_string().trim().to_owned();
                self.push(s);
            }
            Opcode::StrSubstring => {
                let end = self.pop(opcode)?.as_long();
                let start = self.pop(opcode)?.as_long();
                let s = self.pop(opcode)?.as_string();
                let len = i64::try_from(s.chars().count()).unwrap_or(i64::MAX);
                let start = start.clamp(0, len);
                let end = end.clamp(start, len);
                let skip = usize::try_from(start).unwrap_or(0);
                let take = usize::try_from(end - start).unwrap_or(0);
                let out: String = s.chars().skip(skip).take(take).collect();
                self.push(out);
            }
            Opcode::AsBoolean => {
                let v = self.pop(opcode)?.as_boolean();
                self.push(v);
            }
            Opcode::AsInt => {
                let v = self.pop(opcode)?.as_long();
                self.push(v);
            }
            Opcode::AsFloat => {
                let v = self.pop(opcode)?.as_double();
                self.push(Value::float(v));
            }
            Opcode::AsString => {
                let v = self.pop(opcode)?.as_string();
                self.push(v);
            }
            Opcode::Identity => {
                let v = self.pop(opcode)?;
                let identity = match &v {
                    Value::Action(identity) => identity.clone(),
                    _ => match self.ctx.resolve_value(&v)? {
                        Some(e) => e.identity,
                        None => {
                            return Err(Interrupt::runtime(format!(
                                "IDENTITY expected an element or action, got {}",
                                v.kind().name()
                            )));
                        }
                    },
                };
                self.push(identity);
            }

            Opcode::IRandom => {
                let bound = self.pop(opcode)?.as_long();
                let rng = self.ctx.rng();
                let n = match bound.cmp(&0) {
                    core::cmp::Ordering::Equal => 0,
                    core::cmp::Ordering::Greater => rng.gen_range(0..bound),
                    core::cmp::Ordering::Less => rng.gen_range(bound + 1..=0),
                };
                self.push(n);
            }
            Opcode::FRandom => {
                let scale = self.pop(opcode)?.as_double();
                let unit: f64 = self.ctx.rng().gen_range(0.0..1.0);
                self.push(Value::float(unit * scale));
            }
            Opcode::GRandom => {
                let stddev = self.pop(opcode)?.as_double();
                let mean = self.pop(opcode)?.as_double();
                let rng = self.ctx.rng();
                let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
                let u2: f64 = rng.gen_range(0.0..1.0);
                let z = (-2.0 * u1.ln()).sqrt() * (core::f64::consts::TAU * u2).cos();
                self.push(Value::float(mean + z * stddev));
            }
        }
        Ok(())
    }

    fn push_value(&mut self, op: &Operation) -> Result<(), Interrupt> {
        let opcode = op.opcode();
        let v = match operand0(op)? {
            Value::Variable(name) => {
                let name = fold_identity(name);
                let frame = self.frame(opcode)?;
                let v = match frame.locals.get(&name) {
                    Some(v) => v.clone(),
                    None => self
                        .ctx
                        .context(&frame.element.identity)?
                        .get(&name)
                        .cloned()
                        .unwrap_or(Value::Boolean(false)),
                };
                self.trace(TraceType::Value, || format!("read {name} = {v}"));
                v
            }
            Value::List(list) => Value::list(list.borrow().clone()),
            v => v.clone(),
        };
        self.push(v);
        Ok(())
    }

    fn pop_value(&mut self, op: &Operation, local: bool) -> Result<(), Interrupt> {
        let opcode = op.opcode();
        let name = variable_name(opcode, operand0(op)?)?;
        let v = self.pop(opcode)?;
        self.trace(TraceType::Value, || format!("set {name} = {v}"));
        let frame = self.frames.last_mut().ok_or_else(|| bad_operand(opcode))?;
        if local || frame.locals.contains_key(&name) {
            frame.locals.insert(name, v);
        } else {
            self.ctx.context_mut(&frame.element.identity)?.set(&name, v);
        }
        Ok(())
    }

    fn clear_value(&mut self, op: &Operation) -> Result<(), Interrupt> {
        let opcode = op.opcode();
        let name = variable_name(opcode, operand0(op)?)?;
        self.trace(TraceType::Value, || format!("clear {name}"));
        let frame = self.frames.last_mut().ok_or_else(|| bad_operand(opcode))?;
        if frame.locals.remove(&name).is_none() {
            self.ctx.context_mut(&frame.element.identity)?.clear(&name);
        }
        Ok(())
    }

    fn resolve_operand(&self, op: &Operation) -> Result<ElementRef, Interrupt> {
        self.ctx
            .resolve_value(operand0(op)?)?
            .ok_or_else(|| bad_operand(op.opcode()))
    }

    /// Runs the condition block of `op`, which must leave exactly one value.
    fn condition(&mut self, op: &Operation) -> Result<bool, Interrupt> {
        let block = sub_block(op, SubBlock::Condition)?;
        let depth = self.stack.len();
        self.execute_block(block)?;
        let actual = self.stack.len();
        if actual != depth + 1 {
            self.stack.truncate(depth);
            return Err(ExecutionError::StackImbalance {
                expected: depth + 1,
                actual,
            }
            .into());
        }
        Ok(self.pop(op.opcode())?.as_boolean())
    }

    /// Runs one loop iteration. Returns `false` if the loop should stop.
    fn loop_body(&mut self, op: &Operation) -> Result<bool, Interrupt> {
        let Some(body) = op.block(SubBlock::Success) else {
            return Ok(true);
        };
        match self.execute_block(body) {
            Ok(()) | Err(Interrupt::Continue) => Ok(true),
            Err(Interrupt::Break) => {
                self.trace(TraceType::Control, || String::from("BREAK"));
                Ok(false)
            }
            Err(i) => Err(i),
        }
    }

    fn call_function(
        &mut self,
        opcode: Opcode,
        element: ElementRef,
        name: &str,
    ) -> Result<(), Interrupt> {
        let module = Rc::clone(&self.module);
        let Some(function) = module.resolve_function(&element.identity, name) else {
            return Err(ExecutionError::UnknownFunction {
                element: element.identity,
                name: name.into(),
            }
            .into());
        };
        let arity = function.arguments.len();
        let base = self
            .stack
            .len()
            .checked_sub(arity)
            .ok_or_else(|| underflow(opcode))?;
        let mut locals = Locals::with_capacity(arity);
        for (arg, v) in function.arguments.iter().zip(self.stack.drain(base..)) {
            locals.insert(arg.clone(), v);
        }

        let limit = self.ctx.limits().function_depth_max;
        if limit > 0 && self.function_depth >= limit {
            return Err(Interrupt::Runaway(RunawayKind::FunctionDepth { limit }));
        }
        self.function_depth += 1;
        self.function_depth_peak = self.function_depth_peak.max(self.function_depth);
        self.trace(TraceType::Function, || {
            format!("call {element}.{}()", function.name)
        });

        let result = self.call_block(
            element,
            ScopeKind::Function,
            &function.name,
            &function.block,
            locals,
        );
        self.function_depth -= 1;
        let v = match result {
            Ok(()) => Value::Boolean(false),
            Err(Interrupt::Return) => self.return_value.take().unwrap_or(Value::Boolean(false)),
            Err(i) => return Err(i),
        };
        self.push(v);
        Ok(())
    }

    fn queue(&mut self, invocation: ActionInvocation) {
        self.trace(TraceType::Interpreter, || {
            format!("queued {invocation:?}")
        });
        self.belayed.push_back(invocation);
    }

    fn focus(&mut self, element: &ElementRef, entry: BlockEntryType) -> Result<(), Interrupt> {
        self.run_entry(element, &BlockEntry::new(entry), Locals::new())?;
        Ok(())
    }

    /// Switches the current player, running the outgoing player's `ONUNFOCUS` and the incoming
    /// player's `ONFOCUS`. Does nothing if `player` is already current.
    pub(crate) fn set_player(&mut self, player: ElementRef) -> Result<(), Interrupt> {
        let previous = self.ctx.current_player().ok();
        if previous.as_ref() == Some(&player) {
            return Ok(());
        }
        if let Some(previous) = &previous {
            self.focus(previous, BlockEntryType::OnUnfocus)?;
        }
        self.ctx
            .ownership_mut()
            .set_current_player(Some(&player.identity));
        self.focus(&player, BlockEntryType::OnFocus)
    }

    fn browse(&mut self, opcode: Opcode) -> Result<(), Interrupt> {
        let holder = self.pop_holder(opcode)?;
        let specific = BlockEntry::new(match holder.kind {
            ElementKind::World => BlockEntryType::OnWorldBrowse,
            ElementKind::Player => BlockEntryType::OnPlayerBrowse,
            ElementKind::Room => BlockEntryType::OnRoomBrowse,
            ElementKind::Container | ElementKind::Object => BlockEntryType::OnContainerBrowse,
        });
        let fallback = BlockEntry::new(BlockEntryType::OnElementBrowse);
        for object in self.ctx.ownership().objects_held(&holder) {
            let object = ElementRef::new(ElementKind::Object, &object);
            if !self.run_entry(&object, &specific, Locals::new())? {
                self.run_entry(&object, &fallback, Locals::new())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Asm;
    use crate::context::Limits;
    use crate::element::{Action, Element, FunctionEntry};
    use crate::operator::ArithmeticOperator as Op;

    fn module(build: impl FnOnce(&mut Module)) -> Rc<Module> {
        let mut m = Module::new();
        m.add_element(Element::new(ElementKind::Player, "me").unwrap())
            .unwrap();
        m.add_element(Element::new(ElementKind::Room, "hall").unwrap())
            .unwrap();
        m.add_element(Element::new(ElementKind::Object, "lamp").unwrap())
            .unwrap();
        build(&mut m);
        Rc::new(m)
    }

    fn run(ctx: &mut ModuleContext, block: &Block) -> (Result<(), Interrupt>, Vec<Cue>, u64) {
        let mut r = Request::begin(ctx, RequestOptions::default(), "test");
        let result = r.call_block(
            ElementRef::world(),
            ScopeKind::Entry(BlockEntryType::Start),
            "test",
            block,
            Locals::new(),
        );
        let stack_left = r.stack.len();
        assert_eq!(stack_left, 0, "stack must be empty after a block");
        let ops = r.operations;
        (result, r.cues, ops)
    }

    fn text(cues: &[Cue]) -> String {
        cues.iter().filter_map(Cue::as_str).collect()
    }

    #[test]
    fn arithmetic_and_text() {
        let mut ctx = ModuleContext::with_seed(module(|_| {}), 7).unwrap();
        let block = Asm::block(|a| {
            a.push(2_i64).push(3_i64).arith(Op::Multiply).text();
            a.push(" ")
                .push(1_i64)
                .push(0.5)
                .arith(Op::Add)
                .arith(Op::Add)
                .textln();
        });
        let (result, cues, ops) = run(&mut ctx, &block);
        assert_eq!(result, Ok(()));
        assert_eq!(text(&cues), "6 1.5\n");
        assert_eq!(ops, 10);
    }

    #[test]
    fn variables_fall_back_to_false_and_persist_on_the_context() {
        let mut ctx = ModuleContext::with_seed(module(|_| {}), 7).unwrap();
        let block = Asm::block(|a| {
            a.push_var("missing").text();
            a.push(5_i64).pop_value("Score");
            a.push(1_i64).pop_local("tmp");
            a.push_var("tmp").pop_value("tmp");
        });
        let (result, cues, _) = run(&mut ctx, &block);
        assert_eq!(result, Ok(()));
        assert_eq!(text(&cues), "false");
        let world = ctx.context("world").unwrap();
        assert_eq!(world.get("score"), Some(&Value::Integer(5)));
        assert_eq!(world.get("tmp"), None);
    }

    #[test]
    fn element_values_resolve_sentinels() {
        let mut ctx = ModuleContext::with_seed(module(|_| {}), 7).unwrap();
        ctx.ownership_mut().set_current_player(Some("me"));
        let block = Asm::block(|a| {
            a.push(3_i64).pop_element_value(Value::player("player"), "hp");
            a.push_element_value(Value::player("me"), "hp").text();
        });
        let (result, cues, _) = run(&mut ctx, &block);
        assert_eq!(result, Ok(()));
        assert_eq!(text(&cues), "3");
    }

    #[test]
    fn while_loop_honors_break_and_continue() {
        let mut ctx = ModuleContext::with_seed(module(|_| {}), 7).unwrap();
        let block = Asm::block(|a| {
            a.push(0_i64).pop_value("i");
            a.while_loop(
                |c| {
                    c.push(true);
                },
                |b| {
                    b.push_var("i").push(1_i64).arith(Op::Add).pop_value("i");
                    b.if_then(
                        |c| {
                            c.push_var("i").push(2_i64).arith(Op::Equals);
                        },
                        |t| {
                            t.cont();
                        },
                    );
                    b.if_then(
                        |c| {
                            c.push_var("i").push(4_i64).arith(Op::GreaterOrEqual);
                        },
                        |t| {
                            t.brk();
                        },
                    );
                    b.push_var("i").text();
                },
            );
        });
        let (result, cues, _) = run(&mut ctx, &block);
        assert_eq!(result, Ok(()));
        assert_eq!(text(&cues), "13");
    }

    #[test]
    fn functions_bind_arguments_and_return() {
        let m = module(|m| {
            let add = Asm::block(|a| {
                a.push_var("a").push_var("b").arith(Op::Add).ret();
            });
            m.world_mut()
                .add_function(FunctionEntry::new("add", &["a", "b"], add));
            m.world_mut()
                .add_function(FunctionEntry::new("nothing", &[], Block::new()));
        });
        let mut ctx = ModuleContext::with_seed(m, 7).unwrap();
        let block = Asm::block(|a| {
            a.push(40_i64).push(2_i64).call("ADD").text();
            a.call("nothing").text();
        });
        let (result, cues, _) = run(&mut ctx, &block);
        assert_eq!(result, Ok(()));
        assert_eq!(text(&cues), "42false");
    }

    #[test]
    fn unknown_function_is_fatal() {
        let mut ctx = ModuleContext::with_seed(module(|_| {}), 7).unwrap();
        let block = Asm::block(|a| {
            a.call("ghost");
        });
        let (result, _, _) = run(&mut ctx, &block);
        assert!(matches!(
            result,
            Err(Interrupt::Fatal(ExecutionError::UnknownFunction { .. }))
        ));
    }

    #[test]
    fn runaway_trips_on_the_threshold_operation() {
        let mut ctx = ModuleContext::with_seed(module(|_| {}), 7).unwrap();
        ctx.set_limits(Limits {
            runaway_max: 100,
            ..Limits::default()
        });
        let block = Asm::block(|a| {
            a.while_loop(
                |c| {
                    c.push(true);
                },
                |_| {},
            );
        });
        let (result, _, ops) = run(&mut ctx, &block);
        assert_eq!(
            result,
            Err(Interrupt::Runaway(RunawayKind::Operations { limit: 100 }))
        );
        assert_eq!(ops, 100);
    }

    #[test]
    fn deep_recursion_trips_the_depth_guard() {
        let m = module(|m| {
            let body = Asm::block(|a| {
                a.call("down").pop();
            });
            m.world_mut()
                .add_function(FunctionEntry::new("down", &[], body));
        });
        let mut ctx = ModuleContext::with_seed(m, 7).unwrap();
        ctx.set_limits(Limits {
            runaway_max: 0,
            function_depth_max: 8,
        });
        let block = Asm::block(|a| {
            a.call("down").pop();
        });
        let (result, _, _) = run(&mut ctx, &block);
        assert_eq!(
            result,
            Err(Interrupt::Runaway(RunawayKind::FunctionDepth { limit: 8 }))
        );
    }

    #[test]
    fn leftover_values_are_an_imbalance() {
        let mut ctx = ModuleContext::with_seed(module(|_| {}), 7).unwrap();
        let block = Asm::block(|a| {
            a.push(1_i64);
        });
        let (result, _, _) = run(&mut ctx, &block);
        assert_eq!(
            result,
            Err(Interrupt::Fatal(ExecutionError::StackImbalance {
                expected: 0,
                actual: 1,
            }))
        );
    }

    #[test]
    fn script_errors_unwind_the_stack() {
        let mut ctx = ModuleContext::with_seed(module(|_| {}), 7).unwrap();
        let block = Asm::block(|a| {
            a.push(1_i64).push(2_i64).push("boom").error();
        });
        let (result, _, _) = run(&mut ctx, &block);
        assert_eq!(result, Err(Interrupt::Error("boom".into())));
    }

    #[test]
    fn lists_are_shared_by_reference() {
        let mut ctx = ModuleContext::with_seed(module(|_| {}), 7).unwrap();
        let block = Asm::block(|a| {
            a.push_new_list().pop_value("a");
            a.push_var("a").pop_value("b");
            a.push_var("b").push(7_i64).list_add().pop();
            a.push_var("a").length().text();
            a.push_var("a").push(0_i64).list_get().text();
            a.push_var("a").push(7_i64).list_index_of().text();
            a.push_var("a").push(5_i64).list_get().text();
        });
        let (result, cues, _) = run(&mut ctx, &block);
        assert_eq!(result, Ok(()));
        assert_eq!(text(&cues), "170false");
    }

    #[test]
    fn self_containing_lists_print_and_compare() {
        let mut ctx = ModuleContext::with_seed(module(|_| {}), 7).unwrap();
        let block = Asm::block(|a| {
            a.push_new_list().pop_value("a");
            a.push_var("a").push_var("a").list_add().pop();
            a.push_new_list().pop_value("b");
            a.push_var("b").push_var("b").list_add().pop();
            a.push_var("a").length().text();
            a.push(" ").text();
            a.push_var("a").text();
            a.push(" ").text();
            a.push_var("a").push_var("b").list_contains().text();
            a.push_var("a").push_var("b").arith(Op::StrictEquals).text();
            a.push_var("a").push_var("b").list_index_of().text();
            a.push_var("b").push_var("a").list_remove().text();
            a.push_var("b").length().text();
        });
        let (result, cues, _) = run(&mut ctx, &block);
        assert_eq!(result, Ok(()));
        assert_eq!(text(&cues), "1 [[...]] truetrue0true0");

        // Break the remaining cycle so the test does not leak.
        if let Some(Value::List(a)) = ctx.context("world").unwrap().get("a") {
            a.borrow_mut().clear();
        }
    }

    #[test]
    fn list_ops_on_scalars_are_runtime_errors() {
        let mut ctx = ModuleContext::with_seed(module(|_| {}), 7).unwrap();
        let block = Asm::block(|a| {
            a.push(3_i64).push(1_i64).list_add().pop();
        });
        let (result, _, _) = run(&mut ctx, &block);
        assert!(matches!(result, Err(Interrupt::RuntimeError(_))));
    }

    #[test]
    fn ownership_ops_move_objects() {
        let mut ctx = ModuleContext::with_seed(module(|_| {}), 7).unwrap();
        let block = Asm::block(|a| {
            a.push(Value::room("hall"))
                .push(Value::object("lamp"))
                .give_object();
            a.push(Value::room("hall")).object_count().text();
            a.push(Value::room("hall"))
                .push(Value::player("me"))
                .move_objects_to();
            a.push(Value::player("me"))
                .push(Value::object("lamp"))
                .has_object()
                .text();
            a.push(Value::object("lamp"))
                .push("Shiny")
                .add_object_name();
            a.push(Value::object("lamp"))
                .push("shiny")
                .object_has_name()
                .text();
        });
        let (result, cues, _) = run(&mut ctx, &block);
        assert_eq!(result, Ok(()));
        assert_eq!(text(&cues), "1truetrue");
        assert_eq!(
            ctx.ownership().owner("lamp"),
            Some(&ElementRef::new(ElementKind::Player, "me"))
        );
    }

    #[test]
    fn focus_changes_run_focus_blocks() {
        let m = module(|m| {
            let me = m.element_mut("me").unwrap();
            me.add_block(
                BlockEntry::new(BlockEntryType::OnFocus),
                Asm::block(|a| {
                    a.text_str("[me]");
                }),
            );
            let hall = m.element_mut("hall").unwrap();
            hall.add_block(
                BlockEntry::new(BlockEntryType::OnFocus),
                Asm::block(|a| {
                    a.text_str("[hall]");
                }),
            );
            hall.add_block(
                BlockEntry::new(BlockEntryType::OnUnfocus),
                Asm::block(|a| {
                    a.text_str("[bye]");
                }),
            );
        });
        let mut ctx = ModuleContext::with_seed(m, 7).unwrap();
        let block = Asm::block(|a| {
            a.push(Value::player("me")).set_player();
            a.push(Value::player("me")).set_player();
            a.push(Value::room("hall")).push_room();
            a.push(Value::room("hall")).current_room_is().text();
            a.pop_room();
            a.no_current_room().text();
        });
        let (result, cues, _) = run(&mut ctx, &block);
        assert_eq!(result, Ok(()));
        assert_eq!(text(&cues), "[me][hall]true[bye]true");
    }

    #[test]
    fn queue_action_checks_identity() {
        let m = module(|m| {
            m.add_action(Action::new("look", ActionKind::General).unwrap())
                .unwrap();
        });
        let mut ctx = ModuleContext::with_seed(m, 7).unwrap();
        let mut r = Request::begin(&mut ctx, RequestOptions::default(), "test");
        let block = Asm::block(|a| {
            a.push(Value::action("look")).queue_action();
            a.push(Value::action("dance")).queue_action();
        });
        let result = r.call_block(
            ElementRef::world(),
            ScopeKind::Function,
            "test",
            &block,
            Locals::new(),
        );
        assert_eq!(
            result,
            Err(Interrupt::Fatal(ExecutionError::UnknownAction {
                identity: "dance".into()
            }))
        );
        assert_eq!(r.next_belayed(), Some(ActionInvocation::general("look")));
        assert_eq!(r.next_belayed(), None);
    }

    #[test]
    fn irandom_stays_in_range() {
        let mut ctx = ModuleContext::with_seed(module(|_| {}), 7).unwrap();
        let block = Asm::block(|a| {
            a.push(0_i64).pop_value("i");
            a.while_loop(
                |c| {
                    c.push_var("i").push(50_i64).arith(Op::Less);
                },
                |b| {
                    b.push_var("i").push(1_i64).arith(Op::Add).pop_value("i");
                    b.push(-3_i64).irandom().pop_value("n");
                    b.if_then(
                        |c| {
                            c.push_var("n")
                                .push(-2_i64)
                                .arith(Op::Less)
                                .push_var("n")
                                .push(0_i64)
                                .arith(Op::Greater)
                                .arith(Op::LogicalOr);
                        },
                        |t| {
                            t.push("out of range").error();
                        },
                    );
                },
            );
        });
        let (result, _, _) = run(&mut ctx, &block);
        assert_eq!(result, Ok(()));
    }
}
