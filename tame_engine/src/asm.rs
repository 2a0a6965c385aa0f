// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Block builder ("assembler") for `tame_engine`.
//!
//! This is a small, public helper for constructing [`Block`] trees without spelling out every
//! [`Operation`] by hand. Script compilers, tests and benchmarks all build blocks through it.
//!
//! Operands follow the stack effects documented on [`Opcode`]: push the inputs in order, then emit
//! the operation.

use crate::block::{Block, Operation, SubBlock};
use crate::opcode::Opcode;
use crate::operator::ArithmeticOperator;
use crate::value::{Value, fold_identity};

/// Block builder.
#[derive(Clone, Debug, Default)]
pub struct Asm {
    ops: Vec<Operation>,
}

macro_rules! plain_ops {
    ($( $(#[$doc:meta])* $method:ident => $opcode:ident; )*) => {
        $(
            $(#[$doc])*
            pub fn $method(&mut self) -> &mut Self {
                self.op(Opcode::$opcode)
            }
        )*
    };
}

impl Asm {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a block from a closure over a fresh assembler.
    #[must_use]
    pub fn block(f: impl FnOnce(&mut Self)) -> Block {
        let mut a = Self::new();
        f(&mut a);
        a.finish()
    }

    /// Returns the number of operations emitted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns `true` if nothing has been emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Finalizes and returns the block.
    #[must_use]
    pub fn finish(self) -> Block {
        Block::from(self.ops)
    }

    /// Appends a prebuilt operation.
    pub fn raw(&mut self, op: Operation) -> &mut Self {
        self.ops.push(op);
        self
    }

    /// Appends an operation with no operands.
    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.raw(Operation::new(opcode))
    }

    fn op1(&mut self, opcode: Opcode, operand0: Value) -> &mut Self {
        self.raw(Operation::new(opcode).with_operand0(operand0))
    }

    fn op2(&mut self, opcode: Opcode, operand0: Value, operand1: Value) -> &mut Self {
        self.raw(
            Operation::new(opcode)
                .with_operand0(operand0)
                .with_operand1(operand1),
        )
    }

    /// `PUSHVALUE value`.
    pub fn push(&mut self, v: impl Into<Value>) -> &mut Self {
        self.op1(Opcode::PushValue, v.into())
    }

    /// `PUSHVALUE` of a variable, read at run time.
    pub fn push_var(&mut self, name: &str) -> &mut Self {
        self.op1(Opcode::PushValue, Value::variable(name))
    }

    /// `POPVALUE name`.
    pub fn pop_value(&mut self, name: &str) -> &mut Self {
        self.op1(Opcode::PopValue, Value::variable(name))
    }

    /// `POPLOCALVALUE name`.
    pub fn pop_local(&mut self, name: &str) -> &mut Self {
        self.op1(Opcode::PopLocalValue, Value::variable(name))
    }

    /// `CLEARVALUE name`.
    pub fn clear_value(&mut self, name: &str) -> &mut Self {
        self.op1(Opcode::ClearValue, Value::variable(name))
    }

    /// `PUSHELEMENTVALUE element, name`.
    pub fn push_element_value(&mut self, element: Value, name: &str) -> &mut Self {
        self.op2(Opcode::PushElementValue, element, Value::variable(name))
    }

    /// `POPELEMENTVALUE element, name`.
    pub fn pop_element_value(&mut self, element: Value, name: &str) -> &mut Self {
        self.op2(Opcode::PopElementValue, element, Value::variable(name))
    }

    /// `CLEARELEMENTVALUE element, name`.
    pub fn clear_element_value(&mut self, element: Value, name: &str) -> &mut Self {
        self.op2(Opcode::ClearElementValue, element, Value::variable(name))
    }

    /// `ARITHMETICFUNC op`.
    pub fn arith(&mut self, op: ArithmeticOperator) -> &mut Self {
        self.op1(Opcode::ArithmeticFunc, Value::Integer(i64::from(op.ordinal())))
    }

    /// `CALLFUNCTION name`.
    pub fn call(&mut self, name: &str) -> &mut Self {
        self.op1(Opcode::CallFunction, Value::string(fold_identity(name)))
    }

    /// `CALLELEMENTFUNCTION name`.
    pub fn call_element(&mut self, name: &str) -> &mut Self {
        self.op1(Opcode::CallElementFunction, Value::string(fold_identity(name)))
    }

    /// `IF` with only a success branch.
    pub fn if_then(
        &mut self,
        condition: impl FnOnce(&mut Self),
        success: impl FnOnce(&mut Self),
    ) -> &mut Self {
        self.raw(
            Operation::new(Opcode::If)
                .with_block(SubBlock::Condition, Self::block(condition))
                .with_block(SubBlock::Success, Self::block(success)),
        )
    }

    /// `IF` with both branches.
    pub fn if_else(
        &mut self,
        condition: impl FnOnce(&mut Self),
        success: impl FnOnce(&mut Self),
        failure: impl FnOnce(&mut Self),
    ) -> &mut Self {
        self.raw(
            Operation::new(Opcode::If)
                .with_block(SubBlock::Condition, Self::block(condition))
                .with_block(SubBlock::Success, Self::block(success))
                .with_block(SubBlock::Failure, Self::block(failure)),
        )
    }

    /// `WHILE`.
    pub fn while_loop(
        &mut self,
        condition: impl FnOnce(&mut Self),
        body: impl FnOnce(&mut Self),
    ) -> &mut Self {
        self.raw(
            Operation::new(Opcode::While)
                .with_block(SubBlock::Condition, Self::block(condition))
                .with_block(SubBlock::Success, Self::block(body)),
        )
    }

    /// `FOR`.
    pub fn for_loop(
        &mut self,
        init: impl FnOnce(&mut Self),
        condition: impl FnOnce(&mut Self),
        step: impl FnOnce(&mut Self),
        body: impl FnOnce(&mut Self),
    ) -> &mut Self {
        self.raw(
            Operation::new(Opcode::For)
                .with_block(SubBlock::Init, Self::block(init))
                .with_block(SubBlock::Condition, Self::block(condition))
                .with_block(SubBlock::Step, Self::block(step))
                .with_block(SubBlock::Success, Self::block(body)),
        )
    }

    /// Pushes `s` and emits `TEXT`.
    pub fn text_str(&mut self, s: &str) -> &mut Self {
        self.push(s).text()
    }

    /// Pushes `s` and emits `TEXTLN`.
    pub fn textln_str(&mut self, s: &str) -> &mut Self {
        self.push(s).textln()
    }

    plain_ops! {
        /// `NOOP`.
        nop => Noop;
        /// `POP`.
        pop => Pop;
        /// `PUSHTHIS`.
        push_this => PushThis;
        /// `PUSHNEWLIST`.
        push_new_list => PushNewList;
        /// `PUSHINITLIST`.
        push_init_list => PushInitList;
        /// `BREAK`.
        brk => Break;
        /// `CONTINUE`.
        cont => Continue;
        /// `END`.
        end => End;
        /// `FINISH`.
        finish_request => Finish;
        /// `QUIT`.
        quit => Quit;
        /// `ERROR`.
        error => Error;
        /// `FUNCTIONRETURN`.
        ret => FunctionReturn;
        /// `TEXT`.
        text => Text;
        /// `TEXTLN`.
        textln => TextLn;
        /// `TEXTF`.
        textf => TextF;
        /// `TEXTFLN`.
        textfln => TextFLn;
        /// `PAUSE`.
        pause => Pause;
        /// `WAIT`.
        wait => Wait;
        /// `TIP`.
        tip => Tip;
        /// `INFO`.
        info => Info;
        /// `SAVE`.
        save => Save;
        /// `LOAD`.
        load => Load;
        /// `QUEUEACTION`.
        queue_action => QueueAction;
        /// `QUEUEACTIONSTRING`.
        queue_action_string => QueueActionString;
        /// `QUEUEACTIONOBJECT`.
        queue_action_object => QueueActionObject;
        /// `QUEUEACTIONOBJECT2`.
        queue_action_object2 => QueueActionObject2;
        /// `GIVEOBJECT`.
        give_object => GiveObject;
        /// `REMOVEOBJECT`.
        remove_object => RemoveObject;
        /// `MOVEOBJECTSTO`.
        move_objects_to => MoveObjectsTo;
        /// `HASOBJECT`.
        has_object => HasObject;
        /// `OBJECTHASNOOWNER`.
        object_has_no_owner => ObjectHasNoOwner;
        /// `OBJECTCOUNT`.
        object_count => ObjectCount;
        /// `ADDOBJECTNAME`.
        add_object_name => AddObjectName;
        /// `REMOVEOBJECTNAME`.
        remove_object_name => RemoveObjectName;
        /// `OBJECTHASNAME`.
        object_has_name => ObjectHasName;
        /// `ADDOBJECTTAG`.
        add_object_tag => AddObjectTag;
        /// `REMOVEOBJECTTAG`.
        remove_object_tag => RemoveObjectTag;
        /// `OBJECTHASTAG`.
        object_has_tag => ObjectHasTag;
        /// `BROWSE`.
        browse => Browse;
        /// `SETPLAYER`.
        set_player => SetPlayer;
        /// `PUSHROOM`.
        push_room => PushRoom;
        /// `POPROOM`.
        pop_room => PopRoom;
        /// `SWAPROOM`.
        swap_room => SwapRoom;
        /// `CURRENTPLAYERIS`.
        current_player_is => CurrentPlayerIs;
        /// `CURRENTROOMIS`.
        current_room_is => CurrentRoomIs;
        /// `NOCURRENTPLAYER`.
        no_current_player => NoCurrentPlayer;
        /// `NOCURRENTROOM`.
        no_current_room => NoCurrentRoom;
        /// `LISTADD`.
        list_add => ListAdd;
        /// `LISTADDAT`.
        list_add_at => ListAddAt;
        /// `LISTGET`.
        list_get => ListGet;
        /// `LISTSET`.
        list_set => ListSet;
        /// `LISTREMOVEINDEX`.
        list_remove_index => ListRemoveIndex;
        /// `LISTREMOVE`.
        list_remove => ListRemove;
        /// `LISTINDEXOF`.
        list_index_of => ListIndexOf;
        /// `LISTCONTAINS`.
        list_contains => ListContains;
        /// `LENGTH`.
        length => Length;
        /// `STRUPPER`.
        str_upper => StrUpper;
        /// `STRLOWER`.
        str_lower => StrLower;
        /// `STRTRIM`.
        str_trim => StrTrim;
        /// `STRSUBSTRING`.
        str_substring => StrSubstring;
        /// `ASBOOLEAN`.
        as_boolean => AsBoolean;
        /// `ASINT`.
        as_int => AsInt;
        /// `ASFLOAT`.
        as_float => AsFloat;
        /// `ASSTRING`.
        as_string => AsString;
        /// `IDENTITY`.
        identity => Identity;
        /// `IRANDOM`.
        irandom => IRandom;
        /// `FRANDOM`.
        frandom => FRandom;
        /// `GRANDOM`.
        grandom => GRandom;
    }
}
