// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Operation codes and their stable byte values.
//!
//! Stack effects are written `pops -> pushes`, with the last-pushed operand listed last.

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $name:ident = $byte:literal, $text:literal; )*) => {
        /// An operation code. The discriminant is the wire byte.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $( $(#[$doc])* $name = $byte, )*
        }

        impl Opcode {
            /// Parses an opcode from its byte value.
            #[must_use]
            pub fn from_byte(b: u8) -> Option<Self> {
                match b {
                    $( $byte => Some(Self::$name), )*
                    _ => None,
                }
            }

            /// Returns the upper-case mnemonic.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $( Self::$name => $text, )*
                }
            }
        }
    };
}

opcodes! {
    /// No-op.
    Noop = 0x00, "NOOP";
    /// `value ->`.
    Pop = 0x01, "POP";
    /// `-> value`. `operand0` is a literal, or a variable that is read.
    PushValue = 0x02, "PUSHVALUE";
    /// `value ->`. Assigns `operand0` (a variable): a local if one exists, else the context.
    PopValue = 0x03, "POPVALUE";
    /// `value ->`. Assigns the local variable `operand0`.
    PopLocalValue = 0x04, "POPLOCALVALUE";
    /// Removes variable `operand0` from the local scope, or else from the context.
    ClearValue = 0x05, "CLEARVALUE";
    /// `-> value`. Reads variable `operand1` of element `operand0`.
    PushElementValue = 0x06, "PUSHELEMENTVALUE";
    /// `value ->`. Assigns variable `operand1` of element `operand0`.
    PopElementValue = 0x07, "POPELEMENTVALUE";
    /// Removes variable `operand1` of element `operand0`.
    ClearElementValue = 0x08, "CLEARELEMENTVALUE";
    /// `-> element`. Pushes the element whose block or function is running.
    PushThis = 0x09, "PUSHTHIS";
    /// `-> list`. Pushes a fresh empty list.
    PushNewList = 0x0a, "PUSHNEWLIST";
    /// `v1 .. vn n -> list`. Pushes a fresh list of the `n` values below the count.
    PushInitList = 0x0b, "PUSHINITLIST";

    /// `a -> r` or `a b -> r`. `operand0` is the operator ordinal.
    ArithmeticFunc = 0x10, "ARITHMETICFUNC";

    /// Runs `condition`, then `success` or `failure`.
    If = 0x20, "IF";
    /// Runs `success` while `condition` holds.
    While = 0x21, "WHILE";
    /// Runs `init`, then `success` and `step` while `condition` holds.
    For = 0x22, "FOR";
    /// Leaves the nearest loop.
    Break = 0x23, "BREAK";
    /// Skips to the next iteration of the nearest loop.
    Continue = 0x24, "CONTINUE";
    /// Ends the current action handler.
    End = 0x25, "END";
    /// Ends the request.
    Finish = 0x26, "FINISH";
    /// Ends the request and asks the client to quit.
    Quit = 0x27, "QUIT";
    /// `message ->`. Raises a script error.
    Error = 0x28, "ERROR";

    /// `args.. -> result`. Calls function `operand0` resolved from the running element.
    CallFunction = 0x30, "CALLFUNCTION";
    /// `args.. element -> result`. Calls function `operand0` on `element`.
    CallElementFunction = 0x31, "CALLELEMENTFUNCTION";
    /// `value ->`. Returns `value` from the running function.
    FunctionReturn = 0x32, "FUNCTIONRETURN";

    /// `value ->`. Emits a TEXT cue.
    Text = 0x40, "TEXT";
    /// `value ->`. Emits a TEXT cue followed by a newline.
    TextLn = 0x41, "TEXTLN";
    /// `value ->`. Emits a TEXTF (formatted text) cue.
    TextF = 0x42, "TEXTF";
    /// `value ->`. Emits a TEXTF cue followed by a newline.
    TextFLn = 0x43, "TEXTFLN";
    /// Emits a PAUSE cue.
    Pause = 0x44, "PAUSE";
    /// `millis ->`. Emits a WAIT cue.
    Wait = 0x45, "WAIT";
    /// `value ->`. Emits a TIP cue.
    Tip = 0x46, "TIP";
    /// `value ->`. Emits an INFO cue.
    Info = 0x47, "INFO";
    /// `name ->`. Emits a SAVE cue.
    Save = 0x48, "SAVE";
    /// `name ->`. Emits a LOAD cue.
    Load = 0x49, "LOAD";

    /// `action ->`. Queues a general action.
    QueueAction = 0x50, "QUEUEACTION";
    /// `action text ->`. Queues a modal or open action.
    QueueActionString = 0x51, "QUEUEACTIONSTRING";
    /// `action object ->`. Queues a transitive action.
    QueueActionObject = 0x52, "QUEUEACTIONOBJECT";
    /// `action object object2 ->`. Queues a ditransitive action.
    QueueActionObject2 = 0x53, "QUEUEACTIONOBJECT2";

    /// `holder object ->`. Moves `object` into `holder`.
    GiveObject = 0x60, "GIVEOBJECT";
    /// `object ->`. Removes `object` from its holder.
    RemoveObject = 0x61, "REMOVEOBJECT";
    /// `from to ->`. Moves every object held by `from` into `to`.
    MoveObjectsTo = 0x62, "MOVEOBJECTSTO";
    /// `holder object -> bool`.
    HasObject = 0x63, "HASOBJECT";
    /// `object -> bool`.
    ObjectHasNoOwner = 0x64, "OBJECTHASNOOWNER";
    /// `holder -> count`.
    ObjectCount = 0x65, "OBJECTCOUNT";
    /// `object name ->`.
    AddObjectName = 0x66, "ADDOBJECTNAME";
    /// `object name ->`.
    RemoveObjectName = 0x67, "REMOVEOBJECTNAME";
    /// `object name -> bool`.
    ObjectHasName = 0x68, "OBJECTHASNAME";
    /// `object tag ->`.
    AddObjectTag = 0x69, "ADDOBJECTTAG";
    /// `object tag ->`.
    RemoveObjectTag = 0x6a, "REMOVEOBJECTTAG";
    /// `object tag -> bool`.
    ObjectHasTag = 0x6b, "OBJECTHASTAG";
    /// `holder ->`. Runs the browse block of every object `holder` holds.
    Browse = 0x6c, "BROWSE";

    /// `player ->`. Switches the current player.
    SetPlayer = 0x70, "SETPLAYER";
    /// `room ->`. Pushes a room onto the current player's room stack.
    PushRoom = 0x71, "PUSHROOM";
    /// Pops the current player's room stack.
    PopRoom = 0x72, "POPROOM";
    /// `room ->`. Replaces the current player's current room.
    SwapRoom = 0x73, "SWAPROOM";
    /// `player -> bool`.
    CurrentPlayerIs = 0x74, "CURRENTPLAYERIS";
    /// `room -> bool`.
    CurrentRoomIs = 0x75, "CURRENTROOMIS";
    /// `-> bool`.
    NoCurrentPlayer = 0x76, "NOCURRENTPLAYER";
    /// `-> bool`.
    NoCurrentRoom = 0x77, "NOCURRENTROOM";

    /// `list value -> bool`. Appends.
    ListAdd = 0x80, "LISTADD";
    /// `list value index -> bool`. Inserts.
    ListAddAt = 0x81, "LISTADDAT";
    /// `list index -> value`. Out of range yields `false`.
    ListGet = 0x82, "LISTGET";
    /// `list index value -> bool`.
    ListSet = 0x83, "LISTSET";
    /// `list index -> value`. Out of range yields `false`.
    ListRemoveIndex = 0x84, "LISTREMOVEINDEX";
    /// `list value -> bool`. Removes the first strictly-equal element.
    ListRemove = 0x85, "LISTREMOVE";
    /// `list value -> index`. `-1` if absent.
    ListIndexOf = 0x86, "LISTINDEXOF";
    /// `list value -> bool`.
    ListContains = 0x87, "LISTCONTAINS";

    /// `value -> length`.
    Length = 0x90, "LENGTH";
    /// `string -> string`.
    StrUpper = 0x91, "STRUPPER";
    /// `string -> string`.
    StrLower = 0x92, "STRLOWER";
    /// `string -> string`.
    StrTrim = 0x93, "STRTRIM";
    /// `string start end -> string`. Character indices, clamped.
    StrSubstring = 0x94, "STRSUBSTRING";
    /// `value -> bool`.
    AsBoolean = 0x95, "ASBOOLEAN";
    /// `value -> int`.
    AsInt = 0x96, "ASINT";
    /// `value -> float`.
    AsFloat = 0x97, "ASFLOAT";
    /// `value -> string`.
    AsString = 0x98, "ASSTRING";
    /// `element -> string`.
    Identity = 0x99, "IDENTITY";

    /// `bound -> int`. Uniform in `[0, bound)`, or `(bound, 0]` for a negative bound.
    IRandom = 0xa0, "IRANDOM";
    /// `scale -> float`. Uniform in `[0, scale)`.
    FRandom = 0xa1, "FRANDOM";
    /// `mean stddev -> float`. Normally distributed.
    GRandom = 0xa2, "GRANDOM";
}

impl Opcode {
    /// Returns the opcode byte value.
    #[must_use]
    pub const fn byte(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::Opcode;

    #[test]
    fn opcode_values_are_stable() {
        assert_eq!(Opcode::PushValue as u8, 0x02);
        assert_eq!(Opcode::ArithmeticFunc as u8, 0x10);
        assert_eq!(Opcode::If as u8, 0x20);
        assert_eq!(Opcode::CallFunction as u8, 0x30);
        assert_eq!(Opcode::GiveObject as u8, 0x60);
        assert_eq!(Opcode::GRandom as u8, 0xa2);
    }

    #[test]
    fn bytes_round_trip() {
        for b in 0..=u8::MAX {
            if let Some(op) = Opcode::from_byte(b) {
                assert_eq!(op.byte(), b, "{} re-encodes", op.name());
            }
        }
        assert_eq!(Opcode::from_byte(0xff), None);
    }
}
