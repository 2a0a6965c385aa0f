// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Executable blocks.
//!
//! A [`Block`] is an ordered list of [`Operation`]s. Control-flow operations carry their bodies
//! as nested sub-blocks instead of jump offsets, so a block is a tree that the interpreter walks
//! recursively.

use crate::opcode::Opcode;
use crate::value::Value;

/// The nested sub-blocks an [`Operation`] may carry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SubBlock {
    /// Runs once before a `FOR` loop.
    Init,
    /// Leaves one value whose truthiness selects the branch.
    Condition,
    /// Runs after each `FOR` iteration.
    Step,
    /// Branch taken when the condition holds; also the loop body.
    Success,
    /// Branch taken when the condition does not hold.
    Failure,
}

impl SubBlock {
    /// Every sub-block slot, in wire order.
    pub const ALL: [Self; 5] = [
        Self::Init,
        Self::Condition,
        Self::Step,
        Self::Success,
        Self::Failure,
    ];

    pub(crate) const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// One operation: an opcode, up to two operands and up to five sub-blocks.
#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    opcode: Opcode,
    operand0: Option<Value>,
    operand1: Option<Value>,
    init: Option<Block>,
    condition: Option<Block>,
    step: Option<Block>,
    success: Option<Block>,
    failure: Option<Block>,
}

impl Operation {
    /// Creates an operation with no operands or sub-blocks.
    #[must_use]
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            operand0: None,
            operand1: None,
            init: None,
            condition: None,
            step: None,
            success: None,
            failure: None,
        }
    }

    /// Sets the first operand.
    #[must_use]
    pub fn with_operand0(mut self, v: Value) -> Self {
        self.operand0 = Some(v);
        self
    }

    /// Sets the second operand.
    #[must_use]
    pub fn with_operand1(mut self, v: Value) -> Self {
        self.operand1 = Some(v);
        self
    }

    /// Attaches a sub-block.
    #[must_use]
    pub fn with_block(mut self, slot: SubBlock, block: Block) -> Self {
        *self.slot_mut(slot) = Some(block);
        self
    }

    /// Returns the opcode.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Returns the first operand.
    #[must_use]
    pub fn operand0(&self) -> Option<&Value> {
        self.operand0.as_ref()
    }

    /// Returns the second operand.
    #[must_use]
    pub fn operand1(&self) -> Option<&Value> {
        self.operand1.as_ref()
    }

    /// Returns a sub-block.
    #[must_use]
    pub fn block(&self, slot: SubBlock) -> Option<&Block> {
        match slot {
            SubBlock::Init => self.init.as_ref(),
            SubBlock::Condition => self.condition.as_ref(),
            SubBlock::Step => self.step.as_ref(),
            SubBlock::Success => self.success.as_ref(),
            SubBlock::Failure => self.failure.as_ref(),
        }
    }

    fn slot_mut(&mut self, slot: SubBlock) -> &mut Option<Block> {
        match slot {
            SubBlock::Init => &mut self.init,
            SubBlock::Condition => &mut self.condition,
            SubBlock::Step => &mut self.step,
            SubBlock::Success => &mut self.success,
            SubBlock::Failure => &mut self.failure,
        }
    }

    /// Bitmask of the present sub-blocks, bit `n` for [`SubBlock::ALL`]`[n]`.
    #[must_use]
    pub fn block_mask(&self) -> u8 {
        SubBlock::ALL
            .iter()
            .filter(|s| self.block(**s).is_some())
            .fold(0, |m, s| m | s.bit())
    }

    /// Returns `true` if `mask` has the bit for `slot`.
    #[must_use]
    pub fn mask_has(mask: u8, slot: SubBlock) -> bool {
        mask & slot.bit() != 0
    }
}

/// An ordered list of operations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Block {
    operations: Vec<Operation>,
}

impl Block {
    /// Creates an empty block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation.
    pub fn push(&mut self, op: Operation) {
        self.operations.push(op);
    }

    /// Returns the operations in execution order.
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Returns the number of top-level operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` if the block has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl From<Vec<Operation>> for Block {
    fn from(operations: Vec<Operation>) -> Self {
        Self { operations }
    }
}

impl FromIterator<Operation> for Block {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        Self {
            operations: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_mask_tracks_present_slots() {
        let op = Operation::new(Opcode::If)
            .with_block(SubBlock::Condition, Block::new())
            .with_block(SubBlock::Failure, Block::new());
        let mask = op.block_mask();
        assert!(Operation::mask_has(mask, SubBlock::Condition));
        assert!(Operation::mask_has(mask, SubBlock::Failure));
        assert!(!Operation::mask_has(mask, SubBlock::Success));
        assert_eq!(mask, 0b1_0010);
    }
}
