use tracing::trace;

use super::function_emitter::FunctionEmitter;
use super::ir::{BinaryOp, BlockId, CompareOp, Literal, ValueId, VarId};
use super::types::VariableType;
use super::variables::EmittedVariable;
use crate::error::{Error, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum LoopState {
    Idle,
    Open,
    Closed,
}

#[derive(Copy, Clone, Debug)]
struct LoopBlocks {
    init: BlockId,
    condition: BlockId,
    body: BlockId,
    increment: BlockId,
    after: BlockId,
}

/// Emits a counted `for` loop.
///
/// `begin` ends the current block with a jump into the loop and leaves the
/// emitter positioned in the body; `end` closes the body and continues in the
/// block after the loop. Loops nest by using one emitter per level.
#[derive(Debug)]
pub struct ForLoopEmitter {
    state: LoopState,
    blocks: Option<LoopBlocks>,
    iteration: Option<(EmittedVariable, VarId)>,
    step: Option<LoopStep>,
}

/// Increment of the iteration variable. `i + step` is only taken while
/// `i < limit`; past that the variable jumps to `max`, so it never wraps.
#[derive(Copy, Clone, Debug)]
struct LoopStep {
    step: ValueId,
    limit: ValueId,
    max: ValueId,
}

impl Default for ForLoopEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl ForLoopEmitter {
    pub fn new() -> Self {
        Self {
            state: LoopState::Idle,
            blocks: None,
            iteration: None,
            step: None,
        }
    }

    /// Loop running `repeat_count` times with `i` from 0.
    pub fn begin(&mut self, f: &mut FunctionEmitter<'_>, repeat_count: i32) -> Result<BlockId> {
        self.begin_range(f, 0, repeat_count, 1)
    }

    /// Loop over `i = start; i < max; i += step`.
    pub fn begin_range(
        &mut self,
        f: &mut FunctionEmitter<'_>,
        start: i32,
        max: i32,
        step: i32,
    ) -> Result<BlockId> {
        if step <= 0 {
            return Err(Error::InvalidArgument(format!(
                "loop step must be positive, got {}",
                step
            )));
        }
        self.check_idle()?;
        let blocks = self.create_blocks(f, Literal::Int32(start))?;
        let step = LoopStep {
            step: f.literal(step)?,
            limit: f.literal(max.saturating_sub(step))?,
            max: f.literal(max)?,
        };
        self.emit_condition(f, blocks, step)
    }

    /// Loop running as many times as the run-time value `repeat_count`.
    pub fn begin_dynamic(&mut self, f: &mut FunctionEmitter<'_>, repeat_count: ValueId) -> Result<BlockId> {
        let ty = f.value_type(repeat_count)?;
        if !ty.is_integer() {
            return Err(Error::type_mismatch("integer repeat count", ty));
        }
        self.check_idle()?;
        let blocks = self.create_blocks(f, Literal::zero(ty))?;
        let one = match ty {
            VariableType::Int64 => f.literal(1i64)?,
            _ => f.literal(1i32)?,
        };
        // Wraps only for a minimum count, where the body never runs.
        let limit = f.binary(BinaryOp::Subtract, repeat_count, one)?;
        let step = LoopStep {
            step: one,
            limit,
            max: repeat_count,
        };
        self.emit_condition(f, blocks, step)
    }

    fn check_idle(&self) -> Result<()> {
        match self.state {
            LoopState::Idle => Ok(()),
            LoopState::Open => Err(Error::Sequencing("loop begun twice".into())),
            LoopState::Closed => Err(Error::Sequencing(
                "loop already emitted, clear the emitter to start another".into(),
            )),
        }
    }

    fn create_blocks(&mut self, f: &mut FunctionEmitter<'_>, start: Literal) -> Result<LoopBlocks> {
        let blocks = LoopBlocks {
            init: f.create_block("for.init"),
            condition: f.create_block("for.cond"),
            body: f.create_block("for.body"),
            increment: f.create_block("for.inc"),
            after: f.create_block("for.after"),
        };
        f.jump(blocks.init)?;
        f.switch_to_block(blocks.init)?;
        let start = f.literal(start)?;
        self.iteration = Some(f.rvalue_variable(start)?);
        Ok(blocks)
    }

    fn emit_condition(
        &mut self,
        f: &mut FunctionEmitter<'_>,
        blocks: LoopBlocks,
        step: LoopStep,
    ) -> Result<BlockId> {
        f.jump(blocks.condition)?;
        f.switch_to_block(blocks.condition)?;
        let i = self.load_iteration(f)?;
        let keep_going = f.compare(CompareOp::Less, i, step.max)?;
        f.branch(keep_going, blocks.body, blocks.after)?;
        f.switch_to_block(blocks.body)?;

        trace!(function = f.name(), body = %blocks.body, "begin loop");
        self.blocks = Some(blocks);
        self.step = Some(step);
        self.state = LoopState::Open;
        Ok(blocks.body)
    }

    /// Closes the loop body and continues in the block after the loop.
    pub fn end(&mut self, f: &mut FunctionEmitter<'_>) -> Result<()> {
        let (blocks, step) = match (self.state, self.blocks, self.step) {
            (LoopState::Open, Some(blocks), Some(step)) => (blocks, step),
            _ => return Err(Error::Sequencing("loop end without begin".into())),
        };
        f.jump(blocks.increment)?;
        f.switch_to_block(blocks.increment)?;
        let (variable, var) = self.iteration_slot()?;
        let i = f.get_variable(var)?;
        let stepped = f.binary(BinaryOp::Add, i, step.step)?;
        let in_range = f.compare(CompareOp::Less, i, step.limit)?;
        let next = f.select(in_range, stepped, step.max)?;
        f.set_variable(var, next)?;
        f.jump(blocks.condition)?;
        f.switch_to_block(blocks.after)?;
        f.free_rvalue(variable)?;

        trace!(function = f.name(), after = %blocks.after, "end loop");
        self.state = LoopState::Closed;
        Ok(())
    }

    /// Resets the emitter so it can emit another loop.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn body_block(&self) -> Option<BlockId> {
        self.blocks.map(|b| b.body)
    }

    /// Current value of the iteration variable `i`. Valid inside the body.
    pub fn load_iteration_variable(&self, f: &mut FunctionEmitter<'_>) -> Result<ValueId> {
        if self.state != LoopState::Open {
            return Err(Error::Sequencing("no open loop".into()));
        }
        self.load_iteration(f)
    }

    fn load_iteration(&self, f: &mut FunctionEmitter<'_>) -> Result<ValueId> {
        let (_, var) = self.iteration_slot()?;
        f.get_variable(var)
    }

    fn iteration_slot(&self) -> Result<(EmittedVariable, VarId)> {
        self.iteration
            .ok_or_else(|| Error::Sequencing("loop has no iteration variable".into()))
    }
}
