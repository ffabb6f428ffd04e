use super::ir::{
    BinaryOp, BlockId, CompareOp, FunctionBody, GlobalId, HelperOp, Instruction, Literal,
    ModuleData, SlotId, Terminator, UnaryOp, ValueId, VarId,
};
use super::types::{CompilerParameters, VariableType};
use super::variables::{EmittedVariable, VariableAllocators, VariableScope};
use crate::error::{Error, Result};
use crate::model::PortValue;

/// A stack buffer owned by the function being emitted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StackBuffer {
    pub variable: EmittedVariable,
    pub slot: SlotId,
    pub ty: VariableType,
    pub len: usize,
}

/// Emits instructions into the open function of a module.
///
/// Operand types are checked as each instruction is emitted.
pub struct FunctionEmitter<'a> {
    body: &'a mut FunctionBody,
    module: &'a mut ModuleData,
    variables: &'a mut VariableAllocators,
    parameters: &'a CompilerParameters,
}

impl<'a> FunctionEmitter<'a> {
    pub(crate) fn new(
        body: &'a mut FunctionBody,
        module: &'a mut ModuleData,
        variables: &'a mut VariableAllocators,
        parameters: &'a CompilerParameters,
    ) -> Self {
        Self {
            body,
            module,
            variables,
            parameters,
        }
    }

    pub fn name(&self) -> &str {
        &self.body.name
    }

    pub fn parameters(&self) -> &CompilerParameters {
        self.parameters
    }

    pub fn variables(&mut self) -> &mut VariableAllocators {
        &mut *self.variables
    }

    pub fn argument(&self, name: &str) -> Result<ValueId> {
        self.body
            .params
            .iter()
            .position(|p| p.name == name)
            .map(|i| self.body.args[i])
            .ok_or_else(|| {
                Error::NullReference(format!("function {} has no argument '{}'", self.body.name, name))
            })
    }

    /// The input slot bound to parameter `name`.
    pub fn argument_variable(&self, name: &str) -> Result<EmittedVariable> {
        self.body
            .params
            .iter()
            .position(|p| p.name == name)
            .and_then(|i| self.body.arg_vars.get(i).copied())
            .ok_or_else(|| {
                Error::NullReference(format!("function {} has no argument '{}'", self.body.name, name))
            })
    }

    /// The output slot of the return value, `None` for void functions.
    pub fn return_variable(&self) -> Option<EmittedVariable> {
        self.body.return_var
    }

    pub fn value_type(&self, value: ValueId) -> Result<VariableType> {
        self.body.value_type(value)
    }

    pub fn entry_block(&self) -> BlockId {
        BlockId(0)
    }

    pub fn current_block(&self) -> BlockId {
        self.body.current
    }

    pub fn create_block(&mut self, label: &str) -> BlockId {
        self.body.create_block(label)
    }

    pub fn switch_to_block(&mut self, block: BlockId) -> Result<()> {
        self.body.switch_to(block)
    }

    /// True once the current block has a terminator.
    pub fn is_terminated(&self) -> bool {
        self.body.is_terminated()
    }

    pub fn literal(&mut self, value: impl Into<Literal>) -> Result<ValueId> {
        let value = value.into();
        let result = self.body.new_value(value.ty());
        self.body.push(Instruction::Const { result, value })?;
        Ok(result)
    }

    /// Loads element `index` of the buffer at `ptr`.
    pub fn load(&mut self, ty: VariableType, ptr: ValueId, index: usize) -> Result<ValueId> {
        self.expect_type(ptr, VariableType::Pointer)?;
        let offset = element_offset(ty, index)?;
        let result = self.body.new_value(ty);
        self.body.push(Instruction::Load {
            result,
            ptr,
            offset,
        })?;
        Ok(result)
    }

    /// Loads the element whose index is computed at run time.
    pub fn load_dynamic(&mut self, ty: VariableType, ptr: ValueId, index: ValueId) -> Result<ValueId> {
        let address = self.element_address(ty, ptr, index)?;
        let result = self.body.new_value(ty);
        self.body.push(Instruction::Load {
            result,
            ptr: address,
            offset: 0,
        })?;
        Ok(result)
    }

    pub fn store(&mut self, ptr: ValueId, index: usize, value: ValueId) -> Result<()> {
        self.expect_type(ptr, VariableType::Pointer)?;
        let ty = self.value_type(value)?;
        let offset = element_offset(ty, index)?;
        self.body.push(Instruction::Store { ptr, offset, value })
    }

    pub fn store_dynamic(&mut self, ptr: ValueId, index: ValueId, value: ValueId) -> Result<()> {
        let ty = self.value_type(value)?;
        let address = self.element_address(ty, ptr, index)?;
        self.body.push(Instruction::Store {
            ptr: address,
            offset: 0,
            value,
        })
    }

    fn element_address(&mut self, ty: VariableType, ptr: ValueId, index: ValueId) -> Result<ValueId> {
        self.expect_type(ptr, VariableType::Pointer)?;
        let index_type = self.value_type(index)?;
        if !index_type.is_integer() {
            return Err(Error::type_mismatch("integer index", index_type));
        }
        let result = self.body.new_value(VariableType::Pointer);
        self.body.push(Instruction::Offset {
            result,
            base: ptr,
            index,
            scale: ty.size_bytes(),
        })?;
        Ok(result)
    }

    /// Applies a binary operator, inline or through a helper call depending
    /// on [`CompilerParameters::inline_operators`].
    pub fn operator(&mut self, op: BinaryOp, lhs: ValueId, rhs: ValueId) -> Result<ValueId> {
        if self.parameters.inline_operators {
            return self.binary(op, lhs, rhs);
        }
        let ty = self.binary_operand_type(op, lhs, rhs)?;
        self.call_helper(HelperOp::Binary(op), ty, vec![lhs, rhs])
    }

    /// Applies a binary operator inline regardless of the compiler parameters.
    pub fn binary(&mut self, op: BinaryOp, lhs: ValueId, rhs: ValueId) -> Result<ValueId> {
        let ty = self.binary_operand_type(op, lhs, rhs)?;
        let result = self.body.new_value(ty);
        self.body.push(Instruction::Binary {
            result,
            op,
            lhs,
            rhs,
        })?;
        Ok(result)
    }

    fn binary_operand_type(&self, op: BinaryOp, lhs: ValueId, rhs: ValueId) -> Result<VariableType> {
        let ty = self.value_type(lhs)?;
        self.expect_type(rhs, ty)?;
        if !op.accepts(ty) {
            return Err(Error::type_mismatch(format!("operand of {}", op.name()), ty));
        }
        Ok(ty)
    }

    pub fn unary(&mut self, op: UnaryOp, operand: ValueId) -> Result<ValueId> {
        let ty = self.value_type(operand)?;
        if !op.accepts(ty) {
            return Err(Error::type_mismatch(format!("operand of {}", op.name()), ty));
        }
        if !self.parameters.inline_operators {
            return self.call_helper(HelperOp::Unary(op), ty, vec![operand]);
        }
        let result = self.body.new_value(ty);
        self.body.push(Instruction::Unary {
            result,
            op,
            operand,
        })?;
        Ok(result)
    }

    fn call_helper(&mut self, op: HelperOp, ty: VariableType, args: Vec<ValueId>) -> Result<ValueId> {
        let function = self.module.operator_helper(op, ty)?;
        let result = self.body.new_value(ty);
        self.body.push(Instruction::Call {
            result: Some(result),
            function,
            args,
        })?;
        Ok(result)
    }

    pub fn compare(&mut self, op: CompareOp, lhs: ValueId, rhs: ValueId) -> Result<ValueId> {
        let ty = self.value_type(lhs)?;
        self.expect_type(rhs, ty)?;
        if ty == VariableType::Pointer {
            return Err(Error::type_mismatch("comparable value", ty));
        }
        let result = self.body.new_value(VariableType::Boolean);
        self.body.push(Instruction::Compare {
            result,
            op,
            lhs,
            rhs,
        })?;
        Ok(result)
    }

    pub fn select(&mut self, condition: ValueId, if_true: ValueId, if_false: ValueId) -> Result<ValueId> {
        self.expect_type(condition, VariableType::Boolean)?;
        let ty = self.value_type(if_true)?;
        self.expect_type(if_false, ty)?;
        let result = self.body.new_value(ty);
        self.body.push(Instruction::Select {
            result,
            condition,
            if_true,
            if_false,
        })?;
        Ok(result)
    }

    /// Converts `value` to `to`. Float to integer conversion saturates and
    /// maps NaN to zero.
    pub fn cast(&mut self, value: ValueId, to: VariableType) -> Result<ValueId> {
        let from = self.value_type(value)?;
        if from == to {
            return Ok(value);
        }
        let pointer_like = |ty: VariableType| matches!(ty, VariableType::Pointer | VariableType::Int64);
        if (from == VariableType::Pointer || to == VariableType::Pointer)
            && !(pointer_like(from) && pointer_like(to))
        {
            return Err(Error::type_mismatch(to, from));
        }
        let result = self.body.new_value(to);
        self.body.push(Instruction::Cast { result, value })?;
        Ok(result)
    }

    /// A mutable scalar initialized to `initial`.
    pub fn local_variable(&mut self, initial: ValueId) -> Result<VarId> {
        let ty = self.value_type(initial)?;
        let var = self.body.new_var(ty);
        self.body.push(Instruction::DefVar { var, value: initial })?;
        Ok(var)
    }

    pub fn get_variable(&mut self, var: VarId) -> Result<ValueId> {
        let ty = self.body.var_type(var)?;
        let result = self.body.new_value(ty);
        self.body.push(Instruction::UseVar { result, var })?;
        Ok(result)
    }

    pub fn set_variable(&mut self, var: VarId, value: ValueId) -> Result<()> {
        let ty = self.body.var_type(var)?;
        self.expect_type(value, ty)?;
        self.body.push(Instruction::DefVar { var, value })
    }

    /// A scalar from the r-value pool, reusing the variable of a freed slot.
    pub fn rvalue_variable(&mut self, initial: ValueId) -> Result<(EmittedVariable, VarId)> {
        let ty = self.value_type(initial)?;
        let slot = self.variables.allocate(VariableScope::RValue);
        let existing = self.body.rvalue_vars.get(&slot.index).copied();
        let var = match existing {
            Some(var) if self.body.var_type(var)? == ty => var,
            _ => {
                let var = self.body.new_var(ty);
                self.body.rvalue_vars.insert(slot.index, var);
                var
            }
        };
        self.body.push(Instruction::DefVar { var, value: initial })?;
        Ok((slot, var))
    }

    pub fn free_rvalue(&mut self, variable: EmittedVariable) -> Result<()> {
        if variable.scope != VariableScope::RValue {
            return Err(Error::InvalidArgument(format!("{} is not an r-value", variable)));
        }
        self.variables.free(variable)
    }

    /// Reserves a stack buffer of `len` elements. Slots of released buffers are
    /// reused when large enough.
    pub fn stack_buffer(&mut self, ty: VariableType, len: usize) -> Result<StackBuffer> {
        let bytes = len
            .checked_mul(ty.size_bytes() as usize)
            .and_then(|b| u32::try_from(b).ok())
            .ok_or_else(|| Error::InvalidArgument(format!("stack buffer of {} {} elements", len, ty)))?;
        let variable = self.variables.allocate(VariableScope::Local);
        let existing = self.body.local_slots.get(&variable.index).copied();
        let slot = match existing {
            Some(slot) if self.body.slots[slot.index()].size >= bytes => slot,
            _ => {
                let slot = self.body.new_slot(bytes);
                self.body.local_slots.insert(variable.index, slot);
                slot
            }
        };
        Ok(StackBuffer {
            variable,
            slot,
            ty,
            len,
        })
    }

    pub fn buffer_address(&mut self, buffer: &StackBuffer) -> Result<ValueId> {
        let result = self.body.new_value(VariableType::Pointer);
        self.body.push(Instruction::StackAddr {
            result,
            slot: buffer.slot,
        })?;
        Ok(result)
    }

    pub fn release_stack_buffer(&mut self, buffer: StackBuffer) -> Result<()> {
        self.variables.free(buffer.variable)
    }

    /// Read-only module data holding `values`.
    pub fn literal_global<T: PortValue>(&mut self, values: &[T]) -> GlobalId {
        let mut bytes = Vec::with_capacity(values.len() * T::PORT_TYPE.element_size());
        for value in values {
            value.write_le_bytes(&mut bytes);
        }
        let variable = self.variables.allocate(VariableScope::Literal);
        self.module.add_global(variable.name(), bytes, false)
    }

    /// Address of read-only module data holding `values`.
    pub fn literal_array<T: PortValue>(&mut self, values: &[T]) -> Result<ValueId> {
        let global = self.literal_global(values);
        self.global_address(global)
    }

    /// Zero-initialized writable module data of `len` elements.
    pub fn global_array(&mut self, ty: VariableType, len: usize) -> Result<GlobalId> {
        let bytes = len
            .checked_mul(ty.size_bytes() as usize)
            .ok_or_else(|| Error::InvalidArgument(format!("global of {} {} elements", len, ty)))?;
        let variable = self.variables.allocate(VariableScope::Global);
        Ok(self.module.add_global(variable.name(), vec![0; bytes], true))
    }

    pub fn global_address(&mut self, global: GlobalId) -> Result<ValueId> {
        self.module.global(global)?;
        let result = self.body.new_value(VariableType::Pointer);
        self.body.push(Instruction::GlobalAddr { result, global })?;
        Ok(result)
    }

    /// Calls a function declared in this module by name.
    pub fn call(&mut self, name: &str, args: &[ValueId]) -> Result<Option<ValueId>> {
        let function = self
            .module
            .function_by_name(name)
            .ok_or_else(|| Error::NullReference(format!("function '{}' is not declared", name)))?;
        let decl = self.module.function(function)?.clone();
        if decl.params.len() != args.len() {
            return Err(Error::InvalidArgument(format!(
                "{} takes {} arguments, {} given",
                name,
                decl.params.len(),
                args.len()
            )));
        }
        for (arg, ty) in args.iter().zip(&decl.params) {
            self.expect_type(*arg, *ty)?;
        }
        let result = decl.return_type.map(|ty| self.body.new_value(ty));
        self.body.push(Instruction::Call {
            result,
            function,
            args: args.to_vec(),
        })?;
        Ok(result)
    }

    pub fn jump(&mut self, target: BlockId) -> Result<()> {
        self.body.block(target)?;
        self.body.terminate(Terminator::Jump(target))
    }

    pub fn branch(&mut self, condition: ValueId, then_block: BlockId, else_block: BlockId) -> Result<()> {
        self.expect_type(condition, VariableType::Boolean)?;
        self.body.block(then_block)?;
        self.body.block(else_block)?;
        self.body.terminate(Terminator::Branch {
            condition,
            then_block,
            else_block,
        })
    }

    pub fn return_value(&mut self, value: ValueId) -> Result<()> {
        match self.body.return_type {
            Some(ty) => self.expect_type(value, ty)?,
            None => {
                return Err(Error::type_mismatch("no return value", self.value_type(value)?));
            }
        }
        self.body.terminate(Terminator::Return(Some(value)))
    }

    pub fn return_void(&mut self) -> Result<()> {
        if let Some(ty) = self.body.return_type {
            return Err(Error::type_mismatch(ty, "no return value"));
        }
        self.body.terminate(Terminator::Return(None))
    }

    /// Marks the following instructions as belonging to `description`.
    /// Does nothing unless diagnostic info is enabled.
    pub fn debug_location(&mut self, description: &str) -> Result<()> {
        if !self.parameters.include_diagnostic_info {
            return Ok(());
        }
        self.body.source_locations.push(description.to_string());
        let index = u32::try_from(self.body.source_locations.len()).unwrap_or(u32::MAX);
        self.body.push(Instruction::SourceLocation { index })
    }

    fn expect_type(&self, value: ValueId, expected: VariableType) -> Result<()> {
        let found = self.value_type(value)?;
        if found != expected {
            return Err(Error::type_mismatch(expected, found));
        }
        Ok(())
    }
}

fn element_offset(ty: VariableType, index: usize) -> Result<i32> {
    index
        .checked_mul(ty.size_bytes() as usize)
        .and_then(|offset| i32::try_from(offset).ok())
        .ok_or_else(|| Error::IndexOutOfRange(format!("element {} of a {} buffer", index, ty)))
}
