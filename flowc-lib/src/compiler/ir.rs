//! Backend-neutral representation of the functions being emitted.
//!
//! A [`FunctionEmitter`](super::FunctionEmitter) records typed instructions
//! into a [`FunctionBody`]; a [`ModuleEmitter`](super::ModuleEmitter)
//! implementation lowers finished bodies to machine code.

use std::collections::HashMap;
use std::fmt;

use super::types::{NamedVariable, VariableType};
use super::variables::EmittedVariable;
use crate::error::{Error, Result};

macro_rules! id_type {
    ($name:ident, $prefix:literal) => {
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_type!(ValueId, "v");
id_type!(BlockId, "block");
id_type!(VarId, "var");
id_type!(SlotId, "ss");
id_type!(GlobalId, "data");
id_type!(FunctionId, "fn");

fn next_id(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Literal {
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
}

impl Literal {
    pub fn ty(&self) -> VariableType {
        match self {
            Literal::Boolean(_) => VariableType::Boolean,
            Literal::Int32(_) => VariableType::Int32,
            Literal::Int64(_) => VariableType::Int64,
            Literal::Double(_) => VariableType::Double,
        }
    }

    /// Zero of the given type.
    pub fn zero(ty: VariableType) -> Self {
        match ty {
            VariableType::Boolean => Literal::Boolean(false),
            VariableType::Int32 => Literal::Int32(0),
            VariableType::Int64 | VariableType::Pointer => Literal::Int64(0),
            VariableType::Double => Literal::Double(0.0),
        }
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Boolean(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Int32(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Int64(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Double(value)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Min,
    Max,
    LogicalAnd,
    LogicalOr,
    LogicalXor,
}

impl BinaryOp {
    pub const fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Subtract => "sub",
            BinaryOp::Multiply => "mul",
            BinaryOp::Divide => "div",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
            BinaryOp::LogicalAnd => "and",
            BinaryOp::LogicalOr => "or",
            BinaryOp::LogicalXor => "xor",
        }
    }

    pub const fn is_logical(self) -> bool {
        matches!(
            self,
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr | BinaryOp::LogicalXor
        )
    }

    pub const fn accepts(self, ty: VariableType) -> bool {
        if self.is_logical() {
            matches!(ty, VariableType::Boolean)
        } else {
            ty.is_numeric()
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    Abs,
    Sqrt,
    LogicalNot,
}

impl UnaryOp {
    pub const fn name(self) -> &'static str {
        match self {
            UnaryOp::Negate => "neg",
            UnaryOp::Abs => "abs",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::LogicalNot => "not",
        }
    }

    pub const fn accepts(self, ty: VariableType) -> bool {
        match self {
            UnaryOp::Negate | UnaryOp::Abs => ty.is_numeric(),
            UnaryOp::Sqrt => matches!(ty, VariableType::Double),
            UnaryOp::LogicalNot => matches!(ty, VariableType::Boolean),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl CompareOp {
    pub const fn name(self) -> &'static str {
        match self {
            CompareOp::Equal => "eq",
            CompareOp::NotEqual => "ne",
            CompareOp::Less => "lt",
            CompareOp::LessOrEqual => "le",
            CompareOp::Greater => "gt",
            CompareOp::GreaterOrEqual => "ge",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// Attaches source location `index` to the instructions that follow.
    SourceLocation { index: u32 },
    Const { result: ValueId, value: Literal },
    StackAddr { result: ValueId, slot: SlotId },
    GlobalAddr { result: ValueId, global: GlobalId },
    /// `base + index * scale`.
    Offset {
        result: ValueId,
        base: ValueId,
        index: ValueId,
        scale: u32,
    },
    Load { result: ValueId, ptr: ValueId, offset: i32 },
    Store { ptr: ValueId, offset: i32, value: ValueId },
    Binary {
        result: ValueId,
        op: BinaryOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Unary { result: ValueId, op: UnaryOp, operand: ValueId },
    Compare {
        result: ValueId,
        op: CompareOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Select {
        result: ValueId,
        condition: ValueId,
        if_true: ValueId,
        if_false: ValueId,
    },
    Cast { result: ValueId, value: ValueId },
    UseVar { result: ValueId, var: VarId },
    DefVar { var: VarId, value: ValueId },
    Call {
        result: Option<ValueId>,
        function: FunctionId,
        args: Vec<ValueId>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Terminator {
    Jump(BlockId),
    Branch {
        condition: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    },
    Return(Option<ValueId>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub terminator: Option<Terminator>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StackSlot {
    pub size: u32,
    pub align_shift: u8,
}

/// Body of one function under construction.
#[derive(Clone, Debug)]
pub struct FunctionBody {
    pub id: FunctionId,
    pub name: String,
    pub params: Vec<NamedVariable>,
    pub return_type: Option<VariableType>,
    pub blocks: Vec<BasicBlock>,
    /// Blocks in the order they were first emitted into.
    pub layout: Vec<BlockId>,
    pub current: BlockId,
    pub value_types: Vec<VariableType>,
    pub var_types: Vec<VariableType>,
    pub slots: Vec<StackSlot>,
    pub args: Vec<ValueId>,
    /// Input slot of each parameter, in parameter order.
    pub arg_vars: Vec<EmittedVariable>,
    pub return_var: Option<EmittedVariable>,
    /// Descriptions of source locations, indexed by location minus one.
    pub source_locations: Vec<String>,
    pub(crate) local_slots: HashMap<usize, SlotId>,
    pub(crate) rvalue_vars: HashMap<usize, VarId>,
}

impl FunctionBody {
    pub fn new(
        id: FunctionId,
        name: &str,
        params: &[NamedVariable],
        return_type: Option<VariableType>,
    ) -> Self {
        let mut body = Self {
            id,
            name: name.to_string(),
            params: params.to_vec(),
            return_type,
            blocks: Vec::new(),
            layout: Vec::new(),
            current: BlockId(0),
            value_types: Vec::new(),
            var_types: Vec::new(),
            slots: Vec::new(),
            args: Vec::new(),
            arg_vars: Vec::new(),
            return_var: None,
            source_locations: Vec::new(),
            local_slots: HashMap::new(),
            rvalue_vars: HashMap::new(),
        };
        let entry = body.create_block("entry");
        body.layout.push(entry);
        let args = params.iter().map(|p| body.new_value(p.ty)).collect();
        body.args = args;
        body
    }

    pub fn new_value(&mut self, ty: VariableType) -> ValueId {
        let id = ValueId(next_id(self.value_types.len()));
        self.value_types.push(ty);
        id
    }

    pub fn new_var(&mut self, ty: VariableType) -> VarId {
        let id = VarId(next_id(self.var_types.len()));
        self.var_types.push(ty);
        id
    }

    pub fn new_slot(&mut self, size: u32) -> SlotId {
        let id = SlotId(next_id(self.slots.len()));
        self.slots.push(StackSlot {
            size: size.max(1),
            align_shift: 3,
        });
        id
    }

    pub fn value_type(&self, value: ValueId) -> Result<VariableType> {
        self.value_types
            .get(value.index())
            .copied()
            .ok_or_else(|| Error::NullReference(format!("{} is not a value of {}", value, self.name)))
    }

    pub fn var_type(&self, var: VarId) -> Result<VariableType> {
        self.var_types
            .get(var.index())
            .copied()
            .ok_or_else(|| Error::NullReference(format!("{} is not a variable of {}", var, self.name)))
    }

    pub fn create_block(&mut self, label: &str) -> BlockId {
        let id = BlockId(next_id(self.blocks.len()));
        self.blocks.push(BasicBlock {
            label: label.to_string(),
            instructions: Vec::new(),
            terminator: None,
        });
        id
    }

    pub fn block(&self, block: BlockId) -> Result<&BasicBlock> {
        self.blocks
            .get(block.index())
            .ok_or_else(|| Error::NullReference(format!("{} is not a block of {}", block, self.name)))
    }

    pub fn switch_to(&mut self, block: BlockId) -> Result<()> {
        if self.block(block)?.terminator.is_some() {
            return Err(Error::Sequencing(format!(
                "block {} ({}) is already terminated",
                block,
                self.blocks[block.index()].label
            )));
        }
        if !self.layout.contains(&block) {
            self.layout.push(block);
        }
        self.current = block;
        Ok(())
    }

    pub fn is_terminated(&self) -> bool {
        self.blocks
            .get(self.current.index())
            .map_or(true, |b| b.terminator.is_some())
    }

    pub fn push(&mut self, instruction: Instruction) -> Result<()> {
        let current = self.current;
        let block = self.open_block(current)?;
        block.instructions.push(instruction);
        Ok(())
    }

    pub fn terminate(&mut self, terminator: Terminator) -> Result<()> {
        let current = self.current;
        let block = self.open_block(current)?;
        block.terminator = Some(terminator);
        Ok(())
    }

    fn open_block(&mut self, block: BlockId) -> Result<&mut BasicBlock> {
        let name = self.name.clone();
        let data = self
            .blocks
            .get_mut(block.index())
            .ok_or_else(|| Error::NullReference(format!("{} is not a block of {}", block, name)))?;
        if data.terminator.is_some() {
            return Err(Error::Sequencing(format!(
                "cannot emit into terminated block {} ({}) of {}",
                block, data.label, name
            )));
        }
        Ok(data)
    }

    /// Blocks without a terminator.
    pub fn unterminated_blocks(&self) -> Vec<BlockId> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.terminator.is_none())
            .map(|(i, _)| BlockId(next_id(i)))
            .collect()
    }

    /// Emission order followed by blocks that were created but never entered.
    pub fn full_layout(&self) -> Vec<BlockId> {
        let mut layout = self.layout.clone();
        for index in 0..self.blocks.len() {
            let id = BlockId(next_id(index));
            if !layout.contains(&id) {
                layout.push(id);
            }
        }
        layout
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<VariableType>,
    pub return_type: Option<VariableType>,
    pub exported: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalData {
    pub name: String,
    pub bytes: Vec<u8>,
    pub writable: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HelperOp {
    Binary(BinaryOp),
    Unary(UnaryOp),
}

impl HelperOp {
    fn name(self) -> &'static str {
        match self {
            HelperOp::Binary(op) => op.name(),
            HelperOp::Unary(op) => op.name(),
        }
    }

    fn arity(self) -> usize {
        match self {
            HelperOp::Binary(_) => 2,
            HelperOp::Unary(_) => 1,
        }
    }
}

/// A per-operator helper function that still needs a body.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HelperRequest {
    pub function: FunctionId,
    pub op: HelperOp,
    pub ty: VariableType,
}

/// Module-level declarations shared by every function.
#[derive(Clone, Debug, Default)]
pub struct ModuleData {
    pub functions: Vec<FunctionDecl>,
    pub globals: Vec<GlobalData>,
    helpers: HashMap<(HelperOp, VariableType), FunctionId>,
    pending_helpers: Vec<HelperRequest>,
}

impl ModuleData {
    pub fn declare_function(&mut self, decl: FunctionDecl) -> Result<FunctionId> {
        if self.function_by_name(&decl.name).is_some() {
            return Err(Error::InvalidArgument(format!(
                "function '{}' is already declared",
                decl.name
            )));
        }
        let id = FunctionId(next_id(self.functions.len()));
        self.functions.push(decl);
        Ok(id)
    }

    pub fn function_by_name(&self, name: &str) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|i| FunctionId(next_id(i)))
    }

    pub fn function(&self, id: FunctionId) -> Result<&FunctionDecl> {
        self.functions
            .get(id.index())
            .ok_or_else(|| Error::NullReference(format!("{} is not declared", id)))
    }

    pub fn add_global(&mut self, name: String, bytes: Vec<u8>, writable: bool) -> GlobalId {
        let id = GlobalId(next_id(self.globals.len()));
        self.globals.push(GlobalData {
            name,
            bytes,
            writable,
        });
        id
    }

    pub fn global(&self, id: GlobalId) -> Result<&GlobalData> {
        self.globals
            .get(id.index())
            .ok_or_else(|| Error::NullReference(format!("{} is not defined", id)))
    }

    /// The helper computing `op` on `ty`, declared on first use.
    pub fn operator_helper(&mut self, op: HelperOp, ty: VariableType) -> Result<FunctionId> {
        if let Some(id) = self.helpers.get(&(op, ty)) {
            return Ok(*id);
        }
        let id = self.declare_function(FunctionDecl {
            name: format!("flowc_op_{}_{}", op.name(), ty.name()),
            params: vec![ty; op.arity()],
            return_type: Some(ty),
            exported: false,
        })?;
        self.helpers.insert((op, ty), id);
        self.pending_helpers.push(HelperRequest {
            function: id,
            op,
            ty,
        });
        Ok(id)
    }

    pub fn take_pending_helpers(&mut self) -> Vec<HelperRequest> {
        std::mem::take(&mut self.pending_helpers)
    }
}

/// Body of a helper: applies its operator to the arguments and returns.
pub fn helper_body(request: &HelperRequest, decl: &FunctionDecl) -> Result<FunctionBody> {
    let params: Vec<NamedVariable> = decl
        .params
        .iter()
        .enumerate()
        .map(|(i, ty)| NamedVariable::new(format!("a{}", i), *ty))
        .collect();
    let mut body = FunctionBody::new(request.function, &decl.name, &params, Some(request.ty));
    let result = body.new_value(request.ty);
    let instruction = match (request.op, body.args.as_slice()) {
        (HelperOp::Binary(op), [lhs, rhs]) => Instruction::Binary {
            result,
            op,
            lhs: *lhs,
            rhs: *rhs,
        },
        (HelperOp::Unary(op), [operand]) => Instruction::Unary {
            result,
            op,
            operand: *operand,
        },
        _ => {
            return Err(Error::InvalidArgument(format!(
                "helper {} has {} parameters",
                decl.name,
                decl.params.len()
            )))
        }
    };
    body.push(instruction)?;
    body.terminate(Terminator::Return(Some(result)))?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitting_into_terminated_block_fails() {
        let mut body = FunctionBody::new(FunctionId(0), "f", &[], None);
        body.terminate(Terminator::Return(None)).unwrap();
        let v = body.new_value(VariableType::Int32);
        let err = body.push(Instruction::Const {
            result: v,
            value: Literal::Int32(1),
        });
        assert!(matches!(err, Err(Error::Sequencing(_))));
        assert!(body.unterminated_blocks().is_empty());
    }

    #[test]
    fn test_layout_appends_unvisited_blocks() {
        let mut body = FunctionBody::new(FunctionId(0), "f", &[], None);
        let a = body.create_block("a");
        let b = body.create_block("b");
        body.switch_to(b).unwrap();
        assert_eq!(body.layout, vec![BlockId(0), b]);
        assert_eq!(body.full_layout(), vec![BlockId(0), b, a]);
    }

    #[test]
    fn test_helpers_are_declared_once() {
        let mut module = ModuleData::default();
        let op = HelperOp::Binary(BinaryOp::Add);
        let first = module.operator_helper(op, VariableType::Double).unwrap();
        let second = module.operator_helper(op, VariableType::Double).unwrap();
        assert_eq!(first, second);
        let pending = module.take_pending_helpers();
        assert_eq!(pending.len(), 1);
        let body = helper_body(&pending[0], module.function(first).unwrap()).unwrap();
        assert_eq!(body.args.len(), 2);
        assert!(body.unterminated_blocks().is_empty());
    }
}
