//! Cranelift backend for [`ModuleEmitter`].
//!
//! Each finished function body is lowered to Cranelift IR, compiled and
//! defined in a `JITModule`. The textual IR and the disassembly of every
//! function are captured as they are compiled, so the module can be written
//! out in any [`ModuleOutputFormat`].
use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write;

use cranelift_codegen::entity::EntityRef;
use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::{
    self, types, AbiParam, InstBuilder, MemFlags, SourceLoc, StackSlotData, StackSlotKind,
    UserFuncName,
};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext, Variable};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module};
use tracing::{debug, trace};

use super::function_emitter::FunctionEmitter;
use super::ir::{
    helper_body, BinaryOp, CompareOp, FunctionBody, FunctionDecl, FunctionId, GlobalId,
    Instruction, Literal, ModuleData, Terminator, UnaryOp, ValueId,
};
use super::module_emitter::{FunctionListing, ModuleEmitter, ModuleListing};
use super::types::{CompilerParameters, ModuleOutputFormat, NamedVariable, VariableType};
use super::variables::{VariableAllocators, VariableScope};
use crate::error::{Error, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum EmitterState {
    Uninitialized,
    FunctionOpen,
    FunctionClosed,
}

/// [`ModuleEmitter`] producing native code with Cranelift.
pub struct CraneliftModuleEmitter {
    module_name: String,
    parameters: CompilerParameters,
    state: EmitterState,
    module: Option<JITModule>,
    builder_context: FunctionBuilderContext,
    data: ModuleData,
    current: Option<FunctionBody>,
    allocators: VariableAllocators,
    func_ids: HashMap<FunctionId, FuncId>,
    data_ids: HashMap<GlobalId, DataId>,
    listing: ModuleListing,
}

impl CraneliftModuleEmitter {
    pub fn new(module_name: &str) -> Self {
        Self::with_parameters(module_name, CompilerParameters::default())
    }

    pub fn with_parameters(module_name: &str, parameters: CompilerParameters) -> Self {
        Self {
            module_name: module_name.to_string(),
            parameters,
            state: EmitterState::Uninitialized,
            module: None,
            builder_context: FunctionBuilderContext::new(),
            data: ModuleData::default(),
            current: None,
            allocators: VariableAllocators::new(),
            func_ids: HashMap::new(),
            data_ids: HashMap::new(),
            listing: ModuleListing::new(module_name),
        }
    }

    pub fn listing(&self) -> &ModuleListing {
        &self.listing
    }

    /// Resolves every defined function and returns the executable module.
    pub fn finalize(mut self) -> Result<ExecutableModule> {
        if self.state == EmitterState::FunctionOpen {
            return Err(Error::Sequencing(
                "cannot finalize a module while a function is open".into(),
            ));
        }
        let mut module = match self.module.take() {
            Some(module) => module,
            None => create_module(&self.parameters)?,
        };
        module
            .finalize_definitions()
            .map_err(|e| Error::Backend(format!("failed to finalize: {}", e)))?;

        let mut functions = HashMap::new();
        for (id, func_id) in &self.func_ids {
            let decl = self.data.function(*id)?;
            if decl.exported {
                functions.insert(decl.name.clone(), module.get_finalized_function(*func_id));
            }
        }

        debug!(
            module = %self.module_name,
            functions = functions.len(),
            "finalized module"
        );
        Ok(ExecutableModule {
            module: Some(module),
            functions,
            listing: self.listing,
        })
    }

    fn declare_function(
        module: &mut JITModule,
        func_ids: &mut HashMap<FunctionId, FuncId>,
        data: &ModuleData,
        id: FunctionId,
    ) -> Result<FuncId> {
        if let Some(func_id) = func_ids.get(&id) {
            return Ok(*func_id);
        }
        let decl = data.function(id)?;
        let signature = make_signature(module, decl);
        let linkage = if decl.exported {
            Linkage::Export
        } else {
            Linkage::Local
        };
        let func_id = module
            .declare_function(&decl.name, linkage, &signature)
            .map_err(|e| Error::Backend(format!("failed to declare {}: {}", decl.name, e)))?;
        func_ids.insert(id, func_id);
        Ok(func_id)
    }

    fn define_globals(&mut self) -> Result<()> {
        let module = self
            .module
            .as_mut()
            .ok_or_else(|| Error::Sequencing("no module has been started".into()))?;
        for (index, global) in self.data.globals.iter().enumerate() {
            let id = GlobalId(u32::try_from(index).unwrap_or(u32::MAX));
            if self.data_ids.contains_key(&id) {
                continue;
            }
            let data_id = module
                .declare_data(&global.name, Linkage::Local, global.writable, false)
                .map_err(|e| Error::Backend(format!("failed to declare {}: {}", global.name, e)))?;
            let mut description = DataDescription::new();
            if global.bytes.is_empty() {
                description.define_zeroinit(1);
            } else {
                description.define(global.bytes.clone().into_boxed_slice());
            }
            description.set_align(8);
            module
                .define_data(data_id, &description)
                .map_err(|e| Error::Backend(format!("failed to define {}: {}", global.name, e)))?;
            self.data_ids.insert(id, data_id);
        }
        Ok(())
    }

    /// Lowers one function body and defines it in the module.
    fn lower_function(&mut self, body: &FunctionBody) -> Result<FunctionListing> {
        self.define_globals()?;
        let module = self
            .module
            .as_mut()
            .ok_or_else(|| Error::Sequencing("no module has been started".into()))?;

        let func_id = Self::declare_function(module, &mut self.func_ids, &self.data, body.id)?;
        for block in &body.blocks {
            for instruction in &block.instructions {
                if let Instruction::Call { function, .. } = instruction {
                    Self::declare_function(module, &mut self.func_ids, &self.data, *function)?;
                }
            }
        }

        let decl = self.data.function(body.id)?;
        let mut ctx = module.make_context();
        ctx.func.signature = make_signature(module, decl);
        ctx.func.name = UserFuncName::user(0, func_id.as_u32());
        ctx.set_disasm(true);

        {
            let builder = FunctionBuilder::new(&mut ctx.func, &mut self.builder_context);
            let lowering = Lowering::new(
                builder,
                module,
                &self.func_ids,
                &self.data_ids,
                body,
            );
            lowering.lower()?;
        }

        let mut ir_text = ctx.func.display().to_string();
        for (i, description) in body.source_locations.iter().enumerate() {
            let _ = writeln!(ir_text, "; @{:04x} {}", i + 1, description);
        }
        trace!(function = %body.name, "lowered function");

        module
            .define_function(func_id, &mut ctx)
            .map_err(|e| Error::Backend(format!("failed to define {}: {:?}", body.name, e)))?;
        let assembly = ctx
            .compiled_code()
            .and_then(|code| code.vcode.clone())
            .unwrap_or_default();
        module.clear_context(&mut ctx);

        Ok(FunctionListing {
            name: body.name.clone(),
            ir: ir_text,
            assembly,
        })
    }
}

impl ModuleEmitter for CraneliftModuleEmitter {
    fn module_name(&self) -> &str {
        &self.module_name
    }

    fn compiler_parameters(&self) -> &CompilerParameters {
        &self.parameters
    }

    fn set_compiler_parameters(&mut self, parameters: CompilerParameters) -> Result<()> {
        if self.state != EmitterState::Uninitialized {
            return Err(Error::Sequencing(
                "compiler parameters are fixed once emission has started".into(),
            ));
        }
        self.parameters = parameters;
        Ok(())
    }

    fn begin_function(
        &mut self,
        name: &str,
        args: &[NamedVariable],
        return_type: Option<VariableType>,
    ) -> Result<()> {
        if self.state == EmitterState::FunctionOpen {
            return Err(Error::Sequencing(format!(
                "cannot begin {} while another function is open",
                name
            )));
        }
        if self.module.is_none() {
            self.module = Some(create_module(&self.parameters)?);
        }
        let id = self.data.declare_function(FunctionDecl {
            name: name.to_string(),
            params: args.iter().map(|a| a.ty).collect(),
            return_type,
            exported: true,
        })?;
        self.allocators.reset_function_scope();
        let mut body = FunctionBody::new(id, name, args, return_type);
        body.arg_vars = args
            .iter()
            .map(|_| self.allocators.allocate(VariableScope::Input))
            .collect();
        body.return_var = return_type.map(|_| self.allocators.allocate(VariableScope::Output));
        self.current = Some(body);
        self.state = EmitterState::FunctionOpen;
        debug!(module = %self.module_name, function = name, "begin function");
        Ok(())
    }

    fn end_function(&mut self) -> Result<()> {
        let body = match (self.state, self.current.as_mut()) {
            (EmitterState::FunctionOpen, Some(body)) => body,
            _ => return Err(Error::Sequencing("end_function without begin_function".into())),
        };

        let open = body.unterminated_blocks();
        if body.return_type.is_none() && open == [body.current] {
            body.terminate(Terminator::Return(None))?;
        } else if !open.is_empty() {
            let labels: Vec<String> = open
                .iter()
                .filter_map(|b| body.block(*b).ok())
                .map(|b| b.label.clone())
                .collect();
            return Err(Error::Sequencing(format!(
                "function {} has unterminated blocks: {}",
                body.name,
                labels.join(", ")
            )));
        }

        let body = self
            .current
            .take()
            .ok_or_else(|| Error::Sequencing("end_function without begin_function".into()))?;
        self.state = EmitterState::FunctionClosed;

        let listing = self.lower_function(&body)?;
        self.listing.functions.push(listing);

        for request in self.data.take_pending_helpers() {
            let helper = helper_body(&request, self.data.function(request.function)?)?;
            let listing = self.lower_function(&helper)?;
            self.listing.functions.push(listing);
        }

        debug!(
            module = %self.module_name,
            function = %body.name,
            blocks = body.blocks.len(),
            "end function"
        );
        Ok(())
    }

    fn function(&mut self) -> Result<FunctionEmitter<'_>> {
        match (self.state, self.current.as_mut()) {
            (EmitterState::FunctionOpen, Some(body)) => Ok(FunctionEmitter::new(
                body,
                &mut self.data,
                &mut self.allocators,
                &self.parameters,
            )),
            _ => Err(Error::Sequencing("no function is open".into())),
        }
    }

    fn variables(&self) -> &VariableAllocators {
        &self.allocators
    }

    fn write_to_stream(&self, out: &mut dyn Write, format: ModuleOutputFormat) -> Result<()> {
        self.listing.write(out, format)
    }
}

/// Finalized native code and the listing it was built from.
pub struct ExecutableModule {
    module: Option<JITModule>,
    functions: HashMap<String, *const u8>,
    listing: ModuleListing,
}

// SAFETY: the JIT module is finalized before an `ExecutableModule` exists and
// is only touched again by `Drop`. Shared access reads the immutable function
// table and listing, and the code they point to is read-only.
unsafe impl Send for ExecutableModule {}
unsafe impl Sync for ExecutableModule {}

impl ExecutableModule {
    /// Entry address of an exported function.
    pub fn function_address(&self, name: &str) -> Result<*const u8> {
        self.functions
            .get(name)
            .copied()
            .ok_or_else(|| Error::NullReference(format!("module has no function '{}'", name)))
    }

    pub fn listing(&self) -> &ModuleListing {
        &self.listing
    }

    pub fn write_to_stream(&self, out: &mut dyn Write, format: ModuleOutputFormat) -> Result<()> {
        self.listing.write(out, format)
    }
}

impl Drop for ExecutableModule {
    fn drop(&mut self) {
        if let Some(module) = self.module.take() {
            // SAFETY: function addresses are only reachable through this
            // module, which is being dropped.
            unsafe { module.free_memory() };
        }
    }
}

impl std::fmt::Debug for ExecutableModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutableModule")
            .field("module", &self.listing.module_name)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn create_module(parameters: &CompilerParameters) -> Result<JITModule> {
    let setting = |e: settings::SetError| Error::Backend(format!("invalid setting: {}", e));
    let mut flag_builder = settings::builder();
    flag_builder.set("use_colocated_libcalls", "false").map_err(setting)?;
    flag_builder.set("is_pic", "false").map_err(setting)?;
    let opt_level = if parameters.optimize { "speed" } else { "none" };
    flag_builder.set("opt_level", opt_level).map_err(setting)?;

    let isa_builder = cranelift_native::builder()
        .map_err(|e| Error::Backend(format!("failed to create ISA builder: {}", e)))?;
    let isa = isa_builder
        .finish(settings::Flags::new(flag_builder))
        .map_err(|e| Error::Backend(format!("failed to create ISA: {}", e)))?;

    let builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
    Ok(JITModule::new(builder))
}

fn clif_type(ty: VariableType, pointer: ir::Type) -> ir::Type {
    match ty {
        VariableType::Boolean => types::I8,
        VariableType::Int32 => types::I32,
        VariableType::Int64 => types::I64,
        VariableType::Double => types::F64,
        VariableType::Pointer => pointer,
    }
}

fn make_signature(module: &JITModule, decl: &FunctionDecl) -> ir::Signature {
    let pointer = module.target_config().pointer_type();
    let mut signature = module.make_signature();
    for param in &decl.params {
        signature.params.push(AbiParam::new(clif_type(*param, pointer)));
    }
    if let Some(ty) = decl.return_type {
        signature.returns.push(AbiParam::new(clif_type(ty, pointer)));
    }
    signature
}

/// Translation of one [`FunctionBody`] into a Cranelift function.
struct Lowering<'b> {
    builder: FunctionBuilder<'b>,
    module: &'b mut JITModule,
    func_ids: &'b HashMap<FunctionId, FuncId>,
    data_ids: &'b HashMap<GlobalId, DataId>,
    body: &'b FunctionBody,
    pointer: ir::Type,
    blocks: Vec<ir::Block>,
    vars: Vec<Variable>,
    slots: Vec<ir::StackSlot>,
    values: Vec<Option<ir::Value>>,
}

impl<'b> Lowering<'b> {
    fn new(
        mut builder: FunctionBuilder<'b>,
        module: &'b mut JITModule,
        func_ids: &'b HashMap<FunctionId, FuncId>,
        data_ids: &'b HashMap<GlobalId, DataId>,
        body: &'b FunctionBody,
    ) -> Self {
        let pointer = module.target_config().pointer_type();
        let blocks: Vec<ir::Block> = body.blocks.iter().map(|_| builder.create_block()).collect();
        let vars = body
            .var_types
            .iter()
            .enumerate()
            .map(|(i, ty)| {
                let var = Variable::new(i);
                builder.declare_var(var, clif_type(*ty, pointer));
                var
            })
            .collect();
        let slots = body
            .slots
            .iter()
            .map(|slot| {
                builder.create_sized_stack_slot(StackSlotData::new(
                    StackSlotKind::ExplicitSlot,
                    slot.size,
                    slot.align_shift,
                ))
            })
            .collect();
        Self {
            builder,
            module,
            func_ids,
            data_ids,
            body,
            pointer,
            blocks,
            vars,
            slots,
            values: vec![None; body.value_types.len()],
        }
    }

    fn lower(mut self) -> Result<()> {
        let entry = self.blocks[0];
        self.builder.append_block_params_for_function_params(entry);
        let params = self.builder.block_params(entry).to_vec();
        for (arg, param) in self.body.args.iter().zip(params) {
            self.values[arg.index()] = Some(param);
        }

        let body = self.body;
        for block_id in body.full_layout() {
            let block = body.block(block_id)?;
            self.builder.switch_to_block(self.blocks[block_id.index()]);
            for instruction in &block.instructions {
                self.lower_instruction(instruction)?;
            }
            match &block.terminator {
                Some(terminator) => self.lower_terminator(terminator)?,
                None => {
                    return Err(Error::Sequencing(format!(
                        "block {} of {} has no terminator",
                        block.label, body.name
                    )))
                }
            }
        }

        self.builder.seal_all_blocks();
        self.builder.finalize();
        Ok(())
    }

    fn value(&self, id: ValueId) -> Result<ir::Value> {
        self.values
            .get(id.index())
            .copied()
            .flatten()
            .ok_or_else(|| Error::Backend(format!("{} is used before it is defined", id)))
    }

    fn define(&mut self, id: ValueId, value: ir::Value) {
        if let Some(slot) = self.values.get_mut(id.index()) {
            *slot = Some(value);
        }
    }

    fn ty(&self, id: ValueId) -> Result<VariableType> {
        self.body.value_type(id)
    }

    fn lower_instruction(&mut self, instruction: &Instruction) -> Result<()> {
        match instruction {
            Instruction::SourceLocation { index } => {
                self.builder.set_srcloc(SourceLoc::new(*index));
            }
            Instruction::Const { result, value } => {
                let v = match *value {
                    Literal::Boolean(b) => self.builder.ins().iconst(types::I8, i64::from(b)),
                    Literal::Int32(i) => self.builder.ins().iconst(types::I32, i64::from(i)),
                    Literal::Int64(i) => self.builder.ins().iconst(types::I64, i),
                    Literal::Double(d) => self.builder.ins().f64const(d),
                };
                self.define(*result, v);
            }
            Instruction::StackAddr { result, slot } => {
                let slot = self.slots[slot.index()];
                let v = self.builder.ins().stack_addr(self.pointer, slot, 0);
                self.define(*result, v);
            }
            Instruction::GlobalAddr { result, global } => {
                let data_id = self
                    .data_ids
                    .get(global)
                    .ok_or_else(|| Error::Backend(format!("{} was not defined", global)))?;
                let gv = self.module.declare_data_in_func(*data_id, self.builder.func);
                let v = self.builder.ins().symbol_value(self.pointer, gv);
                self.define(*result, v);
            }
            Instruction::Offset {
                result,
                base,
                index,
                scale,
            } => {
                let base = self.value(*base)?;
                let mut index_value = self.value(*index)?;
                let index_type = clif_type(self.ty(*index)?, self.pointer);
                if index_type.bits() < self.pointer.bits() {
                    index_value = self.builder.ins().sextend(self.pointer, index_value);
                }
                let scaled = self.builder.ins().imul_imm(index_value, i64::from(*scale));
                let v = self.builder.ins().iadd(base, scaled);
                self.define(*result, v);
            }
            Instruction::Load {
                result,
                ptr,
                offset,
            } => {
                let ty = clif_type(self.ty(*result)?, self.pointer);
                let ptr = self.value(*ptr)?;
                let v = self.builder.ins().load(ty, MemFlags::trusted(), ptr, *offset);
                self.define(*result, v);
            }
            Instruction::Store { ptr, offset, value } => {
                let ptr = self.value(*ptr)?;
                let value = self.value(*value)?;
                self.builder.ins().store(MemFlags::trusted(), value, ptr, *offset);
            }
            Instruction::Binary {
                result,
                op,
                lhs,
                rhs,
            } => {
                let ty = self.ty(*lhs)?;
                let (a, b) = (self.value(*lhs)?, self.value(*rhs)?);
                let v = self.lower_binary(*op, ty, a, b)?;
                self.define(*result, v);
            }
            Instruction::Unary {
                result,
                op,
                operand,
            } => {
                let ty = self.ty(*operand)?;
                let a = self.value(*operand)?;
                let ins = self.builder.ins();
                let v = match (op, ty) {
                    (UnaryOp::Negate, VariableType::Double) => ins.fneg(a),
                    (UnaryOp::Abs, VariableType::Double) => ins.fabs(a),
                    (UnaryOp::Sqrt, VariableType::Double) => ins.sqrt(a),
                    (UnaryOp::Negate, t) if t.is_integer() => ins.ineg(a),
                    (UnaryOp::Abs, t) if t.is_integer() => ins.iabs(a),
                    (UnaryOp::LogicalNot, VariableType::Boolean) => ins.bxor_imm(a, 1),
                    (op, ty) => {
                        return Err(Error::type_mismatch(format!("operand of {}", op.name()), ty))
                    }
                };
                self.define(*result, v);
            }
            Instruction::Compare {
                result,
                op,
                lhs,
                rhs,
            } => {
                let ty = self.ty(*lhs)?;
                let (a, b) = (self.value(*lhs)?, self.value(*rhs)?);
                let v = match ty {
                    VariableType::Double => self.builder.ins().fcmp(float_cc(*op), a, b),
                    VariableType::Boolean => self.builder.ins().icmp(int_cc(*op, false), a, b),
                    _ => self.builder.ins().icmp(int_cc(*op, true), a, b),
                };
                self.define(*result, v);
            }
            Instruction::Select {
                result,
                condition,
                if_true,
                if_false,
            } => {
                let c = self.value(*condition)?;
                let t = self.value(*if_true)?;
                let f = self.value(*if_false)?;
                let v = self.builder.ins().select(c, t, f);
                self.define(*result, v);
            }
            Instruction::Cast { result, value } => {
                let from = self.ty(*value)?;
                let to = self.ty(*result)?;
                let v = self.value(*value)?;
                let v = self.lower_cast(v, from, to)?;
                self.define(*result, v);
            }
            Instruction::UseVar { result, var } => {
                let v = self.builder.use_var(self.vars[var.index()]);
                self.define(*result, v);
            }
            Instruction::DefVar { var, value } => {
                let value = self.value(*value)?;
                self.builder.def_var(self.vars[var.index()], value);
            }
            Instruction::Call {
                result,
                function,
                args,
            } => {
                let func_id = self
                    .func_ids
                    .get(function)
                    .ok_or_else(|| Error::Backend(format!("{} was not declared", function)))?;
                let func_ref = self.module.declare_func_in_func(*func_id, self.builder.func);
                let args = args
                    .iter()
                    .map(|a| self.value(*a))
                    .collect::<Result<Vec<_>>>()?;
                let call = self.builder.ins().call(func_ref, &args);
                if let Some(result) = result {
                    let v = self
                        .builder
                        .inst_results(call)
                        .first()
                        .copied()
                        .ok_or_else(|| Error::Backend(format!("{} returns nothing", function)))?;
                    self.define(*result, v);
                }
            }
        }
        Ok(())
    }

    fn lower_binary(
        &mut self,
        op: BinaryOp,
        ty: VariableType,
        a: ir::Value,
        b: ir::Value,
    ) -> Result<ir::Value> {
        if op == BinaryOp::Divide && ty.is_integer() {
            return Ok(self.lower_integer_divide(a, b));
        }
        let ins = self.builder.ins();
        let v = match (op, ty) {
            (BinaryOp::Add, VariableType::Double) => ins.fadd(a, b),
            (BinaryOp::Subtract, VariableType::Double) => ins.fsub(a, b),
            (BinaryOp::Multiply, VariableType::Double) => ins.fmul(a, b),
            (BinaryOp::Divide, VariableType::Double) => ins.fdiv(a, b),
            (BinaryOp::Min, VariableType::Double) => ins.fmin(a, b),
            (BinaryOp::Max, VariableType::Double) => ins.fmax(a, b),
            (BinaryOp::Add, t) if t.is_integer() => ins.iadd(a, b),
            (BinaryOp::Subtract, t) if t.is_integer() => ins.isub(a, b),
            (BinaryOp::Multiply, t) if t.is_integer() => ins.imul(a, b),
            (BinaryOp::Min, t) if t.is_integer() => ins.smin(a, b),
            (BinaryOp::Max, t) if t.is_integer() => ins.smax(a, b),
            (BinaryOp::LogicalAnd, VariableType::Boolean) => ins.band(a, b),
            (BinaryOp::LogicalOr, VariableType::Boolean) => ins.bor(a, b),
            (BinaryOp::LogicalXor, VariableType::Boolean) => ins.bxor(a, b),
            (op, ty) => return Err(Error::type_mismatch(format!("operand of {}", op.name()), ty)),
        };
        Ok(v)
    }

    /// Division by zero yields zero and `MIN / -1` wraps, matching the
    /// reference computation instead of trapping.
    fn lower_integer_divide(&mut self, a: ir::Value, b: ir::Value) -> ir::Value {
        let ty = self.builder.func.dfg.value_type(a);
        let fb = &mut self.builder;
        let zero = fb.ins().iconst(ty, 0);
        let one = fb.ins().iconst(ty, 1);
        let is_zero = fb.ins().icmp_imm(IntCC::Equal, b, 0);
        let is_minus_one = fb.ins().icmp_imm(IntCC::Equal, b, -1);
        let special = fb.ins().bor(is_zero, is_minus_one);
        let divisor = fb.ins().select(special, one, b);
        let quotient = fb.ins().sdiv(a, divisor);
        let negated = fb.ins().ineg(a);
        let quotient = fb.ins().select(is_minus_one, negated, quotient);
        fb.ins().select(is_zero, zero, quotient)
    }

    fn lower_cast(
        &mut self,
        v: ir::Value,
        from: VariableType,
        to: VariableType,
    ) -> Result<ir::Value> {
        use VariableType::*;
        let pointer = self.pointer;
        let ins = self.builder.ins();
        let result = match (from, to) {
            _ if from == to => v,
            (Boolean, Int32) => ins.uextend(types::I32, v),
            (Boolean, Int64) => ins.uextend(types::I64, v),
            (Boolean, Double) => {
                let wide = ins.uextend(types::I32, v);
                self.builder.ins().fcvt_from_sint(types::F64, wide)
            }
            (Int32, Boolean) | (Int64, Boolean) => ins.icmp_imm(IntCC::NotEqual, v, 0),
            (Double, Boolean) => {
                let zero = ins.f64const(0.0);
                self.builder.ins().fcmp(FloatCC::NotEqual, v, zero)
            }
            (Int32, Int64) => ins.sextend(types::I64, v),
            (Int64, Int32) => ins.ireduce(types::I32, v),
            (Int32, Double) | (Int64, Double) => ins.fcvt_from_sint(types::F64, v),
            (Double, Int32) => ins.fcvt_to_sint_sat(types::I32, v),
            (Double, Int64) => ins.fcvt_to_sint_sat(types::I64, v),
            (Int64, Pointer) | (Pointer, Int64) if pointer == types::I64 => v,
            (Int64, Pointer) => ins.ireduce(pointer, v),
            (Pointer, Int64) => ins.uextend(types::I64, v),
            (from, to) => return Err(Error::type_mismatch(to, from)),
        };
        Ok(result)
    }

    fn lower_terminator(&mut self, terminator: &Terminator) -> Result<()> {
        match terminator {
            Terminator::Jump(target) => {
                let target = self.blocks[target.index()];
                self.builder.ins().jump(target, &[]);
            }
            Terminator::Branch {
                condition,
                then_block,
                else_block,
            } => {
                let c = self.value(*condition)?;
                let then_block = self.blocks[then_block.index()];
                let else_block = self.blocks[else_block.index()];
                self.builder.ins().brif(c, then_block, &[], else_block, &[]);
            }
            Terminator::Return(value) => {
                let values = match value {
                    Some(v) => vec![self.value(*v)?],
                    None => Vec::new(),
                };
                self.builder.ins().return_(&values);
            }
        }
        Ok(())
    }
}

fn float_cc(op: CompareOp) -> FloatCC {
    match op {
        CompareOp::Equal => FloatCC::Equal,
        CompareOp::NotEqual => FloatCC::NotEqual,
        CompareOp::Less => FloatCC::LessThan,
        CompareOp::LessOrEqual => FloatCC::LessThanOrEqual,
        CompareOp::Greater => FloatCC::GreaterThan,
        CompareOp::GreaterOrEqual => FloatCC::GreaterThanOrEqual,
    }
}

fn int_cc(op: CompareOp, signed: bool) -> IntCC {
    match (op, signed) {
        (CompareOp::Equal, _) => IntCC::Equal,
        (CompareOp::NotEqual, _) => IntCC::NotEqual,
        (CompareOp::Less, true) => IntCC::SignedLessThan,
        (CompareOp::LessOrEqual, true) => IntCC::SignedLessThanOrEqual,
        (CompareOp::Greater, true) => IntCC::SignedGreaterThan,
        (CompareOp::GreaterOrEqual, true) => IntCC::SignedGreaterThanOrEqual,
        (CompareOp::Less, false) => IntCC::UnsignedLessThan,
        (CompareOp::LessOrEqual, false) => IntCC::UnsignedLessThanOrEqual,
        (CompareOp::Greater, false) => IntCC::UnsignedGreaterThan,
        (CompareOp::GreaterOrEqual, false) => IntCC::UnsignedGreaterThanOrEqual,
    }
}
