use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, trace};

use super::compiled_map::CompiledMap;
use super::cranelift_emitter::CraneliftModuleEmitter;
use super::function_emitter::{FunctionEmitter, StackBuffer};
use super::ir::{BinaryOp, GlobalId, ValueId};
use super::loop_emitter::ForLoopEmitter;
use super::module_emitter::ModuleEmitter;
use super::types::{CompilerParameters, NamedVariable, VariableType};
use crate::error::{Error, Result};
use crate::model::{
    InputPort, Map, Model, NodeData, NodeKey, OutputPort, PortRange, PortRef, PortType, PortValue,
};

/// Where the values of a computed output port live in the emitted function.
#[derive(Copy, Clone, Debug)]
pub enum PortStorage {
    /// A pointer argument of the function.
    Argument(ValueId),
    Stack(StackBuffer),
    Global(GlobalId),
}

/// Element position handed to per-element emission callbacks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ElementIndex {
    Static(usize),
    /// Run-time `i32` index, inside an emitted loop.
    Dynamic(ValueId),
}

/// Emission context for one node.
///
/// Gives a node access to the function being emitted, to the storage of the
/// ports it reads and to its own outputs, which are allocated on first store.
pub struct NodeCompiler<'c, 'f> {
    function: &'c mut FunctionEmitter<'f>,
    model: &'c Model,
    node: &'c NodeData,
    storage: &'c mut HashMap<PortRef, PortStorage>,
    gathered: Vec<Option<StackBuffer>>,
}

impl<'c, 'f> NodeCompiler<'c, 'f> {
    pub(crate) fn new(
        function: &'c mut FunctionEmitter<'f>,
        model: &'c Model,
        node: &'c NodeData,
        storage: &'c mut HashMap<PortRef, PortStorage>,
    ) -> Self {
        let gathered = vec![None; node.inputs().len()];
        Self {
            function,
            model,
            node,
            storage,
            gathered,
        }
    }

    pub fn node(&self) -> &NodeData {
        self.node
    }

    pub fn model(&self) -> &Model {
        self.model
    }

    pub fn parameters(&self) -> &CompilerParameters {
        self.function.parameters()
    }

    pub fn function(&mut self) -> &mut FunctionEmitter<'f> {
        self.function
    }

    pub fn num_inputs(&self) -> usize {
        self.node.inputs().len()
    }

    pub fn input_size(&self, input: usize) -> Result<usize> {
        Ok(self.input_port(input)?.elements.size())
    }

    pub fn input_type(&self, input: usize) -> Result<PortType> {
        self.input_port(input)?
            .elements
            .port_type()
            .ok_or_else(|| Error::InvalidArgument(format!("input {} has no elements", input)))
    }

    /// True when the input reads a single contiguous range.
    pub fn input_is_contiguous(&self, input: usize) -> Result<bool> {
        Ok(self.input_port(input)?.elements.num_ranges() <= 1)
    }

    pub fn output_size(&self, output: usize) -> Result<usize> {
        let port = self.output_port(output)?;
        port.size().ok_or_else(|| {
            Error::InvalidArgument(format!("output '{}' has not been sized", port.name()))
        })
    }

    pub fn output_type(&self, output: usize) -> Result<PortType> {
        Ok(self.output_port(output)?.port_type())
    }

    pub fn has_output_storage(&self, output: usize) -> Result<bool> {
        let port = self.output_port(output)?.port_ref();
        Ok(self.storage.contains_key(&port))
    }

    /// Loads one element of an input.
    pub fn input_at(&mut self, input: usize, index: ElementIndex) -> Result<ValueId> {
        let elements = &self.input_port(input)?.elements;
        let ty = VariableType::from(self.input_type(input)?);
        match index {
            ElementIndex::Static(i) => {
                let element = elements.get_element(i)?;
                let ptr = storage_address(self.function, self.storage, element.port())?;
                self.function.load(ty, ptr, element.index())
            }
            ElementIndex::Dynamic(i) => {
                if let Some(buffer) = self.gathered[input] {
                    let ptr = self.function.buffer_address(&buffer)?;
                    return self.function.load_dynamic(ty, ptr, i);
                }
                let range = match elements.ranges() {
                    [range] => *range,
                    _ => {
                        return Err(Error::InvalidArgument(format!(
                            "input {} of node '{}' is not contiguous",
                            input,
                            self.node.id()
                        )))
                    }
                };
                let ptr = storage_address(self.function, self.storage, range.port())?;
                let index = offset_index(self.function, i, range.start_index())?;
                self.function.load_dynamic(ty, ptr, index)
            }
        }
    }

    /// Stores one element of an output, allocating its storage on first use.
    pub fn store_output_at(
        &mut self,
        output: usize,
        index: ElementIndex,
        value: ValueId,
    ) -> Result<()> {
        let port = self.output_port(output)?.port_ref();
        if !self.storage.contains_key(&port) {
            let ty = VariableType::from(self.output_type(output)?);
            let size = self.output_size(output)?;
            let buffer = self.function.stack_buffer(ty, size)?;
            self.storage.insert(port, PortStorage::Stack(buffer));
        }
        let ptr = storage_address(self.function, self.storage, port)?;
        match index {
            ElementIndex::Static(i) => self.function.store(ptr, i, value),
            ElementIndex::Dynamic(i) => self.function.store_dynamic(ptr, i, value),
        }
    }

    /// Backs an output with read-only module data.
    pub fn set_output_literal<T: PortValue>(&mut self, output: usize, values: &[T]) -> Result<()> {
        let port_type = self.output_type(output)?;
        if port_type != T::PORT_TYPE {
            return Err(Error::type_mismatch(port_type, T::PORT_TYPE));
        }
        let size = self.output_size(output)?;
        if values.len() != size {
            return Err(Error::InvalidArgument(format!(
                "{} literal values for an output of size {}",
                values.len(),
                size
            )));
        }
        let port = self.output_port(output)?.port_ref();
        let global = self.function.literal_global(values);
        self.storage.insert(port, PortStorage::Global(global));
        Ok(())
    }

    /// Calls `body` once per element.
    ///
    /// Emits a loop with a dynamic index unless loops are unrolled or there is
    /// at most one element. Non-contiguous inputs are copied into contiguous
    /// stack buffers before the loop.
    pub fn for_each_element<F>(&mut self, len: usize, mut body: F) -> Result<()>
    where
        F: FnMut(&mut Self, ElementIndex) -> Result<()>,
    {
        if self.parameters().unroll_loops || len <= 1 {
            for i in 0..len {
                body(self, ElementIndex::Static(i))?;
            }
            return Ok(());
        }

        self.gather_inputs()?;
        let count = i32::try_from(len)
            .map_err(|_| Error::InvalidArgument(format!("loop over {} elements", len)))?;
        let mut for_loop = ForLoopEmitter::new();
        for_loop.begin(self.function, count)?;
        let i = for_loop.load_iteration_variable(self.function)?;
        body(self, ElementIndex::Dynamic(i))?;
        for_loop.end(self.function)
    }

    fn gather_inputs(&mut self) -> Result<()> {
        for input in 0..self.num_inputs() {
            if self.gathered[input].is_some() || self.input_is_contiguous(input)? {
                continue;
            }
            let ty = VariableType::from(self.input_type(input)?);
            let size = self.input_size(input)?;
            let buffer = self.function.stack_buffer(ty, size)?;
            for i in 0..size {
                let value = self.input_at(input, ElementIndex::Static(i))?;
                let ptr = self.function.buffer_address(&buffer)?;
                self.function.store(ptr, i, value)?;
            }
            self.gathered[input] = Some(buffer);
        }
        Ok(())
    }

    /// Releases scratch buffers and checks that every output was produced.
    pub(crate) fn finish(self) -> Result<()> {
        for buffer in self.gathered.into_iter().flatten() {
            self.function.release_stack_buffer(buffer)?;
        }
        for port in self.node.outputs() {
            if !self.storage.contains_key(&port.port_ref()) {
                return Err(Error::NotImplemented(format!(
                    "node '{}' did not emit output '{}'",
                    self.node.id(),
                    port.name()
                )));
            }
        }
        Ok(())
    }

    fn input_port(&self, input: usize) -> Result<&'c InputPort> {
        let node: &'c NodeData = self.node;
        node.inputs().get(input).ok_or_else(|| {
            Error::IndexOutOfRange(format!("input {} of node '{}'", input, node.id()))
        })
    }

    fn output_port(&self, output: usize) -> Result<&'c OutputPort> {
        let node: &'c NodeData = self.node;
        node.outputs().get(output).ok_or_else(|| {
            Error::IndexOutOfRange(format!("output {} of node '{}'", output, node.id()))
        })
    }
}

/// Address of the first element of a computed port, emitted at the use site.
fn storage_address(
    function: &mut FunctionEmitter<'_>,
    storage: &HashMap<PortRef, PortStorage>,
    port: PortRef,
) -> Result<ValueId> {
    match storage.get(&port).copied() {
        Some(PortStorage::Argument(ptr)) => Ok(ptr),
        Some(PortStorage::Stack(buffer)) => function.buffer_address(&buffer),
        Some(PortStorage::Global(global)) => function.global_address(global),
        None => Err(Error::NullReference("port is read before it has been computed".into())),
    }
}

fn offset_index(
    function: &mut FunctionEmitter<'_>,
    index: ValueId,
    offset: usize,
) -> Result<ValueId> {
    if offset == 0 {
        return Ok(index);
    }
    let offset = i32::try_from(offset)
        .map_err(|_| Error::IndexOutOfRange(format!("element offset {}", offset)))?;
    let offset = function.literal(offset)?;
    function.binary(BinaryOp::Add, index, offset)
}

/// Lowers a [`Map`] into one native function `fn(input, output)`.
#[derive(Clone, Debug)]
pub struct MapCompiler {
    parameters: CompilerParameters,
    module_name: String,
    function_name: String,
}

impl Default for MapCompiler {
    fn default() -> Self {
        Self::new(CompilerParameters::default())
    }
}

impl MapCompiler {
    pub fn new(parameters: CompilerParameters) -> Self {
        Self {
            parameters,
            module_name: "flowc_module".to_string(),
            function_name: "predict".to_string(),
        }
    }

    pub fn with_function_name(mut self, name: &str) -> Self {
        self.function_name = name.to_string();
        self
    }

    pub fn with_module_name(mut self, name: &str) -> Self {
        self.module_name = name.to_string();
        self
    }

    pub fn parameters(&self) -> &CompilerParameters {
        &self.parameters
    }

    pub fn compile(&self, map: &Map) -> Result<CompiledMap> {
        if map.num_outputs() != 1 {
            return Err(Error::NotImplemented(format!(
                "maps with {} outputs",
                map.num_outputs()
            )));
        }
        let model = map.model();
        let output = map.output(0)?;
        let order = model.dependency_order(std::slice::from_ref(output))?;

        let mut emitter =
            CraneliftModuleEmitter::with_parameters(&self.module_name, self.parameters.clone());
        emitter.begin_function(
            &self.function_name,
            &[
                NamedVariable::new("input", VariableType::Pointer),
                NamedVariable::new("output", VariableType::Pointer),
            ],
            None,
        )?;
        {
            let mut function = emitter.function()?;
            let input = function.argument("input")?;
            let output_ptr = function.argument("output")?;

            let mut storage = HashMap::new();
            storage.insert(PortRef::new(map.input_node(), 0), PortStorage::Argument(input));
            let releases = release_schedule(model, &order, output.ranges())?;

            for (position, key) in order.iter().enumerate() {
                let node = model
                    .node(*key)
                    .ok_or_else(|| Error::NullReference("map depends on a removed node".into()))?;
                function.debug_location(&format!("{} {}", node.type_name(), node.id()))?;
                trace!(node = %node.id(), kind = node.type_name(), "compiling node");

                let mut compiler = NodeCompiler::new(&mut function, model, node, &mut storage);
                node.processor().compile(&mut compiler)?;
                compiler.finish()?;

                for port in &releases[position] {
                    if let Some(PortStorage::Stack(buffer)) = storage.get(port).copied() {
                        storage.remove(port);
                        function.release_stack_buffer(buffer)?;
                    }
                }
            }

            let mut offset = 0;
            for range in output.ranges() {
                copy_range(&mut function, &storage, range, output_ptr, offset)?;
                offset += range.size();
            }
            function.return_void()?;
        }
        emitter.end_function()?;
        let module = emitter.finalize()?;

        let input_type = map.input_type()?;
        let output_type = map.output_type(0)?;
        debug!(
            function = %self.function_name,
            nodes = order.len(),
            input = %input_type,
            output = %output_type,
            "compiled map"
        );
        CompiledMap::new(
            Arc::new(module),
            &self.function_name,
            input_type,
            map.input_size()?,
            output_type,
            map.output_size(0)?,
        )
    }
}

/// For each position in `order`, the ports whose stack storage is dead after
/// that node has been emitted. Ports feeding the map output are kept.
fn release_schedule(
    model: &Model,
    order: &[NodeKey],
    output: &[PortRange],
) -> Result<Vec<Vec<PortRef>>> {
    let kept: HashSet<PortRef> = output.iter().map(PortRange::port).collect();
    let mut last_use: HashMap<PortRef, usize> = HashMap::new();
    for (position, key) in order.iter().enumerate() {
        let node = model
            .node(*key)
            .ok_or_else(|| Error::NullReference("map depends on a removed node".into()))?;
        for port in node.outputs() {
            last_use.insert(port.port_ref(), position);
        }
        for input in node.inputs() {
            for range in input.elements.ranges() {
                last_use.insert(range.port(), position);
            }
        }
    }

    let mut releases = vec![Vec::new(); order.len()];
    for (port, position) in last_use {
        if !kept.contains(&port) {
            releases[position].push(port);
        }
    }
    Ok(releases)
}

fn copy_range(
    function: &mut FunctionEmitter<'_>,
    storage: &HashMap<PortRef, PortStorage>,
    range: &PortRange,
    output: ValueId,
    offset: usize,
) -> Result<()> {
    let ty = VariableType::from(range.port_type());
    let start = range.start_index();
    let len = range.size();
    if function.parameters().unroll_loops || len <= 1 {
        for i in 0..len {
            let source = storage_address(function, storage, range.port())?;
            let value = function.load(ty, source, start + i)?;
            function.store(output, offset + i, value)?;
        }
        return Ok(());
    }

    let count = i32::try_from(len)
        .map_err(|_| Error::InvalidArgument(format!("copy of {} elements", len)))?;
    let mut for_loop = ForLoopEmitter::new();
    for_loop.begin(function, count)?;
    let i = for_loop.load_iteration_variable(function)?;
    let source = storage_address(function, storage, range.port())?;
    let source_index = offset_index(function, i, start)?;
    let value = function.load_dynamic(ty, source, source_index)?;
    let target_index = offset_index(function, i, offset)?;
    function.store_dynamic(output, target_index, value)?;
    for_loop.end(function)
}
