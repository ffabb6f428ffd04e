use tracing::debug;

use super::model_impl::{Model, NodeData};
use super::parse::parse_port_elements;
use super::port::OutputPort;
use super::port_elements::PortElementsBase;
use super::types::{NodeId, NodeKey, PortRef, PortType, PortValue};
use crate::error::{Error, Result};

/// Names the input node and output elements used to build a [`Map`] from text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapLoadOptions {
    /// Identifier of the input node.
    pub model_inputs: String,
    /// Output elements in the port specification grammar.
    pub model_outputs: String,
    /// Size given to the input node if it was created unsized.
    pub default_input_size: usize,
}

impl Default for MapLoadOptions {
    fn default() -> Self {
        Self {
            model_inputs: String::new(),
            model_outputs: String::new(),
            default_input_size: 1,
        }
    }
}

/// A model with a designated input node and named output elements.
#[derive(Debug)]
pub struct Map {
    model: Model,
    input_name: String,
    input: NodeKey,
    outputs: Vec<(String, PortElementsBase)>,
}

impl Map {
    pub fn new(
        model: Model,
        inputs: Vec<(String, NodeKey)>,
        outputs: Vec<(String, PortElementsBase)>,
    ) -> Result<Self> {
        let mut inputs = inputs.into_iter();
        let (input_name, input) = match (inputs.next(), inputs.next()) {
            (Some(first), None) => first,
            (None, _) => return Err(Error::InvalidArgument("a map needs an input node".into())),
            (Some(_), Some(_)) => {
                return Err(Error::NotImplemented("maps with more than one input".into()))
            }
        };

        let node = model
            .node(input)
            .ok_or_else(|| Error::NullReference("input node is not in the model".into()))?;
        if !node.processor().is_input() {
            return Err(Error::InvalidArgument(format!(
                "node '{}' of type {} is not an input node",
                node.id(),
                node.type_name()
            )));
        }
        let port = input_port(node)?;
        if !port.is_sized() {
            return Err(Error::InvalidArgument(format!(
                "input node '{}' has not been sized",
                node.id()
            )));
        }

        if outputs.is_empty() {
            return Err(Error::InvalidArgument("a map needs at least one output".into()));
        }
        let outputs = outputs
            .into_iter()
            .map(|(name, elements)| Ok((name, model.resolve_elements(&elements)?)))
            .collect::<Result<Vec<_>>>()?;
        for (name, elements) in &outputs {
            if elements.is_empty() {
                return Err(Error::InvalidArgument(format!("output '{}' is empty", name)));
            }
        }

        Ok(Self {
            model,
            input_name,
            input,
            outputs,
        })
    }

    /// Builds a map from textual input and output names.
    pub fn load(mut model: Model, options: &MapLoadOptions) -> Result<Self> {
        let id = NodeId::new(options.model_inputs.as_str())?;
        let input = model
            .node_key(&id)
            .ok_or_else(|| Error::NullReference(format!("couldn't find node {}", id)))?;
        let sized = model
            .node(input)
            .map(|node| node.outputs().iter().all(OutputPort::is_sized))
            .unwrap_or(true);
        if !sized {
            model.set_output_size(PortRef::new(input, 0), options.default_input_size)?;
        }

        let outputs = parse_port_elements(&model, &options.model_outputs)?;
        debug!(
            input = %id,
            outputs = %options.model_outputs,
            size = outputs.size(),
            "loaded map"
        );
        Self::new(
            model,
            vec![("input".to_string(), input)],
            vec![("output".to_string(), outputs)],
        )
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn input_node(&self) -> NodeKey {
        self.input
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn input_port(&self) -> Result<&OutputPort> {
        let node = self
            .model
            .node(self.input)
            .ok_or_else(|| Error::NullReference("input node is not in the model".into()))?;
        input_port(node)
    }

    pub fn input_type(&self) -> Result<PortType> {
        self.input_port().map(OutputPort::port_type)
    }

    pub fn input_size(&self) -> Result<usize> {
        self.input_port().map(|port| port.size().unwrap_or(0))
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn output_name(&self, index: usize) -> Option<&str> {
        self.outputs.get(index).map(|(name, _)| name.as_str())
    }

    pub fn output(&self, index: usize) -> Result<&PortElementsBase> {
        self.outputs
            .get(index)
            .map(|(_, elements)| elements)
            .ok_or_else(|| {
                Error::IndexOutOfRange(format!(
                    "output {} of a map with {} outputs",
                    index,
                    self.outputs.len()
                ))
            })
    }

    pub fn output_type(&self, index: usize) -> Result<PortType> {
        self.output(index)?
            .port_type()
            .ok_or_else(|| Error::InvalidArgument(format!("output {} is empty", index)))
    }

    pub fn output_size(&self, index: usize) -> Result<usize> {
        self.output(index).map(PortElementsBase::size)
    }

    pub fn set_input_value<T: PortValue>(&mut self, values: &[T]) -> Result<()> {
        let size = self.input_size()?;
        if values.len() != size {
            return Err(Error::InvalidArgument(format!(
                "input has {} elements, {} were given",
                size,
                values.len()
            )));
        }
        let port = self.model.port_mut(PortRef::new(self.input, 0))?;
        port.values_mut().values_mut::<T>()?.copy_from_slice(values);
        Ok(())
    }

    /// Interprets the graph and returns the values of output `index`.
    pub fn compute_output<T: PortValue>(&mut self, index: usize) -> Result<Vec<T>> {
        let elements = self.output(index)?.clone();
        let order = self.model.dependency_order(std::slice::from_ref(&elements))?;
        self.model.compute(&order)?;
        let values = self.model.gather_values(&elements)?;
        Ok(values.values::<T>()?.to_vec())
    }

    pub fn compute<I: PortValue, O: PortValue>(&mut self, input: &[I]) -> Result<Vec<O>> {
        self.set_input_value(input)?;
        self.compute_output(0)
    }
}

fn input_port(node: &NodeData) -> Result<&OutputPort> {
    node.outputs()
        .first()
        .ok_or_else(|| Error::NullReference(format!("input node '{}' has no output", node.id())))
}
