use std::marker::PhantomData;

use super::OUTPUT;
use crate::compiler::NodeCompiler;
use crate::error::{Error, Result};
use crate::model::{InputPort, Node, OutputPort, OutputPortSpec, PortData, PortElementsBase, PortValue};

/// Values supplied by the caller of a map.
///
/// An input node created with [`deferred`](InputNode::deferred) gets its size
/// later, from [`Model::set_output_size`](crate::model::Model::set_output_size)
/// or [`Map::load`](crate::model::Map::load).
#[derive(Debug, Clone)]
pub struct InputNode<T: PortValue> {
    size: Option<usize>,
    _marker: PhantomData<T>,
}

impl<T: PortValue> InputNode<T> {
    pub fn new(size: usize) -> Self {
        Self {
            size: Some(size),
            _marker: PhantomData,
        }
    }

    pub fn deferred() -> Self {
        Self {
            size: None,
            _marker: PhantomData,
        }
    }
}

impl<T: PortValue> Node for InputNode<T> {
    fn type_name(&self) -> &'static str {
        "InputNode"
    }

    fn is_input(&self) -> bool {
        true
    }

    fn inputs(&self) -> Vec<InputPort> {
        Vec::new()
    }

    fn outputs(&self, _inputs: &[PortElementsBase]) -> Result<Vec<OutputPortSpec>> {
        let spec = match self.size {
            Some(size) => OutputPortSpec::sized(OUTPUT, T::PORT_TYPE, size),
            None => OutputPortSpec::deferred(OUTPUT, T::PORT_TYPE),
        };
        Ok(vec![spec])
    }

    // Values are written directly into the port by the map.
    fn compute(&self, _inputs: &[PortData], _outputs: &mut [OutputPort]) -> Result<()> {
        Ok(())
    }

    fn compile(&self, compiler: &mut NodeCompiler<'_, '_>) -> Result<()> {
        if compiler.has_output_storage(0)? {
            return Ok(());
        }
        Err(Error::NotImplemented(format!(
            "input node '{}' is not the input of the map being compiled",
            compiler.node().id()
        )))
    }
}
