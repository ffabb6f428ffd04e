use std::fmt::Debug;

use super::port::{InputPort, OutputPort, OutputPortSpec};
use super::port_elements::PortElementsBase;
use super::types::PortData;
use crate::compiler::NodeCompiler;
use crate::error::{Error, Result};

/// A computation in a [`Model`](super::Model).
///
/// A node declares the elements it reads and the outputs it produces, can be
/// interpreted with [`compute`](Node::compute) and lowered to native code with
/// [`compile`](Node::compile).
pub trait Node: Debug {
    fn type_name(&self) -> &'static str;

    /// True for nodes whose single output is supplied by the caller of a map.
    fn is_input(&self) -> bool {
        false
    }

    /// Elements this node reads, in input order.
    fn inputs(&self) -> Vec<InputPort>;

    /// Declares the output ports given the resolved input elements (same order
    /// as [`inputs`](Node::inputs)).
    fn outputs(&self, inputs: &[PortElementsBase]) -> Result<Vec<OutputPortSpec>>;

    /// Reference computation. `inputs` holds the gathered values of each input.
    fn compute(&self, inputs: &[PortData], outputs: &mut [OutputPort]) -> Result<()>;

    /// Emits native code computing this node's outputs.
    fn compile(&self, compiler: &mut NodeCompiler<'_, '_>) -> Result<()> {
        let _ = compiler;
        Err(Error::NotImplemented(format!(
            "node type '{}' cannot be compiled",
            self.type_name()
        )))
    }
}
