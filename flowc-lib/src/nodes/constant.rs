use super::{set_output, OUTPUT};
use crate::compiler::NodeCompiler;
use crate::error::Result;
use crate::model::{InputPort, Node, OutputPort, OutputPortSpec, PortData, PortElementsBase, PortValue};

/// A fixed vector of values.
#[derive(Debug, Clone)]
pub struct ConstantNode<T: PortValue> {
    values: Vec<T>,
}

impl<T: PortValue> ConstantNode<T> {
    pub fn new(values: Vec<T>) -> Self {
        Self { values }
    }

    pub fn scalar(value: T) -> Self {
        Self::new(vec![value])
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }
}

impl<T: PortValue> Node for ConstantNode<T> {
    fn type_name(&self) -> &'static str {
        "ConstantNode"
    }

    fn inputs(&self) -> Vec<InputPort> {
        Vec::new()
    }

    fn outputs(&self, _inputs: &[PortElementsBase]) -> Result<Vec<OutputPortSpec>> {
        Ok(vec![OutputPortSpec::sized(OUTPUT, T::PORT_TYPE, self.values.len())])
    }

    fn compute(&self, _inputs: &[PortData], outputs: &mut [OutputPort]) -> Result<()> {
        set_output(outputs, 0, PortData::from_values(self.values.clone()))
    }

    fn compile(&self, compiler: &mut NodeCompiler<'_, '_>) -> Result<()> {
        compiler.set_output_literal(0, &self.values)
    }
}
