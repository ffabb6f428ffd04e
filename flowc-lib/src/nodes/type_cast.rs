use std::marker::PhantomData;

use super::{input_data, resolved_size, set_output, OUTPUT};
use crate::compiler::{NodeCompiler, VariableType};
use crate::error::Result;
use crate::model::{
    InputPort, Node, OutputPort, OutputPortSpec, PortData, PortElements, PortElementsBase,
    PortValue,
};

/// Element-wise conversion from `I` to `O`.
///
/// Reals convert to integers by truncation, saturating at the `i32` bounds
/// with NaN mapped to zero. Anything non-zero converts to `true`.
#[derive(Debug, Clone)]
pub struct TypeCastNode<I: PortValue, O: PortValue> {
    input: PortElements<I>,
    _output: PhantomData<O>,
}

impl<I: PortValue, O: PortValue> TypeCastNode<I, O> {
    pub fn new(input: PortElements<I>) -> Self {
        Self {
            input,
            _output: PhantomData,
        }
    }
}

impl<I: PortValue, O: PortValue> Node for TypeCastNode<I, O> {
    fn type_name(&self) -> &'static str {
        "TypeCastNode"
    }

    fn inputs(&self) -> Vec<InputPort> {
        vec![InputPort::new("input", self.input.as_base().clone())]
    }

    fn outputs(&self, inputs: &[PortElementsBase]) -> Result<Vec<OutputPortSpec>> {
        Ok(vec![OutputPortSpec::sized(OUTPUT, O::PORT_TYPE, resolved_size(inputs, 0)?)])
    }

    fn compute(&self, inputs: &[PortData], outputs: &mut [OutputPort]) -> Result<()> {
        let values: Vec<O> = input_data(inputs, 0)?
            .values::<I>()?
            .iter()
            .map(|value| O::from_f64(value.to_f64()))
            .collect();
        set_output(outputs, 0, PortData::from_values(values))
    }

    fn compile(&self, compiler: &mut NodeCompiler<'_, '_>) -> Result<()> {
        let to = VariableType::from(O::PORT_TYPE);
        let len = compiler.output_size(0)?;
        compiler.for_each_element(len, |c, i| {
            let value = c.input_at(0, i)?;
            let value = c.function().cast(value, to)?;
            c.store_output_at(0, i, value)
        })
    }
}
