use super::{input_data, set_output, OUTPUT};
use crate::compiler::{BinaryOp, ElementIndex, Literal, NodeCompiler, VariableType};
use crate::error::{Error, Result};
use crate::model::{
    InputPort, Node, OutputPort, OutputPortSpec, PortData, PortElements, PortElementsBase,
    PortValue,
};

/// Sum of all input elements, as a single element.
#[derive(Debug, Clone)]
pub struct SumNode<T: PortValue> {
    input: PortElements<T>,
}

impl<T: PortValue> SumNode<T> {
    pub fn new(input: PortElements<T>) -> Result<Self> {
        if !T::PORT_TYPE.is_numeric() {
            return Err(Error::type_mismatch("numeric elements", T::PORT_TYPE));
        }
        Ok(Self { input })
    }
}

impl<T: PortValue> Node for SumNode<T> {
    fn type_name(&self) -> &'static str {
        "SumNode"
    }

    fn inputs(&self) -> Vec<InputPort> {
        vec![InputPort::new("input", self.input.as_base().clone())]
    }

    fn outputs(&self, _inputs: &[PortElementsBase]) -> Result<Vec<OutputPortSpec>> {
        Ok(vec![OutputPortSpec::sized(OUTPUT, T::PORT_TYPE, 1)])
    }

    fn compute(&self, inputs: &[PortData], outputs: &mut [OutputPort]) -> Result<()> {
        // Left to right from zero, like the emitted code.
        let data = match input_data(inputs, 0)? {
            PortData::Real(values) => {
                PortData::Real(vec![values.iter().fold(0.0, |acc, x| acc + x)])
            }
            PortData::Integer(values) => {
                PortData::Integer(vec![values.iter().fold(0i32, |acc, x| acc.wrapping_add(*x))])
            }
            PortData::Boolean(_) => {
                return Err(Error::type_mismatch("numeric elements", T::PORT_TYPE))
            }
        };
        set_output(outputs, 0, data)
    }

    fn compile(&self, compiler: &mut NodeCompiler<'_, '_>) -> Result<()> {
        let ty = VariableType::from(T::PORT_TYPE);
        let len = compiler.input_size(0)?;
        let zero = compiler.function().literal(Literal::zero(ty))?;
        let total = compiler.function().local_variable(zero)?;
        compiler.for_each_element(len, |c, i| {
            let value = c.input_at(0, i)?;
            let f = c.function();
            let acc = f.get_variable(total)?;
            let next = f.operator(BinaryOp::Add, acc, value)?;
            f.set_variable(total, next)
        })?;
        let result = compiler.function().get_variable(total)?;
        compiler.store_output_at(0, ElementIndex::Static(0), result)
    }
}
