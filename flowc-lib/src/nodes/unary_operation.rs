use super::{input_data, resolved_size, set_output, OUTPUT};
use crate::compiler::{NodeCompiler, UnaryOp, VariableType};
use crate::error::{Error, Result};
use crate::model::{
    InputPort, Node, OutputPort, OutputPortSpec, PortData, PortElements, PortElementsBase,
    PortValue,
};

/// Element-wise `op input`.
#[derive(Debug, Clone)]
pub struct UnaryOperationNode<T: PortValue> {
    input: PortElements<T>,
    operation: UnaryOp,
}

impl<T: PortValue> UnaryOperationNode<T> {
    pub fn new(input: PortElements<T>, operation: UnaryOp) -> Result<Self> {
        if !operation.accepts(VariableType::from(T::PORT_TYPE)) {
            return Err(Error::type_mismatch(
                format!("operand of {}", operation.name()),
                T::PORT_TYPE,
            ));
        }
        Ok(Self { input, operation })
    }

    pub fn operation(&self) -> UnaryOp {
        self.operation
    }
}

impl<T: PortValue> Node for UnaryOperationNode<T> {
    fn type_name(&self) -> &'static str {
        "UnaryOperationNode"
    }

    fn inputs(&self) -> Vec<InputPort> {
        vec![InputPort::new("input", self.input.as_base().clone())]
    }

    fn outputs(&self, inputs: &[PortElementsBase]) -> Result<Vec<OutputPortSpec>> {
        Ok(vec![OutputPortSpec::sized(OUTPUT, T::PORT_TYPE, resolved_size(inputs, 0)?)])
    }

    fn compute(&self, inputs: &[PortData], outputs: &mut [OutputPort]) -> Result<()> {
        let input = input_data(inputs, 0)?;
        let operation = self.operation;
        let data = match input {
            PortData::Real(values) => {
                let op: fn(f64) -> f64 = match operation {
                    UnaryOp::Negate => |x| -x,
                    UnaryOp::Abs => f64::abs,
                    UnaryOp::Sqrt => f64::sqrt,
                    UnaryOp::LogicalNot => return Err(unsupported(operation, input)),
                };
                PortData::Real(values.iter().map(|x| op(*x)).collect())
            }
            PortData::Integer(values) => {
                let op: fn(i32) -> i32 = match operation {
                    UnaryOp::Negate => i32::wrapping_neg,
                    UnaryOp::Abs => i32::wrapping_abs,
                    _ => return Err(unsupported(operation, input)),
                };
                PortData::Integer(values.iter().map(|x| op(*x)).collect())
            }
            PortData::Boolean(values) => match operation {
                UnaryOp::LogicalNot => PortData::Boolean(values.iter().map(|x| !x).collect()),
                _ => return Err(unsupported(operation, input)),
            },
        };
        set_output(outputs, 0, data)
    }

    fn compile(&self, compiler: &mut NodeCompiler<'_, '_>) -> Result<()> {
        let operation = self.operation;
        let len = compiler.output_size(0)?;
        compiler.for_each_element(len, |c, i| {
            let operand = c.input_at(0, i)?;
            let value = c.function().unary(operation, operand)?;
            c.store_output_at(0, i, value)
        })
    }
}

fn unsupported(operation: UnaryOp, input: &PortData) -> Error {
    Error::type_mismatch(format!("operand of {}", operation.name()), input.port_type())
}
