use super::{input_data, resolved_size, set_output, OUTPUT};
use crate::compiler::{BinaryOp, NodeCompiler, VariableType};
use crate::error::{Error, Result};
use crate::model::{
    InputPort, Node, OutputPort, OutputPortSpec, PortData, PortElements, PortElementsBase,
    PortValue,
};

/// Element-wise `input1 op input2`.
///
/// Arithmetic operations take numeric elements, logical ones take booleans.
/// Integer division by zero yields zero and `i32::MIN / -1` wraps.
#[derive(Debug, Clone)]
pub struct BinaryOperationNode<T: PortValue> {
    input1: PortElements<T>,
    input2: PortElements<T>,
    operation: BinaryOp,
}

impl<T: PortValue> BinaryOperationNode<T> {
    pub fn new(
        input1: PortElements<T>,
        input2: PortElements<T>,
        operation: BinaryOp,
    ) -> Result<Self> {
        if !operation.accepts(VariableType::from(T::PORT_TYPE)) {
            return Err(Error::type_mismatch(
                format!("operand of {}", operation.name()),
                T::PORT_TYPE,
            ));
        }
        if input1.size() != input2.size() {
            return Err(Error::InvalidArgument(format!(
                "operands of {} have sizes {} and {}",
                operation.name(),
                input1.size(),
                input2.size()
            )));
        }
        Ok(Self {
            input1,
            input2,
            operation,
        })
    }

    pub fn operation(&self) -> BinaryOp {
        self.operation
    }
}

impl<T: PortValue> Node for BinaryOperationNode<T> {
    fn type_name(&self) -> &'static str {
        "BinaryOperationNode"
    }

    fn inputs(&self) -> Vec<InputPort> {
        vec![
            InputPort::new("input1", self.input1.as_base().clone()),
            InputPort::new("input2", self.input2.as_base().clone()),
        ]
    }

    fn outputs(&self, inputs: &[PortElementsBase]) -> Result<Vec<OutputPortSpec>> {
        let size = resolved_size(inputs, 0)?;
        if resolved_size(inputs, 1)? != size {
            return Err(Error::InvalidArgument(format!(
                "operands of {} differ in size",
                self.operation.name()
            )));
        }
        Ok(vec![OutputPortSpec::sized(OUTPUT, T::PORT_TYPE, size)])
    }

    fn compute(&self, inputs: &[PortData], outputs: &mut [OutputPort]) -> Result<()> {
        let result = apply(self.operation, input_data(inputs, 0)?, input_data(inputs, 1)?)?;
        set_output(outputs, 0, result)
    }

    fn compile(&self, compiler: &mut NodeCompiler<'_, '_>) -> Result<()> {
        let operation = self.operation;
        let len = compiler.output_size(0)?;
        compiler.for_each_element(len, |c, i| {
            let lhs = c.input_at(0, i)?;
            let rhs = c.input_at(1, i)?;
            let value = c.function().operator(operation, lhs, rhs)?;
            c.store_output_at(0, i, value)
        })
    }
}

fn apply(operation: BinaryOp, lhs: &PortData, rhs: &PortData) -> Result<PortData> {
    let unsupported =
        || Error::type_mismatch(format!("operand of {}", operation.name()), lhs.port_type());
    let data = match (lhs, rhs) {
        (PortData::Real(a), PortData::Real(b)) => {
            let op: fn(f64, f64) -> f64 = match operation {
                BinaryOp::Add => |x, y| x + y,
                BinaryOp::Subtract => |x, y| x - y,
                BinaryOp::Multiply => |x, y| x * y,
                BinaryOp::Divide => |x, y| x / y,
                BinaryOp::Min => min_f64,
                BinaryOp::Max => max_f64,
                _ => return Err(unsupported()),
            };
            PortData::Real(a.iter().zip(b).map(|(x, y)| op(*x, *y)).collect())
        }
        (PortData::Integer(a), PortData::Integer(b)) => {
            let op: fn(i32, i32) -> i32 = match operation {
                BinaryOp::Add => i32::wrapping_add,
                BinaryOp::Subtract => i32::wrapping_sub,
                BinaryOp::Multiply => i32::wrapping_mul,
                BinaryOp::Divide => |x, y| if y == 0 { 0 } else { x.wrapping_div(y) },
                BinaryOp::Min => i32::min,
                BinaryOp::Max => i32::max,
                _ => return Err(unsupported()),
            };
            PortData::Integer(a.iter().zip(b).map(|(x, y)| op(*x, *y)).collect())
        }
        (PortData::Boolean(a), PortData::Boolean(b)) => {
            let op: fn(bool, bool) -> bool = match operation {
                BinaryOp::LogicalAnd => |x, y| x && y,
                BinaryOp::LogicalOr => |x, y| x || y,
                BinaryOp::LogicalXor => |x, y| x ^ y,
                _ => return Err(unsupported()),
            };
            PortData::Boolean(a.iter().zip(b).map(|(x, y)| op(*x, *y)).collect())
        }
        _ => return Err(Error::type_mismatch(lhs.port_type(), rhs.port_type())),
    };
    Ok(data)
}

// NaN in either operand gives NaN; -0.0 orders below 0.0.
fn min_f64(x: f64, y: f64) -> f64 {
    if x.is_nan() || y.is_nan() {
        f64::NAN
    } else if x == y {
        if x.is_sign_negative() {
            x
        } else {
            y
        }
    } else {
        x.min(y)
    }
}

fn max_f64(x: f64, y: f64) -> f64 {
    if x.is_nan() || y.is_nan() {
        f64::NAN
    } else if x == y {
        if x.is_sign_positive() {
            x
        } else {
            y
        }
    } else {
        x.max(y)
    }
}
