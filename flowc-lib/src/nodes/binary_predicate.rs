use super::{input_data, resolved_size, set_output, OUTPUT};
use crate::compiler::{CompareOp, NodeCompiler};
use crate::error::{Error, Result};
use crate::model::{
    InputPort, Node, OutputPort, OutputPortSpec, PortData, PortElements, PortElementsBase,
    PortType, PortValue,
};

/// Element-wise comparison producing booleans.
#[derive(Debug, Clone)]
pub struct BinaryPredicateNode<T: PortValue> {
    input1: PortElements<T>,
    input2: PortElements<T>,
    predicate: CompareOp,
}

impl<T: PortValue> BinaryPredicateNode<T> {
    pub fn new(
        input1: PortElements<T>,
        input2: PortElements<T>,
        predicate: CompareOp,
    ) -> Result<Self> {
        if input1.size() != input2.size() {
            return Err(Error::InvalidArgument(format!(
                "operands of {} have sizes {} and {}",
                predicate.name(),
                input1.size(),
                input2.size()
            )));
        }
        Ok(Self {
            input1,
            input2,
            predicate,
        })
    }

    pub fn predicate(&self) -> CompareOp {
        self.predicate
    }
}

impl<T: PortValue> Node for BinaryPredicateNode<T> {
    fn type_name(&self) -> &'static str {
        "BinaryPredicateNode"
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
                self.predicate.name()
            )));
        }
        Ok(vec![OutputPortSpec::sized(OUTPUT, PortType::Boolean, size)])
    }

    fn compute(&self, inputs: &[PortData], outputs: &mut [OutputPort]) -> Result<()> {
        let predicate = self.predicate;
        let values = match (input_data(inputs, 0)?, input_data(inputs, 1)?) {
            (PortData::Real(a), PortData::Real(b)) => compare_all(predicate, a, b),
            (PortData::Integer(a), PortData::Integer(b)) => compare_all(predicate, a, b),
            (PortData::Boolean(a), PortData::Boolean(b)) => compare_all(predicate, a, b),
            (a, b) => return Err(Error::type_mismatch(a.port_type(), b.port_type())),
        };
        set_output(outputs, 0, PortData::Boolean(values))
    }

    fn compile(&self, compiler: &mut NodeCompiler<'_, '_>) -> Result<()> {
        let predicate = self.predicate;
        let len = compiler.output_size(0)?;
        compiler.for_each_element(len, |c, i| {
            let lhs = c.input_at(0, i)?;
            let rhs = c.input_at(1, i)?;
            let value = c.function().compare(predicate, lhs, rhs)?;
            c.store_output_at(0, i, value)
        })
    }
}

fn compare_all<V: PartialOrd>(predicate: CompareOp, a: &[V], b: &[V]) -> Vec<bool> {
    a.iter()
        .zip(b)
        .map(|(x, y)| match predicate {
            CompareOp::Equal => x == y,
            CompareOp::NotEqual => x != y,
            CompareOp::Less => x < y,
            CompareOp::LessOrEqual => x <= y,
            CompareOp::Greater => x > y,
            CompareOp::GreaterOrEqual => x >= y,
        })
        .collect()
}
