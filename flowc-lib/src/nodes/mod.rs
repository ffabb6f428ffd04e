//! Built-in computations.
//!
//! Every node here has a reference implementation used by
//! [`Map::compute`](crate::model::Map::compute) and a native lowering used by
//! [`MapCompiler`](crate::compiler::MapCompiler); the two agree element for
//! element.

mod binary_operation;
mod binary_predicate;
mod constant;
mod input;
mod sum;
mod type_cast;
mod unary_operation;

pub use binary_operation::BinaryOperationNode;
pub use binary_predicate::BinaryPredicateNode;
pub use constant::ConstantNode;
pub use input::InputNode;
pub use sum::SumNode;
pub use type_cast::TypeCastNode;
pub use unary_operation::UnaryOperationNode;

use crate::error::{Error, Result};
use crate::model::{OutputPort, PortData, PortElementsBase};

/// Name of the single output of every built-in node.
pub const OUTPUT: &str = "output";

/// Replaces the values of output `index`, which must match its type and size.
pub(crate) fn set_output(outputs: &mut [OutputPort], index: usize, data: PortData) -> Result<()> {
    let port = outputs
        .get_mut(index)
        .ok_or_else(|| Error::IndexOutOfRange(format!("output {}", index)))?;
    if data.port_type() != port.port_type() {
        return Err(Error::type_mismatch(port.port_type(), data.port_type()));
    }
    if Some(data.len()) != port.size() {
        return Err(Error::InvalidArgument(format!(
            "{} values computed for output '{}' of size {:?}",
            data.len(),
            port.name(),
            port.size()
        )));
    }
    *port.values_mut() = data;
    Ok(())
}

pub(crate) fn input_data(inputs: &[PortData], index: usize) -> Result<&PortData> {
    inputs
        .get(index)
        .ok_or_else(|| Error::IndexOutOfRange(format!("input {}", index)))
}

pub(crate) fn resolved_size(inputs: &[PortElementsBase], index: usize) -> Result<usize> {
    inputs
        .get(index)
        .map(PortElementsBase::size)
        .ok_or_else(|| Error::IndexOutOfRange(format!("input {}", index)))
}

#[cfg(test)]
mod tests;
