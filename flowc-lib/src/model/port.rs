use super::port_elements::PortElementsBase;
use super::types::{PortData, PortRef, PortType};

/// Declaration of an output port, as returned by [`Node::outputs`](super::Node::outputs).
///
/// A `size` of `None` leaves the port unsized until
/// [`Model::set_output_size`](super::Model::set_output_size) is called.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OutputPortSpec {
    pub name: &'static str,
    pub port_type: PortType,
    pub size: Option<usize>,
}

impl OutputPortSpec {
    pub const fn sized(name: &'static str, port_type: PortType, size: usize) -> Self {
        Self {
            name,
            port_type,
            size: Some(size),
        }
    }

    pub const fn deferred(name: &'static str, port_type: PortType) -> Self {
        Self {
            name,
            port_type,
            size: None,
        }
    }
}

/// A named, typed output slot owned by one node.
#[derive(Clone, Debug)]
pub struct OutputPort {
    name: &'static str,
    port_ref: PortRef,
    port_type: PortType,
    size: Option<usize>,
    values: PortData,
}

impl OutputPort {
    pub(crate) fn new(spec: OutputPortSpec, port_ref: PortRef) -> Self {
        Self {
            name: spec.name,
            port_ref,
            port_type: spec.port_type,
            size: spec.size,
            values: PortData::new(spec.port_type, spec.size.unwrap_or(0)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn port_ref(&self) -> PortRef {
        self.port_ref
    }

    pub fn port_type(&self) -> PortType {
        self.port_type
    }

    /// The declared size, or `None` while the port is unsized.
    pub fn size(&self) -> Option<usize> {
        self.size
    }

    pub fn is_sized(&self) -> bool {
        self.size.is_some()
    }

    /// Values from the most recent reference computation.
    pub fn values(&self) -> &PortData {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut PortData {
        &mut self.values
    }

    pub(crate) fn set_size(&mut self, size: usize) {
        self.size = Some(size);
        self.values.resize(size);
    }
}

/// A named input of a node: the elements it reads from other nodes' outputs.
#[derive(Clone, Debug)]
pub struct InputPort {
    pub name: &'static str,
    pub elements: PortElementsBase,
}

impl InputPort {
    pub fn new(name: &'static str, elements: impl Into<PortElementsBase>) -> Self {
        Self {
            name,
            elements: elements.into(),
        }
    }
}
