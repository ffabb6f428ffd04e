mod map;
mod model_impl;
mod parse;
mod port;
mod port_elements;
pub mod topology;
mod traits;
pub mod types;

#[cfg(test)]
mod tests;

pub use map::{Map, MapLoadOptions};
pub use model_impl::{Model, NodeData};
pub use parse::{format_port_elements, parse_port_elements};
pub use port::{InputPort, OutputPort, OutputPortSpec};
pub use port_elements::{
    IndexValue, IndexValueIter, PortElement, PortElements, PortElementsBase, PortRange,
};
pub use traits::Node;
pub use types::{
    NodeId, NodeKey, PortData, PortRef, PortType, PortValue, MAX_NODE_PORTS, SPEC_DELIMITERS,
};
