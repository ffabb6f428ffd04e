use std::collections::{HashMap, HashSet};

use arrayvec::ArrayVec;
use slotmap::SlotMap;
use tracing::{debug, trace};

use super::port::{InputPort, OutputPort};
use super::port_elements::{PortElements, PortElementsBase, PortRange};
use super::topology::{dependency_closure, topological_sort};
use super::traits::Node;
use super::types::{NodeId, NodeKey, PortData, PortRef, PortType, PortValue, MAX_NODE_PORTS};
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct NodeData {
    id: NodeId,
    key: NodeKey,
    processor: Box<dyn Node>,
    inputs: ArrayVec<InputPort, MAX_NODE_PORTS>,
    outputs: ArrayVec<OutputPort, MAX_NODE_PORTS>,
}

impl NodeData {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn key(&self) -> NodeKey {
        self.key
    }

    pub fn type_name(&self) -> &'static str {
        self.processor.type_name()
    }

    pub fn processor(&self) -> &dyn Node {
        self.processor.as_ref()
    }

    /// Inputs with every range resolved against the model.
    pub fn inputs(&self) -> &[InputPort] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    pub fn output_port(&self, name: &str) -> Result<&OutputPort> {
        self.outputs
            .iter()
            .find(|port| port.name() == name)
            .ok_or_else(|| {
                Error::NullReference(format!("node '{}' has no output port '{}'", self.id, name))
            })
    }

    /// All elements of the named output.
    pub fn output_elements(&self, name: &str) -> Result<PortElementsBase> {
        self.output_port(name).map(PortElementsBase::from_port)
    }

    pub fn typed_output<T: PortValue>(&self, name: &str) -> Result<PortElements<T>> {
        self.output_port(name).and_then(PortElements::from_port)
    }

    /// Distinct nodes this node reads from, in input order.
    pub fn dependencies(&self) -> Vec<NodeKey> {
        let mut seen = HashSet::new();
        self.inputs
            .iter()
            .flat_map(|input| input.elements.ranges())
            .map(|range| range.port().node)
            .filter(|key| seen.insert(*key))
            .collect()
    }
}

/// Owns every node of a dataflow graph.
#[derive(Debug, Default)]
pub struct Model {
    nodes: SlotMap<NodeKey, NodeData>,
    order: Vec<NodeKey>,
    ids: HashMap<NodeId, NodeKey>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node under a fresh identifier.
    ///
    /// Every input must reference sized ports of live nodes in this model.
    pub fn add_node<N: Node + 'static>(&mut self, node: N) -> Result<NodeKey> {
        let mut id = NodeId::next();
        while self.ids.contains_key(&id) {
            id = NodeId::next();
        }
        self.insert(id, Box::new(node))
    }

    pub fn add_node_with_id<N: Node + 'static>(&mut self, id: NodeId, node: N) -> Result<NodeKey> {
        if self.ids.contains_key(&id) {
            return Err(Error::InvalidArgument(format!("node id '{}' is already in use", id)));
        }
        self.insert(id, Box::new(node))
    }

    fn insert(&mut self, id: NodeId, processor: Box<dyn Node>) -> Result<NodeKey> {
        let declared = processor.inputs();
        if declared.len() > MAX_NODE_PORTS {
            return Err(Error::InvalidArgument(format!(
                "{} declares {} inputs, at most {} are supported",
                processor.type_name(),
                declared.len(),
                MAX_NODE_PORTS
            )));
        }

        let mut inputs = ArrayVec::<InputPort, MAX_NODE_PORTS>::new();
        for input in declared {
            let elements = self.resolve_elements(&input.elements)?;
            inputs.push(InputPort::new(input.name, elements));
        }

        let resolved: Vec<PortElementsBase> = inputs.iter().map(|i| i.elements.clone()).collect();
        let specs = processor.outputs(&resolved)?;
        if specs.len() > MAX_NODE_PORTS {
            return Err(Error::InvalidArgument(format!(
                "{} declares {} outputs, at most {} are supported",
                processor.type_name(),
                specs.len(),
                MAX_NODE_PORTS
            )));
        }

        let type_name = processor.type_name();
        let key = self.nodes.insert_with_key(|key| {
            let outputs = specs
                .into_iter()
                .enumerate()
                .map(|(index, spec)| OutputPort::new(spec, PortRef::new(key, index)))
                .collect();
            NodeData {
                id: id.clone(),
                key,
                processor,
                inputs,
                outputs,
            }
        });
        self.order.push(key);
        self.ids.insert(id.clone(), key);

        debug!(node = %id, node_type = type_name, "added node");
        Ok(key)
    }

    /// Looks up a node by identifier. Absence is reported as `None`.
    pub fn get_node(&self, id: &NodeId) -> Option<&NodeData> {
        self.ids.get(id).and_then(|key| self.nodes.get(*key))
    }

    pub fn node(&self, key: NodeKey) -> Option<&NodeData> {
        self.nodes.get(key)
    }

    pub fn node_key(&self, id: &NodeId) -> Option<NodeKey> {
        self.ids.get(id).copied()
    }

    /// Removes a node. Ranges that referenced its ports become stale and fail
    /// to resolve from then on.
    pub fn remove_node(&mut self, key: NodeKey) -> Option<NodeData> {
        let removed = self.nodes.remove(key)?;
        self.order.retain(|k| *k != key);
        self.ids.remove(&removed.id);
        debug!(node = %removed.id, "removed node");
        Some(removed)
    }

    /// Live nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeData> + '_ {
        self.order.iter().filter_map(|key| self.nodes.get(*key))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn port(&self, port: PortRef) -> Result<&OutputPort> {
        let node = self
            .nodes
            .get(port.node)
            .ok_or_else(|| Error::NullReference("port of a removed node".into()))?;
        node.outputs.get(port.index).ok_or_else(|| {
            Error::NullReference(format!("node '{}' has no output {}", node.id, port.index))
        })
    }

    pub(crate) fn port_mut(&mut self, port: PortRef) -> Result<&mut OutputPort> {
        self.nodes
            .get_mut(port.node)
            .and_then(|node| node.outputs.get_mut(port.index))
            .ok_or_else(|| Error::NullReference("port of a removed node".into()))
    }

    /// Gives a deferred-size port its size. Ports are immutable once sized.
    pub fn set_output_size(&mut self, port: PortRef, size: usize) -> Result<()> {
        let node = self
            .nodes
            .get_mut(port.node)
            .ok_or_else(|| Error::NullReference("port of a removed node".into()))?;
        let id = node.id.clone();
        let output = node.outputs.get_mut(port.index).ok_or_else(|| {
            Error::NullReference(format!("node '{}' has no output {}", id, port.index))
        })?;
        if let Some(current) = output.size() {
            return Err(Error::NotImplemented(format!(
                "resizing port '{}.{}' from {} to {}",
                id,
                output.name(),
                current,
                size
            )));
        }
        output.set_size(size);
        debug!(node = %id, port = output.name(), size, "sized output port");
        Ok(())
    }

    /// Checks `range` against the current model and refreshes its size if it
    /// tracks a whole port.
    pub fn resolve_range(&self, range: &PortRange) -> Result<PortRange> {
        let port = self.port(range.port())?;
        let size = port.size().ok_or_else(|| {
            Error::InvalidArgument(format!("port '{}' has not been sized", port.name()))
        })?;
        if port.port_type() != range.port_type() {
            return Err(Error::type_mismatch(range.port_type(), port.port_type()));
        }
        let resolved = range.refreshed(size);
        if resolved.end() > size {
            return Err(Error::IndexOutOfRange(format!(
                "range [{}, {}) of port '{}' with size {}",
                resolved.start_index(),
                resolved.end(),
                port.name(),
                size
            )));
        }
        Ok(resolved)
    }

    pub fn resolve_elements(&self, elements: &PortElementsBase) -> Result<PortElementsBase> {
        let ranges = elements
            .ranges()
            .iter()
            .map(|range| self.resolve_range(range))
            .collect::<Result<Vec<_>>>()?;
        PortElementsBase::from_ranges(ranges)
    }

    /// Checks every node input against the current model.
    pub fn validate(&self) -> Result<()> {
        for node in self.nodes() {
            for input in node.inputs() {
                self.resolve_elements(&input.elements)?;
            }
        }
        self.sort(self.order.iter().copied()).map(|_| ())
    }

    /// Nodes that `outputs` depend on, dependencies first.
    pub fn dependency_order(&self, outputs: &[PortElementsBase]) -> Result<Vec<NodeKey>> {
        let mut roots = Vec::new();
        for elements in outputs {
            let resolved = self.resolve_elements(elements)?;
            roots.extend(resolved.ranges().iter().map(|range| range.port().node));
        }

        let closure = dependency_closure(roots, |key| {
            self.nodes.get(*key).map(NodeData::dependencies).unwrap_or_default()
        });
        for key in &closure {
            let node = self
                .nodes
                .get(*key)
                .ok_or_else(|| Error::NullReference("dependency on a removed node".into()))?;
            for input in node.inputs() {
                self.resolve_elements(&input.elements)?;
            }
        }

        let members: HashSet<NodeKey> = closure.into_iter().collect();
        let order = self.sort(self.order.iter().copied().filter(|k| members.contains(k)))?;
        trace!(nodes = order.len(), "computed dependency order");
        Ok(order)
    }

    fn sort(&self, keys: impl IntoIterator<Item = NodeKey>) -> Result<Vec<NodeKey>> {
        topological_sort(keys, |key| {
            self.nodes.get(*key).map(NodeData::dependencies).unwrap_or_default()
        })
        .map_err(|e| Error::InvalidArgument(e.to_string()))
    }

    /// Current values of `elements`, concatenated in order.
    pub fn gather_values(&self, elements: &PortElementsBase) -> Result<PortData> {
        let resolved = self.resolve_elements(elements)?;
        let port_type = resolved.port_type().unwrap_or(PortType::Real);
        let mut data = PortData::new(port_type, 0);
        for range in resolved.ranges() {
            let port = self.port(range.port())?;
            data.extend_from(port.values(), range.start_index(), range.size())?;
        }
        Ok(data)
    }

    /// Runs the reference computation of each node in `order`.
    pub fn compute(&mut self, order: &[NodeKey]) -> Result<()> {
        for &key in order {
            let node = self
                .nodes
                .get(key)
                .ok_or_else(|| Error::NullReference("compute of a removed node".into()))?;
            let inputs = node
                .inputs
                .iter()
                .map(|input| self.gather_values(&input.elements))
                .collect::<Result<Vec<_>>>()?;

            let NodeData {
                id,
                processor,
                outputs,
                ..
            } = self
                .nodes
                .get_mut(key)
                .ok_or_else(|| Error::NullReference("compute of a removed node".into()))?;
            trace!(node = %id, node_type = processor.type_name(), "computing node");
            processor.compute(&inputs, outputs)?;
        }
        Ok(())
    }
}
