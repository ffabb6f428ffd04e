pub mod compiler;
pub mod error;
pub mod model;
pub mod nodes;

pub use compiler::{
    CompiledMap, CompilerParameters, CraneliftModuleEmitter, ForLoopEmitter, FunctionEmitter,
    MapCompiler, ModuleEmitter, ModuleOutputFormat, NodeCompiler,
};
pub use error::{Error, Result};
pub use model::{
    format_port_elements, parse_port_elements, Map, MapLoadOptions, Model, Node, NodeId, NodeKey,
    PortElements, PortElementsBase, PortRange, PortType,
};
pub use nodes::{
    BinaryOperationNode, BinaryPredicateNode, ConstantNode, InputNode, SumNode, TypeCastNode,
    UnaryOperationNode,
};
