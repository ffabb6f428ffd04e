//! Lowering of models to native code.
//!
//! [`FunctionEmitter`] records typed instructions for one function,
//! [`CraneliftModuleEmitter`] turns finished functions into machine code and
//! [`MapCompiler`] drives both to compile a whole [`Map`](crate::model::Map).

mod compiled_map;
mod cranelift_emitter;
mod function_emitter;
pub mod ir;
mod loop_emitter;
mod map_compiler;
mod module_emitter;
mod types;
mod variables;


pub use compiled_map::CompiledMap;
pub use cranelift_emitter::{CraneliftModuleEmitter, ExecutableModule};
pub use function_emitter::{FunctionEmitter, StackBuffer};
pub use ir::{BinaryOp, BlockId, CompareOp, GlobalId, Literal, UnaryOp, ValueId, VarId};
pub use loop_emitter::ForLoopEmitter;
pub use map_compiler::{ElementIndex, MapCompiler, NodeCompiler, PortStorage};
pub use module_emitter::{
    FunctionListing, ModuleEmitter, ModuleListing, BITCODE_MAGIC, BITCODE_VERSION,
};
pub use types::{CompilerParameters, ModuleOutputFormat, NamedVariable, VariableType};
pub use variables::{EmittedVariable, VariableAllocator, VariableAllocators, VariableScope};
