use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::PortType;

/// Type of a value in emitted code.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VariableType {
    /// One byte holding 0 or 1.
    Boolean,
    Int32,
    Int64,
    Double,
    /// Address of a buffer.
    Pointer,
}

impl VariableType {
    pub const fn name(self) -> &'static str {
        match self {
            VariableType::Boolean => "bool",
            VariableType::Int32 => "i32",
            VariableType::Int64 => "i64",
            VariableType::Double => "f64",
            VariableType::Pointer => "ptr",
        }
    }

    /// Bytes occupied by one value in memory.
    pub const fn size_bytes(self) -> u32 {
        match self {
            VariableType::Boolean => 1,
            VariableType::Int32 => 4,
            VariableType::Int64 | VariableType::Double | VariableType::Pointer => 8,
        }
    }

    pub const fn is_integer(self) -> bool {
        matches!(self, VariableType::Int32 | VariableType::Int64)
    }

    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            VariableType::Int32 | VariableType::Int64 | VariableType::Double
        )
    }
}

impl From<PortType> for VariableType {
    fn from(port_type: PortType) -> Self {
        match port_type {
            PortType::Boolean => VariableType::Boolean,
            PortType::Integer => VariableType::Int32,
            PortType::Real => VariableType::Double,
        }
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedVariable {
    pub name: String,
    pub ty: VariableType,
}

impl NamedVariable {
    pub fn new(name: impl Into<String>, ty: VariableType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Switches that shape the generated code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilerParameters {
    /// Emit straight-line code instead of loops over vector elements.
    pub unroll_loops: bool,
    /// Emit operators inline instead of calling per-operator helpers.
    pub inline_operators: bool,
    pub optimize: bool,
    /// Attach node source locations to the emitted code.
    pub include_diagnostic_info: bool,
}

impl Default for CompilerParameters {
    fn default() -> Self {
        Self {
            unroll_loops: false,
            inline_operators: true,
            optimize: true,
            include_diagnostic_info: false,
        }
    }
}

impl CompilerParameters {
    pub fn with_unroll_loops(mut self, unroll_loops: bool) -> Self {
        self.unroll_loops = unroll_loops;
        self
    }

    pub fn with_inline_operators(mut self, inline_operators: bool) -> Self {
        self.inline_operators = inline_operators;
        self
    }

    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn with_diagnostic_info(mut self, include_diagnostic_info: bool) -> Self {
        self.include_diagnostic_info = include_diagnostic_info;
        self
    }
}

/// Serialization of an emitted module.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModuleOutputFormat {
    /// Textual intermediate representation.
    Ir,
    /// Binary container of the intermediate representation.
    Bitcode,
    /// Disassembled machine code.
    Assembly,
}

impl ModuleOutputFormat {
    /// Infers the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Self::from_extension(extension)
            .ok_or_else(|| Error::UnsupportedFormat(format!("{}", path.display())))
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "ll" | "clif" => Some(ModuleOutputFormat::Ir),
            "bc" => Some(ModuleOutputFormat::Bitcode),
            "s" | "asm" => Some(ModuleOutputFormat::Assembly),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parameters() {
        let params = CompilerParameters::default();
        assert!(!params.unroll_loops);
        assert!(params.inline_operators);
        assert!(params.optimize);
        assert!(!params.include_diagnostic_info);
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ModuleOutputFormat::from_path(Path::new("out/model.ll")).unwrap(),
            ModuleOutputFormat::Ir
        );
        assert_eq!(
            ModuleOutputFormat::from_path(Path::new("model.BC")).unwrap(),
            ModuleOutputFormat::Bitcode
        );
        assert_eq!(
            ModuleOutputFormat::from_path(Path::new("model.s")).unwrap(),
            ModuleOutputFormat::Assembly
        );
        assert!(matches!(
            ModuleOutputFormat::from_path(Path::new("model.xyz")),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(ModuleOutputFormat::from_path(Path::new("model")).is_err());
    }
}
