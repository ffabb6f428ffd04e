use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::function_emitter::FunctionEmitter;
use super::types::{CompilerParameters, ModuleOutputFormat, NamedVariable, VariableType};
use super::variables::VariableAllocators;
use crate::error::{Error, Result};

/// Magic bytes opening the binary module format.
pub const BITCODE_MAGIC: &[u8; 4] = b"FLWC";
pub const BITCODE_VERSION: u32 = 1;

/// Emits the functions of one native module.
///
/// Functions are emitted one at a time: `begin_function`, any number of
/// instructions through [`function`](ModuleEmitter::function), then
/// `end_function`.
pub trait ModuleEmitter {
    fn module_name(&self) -> &str;

    fn compiler_parameters(&self) -> &CompilerParameters;

    /// Replaces the compiler parameters. Fails once emission has started.
    fn set_compiler_parameters(&mut self, parameters: CompilerParameters) -> Result<()>;

    fn begin_function(
        &mut self,
        name: &str,
        args: &[NamedVariable],
        return_type: Option<VariableType>,
    ) -> Result<()>;

    fn end_function(&mut self) -> Result<()>;

    /// Emitter for the open function.
    fn function(&mut self) -> Result<FunctionEmitter<'_>>;

    fn variables(&self) -> &VariableAllocators;

    fn write_to_stream(&self, out: &mut dyn Write, format: ModuleOutputFormat) -> Result<()>;

    fn write_to_file_with_format(&self, path: &Path, format: ModuleOutputFormat) -> Result<()> {
        let mut file = BufWriter::new(File::create(path)?);
        self.write_to_stream(&mut file, format)?;
        file.flush()?;
        Ok(())
    }

    /// Writes the module in the format implied by the file extension.
    fn write_to_file(&self, path: &Path) -> Result<()> {
        let format = ModuleOutputFormat::from_path(path)?;
        self.write_to_file_with_format(path, format)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FunctionListing {
    pub name: String,
    pub ir: String,
    pub assembly: String,
}

/// Text captured for each function as it is lowered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModuleListing {
    pub module_name: String,
    pub functions: Vec<FunctionListing>,
}

impl ModuleListing {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            functions: Vec::new(),
        }
    }

    pub fn function(&self, name: &str) -> Option<&FunctionListing> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn write(&self, out: &mut dyn Write, format: ModuleOutputFormat) -> Result<()> {
        match format {
            ModuleOutputFormat::Ir => {
                writeln!(out, "; module {}", self.module_name)?;
                for function in &self.functions {
                    writeln!(out)?;
                    write!(out, "{}", function.ir)?;
                }
            }
            ModuleOutputFormat::Assembly => {
                writeln!(out, "; module {}", self.module_name)?;
                for function in &self.functions {
                    writeln!(out)?;
                    writeln!(out, "{}:", function.name)?;
                    write!(out, "{}", function.assembly)?;
                }
            }
            ModuleOutputFormat::Bitcode => {
                out.write_all(BITCODE_MAGIC)?;
                out.write_all(&BITCODE_VERSION.to_le_bytes())?;
                write_record(out, self.module_name.as_bytes())?;
                write_len(out, self.functions.len())?;
                for function in &self.functions {
                    write_record(out, function.name.as_bytes())?;
                    write_record(out, function.ir.as_bytes())?;
                }
            }
        }
        Ok(())
    }
}

fn write_len(out: &mut dyn Write, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| Error::InvalidArgument(format!("record of {} bytes is too large", len)))?;
    out.write_all(&len.to_le_bytes())?;
    Ok(())
}

fn write_record(out: &mut dyn Write, bytes: &[u8]) -> Result<()> {
    write_len(out, bytes.len())?;
    out.write_all(bytes)?;
    Ok(())
}
