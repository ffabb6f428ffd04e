use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::trace;

use super::cranelift_emitter::ExecutableModule;
use super::module_emitter::ModuleListing;
use super::types::ModuleOutputFormat;
use crate::error::{Error, Result};
use crate::model::{PortData, PortType, PortValue};

type ComputeFunction = Box<dyn Fn(*const u8, &mut PortData) -> Result<()> + Send>;

/// A map lowered to native code.
///
/// Each instance owns its output buffer, so invoking it takes `&mut self`.
/// Use [`instance`](CompiledMap::instance) for independent callers sharing
/// the same code.
pub struct CompiledMap {
    module: Arc<ExecutableModule>,
    entry: *const u8,
    function_name: String,
    input_type: PortType,
    input_size: usize,
    output_type: PortType,
    output_size: usize,
    output: PortData,
    compute_functions: HashMap<PortType, ComputeFunction>,
}

impl CompiledMap {
    pub(crate) fn new(
        module: Arc<ExecutableModule>,
        function_name: &str,
        input_type: PortType,
        input_size: usize,
        output_type: PortType,
        output_size: usize,
    ) -> Result<Self> {
        let entry = module.function_address(function_name)?;
        Ok(Self {
            module,
            entry,
            function_name: function_name.to_string(),
            input_type,
            input_size,
            output_type,
            output_size,
            output: PortData::new(output_type, output_size),
            compute_functions: HashMap::new(),
        })
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn input_type(&self) -> PortType {
        self.input_type
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_type(&self) -> PortType {
        self.output_type
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    /// Binds the entry point for inputs of type `I`.
    ///
    /// The output element type is taken from the map, and the output buffer
    /// is reallocated to match it.
    pub fn set_compute_function_for_input_type<I: PortValue>(&mut self) -> Result<()> {
        if I::PORT_TYPE != self.input_type {
            return Err(Error::type_mismatch(self.input_type, I::PORT_TYPE));
        }
        if self.compute_functions.contains_key(&I::PORT_TYPE) {
            return Ok(());
        }
        let function = match self.output_type {
            PortType::Boolean => bind::<I, bool>(self.entry),
            PortType::Integer => bind::<I, i32>(self.entry),
            PortType::Real => bind::<I, f64>(self.entry),
        };
        self.output = PortData::new(self.output_type, self.output_size);
        self.compute_functions.insert(I::PORT_TYPE, function);
        trace!(
            function = %self.function_name,
            input = %I::PORT_TYPE,
            output = %self.output_type,
            "bound compute function"
        );
        Ok(())
    }

    /// Runs the compiled function on `input` and returns the output values.
    pub fn compute<I: PortValue, O: PortValue>(&mut self, input: &[I]) -> Result<&[O]> {
        if O::PORT_TYPE != self.output_type {
            return Err(Error::type_mismatch(self.output_type, O::PORT_TYPE));
        }
        if input.len() != self.input_size {
            return Err(Error::InvalidArgument(format!(
                "expected {} input values, got {}",
                self.input_size,
                input.len()
            )));
        }
        self.set_compute_function_for_input_type::<I>()?;
        let function = self
            .compute_functions
            .get(&I::PORT_TYPE)
            .ok_or_else(|| Error::NullReference("no compute function bound".into()))?;
        if self.output.len() != self.output_size {
            self.output.resize(self.output_size);
        }
        function(input.as_ptr().cast::<u8>(), &mut self.output)?;
        self.output.values::<O>()
    }

    /// Output of the last [`compute`](CompiledMap::compute).
    pub fn compute_output<O: PortValue>(&self) -> Result<&[O]> {
        self.output.values::<O>()
    }

    /// A new compiled map sharing this one's code with its own buffers.
    pub fn instance(&self) -> CompiledMap {
        CompiledMap {
            module: Arc::clone(&self.module),
            entry: self.entry,
            function_name: self.function_name.clone(),
            input_type: self.input_type,
            input_size: self.input_size,
            output_type: self.output_type,
            output_size: self.output_size,
            output: PortData::new(self.output_type, self.output_size),
            compute_functions: HashMap::new(),
        }
    }

    pub fn listing(&self) -> &ModuleListing {
        self.module.listing()
    }

    pub fn write_to_stream(&self, out: &mut dyn Write, format: ModuleOutputFormat) -> Result<()> {
        self.module.write_to_stream(out, format)
    }

    /// Writes the module in the format implied by the file extension.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let format = ModuleOutputFormat::from_path(path)?;
        let mut file = BufWriter::new(File::create(path)?);
        self.write_to_stream(&mut file, format)?;
        file.flush()?;
        Ok(())
    }
}

// SAFETY: `entry` points into code owned by `module`, which the Arc keeps
// alive and which is never mutated after finalization. The output buffer is
// owned and only written through `&mut self`.
unsafe impl Send for CompiledMap {}

impl fmt::Debug for CompiledMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledMap")
            .field("function_name", &self.function_name)
            .field("input", &(self.input_type, self.input_size))
            .field("output", &(self.output_type, self.output_size))
            .finish()
    }
}

fn bind<I: PortValue, O: PortValue>(entry: *const u8) -> ComputeFunction {
    // SAFETY: the map compiler emits `entry` as `fn(*const I, *mut O)` reading
    // `input_size` elements and writing `output_size` elements, and callers
    // check both lengths before invoking.
    let function = unsafe { std::mem::transmute::<*const u8, extern "C" fn(*const I, *mut O)>(entry) };
    Box::new(move |input, output| {
        let output_type = output.port_type();
        let values = O::values_mut(output)
            .ok_or_else(|| Error::type_mismatch(output_type, O::PORT_TYPE))?;
        function(input.cast::<I>(), values.as_mut_ptr());
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn negate(input: *const f64, output: *mut f64) {
        unsafe { *output = -*input };
    }

    #[test]
    fn test_bound_function_rejects_mismatched_output_buffer() {
        let function = bind::<f64, f64>(negate as *const u8);
        let input = [2.0f64];
        let mut output = PortData::new(PortType::Real, 1);
        function(input.as_ptr().cast(), &mut output).unwrap();
        assert_eq!(output.values::<f64>().unwrap(), &[-2.0]);

        let mut wrong = PortData::new(PortType::Integer, 1);
        assert!(matches!(
            function(input.as_ptr().cast(), &mut wrong),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(wrong.values::<i32>().unwrap(), &[0]);
    }
}
