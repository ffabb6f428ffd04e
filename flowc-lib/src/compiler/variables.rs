use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Error, Result};

/// Storage class of an emitted variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VariableScope {
    Input,
    Output,
    Global,
    Literal,
    Local,
    RValue,
}

impl VariableScope {
    pub const fn prefix(self) -> &'static str {
        match self {
            VariableScope::Input => "in",
            VariableScope::Output => "out",
            VariableScope::Global => "g",
            VariableScope::Literal => "c",
            VariableScope::Local => "t",
            VariableScope::RValue => "r",
        }
    }

    /// Scopes whose slots live only as long as one function.
    pub const fn is_function_scoped(self) -> bool {
        matches!(
            self,
            VariableScope::Input | VariableScope::Output | VariableScope::Local | VariableScope::RValue
        )
    }
}

/// A named slot handed out by a [`VariableAllocator`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EmittedVariable {
    pub scope: VariableScope,
    pub index: usize,
}

impl EmittedVariable {
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EmittedVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.scope.prefix(), self.index)
    }
}

/// Hands out slots of one scope, reusing freed ones lowest index first.
#[derive(Clone, Debug)]
pub struct VariableAllocator {
    scope: VariableScope,
    next: usize,
    free: BTreeSet<usize>,
}

impl VariableAllocator {
    pub fn new(scope: VariableScope) -> Self {
        Self {
            scope,
            next: 0,
            free: BTreeSet::new(),
        }
    }

    pub fn scope(&self) -> VariableScope {
        self.scope
    }

    pub fn allocate(&mut self) -> EmittedVariable {
        let index = match self.free.pop_first() {
            Some(index) => index,
            None => {
                self.next += 1;
                self.next - 1
            }
        };
        EmittedVariable {
            scope: self.scope,
            index,
        }
    }

    pub fn free(&mut self, variable: EmittedVariable) -> Result<()> {
        if variable.scope != self.scope {
            return Err(Error::InvalidArgument(format!(
                "variable {} does not belong to the {:?} pool",
                variable, self.scope
            )));
        }
        if variable.index >= self.next || !self.free.insert(variable.index) {
            return Err(Error::InvalidArgument(format!(
                "variable {} is not allocated",
                variable
            )));
        }
        Ok(())
    }

    pub fn is_allocated(&self, variable: EmittedVariable) -> bool {
        variable.scope == self.scope && variable.index < self.next && !self.free.contains(&variable.index)
    }

    /// Number of slots currently handed out.
    pub fn live(&self) -> usize {
        self.next - self.free.len()
    }

    pub fn reset(&mut self) {
        self.next = 0;
        self.free.clear();
    }
}

/// The six pools used while emitting a module.
#[derive(Clone, Debug)]
pub struct VariableAllocators {
    pub inputs: VariableAllocator,
    pub outputs: VariableAllocator,
    pub globals: VariableAllocator,
    pub literals: VariableAllocator,
    pub locals: VariableAllocator,
    pub rvalues: VariableAllocator,
}

impl Default for VariableAllocators {
    fn default() -> Self {
        Self {
            inputs: VariableAllocator::new(VariableScope::Input),
            outputs: VariableAllocator::new(VariableScope::Output),
            globals: VariableAllocator::new(VariableScope::Global),
            literals: VariableAllocator::new(VariableScope::Literal),
            locals: VariableAllocator::new(VariableScope::Local),
            rvalues: VariableAllocator::new(VariableScope::RValue),
        }
    }
}

impl VariableAllocators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool(&self, scope: VariableScope) -> &VariableAllocator {
        match scope {
            VariableScope::Input => &self.inputs,
            VariableScope::Output => &self.outputs,
            VariableScope::Global => &self.globals,
            VariableScope::Literal => &self.literals,
            VariableScope::Local => &self.locals,
            VariableScope::RValue => &self.rvalues,
        }
    }

    pub fn pool_mut(&mut self, scope: VariableScope) -> &mut VariableAllocator {
        match scope {
            VariableScope::Input => &mut self.inputs,
            VariableScope::Output => &mut self.outputs,
            VariableScope::Global => &mut self.globals,
            VariableScope::Literal => &mut self.literals,
            VariableScope::Local => &mut self.locals,
            VariableScope::RValue => &mut self.rvalues,
        }
    }

    pub fn allocate(&mut self, scope: VariableScope) -> EmittedVariable {
        self.pool_mut(scope).allocate()
    }

    pub fn free(&mut self, variable: EmittedVariable) -> Result<()> {
        self.pool_mut(variable.scope).free(variable)
    }

    /// Resets the pools whose slots belong to a single function.
    pub fn reset_function_scope(&mut self) {
        self.inputs.reset();
        self.outputs.reset();
        self.locals.reset();
        self.rvalues.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pools_use_distinct_prefixes() {
        let mut vars = VariableAllocators::new();
        let names: Vec<String> = [
            VariableScope::Input,
            VariableScope::Output,
            VariableScope::Global,
            VariableScope::Literal,
            VariableScope::Local,
            VariableScope::RValue,
        ]
        .into_iter()
        .map(|scope| vars.allocate(scope).name())
        .collect();
        assert_eq!(names, vec!["in_0", "out_0", "g_0", "c_0", "t_0", "r_0"]);
    }

    #[test]
    fn test_free_slots_are_reused() {
        let mut pool = VariableAllocator::new(VariableScope::Local);
        let a = pool.allocate();
        let b = pool.allocate();
        let c = pool.allocate();
        pool.free(b).unwrap();
        pool.free(a).unwrap();
        assert_eq!(pool.live(), 1);
        assert_eq!(pool.allocate(), a);
        assert_eq!(pool.allocate(), b);
        assert_eq!(pool.allocate().index, 3);
        assert!(pool.is_allocated(c));
    }

    #[test]
    fn test_double_free_and_wrong_pool() {
        let mut vars = VariableAllocators::new();
        let local = vars.allocate(VariableScope::Local);
        vars.free(local).unwrap();
        assert!(matches!(vars.free(local), Err(Error::InvalidArgument(_))));
        let rvalue = vars.allocate(VariableScope::RValue);
        assert!(matches!(vars.locals.free(rvalue), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_reset_function_scope_keeps_module_pools() {
        let mut vars = VariableAllocators::new();
        vars.allocate(VariableScope::Local);
        vars.allocate(VariableScope::Literal);
        vars.reset_function_scope();
        assert_eq!(vars.locals.live(), 0);
        assert_eq!(vars.literals.live(), 1);
    }
}
