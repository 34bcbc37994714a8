//! The optimization pipeline: a legacy-style pass manager that runs
//! function passes in registration order and then loop passes over every
//! natural loop, with dominator and loop analyses computed per function.

mod constant_branch;
mod constant_ops;
mod dead_blocks;
mod licm;
#[cfg(test)]
mod tests;

pub use constant_branch::ConstantBranch;
pub use constant_ops::ConstantOps;
pub use dead_blocks::DeadBlocks;
pub use licm::Licm;

use tracing::debug;

use crate::midend::ir::{DomTree, Function, LoopInfo, Module};

pub trait FunctionPass {
    fn name(&self) -> &'static str;

    /// Passes that must already have run when this one is registered.
    fn depends_on(&self) -> &'static [&'static str] {
        &[]
    }

    fn run_on_function(&mut self, func: &mut Function) -> bool;
}

pub trait LoopPass {
    fn name(&self) -> &'static str;

    fn depends_on(&self) -> &'static [&'static str] {
        &[]
    }

    /// `loop_id` indexes into `loop_info`; loops are visited innermost
    /// first.
    fn run_on_loop(
        &mut self,
        func: &mut Function,
        loop_id: usize,
        loop_info: &LoopInfo,
        dom: &DomTree,
    ) -> bool;
}

#[derive(Default)]
pub struct PassManager {
    function_passes: Vec<Box<dyn FunctionPass>>,
    loop_passes: Vec<Box<dyn LoopPass>>,
    registered: Vec<&'static str>,
}

impl PassManager {
    pub fn new() -> Self {
        PassManager::default()
    }

    fn check_deps(&self, name: &'static str, deps: &[&'static str]) {
        for dep in deps {
            assert!(
                self.registered.contains(dep),
                "pass {} requires {} to be registered first",
                name,
                dep
            );
        }
    }

    pub fn add_function_pass(&mut self, pass: Box<dyn FunctionPass>) {
        self.check_deps(pass.name(), pass.depends_on());
        self.registered.push(pass.name());
        self.function_passes.push(pass);
    }

    pub fn add_loop_pass(&mut self, pass: Box<dyn LoopPass>) {
        self.check_deps(pass.name(), pass.depends_on());
        self.registered.push(pass.name());
        self.loop_passes.push(pass);
    }

    /// Runs every registered pass over every function in the module.
    /// Returns true if anything changed.
    pub fn run(&mut self, module: &mut Module) -> bool {
        let mut changed = false;
        for func in &mut module.funcs {
            for pass in &mut self.function_passes {
                let pass_changed = pass.run_on_function(func);
                debug!(pass = pass.name(), func = %func.name, changed = pass_changed, "function pass");
                changed |= pass_changed;
            }

            if !self.loop_passes.is_empty() {
                let dom = DomTree::compute(func);
                let loop_info = LoopInfo::find(func, &dom);
                for pass in &mut self.loop_passes {
                    for loop_id in 0..loop_info.loops().len() {
                        let pass_changed = pass.run_on_loop(func, loop_id, &loop_info, &dom);
                        debug!(pass = pass.name(), func = %func.name, loop_id, changed = pass_changed, "loop pass");
                        changed |= pass_changed;
                    }
                }
            }
        }
        changed
    }
}

/// Registers the standard pipeline: constant folding, constant-branch
/// folding, unreachable-block removal, then loop-invariant code motion.
pub fn register_opt_passes(pm: &mut PassManager) {
    pm.add_function_pass(Box::new(ConstantOps));
    pm.add_function_pass(Box::new(ConstantBranch));
    pm.add_function_pass(Box::new(DeadBlocks));
    pm.add_loop_pass(Box::new(Licm));
}
