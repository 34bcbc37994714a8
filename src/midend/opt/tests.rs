use super::*;
use crate::frontend::parser::Parser;
use crate::midend::emit::Emitter;
use crate::midend::ir::{verify, BlockId, Function, Module, Opcode};

fn compile(source: &str) -> Module {
    let parser = Parser::new("test.usc", source);
    assert!(
        parser.is_valid(),
        "unexpected errors: {:?}",
        parser.errors()
    );
    Emitter::from_parser(parser).into_module()
}

fn compile_optimized(source: &str) -> Module {
    let mut module = compile(source);
    let mut pm = PassManager::new();
    register_opt_passes(&mut pm);
    pm.run(&mut module);
    module
}

fn find_block<'a>(func: &'a Function, name: &str) -> Option<BlockId> {
    func.blocks()
        .iter()
        .copied()
        .find(|&b| func.block(b).name == name)
}

fn count_op(func: &Function, want: impl Fn(&Opcode) -> bool) -> usize {
    func.blocks()
        .iter()
        .flat_map(|&b| &func.block(b).insts)
        .filter_map(|&id| func.inst(id))
        .filter(|inst| want(&inst.op))
        .count()
}

const CONST_BRANCH_PROGRAM: &str =
    "int main() { int x; x = 2 + 3; if (x > 4) return 1; else return 0; }";

#[test]
fn constant_fold_then_branch_fold_then_dead_blocks() {
    // Scenario: the add and compare fold, the branch becomes
    // unconditional, and the else path disappears.
    let module = compile_optimized(CONST_BRANCH_PROGRAM);
    let func = module.get_function("main").expect("main emitted");

    assert_eq!(count_op(func, |op| op.is_binary()), 0);
    assert_eq!(count_op(func, |op| matches!(*op, Opcode::ICmp(_))), 0);
    assert_eq!(count_op(func, |op| matches!(*op, Opcode::CondBr { .. })), 0);
    assert!(find_block(func, "if.else").is_none(), "else path erased");
    assert!(find_block(func, "if.end").is_none(), "join unreachable");

    // What remains is the fall-through to `ret i32 1`.
    let then = find_block(func, "if.then").expect("taken arm survives");
    let ret = func.terminator(then).and_then(|t| func.inst(t)).expect("ret");
    assert_eq!(ret.op, Opcode::Ret);
    assert_eq!(func.value(ret.operands[0]).const_int(), Some(1));
    assert_eq!(func.blocks().len(), 2);

    assert_eq!(verify::verify_function(func), Vec::<String>::new());
}

#[test]
fn constant_ops_is_idempotent() {
    let mut module = compile(CONST_BRANCH_PROGRAM);
    let func = &mut module.funcs[0];
    let mut pass = ConstantOps;
    assert!(pass.run_on_function(func), "first run folds");
    assert!(!pass.run_on_function(func), "second run finds nothing");
}

#[test]
fn constant_branch_requires_folded_conditions() {
    let mut module = compile(CONST_BRANCH_PROGRAM);
    let func = &mut module.funcs[0];
    // Without constant folding there is nothing to do.
    let mut branch = ConstantBranch;
    assert!(!branch.run_on_function(func));

    let mut ops = ConstantOps;
    ops.run_on_function(func);
    assert!(branch.run_on_function(func), "now the condition is constant");
}

#[test]
fn dead_blocks_leaves_only_reachable_blocks() {
    let module = compile_optimized(CONST_BRANCH_PROGRAM);
    let func = module.get_function("main").expect("main emitted");

    let mut visited = std::collections::HashSet::new();
    let mut stack = vec![func.entry()];
    while let Some(block) = stack.pop() {
        if visited.insert(block) {
            stack.extend(func.successors(block));
        }
    }
    for &block in func.blocks() {
        assert!(visited.contains(&block), "unreachable block survived");
    }
}

#[test]
fn licm_hoists_an_invariant_multiply_into_the_preheader() {
    // The multiply only depends on the argument, so it moves in front of
    // the loop.
    let module = compile_optimized(
        "int f(int n, int m) { int i; int x; x = 5; i = 0; \
         while (i < n) { x = m * 3; i = i + 1; } return x; }",
    );
    let func = module.get_function("f").expect("f emitted");

    let entry = func.entry();
    let body = find_block(func, "while.body").expect("loop survives");

    let mul_blocks: Vec<BlockId> = func
        .blocks()
        .iter()
        .flat_map(|&b| func.block(b).insts.iter().map(move |&id| (b, id)))
        .filter_map(|(b, id)| func.inst(id).map(|inst| (b, inst)))
        .filter(|(_, inst)| inst.op == Opcode::Mul)
        .map(|(b, _)| b)
        .collect();
    assert_eq!(mul_blocks, vec![entry], "multiply sits in the preheader");
    assert!(!func
        .block(body)
        .insts
        .iter()
        .filter_map(|&id| func.inst(id))
        .any(|inst| inst.op == Opcode::Mul));

    assert_eq!(verify::verify_function(func), Vec::<String>::new());
}

#[test]
fn licm_leaves_loop_variant_code_alone() {
    // Scenario: every op in the body depends on i or s, so nothing moves.
    let module = compile_optimized(
        "int main() { int i; int s; i = 0; s = 0; \
         while (i < 10) { s = s + i; i = i + 1; } return s; }",
    );
    let func = module.get_function("main").expect("main emitted");

    let cond = find_block(func, "while.cond").expect("loop survives");
    let body = find_block(func, "while.body").expect("loop survives");

    let phis = func
        .block(cond)
        .insts
        .iter()
        .filter_map(|&id| func.inst(id))
        .filter(|inst| inst.op == Opcode::Phi)
        .count();
    assert_eq!(phis, 2, "i and s still merge in the condition block");

    let adds_in_body = func
        .block(body)
        .insts
        .iter()
        .filter_map(|&id| func.inst(id))
        .filter(|inst| inst.op == Opcode::Add)
        .count();
    assert_eq!(adds_in_body, 2, "both additions stay in the loop");
}

#[test]
fn licm_hoists_invariant_address_computations() {
    // The gep for v[0] is invariant; the load is not hoisted because it
    // has a memory dependence.
    let module = compile_optimized(
        "int f(int v[], int n) { int i; int s; i = 0; s = 0; \
         while (i < n) { s = s + v[0]; i = i + 1; } return s; }",
    );
    let func = module.get_function("f").expect("f emitted");
    let body = find_block(func, "while.body").expect("loop survives");

    let body_ops: Vec<&Opcode> = func
        .block(body)
        .insts
        .iter()
        .filter_map(|&id| func.inst(id))
        .map(|inst| &inst.op)
        .collect();
    assert!(
        !body_ops.iter().any(|op| matches!(**op, Opcode::GetElementPtr)),
        "gep hoisted out of the loop"
    );
    assert!(
        body_ops.iter().any(|op| matches!(**op, Opcode::Load)),
        "load stays inside"
    );
}

#[test]
fn pipeline_registration_order_is_enforced() {
    let mut pm = PassManager::new();
    register_opt_passes(&mut pm);
    // Running the properly ordered pipeline twice is harmless.
    let mut module = compile(CONST_BRANCH_PROGRAM);
    assert!(pm.run(&mut module));
    assert!(!pm.run(&mut module), "pipeline reaches a fixed point");
}

#[test]
#[should_panic(expected = "requires constant-ops")]
fn out_of_order_registration_panics() {
    let mut pm = PassManager::new();
    pm.add_function_pass(Box::new(ConstantBranch));
}
