use super::Emitter;
use crate::frontend::parser::Parser;
use crate::midend::ir::{verify, BlockId, Function, Module, Opcode, ValueKind};

fn compile(source: &str) -> Module {
    let parser = Parser::new("test.usc", source);
    assert!(
        parser.is_valid(),
        "unexpected errors: {:?}",
        parser.errors()
    );
    Emitter::from_parser(parser).into_module()
}

fn find_block<'a>(func: &'a Function, name: &str) -> BlockId {
    *func
        .blocks()
        .iter()
        .find(|&&b| func.block(b).name == name)
        .unwrap_or_else(|| panic!("no block named {}", name))
}

fn phis_in(func: &Function, block: BlockId) -> Vec<&crate::midend::ir::Inst> {
    func.block(block)
        .insts
        .iter()
        .filter_map(|&id| func.inst(id))
        .filter(|inst| inst.op == Opcode::Phi)
        .collect()
}

fn count_op(func: &Function, want: impl Fn(&Opcode) -> bool) -> usize {
    func.blocks()
        .iter()
        .flat_map(|&b| &func.block(b).insts)
        .filter_map(|&id| func.inst(id))
        .filter(|inst| want(&inst.op))
        .count()
}

#[test]
fn emitted_modules_pass_the_verifier() {
    let module = compile(
        "int fib(int n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }\n\
         int main() { int i; int s; i = 0; s = 0; \
         while (i < 10) { s = s + i; i = i + 1; } return s + fib(5); }",
    );
    assert_eq!(verify::verify_module(&module), Vec::<String>::new());
}

#[test]
fn straight_line_function_has_no_phis() {
    let module = compile("int main() { int x; int y; x = 3; y = x + 4; return y * x; }");
    let func = module.get_function("main").expect("main emitted");
    assert_eq!(count_op(func, |op| *op == Opcode::Phi), 0);
    // A single block is enough for straight-line code.
    assert_eq!(func.blocks().len(), 1);
}

#[test]
fn scalar_locals_never_touch_memory() {
    let module = compile("int main() { int x; x = 3; x = x + 1; return x; }");
    let func = module.get_function("main").expect("main emitted");
    assert_eq!(count_op(func, |op| matches!(*op, Opcode::Alloca)), 0);
    assert_eq!(count_op(func, |op| matches!(*op, Opcode::Load)), 0);
    assert_eq!(count_op(func, |op| matches!(*op, Opcode::Store)), 0);
}

#[test]
fn while_loop_merges_each_variable_once() {
    // Scenario: both i and s are written in the loop, so the condition
    // block needs exactly one phi per variable, each merging the
    // pre-loop value with the back-edge value.
    let module = compile(
        "int main() { int i; int s; i = 0; s = 0; \
         while (i < 10) { s = s + i; i = i + 1; } return s; }",
    );
    let func = module.get_function("main").expect("main emitted");
    let cond = find_block(func, "while.cond");

    let phis = phis_in(func, cond);
    assert_eq!(phis.len(), 2, "one phi for i, one for s");
    for phi in &phis {
        assert_eq!(phi.operands.len(), 2);
        assert_eq!(phi.incoming.len(), 2);
    }
    assert_eq!(verify::verify_function(func), Vec::<String>::new());
}

#[test]
fn loop_invariant_variable_needs_no_phi() {
    // y is never written inside the loop; its placeholder phi in the
    // condition block must fold away.
    let module = compile(
        "int main() { int i; int y; int s; i = 0; y = 7; s = 0; \
         while (i < 3) { s = s + y; i = i + 1; } return s; }",
    );
    let func = module.get_function("main").expect("main emitted");
    let cond = find_block(func, "while.cond");
    let body = find_block(func, "while.body");
    assert_eq!(phis_in(func, cond).len(), 2, "phis for i and s only");
    assert_eq!(phis_in(func, body).len(), 0);
}

#[test]
fn if_without_else_branches_to_the_join() {
    let module = compile(
        "int main() { int x; x = 1; if (x > 0) x = 2; return x; }",
    );
    let func = module.get_function("main").expect("main emitted");
    let end = find_block(func, "if.end");
    // Entry (condition false) and the then arm both reach the join, so
    // the rewritten x merges there.
    assert_eq!(func.block(end).preds.len(), 2);
    assert_eq!(phis_in(func, end).len(), 1);
    assert_eq!(verify::verify_function(func), Vec::<String>::new());
}

#[test]
fn short_circuit_and_evaluates_rhs_in_its_own_block() {
    // Scenario: the division must not execute when a == 0, so it may
    // only appear in the right-hand-side block of the &&.
    let module = compile(
        "int main() { int a; a = 0; if (a != 0 && 1 / a > 0) return 1; return 0; }",
    );
    let func = module.get_function("main").expect("main emitted");

    let rhs = find_block(func, "and.rhs");
    let sdiv_in_rhs = func
        .block(rhs)
        .insts
        .iter()
        .filter_map(|&id| func.inst(id))
        .any(|inst| inst.op == Opcode::SDiv);
    assert!(sdiv_in_rhs, "1 / a belongs to the rhs block");
    assert_eq!(count_op(func, |op| *op == Opcode::SDiv), 1);

    // The join merges the short-circuit constant with the rhs value.
    let end = find_block(func, "and.end");
    assert_eq!(phis_in(func, end).len(), 1);
    assert_eq!(verify::verify_function(func), Vec::<String>::new());
}

#[test]
fn char_reads_widen_and_int_stores_narrow() {
    // Scenario: 65 is stored into the char as an i8 constant; reading c
    // for the addition widens it back to i32.
    let module = compile("int main() { char c; int i; c = 65; i = c + 1; return i; }");
    let func = module.get_function("main").expect("main emitted");

    let mut saw_sext_of_65 = false;
    for &block in func.blocks() {
        for &id in &func.block(block).insts {
            let inst = match func.inst(id) {
                Some(inst) => inst,
                None => continue,
            };
            if inst.op == Opcode::Sext {
                if let ValueKind::ConstInt { ty, value } = func.value(inst.operands[0]) {
                    saw_sext_of_65 = *value == 65 && ty.bits() == Some(8);
                }
            }
        }
    }
    assert!(saw_sext_of_65, "the char read widens the i8 65 to i32");
    assert_eq!(count_op(func, |op| *op == Opcode::Add), 1);
}

#[test]
fn non_constant_char_assignment_truncates() {
    let module = compile("int main() { char c; int i; i = 300; c = i + 1; return c; }");
    let func = module.get_function("main").expect("main emitted");
    assert_eq!(count_op(func, |op| *op == Opcode::Trunc), 1);
}

#[test]
fn arrays_stay_memory_backed() {
    let module = compile(
        "int main() { int a[4]; int i; i = 0; a[0] = 5; \
         while (i < 4) { a[i] = i; i = i + 1; } return a[3]; }",
    );
    let func = module.get_function("main").expect("main emitted");

    // One alloca, front-loaded into the entry block.
    let entry = func.entry();
    let allocas: Vec<_> = func
        .block(entry)
        .insts
        .iter()
        .filter_map(|&id| func.inst(id))
        .filter(|inst| inst.op == Opcode::Alloca)
        .collect();
    assert_eq!(allocas.len(), 1);

    assert!(count_op(func, |op| matches!(*op, Opcode::Store)) >= 2);
    assert!(count_op(func, |op| matches!(*op, Opcode::Load)) >= 1);
    assert_eq!(verify::verify_function(func), Vec::<String>::new());
}

#[test]
fn string_initializer_memcpys_from_a_global() {
    let module = compile("int main() { char s[] = \"hi\"; printf(s); return 0; }");
    assert_eq!(module.globals.len(), 1);
    assert_eq!(module.globals[0].init, b"hi\0");
    assert_eq!(module.globals[0].align, 1);

    let func = module.get_function("main").expect("main emitted");
    assert_eq!(count_op(func, |op| matches!(*op, Opcode::MemCpy { .. })), 1);

    // printf was used, so the module declares it as a vararg extern.
    assert_eq!(module.decls.len(), 1);
    assert_eq!(module.decls[0].name, "printf");
    assert!(module.decls[0].vararg);
}

#[test]
fn array_parameters_use_the_incoming_pointer() {
    let module = compile(
        "int first(int v[]) { return v[0]; }\n\
         int main() { int a[2]; a[0] = 1; a[1] = 2; return first(&a[0]); }",
    );
    let func = module.get_function("first").expect("first emitted");
    // No alloca for the parameter; the argument itself is the base.
    assert_eq!(count_op(func, |op| matches!(*op, Opcode::Alloca)), 0);
    assert_eq!(count_op(func, |op| matches!(*op, Opcode::Load)), 1);
}

#[test]
fn both_arms_returning_leaves_no_live_join() {
    let module = compile("int main() { int x; x = 5; if (x > 4) return 1; else return 0; }");
    let func = module.get_function("main").expect("main emitted");
    // The join block exists but nothing branches to it.
    let end = find_block(func, "if.end");
    assert_eq!(func.block(end).preds.len(), 0);
    assert_eq!(verify::verify_function(func), Vec::<String>::new());
}
