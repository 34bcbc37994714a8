use super::*;

fn const_i32(func: &mut Function, value: i64) -> ValueId {
    func.const_int(IrType::I32, value)
}

/// entry -> cond -> {body -> cond, end}
fn loop_function() -> (Function, BlockId, BlockId, BlockId, BlockId) {
    let mut func = Function::new("f", IrType::I32, &[("n".to_string(), IrType::I32)]);
    let entry = func.create_block("entry");
    let cond = func.create_block("while.cond");
    let body = func.create_block("while.body");
    let end = func.create_block("while.end");

    func.build_br(entry, cond);
    let n = func.args()[0];
    let zero = const_i32(&mut func, 0);
    let cmp = func.build_icmp(cond, Predicate::Slt, zero, n);
    func.build_cond_br(cond, cmp, body, end);
    func.build_br(body, cond);
    let ret = const_i32(&mut func, 0);
    func.build_ret(end, ret);

    (func, entry, cond, body, end)
}

#[test]
fn type_display() {
    assert_eq!(IrType::I32.to_string(), "i32");
    assert_eq!(IrType::ptr_to(IrType::I8).to_string(), "i8*");
    assert_eq!(
        IrType::array_of(IrType::I32, 4).to_string(),
        "[4 x i32]"
    );
}

#[test]
fn branches_record_predecessors() {
    let (func, entry, cond, body, _end) = loop_function();
    assert_eq!(func.block(cond).preds, vec![entry, body]);
    assert_eq!(func.successors(cond).len(), 2);
}

#[test]
fn dominators_of_a_loop() {
    let (func, entry, cond, body, end) = loop_function();
    let dom = DomTree::compute(&func);
    assert!(dom.dominates(entry, end));
    assert!(dom.dominates(cond, body));
    assert!(dom.dominates(cond, end));
    assert!(!dom.dominates(body, end));
    assert_eq!(dom.idom(cond), Some(entry));
    assert_eq!(dom.idom(body), Some(cond));
}

#[test]
fn loop_detection_finds_header_and_preheader() {
    let (func, entry, cond, body, _end) = loop_function();
    let dom = DomTree::compute(&func);
    let loops = LoopInfo::find(&func, &dom);
    assert_eq!(loops.loops().len(), 1);
    let l = &loops.loops()[0];
    assert_eq!(l.header, cond);
    assert!(l.contains(body));
    assert!(!l.contains(entry));
    assert_eq!(l.preheader, Some(entry));
    assert_eq!(loops.innermost(body), Some(0));
    assert_eq!(loops.innermost(entry), None);
}

#[test]
fn remove_predecessor_simplifies_single_entry_phis() {
    let mut func = Function::new("f", IrType::I32, &[]);
    let entry = func.create_block("entry");
    let left = func.create_block("left");
    let right = func.create_block("right");
    let join = func.create_block("join");
    let cond = func.const_int(IrType::I1, 1);
    func.build_cond_br(entry, cond, left, right);
    func.build_br(left, join);
    func.build_br(right, join);

    let one = const_i32(&mut func, 1);
    let two = const_i32(&mut func, 2);
    let phi = func.create_phi(join, IrType::I32);
    func.phi_add_incoming(phi, one, left);
    func.phi_add_incoming(phi, two, right);
    let ret = func.build_ret(join, phi);

    func.remove_predecessor(join, right);

    assert_eq!(func.block(join).preds, vec![left]);
    // The phi collapsed to its surviving value.
    assert!(!func.inst_attached(phi));
    assert_eq!(func.inst(ret).expect("ret").operands[0], one);
}

#[test]
fn move_before_terminator_relocates_instructions() {
    let (mut func, entry, _cond, body, _end) = loop_function();
    let five = const_i32(&mut func, 5);
    let six = const_i32(&mut func, 6);
    let mul = func.build_binary(body, Opcode::Mul, five, six);

    func.move_before_terminator(mul, entry);

    assert_eq!(func.inst(mul).expect("mul").block, entry);
    let entry_insts = &func.block(entry).insts;
    // In front of the branch, not after it.
    assert_eq!(entry_insts[entry_insts.len() - 2], mul);
    assert!(!func.block(body).insts.contains(&mul));
}

#[test]
fn printer_produces_llvm_flavored_text() {
    let (func, ..) = loop_function();
    let printed = printer::print_function(&func);
    assert!(printed.contains("define i32 @f(i32 %n)"), "{}", printed);
    assert!(printed.contains("while.cond:"), "{}", printed);
    assert!(
        printed.contains("br i1 %0, label %while.body, label %while.end"),
        "{}",
        printed
    );
    assert!(printed.contains("ret i32 0"), "{}", printed);
}

#[test]
fn verifier_accepts_the_loop_function() {
    let (func, ..) = loop_function();
    assert_eq!(verify::verify_function(&func), Vec::<String>::new());
}

#[test]
fn verifier_flags_a_missing_terminator() {
    let mut func = Function::new("f", IrType::Void, &[]);
    let entry = func.create_block("entry");
    let one = const_i32(&mut func, 1);
    let two = const_i32(&mut func, 2);
    func.build_binary(entry, Opcode::Add, one, two);
    let findings = verify::verify_function(&func);
    assert!(
        findings.iter().any(|f| f.contains("terminator")),
        "{:?}",
        findings
    );
}

#[test]
fn verifier_flags_a_use_before_definition() {
    let mut func = Function::new("f", IrType::I32, &[]);
    let entry = func.create_block("entry");
    let next = func.create_block("next");
    let one = const_i32(&mut func, 1);
    // Definition lives in `next`, but the use sits in `entry`.
    let add = func.build_binary(next, Opcode::Add, one, one);
    func.build_ret(entry, add);
    func.build_br(next, next);

    let findings = verify::verify_function(&func);
    assert!(
        findings.iter().any(|f| f.contains("not dominated")),
        "{:?}",
        findings
    );
}

#[test]
fn select_takes_the_type_of_its_arms() {
    let mut func = Function::new("f", IrType::I32, &[]);
    let entry = func.create_block("entry");
    let cond = func.const_int(IrType::I1, 1);
    let one = const_i32(&mut func, 1);
    let two = const_i32(&mut func, 2);
    let select = func.build_select(entry, cond, one, two);
    func.build_ret(entry, select);

    assert_eq!(*func.value(select).ty(), IrType::I32);
    let printed = printer::print_function(&func);
    assert!(printed.contains("select i1 1, i32 1, i32 2"), "{}", printed);
}

#[test]
fn module_serializes_to_json() {
    let (func, ..) = loop_function();
    let mut module = Module::new("main");
    module.funcs.push(func);
    let json = module.to_json().expect("serializes");
    assert!(json.contains("\"name\": \"main\""), "{}", json);
}
