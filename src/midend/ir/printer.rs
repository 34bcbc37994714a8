//! Textual IR writer. The output is LLVM-flavored and meant for humans
//! and tests; the serialized (`-emit-bc`) form is the serde tree.

use std::collections::HashMap;
use std::fmt::Write;

use super::function::Function;
use super::module::Module;
use super::types::IrType;
use super::value::{Opcode, ValueId, ValueKind};

pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; ModuleID = '{}'", module.name);

    if !module.globals.is_empty() {
        out.push('\n');
        for global in &module.globals {
            let _ = writeln!(
                out,
                "@{} = private{} constant {} c\"{}\", align {}",
                global.name,
                if global.unnamed_addr {
                    " unnamed_addr"
                } else {
                    ""
                },
                global.ty,
                escape_bytes(&global.init),
                global.align
            );
        }
    }

    for decl in &module.decls {
        out.push('\n');
        let mut args: Vec<String> = decl.arg_tys.iter().map(|ty| ty.to_string()).collect();
        if decl.vararg {
            args.push("...".to_string());
        }
        let _ = writeln!(
            out,
            "declare {} @{}({})",
            decl.ret_ty,
            decl.name,
            args.join(", ")
        );
    }

    for func in &module.funcs {
        out.push('\n');
        out.push_str(&print_function(func));
    }

    out
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::new();
    for &b in bytes {
        match b {
            b'"' | b'\\' => {
                let _ = write!(out, "\\{:02X}", b);
            }
            0x20..=0x7e => out.push(b as char),
            other => {
                let _ = write!(out, "\\{:02X}", other);
            }
        }
    }
    out
}

pub fn print_function(func: &Function) -> String {
    let mut out = String::new();
    let names = number_values(func);

    let args: Vec<String> = func
        .args()
        .iter()
        .map(|&arg| {
            format!(
                "{} {}",
                func.value(arg).ty(),
                names.get(&arg).expect("argument is named")
            )
        })
        .collect();
    let _ = writeln!(
        out,
        "define {} @{}({}) {{",
        func.ret_ty,
        func.name,
        args.join(", ")
    );

    for (i, &block) in func.blocks().iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "{}:", func.block(block).name);
        for &inst_id in &func.block(block).insts {
            let _ = writeln!(out, "  {}", print_inst(func, &names, inst_id));
        }
    }

    out.push_str("}\n");
    out
}

/// Assigns `%N` names to instruction results in layout order; arguments
/// keep their source names.
fn number_values(func: &Function) -> HashMap<ValueId, String> {
    let mut names = HashMap::new();
    for &arg in func.args() {
        if let ValueKind::Argument { name, .. } = func.value(arg) {
            names.insert(arg, format!("%{}", name));
        }
    }
    let mut next = 0usize;
    for &block in func.blocks() {
        for &inst_id in &func.block(block).insts {
            if let Some(inst) = func.inst(inst_id) {
                if inst.ty != IrType::Void {
                    names.insert(inst_id, format!("%{}", next));
                    next += 1;
                }
            }
        }
    }
    names
}

fn operand(func: &Function, names: &HashMap<ValueId, String>, id: ValueId) -> String {
    match func.value(id) {
        ValueKind::ConstInt { value, .. } => value.to_string(),
        ValueKind::Undef { .. } => "undef".to_string(),
        ValueKind::Global { name, .. } => format!("@{}", name),
        _ => names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| "%<detached>".to_string()),
    }
}

fn typed_operand(func: &Function, names: &HashMap<ValueId, String>, id: ValueId) -> String {
    format!("{} {}", func.value(id).ty(), operand(func, names, id))
}

fn print_inst(func: &Function, names: &HashMap<ValueId, String>, id: ValueId) -> String {
    let inst = match func.inst(id) {
        Some(inst) => inst,
        None => return "<non-inst>".to_string(),
    };
    let name = names.get(&id).cloned().unwrap_or_default();
    let op_name = |op: &Opcode| match op {
        Opcode::Add => "add",
        Opcode::Sub => "sub",
        Opcode::Mul => "mul",
        Opcode::SDiv => "sdiv",
        Opcode::SRem => "srem",
        Opcode::Zext => "zext",
        Opcode::Sext => "sext",
        Opcode::Trunc => "trunc",
        _ => "",
    };

    match &inst.op {
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::SDiv | Opcode::SRem => format!(
            "{} = {} {} {}, {}",
            name,
            op_name(&inst.op),
            inst.ty,
            operand(func, names, inst.operands[0]),
            operand(func, names, inst.operands[1])
        ),
        Opcode::ICmp(pred) => format!(
            "{} = icmp {} {} {}, {}",
            name,
            pred.text(),
            func.value(inst.operands[0]).ty(),
            operand(func, names, inst.operands[0]),
            operand(func, names, inst.operands[1])
        ),
        Opcode::Zext | Opcode::Sext | Opcode::Trunc => format!(
            "{} = {} {} to {}",
            name,
            op_name(&inst.op),
            typed_operand(func, names, inst.operands[0]),
            inst.ty
        ),
        Opcode::Select => format!(
            "{} = select {}, {}, {}",
            name,
            typed_operand(func, names, inst.operands[0]),
            typed_operand(func, names, inst.operands[1]),
            typed_operand(func, names, inst.operands[2])
        ),
        Opcode::GetElementPtr => {
            let base_ty = func.value(inst.operands[0]).ty();
            let pointee = base_ty.pointee().cloned().unwrap_or(IrType::I8);
            let indices: Vec<String> = inst.operands[1..]
                .iter()
                .map(|&idx| typed_operand(func, names, idx))
                .collect();
            format!(
                "{} = getelementptr inbounds {}, {}, {}",
                name,
                pointee,
                typed_operand(func, names, inst.operands[0]),
                indices.join(", ")
            )
        }
        Opcode::Alloca => {
            let allocated = inst.ty.pointee().cloned().unwrap_or(IrType::I8);
            format!("{} = alloca {}, align 8", name, allocated)
        }
        Opcode::Load => format!(
            "{} = load {}, {}",
            name,
            inst.ty,
            typed_operand(func, names, inst.operands[0])
        ),
        Opcode::Store => format!(
            "store {}, {}",
            typed_operand(func, names, inst.operands[0]),
            typed_operand(func, names, inst.operands[1])
        ),
        Opcode::Call { callee } => {
            let args: Vec<String> = inst
                .operands
                .iter()
                .map(|&arg| typed_operand(func, names, arg))
                .collect();
            if inst.ty == IrType::Void {
                format!("call void @{}({})", callee, args.join(", "))
            } else {
                format!("{} = call {} @{}({})", name, inst.ty, callee, args.join(", "))
            }
        }
        Opcode::MemCpy { len, align } => format!(
            "call void @llvm.memcpy({}, {}, i64 {}, align {})",
            typed_operand(func, names, inst.operands[0]),
            typed_operand(func, names, inst.operands[1]),
            len,
            align
        ),
        Opcode::Br { dest } => format!("br label %{}", func.block(*dest).name),
        Opcode::CondBr {
            true_dest,
            false_dest,
        } => format!(
            "br {}, label %{}, label %{}",
            typed_operand(func, names, inst.operands[0]),
            func.block(*true_dest).name,
            func.block(*false_dest).name
        ),
        Opcode::Ret => format!("ret {}", typed_operand(func, names, inst.operands[0])),
        Opcode::RetVoid => "ret void".to_string(),
        Opcode::Phi => {
            let entries: Vec<String> = inst
                .operands
                .iter()
                .zip(&inst.incoming)
                .map(|(&value, &pred)| {
                    format!(
                        "[ {}, %{} ]",
                        operand(func, names, value),
                        func.block(pred).name
                    )
                })
                .collect();
            format!("{} = phi {} {}", name, inst.ty, entries.join(", "))
        }
    }
}
