// Bytecode listing, one section per prototype

use std::fmt::Write;

use super::Chunk;
use crate::lua_vm::{Instruction, OpCode, OpMode};

/// Render `chunk` and its nested prototypes as text
pub fn dump_chunk(chunk: &Chunk) -> String {
    let mut out = String::new();
    dump_proto(&mut out, chunk, "main", 0);
    out
}

fn dump_proto(out: &mut String, chunk: &Chunk, name: &str, depth: usize) {
    let indent = "  ".repeat(depth);

    let _ = writeln!(
        out,
        "{}=== {} <{}:{},{}> ===",
        indent,
        name,
        chunk.source(),
        chunk.linedefined,
        chunk.lastlinedefined
    );
    let _ = writeln!(
        out,
        "{}params: {}{}, max_stack: {}, upvalues: {}, constants: {}, functions: {}",
        indent,
        chunk.param_count,
        if chunk.is_vararg { "+" } else { "" },
        chunk.max_stack_size,
        chunk.upvalue_descs.len(),
        chunk.constants.len(),
        chunk.child_protos.len()
    );

    for (pc, instr) in chunk.code.iter().enumerate() {
        let line = chunk
            .line_at(pc)
            .map_or_else(|| "-".to_string(), |l| l.to_string());
        let _ = write!(out, "{}{:4} [{}] {}", indent, pc + 1, line, instr);
        if let Some(note) = annotate(chunk, pc) {
            let _ = write!(out, "\t; {}", note);
        }
        out.push('\n');
    }

    if !chunk.constants.is_empty() {
        let _ = writeln!(out, "{}constants ({}):", indent, chunk.constants.len());
        for (i, k) in chunk.constants.iter().enumerate() {
            let _ = writeln!(out, "{}  {} = {:?}", indent, i, k);
        }
    }

    if !chunk.locals.is_empty() {
        let _ = writeln!(out, "{}locals ({}):", indent, chunk.locals.len());
        for (i, local) in chunk.locals.iter().enumerate() {
            let _ = writeln!(
                out,
                "{}  {} {} {}-{}",
                indent,
                i,
                local.name,
                local.startpc + 1,
                local.endpc + 1
            );
        }
    }

    if !chunk.upvalue_descs.is_empty() {
        let _ = writeln!(out, "{}upvalues ({}):", indent, chunk.upvalue_descs.len());
        for (i, uv) in chunk.upvalue_descs.iter().enumerate() {
            let kind = if uv.is_local { "local" } else { "upvalue" };
            let _ = writeln!(out, "{}  {} {} {} {}", indent, i, uv.name, kind, uv.index);
        }
    }

    for (i, child) in chunk.child_protos.iter().enumerate() {
        dump_proto(out, child, &format!("function <PROTO[{}]>", i), depth + 1);
    }
}

/// Constant values, upvalue names and jump targets next to an instruction
fn annotate(chunk: &Chunk, pc: usize) -> Option<String> {
    let instr = chunk.code[pc];
    let op = instr.get_opcode()?;
    let konst = |k: u32| {
        chunk
            .constants
            .get(k as usize)
            .map_or_else(|| "?".to_string(), |v| format!("{:?}", v))
    };
    let upname = |i: u32| {
        chunk
            .upvalue_descs
            .get(i as usize)
            .map_or("?", |uv| uv.name.as_str())
            .to_string()
    };
    match op {
        OpCode::LoadK => Some(konst(instr.get_bx())),
        OpCode::GetUpval | OpCode::SetUpval => Some(upname(instr.get_b())),
        OpCode::GetTabUp => Some(format!(
            "{} {}",
            upname(instr.get_b()),
            rk_note(&konst, instr.get_c())
        )),
        OpCode::SetTabUp => Some(format!(
            "{} {} {}",
            upname(instr.get_a()),
            rk_note(&konst, instr.get_b()),
            rk_note(&konst, instr.get_c())
        )),
        OpCode::Closure => Some(format!("PROTO[{}]", instr.get_bx())),
        _ if op.get_mode() == OpMode::IAsBx => {
            Some(format!("to {}", pc as i64 + 2 + instr.get_sbx() as i64))
        }
        _ if op.uses_rk() => {
            let (b, c) = (instr.get_b(), instr.get_c());
            let notes: Vec<String> = [b, c]
                .into_iter()
                .filter(|x| Instruction::is_k(*x))
                .map(|x| rk_note(&konst, x))
                .collect();
            (!notes.is_empty()).then(|| notes.join(" "))
        }
        _ => None,
    }
}

fn rk_note(konst: &dyn Fn(u32) -> String, x: u32) -> String {
    if Instruction::is_k(x) {
        konst(Instruction::rk_index(x))
    } else {
        "-".to_string()
    }
}
