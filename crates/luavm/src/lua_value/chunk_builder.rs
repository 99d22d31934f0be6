//! Fluent builder for function prototypes.
//!
//! The engine consumes prototypes produced elsewhere; `ChunkBuilder` is how a
//! host (or a test) assembles one by hand.
//!
//! # Example
//!
//! ```ignore
//! // return 1 + 2
//! let mut b = ChunkBuilder::new("=sum");
//! let one = b.rk_constant(LuaValue::integer(1));
//! let two = b.rk_constant(LuaValue::integer(2));
//! b.abc(OpCode::Add, 0, one, two);
//! b.abc(OpCode::Return, 0, 2, 0);
//! let chunk = b.build();
//! ```

use std::rc::Rc;

use smol_str::SmolStr;

use super::{Chunk, LocVar, LuaValue, UpvalueDesc};
use crate::lua_vm::{Instruction, OpCode};

pub struct ChunkBuilder {
    chunk: Chunk,
    line: u32,
    explicit_stack: bool,
}

impl ChunkBuilder {
    pub fn new(source: &str) -> Self {
        ChunkBuilder {
            chunk: Chunk {
                source_name: Some(SmolStr::new(source)),
                ..Chunk::default()
            },
            line: 1,
            explicit_stack: false,
        }
    }

    /// Number of fixed parameters
    pub fn params(mut self, n: usize) -> Self {
        self.chunk.param_count = n;
        self
    }

    pub fn vararg(mut self) -> Self {
        self.chunk.is_vararg = true;
        self
    }

    /// Register window size; computed from the code when not given
    pub fn max_stack(mut self, n: usize) -> Self {
        self.chunk.max_stack_size = n;
        self.explicit_stack = true;
        self
    }

    pub fn lines(mut self, linedefined: u32, lastlinedefined: u32) -> Self {
        self.chunk.linedefined = linedefined;
        self.chunk.lastlinedefined = lastlinedefined;
        self
    }

    /// Source line recorded for subsequently emitted instructions
    pub fn line(&mut self, line: u32) -> &mut Self {
        self.line = line;
        self
    }

    /// Add (or reuse) a constant and return its index
    pub fn constant(&mut self, value: LuaValue) -> u32 {
        if let Some(pos) = self.chunk.constants.iter().position(|k| *k == value) {
            return pos as u32;
        }
        self.chunk.constants.push(value);
        (self.chunk.constants.len() - 1) as u32
    }

    /// Constant as an RK operand
    pub fn rk_constant(&mut self, value: LuaValue) -> u32 {
        Instruction::rk_constant(self.constant(value))
    }

    pub fn emit(&mut self, instruction: Instruction) -> usize {
        self.chunk.code.push(instruction);
        self.chunk.line_info.push(self.line);
        self.chunk.code.len() - 1
    }

    pub fn abc(&mut self, op: OpCode, a: u32, b: u32, c: u32) -> usize {
        self.emit(Instruction::create_abc(op, a, b, c))
    }

    pub fn abx(&mut self, op: OpCode, a: u32, bx: u32) -> usize {
        self.emit(Instruction::create_abx(op, a, bx))
    }

    pub fn asbx(&mut self, op: OpCode, a: u32, sbx: i32) -> usize {
        self.emit(Instruction::create_asbx(op, a, sbx))
    }

    pub fn ax(&mut self, op: OpCode, ax: u32) -> usize {
        self.emit(Instruction::create_ax(op, ax))
    }

    /// LOADK, switching to LOADKX + EXTRAARG when the index does not fit Bx
    pub fn load_constant(&mut self, reg: u32, value: LuaValue) -> usize {
        let k = self.constant(value);
        if k <= Instruction::MAX_BX {
            self.abx(OpCode::LoadK, reg, k)
        } else {
            let pc = self.abx(OpCode::LoadKX, reg, 0);
            self.ax(OpCode::ExtraArg, k);
            pc
        }
    }

    /// Pc the next instruction will get
    pub fn pc(&self) -> usize {
        self.chunk.code.len()
    }

    /// Point the sBx jump at `pc` to `target`
    pub fn patch_jump(&mut self, pc: usize, target: usize) {
        let offset = target as i32 - (pc as i32 + 1);
        self.chunk.code[pc].set_sbx(offset);
    }

    /// Declare an upvalue; returns its index
    pub fn upvalue(&mut self, name: &str, is_local: bool, index: u32) -> u32 {
        self.chunk.upvalue_descs.push(UpvalueDesc {
            name: SmolStr::new(name),
            is_local,
            index,
        });
        (self.chunk.upvalue_descs.len() - 1) as u32
    }

    /// Add a nested prototype; returns its index for CLOSURE
    pub fn child(&mut self, chunk: Chunk) -> u32 {
        self.chunk.child_protos.push(Rc::new(chunk));
        (self.chunk.child_protos.len() - 1) as u32
    }

    pub fn local(&mut self, name: &str, startpc: u32, endpc: u32) -> &mut Self {
        self.chunk.locals.push(LocVar {
            name: SmolStr::new(name),
            startpc,
            endpc,
        });
        self
    }

    /// Finish the prototype. A trailing `RETURN 0 1` is appended when the code
    /// does not already end in a return.
    pub fn build(mut self) -> Chunk {
        let ends_in_return = self
            .chunk
            .code
            .last()
            .and_then(|i| i.get_opcode())
            .is_some_and(|op| op == OpCode::Return);
        if !ends_in_return {
            self.abc(OpCode::Return, 0, 1, 0);
        }
        if !self.explicit_stack {
            self.chunk.max_stack_size = self.computed_stack_size();
        }
        self.chunk
    }

    /// Highest register the code can touch, plus one
    fn computed_stack_size(&self) -> usize {
        let mut size = self.chunk.param_count.max(2);
        for i in &self.chunk.code {
            let Some(op) = i.get_opcode() else { continue };
            let a = i.get_a() as usize;
            let b = i.get_b() as usize;
            let c = i.get_c() as usize;
            let top = match op {
                OpCode::Jmp | OpCode::ExtraArg | OpCode::SetTabUp => 0,
                OpCode::Eq | OpCode::Lt | OpCode::Le | OpCode::Test | OpCode::SetUpval => a + 1,
                OpCode::LoadNil => a + b + 1,
                OpCode::Self_ => a + 2,
                OpCode::Call => a + b.max(c).max(1),
                OpCode::TailCall => a + b.max(1),
                OpCode::Return | OpCode::Vararg | OpCode::SetList => a + b.max(1),
                OpCode::ForLoop | OpCode::ForPrep => a + 4,
                OpCode::TForCall => a + 3 + c.max(1),
                OpCode::TForLoop => a + 2,
                _ => a + 1,
            };
            size = size.max(top).max(operand_top(op, b, c));
        }
        size
    }
}

/// One past the highest register read through the B or C field
fn operand_top(op: OpCode, b: usize, c: usize) -> usize {
    let rk = |x: usize| if Instruction::is_k(x as u32) { 0 } else { x + 1 };
    match op {
        OpCode::Move
        | OpCode::Unm
        | OpCode::Not
        | OpCode::Len
        | OpCode::BNot
        | OpCode::TestSet => b + 1,
        OpCode::Concat => c + 1,
        OpCode::GetTable | OpCode::Self_ => (b + 1).max(rk(c)),
        OpCode::GetTabUp => rk(c),
        _ if op.uses_rk() => rk(b).max(rk(c)),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_size(emit: impl FnOnce(&mut ChunkBuilder)) -> usize {
        let mut b = ChunkBuilder::new("=t");
        emit(&mut b);
        b.build().max_stack_size
    }

    #[test]
    fn test_stack_covers_source_registers() {
        assert_eq!(stack_size(|b| { b.abc(OpCode::Move, 0, 5, 0); }), 6);
        assert_eq!(stack_size(|b| { b.abc(OpCode::Concat, 0, 1, 7); }), 8);
        assert_eq!(stack_size(|b| { b.abc(OpCode::TestSet, 0, 4, 0); }), 5);
        assert_eq!(stack_size(|b| { b.abc(OpCode::GetTable, 0, 3, 6); }), 7);
        assert_eq!(stack_size(|b| { b.abc(OpCode::SetUpval, 4, 0, 0); }), 5);
    }

    #[test]
    fn test_constant_operands_take_no_registers() {
        let size = stack_size(|b| {
            let k = b.rk_constant(LuaValue::integer(1));
            b.abc(OpCode::Add, 0, 3, k);
        });
        assert_eq!(size, 4);
        let size = stack_size(|b| {
            let k = b.rk_constant(LuaValue::integer(1));
            b.abc(OpCode::Eq, 0, k, k);
        });
        assert_eq!(size, 2);
    }

    #[test]
    fn test_explicit_stack_is_kept() {
        let mut b = ChunkBuilder::new("=t").max_stack(3);
        b.abc(OpCode::Move, 0, 9, 0);
        assert_eq!(b.build().max_stack_size, 3);
    }
}
