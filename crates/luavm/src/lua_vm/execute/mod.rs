/*----------------------------------------------------------------------
  Dispatch loop

  One loop serves every script frame of a thread. Calls, returns, tail
  calls and metamethod handlers only push or pop CallInfo entries and jump
  back to 'startfunc, which reloads the function context from the top
  frame. The Rust stack grows only when native code calls back into
  scripts (`LuaState::call`).

  The pc of the running frame is written back to its CallInfo before each
  instruction executes, so errors are located and frames resume correctly
  after a nested call or a yield.
----------------------------------------------------------------------*/

mod call;
mod closure_handler;
pub(crate) mod helper;
mod metamethod;
mod return_handler;
mod table_ops;

use crate::lua_value::{LuaTable, LuaUpvalue, LuaValue};
use crate::lua_vm::{Instruction, LuaError, LuaResult, LuaState, OpCode};

use call::{handle_call, handle_tailcall};
use closure_handler::{handle_closure, handle_vararg};
use helper::{arith, bitwise, compare_error_message, concat_piece, fb2int, is_bitwise, raw_len};
use metamethod::arith_tm;
use return_handler::handle_return;
use table_ops::{get_table, set_list, set_table};

/// What the dispatch loop does after an instruction that may enter a call
pub enum FrameAction {
    /// Keep running the current frame
    Continue,
    /// A script frame was pushed; reload context
    StartFunc,
    /// A native yielded; leave the loop with all frames intact
    Yield,
}

impl FrameAction {
    #[inline]
    pub(crate) fn after_call(l: &LuaState, pushed: bool) -> Self {
        if pushed {
            FrameAction::StartFunc
        } else if l.yielding {
            FrameAction::Yield
        } else {
            FrameAction::Continue
        }
    }
}

#[inline(always)]
fn upvalue(upvalues: &[std::rc::Rc<LuaUpvalue>], index: usize) -> LuaResult<&LuaUpvalue> {
    upvalues
        .get(index)
        .map(|uv| uv.as_ref())
        .ok_or_else(|| LuaError::InvalidOperation(format!("no upvalue {}", index)))
}

/// Run script frames until the frame stack is back at `stop_depth`
/// (or a native yields).
pub fn lua_execute(l: &mut LuaState, stop_depth: usize) -> LuaResult<()> {
    'startfunc: loop {
        if l.call_stack.len() <= stop_depth {
            return Ok(());
        }
        let (func, base, mut pc) = match l.call_stack.last() {
            Some(ci) => match &ci.func {
                LuaValue::Function(f) => (f.clone(), ci.base, ci.pc),
                _ => {
                    return Err(LuaError::InvalidOperation(
                        "dispatch entered on a native frame".to_string(),
                    ));
                }
            },
            None => return Ok(()),
        };
        let code = &func.chunk.code;
        let constants = &func.chunk.constants;

        macro_rules! reg {
            ($i:expr) => {
                l.stack_get(base + ($i) as usize)
            };
        }
        macro_rules! set_reg {
            ($i:expr, $v:expr) => {{
                let value = $v;
                l.stack_set(base + ($i) as usize, value);
            }};
        }
        macro_rules! konst {
            ($i:expr) => {
                constants.get(($i) as usize).cloned().unwrap_or_default()
            };
        }
        macro_rules! rk {
            ($x:expr) => {{
                let x = $x;
                if Instruction::is_k(x) {
                    konst!(Instruction::rk_index(x))
                } else {
                    reg!(x)
                }
            }};
        }
        macro_rules! jump {
            ($sbx:expr) => {
                pc = (pc as i64 + ($sbx) as i64) as usize
            };
        }
        macro_rules! frame_action {
            ($label:lifetime, $action:expr) => {
                match $action {
                    FrameAction::Continue => {}
                    FrameAction::StartFunc => continue $label,
                    FrameAction::Yield => return Ok(()),
                }
            };
        }
        macro_rules! frame_top {
            () => {
                l.current_frame().map_or(l.stack_top, |ci| ci.top)
            };
        }

        loop {
            let Some(&instr) = code.get(pc) else {
                return Err(LuaError::InvalidOperation(format!(
                    "pc {} past the end of the code",
                    pc
                )));
            };
            pc += 1;
            if let Some(ci) = l.call_stack.last_mut() {
                ci.pc = pc;
            }
            let Some(op) = instr.get_opcode() else {
                return Err(LuaError::InvalidOperation(format!(
                    "invalid instruction {:#010x}",
                    instr.as_u32()
                )));
            };
            let a = instr.get_a() as usize;

            match op {
                OpCode::Move => set_reg!(a, reg!(instr.get_b())),
                OpCode::LoadK => set_reg!(a, konst!(instr.get_bx())),
                OpCode::LoadKX => {
                    let Some(extra) = code.get(pc) else {
                        return Err(LuaError::InvalidOperation(
                            "LOADKX without EXTRAARG".to_string(),
                        ));
                    };
                    pc += 1;
                    set_reg!(a, konst!(extra.get_ax()));
                }
                OpCode::LoadBool => {
                    set_reg!(a, LuaValue::boolean(instr.get_b() != 0));
                    if instr.get_c() != 0 {
                        pc += 1;
                    }
                }
                OpCode::LoadNil => {
                    let b = instr.get_b() as usize;
                    l.clear_range(base + a, base + a + b + 1);
                }
                OpCode::GetUpval => {
                    let value = upvalue(&func.upvalues, instr.get_b() as usize)?.get();
                    set_reg!(a, value);
                }
                OpCode::GetTabUp => {
                    let table = upvalue(&func.upvalues, instr.get_b() as usize)?.get();
                    let key = rk!(instr.get_c());
                    frame_action!('startfunc, get_table(l, table, key, base + a)?);
                }
                OpCode::GetTable => {
                    let table = reg!(instr.get_b());
                    let key = rk!(instr.get_c());
                    frame_action!('startfunc, get_table(l, table, key, base + a)?);
                }
                OpCode::SetTabUp => {
                    let table = upvalue(&func.upvalues, a)?.get();
                    let key = rk!(instr.get_b());
                    let value = rk!(instr.get_c());
                    frame_action!('startfunc, set_table(l, table, key, value)?);
                }
                OpCode::SetUpval => {
                    let value = reg!(a);
                    upvalue(&func.upvalues, instr.get_b() as usize)?.set(value);
                }
                OpCode::SetTable => {
                    let table = reg!(a);
                    let key = rk!(instr.get_b());
                    let value = rk!(instr.get_c());
                    frame_action!('startfunc, set_table(l, table, key, value)?);
                }
                OpCode::NewTable => {
                    let table = LuaTable::new(fb2int(instr.get_b()), fb2int(instr.get_c()));
                    set_reg!(a, LuaValue::table(table));
                }
                OpCode::Self_ => {
                    let obj = reg!(instr.get_b());
                    let key = rk!(instr.get_c());
                    set_reg!(a + 1, obj.clone());
                    frame_action!('startfunc, get_table(l, obj, key, base + a)?);
                }
                OpCode::Add
                | OpCode::Sub
                | OpCode::Mul
                | OpCode::Mod
                | OpCode::Pow
                | OpCode::Div
                | OpCode::IDiv
                | OpCode::BAnd
                | OpCode::BOr
                | OpCode::BXor
                | OpCode::Shl
                | OpCode::Shr => {
                    let left = rk!(instr.get_b());
                    let right = rk!(instr.get_c());
                    let result = if is_bitwise(op) {
                        match (left.to_integer(), right.to_integer()) {
                            (Some(x), Some(y)) => bitwise(op, x, y).map(|r| r as f64),
                            _ => None,
                        }
                    } else {
                        match (left.to_number(), right.to_number()) {
                            (Some(x), Some(y)) => arith(op, x, y),
                            _ => None,
                        }
                    };
                    match result {
                        Some(n) => set_reg!(a, LuaValue::Number(n)),
                        None => frame_action!('startfunc, arith_tm(l, op, left, right, base + a)?),
                    }
                }
                OpCode::Unm => {
                    let operand = reg!(instr.get_b());
                    match operand.to_number() {
                        Some(n) => set_reg!(a, LuaValue::Number(-n)),
                        None => frame_action!('startfunc, arith_tm(l, op, operand.clone(), operand, base + a)?),
                    }
                }
                OpCode::BNot => {
                    let operand = reg!(instr.get_b());
                    match operand.to_integer() {
                        Some(i) => set_reg!(a, LuaValue::integer(!i)),
                        None => frame_action!('startfunc, arith_tm(l, op, operand.clone(), operand, base + a)?),
                    }
                }
                OpCode::Not => {
                    let operand = reg!(instr.get_b());
                    set_reg!(a, LuaValue::boolean(operand.is_falsy()));
                }
                OpCode::Len => {
                    let operand = reg!(instr.get_b());
                    match raw_len(&operand) {
                        Some(n) => set_reg!(a, LuaValue::integer(n as i64)),
                        None => {
                            return Err(l.type_error(format!(
                                "attempt to get length of a {} value",
                                operand.type_name()
                            )));
                        }
                    }
                }
                OpCode::Concat => {
                    let (b, c) = (instr.get_b(), instr.get_c());
                    let mut out = String::new();
                    for i in b..=c {
                        let piece = reg!(i);
                        if !concat_piece(&mut out, &piece) {
                            return Err(l.type_error(format!(
                                "attempt to concatenate a {} value",
                                piece.type_name()
                            )));
                        }
                    }
                    set_reg!(a, LuaValue::from(out));
                }
                OpCode::Jmp => {
                    if a > 0 {
                        l.close_upvalues(base + a - 1);
                    }
                    jump!(instr.get_sbx());
                }
                OpCode::Eq => {
                    let equal = rk!(instr.get_b()) == rk!(instr.get_c());
                    if equal != (a != 0) {
                        pc += 1;
                    }
                }
                OpCode::Lt | OpCode::Le => {
                    let left = rk!(instr.get_b());
                    let right = rk!(instr.get_c());
                    let outcome = if op == OpCode::Lt {
                        helper::less_than(&left, &right)
                    } else {
                        helper::less_equal(&left, &right)
                    };
                    let Some(holds) = outcome else {
                        return Err(l.type_error(compare_error_message(&left, &right)));
                    };
                    if holds != (a != 0) {
                        pc += 1;
                    }
                }
                OpCode::Test => {
                    if reg!(a).is_truthy() != (instr.get_c() != 0) {
                        pc += 1;
                    }
                }
                OpCode::TestSet => {
                    let value = reg!(instr.get_b());
                    if value.is_truthy() != (instr.get_c() != 0) {
                        pc += 1;
                    } else {
                        set_reg!(a, value);
                    }
                }
                OpCode::Call => {
                    let (b, c) = (instr.get_b() as usize, instr.get_c() as usize);
                    frame_action!('startfunc, handle_call(l, base, a, b, c)?);
                }
                OpCode::TailCall => {
                    frame_action!('startfunc, handle_tailcall(l, base, a, instr.get_b() as usize)?);
                }
                OpCode::Return => {
                    handle_return(l, base, a, instr.get_b() as usize);
                    continue 'startfunc;
                }
                OpCode::ForLoop => {
                    let (Some(idx), Some(limit), Some(step)) = (
                        reg!(a).as_number(),
                        reg!(a + 1).as_number(),
                        reg!(a + 2).as_number(),
                    ) else {
                        return Err(l.type_error("'for' loop state is not numeric"));
                    };
                    let idx = idx + step;
                    let continues = if step > 0.0 { idx <= limit } else { limit <= idx };
                    if continues {
                        jump!(instr.get_sbx());
                        set_reg!(a, LuaValue::Number(idx));
                        set_reg!(a + 3, LuaValue::Number(idx));
                    }
                }
                OpCode::ForPrep => {
                    let Some(init) = reg!(a).to_number() else {
                        return Err(l.type_error("'for' initial value must be a number"));
                    };
                    let Some(limit) = reg!(a + 1).to_number() else {
                        return Err(l.type_error("'for' limit must be a number"));
                    };
                    let Some(step) = reg!(a + 2).to_number() else {
                        return Err(l.type_error("'for' step must be a number"));
                    };
                    set_reg!(a, LuaValue::Number(init - step));
                    set_reg!(a + 1, LuaValue::Number(limit));
                    set_reg!(a + 2, LuaValue::Number(step));
                    jump!(instr.get_sbx());
                }
                OpCode::TForCall => {
                    // R(A+3), ..., R(A+2+C) := R(A)(R(A+1), R(A+2))
                    let cb = base + a + 3;
                    l.ensure_stack(cb + 3)?;
                    for i in 0..3 {
                        let value = reg!(a + i);
                        l.stack_set(cb + i, value);
                    }
                    l.stack_top = cb + 3;
                    let nresults = instr.get_c() as i32;
                    let pushed = l.precall(cb, 2, cb, nresults)?;
                    frame_action!('startfunc, FrameAction::after_call(l, pushed));
                }
                OpCode::TForLoop => {
                    let control = reg!(a + 1);
                    if !control.is_nil() {
                        set_reg!(a, control);
                        jump!(instr.get_sbx());
                    }
                }
                OpCode::SetList => {
                    let ra = base + a;
                    let n = match instr.get_b() as usize {
                        0 => l.stack_top.saturating_sub(ra + 1),
                        b => b,
                    };
                    let block = match instr.get_c() as usize {
                        0 => {
                            let Some(extra) = code.get(pc) else {
                                return Err(LuaError::InvalidOperation(
                                    "SETLIST without EXTRAARG".to_string(),
                                ));
                            };
                            pc += 1;
                            extra.get_ax() as usize
                        }
                        c => c,
                    };
                    set_list(l, ra, n, block)?;
                    l.stack_top = frame_top!();
                }
                OpCode::Closure => {
                    let closure = handle_closure(l, &func, base, instr.get_bx() as usize)?;
                    set_reg!(a, closure);
                }
                OpCode::Vararg => handle_vararg(l, base, a, instr.get_b() as usize)?,
                OpCode::ExtraArg => {
                    return Err(LuaError::InvalidOperation(
                        "EXTRAARG executed as an instruction".to_string(),
                    ));
                }
            }
        }
    }
}
