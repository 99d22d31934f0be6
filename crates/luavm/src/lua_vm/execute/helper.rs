// Primitive operations used by the dispatch loop: number arithmetic, integer
// bitwise ops, raw ordering, concatenation and length.

use crate::lua_value::{LuaValue, format_number};
use crate::lua_vm::OpCode;

/// Floored modulo: the result takes the sign of the divisor
#[inline]
pub fn lua_fmod(a: f64, b: f64) -> f64 {
    let m = a % b;
    if (m > 0.0 && b < 0.0) || (m < 0.0 && b > 0.0) {
        m + b
    } else {
        m
    }
}

/// Floor division
#[inline]
pub fn lua_idiv(a: f64, b: f64) -> f64 {
    (a / b).floor()
}

/// Shift left by `n`; negative `n` shifts right. Shifts are logical and any
/// distance of 64 or more gives 0.
#[inline]
pub fn lua_shiftl(x: i64, n: i64) -> i64 {
    if n <= -64 || n >= 64 {
        0
    } else if n >= 0 {
        ((x as u64) << n) as i64
    } else {
        ((x as u64) >> (-n)) as i64
    }
}

/// Arithmetic opcode applied to two numbers
pub fn arith(op: OpCode, a: f64, b: f64) -> Option<f64> {
    Some(match op {
        OpCode::Add => a + b,
        OpCode::Sub => a - b,
        OpCode::Mul => a * b,
        OpCode::Div => a / b,
        OpCode::Mod => lua_fmod(a, b),
        OpCode::Pow => a.powf(b),
        OpCode::IDiv => lua_idiv(a, b),
        OpCode::Unm => -a,
        _ => return None,
    })
}

/// Bitwise opcode applied to two integers
pub fn bitwise(op: OpCode, a: i64, b: i64) -> Option<i64> {
    Some(match op {
        OpCode::BAnd => a & b,
        OpCode::BOr => a | b,
        OpCode::BXor => a ^ b,
        OpCode::Shl => lua_shiftl(a, b),
        OpCode::Shr => lua_shiftl(a, b.wrapping_neg()),
        OpCode::BNot => !a,
        _ => return None,
    })
}

#[inline]
pub fn is_bitwise(op: OpCode) -> bool {
    matches!(
        op,
        OpCode::BAnd | OpCode::BOr | OpCode::BXor | OpCode::Shl | OpCode::Shr | OpCode::BNot
    )
}

/// Raw `a < b`; None when the operands cannot be ordered
pub fn less_than(a: &LuaValue, b: &LuaValue) -> Option<bool> {
    match (a, b) {
        (LuaValue::Number(x), LuaValue::Number(y)) => Some(x < y),
        (LuaValue::String(x), LuaValue::String(y)) => Some(x.as_str() < y.as_str()),
        _ => None,
    }
}

/// Raw `a <= b`; None when the operands cannot be ordered
pub fn less_equal(a: &LuaValue, b: &LuaValue) -> Option<bool> {
    match (a, b) {
        (LuaValue::Number(x), LuaValue::Number(y)) => Some(x <= y),
        (LuaValue::String(x), LuaValue::String(y)) => Some(x.as_str() <= y.as_str()),
        _ => None,
    }
}

pub fn compare_error_message(a: &LuaValue, b: &LuaValue) -> String {
    let (ta, tb) = (a.type_name(), b.type_name());
    if ta == tb {
        format!("attempt to compare two {} values", ta)
    } else {
        format!("attempt to compare {} with {}", ta, tb)
    }
}

/// Append the concat form of `v` (strings and numbers only)
pub fn concat_piece(out: &mut String, v: &LuaValue) -> bool {
    match v {
        LuaValue::String(s) => out.push_str(s.as_str()),
        LuaValue::Number(n) => out.push_str(&format_number(*n)),
        _ => return false,
    }
    true
}

/// Raw length of strings and tables
pub fn raw_len(v: &LuaValue) -> Option<usize> {
    match v {
        LuaValue::String(s) => Some(s.len()),
        LuaValue::Table(t) => Some(t.borrow().len()),
        _ => None,
    }
}

/// Decode the "floating point byte" size hints of NEWTABLE
pub fn fb2int(x: u32) -> usize {
    if x < 8 {
        x as usize
    } else {
        (((x & 7) + 8) as usize) << ((x >> 3) - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floored_mod() {
        assert_eq!(lua_fmod(5.0, 3.0), 2.0);
        assert_eq!(lua_fmod(-5.0, 3.0), 1.0);
        assert_eq!(lua_fmod(5.0, -3.0), -1.0);
        assert_eq!(lua_fmod(-5.0, -3.0), -2.0);
        assert!(lua_fmod(1.0, 0.0).is_nan());
    }

    #[test]
    fn test_idiv() {
        assert_eq!(lua_idiv(7.0, 2.0), 3.0);
        assert_eq!(lua_idiv(-7.0, 2.0), -4.0);
    }

    #[test]
    fn test_shifts() {
        assert_eq!(lua_shiftl(1, 4), 16);
        assert_eq!(lua_shiftl(16, -4), 1);
        assert_eq!(lua_shiftl(-1, -63), 1);
        assert_eq!(lua_shiftl(1, 64), 0);
        assert_eq!(lua_shiftl(1, i64::MIN), 0);
        assert_eq!(bitwise(OpCode::Shr, -1, 60), Some(15));
    }

    #[test]
    fn test_raw_ordering() {
        let a = LuaValue::string("a");
        let b = LuaValue::string("b");
        assert_eq!(less_than(&a, &b), Some(true));
        assert_eq!(less_equal(&b, &b), Some(true));
        assert_eq!(less_than(&a, &LuaValue::integer(1)), None);
        assert_eq!(
            compare_error_message(&a, &LuaValue::integer(1)),
            "attempt to compare string with number"
        );
    }

    #[test]
    fn test_fb2int() {
        assert_eq!(fb2int(0), 0);
        assert_eq!(fb2int(7), 7);
        assert_eq!(fb2int(8), 8);
        assert_eq!(fb2int(9), 9);
        assert_eq!(fb2int(16), 16);
    }
}
