// Math library
// Implements: abs, acos, asin, atan, ceil, cos, deg, exp, floor, fmod,
// log, max, min, modf, rad, random, randomseed, sin, sqrt, tan, tointeger,
// type, ult, pi, huge, maxinteger, mininteger

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::lib_registry::LibraryModule;
use crate::lua_value::{LuaValue, float_to_integer};
use crate::lua_vm::{LuaResult, LuaState};

pub fn create_math_lib() -> LibraryModule {
    crate::lib_module!("math", {
        "abs" => math_abs,
        "acos" => math_acos,
        "asin" => math_asin,
        "atan" => math_atan,
        "ceil" => math_ceil,
        "cos" => math_cos,
        "deg" => math_deg,
        "exp" => math_exp,
        "floor" => math_floor,
        "fmod" => math_fmod,
        "log" => math_log,
        "max" => math_max,
        "min" => math_min,
        "modf" => math_modf,
        "rad" => math_rad,
        "random" => math_random,
        "randomseed" => math_randomseed,
        "sin" => math_sin,
        "sqrt" => math_sqrt,
        "tan" => math_tan,
        "tointeger" => math_tointeger,
        "type" => math_type,
        "ult" => math_ult,
    })
    .with_value("pi", |_vm| LuaValue::Number(std::f64::consts::PI))
    .with_value("huge", |_vm| LuaValue::Number(f64::INFINITY))
    .with_value("maxinteger", |_vm| LuaValue::integer(i64::MAX))
    .with_value("mininteger", |_vm| LuaValue::integer(i64::MIN))
}

/// One-argument float functions share this shape
fn unary(l: &mut LuaState, f: fn(f64) -> f64) -> LuaResult<usize> {
    let x = l.check_number(1)?;
    l.push_value(LuaValue::Number(f(x)))?;
    Ok(1)
}

fn math_abs(l: &mut LuaState) -> LuaResult<usize> {
    unary(l, f64::abs)
}

fn math_acos(l: &mut LuaState) -> LuaResult<usize> {
    unary(l, f64::acos)
}

fn math_asin(l: &mut LuaState) -> LuaResult<usize> {
    unary(l, f64::asin)
}

fn math_ceil(l: &mut LuaState) -> LuaResult<usize> {
    unary(l, f64::ceil)
}

fn math_cos(l: &mut LuaState) -> LuaResult<usize> {
    unary(l, f64::cos)
}

fn math_deg(l: &mut LuaState) -> LuaResult<usize> {
    unary(l, f64::to_degrees)
}

fn math_exp(l: &mut LuaState) -> LuaResult<usize> {
    unary(l, f64::exp)
}

fn math_floor(l: &mut LuaState) -> LuaResult<usize> {
    unary(l, f64::floor)
}

fn math_rad(l: &mut LuaState) -> LuaResult<usize> {
    unary(l, f64::to_radians)
}

fn math_sin(l: &mut LuaState) -> LuaResult<usize> {
    unary(l, f64::sin)
}

fn math_sqrt(l: &mut LuaState) -> LuaResult<usize> {
    unary(l, f64::sqrt)
}

fn math_tan(l: &mut LuaState) -> LuaResult<usize> {
    unary(l, f64::tan)
}

/// math.atan(y [, x]) - Quadrant-aware arc tangent
fn math_atan(l: &mut LuaState) -> LuaResult<usize> {
    let y = l.check_number(1)?;
    let x = match l.get_arg(2) {
        None | Some(LuaValue::Nil) => 1.0,
        Some(_) => l.check_number(2)?,
    };
    l.push_value(LuaValue::Number(y.atan2(x)))?;
    Ok(1)
}

/// math.fmod(a, b) - Remainder truncated toward zero
fn math_fmod(l: &mut LuaState) -> LuaResult<usize> {
    let a = l.check_number(1)?;
    let b = l.check_number(2)?;
    if b == 0.0 && float_to_integer(a).is_some() {
        return Err(l.arg_error(2, "zero"));
    }
    l.push_value(LuaValue::Number(a % b))?;
    Ok(1)
}

/// math.log(x [, base])
fn math_log(l: &mut LuaState) -> LuaResult<usize> {
    let x = l.check_number(1)?;
    let result = match l.get_arg(2) {
        None | Some(LuaValue::Nil) => x.ln(),
        Some(_) => {
            let base = l.check_number(2)?;
            if base == 2.0 {
                x.log2()
            } else if base == 10.0 {
                x.log10()
            } else {
                x.ln() / base.ln()
            }
        }
    };
    l.push_value(LuaValue::Number(result))?;
    Ok(1)
}

fn fold_numbers(l: &mut LuaState, pick_second: fn(f64, f64) -> bool) -> LuaResult<usize> {
    let mut best = l.check_number(1)?;
    for i in 2..=l.arg_count() {
        let x = l.check_number(i)?;
        if pick_second(best, x) {
            best = x;
        }
    }
    l.push_value(LuaValue::Number(best))?;
    Ok(1)
}

fn math_max(l: &mut LuaState) -> LuaResult<usize> {
    fold_numbers(l, |best, x| x > best)
}

fn math_min(l: &mut LuaState) -> LuaResult<usize> {
    fold_numbers(l, |best, x| x < best)
}

/// math.modf(x) - Integral part and fractional part
fn math_modf(l: &mut LuaState) -> LuaResult<usize> {
    let x = l.check_number(1)?;
    let int_part = x.trunc();
    let frac_part = if x.is_infinite() { 0.0 } else { x - int_part };
    l.push_value(LuaValue::Number(int_part))?;
    l.push_value(LuaValue::Number(frac_part))?;
    Ok(2)
}

/// math.tointeger(x) - x when it has an exact integer value, else nil
fn math_tointeger(l: &mut LuaState) -> LuaResult<usize> {
    let result = match l.check_any(1)? {
        LuaValue::Number(n) => float_to_integer(n).map_or(LuaValue::Nil, LuaValue::integer),
        _ => LuaValue::Nil,
    };
    l.push_value(result)?;
    Ok(1)
}

/// math.type(x) - "integer", "float", or nil for non-numbers
fn math_type(l: &mut LuaState) -> LuaResult<usize> {
    let result = match l.check_any(1)? {
        LuaValue::Number(n) if float_to_integer(n).is_some() => LuaValue::string("integer"),
        LuaValue::Number(_) => LuaValue::string("float"),
        _ => LuaValue::Nil,
    };
    l.push_value(result)?;
    Ok(1)
}

/// math.ult(m, n) - Unsigned comparison of two integers
fn math_ult(l: &mut LuaState) -> LuaResult<usize> {
    let m = l.check_integer(1)?;
    let n = l.check_integer(2)?;
    l.push_value(LuaValue::Boolean((m as u64) < (n as u64)))?;
    Ok(1)
}

/// math.random([m [, n]]) - Float in [0,1), or integer in [1,m] / [m,n]
fn math_random(l: &mut LuaState) -> LuaResult<usize> {
    let (low, high) = match l.arg_count() {
        0 => {
            let x: f64 = l.global().rng.borrow_mut().r#gen();
            l.push_value(LuaValue::Number(x))?;
            return Ok(1);
        }
        1 => (1, l.check_integer(1)?),
        2 => (l.check_integer(1)?, l.check_integer(2)?),
        _ => return Err(l.argument_error("wrong number of arguments")),
    };
    if low > high {
        return Err(l.arg_error(l.arg_count(), "interval is empty"));
    }
    let x = l.global().rng.borrow_mut().gen_range(low..=high);
    l.push_value(LuaValue::integer(x))?;
    Ok(1)
}

/// math.randomseed([x]) - Reseed; without an argument, from system entropy
fn math_randomseed(l: &mut LuaState) -> LuaResult<usize> {
    let rng = match l.get_arg(1) {
        None | Some(LuaValue::Nil) => StdRng::from_entropy(),
        Some(_) => {
            let n = l.check_number(1)?;
            let seed = float_to_integer(n).map_or(n.to_bits(), |i| i as u64);
            StdRng::seed_from_u64(seed)
        }
    };
    *l.global().rng.borrow_mut() = rng;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use crate::lua_value::LuaValue;
    use crate::lua_vm::{LuaVM, SafeOption};

    fn call_math(vm: &mut LuaVM, name: &str, args: Vec<LuaValue>) -> Vec<LuaValue> {
        let math = vm.get_global("math");
        let func = math.as_table().unwrap().borrow().get_str(name);
        vm.call(func, args).unwrap()
    }

    #[test]
    fn test_seeded_sequence_repeats() {
        let mut vm = LuaVM::new(SafeOption::default());
        vm.open_libs().unwrap();
        call_math(&mut vm, "randomseed", vec![LuaValue::integer(42)]);
        let first: Vec<_> = (0..4)
            .map(|_| call_math(&mut vm, "random", vec![LuaValue::integer(100)]))
            .collect();
        call_math(&mut vm, "randomseed", vec![LuaValue::integer(42)]);
        let second: Vec<_> = (0..4)
            .map(|_| call_math(&mut vm, "random", vec![LuaValue::integer(100)]))
            .collect();
        assert_eq!(first, second);
        for r in first {
            let n = r[0].as_number().unwrap();
            assert!((1.0..=100.0).contains(&n));
        }
    }

    #[test]
    fn test_modf_and_type() {
        let mut vm = LuaVM::new(SafeOption::default());
        vm.open_libs().unwrap();
        let r = call_math(&mut vm, "modf", vec![LuaValue::Number(3.75)]);
        assert_eq!(r, vec![LuaValue::Number(3.0), LuaValue::Number(0.75)]);
        let r = call_math(&mut vm, "type", vec![LuaValue::Number(2.0)]);
        assert_eq!(r, vec![LuaValue::string("integer")]);
        let r = call_math(&mut vm, "type", vec![LuaValue::string("2")]);
        assert_eq!(r, vec![LuaValue::Nil]);
    }

    #[test]
    fn test_random_empty_interval() {
        let mut vm = LuaVM::new(SafeOption::default());
        vm.open_libs().unwrap();
        let math = vm.get_global("math");
        let func = math.as_table().unwrap().borrow().get_str("random");
        let err = vm
            .call(func, vec![LuaValue::integer(5), LuaValue::integer(1)])
            .unwrap_err();
        assert!(err.to_string().contains("interval is empty"));
    }
}
