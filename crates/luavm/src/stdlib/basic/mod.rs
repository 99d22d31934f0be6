// Basic library (_G global functions)
// Implements: assert, error, getmetatable, ipairs, next, pairs, pcall, print,
// rawequal, rawget, rawlen, rawset, select, setmetatable, tonumber, tostring,
// type, _G, _VERSION

mod tostring;

use crate::lib_registry::LibraryModule;
use crate::lua_value::{LuaValue, parse_lua_number, parse_lua_number_radix};
use crate::lua_vm::{LuaError, LuaResult, LuaState};

pub use tostring::tostring_value;

pub fn create_basic_lib() -> LibraryModule {
    crate::lib_module!("_G", {
        "assert" => lua_assert,
        "error" => lua_error,
        "getmetatable" => lua_getmetatable,
        "ipairs" => lua_ipairs,
        "next" => lua_next,
        "pairs" => lua_pairs,
        "pcall" => lua_pcall,
        "print" => lua_print,
        "rawequal" => lua_rawequal,
        "rawget" => lua_rawget,
        "rawlen" => lua_rawlen,
        "rawset" => lua_rawset,
        "select" => lua_select,
        "setmetatable" => lua_setmetatable,
        "tonumber" => lua_tonumber,
        "tostring" => lua_tostring,
        "type" => lua_type,
    })
    .with_value("_G", |vm| LuaValue::Table(vm.globals()))
    .with_value("_VERSION", |vm| vm.create_string("Lua 5.3"))
}

/// print(...) - Write the arguments to stdout, tab separated
fn lua_print(l: &mut LuaState) -> LuaResult<usize> {
    let args = l.get_args();
    let mut line = String::new();
    for (i, arg) in args.into_iter().enumerate() {
        if i > 0 {
            line.push('\t');
        }
        line.push_str(&tostring_value(l, &arg)?);
    }
    println!("{}", line);
    Ok(0)
}

/// type(v) - Name of the value's type
fn lua_type(l: &mut LuaState) -> LuaResult<usize> {
    let value = l.check_any(1)?;
    l.push_value(LuaValue::string(value.type_name()))?;
    Ok(1)
}

/// assert(v [, message]) - Raise if `v` is false or nil, else return all arguments
fn lua_assert(l: &mut LuaState) -> LuaResult<usize> {
    let value = l.check_any(1)?;
    if value.is_truthy() {
        return Ok(l.arg_count());
    }
    match l.get_arg(2) {
        Some(message) => Err(LuaError::UserError(message)),
        None => Err(l.error("assertion failed!")),
    }
}

/// error(message [, level]) - Raise `message`.
///
/// String messages get the position of the function `level` steps up
/// the call chain (1 = the caller of `error`, 0 = no position).
fn lua_error(l: &mut LuaState) -> LuaResult<usize> {
    let value = l.get_arg(1).unwrap_or_default();
    let level = l.opt_integer(2, 1)?;
    if let LuaValue::String(s) = &value {
        if level > 0 {
            let msg = format!("{}{}", l.where_prefix(level as usize), s.as_str());
            return Err(LuaError::UserError(LuaValue::from(msg)));
        }
    }
    Err(LuaError::UserError(value))
}

/// tonumber(v [, base])
fn lua_tonumber(l: &mut LuaState) -> LuaResult<usize> {
    let result = match l.get_arg(2) {
        None | Some(LuaValue::Nil) => match l.check_any(1)? {
            LuaValue::Number(n) => LuaValue::Number(n),
            LuaValue::String(s) => parse_lua_number(s.as_str()).map_or(LuaValue::Nil, LuaValue::Number),
            _ => LuaValue::Nil,
        },
        Some(_) => {
            let base = l.check_integer(2)?;
            if !(2..=36).contains(&base) {
                return Err(l.arg_error(2, "base out of range"));
            }
            let text = match l.get_arg(1) {
                Some(LuaValue::String(s)) => s.as_str().to_string(),
                _ => return Err(l.arg_error(1, "string expected")),
            };
            parse_lua_number_radix(text.trim(), base as u32).map_or(LuaValue::Nil, LuaValue::Number)
        }
    };
    l.push_value(result)?;
    Ok(1)
}

/// tostring(v) - Honors `__tostring`
fn lua_tostring(l: &mut LuaState) -> LuaResult<usize> {
    let value = l.check_any(1)?;
    let s = tostring_value(l, &value)?;
    l.push_value(LuaValue::from(s))?;
    Ok(1)
}

/// select(n, ...) - Arguments after the n-th, or their count for '#'
fn lua_select(l: &mut LuaState) -> LuaResult<usize> {
    let selector = l.check_any(1)?;
    let nvarargs = l.arg_count() - 1;

    if selector.as_str() == Some("#") {
        l.push_value(LuaValue::integer(nvarargs as i64))?;
        return Ok(1);
    }

    let index = l.check_integer(1)?;
    let start = if index < 0 {
        let back = index.unsigned_abs() as usize;
        if back > nvarargs {
            return Err(l.arg_error(1, "index out of range"));
        }
        nvarargs - back
    } else if index == 0 {
        return Err(l.arg_error(1, "index out of range"));
    } else {
        (index as usize - 1).min(nvarargs)
    };
    // The selected arguments already sit at the top of the frame
    Ok(nvarargs - start)
}

/// ipairs(t) - Iterator over t[1], t[2], ... up to the first nil
fn lua_ipairs(l: &mut LuaState) -> LuaResult<usize> {
    let target = l.check_any(1)?;
    l.push_value(LuaValue::cfunction("ipairs_aux", ipairs_aux))?;
    l.push_value(target)?;
    l.push_value(LuaValue::integer(0))?;
    Ok(3)
}

fn ipairs_aux(l: &mut LuaState) -> LuaResult<usize> {
    let table = l.check_table(1)?;
    let i = l.check_integer(2)?.wrapping_add(1);
    let value = table.borrow().get_int(i);
    if value.is_nil() {
        l.push_value(LuaValue::Nil)?;
        return Ok(1);
    }
    l.push_value(LuaValue::integer(i))?;
    l.push_value(value)?;
    Ok(2)
}

/// pairs(t) - `__pairs` if present, else next, t, nil
fn lua_pairs(l: &mut LuaState) -> LuaResult<usize> {
    let target = l.check_any(1)?;
    if let Some(handler) = target.get_metamethod("__pairs") {
        let mut results = l.call_value(handler, vec![target])?;
        results.resize(3, LuaValue::Nil);
        for value in results {
            l.push_value(value)?;
        }
        return Ok(3);
    }
    if !target.is_table() {
        return Err(l.arg_error(1, &format!("table expected, got {}", target.type_name())));
    }
    l.push_value(LuaValue::cfunction("next", lua_next))?;
    l.push_value(target)?;
    l.push_value(LuaValue::Nil)?;
    Ok(3)
}

/// next(t [, k]) - Entry after `k` in traversal order
fn lua_next(l: &mut LuaState) -> LuaResult<usize> {
    let table = l.check_table(1)?;
    let key = l.get_arg(2).unwrap_or_default();
    let entry = table.borrow().next(&key);
    match entry {
        Ok(Some((k, v))) => {
            l.push_value(k)?;
            l.push_value(v)?;
            Ok(2)
        }
        Ok(None) => {
            l.push_value(LuaValue::Nil)?;
            Ok(1)
        }
        Err(msg) => Err(l.error(msg)),
    }
}

/// pcall(f, ...) - true plus the results of f, or false plus the error value
fn lua_pcall(l: &mut LuaState) -> LuaResult<usize> {
    l.check_any(1)?;
    let Some(func_idx) = l.current_frame().map(|ci| ci.base) else {
        return Ok(0);
    };
    let nargs = l.arg_count() - 1;
    let (ok, n) = l.pcall(func_idx, nargs)?;

    let results: Vec<LuaValue> = (0..n).map(|i| l.stack_get(func_idx + i)).collect();
    l.stack_set(func_idx, LuaValue::Boolean(ok));
    for (i, value) in results.into_iter().enumerate() {
        l.stack_set(func_idx + 1 + i, value);
    }
    l.set_top(func_idx + 1 + n);
    Ok(n + 1)
}

/// getmetatable(v) - The `__metatable` field if set, else the metatable
fn lua_getmetatable(l: &mut LuaState) -> LuaResult<usize> {
    let value = l.check_any(1)?;
    let result = match value.metatable() {
        Some(mt) => {
            let guard = mt.borrow().get_str("__metatable");
            if guard.is_nil() {
                LuaValue::Table(mt)
            } else {
                guard
            }
        }
        None => LuaValue::Nil,
    };
    l.push_value(result)?;
    Ok(1)
}

/// setmetatable(t, mt) - Refuses to replace a protected metatable
fn lua_setmetatable(l: &mut LuaState) -> LuaResult<usize> {
    let table = l.check_table(1)?;
    let metatable = match l.get_arg(2) {
        Some(LuaValue::Nil) => None,
        Some(LuaValue::Table(mt)) => Some(mt),
        _ => return Err(l.arg_error(2, "nil or table expected")),
    };

    let protected = table
        .borrow()
        .get_metatable()
        .is_some_and(|mt| !mt.borrow().get_str("__metatable").is_nil());
    if protected {
        return Err(l.error("cannot change a protected metatable"));
    }

    table.borrow_mut().set_metatable(metatable);
    l.push_value(LuaValue::Table(table))?;
    Ok(1)
}

fn lua_rawequal(l: &mut LuaState) -> LuaResult<usize> {
    let a = l.check_any(1)?;
    let b = l.check_any(2)?;
    l.push_value(LuaValue::Boolean(a == b))?;
    Ok(1)
}

fn lua_rawget(l: &mut LuaState) -> LuaResult<usize> {
    let table = l.check_table(1)?;
    let key = l.check_any(2)?;
    let value = table.borrow().raw_get(&key);
    l.push_value(value)?;
    Ok(1)
}

fn lua_rawset(l: &mut LuaState) -> LuaResult<usize> {
    let table = l.check_table(1)?;
    let key = l.check_any(2)?;
    let value = l.check_any(3)?;
    table
        .borrow_mut()
        .raw_set(key, value)
        .map_err(|msg| l.error(msg))?;
    l.push_value(LuaValue::Table(table))?;
    Ok(1)
}

fn lua_rawlen(l: &mut LuaState) -> LuaResult<usize> {
    let len = match l.get_arg(1) {
        Some(LuaValue::Table(t)) => t.borrow().len(),
        Some(LuaValue::String(s)) => s.len(),
        _ => return Err(l.arg_error(1, "table or string expected")),
    };
    l.push_value(LuaValue::integer(len as i64))?;
    Ok(1)
}
