// Table library
// Implements: insert, remove, concat, unpack, pack

use crate::lib_registry::LibraryModule;
use crate::lua_value::{LuaTable, LuaValue, format_number};
use crate::lua_vm::{LuaResult, LuaState};

/// Largest result count `unpack` will produce in one call
const MAX_UNPACK: i64 = 1 << 20;

pub fn create_table_lib() -> LibraryModule {
    crate::lib_module!("table", {
        "insert" => table_insert,
        "remove" => table_remove,
        "concat" => table_concat,
        "unpack" => table_unpack,
        "pack" => table_pack,
    })
}

/// table.insert(t, [pos,] value)
fn table_insert(l: &mut LuaState) -> LuaResult<usize> {
    let table = l.check_table(1)?;
    let len = table.borrow().len() as i64;
    match l.arg_count() {
        2 => {
            let value = l.check_any(2)?;
            table.borrow_mut().set_int(len + 1, value);
        }
        3 => {
            let pos = l.check_integer(2)?;
            if pos < 1 || pos > len + 1 {
                return Err(l.arg_error(2, "position out of bounds"));
            }
            let value = l.check_any(3)?;
            table
                .borrow_mut()
                .insert(pos as usize, value)
                .map_err(|msg| l.arg_error(2, msg))?;
        }
        _ => return Err(l.argument_error("wrong number of arguments to 'insert'")),
    }
    Ok(0)
}

/// table.remove(t [, pos]) - Removes and returns t[pos], shifting later elements down
fn table_remove(l: &mut LuaState) -> LuaResult<usize> {
    let table = l.check_table(1)?;
    let len = table.borrow().len() as i64;
    let pos = l.opt_integer(2, len)?;
    if pos != len && (pos < 1 || pos > len + 1) {
        return Err(l.arg_error(2, "position out of bounds"));
    }
    let removed = if pos == len + 1 || len == 0 {
        let mut t = table.borrow_mut();
        let value = t.get_int(pos);
        t.set_int(pos, LuaValue::Nil);
        value
    } else {
        table
            .borrow_mut()
            .remove(pos as usize)
            .map_err(|msg| l.arg_error(2, msg))?
    };
    l.push_value(removed)?;
    Ok(1)
}

/// table.concat(t [, sep [, i [, j]]])
fn table_concat(l: &mut LuaState) -> LuaResult<usize> {
    let table = l.check_table(1)?;
    let sep = match l.get_arg(2) {
        None | Some(LuaValue::Nil) => String::new(),
        Some(_) => l.check_string(2)?,
    };
    let first = l.opt_integer(3, 1)?;
    let last = match l.get_arg(4) {
        None | Some(LuaValue::Nil) => table.borrow().len() as i64,
        Some(_) => l.check_integer(4)?,
    };

    let mut out = String::new();
    let t = table.borrow();
    let mut i = first;
    while i <= last {
        match t.get_int(i) {
            LuaValue::String(s) => out.push_str(s.as_str()),
            LuaValue::Number(n) => out.push_str(&format_number(n)),
            other => {
                return Err(l.error(format!(
                    "invalid value (at index {}) in table for 'concat' ({})",
                    i,
                    other.type_name()
                )));
            }
        }
        if i < last {
            out.push_str(&sep);
        }
        i += 1;
    }
    drop(t);

    l.push_value(LuaValue::from(out))?;
    Ok(1)
}

/// table.unpack(t [, i [, j]]) - t[i], ..., t[j]
fn table_unpack(l: &mut LuaState) -> LuaResult<usize> {
    let table = l.check_table(1)?;
    let first = l.opt_integer(2, 1)?;
    let last = match l.get_arg(3) {
        None | Some(LuaValue::Nil) => table.borrow().len() as i64,
        Some(_) => l.check_integer(3)?,
    };
    if first > last {
        return Ok(0);
    }
    let count = last.saturating_sub(first).saturating_add(1);
    if count >= MAX_UNPACK {
        return Err(l.error("too many results to unpack"));
    }
    let values: Vec<LuaValue> = {
        let t = table.borrow();
        (first..=last).map(|i| t.get_int(i)).collect()
    };
    for value in values {
        l.push_value(value)?;
    }
    Ok(count as usize)
}

/// table.pack(...) - Array of the arguments plus field `n`
fn table_pack(l: &mut LuaState) -> LuaResult<usize> {
    let args = l.get_args();
    let n = args.len();
    let mut table = LuaTable::new(n, 1);
    for (i, value) in args.into_iter().enumerate() {
        table.set_int(i as i64 + 1, value);
    }
    table.set_str("n", LuaValue::integer(n as i64));
    l.push_value(LuaValue::table(table))?;
    Ok(1)
}
