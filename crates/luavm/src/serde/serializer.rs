/// Lua value -> serde_json::Value
///
/// - nil -> null
/// - integral numbers -> JSON integers, other finite numbers -> floats
/// - sequence tables (keys exactly 1..n, or empty) -> arrays
/// - other tables -> objects; keys must be strings or numbers
/// - functions and threads -> error
use std::collections::HashSet;

use serde_json::{Map, Number, Value as JsonValue};

use crate::lua_value::{LuaTable, LuaValue, float_to_integer, format_number};

pub fn to_value(lua_value: &LuaValue) -> Result<JsonValue, String> {
    let mut visited = HashSet::new();
    to_value_internal(lua_value, &mut visited)
}

pub fn to_string(lua_value: &LuaValue, pretty: bool) -> Result<String, String> {
    let json_value = to_value(lua_value)?;
    let text = if pretty {
        serde_json::to_string_pretty(&json_value)
    } else {
        serde_json::to_string(&json_value)
    };
    text.map_err(|e| format!("Failed to serialize to JSON: {}", e))
}

fn to_value_internal(
    lua_value: &LuaValue,
    visited: &mut HashSet<*const ()>,
) -> Result<JsonValue, String> {
    match lua_value {
        LuaValue::Nil => Ok(JsonValue::Null),
        LuaValue::Boolean(b) => Ok(JsonValue::Bool(*b)),
        LuaValue::Number(n) => number_to_json(*n),
        LuaValue::String(s) => Ok(JsonValue::String(s.as_str().to_string())),
        LuaValue::Table(table) => {
            let ptr = std::rc::Rc::as_ptr(table) as *const ();
            if !visited.insert(ptr) {
                return Err("Circular reference detected in table".to_string());
            }
            let table = table.borrow();
            let result = if is_sequence(&table)? {
                table_to_json_array(&table, visited)
            } else {
                table_to_json_object(&table, visited)
            };
            visited.remove(&ptr);
            result
        }
        LuaValue::Function(_) | LuaValue::CFunction(_) => {
            Err("Cannot serialize Lua function to JSON".to_string())
        }
        LuaValue::Thread(_) => Err("Cannot serialize Lua thread to JSON".to_string()),
    }
}

fn number_to_json(n: f64) -> Result<JsonValue, String> {
    if let Some(i) = float_to_integer(n) {
        return Ok(JsonValue::Number(Number::from(i)));
    }
    Number::from_f64(n)
        .map(JsonValue::Number)
        .ok_or_else(|| format!("Invalid number: {}", format_number(n)))
}

/// Every live key is an integer in 1..=count
fn is_sequence(table: &LuaTable) -> Result<bool, String> {
    let mut count = 0usize;
    let mut max_key = 0i64;
    let mut key = LuaValue::Nil;
    while let Some((k, _)) = table.next(&key).map_err(str::to_string)? {
        match k.as_number().and_then(float_to_integer) {
            Some(i) if i >= 1 => max_key = max_key.max(i),
            _ => return Ok(false),
        }
        count += 1;
        key = k;
    }
    Ok(max_key as usize == count)
}

fn table_to_json_array(
    table: &LuaTable,
    visited: &mut HashSet<*const ()>,
) -> Result<JsonValue, String> {
    let len = table.len();
    let mut array = Vec::with_capacity(len);
    for i in 1..=len as i64 {
        array.push(to_value_internal(&table.get_int(i), visited)?);
    }
    // Sequence entries that live in the map part
    let mut i = len as i64 + 1;
    loop {
        let value = table.get_int(i);
        if value.is_nil() {
            break;
        }
        array.push(to_value_internal(&value, visited)?);
        i += 1;
    }
    Ok(JsonValue::Array(array))
}

fn table_to_json_object(
    table: &LuaTable,
    visited: &mut HashSet<*const ()>,
) -> Result<JsonValue, String> {
    let mut map = Map::new();
    let mut key = LuaValue::Nil;
    while let Some((k, v)) = table.next(&key).map_err(str::to_string)? {
        let name = match &k {
            LuaValue::String(s) => s.as_str().to_string(),
            LuaValue::Number(n) => format_number(*n),
            other => {
                return Err(format!(
                    "Cannot use {} as a JSON object key",
                    other.type_name()
                ));
            }
        };
        map.insert(name, to_value_internal(&v, visited)?);
        key = k;
    }
    Ok(JsonValue::Object(map))
}
