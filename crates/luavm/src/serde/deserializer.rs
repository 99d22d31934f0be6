/// serde_json::Value -> Lua value
///
/// - null -> nil (so a null array element leaves a hole)
/// - numbers -> numbers
/// - arrays -> tables keyed 1..n
/// - objects -> tables keyed by string
use serde_json::Value as JsonValue;

use crate::lua_value::{LuaTable, LuaValue};

pub fn from_value(json_value: &JsonValue) -> LuaValue {
    match json_value {
        JsonValue::Null => LuaValue::Nil,
        JsonValue::Bool(b) => LuaValue::Boolean(*b),
        JsonValue::Number(n) => n
            .as_i64()
            .map(|i| i as f64)
            .or_else(|| n.as_u64().map(|u| u as f64))
            .or_else(|| n.as_f64())
            .map_or(LuaValue::Nil, LuaValue::Number),
        JsonValue::String(s) => LuaValue::string(s),
        JsonValue::Array(arr) => {
            let mut table = LuaTable::new(arr.len(), 0);
            for (i, item) in arr.iter().enumerate() {
                table.set_int(i as i64 + 1, from_value(item));
            }
            LuaValue::table(table)
        }
        JsonValue::Object(obj) => {
            let mut table = LuaTable::new(0, obj.len());
            for (key, item) in obj {
                table.set_str(key, from_value(item));
            }
            LuaValue::table(table)
        }
    }
}

pub fn from_str(json_str: &str) -> Result<LuaValue, String> {
    let json_value: JsonValue =
        serde_json::from_str(json_str).map_err(|e| format!("Failed to parse JSON: {}", e))?;
    Ok(from_value(&json_value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_with_nested_array() {
        let value = from_str(r#"{"name": "lua", "list": [1, 2, 3]}"#).unwrap();
        let table = value.as_table().unwrap().borrow();
        assert_eq!(table.get_str("name"), LuaValue::string("lua"));
        let list = table.get_str("list");
        let list = list.as_table().unwrap().borrow();
        assert_eq!(list.len(), 3);
        assert_eq!(list.get_int(3), LuaValue::integer(3));
    }

    #[test]
    fn test_invalid_json() {
        assert!(from_str("{").is_err());
    }
}
