use crate::lua_value::LuaValue;
use crate::lua_vm::{LuaResult, LuaState};

/// String form used by `tostring` and `print`.
///
/// A `__tostring` handler wins and must produce a string; otherwise a
/// `__name` field in the metatable replaces the type in the default
/// `kind: address` form.
pub fn tostring_value(l: &mut LuaState, value: &LuaValue) -> LuaResult<String> {
    if let Some(handler) = value.get_metamethod("__tostring") {
        let results = l.call_value(handler, vec![value.clone()])?;
        return match results.into_iter().next() {
            Some(LuaValue::String(s)) => Ok(s.as_str().to_string()),
            Some(LuaValue::Number(n)) => Ok(crate::lua_value::format_number(n)),
            _ => Err(l.error("'__tostring' must return a string")),
        };
    }

    if let Some(LuaValue::String(name)) = value.get_metamethod("__name") {
        if let Some(ptr) = value.raw_ptr() {
            return Ok(format!("{}: {:p}", name.as_str(), ptr));
        }
    }

    Ok(value.to_string())
}
