mod test_chunk;
mod test_closures;
mod test_operators;

use crate::lua_value::LuaValue;
use crate::{LuaVM, SafeOption};

/// VM with every standard library loaded
pub(crate) fn new_vm() -> LuaVM {
    let mut vm = LuaVM::new(SafeOption::default());
    vm.open_libs().unwrap();
    vm
}

pub(crate) fn int(i: i64) -> LuaValue {
    LuaValue::integer(i)
}

pub(crate) fn s(text: &str) -> LuaValue {
    LuaValue::string(text)
}

/// `lib.name`, or the global `name` when `lib` is empty
pub(crate) fn lib_fn(vm: &LuaVM, lib: &str, name: &str) -> LuaValue {
    if lib.is_empty() {
        return vm.get_global(name);
    }
    let table = vm.get_global(lib);
    let func = table.as_table().unwrap().borrow().get_str(name);
    func
}
