// Library registration system for the standard libraries
// Registers Rust functions as global functions or library tables

use crate::lua_value::{CFunction, LuaTable, LuaValue};
use crate::lua_vm::{LuaResult, LuaVM};
use crate::stdlib::{self, Stdlib};

/// Type for value initializers - functions that create values when the module loads
pub type ValueInitializer = fn(&mut LuaVM) -> LuaValue;

/// Entry in a library module - can be a function or a value
pub enum LibraryEntry {
    Function(CFunction),
    Value(ValueInitializer),
}

/// A library module containing multiple functions and values
pub struct LibraryModule {
    pub name: &'static str,
    pub entries: Vec<(&'static str, LibraryEntry)>,
}

impl LibraryModule {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Vec::new(),
        }
    }

    pub fn with_function(mut self, name: &'static str, func: CFunction) -> Self {
        self.entries.push((name, LibraryEntry::Function(func)));
        self
    }

    pub fn with_value(mut self, name: &'static str, value_init: ValueInitializer) -> Self {
        self.entries.push((name, LibraryEntry::Value(value_init)));
        self
    }
}

/// Builder for creating library modules out of native functions
#[macro_export]
macro_rules! lib_module {
    ($name:expr, {
        $($item_name:expr => $item:expr),* $(,)?
    }) => {{
        let mut module = $crate::lib_registry::LibraryModule::new($name);
        $(
            module.entries.push(($item_name, $crate::lib_registry::LibraryEntry::Function($item)));
        )*
        module
    }};
}

/// Registry of library modules, loaded in registration order
pub struct LibraryRegistry {
    modules: Vec<LibraryModule>,
}

impl LibraryRegistry {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    pub fn register(&mut self, module: LibraryModule) {
        self.modules.push(module);
    }

    pub fn load_all(&self, vm: &mut LuaVM) -> LuaResult<()> {
        for module in &self.modules {
            self.load_module(vm, module)?;
        }
        Ok(())
    }

    /// `_G` entries become globals; any other module becomes a global table
    pub fn load_module(&self, vm: &mut LuaVM, module: &LibraryModule) -> LuaResult<()> {
        let mut lib_table = LuaTable::new(0, module.entries.len());
        for (name, entry) in &module.entries {
            let value = match entry {
                LibraryEntry::Function(func) => LuaValue::cfunction(*name, *func),
                LibraryEntry::Value(value_init) => value_init(vm),
            };
            if module.name == "_G" {
                vm.set_global(name, value);
            } else {
                lib_table.set_str(name, value);
            }
        }
        if module.name != "_G" {
            vm.set_global(module.name, LuaValue::table(lib_table));
        }
        Ok(())
    }

    pub fn get_module(&self, name: &str) -> Option<&LibraryModule> {
        self.modules.iter().find(|m| m.name == name)
    }
}

impl Default for LibraryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry holding the libraries selected by `lib`
pub fn create_registry(lib: Stdlib) -> LibraryRegistry {
    let mut registry = LibraryRegistry::new();
    let wants = |which: Stdlib| lib == Stdlib::All || lib == which;
    if wants(Stdlib::Basic) {
        registry.register(stdlib::basic::create_basic_lib());
    }
    if wants(Stdlib::Coroutine) {
        registry.register(stdlib::coroutine::create_coroutine_lib());
    }
    if wants(Stdlib::Table) {
        registry.register(stdlib::table::create_table_lib());
    }
    if wants(Stdlib::Math) {
        registry.register(stdlib::math::create_math_lib());
    }
    registry
}
