// Lua Runtime
// An embeddable register-bytecode VM: values, tables, closures, coroutines and metatables

#[cfg(test)]
mod test;

pub mod lib_registry;
pub mod lua_value;
pub mod lua_vm;
pub mod stdlib;

#[cfg(feature = "serde")]
pub mod serde;

pub use lib_registry::LibraryRegistry;
pub use lua_value::{Chunk, ChunkBuilder, LuaFunction, LuaTable, LuaValue};
pub use lua_vm::{
    Instruction, LuaError, LuaResult, LuaState, LuaVM, OpCode, SafeOption, ThreadStatus,
};
pub use stdlib::Stdlib;
