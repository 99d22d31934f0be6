// Lua Virtual Machine
// Register-based bytecode engine: threads, frames, dispatch and the host facade
mod call_info;
mod execute;
mod lua_error;
pub mod lua_limits;
mod lua_state;
mod opcode;
mod safe_option;

use std::cell::RefCell;
use std::rc::Rc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::debug;

use crate::lib_registry;
use crate::lua_value::chunk_serializer;
use crate::lua_value::{
    CFunction, Chunk, LuaFunction, LuaTable, LuaUpvalue, LuaValue, NativeFunction, TableRef,
};

pub use call_info::CallInfo;
pub use lua_error::{LuaError, LuaResult};
pub use lua_state::{LuaState, ThreadStatus};
pub use opcode::{Instruction, OpCode, OpMode};
pub use safe_option::SafeOption;

use crate::stdlib::Stdlib;

/// State shared by every thread of one engine instance
pub struct GlobalState {
    /// `_ENV` of loaded chunks
    pub globals: TableRef,
    pub safe_option: SafeOption,
    /// Generator behind `math.random`
    pub(crate) rng: RefCell<StdRng>,
}

impl GlobalState {
    pub fn new(safe_option: SafeOption) -> Self {
        Self {
            globals: Rc::new(RefCell::new(LuaTable::new(0, 32))),
            safe_option,
            rng: RefCell::new(StdRng::from_entropy()),
        }
    }
}

/// Embedding entry point: a main thread plus the globals table
pub struct LuaVM {
    global: Rc<GlobalState>,
    main_thread: Rc<RefCell<LuaState>>,
}

impl LuaVM {
    pub fn new(safe_option: SafeOption) -> Self {
        let global = Rc::new(GlobalState::new(safe_option));
        let main_thread = LuaState::new_main(global.clone());
        LuaVM {
            global,
            main_thread,
        }
    }

    /// Register every standard library
    pub fn open_libs(&mut self) -> LuaResult<()> {
        self.open_stdlib(Stdlib::All)
    }

    /// Register one standard library (or all of them)
    pub fn open_stdlib(&mut self, lib: Stdlib) -> LuaResult<()> {
        lib_registry::create_registry(lib).load_all(self)
    }

    pub fn main_thread(&self) -> &Rc<RefCell<LuaState>> {
        &self.main_thread
    }

    pub fn safe_option(&self) -> &SafeOption {
        &self.global.safe_option
    }

    // ===== Loading =====

    /// Wrap a prototype into a callable closure. Upvalue 0 is `_ENV`, bound to
    /// the globals table; any further upvalues start out nil.
    pub fn load(&self, chunk: impl Into<Rc<Chunk>>) -> LuaValue {
        let chunk: Rc<Chunk> = chunk.into();
        debug!(
            source = chunk.source(),
            instructions = chunk.code.len(),
            "load chunk"
        );
        let upvalues = (0..chunk.upvalue_descs.len().max(1))
            .map(|i| {
                let value = if i == 0 {
                    LuaValue::Table(self.global.globals.clone())
                } else {
                    LuaValue::Nil
                };
                Rc::new(LuaUpvalue::new_closed(value))
            })
            .collect();
        LuaValue::function(LuaFunction::new(chunk, upvalues))
    }

    /// Deserialize a binary chunk and wrap it like `load`
    pub fn load_binary(&self, bytes: &[u8]) -> LuaResult<LuaValue> {
        let chunk = chunk_serializer::deserialize_chunk(bytes)
            .map_err(|msg| LuaError::InvalidOperation(format!("malformed binary chunk: {}", msg)))?;
        Ok(self.load(chunk))
    }

    // ===== Execution =====

    /// Load and run a prototype on the main thread
    pub fn execute(&mut self, chunk: impl Into<Rc<Chunk>>) -> LuaResult<Vec<LuaValue>> {
        let func = self.load(chunk);
        self.call(func, Vec::new())
    }

    /// Call `func` on the main thread and return all of its results
    pub fn call(&mut self, func: LuaValue, args: Vec<LuaValue>) -> LuaResult<Vec<LuaValue>> {
        let mut state = self.main_thread.try_borrow_mut().map_err(|_| {
            LuaError::InvalidOperation("main thread is already running".to_string())
        })?;
        state.call_value_restoring(func, args)
    }

    /// Protected call: `Ok(Ok(results))` on success, `Ok(Err(value))` when the
    /// script raised; only non-catchable errors come back as `Err`.
    pub fn pcall(
        &mut self,
        func: LuaValue,
        args: Vec<LuaValue>,
    ) -> LuaResult<Result<Vec<LuaValue>, LuaValue>> {
        match self.call(func, args) {
            Ok(results) => Ok(Ok(results)),
            Err(err) if err.is_catchable() => Ok(Err(err.into_value())),
            Err(err) => Err(err),
        }
    }

    /// Resume a coroutine from the host
    pub fn resume(&mut self, thread: &LuaValue, args: Vec<LuaValue>) -> LuaResult<Vec<LuaValue>> {
        let Some(thread) = thread.as_thread() else {
            return Err(LuaError::InvalidOperation(format!(
                "cannot resume a {} value",
                thread.type_name()
            )));
        };
        let mut state = thread.try_borrow_mut().map_err(|_| {
            LuaError::InvalidOperation("cannot resume non-suspended coroutine".to_string())
        })?;
        state.resume(args)
    }

    // ===== Globals =====

    pub fn globals(&self) -> TableRef {
        self.global.globals.clone()
    }

    pub fn get_global(&self, name: &str) -> LuaValue {
        self.global.globals.borrow().get_str(name)
    }

    pub fn set_global(&mut self, name: &str, value: LuaValue) {
        self.global.globals.borrow_mut().set_str(name, value);
    }

    // ===== Object creation =====

    pub fn create_table(&self, array_size: usize, hash_size: usize) -> LuaValue {
        LuaValue::table(LuaTable::new(array_size, hash_size))
    }

    pub fn create_string(&self, s: &str) -> LuaValue {
        LuaValue::string(s)
    }

    pub fn create_function(&self, name: &'static str, func: CFunction) -> LuaValue {
        LuaValue::cfunction(name, func)
    }

    /// Native closure carrying bound values
    pub fn create_closure(
        &self,
        name: &'static str,
        func: CFunction,
        upvalues: Vec<LuaValue>,
    ) -> LuaValue {
        LuaValue::CFunction(Rc::new(NativeFunction::with_upvalues(name, func, upvalues)))
    }

    /// New suspended coroutine with `func` as its body
    pub fn create_thread(&self, func: LuaValue) -> LuaValue {
        LuaValue::Thread(LuaState::new_thread(self.global.clone(), func))
    }
}

impl Default for LuaVM {
    fn default() -> Self {
        Self::new(SafeOption::default())
    }
}
