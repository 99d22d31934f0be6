// Value model: tagged values, strings, closures, upvalues and prototypes

mod chunk_builder;
mod chunk_dump;
pub mod chunk_serializer;
mod lua_table;
#[allow(clippy::module_inception)]
mod lua_value;
mod parse_number;

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use smol_str::SmolStr;

use crate::lua_vm::{Instruction, LuaResult, LuaState};

pub use chunk_builder::ChunkBuilder;
pub use chunk_dump::dump_chunk;
pub use lua_table::LuaTable;
pub use lua_value::{LuaValue, LuaValueKind, float_to_integer, format_number};
pub use parse_number::{parse_lua_number, parse_lua_number_radix};

/// Shared handle to a table
pub type TableRef = Rc<RefCell<LuaTable>>;

/// Shared handle to a thread (coroutine or main thread)
pub type ThreadRef = Rc<RefCell<LuaState>>;

/// Value-slot array of one thread, shared with the open upvalues that alias it
pub type StackRef = Rc<RefCell<Vec<LuaValue>>>;

/// Native function signature.
/// Arguments live in the caller-visible window `1..=arg_count()`; results are
/// pushed with `push_value` and the function returns how many it pushed.
pub type CFunction = fn(&mut LuaState) -> LuaResult<usize>;

/// Immutable string with a precomputed hash
#[derive(Clone)]
pub struct LuaString {
    hash: u64,
    data: SmolStr,
}

impl LuaString {
    pub fn new(s: &str) -> Self {
        Self {
            hash: Self::hash_str(s),
            data: SmolStr::new(s),
        }
    }

    /// FNV-1a over the string bytes
    #[inline]
    fn hash_str(s: &str) -> u64 {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in s.as_bytes() {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }

    #[inline(always)]
    pub fn as_str(&self) -> &str {
        self.data.as_str()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl PartialEq for LuaString {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.data == other.data
    }
}

impl Eq for LuaString {}

impl Hash for LuaString {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for LuaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.data.as_str())
    }
}

impl fmt::Display for LuaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.data.as_str())
    }
}

/// Upvalue state
pub enum UpvalueState {
    /// Aliases `stack[index]` of the thread owning `stack`
    Open { stack: Weak<RefCell<Vec<LuaValue>>>, index: usize },
    /// Owns its value after the declaring frame died
    Closed(LuaValue),
}

/// Captured-variable cell shared by every closure capturing the same local
pub struct LuaUpvalue {
    state: RefCell<UpvalueState>,
}

impl LuaUpvalue {
    pub fn new_open(stack: &StackRef, index: usize) -> Self {
        Self {
            state: RefCell::new(UpvalueState::Open {
                stack: Rc::downgrade(stack),
                index,
            }),
        }
    }

    pub fn new_closed(value: LuaValue) -> Self {
        Self {
            state: RefCell::new(UpvalueState::Closed(value)),
        }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(*self.state.borrow(), UpvalueState::Open { .. })
    }

    /// Stack slot this upvalue aliases while open
    pub fn stack_index(&self) -> Option<usize> {
        match &*self.state.borrow() {
            UpvalueState::Open { index, .. } => Some(*index),
            UpvalueState::Closed(_) => None,
        }
    }

    pub fn get(&self) -> LuaValue {
        match &*self.state.borrow() {
            UpvalueState::Closed(value) => value.clone(),
            UpvalueState::Open { stack, index } => stack
                .upgrade()
                .and_then(|stack| stack.borrow().get(*index).cloned())
                .unwrap_or_default(),
        }
    }

    pub fn set(&self, value: LuaValue) {
        let mut state = self.state.borrow_mut();
        match &mut *state {
            UpvalueState::Closed(slot) => *slot = value,
            UpvalueState::Open { stack, index } => {
                if let Some(stack) = stack.upgrade() {
                    let mut stack = stack.borrow_mut();
                    if *index >= stack.len() {
                        stack.resize(*index + 1, LuaValue::Nil);
                    }
                    stack[*index] = value;
                } else {
                    *state = UpvalueState::Closed(value);
                }
            }
        }
    }

    /// Snapshot `value` into the cell; afterwards the cell no longer aliases the stack
    pub fn close(&self, value: LuaValue) {
        *self.state.borrow_mut() = UpvalueState::Closed(value);
    }
}

impl fmt::Debug for LuaUpvalue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.state.borrow() {
            UpvalueState::Open { index, .. } => write!(f, "Upvalue(open @{})", index),
            UpvalueState::Closed(v) => write!(f, "Upvalue(closed {:?})", v),
        }
    }
}

/// Script closure: a prototype plus its captured upvalues
pub struct LuaFunction {
    pub chunk: Rc<Chunk>,
    pub upvalues: Vec<Rc<LuaUpvalue>>,
}

impl LuaFunction {
    pub fn new(chunk: Rc<Chunk>, upvalues: Vec<Rc<LuaUpvalue>>) -> Self {
        Self { chunk, upvalues }
    }
}

/// Native function value: a Rust fn plus optional bound values
pub struct NativeFunction {
    pub name: &'static str,
    pub func: CFunction,
    pub upvalues: Vec<LuaValue>,
}

impl NativeFunction {
    pub fn new(name: &'static str, func: CFunction) -> Self {
        Self {
            name,
            func,
            upvalues: Vec::new(),
        }
    }

    pub fn with_upvalues(name: &'static str, func: CFunction, upvalues: Vec<LuaValue>) -> Self {
        Self {
            name,
            func,
            upvalues,
        }
    }
}

/// Upvalue descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpvalueDesc {
    /// Debug name (empty when stripped)
    pub name: SmolStr,
    /// true: capture the enclosing frame's register `index`;
    /// false: share the enclosing closure's upvalue `index`
    pub is_local: bool,
    pub index: u32,
}

/// Local variable debug record (pc range where the register is live)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocVar {
    pub name: SmolStr,
    pub startpc: u32,
    pub endpc: u32,
}

/// Immutable compiled function prototype
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub code: Vec<Instruction>,
    pub constants: Vec<LuaValue>,
    pub child_protos: Vec<Rc<Chunk>>,
    pub upvalue_descs: Vec<UpvalueDesc>,
    pub param_count: usize,
    pub is_vararg: bool,
    pub max_stack_size: usize,
    // debug info
    pub source_name: Option<SmolStr>,
    pub line_info: Vec<u32>,
    pub locals: Vec<LocVar>,
    pub linedefined: u32,
    pub lastlinedefined: u32,
}

impl Chunk {
    /// Source line of the instruction at `pc`, when debug info is present
    pub fn line_at(&self, pc: usize) -> Option<u32> {
        self.line_info.get(pc).copied()
    }

    pub fn source(&self) -> &str {
        self.source_name.as_deref().unwrap_or("?")
    }
}
