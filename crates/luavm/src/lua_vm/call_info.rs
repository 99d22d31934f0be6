// CallInfo - bookkeeping for one active call

use super::lua_limits::LUA_MULTRET;
use crate::lua_value::LuaValue;

/// Call status flags
pub mod call_status {
    /// Script function (has bytecode)
    pub const CIST_LUA: u32 = 1 << 0;
    /// Native function
    pub const CIST_C: u32 = 1 << 1;
    /// Frame was entered through a tail call
    pub const CIST_TAIL: u32 = 1 << 2;
    /// A yield may suspend the thread while this frame is active
    pub const CIST_YIELDABLE: u32 = 1 << 3;
}

/// Information about a single function call on the call stack
#[derive(Clone)]
pub struct CallInfo {
    /// The function being called
    pub func: LuaValue,

    /// Stack index of the function slot
    pub func_idx: usize,

    /// Stack index of register 0.
    /// Past `func_idx + 1` when varargs were relocated below the frame.
    pub base: usize,

    /// Frame extent: first slot past the register window
    pub top: usize,

    /// Next instruction to execute (script frames only)
    pub pc: usize,

    /// Number of extra arguments stored below `base`
    pub nvarargs: usize,

    /// Results the caller expects; LUA_MULTRET means all of them
    pub nresults: i32,

    /// Where results are copied on return
    pub results_idx: usize,

    /// CIST_* flags
    pub call_status: u32,
}

impl CallInfo {
    /// Create a new call frame for a script function
    pub fn new_lua(func: LuaValue, func_idx: usize, base: usize, top: usize) -> Self {
        Self {
            func,
            func_idx,
            base,
            top,
            pc: 0,
            nvarargs: 0,
            nresults: LUA_MULTRET,
            results_idx: func_idx,
            call_status: call_status::CIST_LUA,
        }
    }

    /// Create a new call frame for a native function
    pub fn new_c(func: LuaValue, func_idx: usize, nargs: usize) -> Self {
        Self {
            func,
            func_idx,
            base: func_idx + 1,
            top: func_idx + 1 + nargs,
            pc: 0,
            nvarargs: 0,
            nresults: LUA_MULTRET,
            results_idx: func_idx,
            call_status: call_status::CIST_C,
        }
    }

    #[inline(always)]
    pub fn is_lua(&self) -> bool {
        self.call_status & call_status::CIST_LUA != 0
    }

    #[inline(always)]
    pub fn is_c(&self) -> bool {
        self.call_status & call_status::CIST_C != 0
    }

    #[inline(always)]
    pub fn is_tail(&self) -> bool {
        self.call_status & call_status::CIST_TAIL != 0
    }

    #[inline(always)]
    pub fn set_tail(&mut self) {
        self.call_status |= call_status::CIST_TAIL;
    }

    #[inline(always)]
    pub fn is_yieldable(&self) -> bool {
        self.call_status & call_status::CIST_YIELDABLE != 0
    }

    #[inline(always)]
    pub fn set_yieldable(&mut self, yieldable: bool) {
        if yieldable {
            self.call_status |= call_status::CIST_YIELDABLE;
        } else {
            self.call_status &= !call_status::CIST_YIELDABLE;
        }
    }
}
