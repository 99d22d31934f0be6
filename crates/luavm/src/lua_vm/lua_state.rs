// LuaState - one thread of execution
//
// Owns the value stack (shared with the open upvalues aliasing it), the frame
// stack and the open-upvalue side table. The stack is only ever borrowed inside
// the small helpers below, never across a call, so upvalues of this thread can
// be read while another thread runs.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::call_info::CallInfo;
use super::execute::lua_execute;
use super::lua_limits::{BASIC_STACK_SIZE, EXTRA_STACK, LUA_MINSTACK, LUA_MULTRET};
use super::{GlobalState, LuaError, LuaResult, SafeOption};
use crate::lua_value::{LuaUpvalue, LuaValue, StackRef, TableRef, ThreadRef};

/// Lifecycle of a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Created, entry function not entered yet
    Fresh,
    /// Executing (or resuming another thread)
    Running,
    /// Stopped at a yield, frames intact
    Suspended,
    /// Returned or raised; cannot run again
    Dead,
}

pub struct LuaState {
    /// Value slots. Grows on demand up to `SafeOption::max_stack_size`.
    stack: StackRef,

    /// First free slot (dynamic top)
    pub(crate) stack_top: usize,

    /// Active frames, innermost last
    pub(crate) call_stack: Vec<CallInfo>,

    /// Open upvalues keyed by the stack slot they alias
    open_upvalues: BTreeMap<usize, Rc<LuaUpvalue>>,

    status: ThreadStatus,

    /// Values handed out by the last yield
    yield_values: Vec<LuaValue>,

    /// Set by `do_yield`, consumed by `resume`
    pub(crate) yielding: bool,

    /// Number of non-yieldable nested calls in progress
    nny: usize,

    is_main: bool,

    /// Handle to the `Rc` owning this state, for `coroutine.running`
    this: Weak<RefCell<LuaState>>,

    global: Rc<GlobalState>,
}

impl LuaState {
    fn new(global: Rc<GlobalState>, is_main: bool, this: Weak<RefCell<LuaState>>) -> Self {
        LuaState {
            stack: Rc::new(RefCell::new(vec![LuaValue::Nil; BASIC_STACK_SIZE])),
            stack_top: 0,
            call_stack: Vec::with_capacity(16),
            open_upvalues: BTreeMap::new(),
            status: if is_main {
                ThreadStatus::Running
            } else {
                ThreadStatus::Fresh
            },
            yield_values: Vec::new(),
            yielding: false,
            nny: 0,
            is_main,
            this,
            global,
        }
    }

    /// Main thread of a fresh engine instance
    pub(crate) fn new_main(global: Rc<GlobalState>) -> ThreadRef {
        Rc::new_cyclic(|this| RefCell::new(LuaState::new(global, true, this.clone())))
    }

    /// Coroutine whose entry function is `func`
    pub fn new_thread(global: Rc<GlobalState>, func: LuaValue) -> ThreadRef {
        let thread = Rc::new_cyclic(|this| RefCell::new(LuaState::new(global, false, this.clone())));
        {
            let mut state = thread.borrow_mut();
            state.stack_set(0, func);
            state.stack_top = 1;
        }
        thread
    }

    // ===== Accessors =====

    #[inline]
    pub fn status(&self) -> ThreadStatus {
        self.status
    }

    #[inline]
    pub fn is_main_thread(&self) -> bool {
        self.is_main
    }

    /// The `Rc` owning this state (None only while it is being dropped)
    pub fn thread_ref(&self) -> Option<ThreadRef> {
        self.this.upgrade()
    }

    /// Whether `thread` is this very state
    pub fn is_same_thread(&self, thread: &ThreadRef) -> bool {
        std::ptr::eq(self.this.as_ptr(), Rc::as_ptr(thread))
    }

    #[inline]
    pub fn global(&self) -> &Rc<GlobalState> {
        &self.global
    }

    #[inline]
    pub fn globals(&self) -> &TableRef {
        &self.global.globals
    }

    #[inline]
    pub fn safe_option(&self) -> &SafeOption {
        &self.global.safe_option
    }

    #[inline]
    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    #[inline]
    pub fn current_frame(&self) -> Option<&CallInfo> {
        self.call_stack.last()
    }

    #[inline]
    pub fn current_frame_mut(&mut self) -> Option<&mut CallInfo> {
        self.call_stack.last_mut()
    }

    /// Whether a yield issued now would be accepted
    pub fn is_yieldable(&self) -> bool {
        !self.is_main && self.nny == 0
    }

    #[inline]
    pub fn get_top(&self) -> usize {
        self.stack_top
    }

    #[inline]
    pub fn set_top(&mut self, top: usize) {
        self.stack_top = top;
    }

    // ===== Stack =====

    #[inline]
    pub fn stack_get(&self, index: usize) -> LuaValue {
        self.stack.borrow().get(index).cloned().unwrap_or_default()
    }

    #[inline]
    pub fn stack_set(&mut self, index: usize, value: LuaValue) {
        let mut stack = self.stack.borrow_mut();
        if index >= stack.len() {
            stack.resize(index + 1, LuaValue::Nil);
        }
        stack[index] = value;
    }

    /// Nil out `[from, to)`
    pub(crate) fn clear_range(&mut self, from: usize, to: usize) {
        let mut stack = self.stack.borrow_mut();
        let to = to.min(stack.len());
        if from < to {
            stack[from..to].fill(LuaValue::Nil);
        }
    }

    /// Move `n` values from `src` to `dst` (ascending copy; `dst <= src` or disjoint)
    pub(crate) fn move_values(&mut self, src: usize, dst: usize, n: usize) {
        if n == 0 || src == dst {
            return;
        }
        let mut stack = self.stack.borrow_mut();
        let needed = src.max(dst) + n;
        if needed > stack.len() {
            stack.resize(needed, LuaValue::Nil);
        }
        for i in 0..n {
            stack[dst + i] = stack[src + i].clone();
        }
    }

    /// Make sure slots below `needed` exist, within the configured limit
    pub(crate) fn ensure_stack(&mut self, needed: usize) -> LuaResult<()> {
        let limit = self.global.safe_option.max_stack_size;
        if needed > limit {
            debug!(needed, limit, "value stack overflow");
            return Err(self.overflow_error("stack overflow"));
        }
        let mut stack = self.stack.borrow_mut();
        if needed > stack.len() {
            let grown = (stack.len() + stack.len() / 2).max(needed).min(limit);
            stack.resize(grown, LuaValue::Nil);
        }
        Ok(())
    }

    // ===== Errors =====

    /// `source:line: ` of the frame `level` steps below the innermost one;
    /// empty for native frames
    pub fn where_prefix(&self, level: usize) -> String {
        let depth = self.call_stack.len();
        if level >= depth {
            return String::new();
        }
        let ci = &self.call_stack[depth - 1 - level];
        let LuaValue::Function(func) = &ci.func else {
            return String::new();
        };
        let chunk = &func.chunk;
        let source = chunk.source();
        let source = source
            .strip_prefix('@')
            .or_else(|| source.strip_prefix('='))
            .unwrap_or(source);
        match chunk.line_at(ci.pc.saturating_sub(1)) {
            Some(line) => format!("{}:{}: ", source, line),
            None => format!("{}: ", source),
        }
    }

    /// Runtime error raised by a native function, located at its caller.
    /// The message travels as an ordinary string error value.
    #[cold]
    pub fn error(&self, msg: impl Into<String>) -> LuaError {
        LuaError::UserError(LuaValue::from(format!("{}{}", self.where_prefix(1), msg.into())))
    }

    /// Bad argument count or type passed to the running native
    #[cold]
    pub fn argument_error(&self, msg: impl Into<String>) -> LuaError {
        LuaError::ArgumentError(format!("{}{}", self.where_prefix(1), msg.into()))
    }

    /// Type error raised by the running script frame
    #[cold]
    pub fn type_error(&self, msg: impl Into<String>) -> LuaError {
        LuaError::TypeError(format!("{}{}", self.where_prefix(0), msg.into()))
    }

    #[cold]
    fn overflow_error(&self, msg: &str) -> LuaError {
        LuaError::StackOverflow(format!("{}{}", self.where_prefix(0), msg))
    }

    // ===== Upvalues =====

    /// The open upvalue aliasing `stack_index`, created on first capture
    pub fn find_or_create_upvalue(&mut self, stack_index: usize) -> Rc<LuaUpvalue> {
        if let Some(upval) = self.open_upvalues.get(&stack_index) {
            return upval.clone();
        }
        let upval = Rc::new(LuaUpvalue::new_open(&self.stack, stack_index));
        self.open_upvalues.insert(stack_index, upval.clone());
        upval
    }

    /// Close every open upvalue at or above `level`
    pub fn close_upvalues(&mut self, level: usize) {
        if self.open_upvalues.is_empty() {
            return;
        }
        let closing = self.open_upvalues.split_off(&level);
        for (index, upval) in closing {
            trace!(index, "close upvalue");
            upval.close(self.stack_get(index));
        }
    }

    #[cfg(test)]
    pub(crate) fn open_upvalue_count(&self) -> usize {
        self.open_upvalues.len()
    }

    // ===== Calls =====

    /// Enter the value at `func_idx` with `nargs` arguments above it.
    ///
    /// Script closures get a frame pushed and `true` is returned; the dispatch
    /// loop then picks it up. Natives run to completion here (results already
    /// delivered to `results_idx`) and `false` is returned. A native that
    /// yielded keeps its frame and leaves `yielding` set.
    pub(crate) fn precall(
        &mut self,
        func_idx: usize,
        nargs: usize,
        results_idx: usize,
        nresults: i32,
    ) -> LuaResult<bool> {
        if self.call_stack.len() >= self.global.safe_option.max_call_depth {
            debug!(depth = self.call_stack.len(), "call stack overflow");
            return Err(self.overflow_error("stack overflow"));
        }
        let func = self.stack_get(func_idx);
        let yieldable = self.is_yieldable();
        match &func {
            LuaValue::Function(closure) => {
                let chunk = closure.chunk.clone();
                let nparams = chunk.param_count;
                let frame_size = chunk.max_stack_size.max(nparams);
                let mut base = func_idx + 1;
                let mut nvarargs = 0;

                if chunk.is_vararg && nargs > nparams {
                    // Fixed parameters move above the extra arguments, which stay
                    // below the new base as the vararg region
                    nvarargs = nargs - nparams;
                    self.ensure_stack(base + nargs + frame_size + EXTRA_STACK)?;
                    self.move_values(base, base + nargs, nparams);
                    self.clear_range(base, base + nparams);
                    base += nargs;
                } else {
                    self.ensure_stack(base + frame_size + EXTRA_STACK)?;
                    if nargs > nparams {
                        self.clear_range(base + nparams, base + nargs);
                    }
                }

                let top = base + frame_size;
                let first_free = if nvarargs > 0 {
                    base + nparams
                } else {
                    base + nargs.min(nparams)
                };
                self.clear_range(first_free, top.max(self.stack_top));

                let mut ci = CallInfo::new_lua(func.clone(), func_idx, base, top);
                ci.nvarargs = nvarargs;
                ci.nresults = nresults;
                ci.results_idx = results_idx;
                ci.set_yieldable(yieldable);
                trace!(depth = self.call_stack.len(), base, "push script frame");
                self.call_stack.push(ci);
                self.stack_top = top;
                Ok(true)
            }
            LuaValue::CFunction(native) => {
                let native = native.clone();
                self.ensure_stack(func_idx + 1 + nargs + LUA_MINSTACK)?;
                let mut ci = CallInfo::new_c(func.clone(), func_idx, nargs);
                ci.nresults = nresults;
                ci.results_idx = results_idx;
                ci.set_yieldable(yieldable);
                self.call_stack.push(ci);
                self.stack_top = func_idx + 1 + nargs;

                let n = (native.func)(self)?;
                if self.yielding {
                    return Ok(false);
                }
                let n = n.min(self.stack_top);
                self.poscall(self.stack_top - n, n);
                Ok(false)
            }
            other => Err(self.type_error(format!("attempt to call a {} value", other.type_name()))),
        }
    }

    /// Finish the innermost frame: its `n` results start at `src`
    pub(crate) fn poscall(&mut self, src: usize, n: usize) {
        let Some(ci) = self.call_stack.pop() else {
            return;
        };
        trace!(depth = self.call_stack.len(), n, tail = ci.is_tail(), "pop frame");
        let dst = ci.results_idx;
        let wanted = if ci.nresults == LUA_MULTRET {
            n
        } else {
            ci.nresults as usize
        };
        let copied = n.min(wanted);
        self.move_values(src, dst, copied);
        self.clear_range(dst + copied, dst + wanted);

        let vacated_from = (dst + wanted).max(ci.func_idx);
        let vacated_to = self.stack_top.max(ci.top);
        self.clear_range(vacated_from, vacated_to);
        self.stack_top = dst + wanted;

        if ci.nresults != LUA_MULTRET {
            if let Some(caller) = self.call_stack.last() {
                if caller.is_lua() {
                    self.stack_top = caller.top;
                }
            }
        }
    }

    /// Call the value at `func_idx` and run it to completion
    pub fn call(&mut self, func_idx: usize, nargs: usize, nresults: i32) -> LuaResult<()> {
        let depth = self.call_stack.len();
        if self.precall(func_idx, nargs, func_idx, nresults)? {
            lua_execute(self, depth)?;
        }
        Ok(())
    }

    /// Call `func` from native code and collect every result.
    /// The nested call cannot yield.
    pub fn call_value(&mut self, func: LuaValue, args: Vec<LuaValue>) -> LuaResult<Vec<LuaValue>> {
        let func_idx = self.stack_top;
        let nargs = args.len();
        self.ensure_stack(func_idx + 1 + nargs)?;
        self.stack_set(func_idx, func);
        for (i, arg) in args.into_iter().enumerate() {
            self.stack_set(func_idx + 1 + i, arg);
        }
        self.stack_top = func_idx + 1 + nargs;

        self.nny += 1;
        let outcome = self.call(func_idx, nargs, LUA_MULTRET);
        self.nny -= 1;
        outcome?;

        let results = {
            let stack = self.stack.borrow();
            stack[func_idx..self.stack_top].to_vec()
        };
        self.clear_range(func_idx, self.stack_top);
        self.stack_top = func_idx;
        Ok(results)
    }

    /// Protected call of the value at `func_idx`.
    ///
    /// On success returns `(true, n)` with the results at `func_idx..`; on a
    /// catchable error unwinds to the entry depth and returns `(false, 1)` with
    /// the error value at `func_idx`. In both cases `stack_top` is just past
    /// the delivered values.
    pub fn pcall(&mut self, func_idx: usize, nargs: usize) -> LuaResult<(bool, usize)> {
        let depth = self.call_stack.len();
        self.nny += 1;
        let outcome = self.call(func_idx, nargs, LUA_MULTRET);
        self.nny -= 1;
        match outcome {
            Ok(()) => Ok((true, self.stack_top - func_idx)),
            Err(err) if err.is_catchable() => {
                debug!(error = %err, depth, "protected call unwound");
                self.unwind(func_idx, depth);
                self.stack_set(func_idx, err.into_value());
                self.stack_top = func_idx + 1;
                Ok((false, 1))
            }
            Err(err) => Err(err),
        }
    }

    /// `call_value` that puts the stack and frames back as they were when the
    /// call fails
    pub fn call_value_restoring(
        &mut self,
        func: LuaValue,
        args: Vec<LuaValue>,
    ) -> LuaResult<Vec<LuaValue>> {
        let top = self.stack_top;
        let depth = self.call_stack.len();
        self.call_value(func, args).inspect_err(|_| self.unwind(top, depth))
    }

    /// Drop every frame above `depth` and every value from `level` up,
    /// closing the upvalues that alias them
    fn unwind(&mut self, level: usize, depth: usize) {
        let high = self
            .call_stack
            .get(depth..)
            .unwrap_or_default()
            .iter()
            .map(|ci| ci.top)
            .fold(self.stack_top, usize::max);
        self.close_upvalues(level);
        self.call_stack.truncate(depth);
        self.yielding = false;
        self.clear_range(level, high);
        self.stack_top = level;
    }

    // ===== Coroutines =====

    /// Start or continue this thread; `args` become the entry arguments or the
    /// results of the pending yield. Returns the yielded or returned values.
    pub fn resume(&mut self, args: Vec<LuaValue>) -> LuaResult<Vec<LuaValue>> {
        let outcome = match self.status {
            ThreadStatus::Fresh => {
                self.status = ThreadStatus::Running;
                self.start(args)
            }
            ThreadStatus::Suspended => {
                self.status = ThreadStatus::Running;
                self.continue_after_yield(args)
            }
            ThreadStatus::Running => {
                return Err(LuaError::InvalidOperation(
                    "cannot resume non-suspended coroutine".to_string(),
                ));
            }
            ThreadStatus::Dead => {
                return Err(LuaError::InvalidOperation(
                    "cannot resume dead coroutine".to_string(),
                ));
            }
        };

        match outcome {
            Ok(()) if self.yielding => {
                self.status = ThreadStatus::Suspended;
                debug!(n = self.yield_values.len(), "coroutine yield");
                Ok(std::mem::take(&mut self.yield_values))
            }
            Ok(()) => {
                self.status = ThreadStatus::Dead;
                let results = {
                    let stack = self.stack.borrow();
                    stack[..self.stack_top.min(stack.len())].to_vec()
                };
                debug!(n = results.len(), "coroutine finished");
                Ok(results)
            }
            Err(err) => {
                self.status = ThreadStatus::Dead;
                self.yielding = false;
                self.close_upvalues(0);
                self.call_stack.clear();
                debug!(error = %err, "coroutine died");
                Err(err)
            }
        }
    }

    fn start(&mut self, args: Vec<LuaValue>) -> LuaResult<()> {
        let nargs = args.len();
        debug!(nargs, "coroutine start");
        self.ensure_stack(1 + nargs)?;
        for (i, arg) in args.into_iter().enumerate() {
            self.stack_set(1 + i, arg);
        }
        self.stack_top = 1 + nargs;
        if self.precall(0, nargs, 0, LUA_MULTRET)? && !self.yielding {
            lua_execute(self, 0)?;
        }
        Ok(())
    }

    /// Deliver `args` as the results of the yielding native and carry on
    fn continue_after_yield(&mut self, args: Vec<LuaValue>) -> LuaResult<()> {
        let nargs = args.len();
        debug!(nargs, "coroutine resume");
        self.yielding = false;
        let base = self.call_stack.last().map_or(1, |ci| ci.base);
        self.ensure_stack(base + nargs)?;
        for (i, arg) in args.into_iter().enumerate() {
            self.stack_set(base + i, arg);
        }
        self.stack_top = base + nargs;
        self.poscall(base, nargs);
        if !self.call_stack.is_empty() {
            lua_execute(self, 0)?;
        }
        Ok(())
    }

    /// Suspend the running coroutine, handing out the current native's
    /// arguments. Called from a native; the native then returns.
    pub fn do_yield(&mut self) -> LuaResult<usize> {
        if self.is_main {
            return Err(self.error("attempt to yield from outside a coroutine"));
        }
        if !self.current_frame().is_some_and(CallInfo::is_yieldable) {
            return Err(self.error("attempt to yield across a C-call boundary"));
        }
        self.yield_values = self.get_args();
        self.yielding = true;
        Ok(0)
    }

    // ===== Native function API =====

    /// Argument `index` (1-based) of the running native
    pub fn get_arg(&self, index: usize) -> Option<LuaValue> {
        let ci = self.current_frame()?;
        if index == 0 || ci.base + index > ci.top {
            return None;
        }
        Some(self.stack_get(ci.base + index - 1))
    }

    pub fn arg_count(&self) -> usize {
        self.current_frame()
            .map_or(0, |ci| ci.top.saturating_sub(ci.base))
    }

    pub fn get_args(&self) -> Vec<LuaValue> {
        match self.current_frame() {
            Some(ci) => {
                let stack = self.stack.borrow();
                let end = ci.top.min(stack.len());
                stack[ci.base.min(end)..end].to_vec()
            }
            None => Vec::new(),
        }
    }

    /// Overwrite argument `index` (1-based) in place
    pub fn set_arg(&mut self, index: usize, value: LuaValue) {
        if let Some(base) = self.current_frame().map(|ci| ci.base) {
            if index > 0 {
                self.stack_set(base + index - 1, value);
            }
        }
    }

    /// Push a result of the running native
    pub fn push_value(&mut self, value: LuaValue) -> LuaResult<()> {
        let top = self.stack_top;
        self.ensure_stack(top + 1)?;
        self.stack_set(top, value);
        self.stack_top = top + 1;
        Ok(())
    }

    /// Bound value `index` (0-based) of the running native closure
    pub fn native_upvalue(&self, index: usize) -> LuaValue {
        match self.current_frame().map(|ci| &ci.func) {
            Some(LuaValue::CFunction(native)) => {
                native.upvalues.get(index).cloned().unwrap_or_default()
            }
            _ => LuaValue::Nil,
        }
    }

    fn native_name(&self) -> &'static str {
        match self.current_frame().map(|ci| &ci.func) {
            Some(LuaValue::CFunction(native)) => native.name,
            _ => "?",
        }
    }

    #[cold]
    pub fn arg_error(&self, index: usize, msg: &str) -> LuaError {
        self.argument_error(format!(
            "bad argument #{} to '{}' ({})",
            index,
            self.native_name(),
            msg
        ))
    }

    #[cold]
    fn type_mismatch(&self, index: usize, expected: &str) -> LuaError {
        let got = self
            .get_arg(index)
            .map_or("no value", |v| v.type_name());
        self.arg_error(index, &format!("{} expected, got {}", expected, got))
    }

    pub fn check_any(&self, index: usize) -> LuaResult<LuaValue> {
        self.get_arg(index)
            .ok_or_else(|| self.arg_error(index, "value expected"))
    }

    pub fn check_table(&self, index: usize) -> LuaResult<TableRef> {
        match self.get_arg(index) {
            Some(LuaValue::Table(t)) => Ok(t),
            _ => Err(self.type_mismatch(index, "table")),
        }
    }

    pub fn check_number(&self, index: usize) -> LuaResult<f64> {
        self.get_arg(index)
            .and_then(|v| v.to_number())
            .ok_or_else(|| self.type_mismatch(index, "number"))
    }

    pub fn check_integer(&self, index: usize) -> LuaResult<i64> {
        let n = self.check_number(index)?;
        crate::lua_value::float_to_integer(n)
            .ok_or_else(|| self.arg_error(index, "number has no integer representation"))
    }

    pub fn check_string(&self, index: usize) -> LuaResult<String> {
        match self.get_arg(index) {
            Some(LuaValue::String(s)) => Ok(s.as_str().to_string()),
            Some(LuaValue::Number(n)) => Ok(crate::lua_value::format_number(n)),
            _ => Err(self.type_mismatch(index, "string")),
        }
    }

    /// Optional integer argument with a default for nil/absent
    pub fn opt_integer(&self, index: usize, default: i64) -> LuaResult<i64> {
        match self.get_arg(index) {
            None | Some(LuaValue::Nil) => Ok(default),
            Some(_) => self.check_integer(index),
        }
    }

    // ===== Globals =====

    pub fn get_global(&self, name: &str) -> LuaValue {
        self.global.globals.borrow().get_str(name)
    }

    pub fn set_global(&mut self, name: &str, value: LuaValue) -> LuaResult<()> {
        self.global
            .globals
            .borrow_mut()
            .raw_set(LuaValue::string(name), value)
            .map_err(|msg| self.error(msg))
    }
}

impl Drop for LuaState {
    fn drop(&mut self) {
        // Closures outliving the thread keep the last values of their variables
        self.close_upvalues(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua_value::LuaTable;

    fn state() -> ThreadRef {
        LuaState::new_main(Rc::new(GlobalState::new(SafeOption::default())))
    }

    #[test]
    fn test_upvalue_shared_per_slot() {
        let l = state();
        let mut l = l.borrow_mut();
        let a = l.find_or_create_upvalue(3);
        let b = l.find_or_create_upvalue(3);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(l.open_upvalue_count(), 1);

        l.stack_set(3, LuaValue::integer(7));
        assert_eq!(a.get(), LuaValue::integer(7));
        b.set(LuaValue::integer(8));
        assert_eq!(l.stack_get(3), LuaValue::integer(8));

        l.close_upvalues(3);
        assert_eq!(l.open_upvalue_count(), 0);
        l.stack_set(3, LuaValue::Nil);
        assert_eq!(a.get(), LuaValue::integer(8));

        // slot is free for an unrelated variable again
        let c = l.find_or_create_upvalue(3);
        assert!(!Rc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_close_only_above_level() {
        let l = state();
        let mut l = l.borrow_mut();
        let low = l.find_or_create_upvalue(1);
        let high = l.find_or_create_upvalue(5);
        l.close_upvalues(2);
        assert!(low.is_open());
        assert!(!high.is_open());
    }

    #[test]
    fn test_drop_closes_upvalues() {
        let upval = {
            let l = state();
            let mut l = l.borrow_mut();
            l.stack_set(2, LuaValue::string("kept"));
            let upval = l.find_or_create_upvalue(2);
            drop(l);
            upval
        };
        assert!(!upval.is_open());
        assert_eq!(upval.get(), LuaValue::string("kept"));
    }

    #[test]
    fn test_call_not_callable() {
        let l = state();
        let mut l = l.borrow_mut();
        l.stack_set(0, LuaValue::table(LuaTable::default()));
        l.stack_top = 1;
        let err = l.call(0, 0, 0).unwrap_err();
        assert!(matches!(err, LuaError::TypeError(_)));
        assert!(err.to_string().contains("attempt to call a table value"));
    }

    #[test]
    fn test_stack_limit() {
        let global = Rc::new(GlobalState::new(SafeOption {
            max_stack_size: 64,
            max_call_depth: 10,
        }));
        let l = LuaState::new_main(global);
        let mut l = l.borrow_mut();
        assert!(l.ensure_stack(64).is_ok());
        assert!(matches!(l.ensure_stack(65), Err(LuaError::StackOverflow(_))));
    }
}
