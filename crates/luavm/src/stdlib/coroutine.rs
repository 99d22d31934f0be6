// Coroutine library
// Implements: create, resume, yield, status, running, wrap, isyieldable

use std::rc::Rc;

use crate::lib_registry::LibraryModule;
use crate::lua_value::{LuaValue, NativeFunction, ThreadRef};
use crate::lua_vm::{LuaError, LuaResult, LuaState, ThreadStatus};

pub fn create_coroutine_lib() -> LibraryModule {
    crate::lib_module!("coroutine", {
        "create" => coroutine_create,
        "resume" => coroutine_resume,
        "yield" => coroutine_yield,
        "status" => coroutine_status,
        "running" => coroutine_running,
        "wrap" => coroutine_wrap,
        "isyieldable" => coroutine_isyieldable,
    })
}

fn check_function(l: &LuaState, index: usize) -> LuaResult<LuaValue> {
    match l.get_arg(index) {
        Some(func) if func.is_function() => Ok(func),
        other => Err(l.arg_error(
            index,
            &format!(
                "function expected, got {}",
                other.map_or("no value", |v| v.type_name())
            ),
        )),
    }
}

fn check_thread(l: &LuaState, index: usize) -> LuaResult<ThreadRef> {
    match l.get_arg(index) {
        Some(LuaValue::Thread(t)) => Ok(t),
        other => Err(l.arg_error(
            index,
            &format!(
                "coroutine expected, got {}",
                other.map_or("no value", |v| v.type_name())
            ),
        )),
    }
}

enum Resumed {
    Values(Vec<LuaValue>),
    /// The coroutine raised; it is dead now
    Raised(LuaValue),
    /// The coroutine was not in a resumable state
    Refused(&'static str),
}

fn resume_thread(l: &LuaState, co: &ThreadRef, args: Vec<LuaValue>) -> LuaResult<Resumed> {
    if l.is_same_thread(co) {
        return Ok(Resumed::Refused("cannot resume non-suspended coroutine"));
    }
    // Already borrowed: it is running further down the resume chain
    let Ok(mut state) = co.try_borrow_mut() else {
        return Ok(Resumed::Refused("cannot resume non-suspended coroutine"));
    };
    match state.status() {
        ThreadStatus::Dead => return Ok(Resumed::Refused("cannot resume dead coroutine")),
        ThreadStatus::Running => {
            return Ok(Resumed::Refused("cannot resume non-suspended coroutine"));
        }
        ThreadStatus::Fresh | ThreadStatus::Suspended => {}
    }
    match state.resume(args) {
        Ok(values) => Ok(Resumed::Values(values)),
        Err(err) if err.is_catchable() => Ok(Resumed::Raised(err.into_value())),
        Err(err) => Err(err),
    }
}

/// coroutine.create(f) - New suspended coroutine running `f`
fn coroutine_create(l: &mut LuaState) -> LuaResult<usize> {
    let func = check_function(l, 1)?;
    let thread = LuaState::new_thread(l.global().clone(), func);
    l.push_value(LuaValue::Thread(thread))?;
    Ok(1)
}

/// coroutine.resume(co, ...) - true plus yielded/returned values, or false plus the error
fn coroutine_resume(l: &mut LuaState) -> LuaResult<usize> {
    let co = check_thread(l, 1)?;
    let args = l.get_args().into_iter().skip(1).collect();
    let error = match resume_thread(l, &co, args)? {
        Resumed::Values(values) => {
            let n = values.len();
            l.push_value(LuaValue::Boolean(true))?;
            for value in values {
                l.push_value(value)?;
            }
            return Ok(n + 1);
        }
        Resumed::Raised(error) => error,
        Resumed::Refused(msg) => LuaValue::string(msg),
    };
    l.push_value(LuaValue::Boolean(false))?;
    l.push_value(error)?;
    Ok(2)
}

/// coroutine.yield(...) - Suspend the running coroutine
fn coroutine_yield(l: &mut LuaState) -> LuaResult<usize> {
    l.do_yield()
}

/// coroutine.status(co) - "running", "suspended", "normal" or "dead"
fn coroutine_status(l: &mut LuaState) -> LuaResult<usize> {
    let co = check_thread(l, 1)?;
    let status = if l.is_same_thread(&co) {
        "running"
    } else {
        match co.try_borrow() {
            // Borrowed: it is resuming someone further up the chain
            Err(_) => "normal",
            Ok(state) => match state.status() {
                ThreadStatus::Fresh | ThreadStatus::Suspended => "suspended",
                ThreadStatus::Running => "normal",
                ThreadStatus::Dead => "dead",
            },
        }
    };
    l.push_value(LuaValue::string(status))?;
    Ok(1)
}

/// coroutine.running() - Running thread plus whether it is the main one
fn coroutine_running(l: &mut LuaState) -> LuaResult<usize> {
    let thread = l.thread_ref().map_or(LuaValue::Nil, LuaValue::Thread);
    let is_main = l.is_main_thread();
    l.push_value(thread)?;
    l.push_value(LuaValue::Boolean(is_main))?;
    Ok(2)
}

/// coroutine.wrap(f) - Function that resumes a new coroutine and re-raises its errors
fn coroutine_wrap(l: &mut LuaState) -> LuaResult<usize> {
    let func = check_function(l, 1)?;
    let thread = LuaState::new_thread(l.global().clone(), func);
    let wrapper = NativeFunction::with_upvalues("wrap", wrap_aux, vec![LuaValue::Thread(thread)]);
    l.push_value(LuaValue::CFunction(Rc::new(wrapper)))?;
    Ok(1)
}

fn wrap_aux(l: &mut LuaState) -> LuaResult<usize> {
    let LuaValue::Thread(co) = l.native_upvalue(0) else {
        return Err(LuaError::InvalidOperation(
            "wrapped coroutine lost its thread".to_string(),
        ));
    };
    let args = l.get_args();
    match resume_thread(l, &co, args)? {
        Resumed::Values(values) => {
            let n = values.len();
            for value in values {
                l.push_value(value)?;
            }
            Ok(n)
        }
        Resumed::Raised(error) => Err(LuaError::UserError(error)),
        Resumed::Refused(msg) => Err(l.error(msg)),
    }
}

/// coroutine.isyieldable() - Whether the running code may yield
fn coroutine_isyieldable(l: &mut LuaState) -> LuaResult<usize> {
    let yieldable = l.is_yieldable();
    l.push_value(LuaValue::Boolean(yieldable))?;
    Ok(1)
}
