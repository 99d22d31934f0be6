use crate::lua_vm::LuaState;

/// return R(A), ..., R(A+B-2)
///
/// B=0 returns everything up to the dynamic top. Upvalues aliasing the frame
/// are closed before its slots are reused.
#[inline]
pub fn handle_return(l: &mut LuaState, base: usize, a: usize, b: usize) {
    let src = base + a;
    let n = if b != 0 {
        b - 1
    } else {
        l.stack_top.saturating_sub(src)
    };
    l.close_upvalues(base);
    l.poscall(src, n);
}
