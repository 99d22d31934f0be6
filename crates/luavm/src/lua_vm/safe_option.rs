use super::lua_limits::{LUAI_MAXSTACK, MAX_CALL_DEPTH};

/// Per-thread resource limits
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SafeOption {
    /// Hard cap on value-stack slots; the stack grows on demand up to this
    pub max_stack_size: usize,
    /// Hard cap on frame-stack depth
    pub max_call_depth: usize,
}

impl Default for SafeOption {
    fn default() -> Self {
        Self {
            max_stack_size: LUAI_MAXSTACK,
            max_call_depth: MAX_CALL_DEPTH,
        }
    }
}
