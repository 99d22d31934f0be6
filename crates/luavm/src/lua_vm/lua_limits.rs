//! VM limits and configuration constants.

// ===== Stack =====

/// Extra stack slots kept free above a frame for metamethod calls and temporaries.
pub const EXTRA_STACK: usize = 5;

/// Minimum guaranteed stack slots available to native functions.
pub const LUA_MINSTACK: usize = 20;

/// Initial stack allocation for a new thread.
pub const BASIC_STACK_SIZE: usize = 2 * LUA_MINSTACK;

/// Default maximum stack size (number of slots).
pub const LUAI_MAXSTACK: usize = 1_000_000;

/// Default maximum function call nesting depth.
pub const MAX_CALL_DEPTH: usize = 200;

// ===== Calls =====

/// Result count meaning "all results" (CALL C=0, RETURN B=0, VARARG B=0).
pub const LUA_MULTRET: i32 = -1;

// ===== Table constructors =====

/// Number of list items to flush per SETLIST instruction.
pub const LFIELDS_PER_FLUSH: usize = 50;

// ===== Metamethods =====

/// Maximum depth for __index / __newindex metamethod chains.
pub const MAXTAGLOOP: usize = 2000;
