// Binary chunks: dump, reload, run
use super::{int, new_vm, s};
use crate::lua_value::chunk_serializer::{deserialize_chunk, is_binary_chunk, serialize_chunk};
use crate::lua_value::{Chunk, ChunkBuilder, dump_chunk};
use crate::{LuaError, OpCode};

/// local n = 40; local add = function(d) n = n + d; return n end; return add(2), "ok"
fn counter_program() -> Chunk {
    let mut add = ChunkBuilder::new("=add").params(1);
    add.upvalue("n", true, 0);
    add.abc(OpCode::GetUpval, 1, 0, 0);
    add.abc(OpCode::Add, 1, 1, 0);
    add.abc(OpCode::SetUpval, 1, 0, 0);
    add.abc(OpCode::Return, 1, 2, 0);

    let mut b = ChunkBuilder::new("@counter.lua").lines(0, 3);
    b.upvalue("_ENV", false, 0);
    b.load_constant(0, int(40));
    b.line(2);
    let child = b.child(add.build());
    b.abx(OpCode::Closure, 1, child);
    b.line(3);
    b.load_constant(2, int(2));
    b.abc(OpCode::Call, 1, 2, 2);
    b.load_constant(2, s("ok"));
    b.abc(OpCode::Return, 1, 3, 0);
    b.local("n", 1, 6).local("add", 2, 6);
    b.build()
}

#[test]
fn test_dumped_chunk_runs_after_reload() {
    let bytes = serialize_chunk(&counter_program(), false).unwrap();
    assert!(is_binary_chunk(&bytes));

    let mut vm = new_vm();
    let func = vm.load_binary(&bytes).unwrap();
    assert_eq!(vm.call(func, Vec::new()).unwrap(), vec![int(42), s("ok")]);
}

#[test]
fn test_stripped_chunk_runs_without_debug_info() {
    let bytes = serialize_chunk(&counter_program(), true).unwrap();
    let chunk = deserialize_chunk(&bytes).unwrap();
    assert!(chunk.locals.is_empty());
    assert!(chunk.line_info.is_empty());

    let mut vm = new_vm();
    assert_eq!(vm.execute(chunk).unwrap(), vec![int(42), s("ok")]);
}

#[test]
fn test_stripped_chunk_errors_lack_position() {
    // return undefined()
    let mut b = ChunkBuilder::new("=main");
    let name = b.rk_constant(s("undefined"));
    b.abc(OpCode::GetTabUp, 0, 0, name);
    b.abc(OpCode::Call, 0, 1, 0);
    b.abc(OpCode::Return, 0, 0, 0);
    let bytes = serialize_chunk(&b.build(), true).unwrap();

    let mut vm = new_vm();
    let func = vm.load_binary(&bytes).unwrap();
    let err = vm.call(func, Vec::new()).unwrap_err();
    assert_eq!(err.to_string(), "?: attempt to call a nil value");
}

#[test]
fn test_load_binary_rejects_garbage() {
    let vm = new_vm();
    let err = vm.load_binary(b"return 1").unwrap_err();
    assert!(matches!(err, LuaError::InvalidOperation(_)));
    assert!(err.to_string().contains("malformed binary chunk"));

    let mut bytes = serialize_chunk(&counter_program(), false).unwrap();
    bytes.push(0);
    assert!(vm.load_binary(&bytes).is_err());
}

#[test]
fn test_listing_of_reloaded_chunk() {
    let bytes = serialize_chunk(&counter_program(), false).unwrap();
    let chunk = deserialize_chunk(&bytes).unwrap();
    let listing = dump_chunk(&chunk);
    assert!(listing.contains("@counter.lua"));
    assert!(listing.contains("CLOSURE"));
    assert!(listing.contains("GETUPVAL"));
    assert!(listing.contains("\"ok\""));
}
