// Chunk serializer/deserializer for precompiled bytecode files
// Custom little-endian binary format

use std::io::{Cursor, Read};
use std::rc::Rc;

use smol_str::SmolStr;
use tracing::debug;

use super::{Chunk, LocVar, LuaValue, UpvalueDesc};
use crate::lua_vm::{Instruction, OpCode};

const LUAVM_MAGIC: &[u8] = b"\x1bLuaVM";
const LUAVM_VERSION: u8 = 1;

// Constant tags
const TAG_NIL: u8 = 0;
const TAG_FALSE: u8 = 1;
const TAG_TRUE: u8 = 2;
const TAG_NUMBER: u8 = 3;
const TAG_STRING: u8 = 4;

/// Prototypes nested deeper than this are rejected instead of recursing further
const MAX_NESTING: usize = 200;

/// Serialize a Chunk to binary format
pub fn serialize_chunk(chunk: &Chunk, strip: bool) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();

    buf.extend_from_slice(LUAVM_MAGIC);
    buf.push(LUAVM_VERSION);
    buf.push(if strip { 1 } else { 0 });

    write_chunk(&mut buf, chunk, strip)?;

    debug!(bytes = buf.len(), strip, "dumped chunk");
    Ok(buf)
}

/// Deserialize binary data to a Chunk
pub fn deserialize_chunk(data: &[u8]) -> Result<Chunk, String> {
    let mut cursor = Cursor::new(data);

    let mut magic = [0u8; 6];
    cursor
        .read_exact(&mut magic)
        .map_err(|e| format!("failed to read magic: {}", e))?;
    if &magic[..] != LUAVM_MAGIC {
        return Err("not a luavm bytecode file".to_string());
    }

    let version = read_u8(&mut cursor)?;
    if version != LUAVM_VERSION {
        return Err(format!("unsupported bytecode version: {}", version));
    }

    // strip flag is informational; stripped chunks just carry empty debug tables
    let _stripped = read_u8(&mut cursor)?;

    let chunk = read_chunk(&mut cursor, 0)?;
    if (cursor.position() as usize) != data.len() {
        return Err("trailing bytes after chunk".to_string());
    }

    debug!(bytes = data.len(), "loaded chunk");
    Ok(chunk)
}

/// Whether `data` starts with the bytecode signature
pub fn is_binary_chunk(data: &[u8]) -> bool {
    data.starts_with(LUAVM_MAGIC)
}

fn write_chunk(buf: &mut Vec<u8>, chunk: &Chunk, strip: bool) -> Result<(), String> {
    // Write code
    write_u32(buf, chunk.code.len() as u32);
    for instr in &chunk.code {
        write_u32(buf, instr.as_u32());
    }

    // Write constants
    write_u32(buf, chunk.constants.len() as u32);
    for constant in &chunk.constants {
        write_constant(buf, constant)?;
    }

    // Write metadata
    write_u32(buf, chunk.param_count as u32);
    buf.push(if chunk.is_vararg { 1 } else { 0 });
    write_u32(buf, chunk.max_stack_size as u32);
    write_u32(buf, chunk.linedefined);
    write_u32(buf, chunk.lastlinedefined);

    // Write upvalue descriptors
    write_u32(buf, chunk.upvalue_descs.len() as u32);
    for desc in &chunk.upvalue_descs {
        buf.push(if desc.is_local { 1 } else { 0 });
        write_u32(buf, desc.index);
    }

    // Write child prototypes
    write_u32(buf, chunk.child_protos.len() as u32);
    for child in &chunk.child_protos {
        write_chunk(buf, child, strip)?;
    }

    // Write debug info (if not stripped)
    if strip {
        write_u32(buf, 0); // no source name
        write_u32(buf, 0); // no line info
        write_u32(buf, 0); // no locals
        write_u32(buf, 0); // no upvalue names
    } else {
        write_string(buf, chunk.source_name.as_deref().unwrap_or(""));

        write_u32(buf, chunk.line_info.len() as u32);
        for &line in &chunk.line_info {
            write_u32(buf, line);
        }

        write_u32(buf, chunk.locals.len() as u32);
        for local in &chunk.locals {
            write_string(buf, &local.name);
            write_u32(buf, local.startpc);
            write_u32(buf, local.endpc);
        }

        write_u32(buf, chunk.upvalue_descs.len() as u32);
        for desc in &chunk.upvalue_descs {
            write_string(buf, &desc.name);
        }
    }

    Ok(())
}

fn write_constant(buf: &mut Vec<u8>, value: &LuaValue) -> Result<(), String> {
    match value {
        LuaValue::Nil => buf.push(TAG_NIL),
        LuaValue::Boolean(false) => buf.push(TAG_FALSE),
        LuaValue::Boolean(true) => buf.push(TAG_TRUE),
        LuaValue::Number(n) => {
            buf.push(TAG_NUMBER);
            buf.extend_from_slice(&n.to_bits().to_le_bytes());
        }
        LuaValue::String(s) => {
            buf.push(TAG_STRING);
            write_string(buf, s.as_str());
        }
        other => {
            return Err(format!("cannot serialize constant of type {}", other.type_name()));
        }
    }
    Ok(())
}

#[inline]
fn write_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_u32(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

fn read_chunk(cursor: &mut Cursor<&[u8]>, depth: usize) -> Result<Chunk, String> {
    if depth > MAX_NESTING {
        return Err("prototype nesting too deep".to_string());
    }
    let mut chunk = Chunk::default();

    // Read code
    let code_len = read_len(cursor)?;
    chunk.code.reserve(code_len);
    for _ in 0..code_len {
        let instr = Instruction::from_u32(read_u32(cursor)?);
        if instr.get_opcode().is_none() {
            return Err(format!("invalid opcode in instruction {:#010x}", instr.as_u32()));
        }
        chunk.code.push(instr);
    }

    // Read constants
    let const_len = read_len(cursor)?;
    for _ in 0..const_len {
        chunk.constants.push(read_constant(cursor)?);
    }

    // Read metadata
    chunk.param_count = read_u32(cursor)? as usize;
    chunk.is_vararg = read_u8(cursor)? != 0;
    chunk.max_stack_size = read_u32(cursor)? as usize;
    chunk.linedefined = read_u32(cursor)?;
    chunk.lastlinedefined = read_u32(cursor)?;
    if chunk.max_stack_size > Instruction::MAX_A as usize + 1 {
        return Err(format!("invalid max stack size {}", chunk.max_stack_size));
    }

    // Read upvalue descriptors
    let upval_len = read_len(cursor)?;
    for _ in 0..upval_len {
        let is_local = read_u8(cursor)? != 0;
        let index = read_u32(cursor)?;
        chunk.upvalue_descs.push(UpvalueDesc {
            name: SmolStr::default(),
            is_local,
            index,
        });
    }

    // Read child prototypes
    let child_len = read_len(cursor)?;
    for _ in 0..child_len {
        chunk.child_protos.push(Rc::new(read_chunk(cursor, depth + 1)?));
    }

    // Read debug info
    let source = read_string(cursor)?;
    if !source.is_empty() {
        chunk.source_name = Some(SmolStr::new(source));
    }

    let line_len = read_len(cursor)?;
    for _ in 0..line_len {
        chunk.line_info.push(read_u32(cursor)?);
    }

    let locals_len = read_len(cursor)?;
    for _ in 0..locals_len {
        let name = read_string(cursor)?;
        let startpc = read_u32(cursor)?;
        let endpc = read_u32(cursor)?;
        chunk.locals.push(LocVar {
            name: SmolStr::new(name),
            startpc,
            endpc,
        });
    }

    let upval_names = read_len(cursor)?;
    for i in 0..upval_names {
        let name = read_string(cursor)?;
        if let Some(desc) = chunk.upvalue_descs.get_mut(i) {
            desc.name = SmolStr::new(name);
        }
    }

    check_last_return(&chunk)?;
    Ok(chunk)
}

/// Code must end in RETURN so the dispatch loop never runs off the end
fn check_last_return(chunk: &Chunk) -> Result<(), String> {
    match chunk.code.last().and_then(|i| i.get_opcode()) {
        Some(OpCode::Return) => Ok(()),
        _ => Err("function code does not end in RETURN".to_string()),
    }
}

fn read_constant(cursor: &mut Cursor<&[u8]>) -> Result<LuaValue, String> {
    match read_u8(cursor)? {
        TAG_NIL => Ok(LuaValue::Nil),
        TAG_FALSE => Ok(LuaValue::Boolean(false)),
        TAG_TRUE => Ok(LuaValue::Boolean(true)),
        TAG_NUMBER => {
            let mut bytes = [0u8; 8];
            cursor
                .read_exact(&mut bytes)
                .map_err(|e| format!("failed to read number: {}", e))?;
            Ok(LuaValue::Number(f64::from_bits(u64::from_le_bytes(bytes))))
        }
        TAG_STRING => Ok(LuaValue::string(&read_string(cursor)?)),
        tag => Err(format!("invalid constant tag {}", tag)),
    }
}

fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8, String> {
    let mut byte = [0u8; 1];
    cursor
        .read_exact(&mut byte)
        .map_err(|e| format!("failed to read byte: {}", e))?;
    Ok(byte[0])
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, String> {
    let mut bytes = [0u8; 4];
    cursor
        .read_exact(&mut bytes)
        .map_err(|e| format!("failed to read u32: {}", e))?;
    Ok(u32::from_le_bytes(bytes))
}

/// Element count, bounded by the bytes left so corrupt input cannot force huge allocations
fn read_len(cursor: &mut Cursor<&[u8]>) -> Result<usize, String> {
    let len = read_u32(cursor)? as usize;
    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    if len > remaining {
        return Err(format!("length {} exceeds remaining input", len));
    }
    Ok(len)
}

fn read_string(cursor: &mut Cursor<&[u8]>) -> Result<String, String> {
    let len = read_len(cursor)?;
    let mut bytes = vec![0u8; len];
    cursor
        .read_exact(&mut bytes)
        .map_err(|e| format!("failed to read string: {}", e))?;
    String::from_utf8(bytes).map_err(|e| format!("invalid utf-8 in string: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua_value::ChunkBuilder;

    fn sample_chunk() -> Chunk {
        let mut inner = ChunkBuilder::new("=inner").params(1);
        inner.upvalue("x", true, 0);
        inner.abc(OpCode::GetUpval, 1, 0, 0);
        inner.abc(OpCode::Return, 1, 2, 0);

        let mut b = ChunkBuilder::new("=sample").vararg();
        b.upvalue("_ENV", true, 0);
        b.load_constant(0, LuaValue::Number(1.5));
        b.load_constant(1, LuaValue::string("hello"));
        b.abc(OpCode::LoadBool, 2, 1, 0);
        b.local("a", 0, 4);
        let proto = b.child(inner.build());
        b.abx(OpCode::Closure, 3, proto);
        b.abc(OpCode::Return, 0, 1, 0);
        b.build()
    }

    #[test]
    fn test_dump_and_load_keep_structure() {
        let chunk = sample_chunk();
        let bytes = serialize_chunk(&chunk, false).unwrap();
        assert!(is_binary_chunk(&bytes));

        let loaded = deserialize_chunk(&bytes).unwrap();
        assert_eq!(loaded.code, chunk.code);
        assert_eq!(loaded.constants, chunk.constants);
        assert!(loaded.is_vararg);
        assert_eq!(loaded.max_stack_size, chunk.max_stack_size);
        assert_eq!(loaded.line_info, chunk.line_info);
        assert_eq!(loaded.locals, chunk.locals);
        assert_eq!(loaded.upvalue_descs, chunk.upvalue_descs);
        assert_eq!(loaded.child_protos.len(), 1);
        assert_eq!(loaded.child_protos[0].param_count, 1);
        assert_eq!(loaded.source(), "=sample");
    }

    #[test]
    fn test_strip_drops_debug_info() {
        let bytes = serialize_chunk(&sample_chunk(), true).unwrap();
        let loaded = deserialize_chunk(&bytes).unwrap();
        assert!(loaded.line_info.is_empty());
        assert!(loaded.locals.is_empty());
        assert!(loaded.source_name.is_none());
        assert!(loaded.upvalue_descs[0].name.is_empty());
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(deserialize_chunk(b"garbage").is_err());

        let mut bytes = serialize_chunk(&sample_chunk(), false).unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(deserialize_chunk(&bytes).is_err());

        let mut bytes = serialize_chunk(&sample_chunk(), false).unwrap();
        bytes[6] = 99;
        assert!(deserialize_chunk(&bytes).unwrap_err().contains("version"));
    }
}
