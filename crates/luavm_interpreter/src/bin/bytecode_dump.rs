use std::env;
use std::fs;
use std::process::ExitCode;

use luavm::lua_value::chunk_serializer::deserialize_chunk;
use luavm::lua_value::dump_chunk;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let Some(filename) = args.get(1) else {
        println!("Usage: bytecode_dump <chunk.luac>");
        return ExitCode::SUCCESS;
    };

    let bytes = match fs::read(filename) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", filename, e);
            return ExitCode::FAILURE;
        }
    };

    match deserialize_chunk(&bytes) {
        Ok(chunk) => {
            println!("=== File: {} ===\n", filename);
            print!("{}", dump_chunk(&chunk));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("bytecode_dump: malformed binary chunk: {}", e);
            ExitCode::FAILURE
        }
    }
}
