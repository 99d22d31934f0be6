use std::env;
use std::fs;
use std::process::ExitCode;

use luavm::lua_vm::SafeOption;
use luavm::{LuaVM, LuaValue};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const VERSION: &str = "luavm 0.1 (Lua 5.3 bytecode)";

fn print_usage() {
    eprintln!("usage: luavm [options] chunk.luac [args]");
    eprintln!("Available options are:");
    eprintln!("  --max-stack N   value-stack slots per thread");
    eprintln!("  --max-depth N   call frames per thread");
    eprintln!("  -v              show version information");
    eprintln!("  --              stop handling options");
}

#[derive(Default)]
struct Options {
    chunk_file: Option<String>,
    chunk_args: Vec<String>,
    max_stack: Option<usize>,
    max_depth: Option<usize>,
    show_version: bool,
}

fn parse_count(flag: &str, value: Option<&String>) -> Result<usize, String> {
    let value = value.ok_or_else(|| format!("'{}' needs argument", flag))?;
    value
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| format!("'{}' expects a positive integer, got '{}'", flag, value))
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut opts = Options::default();
    let mut i = 1;
    let mut stop_options = false;

    while i < args.len() {
        let arg = &args[i];
        if !stop_options && arg.starts_with('-') {
            match arg.as_str() {
                "--max-stack" => {
                    i += 1;
                    opts.max_stack = Some(parse_count(arg, args.get(i))?);
                }
                "--max-depth" => {
                    i += 1;
                    opts.max_depth = Some(parse_count(arg, args.get(i))?);
                }
                "-v" => opts.show_version = true,
                "--" => stop_options = true,
                _ => return Err(format!("unrecognized option '{}'", arg)),
            }
            i += 1;
        } else {
            // First non-option argument is the chunk; the rest go to the script
            opts.chunk_file = Some(arg.clone());
            opts.chunk_args = args[i + 1..].to_vec();
            break;
        }
    }

    Ok(opts)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

fn run(opts: &Options, path: &str) -> Result<Vec<LuaValue>, String> {
    let bytes = fs::read(path).map_err(|e| format!("cannot open {}: {}", path, e))?;

    let mut safe_option = SafeOption::default();
    if let Some(n) = opts.max_stack {
        safe_option.max_stack_size = n;
    }
    if let Some(n) = opts.max_depth {
        safe_option.max_call_depth = n;
    }
    debug!(?safe_option, path, "starting");

    let mut vm = LuaVM::new(safe_option);
    vm.open_libs().map_err(|e| e.to_string())?;
    let main = vm.load_binary(&bytes).map_err(|e| e.to_string())?;
    let args = opts
        .chunk_args
        .iter()
        .map(|a| LuaValue::string(a))
        .collect();
    vm.call(main, args).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let opts = match parse_args(&args) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("luavm: {}", e);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    if opts.show_version {
        println!("{}", VERSION);
    }
    let Some(path) = opts.chunk_file.as_deref() else {
        if !opts.show_version {
            print_usage();
        }
        return ExitCode::SUCCESS;
    };

    match run(&opts, path) {
        Ok(results) => {
            if !results.is_empty() {
                let line: Vec<String> = results.iter().map(|v| v.to_string()).collect();
                println!("{}", line.join("\t"));
            }
            ExitCode::SUCCESS
        }
        Err(msg) => {
            eprintln!("luavm: {}", msg);
            ExitCode::FAILURE
        }
    }
}
