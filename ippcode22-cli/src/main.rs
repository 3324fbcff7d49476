//! Command-line front end (§6). Hand-rolled flag parsing in the teacher's
//! own style (`cordy/src/main.rs`'s `parse_args` loop) rather than reaching
//! for a flag-parsing crate — there are only two optional, non-positional
//! flags, so a `clap` dependency would buy nothing.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::process::ExitCode;

use mimalloc::MiMalloc;

use ippcode22::error::{IngestError, RuntimeError};
use ippcode22::vm::VirtualMachine;
use ippcode22::xml;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

struct Args {
    source: Option<String>,
    input: Option<String>,
}

fn parse_args(raw: &[String]) -> Result<Option<Args>, String> {
    if raw.is_empty() {
        return Ok(None);
    }
    let mut args = Args { source: None, input: None };
    for arg in raw {
        if let Some(path) = arg.strip_prefix("--source=") {
            args.source = Some(path.to_string());
        } else if let Some(path) = arg.strip_prefix("--input=") {
            args.input = Some(path.to_string());
        } else {
            return Err(format!("unknown flag: {arg}"));
        }
    }
    Ok(Some(args))
}

fn read_to_string(path: Option<&str>) -> io::Result<String> {
    let mut text = String::new();
    match path {
        Some(path) => {
            File::open(path)?.read_to_string(&mut text)?;
        }
        None => {
            io::stdin().lock().read_to_string(&mut text)?;
        }
    }
    Ok(text)
}

fn run() -> Result<u8, (u8, String)> {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&raw) {
        Ok(Some(args)) => args,
        Ok(None) => {
            eprintln!("usage: ippcode22 [--source=PATH] [--input=PATH]");
            return Ok(0);
        }
        Err(msg) => return Err((10, msg)),
    };

    let source = read_to_string(args.source.as_deref()).map_err(|e| (11, format!("cannot open source: {e}")))?;
    let instrs = xml::parse(&source).map_err(|e: IngestError| (e.exit_code(), e.to_string()))?;

    let stdout = io::stdout();
    match &args.input {
        Some(path) => {
            let file = File::open(path).map_err(|e| (11, format!("cannot open input: {e}")))?;
            let mut vm = VirtualMachine::new(instrs, BufReader::new(file), stdout.lock())
                .map_err(|e: RuntimeError| (e.exit_code(), e.to_string()))?;
            vm.run().map_err(|e| (e.exit_code(), e.to_string()))
        }
        None => {
            let mut vm = VirtualMachine::new(instrs, io::stdin().lock(), stdout.lock())
                .map_err(|e: RuntimeError| (e.exit_code(), e.to_string()))?;
            vm.run().map_err(|e| (e.exit_code(), e.to_string()))
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err((code, msg)) => {
            let _ = writeln!(io::stderr(), "ippcode22: {msg}");
            ExitCode::from(code)
        }
    }
}
