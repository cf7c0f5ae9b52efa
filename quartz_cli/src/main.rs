//! Quartz command-line front end.
//!
//! `quartz` with no arguments boots a core environment and enters a
//! line-at-a-time REPL. `quartz run <file>` evaluates a source file.
//! `quartz image <path>` writes a marshaled core snapshot, the artifact
//! an `image-boot` build embeds.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use quartz_core::{describe, QuartzError};
use quartz_vm::boot::eval;

// =============================================================================
// Exit codes
// =============================================================================

/// Successful execution.
const EXIT_SUCCESS: u8 = 0;
/// Startup or runtime error.
const EXIT_ERROR: u8 = 1;
/// Bad command line.
const EXIT_USAGE: u8 = 2;

const USAGE: &str = "\
usage: quartz                start a REPL
       quartz run <file>     evaluate a source file
       quartz image <path>   write a core environment snapshot
       quartz -V|--version   print the runtime version
       quartz -h|--help      print this message";

// =============================================================================
// Argument parsing
// =============================================================================

/// What the process should do, parsed from argv.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Repl,
    Run(PathBuf),
    Image(PathBuf),
    PrintVersion,
    PrintHelp,
}

fn parse_args(args: &[String]) -> Result<Mode, String> {
    let mut iter = args.iter();
    let Some(first) = iter.next() else {
        return Ok(Mode::Repl);
    };
    let mode = match first.as_str() {
        "-V" | "--version" => Mode::PrintVersion,
        "-h" | "--help" => Mode::PrintHelp,
        "run" => match iter.next() {
            Some(path) => Mode::Run(PathBuf::from(path)),
            None => return Err("run expects a file path".into()),
        },
        "image" => match iter.next() {
            Some(path) => Mode::Image(PathBuf::from(path)),
            None => return Err("image expects an output path".into()),
        },
        other => return Err(format!("unknown argument {other:?}")),
    };
    match iter.next() {
        Some(extra) => Err(format!("unexpected argument {extra:?}")),
        None => Ok(mode),
    }
}

// =============================================================================
// Entry point
// =============================================================================

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mode = match parse_args(&args) {
        Ok(mode) => mode,
        Err(message) => {
            eprintln!("quartz: {message}");
            eprintln!("{USAGE}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    match mode {
        Mode::PrintVersion => {
            println!("quartz {}", env!("CARGO_PKG_VERSION"));
            ExitCode::from(EXIT_SUCCESS)
        }
        Mode::PrintHelp => {
            println!("{USAGE}");
            ExitCode::from(EXIT_SUCCESS)
        }
        Mode::Repl => dispatch(repl()),
        Mode::Run(path) => dispatch(run_file(&path)),
        Mode::Image(path) => dispatch(write_image(&path)),
    }
}

fn dispatch(result: Result<(), QuartzError>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(error) => {
            eprintln!("quartz: {error}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

// =============================================================================
// Modes
// =============================================================================

fn run_file(path: &PathBuf) -> Result<(), QuartzError> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| QuartzError::Io(format!("cannot read {}: {e}", path.display())))?;
    let env = quartz_vm::core_env()?;
    eval::eval_source(&env, &source)?;
    Ok(())
}

fn write_image(path: &PathBuf) -> Result<(), QuartzError> {
    let env = quartz_vm::core_env()?;
    let image = quartz_vm::marshal(&quartz_core::Value::Environment(env))?;
    std::fs::write(path, &image)
        .map_err(|e| QuartzError::Io(format!("cannot write {}: {e}", path.display())))?;
    eprintln!("wrote {} ({} bytes)", path.display(), image.len());
    Ok(())
}

/// Read, eval, describe until end of input. Evaluation errors are printed
/// and the loop continues; only startup errors abort.
fn repl() -> Result<(), QuartzError> {
    let env = quartz_vm::core_env()?;
    println!("quartz {}", env!("CARGO_PKG_VERSION"));

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("quartz> ");
        io::stdout().flush().ok();
        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(error) => return Err(QuartzError::Io(error.to_string())),
        }
        if line.trim().is_empty() {
            continue;
        }
        match eval::eval_source(&env, &line) {
            Ok(value) => println!("{}", describe(&value)),
            Err(error) => eprintln!("error: {error}"),
        }
    }
    println!();
    Ok(())
}
