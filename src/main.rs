use std::io::{self, Read, Write};
use std::path::PathBuf;

use chemlang::error::ErrorHandler;
use chemlang::periodic_table::PeriodicTable;

struct Config {
    file: Option<PathBuf>,
    periodic_table: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let config = match parse_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let Some(config) = config else {
        return;
    };

    let mut handler = ErrorHandler::new();
    let table_path = PeriodicTable::resolve_path(config.periodic_table.as_deref());
    let table = match PeriodicTable::load(&table_path, &mut handler) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(e.exit_code());
        }
    };

    let code = match config.file {
        Some(path) => run_file(&path, table),
        None => repl(table),
    };
    std::process::exit(code);
}

fn parse_args(args: impl Iterator<Item = String>) -> anyhow::Result<Option<Config>> {
    let mut file = None;
    let mut periodic_table = None;
    let mut iter = args;

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(None);
            }
            "-g" => {
                eprintln!("error: the graphical REPL (-g) is not implemented in this build");
                return Ok(None);
            }
            "-f" => {
                let path = iter.next().ok_or_else(|| anyhow::anyhow!("-f requires a file path"))?;
                file = Some(PathBuf::from(path));
            }
            "--periodic-table" => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--periodic-table requires a file path"))?;
                periodic_table = Some(PathBuf::from(path));
            }
            other => {
                eprintln!("error: unrecognized argument '{other}'");
                print_help();
                return Ok(None);
            }
        }
    }

    Ok(Some(Config { file, periodic_table }))
}

fn print_help() {
    println!("Usage: chemlang [-f <path>] [--periodic-table <path>]");
    println!();
    println!("  -f <path>                run a script file and exit");
    println!("  --periodic-table <path>  override the periodic table JSON location");
    println!("                           (also settable via CHEMLANG_PERIODIC_TABLE)");
    println!("  (no args)                start the REPL");
    println!("  -h, --help               show this help");
}

/// Runs a script file to completion. Exits `1` if the file can't be read at
/// all; otherwise defers to [`chemlang::error::ChemError::exit_code`] so a
/// scan/parse failure and an evaluation failure are distinguishable.
fn run_file(path: &std::path::Path, table: PeriodicTable) -> i32 {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("failed to read {}: {e}", path.display());
            return 1;
        }
    };
    let mut handler = ErrorHandler::new();
    match chemlang::run_source(&source, table, &mut handler) {
        Ok(value) => {
            println!("{}", chemlang::value::stringify(&value));
            0
        }
        Err(err) => {
            eprintln!("{err}");
            err.exit_code()
        }
    }
}

/// Multi-line REPL: input is read to EOF (Ctrl+D), split into blank-line
/// separated chunks, each evaluated and re-displayed; a scan/parse/eval
/// error clears the handler and keeps going rather than killing the
/// session, per `main.py::CH.repl`. Only a failure reading/flushing stdin
/// itself is fatal here — a per-chunk error never changes the exit code.
fn repl(table: PeriodicTable) -> i32 {
    println!("chemlang REPL — Ctrl+D to exit");
    let mut input = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut input) {
        eprintln!("{e}");
        return 1;
    }

    let mut handler = ErrorHandler::new();
    for chunk in input.split("\n\n") {
        if chunk.trim().is_empty() {
            continue;
        }
        let source = format!("{chunk}\n");
        match chemlang::run_source(&source, table.clone(), &mut handler) {
            Ok(value) => println!("{}", chemlang::value::stringify(&value)),
            Err(err) => eprintln!("{err}"),
        }
        handler.clear();
        if let Err(e) = io::stdout().flush() {
            eprintln!("{e}");
            return 1;
        }
    }
    0
}
