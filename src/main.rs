//! nfd - Show a native file dialog from the command line.

use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use lexopt::prelude::*;

use nfd::{Context, DialogKind, DialogRequest, Response, Selection, Status, logging};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> ExitCode {
    match run() {
        Ok(status) => ExitCode::from(status.exit_code() as u8),
        Err(e) => {
            eprintln!("nfd: {e}");
            ExitCode::from(Status::Error.exit_code() as u8)
        }
    }
}

struct Args {
    kind: DialogKind,
    filters: Vec<(String, String)>,
    path: Option<PathBuf>,
    name: Option<String>,
    separator: String,
    verbose: bool,
}

fn run() -> Result<Status, Box<dyn std::error::Error>> {
    let Some(args) = parse_args()? else {
        return Ok(Status::Okay);
    };

    if args.verbose {
        logging::init_tracing_with_filter("nfd=debug,warn");
    } else {
        logging::init_tracing();
    }

    let mut request = DialogRequest::new(args.kind);
    for (name, spec) in &args.filters {
        request = request.filter(name, spec);
    }
    if let Some(path) = args.path {
        request = request.default_path(path);
    }
    if let Some(name) = args.name {
        request = request.default_name(name);
    }

    let mut ctx = Context::init()?;
    let result = ctx.run(&request);
    let status = Status::of(&result);

    let mut out = io::stdout().lock();
    match result {
        Ok(Response::Okay(Selection::Path(path))) => writeln!(out, "{}", path.display())?,
        Ok(Response::Okay(Selection::Paths(paths))) => {
            let mut first = true;
            for path in &paths {
                let path = path?;
                if !first {
                    write!(out, "{}", args.separator)?;
                }
                first = false;
                write!(out, "{}", path.display())?;
            }
            writeln!(out)?;
        }
        Ok(Response::Cancel) => {}
        Err(_) => eprintln!("nfd: {}", ctx.get_error()),
    }
    Ok(status)
}

/// Returns `None` when the invocation only asked for help or the version.
fn parse_args() -> Result<Option<Args>, Box<dyn std::error::Error>> {
    let mut parser = lexopt::Parser::from_env();
    let mut args = Args {
        kind: DialogKind::OpenSingle,
        filters: Vec::new(),
        path: None,
        name: None,
        separator: "\n".to_string(),
        verbose: false,
    };

    while let Some(arg) = parser.next()? {
        match arg {
            Long("help") | Short('h') => {
                print_help();
                return Ok(None);
            }
            Long("version") => {
                println!("nfd {VERSION}");
                return Ok(None);
            }

            // Dialog kinds
            Long("open") => args.kind = DialogKind::OpenSingle,
            Long("multiple") => args.kind = DialogKind::OpenMultiple,
            Long("save") => args.kind = DialogKind::Save,
            Long("folder") => args.kind = DialogKind::PickFolder,

            Long("filter") => {
                let value = parser.value()?.string()?;
                let (name, spec) = value
                    .split_once(':')
                    .ok_or_else(|| format!("--filter expects NAME:SPEC, got {value:?}"))?;
                args.filters.push((name.to_string(), spec.to_string()));
            }
            Long("path") => args.path = Some(parser.value()?.into()),
            Long("name") => args.name = Some(parser.value()?.string()?),
            Long("separator") => args.separator = parser.value()?.string()?,
            Long("verbose") | Short('v') => args.verbose = true,

            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(Some(args))
}

fn print_help() {
    println!(
        r#"nfd {VERSION} - Show a native file dialog from the command line

USAGE:
    nfd [--open | --multiple | --save | --folder] [OPTIONS]

DIALOG TYPES:
    --open              Select one existing file (default)
    --multiple          Select one or more existing files
    --save              Choose where to save a file
    --folder            Select a folder

OPTIONS:
    --filter=NAME:SPEC  Add a file type filter; SPEC lists extensions
                        without dots, e.g. --filter="Images:png,jpg".
                        May be repeated. "All files" is always added last.
    --path=DIR          Folder to start in
    --name=FILE         File name to pre-fill (save only)
    --separator=SEP     Separator between paths of --multiple (default: newline)
    -v, --verbose       Log what the dialog is doing to stderr
    -h, --help          Print this help message
    --version           Print version information

ENVIRONMENT:
    NFD_HELPER          Dialog helper to run (default: zenity, qarma, kdialog, zenity-rs)
    RUST_LOG            Log filter (default: nfd=info,warn)

EXIT CODES:
    0   A selection was made; its paths are printed to stdout
    1   The dialog was cancelled
    100 An error occurred
"#
    );
}
