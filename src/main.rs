use std::env::args_os;
use std::io::{stdout, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use hugetlb_scan::{run, Error, Invocation};

/// Map a hugetlbfs file with 1 GiB pages and count its zero bytes.
#[derive(Debug, Parser)]
#[command(name = "hugetlb-scan", version)]
struct Cli {
    /// File on a hugetlbfs mount, at least 1 GiB long
    path: PathBuf,

    /// Bytes to map; 0 maps the whole file. Rounded down to a multiple of 1 GiB.
    #[arg(value_name = "MMAP_SIZE", default_value = "0", allow_hyphen_values = true)]
    size: String,

    /// Byte offset of the window within the file
    #[arg(value_name = "MMAP_OFFSET", default_value = "0", allow_hyphen_values = true)]
    offset: String,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let mut out = stdout().lock();
    let echoed: Vec<_> = args_os().map(|arg| arg.to_string_lossy().into_owned()).collect();
    if let Err(err) = writeln!(out, "{}", echoed.join(" ")) {
        eprintln!("error: {}", Error::from(err));
        return ExitCode::FAILURE;
    }

    let invocation = Invocation {
        path: cli.path,
        size: cli.size,
        offset: cli.offset,
    };
    match run(&invocation, &mut out) {
        Ok(_) => ExitCode::SUCCESS,
        Err(Error::Os(err)) => {
            let _ = out.flush();
            eprintln!("error calling {}(...):\n{}: {}", err.op(), err.code(), err.message());
            ExitCode::FAILURE
        }
        Err(err) => {
            let _ = out.flush();
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
