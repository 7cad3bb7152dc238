use anyhow::Result;
use clap::Parser;
use export_harvest::cli;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    if let Err(err) = cli::dispatch(args) {
        // Once logging is up, dispatch has already reported the error.
        if !tracing::dispatcher::has_been_set() {
            eprintln!("error: {:#}", err);
        }
        std::process::exit(1);
    }
    Ok(())
}
