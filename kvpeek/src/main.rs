//! Document dump tool.
//!
//! Reads one document and its extended attributes from a cluster and writes
//! each payload to a local file.
//!
//! # Exit status
//! - Invalid arguments: usage is printed, exit status 0
//! - File write failure: the error is logged, exit status 0
//! - Connection, authentication or lookup failure: non-zero

use kvpeek::cli::{ParseOutcome, parse_args};
use kvpeek_core::Result;
use kvpeek_core::logging::init_logging;
use tracing::error;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = match parse_args(std::env::args_os()) {
        ParseOutcome::Run(cli) => cli,
        ParseOutcome::Info(text) => {
            print!("{}", text);
            return Ok(());
        }
        ParseOutcome::Invalid { error, usage } => {
            init_logging(0, false)?;
            error!("{}", error);
            eprintln!("{}", usage);
            return Ok(());
        }
    };

    init_logging(cli.global.verbose, cli.global.quiet)?;

    match kvpeek::run(&cli).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_io() => {
            error!("Error writing to file: {}", e);
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            Err(e)
        }
    }
}
