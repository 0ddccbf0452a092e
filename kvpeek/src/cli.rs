//! Command-line arguments.
//!
//! `-h` is the host flag, so clap's automatic `-h` help is disabled and help
//! is only available as `--help`.

use clap::{ArgAction, Args, CommandFactory, Parser};
use clap::error::ErrorKind;
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kvpeek")]
#[command(about = "Dump a document, its metadata and its extended attributes to local files")]
#[command(version)]
#[command(disable_help_flag = true)]
#[command(long_about = "
kvpeek - document and extended-attribute dump tool

Connects to a cluster, reads one document with a single lookup of
$document, $XTOC and the body, then reads every extended attribute listed
in $XTOC. Each payload is written to its own file:

  <docId>.content.bin           document body
  <docId>.<xattr>.content.bin   one file per extended attribute

SECURITY NOTES:
- Read-only: only lookups are issued
- TLS certificates are NOT verified unless --cacert is given
- The password is never logged

EXAMPLES:
  kvpeek -h couchbase://10.0.0.5 -u Administrator -p password \\
         -b travel-sample -s inventory -c airline -d airline_10
  kvpeek -h couchbases://cb.example.com --cacert ca.pem -u ro -p pw \\
         -b app -s _default -c _default --docId user::42 --output-dir dump/
")]
/// Parsed command line for one dump.
pub struct Cli {
    /// Cluster hostname or connection string
    #[arg(short = 'h', long, value_name = "HOST")]
    pub host: String,

    /// Cluster username
    #[arg(short, long)]
    pub username: String,

    /// Cluster password
    #[arg(short, long)]
    pub password: String,

    /// Bucket name
    #[arg(short, long)]
    pub bucket: String,

    /// Scope name
    #[arg(short, long)]
    pub scope: String,

    /// Collection name
    #[arg(short, long)]
    pub collection: String,

    /// Document ID
    #[arg(short = 'd', long = "docId", value_name = "DOC_ID")]
    pub doc_id: String,

    /// Directory the content files are written to
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// PEM CA bundle; enables TLS certificate verification
    #[arg(long, value_name = "PEM")]
    pub cacert: Option<PathBuf>,

    #[command(flatten)]
    pub global: GlobalArgs,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl std::fmt::Debug for Cli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cli")
            .field("host", &kvpeek_core::error::redact_connection_string(&self.host))
            .field("username", &self.username)
            .field("password", &"****")
            .field("bucket", &self.bucket)
            .field("scope", &self.scope)
            .field("collection", &self.collection)
            .field("doc_id", &self.doc_id)
            .field("output_dir", &self.output_dir)
            .field("cacert", &self.cacert)
            .field("global", &self.global)
            .finish()
    }
}

/// Logging flags.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, help = "Suppress all output except errors")]
    pub quiet: bool,
}

/// Result of command-line parsing.
#[derive(Debug)]
pub enum ParseOutcome {
    /// Arguments are complete; run the dump
    Run(Box<Cli>),
    /// `--help` or `--version` was requested; print the text and stop
    Info(String),
    /// Arguments are missing or malformed; report and stop
    Invalid {
        /// clap's rendering of the parse error
        error: String,
        /// Full help text
        usage: String,
    },
}

/// Parses arguments without exiting the process.
///
/// # Example
/// ```rust
/// use kvpeek::cli::{ParseOutcome, parse_args};
///
/// let outcome = parse_args(["kvpeek", "-h", "localhost"]);
/// assert!(matches!(outcome, ParseOutcome::Invalid { .. }));
/// ```
pub fn parse_args<I, T>(args: I) -> ParseOutcome
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => ParseOutcome::Run(Box::new(cli)),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            ParseOutcome::Info(e.render().to_string())
        }
        Err(e) => ParseOutcome::Invalid {
            error: e.render().to_string().trim_end().to_string(),
            usage: Cli::command().render_help().to_string(),
        },
    }
}
