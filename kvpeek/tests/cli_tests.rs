//! Command-line parsing tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use kvpeek::cli::{Cli, ParseOutcome, parse_args};
use std::path::PathBuf;

const REQUIRED: [&str; 15] = [
    "kvpeek",
    "-h",
    "couchbase://10.0.0.5",
    "-u",
    "Administrator",
    "-p",
    "hunter2",
    "-b",
    "travel-sample",
    "-s",
    "inventory",
    "-c",
    "airline",
    "-d",
    "airline_10",
];

fn run_outcome(args: &[&str]) -> Box<Cli> {
    match parse_args(args.iter().copied()) {
        ParseOutcome::Run(cli) => cli,
        other => panic!("expected a runnable command line, got {:?}", other),
    }
}

#[test]
fn test_short_flags() {
    let cli = run_outcome(&REQUIRED);
    assert_eq!(cli.host, "couchbase://10.0.0.5");
    assert_eq!(cli.username, "Administrator");
    assert_eq!(cli.password, "hunter2");
    assert_eq!(cli.bucket, "travel-sample");
    assert_eq!(cli.scope, "inventory");
    assert_eq!(cli.collection, "airline");
    assert_eq!(cli.doc_id, "airline_10");
    assert_eq!(cli.output_dir, PathBuf::from("."));
    assert!(cli.cacert.is_none());
    assert_eq!(cli.global.verbose, 0);
    assert!(!cli.global.quiet);
}

#[test]
fn test_long_flags() {
    let cli = run_outcome(&[
        "kvpeek",
        "--host",
        "cb1.local",
        "--username",
        "ro",
        "--password",
        "pw",
        "--bucket",
        "b",
        "--scope",
        "s",
        "--collection",
        "c",
        "--docId",
        "user::42",
        "--output-dir",
        "/tmp/dump",
        "--cacert",
        "ca.pem",
        "-vv",
    ]);
    assert_eq!(cli.host, "cb1.local");
    assert_eq!(cli.doc_id, "user::42");
    assert_eq!(cli.output_dir, PathBuf::from("/tmp/dump"));
    assert_eq!(cli.cacert, Some(PathBuf::from("ca.pem")));
    assert_eq!(cli.global.verbose, 2);
}

#[test]
fn test_missing_required_flag_is_invalid() {
    // Drop the trailing "-d airline_10".
    let outcome = parse_args(REQUIRED[..13].iter().copied());
    match outcome {
        ParseOutcome::Invalid { error, usage } => {
            assert!(error.contains("--docId"), "error was: {}", error);
            assert!(usage.contains("--host"));
        }
        other => panic!("expected invalid arguments, got {:?}", other),
    }
}

#[test]
fn test_no_arguments_is_invalid() {
    assert!(matches!(
        parse_args(["kvpeek"]),
        ParseOutcome::Invalid { .. }
    ));
}

#[test]
fn test_h_is_host_not_help() {
    assert!(matches!(
        parse_args(["kvpeek", "-h"]),
        ParseOutcome::Invalid { .. }
    ));
}

#[test]
fn test_long_help_and_version() {
    match parse_args(["kvpeek", "--help"]) {
        ParseOutcome::Info(text) => {
            assert!(text.contains("--docId"));
            assert!(text.contains("--cacert"));
        }
        other => panic!("expected help text, got {:?}", other),
    }
    assert!(matches!(
        parse_args(["kvpeek", "--version"]),
        ParseOutcome::Info(_)
    ));
}

#[test]
fn test_unknown_flag_is_invalid() {
    let mut args = REQUIRED.to_vec();
    args.push("--frobnicate");
    assert!(matches!(
        parse_args(args),
        ParseOutcome::Invalid { .. }
    ));
}

#[test]
fn test_debug_output_hides_password() {
    let cli = run_outcome(&REQUIRED);
    let debug = format!("{:?}", cli);
    assert!(debug.contains("Administrator"));
    assert!(!debug.contains("hunter2"));
}
