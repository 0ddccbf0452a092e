//! Console logging for kvpeek.
//!
//! Everything goes through `tracing`. The binary installs one fmt subscriber
//! at startup; events carry no target, file or thread decoration so the run
//! reads as a plain narrative.

use crate::{KvPeekError, Result};
use tracing::Level;

/// Level for a `-v` count, with `--quiet` taking precedence.
pub fn level_for(verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Installs the global subscriber.
///
/// INFO shows the dump narrative, DEBUG adds connection lifecycle and
/// TRACE adds every protocol frame.
///
/// ```rust,no_run
/// kvpeek_core::logging::init_logging(1, false)?;
/// # Ok::<(), kvpeek_core::KvPeekError>(())
/// ```
///
/// # Errors
/// Fails if a global subscriber is already installed.
pub fn init_logging(verbose: u8, quiet: bool) -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(level_for(verbose, quiet))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| KvPeekError::configuration(format!("Failed to initialize logging: {}", e)))
}

/// Runs `f` under a thread-local subscriber and returns what it logged.
#[cfg(test)]
pub(crate) fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if let Ok(mut bytes) = self.0.lock() {
                bytes.extend_from_slice(buf);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let sink = Sink::default();
    let writer = sink.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let value = tracing::subscriber::with_default(subscriber, f);
    let logs = sink
        .0
        .lock()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default();
    (value, logs)
}
