//! Shared plumbing for the `bidi-tee` and `bidi-tee-print` binaries.

pub mod capture;
pub mod exit;
pub mod logging;
pub mod print;

pub use logging::LoggingArgs;

/// Report `result` the way both binaries do and terminate.
pub fn finish(tool: &str, result: exit::CliResult<i32>) -> ! {
    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{tool}: {err}");
            std::process::exit(err.code);
        }
    }
}
