//! Fatal error reporting for the binary

use crate::error::StatsError;
use tracing::error;

/// Exit status when the history holds no snapshot yet
pub const EXIT_NO_DATA: i32 = 3;

/// Exit status for failures a later run may not hit (busy lock, transient I/O)
pub const EXIT_TEMPFAIL: i32 = 75;

/// Exit code for a top-level error
pub fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<StatsError>() {
        Some(StatsError::NoData) => EXIT_NO_DATA,
        Some(StatsError::Config(_)) => 2,
        Some(e) if e.is_retryable() => EXIT_TEMPFAIL,
        _ => 1,
    }
}

/// Print the error and exit
///
/// With `verbose >= 1` the full cause chain is printed as well.
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {:#}", error);
    eprintln!("Error: {error}");
    if error
        .downcast_ref::<StatsError>()
        .is_some_and(StatsError::is_retryable)
    {
        eprintln!("This failure may be temporary; retrying the command may succeed.");
    }

    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(exit_code(&error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&StatsError::NoData.into()), EXIT_NO_DATA);
        assert_eq!(exit_code(&StatsError::config("bad retention").into()), 2);
        assert_eq!(exit_code(&StatsError::lock("history lock busy").into()), EXIT_TEMPFAIL);
        assert_eq!(
            exit_code(&StatsError::serialization("corrupt history log").into()),
            1
        );
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }
}
