//! Verbose output for the driver.

/// Prints progress messages when verbose mode is on; otherwise silent.
pub struct Logger {
    verbose: bool,
}

impl Logger {
    pub fn new(verbose: bool) -> Logger {
        Logger { verbose }
    }

    /// Log a message if verbose mode is enabled.
    pub fn log(&self, message: &str) {
        if self.verbose {
            eprintln!("[VERBOSE] {}", message);
        }
    }
}
