/// Abstraction over user-facing output.
///
/// Command modules use this trait instead of `println!`/`eprintln!`; logs go
/// through `tracing` on stderr, results go through here.
pub trait UserOutput: Send + Sync {
    /// Informational status message (e.g., "Applying artifacts...")
    fn status(&self, message: &str);

    /// Success message (e.g., "Deployed shop-dev")
    fn success(&self, message: &str);

    /// Warning message (e.g., "Endpoint main.db.main has no value")
    fn warning(&self, message: &str);

    /// A blank line separator.
    fn blank(&self);
}

/// Standard CLI output: results on stdout, warnings on stderr.
pub struct CliOutput;

impl UserOutput for CliOutput {
    fn status(&self, message: &str) {
        println!("{}", message);
    }

    fn success(&self, message: &str) {
        println!("\x1b[32m{}\x1b[0m", message);
    }

    fn warning(&self, message: &str) {
        eprintln!("\x1b[33m{}\x1b[0m", message);
    }

    fn blank(&self) {
        println!();
    }
}
