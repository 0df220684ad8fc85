//! The runner's error taxonomy.
//!
//! Inside the evaluator almost everything is an exit status stored in
//! `$?`; only the conditions below escape [`crate::runner::Runner::run`]
//! as errors.

use thiserror::Error;

/// Errors returned from `Runner::run`.
#[derive(Debug, Error)]
pub enum RunError {
    /// The script exited (explicit `exit`, `set -e`, or a non-zero final
    /// status at top level). `exit 0` is reported as `ExitStatus(0)`.
    #[error("exit status {0}")]
    ExitStatus(u8),

    /// A builtin was invoked with unusable flags or arguments; carries
    /// status 2 by convention.
    #[error("usage: {0}")]
    Usage(String),

    /// The caller's cancellation signal fired.
    #[error("cancelled")]
    Cancelled,

    /// The host parse handler failed (sourced script, `eval`, `trap`).
    #[error("parse error: {0}")]
    Parse(String),

    /// An exec/open handler failed in a way that is not an exit status.
    #[error("handler error: {0}")]
    Handler(String),
}

impl RunError {
    /// The exit status this error corresponds to.
    pub fn status(&self) -> u8 {
        match self {
            RunError::ExitStatus(n) => *n,
            RunError::Usage(_) => 2,
            RunError::Cancelled => 130,
            RunError::Parse(_) => 2,
            RunError::Handler(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(RunError::ExitStatus(3).status(), 3);
        assert_eq!(RunError::Usage("x".into()).status(), 2);
        assert_eq!(RunError::Cancelled.status(), 130);
    }

    #[test]
    fn display_forms() {
        assert_eq!(RunError::ExitStatus(1).to_string(), "exit status 1");
        assert_eq!(RunError::Cancelled.to_string(), "cancelled");
    }
}
