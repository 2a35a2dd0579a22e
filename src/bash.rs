//! Bash Environment
//!
//! Top-level entry point tying together the registry, the statement
//! evaluator, and the signal coordinator into one shell instance.

use crate::interpreter::signals::SignalCoordinator;
use crate::interpreter::{EngineResult, Evaluator, ShellState};

/// One shell instance. `last_status` and the process environment persist
/// across calls to `exec`, matching the behavior of successive lines
/// typed at an interactive prompt.
pub struct Bash {
    evaluator: Evaluator,
    state: ShellState,
    signals: SignalCoordinator,
}

impl Bash {
    /// Create a shell instance and install its `SIGCHLD` handler.
    pub fn new() -> Self {
        let signals = SignalCoordinator::new();
        signals.install();
        Bash {
            evaluator: Evaluator::new(),
            state: ShellState::new(),
            signals,
        }
    }

    /// Parse and run `script`, returning its final `last_status`.
    ///
    /// `Err` unwinds only for the one fatal case in §7: a foreground
    /// `waitpid` with no outstanding child to reap. Every other failure is
    /// already folded into the returned `last_status`.
    pub fn exec(&mut self, script: &str) -> EngineResult<i32> {
        self.evaluator.evaluate(script, &mut self.state, &self.signals)
    }

    /// The exit status of the most recently completed statement.
    pub fn last_status(&self) -> i32 {
        self.state.last_status
    }
}

impl Default for Bash {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_hello_world() {
        let mut bash = Bash::new();
        assert_eq!(bash.exec("echo hello world").unwrap(), 0);
    }

    #[test]
    fn variable_assignment_and_expansion() {
        let mut bash = Bash::new();
        let status = bash.exec("A=one; B=two; echo \"$A-$B\"").unwrap();
        assert_eq!(status, 0);
    }

    #[test]
    fn dollar_question_reflects_prior_status() {
        let mut bash = Bash::new();
        bash.exec("true").unwrap();
        assert_eq!(bash.last_status(), 0);
        bash.exec("false").unwrap();
        assert_eq!(bash.last_status(), 1);
    }

    #[test]
    fn short_circuit_or_runs_rescue() {
        let mut bash = Bash::new();
        assert_eq!(bash.exec("false || echo rescued").unwrap(), 0);
    }

    #[test]
    fn short_circuit_and_skips_on_failure() {
        let mut bash = Bash::new();
        assert_eq!(bash.exec("false && echo unreachable ; echo z").unwrap(), 0);
    }

    #[test]
    fn pipeline_propagates_last_stage_status() {
        let mut bash = Bash::new();
        assert_eq!(bash.exec("echo a b c | wc -w").unwrap(), 0);
    }

    #[test]
    fn exec_failure_yields_127() {
        let mut bash = Bash::new();
        assert_eq!(bash.exec("definitely-not-a-real-command-xyz").unwrap(), 127);
    }

    #[test]
    fn pipeline_stage_not_found_yields_127() {
        let mut bash = Bash::new();
        assert_eq!(
            bash.exec("echo hi | definitely-not-a-real-command-xyz").unwrap(),
            127
        );
    }

    #[test]
    fn dollar_dollar_stable_through_command_substitution() {
        let mut bash = Bash::new();
        bash.exec("echo \"$$ $(echo $$)\"").unwrap();
        assert_eq!(bash.last_status(), 0);
    }
}
