//! Engine Errors
//!
//! Per the error taxonomy, almost every shell-level failure (expansion OOM,
//! redirection failure, exec failure, signal death, fork/pipe failure) is
//! recovered locally into `last_status` and never becomes a Rust `Result`
//! error — the interpreter never terminates on a script error. `EngineError`
//! exists only for the small set of cases the spec calls *fatal*: a failed
//! allocation of core structures in the REPL loop, or a failed `waitpid`
//! during a foreground wait with no outstanding child (an internal
//! invariant violation).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("minibash: allocation failure")]
    AllocationFailure,

    #[error("minibash: waitpid invariant violated: no outstanding child to reap")]
    WaitInvariant,
}

/// Result type for the fatal path: every evaluator entry point propagates
/// `EngineError` instead of folding it into `last_status`, per §7.
pub type EngineResult<T> = Result<T, EngineError>;
