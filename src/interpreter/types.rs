//! Shared evaluator state
//!
//! Two process-wide cells drive every evaluator entry point: the current
//! script buffer and the last exit code. Rather than mutable globals, both
//! are threaded explicitly through an `EvalContext` — the AST borrows from
//! the script buffer, and `last_status` lives on `ShellState`, which outlives
//! any single statement's tree.

use crate::interpreter::signals::SignalCoordinator;
use crate::registry::Registry;

/// The name used in diagnostics (`minibash: cannot open ...`), independent
/// of argv[0] of the host process.
pub const SHELL_NAME: &str = "minibash";

/// Persistent interpreter state: the single `last_status` cell and the
/// shell's own pid, cached once since it cannot change during a run.
pub struct ShellState {
    pub last_status: i32,
    pub pid: u32,
}

impl ShellState {
    pub fn new() -> Self {
        ShellState {
            last_status: 0,
            pid: std::process::id(),
        }
    }

    pub fn set_status(&mut self, code: i32) {
        self.last_status = code.clamp(0, 255);
    }
}

impl Default for ShellState {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowed bundle passed to every evaluator function: the script buffer
/// (which every AST node's byte offsets index into), the cached symbol/field
/// registry, the mutable shell state, and the signal coordinator.
///
/// Lifetime note: `source` must outlive every `tree_sitter::Node` derived
/// from the tree that was parsed from it. Callers are expected to parse and
/// evaluate within the same scope as the owning `String`/`Vec<u8>`.
pub struct EvalContext<'a> {
    pub source: &'a [u8],
    pub registry: &'a Registry,
    pub state: &'a mut ShellState,
    pub signals: &'a SignalCoordinator,
}

impl<'a> EvalContext<'a> {
    pub fn text(&self, node: &tree_sitter::Node) -> &'a str {
        node.utf8_text(self.source).unwrap_or("")
    }
}
