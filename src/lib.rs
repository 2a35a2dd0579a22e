//! minibash - an interpreter for a practical subset of the POSIX shell
//! command language.
//!
//! The crate is split into a symbol/field registry, a tree-walking
//! evaluator (word expansion, redirection planning, process running,
//! statement dispatch, signal coordination), and the top-level `Bash`
//! shell that ties them together.

pub mod bash;
pub mod interpreter;
pub mod registry;

pub use bash::Bash;
pub use interpreter::{EngineError, EngineResult, Evaluator, ShellState};
pub use registry::Registry;
