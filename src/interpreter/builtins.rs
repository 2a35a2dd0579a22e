//! Builtins
//!
//! The only builtin in scope is `echo` (§4.4.4). Variable assignment is a
//! statement kind handled directly by the evaluator, not a builtin.

use std::io::Write;

/// Names recognized as builtins rather than external programs.
pub fn is_builtin(name: &str) -> bool {
    name == "echo"
}

/// Write `argv[1..]` space-joined with a trailing newline to stdout.
/// No flags are recognized; always yields 0.
pub fn run_echo(argv: &[Vec<u8>]) -> i32 {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    for (i, arg) in argv.iter().skip(1).enumerate() {
        if i > 0 {
            let _ = handle.write_all(b" ");
        }
        let _ = handle.write_all(arg);
    }
    let _ = handle.write_all(b"\n");
    0
}
