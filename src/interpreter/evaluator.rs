//! Statement Evaluator (C5)
//!
//! Walks the top-level statements of a parsed script, dispatching on node
//! kind per §4.5, threading `last_status` through the sequence, and
//! short-circuiting `&&`/`||` list junctions by scanning the raw source
//! bytes between adjacent statements (§4.5.1, §9) since tree-sitter-bash
//! does not reliably expose a field-bearing binary node for every list.

use std::io::Read;
use std::os::unix::io::RawFd;

use tree_sitter::{Language, Node, Parser};

use crate::interpreter::builtins;
use crate::interpreter::errors::{EngineError, EngineResult};
use crate::interpreter::path_resolution;
use crate::interpreter::process_runner::{self, Stage};
use crate::interpreter::redirections::{self, FdAction};
use crate::interpreter::signals::SignalCoordinator;
use crate::interpreter::types::{EvalContext, ShellState};
use crate::interpreter::word_expansion;
use crate::registry::Registry;

/// Owns the parser and registry for one shell instance. A fresh `Parser`
/// is reused across every line/script evaluated by the same shell.
pub struct Evaluator {
    parser: Parser,
    registry: Registry,
}

impl Evaluator {
    pub fn new() -> Self {
        let language: Language = tree_sitter_bash::LANGUAGE.into();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .expect("tree-sitter-bash grammar failed to load");
        let registry = Registry::new(&language);
        Evaluator { parser, registry }
    }

    /// Parse and evaluate `source` as a complete program, returning the
    /// final `last_status`. `state` and `signals` persist across calls so
    /// that `$?`/`$$` and the signal mask discipline carry over between
    /// REPL lines.
    ///
    /// Returns `Err(EngineError)` only for the one case §7 designates
    /// fatal: a foreground `waitpid` that comes back with no outstanding
    /// child to reap. Every other failure in the §7 taxonomy is recovered
    /// locally into the returned `last_status`.
    pub fn evaluate(
        &mut self,
        source: &str,
        state: &mut ShellState,
        signals: &SignalCoordinator,
    ) -> EngineResult<i32> {
        let Some(tree) = self.parser.parse(source, None) else {
            state.set_status(1);
            return Ok(1);
        };
        if tree.root_node().has_error() {
            eprintln!("minibash: syntax error");
            state.set_status(2);
            return Ok(2);
        }
        let mut ctx = EvalContext {
            source: source.as_bytes(),
            registry: &self.registry,
            state,
            signals,
        };
        let root = tree.root_node();
        eval_program(&mut ctx, &root)
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn eval_program(ctx: &mut EvalContext, root: &Node) -> EngineResult<i32> {
    let mut cursor = root.walk();
    let children: Vec<Node> = root.named_children(&mut cursor).collect();
    eval_sequence(ctx, &children)
}

/// Evaluate a flat run of statements joined by `&&`/`||`/`;`/`&`, applying
/// short-circuit rules between each adjacent pair (§4.5.1).
fn eval_sequence(ctx: &mut EvalContext, children: &[Node]) -> EngineResult<i32> {
    if children.is_empty() {
        return Ok(ctx.state.last_status);
    }
    let mut status = eval_statement(ctx, &children[0])?;
    for i in 1..children.len() {
        let op = scan_operator(ctx.source, children[i - 1].end_byte(), children[i].start_byte());
        let run = match op {
            Operator::And => status == 0,
            Operator::Or => status != 0,
            Operator::Seq | Operator::Background => true,
        };
        if run {
            status = eval_statement(ctx, &children[i])?;
        }
    }
    Ok(status)
}

fn eval_statement(ctx: &mut EvalContext, node: &Node) -> EngineResult<i32> {
    match node.kind() {
        "comment" => Ok(ctx.state.last_status),
        "variable_assignment" => eval_assignment(ctx, node),
        "command" => eval_command(ctx, node, None, None),
        "pipeline" => eval_pipeline(ctx, node, None, None),
        "redirected_statement" => eval_redirected_statement(ctx, node),
        "list" | "and_or" | "binary_expression" => eval_list(ctx, node),
        kind => {
            tracing::warn!(kind, "unimplemented statement kind");
            Ok(ctx.state.last_status)
        }
    }
}

fn eval_list(ctx: &mut EvalContext, node: &Node) -> EngineResult<i32> {
    if let (Some(left_id), Some(right_id)) = (ctx.registry.fields.left, ctx.registry.fields.right) {
        if let (Some(left), Some(right)) = (
            node.child_by_field_id(left_id),
            node.child_by_field_id(right_id),
        ) {
            let status = eval_statement(ctx, &left)?;
            let op = ctx
                .registry
                .fields
                .operator
                .and_then(|id| node.child_by_field_id(id))
                .map(|o| classify_operator_text(ctx.text(&o)))
                .unwrap_or_else(|| scan_operator(ctx.source, left.end_byte(), right.start_byte()));
            let run = match op {
                Operator::And => status == 0,
                Operator::Or => status != 0,
                Operator::Seq | Operator::Background => true,
            };
            return if run { eval_statement(ctx, &right) } else { Ok(status) };
        }
    }

    let mut cursor = node.walk();
    let children: Vec<Node> = node.named_children(&mut cursor).collect();
    eval_sequence(ctx, &children)
}

#[derive(Clone, Copy)]
enum Operator {
    And,
    Or,
    Seq,
    Background,
}

fn classify_operator_text(text: &str) -> Operator {
    match text.trim() {
        "&&" => Operator::And,
        "||" => Operator::Or,
        "&" => Operator::Background,
        _ => Operator::Seq,
    }
}

/// Scan `src[lo..hi]` left to right for the first occurrence of `&&`,
/// `||`, `;`, or `&` (§4.5.1, §9). Defaults to sequencing if none appear,
/// which should not happen for a well-formed list but keeps this total.
fn scan_operator(src: &[u8], lo: usize, hi: usize) -> Operator {
    let window = &src[lo..hi];
    let mut i = 0;
    while i < window.len() {
        if window[i..].starts_with(b"&&") {
            return Operator::And;
        }
        if window[i..].starts_with(b"||") {
            return Operator::Or;
        }
        if window[i] == b';' {
            return Operator::Seq;
        }
        if window[i] == b'&' {
            return Operator::Background;
        }
        i += 1;
    }
    Operator::Seq
}

fn eval_assignment(ctx: &mut EvalContext, node: &Node) -> EngineResult<i32> {
    let name = ctx
        .registry
        .fields
        .variable
        .and_then(|id| node.child_by_field_id(id))
        .map(|n| ctx.text(&n).to_string());

    let value = match ctx
        .registry
        .fields
        .value
        .and_then(|id| node.child_by_field_id(id))
    {
        Some(v) => word_expansion::expand_node(ctx, &v)?,
        None => Vec::new(),
    };

    if let Some(name) = name {
        std::env::set_var(name, String::from_utf8_lossy(&value).into_owned());
    }
    ctx.state.set_status(0);
    Ok(0)
}

/// Build the `Stage` for one command node: resolve `echo` to an in-process
/// builtin closure, everything else to a PATH-resolved exec target.
fn make_stage<'a>(name: &str, argv: Vec<Vec<u8>>, plan: Vec<FdAction>) -> Stage<'a> {
    if builtins::is_builtin(name) {
        let echo_argv = argv.clone();
        Stage {
            resolved_path: None,
            argv,
            plan,
            builtin: Some(Box::new(move || builtins::run_echo(&echo_argv))),
        }
    } else {
        Stage {
            resolved_path: path_resolution::resolve(name),
            argv,
            plan,
            builtin: None,
        }
    }
}

fn eval_command(
    ctx: &mut EvalContext,
    node: &Node,
    ext_stdin: Option<RawFd>,
    ext_stdout: Option<RawFd>,
) -> EngineResult<i32> {
    let argv = word_expansion::expand_argv(ctx, node)?;
    if argv.is_empty() || argv[0].is_empty() {
        ctx.state.set_status(1);
        return Ok(1);
    }
    let plan = redirections::build_plan(ctx, node);
    let name = String::from_utf8_lossy(&argv[0]).into_owned();
    let stage = make_stage(&name, argv, plan);

    let status = process_runner::run_pipeline(ctx, vec![stage], ext_stdin, ext_stdout)?;
    ctx.state.set_status(status);
    Ok(status)
}

fn eval_pipeline(
    ctx: &mut EvalContext,
    node: &Node,
    ext_stdin: Option<RawFd>,
    ext_stdout: Option<RawFd>,
) -> EngineResult<i32> {
    let mut cursor = node.walk();
    let command_nodes: Vec<Node> = node
        .named_children(&mut cursor)
        .filter(|c| ctx.registry.is_command(c))
        .collect();

    let mut stages = Vec::with_capacity(command_nodes.len());
    for command_node in &command_nodes {
        let argv = word_expansion::expand_argv(ctx, command_node)?;
        if argv.is_empty() || argv[0].is_empty() {
            continue;
        }
        let plan = redirections::build_plan(ctx, command_node);
        let name = String::from_utf8_lossy(&argv[0]).into_owned();
        stages.push(make_stage(&name, argv, plan));
    }

    let status = process_runner::run_pipeline(ctx, stages, ext_stdin, ext_stdout)?;
    ctx.state.set_status(status);
    Ok(status)
}

fn eval_redirected_statement(ctx: &mut EvalContext, node: &Node) -> EngineResult<i32> {
    let stmt_plan = redirections::build_plan(ctx, node);
    let (ext_stdin, ext_stdout, opened) = match process_runner::open_external(&stmt_plan) {
        Ok(v) => v,
        Err(()) => {
            ctx.state.set_status(1);
            return Ok(1);
        }
    };

    let body = ctx
        .registry
        .fields
        .body
        .and_then(|id| node.child_by_field_id(id))
        .or_else(|| {
            let mut cursor = node.walk();
            node.named_children(&mut cursor)
                .find(|c| c.kind() != "file_redirect")
        });

    let status = match body {
        Some(ref b) if ctx.registry.is_command(b) => eval_command(ctx, b, ext_stdin, ext_stdout),
        Some(ref b) if b.kind() == "pipeline" => eval_pipeline(ctx, b, ext_stdin, ext_stdout),
        Some(ref b) => {
            tracing::warn!(kind = b.kind(), "unimplemented redirected_statement body");
            Ok(ctx.state.last_status)
        }
        None => {
            ctx.state.set_status(1);
            Ok(1)
        }
    };

    process_runner::close_all(&opened);
    status
}

/// Re-enter the evaluator in a forked child to realize a `$(...)`
/// substitution (§4.2.3). The child's stdout is captured through a pipe;
/// trailing-newline stripping is done by the caller in `word_expansion`.
///
/// `parent_pid`/`parent_status` seed the child's `ShellState` so that `$$`
/// and `$?` read inside the substitution see the same values a real
/// `fork()` would have copied, rather than the forked child's own pid
/// (Testable Property #3: `$$` is stable across a single run).
///
/// Returns `Ok(None)` on pipe/fork failure — a recoverable, OOM-style
/// outcome the caller folds into `last_status = 1` — and propagates
/// `Err(EngineError::WaitInvariant)` if the parent's own wait for this
/// child hits the fatal "no outstanding child" case from §7.
///
/// `SIGCHLD` is blocked from immediately before `fork()` through the final
/// wait, so the installed reaper can never observe this child's exit
/// before this function's own `waitpid` does.
pub fn run_captured(
    inner: &str,
    signals: &SignalCoordinator,
    parent_pid: u32,
    parent_status: i32,
) -> EngineResult<Option<Vec<u8>>> {
    let mut fds = [0 as RawFd; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Ok(None);
    }
    let (read_fd, write_fd) = (fds[0], fds[1]);

    let _guard = signals.block_for_foreground_wait();

    let pid = unsafe { libc::fork() };
    if pid < 0 {
        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
        return Ok(None);
    }

    if pid == 0 {
        unsafe {
            libc::close(read_fd);
            libc::dup2(write_fd, 1);
            libc::close(write_fd);
        }
        let mut evaluator = Evaluator::new();
        let mut state = ShellState {
            last_status: parent_status,
            pid: parent_pid,
        };
        let status = match evaluator.evaluate(inner, &mut state, signals) {
            Ok(status) => status,
            Err(_) => 1,
        };
        std::process::exit(status);
    }

    unsafe {
        libc::close(write_fd);
    }

    let mut captured = Vec::new();
    {
        use std::os::unix::io::FromRawFd;
        let mut file = unsafe { std::fs::File::from_raw_fd(read_fd) };
        let _ = file.read_to_end(&mut captured);
    }

    let mut status: libc::c_int = 0;
    loop {
        let r = unsafe { libc::waitpid(pid, &mut status, 0) };
        if r == pid {
            break;
        }
        if r < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(EngineError::WaitInvariant);
        }
    }

    Ok(Some(captured))
}
