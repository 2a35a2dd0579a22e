//! Process Runner (C4)
//!
//! Forks, applies the descriptor plan, execs a builtin or external program,
//! reaps, and maps the wait status to an exit code. Pipelines are composed
//! from N forked children joined by N−1 anonymous pipes.
//!
//! Every fork here is followed immediately, in the child, by either an
//! in-process builtin body or an `execvp`; the parent always closes its copy
//! of every fd it handed to a child before waiting.

use std::ffi::CString;
use std::os::unix::io::RawFd;

use crate::interpreter::errors::{EngineError, EngineResult};
use crate::interpreter::redirections::FdAction;
use crate::interpreter::types::{EvalContext, SHELL_NAME};

/// Apply a redirection plan in the current process (meant to be called
/// after fork, before exec). Entries are applied in order; a later entry
/// targeting the same destination fd (0 or 1) naturally overrides an
/// earlier one, since both just `dup2` onto the same target.
///
/// On failure, writes the §7 diagnostic and returns `false` — the caller
/// must `_exit(1)` without running anything further, since we're
/// post-fork and must not unwind back into the parent's stack.
fn apply_plan(plan: &[FdAction]) -> bool {
    for action in plan {
        let (path, flags, target_fd) = match action {
            FdAction::Input(path) => (path, libc::O_RDONLY, 0),
            FdAction::Output { path, truncate } => {
                let flags = libc::O_WRONLY
                    | libc::O_CREAT
                    | if *truncate { libc::O_TRUNC } else { libc::O_APPEND };
                (path, flags, 1)
            }
        };
        let Ok(c_path) = CString::new(path.as_os_str().to_string_lossy().as_bytes()) else {
            diagnose(action, path.to_string_lossy().as_ref());
            return false;
        };
        let fd = unsafe { libc::open(c_path.as_ptr(), flags, 0o666) };
        if fd < 0 {
            diagnose(action, &path.to_string_lossy());
            return false;
        }
        unsafe {
            libc::dup2(fd, target_fd);
            libc::close(fd);
        }
    }
    true
}

fn diagnose(action: &FdAction, path: &str) {
    let direction = match action {
        FdAction::Input(_) => "input",
        FdAction::Output { .. } => "output",
    };
    eprintln!("{SHELL_NAME}: cannot open for {direction}: {path}");
}

/// Open the fds named by a `redirected_statement`'s own plan, without
/// wiring them onto 0/1 — the caller passes them down as the external
/// stdin/stdout of a command or pipeline (§4.4.3). Returns the fds plus
/// the full list to close once the statement's wait completes.
pub fn open_external(
    plan: &[FdAction],
) -> Result<(Option<RawFd>, Option<RawFd>, Vec<RawFd>), ()> {
    let mut stdin_fd: Option<RawFd> = None;
    let mut stdout_fd: Option<RawFd> = None;
    let mut opened = Vec::new();

    for action in plan {
        let (path, flags, is_input) = match action {
            FdAction::Input(path) => (path, libc::O_RDONLY, true),
            FdAction::Output { path, truncate } => {
                let flags = libc::O_WRONLY
                    | libc::O_CREAT
                    | if *truncate { libc::O_TRUNC } else { libc::O_APPEND };
                (path, flags, false)
            }
        };
        let Ok(c_path) = CString::new(path.as_os_str().to_string_lossy().as_bytes()) else {
            diagnose(action, &path.to_string_lossy());
            close_all(&opened);
            return Err(());
        };
        let fd = unsafe { libc::open(c_path.as_ptr(), flags, 0o666) };
        if fd < 0 {
            diagnose(action, &path.to_string_lossy());
            close_all(&opened);
            return Err(());
        }
        opened.push(fd);
        if is_input {
            stdin_fd = Some(fd);
        } else {
            stdout_fd = Some(fd);
        }
    }
    Ok((stdin_fd, stdout_fd, opened))
}

/// Close a list of raw fds, ignoring errors (they may already be closed).
pub(crate) fn close_all(fds: &[RawFd]) {
    for &fd in fds {
        if fd >= 0 {
            unsafe {
                libc::close(fd);
            }
        }
    }
}

/// Convert a `libc::waitpid` status to a shell exit code per §3: normal
/// exit yields the exit code, signal death yields `128 + signal`.
pub fn status_to_exit_code(status: libc::c_int) -> i32 {
    unsafe {
        if libc::WIFEXITED(status) {
            libc::WEXITSTATUS(status)
        } else if libc::WIFSIGNALED(status) {
            128 + libc::WTERMSIG(status)
        } else {
            1
        }
    }
}

fn argv_to_cstrings(argv: &[Vec<u8>]) -> Option<Vec<CString>> {
    argv.iter()
        .map(|a| CString::new(a.as_slice()).ok())
        .collect()
}

/// Exec `argv[0]` (already PATH-resolved to `resolved_path`), replacing the
/// current process image. Never returns on success. On failure, exits 127
/// per §4.4.1 / §7.
fn exec_or_exit(resolved_path: &std::path::Path, argv: &[Vec<u8>]) -> ! {
    let Some(cstrings) = argv_to_cstrings(argv) else {
        std::process::exit(127);
    };
    let Ok(c_path) = CString::new(resolved_path.as_os_str().to_string_lossy().as_bytes()) else {
        std::process::exit(127);
    };
    let mut c_argv: Vec<*const libc::c_char> =
        cstrings.iter().map(|s| s.as_ptr()).collect();
    c_argv.push(std::ptr::null());

    unsafe {
        libc::execv(c_path.as_ptr(), c_argv.as_ptr());
    }
    // execv only returns on failure.
    std::process::exit(127);
}

/// What a forked child should do: run a builtin body in-process, or exec an
/// external program. Kept as an enum rather than a closure so that the
/// fork/exec bookkeeping below stays readable.
pub enum ChildAction<'a> {
    Exec {
        resolved_path: std::path::PathBuf,
        argv: Vec<Vec<u8>>,
    },
    /// Run a builtin and exit with its status. Used inside a pipeline
    /// stage, where a builtin must write to its already-duped stdout. Also
    /// used to synthesize a plain exit code in-child (e.g. the 127 a
    /// pipeline stage yields when its program can't be resolved), so that
    /// the stage still occupies a pid slot in the pipeline's fd wiring.
    Builtin(Box<dyn FnOnce() -> i32 + 'a>),
}

/// Fork one child that applies `plan` (after wiring `stdin_fd`/`stdout_fd`
/// if given) and then performs `action`. Returns the child pid, or `None`
/// if `fork` failed (§7 "fork/pipe failure").
fn fork_child(
    plan: &[FdAction],
    stdin_fd: Option<RawFd>,
    stdout_fd: Option<RawFd>,
    close_after_dup: &[RawFd],
    action: ChildAction,
) -> Option<libc::pid_t> {
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return None;
    }
    if pid == 0 {
        // Child: wire pipeline fds first, then local redirections override.
        if let Some(fd) = stdin_fd {
            unsafe {
                libc::dup2(fd, 0);
            }
        }
        if let Some(fd) = stdout_fd {
            unsafe {
                libc::dup2(fd, 1);
            }
        }
        close_all(close_after_dup);

        if !apply_plan(plan) {
            std::process::exit(1);
        }

        match action {
            ChildAction::Exec { resolved_path, argv } => exec_or_exit(&resolved_path, &argv),
            ChildAction::Builtin(body) => std::process::exit(body()),
        }
    }
    Some(pid)
}

/// §4.4.1: a simple command with no enclosing pipeline. `stdin_fd`/
/// `stdout_fd` are the fds opened by an enclosing `redirected_statement`,
/// if any. Returns the exit code to become `last_status`.
///
/// `SIGCHLD` is blocked for the entire fork-through-wait span, not just
/// around the `waitpid` call: the installed handler reaps any exited child
/// it sees via `WNOHANG`, and if it ran between `fork` returning here and
/// the explicit wait below, a fast-exiting child's status would be lost
/// before this function ever observed it (§4.6/§5).
pub fn run_simple(
    ctx: &EvalContext,
    resolved_path: Option<std::path::PathBuf>,
    argv: Vec<Vec<u8>>,
    plan: &[FdAction],
    stdin_fd: Option<RawFd>,
    stdout_fd: Option<RawFd>,
) -> EngineResult<i32> {
    let Some(resolved_path) = resolved_path else {
        eprintln!("{SHELL_NAME}: {}: command not found", String::from_utf8_lossy(&argv[0]));
        return Ok(127);
    };

    let _guard = ctx.signals.block_for_foreground_wait();
    let child = fork_child(
        plan,
        stdin_fd,
        stdout_fd,
        &[],
        ChildAction::Exec {
            resolved_path,
            argv,
        },
    );
    let Some(pid) = child else {
        eprintln!("{SHELL_NAME}: fork failed");
        return Ok(1);
    };

    wait_one_raw(pid)
}

/// `waitpid` for a specific child, retrying on `EINTR`. Assumes the caller
/// already holds a `SIGCHLD`-blocking guard spanning the fork that produced
/// `pid`. Any wait failure other than `EINTR` means the kernel has no
/// record of `pid` as our child — the one case §7 designates fatal — and
/// is propagated as `EngineError::WaitInvariant` rather than folded into an
/// ordinary exit code.
fn wait_one_raw(pid: libc::pid_t) -> EngineResult<i32> {
    let mut status: libc::c_int = 0;
    loop {
        let r = unsafe { libc::waitpid(pid, &mut status, 0) };
        if r == pid {
            return Ok(status_to_exit_code(status));
        }
        if r < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(EngineError::WaitInvariant);
        }
    }
}

/// One stage of a pipeline to be forked: its resolved program (if any
/// builtin that must run in-child, `resolved_path` is `None` and `builtin`
/// carries the closure instead), its argv, and its own local redirect plan.
pub struct Stage<'a> {
    pub resolved_path: Option<std::path::PathBuf>,
    pub argv: Vec<Vec<u8>>,
    pub plan: Vec<FdAction>,
    pub builtin: Option<Box<dyn FnOnce() -> i32 + 'a>>,
}

/// §4.4.2: a pipeline of N commands. `ext_stdin`/`ext_stdout` are the fds
/// supplied by an enclosing `redirected_statement`, applied only to stage 0
/// and stage N−1 respectively. Returns the exit status of the last stage.
///
/// A stage whose program can't be resolved on `$PATH` is not a pipeline
/// construction failure (that's reserved for `fork`/`pipe` failing): per
/// §7 "Exec failure" combined with §4.4.2 step 5, it still forks — a child
/// that immediately exits 127 — so every other stage still runs and
/// `last_status` still reflects the *last* stage's real outcome.
pub fn run_pipeline(
    ctx: &EvalContext,
    stages: Vec<Stage>,
    ext_stdin: Option<RawFd>,
    ext_stdout: Option<RawFd>,
) -> EngineResult<i32> {
    let n = stages.len();
    if n == 0 {
        return Ok(0);
    }
    if n == 1 {
        let mut stages = stages;
        let stage = stages.remove(0);
        return run_single_stage(ctx, stage, ext_stdin, ext_stdout);
    }

    // Create N-1 pipes.
    let mut pipes: Vec<(RawFd, RawFd)> = Vec::with_capacity(n - 1);
    for _ in 0..n - 1 {
        let mut fds = [0 as RawFd; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            for (r, w) in &pipes {
                close_all(&[*r, *w]);
            }
            eprintln!("{SHELL_NAME}: pipe failed");
            return Ok(1);
        }
        pipes.push((fds[0], fds[1]));
    }

    let all_pipe_fds: Vec<RawFd> = pipes.iter().flat_map(|(r, w)| [*r, *w]).collect();

    // `SIGCHLD` stays blocked from before the first fork until every pid has
    // been waited for, so the reaper handler can never observe and discard
    // a stage's exit before this function's own waitpid loop runs.
    let _guard = ctx.signals.block_for_foreground_wait();

    let mut pids = Vec::with_capacity(n);
    let mut spawn_failed = false;

    for (i, stage) in stages.into_iter().enumerate() {
        let stdin_fd = if i == 0 {
            ext_stdin
        } else {
            Some(pipes[i - 1].0)
        };
        let stdout_fd = if i == n - 1 {
            ext_stdout
        } else {
            Some(pipes[i].1)
        };

        let action = match (stage.resolved_path, stage.builtin) {
            (Some(resolved_path), _) => ChildAction::Exec {
                resolved_path,
                argv: stage.argv,
            },
            (None, Some(body)) => ChildAction::Builtin(body),
            (None, None) => {
                eprintln!(
                    "{SHELL_NAME}: {}: command not found",
                    String::from_utf8_lossy(stage.argv.first().map(|v| v.as_slice()).unwrap_or(b""))
                );
                // Still occupies this stage's pid slot: fork a child that
                // does nothing but exit 127, exactly as a real exec
                // failure would, rather than aborting the whole pipeline.
                ChildAction::Builtin(Box::new(|| 127))
            }
        };

        match fork_child(&stage.plan, stdin_fd, stdout_fd, &all_pipe_fds, action) {
            Some(pid) => pids.push(pid),
            None => {
                eprintln!("{SHELL_NAME}: fork failed");
                spawn_failed = true;
                break;
            }
        }
    }

    // Parent closes every pipe endpoint after the last fork (§4.4.2 step 4).
    close_all(&all_pipe_fds);

    if spawn_failed {
        for pid in &pids {
            let mut status = 0;
            unsafe {
                libc::waitpid(*pid, &mut status, 0);
            }
        }
        return Ok(1);
    }

    let last_pid = *pids.last().unwrap();
    let mut last_status_code = 1;
    let mut remaining: std::collections::HashSet<libc::pid_t> = pids.iter().copied().collect();
    while !remaining.is_empty() {
        let mut status: libc::c_int = 0;
        let r = unsafe { libc::waitpid(-1, &mut status, 0) };
        if r < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(EngineError::WaitInvariant);
        }
        if remaining.remove(&r) && r == last_pid {
            last_status_code = status_to_exit_code(status);
        }
    }
    Ok(last_status_code)
}

fn run_single_stage(
    ctx: &EvalContext,
    stage: Stage,
    ext_stdin: Option<RawFd>,
    ext_stdout: Option<RawFd>,
) -> EngineResult<i32> {
    match (stage.resolved_path, stage.builtin) {
        (Some(resolved_path), _) => run_simple(
            ctx,
            Some(resolved_path),
            stage.argv,
            &stage.plan,
            ext_stdin,
            ext_stdout,
        ),
        (None, Some(body)) if ext_stdin.is_none() && ext_stdout.is_none() && stage.plan.is_empty() => {
            // No process-level plumbing needed: run the builtin directly in
            // the shell process (§4.4.4 — a sole-stage `echo` runs in the
            // parent so it can be used uninstrumented).
            Ok(body())
        }
        (None, builtin) => {
            let _guard = ctx.signals.block_for_foreground_wait();
            let child = fork_child(
                &stage.plan,
                ext_stdin,
                ext_stdout,
                &[],
                match builtin {
                    Some(body) => ChildAction::Builtin(body),
                    None => {
                        eprintln!(
                            "{SHELL_NAME}: {}: command not found",
                            String::from_utf8_lossy(stage.argv.first().map(|v| v.as_slice()).unwrap_or(b""))
                        );
                        return Ok(127);
                    }
                },
            );
            match child {
                Some(pid) => wait_one_raw(pid),
                None => {
                    eprintln!("{SHELL_NAME}: fork failed");
                    Ok(1)
                }
            }
        }
    }
}
