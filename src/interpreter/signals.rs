//! Signal Coordinator (C6)
//!
//! Installs a `SIGCHLD` handler that reaps any child whose death wasn't
//! already observed by a synchronous foreground `waitpid`, and exposes the
//! block/unblock discipline every foreground wait relies on: `SIGCHLD` is
//! blocked for the duration of a synchronous wait, and unblocked again while
//! the REPL is reading the next line — so a background reaper (once one
//! exists) never races a foreground `waitpid` for the same child.
//!
//! The handler itself touches only async-signal-safe operations: `waitpid`
//! in a tight `WNOHANG` loop. No allocation, no formatted I/O, no locking.

use std::mem::MaybeUninit;

/// Reap any terminated children without blocking. Async-signal-safe.
extern "C" fn reap_zombies(_signum: libc::c_int) {
    loop {
        let mut status: libc::c_int = 0;
        let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        if pid <= 0 {
            break;
        }
    }
}

/// Coordinates the process-wide `SIGCHLD` signal mask. Stateless: the mask
/// and handler live in the kernel/libc, not in this struct; it exists to
/// give the block/unblock discipline a name and a testable shape.
pub struct SignalCoordinator;

/// RAII guard returned by `block_for_foreground_wait`. `SIGCHLD` is
/// unblocked again when this guard is dropped.
pub struct BlockGuard;

impl Drop for BlockGuard {
    fn drop(&mut self) {
        unsafe {
            let mut set: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut set);
            libc::sigaddset(&mut set, libc::SIGCHLD);
            libc::sigprocmask(libc::SIG_UNBLOCK, &set, std::ptr::null_mut());
        }
    }
}

impl SignalCoordinator {
    pub fn new() -> Self {
        SignalCoordinator
    }

    /// Install the `SIGCHLD` handler. Call once at shell startup.
    pub fn install(&self) {
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = reap_zombies as usize;
            libc::sigemptyset(&mut action.sa_mask);
            action.sa_flags = libc::SA_RESTART;
            libc::sigaction(libc::SIGCHLD, &action, std::ptr::null_mut());
        }
    }

    /// Block `SIGCHLD` for the duration of a synchronous foreground wait.
    /// The returned guard unblocks it again on drop (e.g. when control
    /// returns to the read loop).
    pub fn block_for_foreground_wait(&self) -> BlockGuard {
        unsafe {
            let mut set: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut set);
            libc::sigaddset(&mut set, libc::SIGCHLD);
            libc::sigprocmask(libc::SIG_BLOCK, &set, std::ptr::null_mut());
        }
        BlockGuard
    }

    /// True if `SIGCHLD` is currently blocked in this process's signal mask.
    pub fn is_blocked(&self) -> bool {
        unsafe {
            let mut current = MaybeUninit::<libc::sigset_t>::zeroed();
            libc::pthread_sigmask(0, std::ptr::null(), current.as_mut_ptr());
            let current = current.assume_init();
            libc::sigismember(&current, libc::SIGCHLD) == 1
        }
    }
}

impl Default for SignalCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_guard_unblocks_on_drop() {
        let coord = SignalCoordinator::new();
        coord.install();
        assert!(!coord.is_blocked());
        {
            let _guard = coord.block_for_foreground_wait();
            assert!(coord.is_blocked());
        }
        assert!(!coord.is_blocked());
    }
}
