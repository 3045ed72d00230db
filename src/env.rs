use std::env as stdenv;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

/// View of the process environment used by the interpreter.
///
/// Variables are read from and written to the real process environment, so
/// that spawned programs inherit every `setenv` without extra plumbing.
///
/// The environment contains:
/// - `current_dir`: the working directory, refreshed on every `cd`.
/// - `should_exit`: set by the `exit` built-in; the prompt loop stops when it flips.
#[derive(Debug, Clone)]
pub struct Environment {
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// When set to true, indicates that the interactive loop should exit.
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current working directory into a new `Environment` instance.
    pub fn new() -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            current_dir,
            should_exit: false,
        }
    }

    /// Get the value of an environment variable, if set.
    pub fn get_var(&self, key: impl AsRef<OsStr>) -> Option<OsString> {
        stdenv::var_os(key)
    }

    /// Set or override an environment variable for this process and every
    /// child spawned afterwards.
    pub fn set_var(&mut self, key: impl AsRef<OsStr>, val: impl AsRef<OsStr>) {
        // SAFETY: the prompt loop is the only thread that touches the
        // environment; the signal mediator thread never reads it.
        unsafe { stdenv::set_var(key, val) }
    }

    /// Every variable in the order the operating system provides them.
    pub fn vars(&self) -> impl Iterator<Item = (OsString, OsString)> {
        stdenv::vars_os()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
