use crate::env::Environment;
use anyhow::Result;
use std::io::Write;
use std::path::PathBuf;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

/// A single line of input, parsed and ready to run.
///
/// Built fresh for every line and consumed exactly once, either by the
/// built-in dispatcher or by the job controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    argv: Vec<String>,
    /// File that receives the program's standard output, truncated on open.
    pub redirect: Option<PathBuf>,
    /// Run without waiting and without timeout or interrupt delegation.
    pub background: bool,
}

impl CommandRequest {
    /// Returns `None` when `argv` is empty: a request always names a program.
    pub fn new(argv: Vec<String>, redirect: Option<PathBuf>, background: bool) -> Option<Self> {
        if argv.is_empty() {
            return None;
        }
        Some(Self {
            argv,
            redirect,
            background,
        })
    }

    /// Program name, the first element of the argument vector.
    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    /// Arguments following the program name.
    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

/// Object-safe trait for a command that runs inside the shell process.
///
/// Implemented by built-ins via a blanket impl and by the argument-error stub.
pub trait ExecutableCommand {
    /// Executes the command, writing regular output to `stdout` and
    /// diagnostics to `stderr`.
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`.
pub trait CommandFactory {
    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>>;
}
