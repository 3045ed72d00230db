use crate::command::{CommandFactory, CommandRequest, ExecutableCommand, ExitCode};
use crate::env::Environment;
use anyhow::{Context, Result, bail};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed through [`argh::FromArgs`] (derived, or written by hand
/// where every word must be taken literally) and executed directly in-process
/// without spawning a child process. They never touch the foreground process
/// slot.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Executes the command using the provided output stream and environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        match T::execute(*self, stdout, env) {
            Ok(x) => Ok(x),
            Err(e) => {
                writeln!(stderr, "{:#}", e)?;
                Ok(1)
            }
        }
    }
}

struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        if self.is_error {
            writeln!(stderr, "{}", self.output)?;
            Ok(1)
        } else {
            writeln!(stdout, "{}", self.output)?;
            Ok(0)
        }
    }
}

/// Zero-sized factory for a single built-in type.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

/// Recognises the reserved command names and runs them in-process.
pub struct Builtins {
    commands: Vec<Box<dyn CommandFactory>>,
}

impl Builtins {
    /// Create a dispatcher over a custom set of command factories.
    pub fn new(commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self { commands }
    }

    /// Run `request` if its program is a built-in.
    ///
    /// Returns `None` when no built-in claims the name, in which case the
    /// request belongs to the job controller. Redirection and the background
    /// marker are ignored: built-ins always write to `stdout`.
    pub fn dispatch(
        &self,
        request: &CommandRequest,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> Option<Result<ExitCode>> {
        let args: Vec<&str> = request.args().iter().map(String::as_str).collect();
        let cmd = self
            .commands
            .iter()
            .find_map(|factory| factory.try_create(request.program(), &args))?;
        Some(cmd.execute(stdout, stderr, env))
    }
}

impl Default for Builtins {
    /// The reserved names: `cd`, `pwd`, `echo`, `exit`, `env`, `setenv`.
    fn default() -> Self {
        Self::new(vec![
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Pwd>::default()),
            Box::new(Factory::<Echo>::default()),
            Box::new(Factory::<Exit>::default()),
            Box::new(Factory::<Env>::default()),
            Box::new(Factory::<SetEnv>::default()),
        ])
    }
}

#[derive(FromArgs)]
/// print the current working directory to standard output.
pub struct Pwd {
    #[argh(positional, greedy)]
    /// ignored.
    pub ignored: Vec<String>,
}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        let cwd = env::current_dir().context("pwd error")?;
        writeln!(stdout, "{}", cwd.display())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// change the current working directory.
pub struct Cd {
    #[argh(positional, greedy)]
    /// directory to switch to; absolute or relative to the current directory.
    /// Any further words are ignored.
    pub args: Vec<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let Some(target) = self.args.into_iter().next().filter(|t| !t.is_empty()) else {
            bail!("cd: missing argument");
        };

        env::set_current_dir(&target).with_context(|| format!("cd: {}", target))?;
        env.current_dir = env::current_dir().context("cd: can't read new directory")?;
        Ok(0)
    }
}

/// Exit the shell with status 0, whatever follows the name.
pub struct Exit;

impl FromArgs for Exit {
    fn from_args(_command_name: &[&str], _args: &[&str]) -> Result<Self, EarlyExit> {
        Ok(Exit)
    }
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        env.should_exit = true;
        Ok(0)
    }
}

/// Print each argument; `$NAME` arguments print the variable's value.
///
/// Every word is data, including ones that look like flags. Literal
/// arguments are followed by " \n", expanded ones by a single space. This
/// spacing is reproduced as-is and is part of the observable output.
pub struct Echo {
    pub args: Vec<String>,
}

impl FromArgs for Echo {
    fn from_args(_command_name: &[&str], args: &[&str]) -> Result<Self, EarlyExit> {
        Ok(Echo {
            args: args.iter().map(|s| s.to_string()).collect(),
        })
    }
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        for arg in &self.args {
            match arg.strip_prefix('$') {
                Some(name) => {
                    if let Some(value) = env.get_var(name) {
                        stdout.write_all(value.as_bytes())?;
                    }
                    stdout.write_all(b" ")?;
                }
                None => write!(stdout, "{} \n", arg)?,
            }
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// print every environment variable as NAME=VALUE.
pub struct Env {
    #[argh(positional, greedy)]
    /// ignored.
    pub ignored: Vec<String>,
}

impl BuiltinCommand for Env {
    fn name() -> &'static str {
        "env"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        for (key, value) in env.vars() {
            stdout.write_all(key.as_bytes())?;
            stdout.write_all(b"=")?;
            stdout.write_all(value.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// set an environment variable for the shell and the programs it starts.
pub struct SetEnv {
    #[argh(positional, greedy)]
    /// variable name followed by its new value.
    pub args: Vec<String>,
}

impl BuiltinCommand for SetEnv {
    fn name() -> &'static str {
        "setenv"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let [name, value, ..] = self.args.as_slice() else {
            bail!("setenv: missing arguments");
        };
        if name.is_empty() || name.contains(['=', '\0']) || value.contains('\0') {
            bail!("setenv error: invalid variable {:?}", name);
        }

        env.set_var(name, value);
        writeln!(stdout, "Environment variable set: {}={}", name, value)?;
        Ok(0)
    }
}
