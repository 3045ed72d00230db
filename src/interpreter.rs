use crate::builtin::Builtins;
use crate::env::Environment;
use crate::jobs::JobController;
use crate::parser::{self, Parsed};
use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::env;
use std::io::{self, Write};
use tracing::{debug, warn};

/// What the prompt loop should do after a line has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Current working directory followed by `marker`.
pub fn render_prompt(marker: &str) -> String {
    match env::current_dir() {
        Ok(cwd) => format!("{}{}", cwd.display(), marker),
        Err(_) => marker.to_string(),
    }
}

/// A minimal interactive shell.
///
/// Each line is parsed into a request, offered to the built-ins and, if none
/// claims it, handed to the [`JobController`].
///
/// Example
/// ```no_run
/// use quash::{ForegroundSlot, Interpreter, JobController, signals::AlarmCountdown};
/// let jobs = JobController::new(ForegroundSlot::new(), Box::new(AlarmCountdown::new(10)));
/// let mut sh = Interpreter::new(jobs, "> ");
/// sh.execute_line("echo hello", &mut std::io::stdout(), &mut std::io::stderr()).unwrap();
/// ```
pub struct Interpreter {
    env: Environment,
    builtins: Builtins,
    jobs: JobController,
    marker: String,
}

impl Interpreter {
    pub fn new(jobs: JobController, marker: impl Into<String>) -> Self {
        Self {
            env: Environment::new(),
            builtins: Builtins::default(),
            jobs,
            marker: marker.into(),
        }
    }

    /// Parse and run one line of input.
    ///
    /// Input and operating-system errors are reported on `stderr` and never
    /// end the session; only `exit` yields [`Flow::Exit`]. An `Err` means
    /// writing to one of the streams failed.
    pub fn execute_line(
        &mut self,
        line: &str,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<Flow> {
        debug_assert_eq!(self.jobs.slot().current(), None);

        match parser::parse_line(line) {
            Parsed::Empty => {}
            Parsed::Invalid(errors) => {
                for error in errors {
                    writeln!(stderr, "{}", error)?;
                }
            }
            Parsed::Request { request, warning } => {
                if let Some(warning) = warning {
                    writeln!(stderr, "{}", warning)?;
                }
                match self
                    .builtins
                    .dispatch(&request, stdout, stderr, &mut self.env)
                {
                    Some(result) => {
                        result?;
                    }
                    None => {
                        if let Err(e) = self.jobs.execute(&request, stdout) {
                            debug!(error = %e, "external command failed");
                            writeln!(stderr, "quash: {:#}", e)?;
                        }
                    }
                }
            }
        }

        stdout.flush()?;
        Ok(if self.env.should_exit {
            Flow::Exit
        } else {
            Flow::Continue
        })
    }

    /// Read-Eval-Print Loop until `exit` or end of input.
    pub fn repl(&mut self) -> Result<()> {
        let mut rl = DefaultEditor::new()?;

        loop {
            let readline = rl.readline(&render_prompt(&self.marker));
            match readline {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line.as_str())?;
                    let flow = self.execute_line(&line, &mut io::stdout(), &mut io::stderr())?;
                    if flow == Flow::Exit {
                        break;
                    }
                }
                // ^C at the prompt: draw a fresh one
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "failed to read input");
                    eprintln!("quash: read error: {}", err);
                    break;
                }
            }
        }

        Ok(())
    }
}
