//! An interactive shell with output redirection, background jobs and a
//! wall-clock limit on foreground programs.
//!
//! A line is parsed into a [`CommandRequest`](command::CommandRequest). The
//! built-ins (`cd`, `pwd`, `echo`, `exit`, `env`, `setenv`) run in-process;
//! anything else is spawned by the [`JobController`]. While a foreground
//! program runs, its pid sits in the [`ForegroundSlot`], which the
//! [`SignalMediator`](signals::SignalMediator) consults to forward interrupts
//! and to enforce the timeout.

mod builtin;
pub mod command;
pub mod config;
pub mod env;
mod interpreter;
pub mod jobs;
pub mod parser;
pub mod signals;

/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::{Flow, Interpreter, render_prompt};
pub use jobs::{JobController, JobOutcome};
pub use signals::ForegroundSlot;
