use anyhow::Result;
use quash::config::{Args, LOG_ENV, ShellConfig};
use quash::signals::{AlarmCountdown, SignalMediator};
use quash::{ForegroundSlot, Interpreter, JobController};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    // Logs go to stderr so they never end up in a redirected stdout.
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();
    init_tracing();
    let config = ShellConfig::from(args);

    let slot = ForegroundSlot::new();
    let _mediator = SignalMediator::install(slot.clone(), &config)?;
    let jobs = JobController::new(slot, Box::new(AlarmCountdown::new(config.timeout_secs)));

    Interpreter::new(jobs, config.marker).repl()
}
