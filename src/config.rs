use argh::FromArgs;

/// Wall-clock budget for a foreground process.
pub const DEFAULT_TIMEOUT_SECS: u32 = 10;
/// Printed after the working directory in the prompt.
pub const DEFAULT_MARKER: &str = "> ";
/// Environment variable holding the `tracing` filter directives.
pub const LOG_ENV: &str = "QUASH_LOG";

#[derive(FromArgs, Debug)]
/// interactive shell with output redirection, background jobs and a foreground timeout.
pub struct Args {
    #[argh(
        option,
        default = "DEFAULT_TIMEOUT_SECS",
        from_str_fn(parse_timeout)
    )]
    /// seconds a foreground program may run before it is killed (default 10).
    pub timeout: u32,

    #[argh(option, default = "String::from(DEFAULT_MARKER)")]
    /// text shown after the working directory in the prompt.
    pub marker: String,
}

fn parse_timeout(value: &str) -> Result<u32, String> {
    match value.parse::<u32>() {
        Ok(0) => Err("timeout must be at least 1 second".to_string()),
        Ok(secs) => Ok(secs),
        Err(e) => Err(format!("invalid timeout {:?}: {}", value, e)),
    }
}

/// Settings resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    pub timeout_secs: u32,
    pub marker: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            marker: DEFAULT_MARKER.to_string(),
        }
    }
}

impl From<Args> for ShellConfig {
    fn from(args: Args) -> Self {
        Self {
            timeout_secs: args.timeout,
            marker: args.marker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ShellConfig, String> {
        Args::from_args(&["quash"], args)
            .map(ShellConfig::from)
            .map_err(|e| e.output)
    }

    #[test]
    fn test_defaults() {
        assert_eq!(parse(&[]).unwrap(), ShellConfig::default());
        assert_eq!(ShellConfig::default().timeout_secs, 10);
    }

    #[test]
    fn test_overrides() {
        let config = parse(&["--timeout", "3", "--marker", "$ "]).unwrap();
        assert_eq!(config.timeout_secs, 3);
        assert_eq!(config.marker, "$ ");
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let err = parse(&["--timeout", "0"]).unwrap_err();
        assert!(err.contains("at least 1 second"), "{}", err);
        assert!(parse(&["--timeout", "soon"]).is_err());
    }
}
