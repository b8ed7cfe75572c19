//! Server configuration
//!
//! Sources, lowest precedence first: defaults, environment
//! (`CHIRP_MODE`, `CHIRP_CONSUMERS`), command line (`chirp [consumers]`).
//! A positional consumer count on the command line selects parallel mode.

use crate::error::{ServerError, ServerResult};
use chirp_core::env_get_opt;
use std::fmt;
use std::str::FromStr;

/// Upper bound on consumer threads
pub const MAX_CONSUMERS: usize = 256;

/// Environment variable selecting the run mode
pub const ENV_MODE: &str = "CHIRP_MODE";

/// Environment variable setting the consumer count
pub const ENV_CONSUMERS: &str = "CHIRP_CONSUMERS";

/// How requests are applied to the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// One loop, responses in request order
    #[default]
    Sequential,
    /// One producer and N consumers; response order is not guaranteed
    Parallel,
}

impl FromStr for Mode {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s" | "seq" | "sequential" => Ok(Mode::Sequential),
            "p" | "par" | "parallel" => Ok(Mode::Parallel),
            other => Err(ServerError::InvalidConfig(format!("unknown mode '{}'", other))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Sequential => write!(f, "sequential"),
            Mode::Parallel => write!(f, "parallel"),
        }
    }
}

/// Configuration for the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Sequential or parallel dispatch
    pub mode: Mode,

    /// Number of consumer threads (parallel mode only)
    pub consumers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let num_cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            mode: Mode::Sequential,
            consumers: num_cpus.min(MAX_CONSUMERS),
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dispatch mode
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the number of consumer threads
    pub fn consumers(mut self, n: usize) -> Self {
        self.consumers = n;
        self
    }

    /// Shorthand for parallel mode with `n` consumers
    pub fn parallel(n: usize) -> Self {
        Self::default().mode(Mode::Parallel).consumers(n)
    }

    /// Apply `CHIRP_MODE` / `CHIRP_CONSUMERS` where set and valid
    pub fn with_env(mut self) -> Self {
        if let Some(mode) = env_get_opt::<Mode>(ENV_MODE) {
            self.mode = mode;
        }
        if let Some(n) = env_get_opt::<usize>(ENV_CONSUMERS) {
            self.consumers = n;
        }
        self
    }

    /// Apply command-line arguments (program name already stripped)
    ///
    /// The only positional argument is the consumer count; giving one
    /// switches to parallel mode.
    pub fn with_args<I, S>(mut self, args: I) -> ServerResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args = args.into_iter();
        if let Some(count) = args.next() {
            let count = count.as_ref();
            self.consumers = count.trim().parse().map_err(|_| {
                ServerError::InvalidConfig(format!("consumer count '{}' is not a number", count))
            })?;
            self.mode = Mode::Parallel;
        }
        if let Some(extra) = args.next() {
            return Err(ServerError::InvalidConfig(format!(
                "unexpected argument '{}'",
                extra.as_ref()
            )));
        }
        Ok(self)
    }

    /// Defaults, then environment, then arguments; validated
    pub fn from_env_and_args<I, S>(args: I) -> ServerResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let config = Self::default().with_env().with_args(args)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> ServerResult<()> {
        if self.mode == Mode::Parallel {
            if self.consumers == 0 {
                return Err(ServerError::InvalidConfig(
                    "consumers must be at least 1".into(),
                ));
            }
            if self.consumers > MAX_CONSUMERS {
                return Err(ServerError::InvalidConfig(format!(
                    "consumers exceeds maximum of {}",
                    MAX_CONSUMERS
                )));
            }
        }
        Ok(())
    }
}
