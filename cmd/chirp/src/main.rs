//! chirp - feed server over stdin/stdout
//!
//! Reads JSON requests from stdin and writes one JSON response per line
//! to stdout. Logs go to stderr (`RUST_LOG`, default `warn`).
//!
//! ```text
//! chirp            # sequential
//! chirp 4          # parallel, 4 consumers
//! CHIRP_MODE=p CHIRP_CONSUMERS=8 chirp
//! ```
//!
//! Exit status: 0 on success, 1 on a configuration or output error,
//! 2 when the input stream is malformed.

use chirp_server::{Dispatcher, JsonSink, JsonSource, ServerConfig, TimeOrderedFeed};
use log::{error, info};
use std::io;
use std::process::ExitCode;
use std::sync::Arc;

/// Exit status when the request stream could not be decoded
const EXIT_BAD_INPUT: u8 = 2;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = match ServerConfig::from_env_and_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            eprintln!("usage: chirp [consumers]");
            return ExitCode::FAILURE;
        }
    };

    let feed = Arc::new(TimeOrderedFeed::new());
    let dispatcher = Dispatcher::new(feed, config);
    let sink = JsonSink::new(io::stdout());

    match dispatcher.run(JsonSource::new(io::stdin().lock()), &sink) {
        Ok(stats) => {
            info!("served {} requests", stats.requests);
            ExitCode::SUCCESS
        }
        Err(e) if e.is_decode() => {
            error!("malformed input: {}", e);
            ExitCode::from(EXIT_BAD_INPUT)
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
