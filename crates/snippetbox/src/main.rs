mod cli;

use std::backtrace::Backtrace;
use std::io;

use clap::Parser;
use cli::Opts;
use snafu::{FromString as _, ResultExt, Snafu, Whatever};
use snippetbox_web::{Server, WebServerError};
use tracing::error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

pub const LOG_TARGET: &str = "snippetbox::cli";

type WhateverResult<T> = std::result::Result<T, snafu::Whatever>;

#[derive(Debug, Snafu)]
pub enum CliError {
    #[snafu(display("Web server error: {source}"))]
    WebServer { source: WebServerError },
    #[snafu(display("Miscellaneous error: {source}"))]
    Whatever { source: Whatever },
}

pub type CliResult<T> = std::result::Result<T, CliError>;

#[snafu::report]
#[tokio::main]
async fn main() -> CliResult<()> {
    init_logging().context(WhateverSnafu)?;
    install_panic_hook();

    let opts = Opts::parse();

    let server = Server::init(opts.to_web_opts())
        .await
        .context(WebServerSnafu)?;
    server.run().await.context(WebServerSnafu)?;

    Ok(())
}

pub fn init_logging() -> WhateverResult<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .try_init()
        .map_err(|_| Whatever::without_source("Failed to initialize logging".to_string()))?;

    Ok(())
}

/// Log panics with a full backtrace. Request handler panics are turned into
/// 500 responses afterwards; the process keeps serving.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = Backtrace::force_capture();
        error!(target: LOG_TARGET, %info, %backtrace, "Panic");
    }));
}
