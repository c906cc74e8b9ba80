//!
//! sessiongate server binary
//! --------------------------
//! Command-line entry point for the login service. Configuration comes from
//! `SESSIONGATE_*` environment variables, overridden by CLI flags.

use anyhow::Result;
use std::env;

use sessiongate::config::{has_flag, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    println!(r"                    _                         __
   ________  ______(_)___  ____  ____ _____ _/ /____
  / ___/ _ \/ ___/ ___/ __ \/ __ \/ __ `/ __ `/ __/ _ \
 (__  )  __(__  |__  ) /_/ / / / / /_/ / /_/ / /_/  __/
/____/\___/____/____/\____/_/ /_/\__, /\__,_/\__/\___/
                                /____/");

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("{}", ServerConfig::usage());
        return Ok(());
    }

    let config = ServerConfig::from_env()?.apply_args(&args)?;
    println!(
        "sessiongate starting: http={}:{}, store={:?}",
        config.bind, config.http_port, config.store
    );
    sessiongate::server::run_with_config(config).await
}
