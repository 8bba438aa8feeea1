use siteforge::cli::commands::{CliArgs, Commands};
use siteforge::cli::handlers::{handle_deploy, handle_serve, handle_stacks, handle_whoami};
use siteforge::util::logging::{init_logging, parse_level, LoggingConfig};
use siteforge::{NAME, VERSION};

use clap::Parser;
use std::env;
use std::process;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("{} v{} starting", NAME, VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Serve(serve_args) => handle_serve(serve_args).await,
        Commands::Deploy(deploy_args) => handle_deploy(deploy_args).await,
        Commands::Stacks(stacks_args) => handle_stacks(stacks_args),
        Commands::Whoami(whoami_args) => handle_whoami(whoami_args).await,
    };

    process::exit(exit_code);
}

/// Flag level wins over `-v`/`-q`, which win over `SITEFORGE_LOG_LEVEL`
fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(level_str) = &args.log_level {
        parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        let level_str = env::var("SITEFORGE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        parse_level(&level_str)
    };

    let use_json = env::var("SITEFORGE_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    init_logging(LoggingConfig {
        level,
        use_json,
        ..Default::default()
    });
}
