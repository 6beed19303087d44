//! steadfast CLI — runs the concurrent withdrawal race.
//!
//! ```text
//! steadfast-cli race --backend pessimistic
//! steadfast-cli race --backend unguarded --delays 10,20
//! steadfast-cli --config steadfast.toml config
//! ```
//!
//! Logs go to stderr, filtered by `RUST_LOG` (default `info`).

mod commands;
mod format;
mod parse;

use std::process;

use steadfast::prelude::*;
use steadfast::workflow::run_withdrawal_race;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use commands::build_cli;
use format::{format_config, format_report};
use parse::{matches_to_action, CliAction, RaceArgs};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let matches = build_cli().get_matches();
    let action = match matches_to_action(&matches) {
        Ok(action) => action,
        Err(e) => {
            eprintln!("(error) {}", e);
            process::exit(2);
        }
    };

    debug!(?action, "parsed command line");
    let builder = base_builder(&matches);
    let exit_code = match action {
        CliAction::ShowConfig => match builder.build_config() {
            Ok(config) => {
                println!("{}", format_config(&config));
                0
            }
            Err(e) => {
                eprintln!("(error) {}", e);
                1
            }
        },
        CliAction::Race(args) => match race(builder, args).await {
            Ok(report) => {
                println!("{}", format_report(&report));
                0
            }
            Err(e) => {
                error!(error = %e, "race aborted");
                eprintln!("(error) {}", e);
                1
            }
        },
    };
    process::exit(exit_code);
}

fn base_builder(matches: &clap::ArgMatches) -> SteadfastBuilder {
    let mut builder = Steadfast::builder();
    if let Some(path) = matches.get_one::<String>("config") {
        builder = builder.config_file(path);
    }
    if matches.get_flag("env") {
        builder = builder.from_env();
    }
    builder
}

async fn race(mut builder: SteadfastBuilder, args: RaceArgs) -> Result<RaceReport> {
    if let Some(backend) = args.backend {
        builder = builder.backend(backend);
    }
    if let Some(level) = args.isolation {
        builder = builder.pessimistic_isolation(level);
    }
    let db = builder.open()?;
    info!(
        backend = %db.backend(),
        isolation = %db.config().relational_isolation(),
        max_connections = db.config().max_connections,
        "instance opened"
    );
    run_withdrawal_race(&db, args.balance, args.amount, &args.delays).await
}
