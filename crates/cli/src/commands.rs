//! Clap command tree.

use clap::{Arg, ArgAction, Command};

/// Build the top-level command.
pub fn build_cli() -> Command {
    Command::new("steadfast-cli")
        .about("Race concurrent withdrawals against the steadfast backends")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_name("FILE")
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("env")
                .long("env")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Apply STEADFAST_BACKEND / STEADFAST_MAX_CONNECTIONS"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("race")
                .about("Withdraw concurrently from the test account and report the outcome")
                .arg(
                    Arg::new("backend")
                        .long("backend")
                        .short('b')
                        .value_name("BACKEND")
                        .help("pessimistic | optimistic | unguarded"),
                )
                .arg(
                    Arg::new("isolation")
                        .long("isolation")
                        .value_name("LEVEL")
                        .help("Pessimistic isolation: repeatable_read | serializable"),
                )
                .arg(
                    Arg::new("amount")
                        .long("amount")
                        .value_name("N")
                        .default_value("100000")
                        .help("Amount each participant withdraws"),
                )
                .arg(
                    Arg::new("balance")
                        .long("balance")
                        .value_name("N")
                        .default_value("100000")
                        .help("Opening balance of the test account"),
                )
                .arg(
                    Arg::new("delays")
                        .long("delays")
                        .value_name("MS,MS,...")
                        .default_value("1000,2000")
                        .help("One delay in milliseconds per participant"),
                ),
        )
        .subcommand(Command::new("config").about("Print the resolved configuration"))
}
