//! Human-readable output.

use steadfast::prelude::{Aggregate, Config, RaceReport};

/// Render a race report, one line per participant and a summary.
pub fn format_report(report: &RaceReport) -> String {
    let mut lines = vec![format!(
        "backend: {}  opening balance: {}  withdrawal: {}",
        report.backend,
        report.initial.balance(),
        report.amount
    )];
    for (i, outcome) in report.outcomes.iter().enumerate() {
        let line = match &outcome.result {
            Ok(balance) => format!(
                "  #{} (delay {}ms): success, balance seen {}",
                i + 1,
                outcome.delay.as_millis(),
                balance
            ),
            Err(e) => format!(
                "  #{} (delay {}ms): error: {}",
                i + 1,
                outcome.delay.as_millis(),
                e
            ),
        };
        lines.push(line);
    }
    lines.push(format!(
        "final: balance {} at {}",
        report.final_account.balance(),
        report.final_account.version()
    ));
    if report.lost_update() {
        lines.push(format!(
            "lost update: {} committed as withdrawn, {} left the account",
            report.total_debited(),
            report.balance_drop()
        ));
    }
    lines.join("\n")
}

/// Render a configuration.
pub fn format_config(config: &Config) -> String {
    format!(
        "backend = \"{}\"\npessimistic_isolation = \"{}\"\nmax_connections = {}\naccount_table = \"{}\"\naccount_collection = \"{}\"",
        config.backend,
        config.pessimistic_isolation,
        config.max_connections,
        config.account_table,
        config.account_collection
    )
}
