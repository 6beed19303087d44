//! ArgMatches → action conversion.

use std::time::Duration;

use clap::ArgMatches;
use steadfast::prelude::{BackendKind, IsolationLevel, Money};

/// Parsed `race` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceArgs {
    pub backend: Option<BackendKind>,
    pub isolation: Option<IsolationLevel>,
    pub amount: Money,
    pub balance: Money,
    pub delays: Vec<Duration>,
}

/// What the invocation asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum CliAction {
    Race(RaceArgs),
    ShowConfig,
}

/// Translate clap matches into a [`CliAction`].
pub fn matches_to_action(matches: &ArgMatches) -> Result<CliAction, String> {
    match matches.subcommand() {
        Some(("race", sub)) => {
            let backend = sub
                .get_one::<String>("backend")
                .map(|s| s.parse::<BackendKind>().map_err(|e| e.to_string()))
                .transpose()?;
            let isolation = sub
                .get_one::<String>("isolation")
                .map(String::as_str)
                .map(parse_isolation)
                .transpose()?;
            Ok(CliAction::Race(RaceArgs {
                backend,
                isolation,
                amount: parse_money(required(sub, "amount")?)?,
                balance: parse_money(required(sub, "balance")?)?,
                delays: parse_delays(required(sub, "delays")?)?,
            }))
        }
        Some(("config", _)) => Ok(CliAction::ShowConfig),
        Some((other, _)) => Err(format!("unknown command '{}'", other)),
        None => Err("missing command".to_string()),
    }
}

fn required<'m>(matches: &'m ArgMatches, name: &str) -> Result<&'m str, String> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| format!("missing --{}", name))
}

/// Parse `1234`, `1234.5` or `1234.56` as a currency amount.
///
/// Amounts are never negative; a sign of either kind is rejected.
pub fn parse_money(s: &str) -> Result<Money, String> {
    let invalid = || format!("invalid amount '{}'", s);
    let s = s.trim().trim_start_matches('$');
    let (whole, frac) = match s.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (s, ""),
    };
    let digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if whole.is_empty() || frac.len() > 2 || !digits(whole) || !digits(frac) {
        return Err(invalid());
    }
    let whole: i64 = whole.parse().map_err(|_| invalid())?;
    let cents: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => frac.parse().map_err(|_| invalid())?,
    };
    whole
        .checked_mul(100)
        .and_then(|minor| minor.checked_add(cents))
        .map(Money::from_minor)
        .ok_or_else(invalid)
}

/// Parse a comma-separated list of millisecond delays.
pub fn parse_delays(s: &str) -> Result<Vec<Duration>, String> {
    let delays = s
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| format!("invalid delay '{}'", part))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if delays.is_empty() {
        return Err("at least one delay is required".to_string());
    }
    Ok(delays)
}

fn parse_isolation(s: &str) -> Result<IsolationLevel, String> {
    match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "repeatable_read" => Ok(IsolationLevel::RepeatableRead),
        "serializable" => Ok(IsolationLevel::Serializable),
        "read_committed" => Ok(IsolationLevel::ReadCommitted),
        other => Err(format!("unknown isolation level '{}'", other)),
    }
}
