use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::{
    chart::{ChartRequest, RefreshTrigger},
    models::ticker::Ticker,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Records option-flow readings and charts them")]
pub struct Cli {
    /// Path to the config file (defaults to options_flow.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll every tracked ticker on a fixed cadence and keep the chart
    /// refreshed until interrupted
    Run {
        /// Ticker to chart (defaults to the first tracked ticker)
        #[arg(long)]
        ticker: Option<Ticker>,

        /// Poll only, without drawing charts
        #[arg(long)]
        no_chart: bool,
    },

    /// Run a single polling pass and exit
    Poll,

    /// Draw the chart once for a ticker and date range
    Chart {
        #[arg(long)]
        ticker: Ticker,

        /// First day, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day, YYYY-MM-DD (defaults to the start day)
        #[arg(long)]
        end: Option<NaiveDate>,
    },
}

/// Interprets one line typed while `run` is charting.
///
/// * empty line: redraw;
/// * `TICKER`: switch ticker, keep the range;
/// * `TICKER START [END]`: switch ticker and range.
///
/// Returns `None` for lines that cannot be understood.
pub fn parse_selection(line: &str, current: &ChartRequest) -> Option<RefreshTrigger> {
    let mut words = line.split_whitespace();
    let Some(ticker) = words.next() else {
        return Some(RefreshTrigger::Manual);
    };
    let ticker = Ticker::new(ticker).ok()?;
    let (start, end) = match (words.next(), words.next()) {
        (None, _) => (current.start, current.end),
        (Some(start), None) => {
            let start = start.parse().ok()?;
            (start, start)
        }
        (Some(start), Some(end)) => (start.parse().ok()?, end.parse().ok()?),
    };
    if words.next().is_some() {
        return None;
    }
    Some(RefreshTrigger::Select(ChartRequest { ticker, start, end }))
}
