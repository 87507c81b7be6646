//! Range aggregation over the daily store.

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::{
    models::{series::AggregatedSeries, ticker::Ticker},
    store::DailyStore,
};

/// Concatenates every stored day in `[start, end]` for `ticker`.
///
/// Days without a file contribute nothing. A day whose file cannot be read is
/// logged, listed in [`AggregatedSeries::skipped_days`] and left out, so one
/// damaged file never blanks the whole chart. An inverted range yields an
/// empty series.
pub fn aggregate(
    store: &DailyStore,
    ticker: &Ticker,
    start: NaiveDate,
    end: NaiveDate,
) -> AggregatedSeries {
    let mut series = AggregatedSeries::empty(ticker.clone(), start, end);

    for day in start.iter_days().take_while(|day| *day <= end) {
        match store.load(ticker, day) {
            Ok(Some(sequence)) => series.rows.extend(sequence.rows),
            Ok(None) => {}
            Err(error) => {
                warn!(%ticker, %day, %error, "skipping unreadable daily file");
                series.skipped_days.push(day);
            }
        }
    }

    debug!(
        %ticker,
        %start,
        %end,
        rows = series.len(),
        "aggregated daily sequences"
    );
    series
}
