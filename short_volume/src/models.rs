//! Row type shared by the feed parser and the `daily` table.

use diesel::prelude::*;

use crate::schema::daily;

/// One ticker's off-exchange volume split for one day.
///
/// `volume_rate` is `buy_volume / sell_volume`, or exactly `-1.0` when the
/// sell side is zero.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = daily)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ShortVolumeRow {
    /// `YYYY-MM-DD`.
    pub day: String,
    /// Symbol as published in the feed.
    pub ticker: String,
    /// Reported short volume.
    #[diesel(column_name = dp_buy_volume)]
    pub buy_volume: f64,
    /// Total volume minus short volume.
    #[diesel(column_name = dp_sell_volume)]
    pub sell_volume: f64,
    /// Buy/sell ratio, `-1.0` when undefined.
    #[diesel(column_name = dp_volume_rate)]
    pub volume_rate: f64,
}

/// Rate stored when the sell side is zero.
pub const UNDEFINED_RATE: f64 = -1.0;

/// `buy / sell`, or [`UNDEFINED_RATE`] when `sell` is zero.
pub fn volume_rate(buy: f64, sell: f64) -> f64 {
    if sell == 0.0 {
        UNDEFINED_RATE
    } else {
        buy / sell
    }
}

impl ShortVolumeRow {
    /// Builds a row from the feed's short and total volumes.
    pub fn from_volumes(day: String, ticker: String, short_volume: f64, total_volume: f64) -> Self {
        let sell_volume = total_volume - short_volume;
        Self {
            day,
            ticker,
            buy_volume: short_volume,
            sell_volume,
            volume_rate: volume_rate(short_volume, sell_volume),
        }
    }
}
