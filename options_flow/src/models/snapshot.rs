//! Option-flow readings and the momentum fields derived from them.
//!
//! A [`Reading`] is what a [`SnapshotSource`](crate::source::SnapshotSource)
//! returns. The scheduler stamps it with the poll time to get a [`Snapshot`],
//! and [`derive`] adds the two momentum columns that are persisted alongside
//! the raw values.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Raw values scraped for one ticker on one poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub price: f64,
    pub net_delta_calls: i64,
    pub net_delta_puts: i64,
    pub net_premium_calls: i64,
    pub net_premium_puts: i64,
}

/// A timestamped [`Reading`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    /// Local wall-clock time of the poll, whole seconds.
    pub time: NaiveDateTime,
    pub price: f64,
    pub net_delta_calls: i64,
    pub net_delta_puts: i64,
    pub net_premium_calls: i64,
    pub net_premium_puts: i64,
}

impl Snapshot {
    pub fn stamp(time: NaiveDateTime, reading: Reading) -> Self {
        Self {
            time,
            price: reading.price,
            net_delta_calls: reading.net_delta_calls,
            net_delta_puts: reading.net_delta_puts,
            net_premium_calls: reading.net_premium_calls,
            net_premium_puts: reading.net_premium_puts,
        }
    }
}

/// One persisted row of a daily sequence.
///
/// Field order is the CSV column order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedSnapshot {
    #[serde(with = "row_time")]
    pub time: NaiveDateTime,
    pub price: f64,
    pub net_delta_calls: i64,
    pub net_delta_puts: i64,
    pub net_premium_calls: i64,
    pub net_premium_puts: i64,
    pub delta_momentum: i64,
    pub premium_momentum: i64,
}

impl DerivedSnapshot {
    /// Calendar day the row belongs to.
    pub fn day(&self) -> NaiveDate {
        self.time.date()
    }
}

/// Adds `delta_momentum = calls + puts` and `premium_momentum = calls - puts`.
///
/// Put deltas are reported negative by the source, so their sum is the net
/// directional exposure. Both fields are plain sums, not time derivatives.
pub fn derive(raw: Snapshot) -> DerivedSnapshot {
    DerivedSnapshot {
        time: raw.time,
        price: raw.price,
        net_delta_calls: raw.net_delta_calls,
        net_delta_puts: raw.net_delta_puts,
        net_premium_calls: raw.net_premium_calls,
        net_premium_puts: raw.net_premium_puts,
        delta_momentum: raw.net_delta_calls + raw.net_delta_puts,
        premium_momentum: raw.net_premium_calls - raw.net_premium_puts,
    }
}

/// `time` column format shared by every daily file.
pub mod row_time {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(time: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&time.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(raw.trim(), FORMAT).map_err(de::Error::custom)
    }
}
