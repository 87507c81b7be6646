//! Daily sequences as stored on disk and the transient aggregated series used
//! for charting.

use chrono::NaiveDate;

use crate::models::{snapshot::DerivedSnapshot, ticker::Ticker};

/// All rows recorded for one ticker on one calendar day, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySequence {
    pub ticker: Ticker,
    pub day: NaiveDate,
    pub rows: Vec<DerivedSnapshot>,
}

impl DailySequence {
    pub fn empty(ticker: Ticker, day: NaiveDate) -> Self {
        Self {
            ticker,
            day,
            rows: Vec::new(),
        }
    }

    pub fn last(&self) -> Option<&DerivedSnapshot> {
        self.rows.last()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Concatenation of the daily sequences found in `[start, end]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedSeries {
    pub ticker: Ticker,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub rows: Vec<DerivedSnapshot>,
    /// Days whose file existed but could not be read.
    pub skipped_days: Vec<NaiveDate>,
}

impl AggregatedSeries {
    pub fn empty(ticker: Ticker, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            ticker,
            start,
            end,
            rows: Vec::new(),
            skipped_days: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}
