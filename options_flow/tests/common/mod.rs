#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use options_flow::{
    models::{
        snapshot::{DerivedSnapshot, Reading, Snapshot, derive},
        ticker::Ticker,
    },
    store::DailyStore,
};
use tempfile::TempDir;

pub struct TestStore {
    _dir: TempDir, // keep alive for the life of the test
    pub store: DailyStore,
}

pub fn setup_store() -> TestStore {
    let dir = TempDir::new().expect("tempdir");
    let store = DailyStore::new(dir.path().join("optionsdata"));
    TestStore { _dir: dir, store }
}

pub fn ticker(raw: &str) -> Ticker {
    Ticker::new(raw).expect("valid ticker")
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn at(day: NaiveDate, h: u32, min: u32, s: u32) -> NaiveDateTime {
    day.and_hms_opt(h, min, s).expect("valid time")
}

/// A derived row whose values are all offsets of `seed`.
pub fn row(time: NaiveDateTime, seed: i64) -> DerivedSnapshot {
    derive(Snapshot::stamp(
        time,
        Reading {
            price: 5000.0 + seed as f64 * 0.25,
            net_delta_calls: 1_000 + seed,
            net_delta_puts: -800 - seed,
            net_premium_calls: 2_500_000 + seed * 10,
            net_premium_puts: 1_750_000 - seed * 10,
        },
    ))
}
