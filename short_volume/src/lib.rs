//! Import of the daily consolidated short-sale volume file into SQLite.
//!
//! [`feed`] downloads and parses one day's file, [`repo`] writes the rows to
//! the `daily` table in a single transaction, and [`import_day`] runs the
//! whole chain.

#![deny(missing_docs)]

pub mod db;
pub mod error;
pub mod feed;
mod import;
pub mod models;
pub mod repo;
#[allow(missing_docs)]
pub mod schema;

pub use error::ImportError;
pub use import::import_day;
