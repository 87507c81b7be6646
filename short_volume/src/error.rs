//! Error type for the import chain.

use reqwest::StatusCode;
use thiserror::Error;

/// Why a daily import did not complete. Nothing is written to the database
/// unless every step succeeds.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The requested date could not be understood.
    #[error("invalid date {input:?}: expected YYYY-MM-DD or YYYYMMDD")]
    Date {
        /// What was passed in.
        input: String,
    },

    /// The request never produced a response.
    #[error("request to {url} failed: {source}")]
    Network {
        /// Feed file URL.
        url: String,
        /// Underlying client error.
        source: reqwest::Error,
    },

    /// The server answered with a non-success status (usually a day without
    /// a published file).
    #[error("{url} returned HTTP {status}")]
    Status {
        /// Feed file URL.
        url: String,
        /// Status returned.
        status: StatusCode,
    },

    /// The file body is not the expected pipe-delimited table.
    #[error("feed line {line}: {reason}")]
    Parse {
        /// 1-based line in the file, 0 when unknown.
        line: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// The database rejected the rows; the transaction was rolled back.
    #[error("failed to write daily rows: {0}")]
    Insert(#[from] diesel::result::Error),
}
