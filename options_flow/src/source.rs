//! Snapshot sources: where option-flow readings come from.
//!
//! This module defines the [`SnapshotSource`] trait, the boundary between the
//! polling core and whatever produces a [`Reading`] for a ticker. The poll
//! scheduler only ever talks to `dyn SnapshotSource`, so tests can swap in a
//! scripted source and the production binary uses
//! [`AnalyticsPageSource`](analytics_page::AnalyticsPageSource), which reloads
//! the brokerage's underlying-statistics page and reads the numbers off it.
//!
//! Failures are split the way callers need to react to them: network and
//! HTTP-status failures mean "try again next tick", while missing or
//! unparseable fields mean the page layout or the session changed.

pub mod analytics_page;
pub mod text;

use async_trait::async_trait;
use snafu::{Backtrace, Snafu};

use crate::models::{snapshot::Reading, ticker::Ticker};

/// Produces one [`Reading`] per call for the given ticker.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self, ticker: &Ticker) -> Result<Reading, SourceError>;
}

/// Errors that can occur during the creation of a source instance.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceInitError {
    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// Session cookie contains characters not allowed in a header.
    #[snafu(display("Invalid session cookie: {source}"))]
    InvalidCookie {
        source: reqwest::header::InvalidHeaderValue,
        backtrace: Backtrace,
    },

    /// User agent contains characters not allowed in a header.
    #[snafu(display("Invalid user agent: {source}"))]
    InvalidUserAgent {
        source: reqwest::header::InvalidHeaderValue,
        backtrace: Backtrace,
    },
}

/// Errors returned by [`SnapshotSource::fetch`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    /// The request never produced a response (DNS, connect, timeout, body read).
    #[snafu(display("Request to {url} failed: {source}"))]
    Network {
        url: String,
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The server answered, but not with a success status.
    #[snafu(display("{url} answered with HTTP {status}"))]
    Status {
        url: String,
        status: reqwest::StatusCode,
        backtrace: Backtrace,
    },

    /// An expected element was absent from the page.
    #[snafu(display("Field `{field}` not found on page"))]
    MissingField {
        field: &'static str,
        backtrace: Backtrace,
    },

    /// An element was present but its text is not a number.
    #[snafu(display("Could not parse `{field}` from {text:?}"))]
    Parse {
        field: &'static str,
        text: String,
        backtrace: Backtrace,
    },
}

impl SourceError {
    /// `true` for failures caused by unexpected page content.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::MissingField { .. } | Self::Parse { .. })
    }

    /// `true` for failures reaching the page at all.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Status { .. })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    struct FixedSource(HashMap<String, Reading>);

    #[async_trait]
    impl SnapshotSource for FixedSource {
        async fn fetch(&self, ticker: &Ticker) -> Result<Reading, SourceError> {
            self.0
                .get(ticker.as_str())
                .copied()
                .ok_or_else(|| MissingFieldSnafu { field: "price" }.build())
        }
    }

    #[tokio::test]
    async fn sources_are_usable_as_trait_objects() {
        let reading = Reading {
            price: 1.0,
            net_delta_calls: 2,
            net_delta_puts: 3,
            net_premium_calls: 4,
            net_premium_puts: 5,
        };
        let source: Box<dyn SnapshotSource> =
            Box::new(FixedSource(HashMap::from([("SPY".to_string(), reading)])));

        let spy = Ticker::new("spy").unwrap();
        assert_eq!(source.fetch(&spy).await.unwrap(), reading);

        let err = source.fetch(&Ticker::new("QQQ").unwrap()).await.unwrap_err();
        assert!(err.is_parse());
        assert!(!err.is_network());
    }
}
