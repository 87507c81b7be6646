//! Download and parse of the daily consolidated short-sale volume file.
//!
//! The file is a pipe-delimited table with a header row
//! (`Date|Symbol|ShortVolume|ShortExemptVolume|TotalVolume|Market`) and a
//! trailing footer line that is not data.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, ClientBuilder};
use tracing::{debug, info};

use crate::{error::ImportError, models::ShortVolumeRow};

/// Where the daily files are published.
pub const FEED_URL_BASE: &str = "http://cdn.finra.org/equity/regsho/daily";

/// Browser-like agent; the CDN rejects some default client agents.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client settings for the feed: browser-like agent and a request timeout.
pub fn client_builder() -> ClientBuilder {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
}

/// HTTP client configured for the feed.
pub fn client() -> reqwest::Result<Client> {
    client_builder().build()
}

/// `<url_base>/CNMSshvol<YYYYMMDD>.txt`
pub fn feed_url(url_base: &str, date: NaiveDate) -> String {
    format!(
        "{}/CNMSshvol{}.txt",
        url_base.trim_end_matches('/'),
        date.format("%Y%m%d")
    )
}

/// Accepts `YYYY-MM-DD` or `YYYYMMDD`.
pub fn parse_date(input: &str) -> Result<NaiveDate, ImportError> {
    let trimmed = input.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y%m%d"))
        .map_err(|_| ImportError::Date {
            input: input.to_string(),
        })
}

/// Downloads the file for `date` and returns its body.
pub async fn fetch_day(
    client: &Client,
    url_base: &str,
    date: NaiveDate,
) -> Result<String, ImportError> {
    let url = feed_url(url_base, date);
    debug!(%url, "requesting short volume file");

    let network = |source| ImportError::Network {
        url: url.clone(),
        source,
    };
    let response = client.get(&url).send().await.map_err(network)?;
    let status = response.status();
    if !status.is_success() {
        return Err(ImportError::Status { url, status });
    }
    let body = response.text().await.map_err(network)?;

    info!(%url, bytes = body.len(), "downloaded short volume file");
    Ok(body)
}

struct Columns {
    date: usize,
    symbol: usize,
    short_volume: usize,
    total_volume: usize,
}

impl Columns {
    fn locate(headers: &csv::StringRecord) -> Result<Self, ImportError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| ImportError::Parse {
                    line: 1,
                    reason: format!("missing column {name}"),
                })
        };
        Ok(Self {
            date: find("Date")?,
            symbol: find("Symbol")?,
            short_volume: find("ShortVolume")?,
            total_volume: find("TotalVolume")?,
        })
    }
}

fn csv_error(err: csv::Error) -> ImportError {
    ImportError::Parse {
        line: err.position().map_or(0, |p| p.line()),
        reason: err.to_string(),
    }
}

/// Parses a downloaded file into rows. The last record is the footer and is
/// always dropped.
pub fn parse_feed(text: &str) -> Result<Vec<ShortVolumeRow>, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'|')
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns = Columns::locate(reader.headers().map_err(csv_error)?)?;
    let records = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(csv_error)?;
    let Some((_footer, body)) = records.split_last() else {
        return Ok(Vec::new());
    };

    body.iter().map(|record| parse_record(record, &columns)).collect()
}

fn parse_record(
    record: &csv::StringRecord,
    columns: &Columns,
) -> Result<ShortVolumeRow, ImportError> {
    let line = record.position().map_or(0, |p| p.line());
    let field = |index: usize, name: &str| {
        record
            .get(index)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ImportError::Parse {
                line,
                reason: format!("empty {name}"),
            })
    };
    let volume = |index: usize, name: &str| {
        let raw = field(index, name)?;
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ImportError::Parse {
                line,
                reason: format!("{name} {raw:?} is not a number"),
            })
    };

    let raw_date = field(columns.date, "Date")?;
    let day = NaiveDate::parse_from_str(raw_date, "%Y%m%d").map_err(|_| ImportError::Parse {
        line,
        reason: format!("Date {raw_date:?} is not YYYYMMDD"),
    })?;

    Ok(ShortVolumeRow::from_volumes(
        day.format("%Y-%m-%d").to_string(),
        field(columns.symbol, "Symbol")?.to_string(),
        volume(columns.short_volume, "ShortVolume")?,
        volume(columns.total_volume, "TotalVolume")?,
    ))
}
