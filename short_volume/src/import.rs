use chrono::NaiveDate;
use diesel::SqliteConnection;
use reqwest::Client;
use tracing::info;

use crate::{
    error::ImportError,
    feed::{fetch_day, parse_feed},
    repo::insert_rows,
};

/// Downloads, parses and stores one day's file. The download and parse finish
/// before the database is touched, so a failure at any step writes nothing.
/// Returns the number of rows written.
pub async fn import_day(
    client: &Client,
    conn: &mut SqliteConnection,
    url_base: &str,
    date: NaiveDate,
) -> Result<usize, ImportError> {
    let body = fetch_day(client, url_base, date).await?;
    let rows = parse_feed(&body)?;
    let written = insert_rows(conn, &rows)?;
    info!(%date, parsed = rows.len(), written, "short volume import complete");
    Ok(written)
}
