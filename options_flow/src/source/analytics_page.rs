//! Scraping source for the brokerage's underlying-statistics page.
//!
//! Each [`fetch`](SnapshotSource::fetch) is a fresh GET of the page (the
//! equivalent of reloading a browser tab) followed by extraction of five
//! values:
//!
//! | field | element |
//! |---|---|
//! | price | first `.main-number` |
//! | net delta calls / puts | 1st / 2nd `td` of the row holding `th#deltas` |
//! | net premium calls / puts | 1st / 2nd `td` of the row holding `th#premium` |
//!
//! Logging in is out of scope. If the page needs an authenticated session,
//! export its cookie header in `OPTIONS_FLOW_SESSION_COOKIE`.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::{Client, header};
use scraper::{ElementRef, Html, Selector};
use secrecy::{ExposeSecret, SecretString};
use shared_utils::env::optional_env_var;
use snafu::{OptionExt, ResultExt};

use crate::{
    config::{PageSettings, TICKER_PLACEHOLDER},
    models::{snapshot::Reading, ticker::Ticker},
    source::{
        ClientBuildSnafu, InvalidCookieSnafu, InvalidUserAgentSnafu, MissingFieldSnafu,
        NetworkSnafu, ParseSnafu, SnapshotSource, SourceError, SourceInitError, StatusSnafu,
        text::{parse_price, parse_whole},
    },
};

/// Environment variable holding an optional `Cookie` header value.
pub const SESSION_COOKIE_ENV: &str = "OPTIONS_FLOW_SESSION_COOKIE";

static PRICE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".main-number").expect("static selector"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("static selector"));
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("static selector"));
static DELTAS_HEADER: Lazy<Selector> =
    Lazy::new(|| Selector::parse("th#deltas").expect("static selector"));
static PREMIUM_HEADER: Lazy<Selector> =
    Lazy::new(|| Selector::parse("th#premium").expect("static selector"));

pub struct AnalyticsPageSource {
    client: Client,
    url_template: String,
}

impl AnalyticsPageSource {
    /// Creates a source from config, reading the optional session cookie from
    /// [`SESSION_COOKIE_ENV`].
    pub fn new(settings: &PageSettings) -> Result<Self, SourceInitError> {
        let session = optional_env_var(SESSION_COOKIE_ENV).map(|c| SecretString::new(c.into()));
        Self::with_session(settings, session)
    }

    pub fn with_session(
        settings: &PageSettings,
        session: Option<SecretString>,
    ) -> Result<Self, SourceInitError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_str(&settings.user_agent).context(InvalidUserAgentSnafu)?,
        );
        if let Some(cookie) = session {
            let mut value =
                header::HeaderValue::from_str(cookie.expose_secret()).context(InvalidCookieSnafu)?;
            value.set_sensitive(true);
            headers.insert(header::COOKIE, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            client,
            url_template: settings.url_template.clone(),
        })
    }

    pub fn url_for(&self, ticker: &Ticker) -> String {
        self.url_template
            .replace(TICKER_PLACEHOLDER, ticker.as_str())
    }
}

#[async_trait]
impl SnapshotSource for AnalyticsPageSource {
    async fn fetch(&self, ticker: &Ticker) -> Result<Reading, SourceError> {
        let url = self.url_for(ticker);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context(NetworkSnafu { url: url.as_str() })?;

        let status = response.status();
        if !status.is_success() {
            return StatusSnafu { url, status }.fail();
        }

        let body = response
            .text()
            .await
            .context(NetworkSnafu { url: url.as_str() })?;
        extract_reading(&body)
    }
}

/// Pulls the five values out of the page HTML.
pub fn extract_reading(html: &str) -> Result<Reading, SourceError> {
    let doc = Html::parse_document(html);

    let price_text = doc
        .select(&PRICE)
        .next()
        .map(text_of)
        .context(MissingFieldSnafu { field: "price" })?;
    let (delta_calls, delta_puts) =
        row_pair(&doc, &DELTAS_HEADER, ("net_delta_calls", "net_delta_puts"))?;
    let (premium_calls, premium_puts) = row_pair(
        &doc,
        &PREMIUM_HEADER,
        ("net_premium_calls", "net_premium_puts"),
    )?;

    let reading = Reading {
        price: parse_price("price", &price_text)?,
        net_delta_calls: parse_whole("net_delta_calls", &delta_calls)?,
        net_delta_puts: parse_whole("net_delta_puts", &delta_puts)?,
        net_premium_calls: parse_whole("net_premium_calls", &premium_calls)?,
        net_premium_puts: parse_whole("net_premium_puts", &premium_puts)?,
    };

    // Momentum is calls + puts for delta and calls - puts for premium; both
    // must fit in an i64 before the reading is stored.
    reading
        .net_delta_calls
        .checked_add(reading.net_delta_puts)
        .context(ParseSnafu {
            field: "net_delta_puts",
            text: delta_puts.as_str(),
        })?;
    reading
        .net_premium_calls
        .checked_sub(reading.net_premium_puts)
        .context(ParseSnafu {
            field: "net_premium_puts",
            text: premium_puts.as_str(),
        })?;

    Ok(reading)
}

/// Texts of the first two `td` cells of the row whose header matches.
fn row_pair(
    doc: &Html,
    header: &Selector,
    fields: (&'static str, &'static str),
) -> Result<(String, String), SourceError> {
    let row = doc
        .select(&ROW)
        .find(|row| row.select(header).next().is_some())
        .context(MissingFieldSnafu { field: fields.0 })?;

    let mut cells = row.select(&CELL).map(text_of);
    let calls = cells.next().context(MissingFieldSnafu { field: fields.0 })?;
    let puts = cells.next().context(MissingFieldSnafu { field: fields.1 })?;
    Ok((calls, puts))
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="quote"><span class="main-number">$ 5,123.45</span></div>
          <table>
            <tr><th id="header">Statistic</th><td>Calls</td><td>Puts</td></tr>
            <tr><th id="deltas">Net Delta</th><td> 1,200,000 </td><td>-950,000</td></tr>
            <tr><th id="premium">Net Premium</th><td>$48,000,000</td><td>$51,500,000</td></tr>
          </table>
        </body></html>
    "#;

    #[test]
    fn extracts_all_fields() {
        let reading = extract_reading(PAGE).unwrap();
        assert_eq!(
            reading,
            Reading {
                price: 5123.45,
                net_delta_calls: 1_200_000,
                net_delta_puts: -950_000,
                net_premium_calls: 48_000_000,
                net_premium_puts: 51_500_000,
            }
        );
    }

    #[test]
    fn missing_row_is_reported_as_missing_field() {
        let page = PAGE.replace("id=\"premium\"", "id=\"other\"");
        let err = extract_reading(&page).unwrap_err();
        assert!(err.is_parse());
        assert!(matches!(
            err,
            SourceError::MissingField {
                field: "net_premium_calls",
                ..
            }
        ));
    }

    #[test]
    fn garbled_number_is_a_parse_error() {
        let page = PAGE.replace("-950,000", "--");
        let err = extract_reading(&page).unwrap_err();
        assert!(matches!(
            err,
            SourceError::Parse {
                field: "net_delta_puts",
                ..
            }
        ));
    }

    #[test]
    fn momentum_out_of_range_is_a_parse_error() {
        let page = PAGE
            .replace("1,200,000", "9,223,372,036,854,775,807")
            .replace("-950,000", "1");
        let err = extract_reading(&page).unwrap_err();
        assert!(err.is_parse());
        assert!(matches!(
            err,
            SourceError::Parse {
                field: "net_delta_puts",
                ..
            }
        ));

        let page = PAGE.replace("$51,500,000", "(9,223,372,036,854,775,807)");
        let err = extract_reading(&page).unwrap_err();
        assert!(matches!(
            err,
            SourceError::Parse {
                field: "net_premium_puts",
                ..
            }
        ));
    }

    #[test]
    fn login_page_without_quote_is_missing_price() {
        let err = extract_reading("<html><body><form id=login></form></body></html>").unwrap_err();
        assert!(matches!(err, SourceError::MissingField { field: "price", .. }));
    }

    #[test]
    fn url_template_substitutes_ticker() {
        let settings = PageSettings {
            url_template: "http://localhost/stats?symbol={ticker}&x=1".into(),
            ..PageSettings::default()
        };
        let source = AnalyticsPageSource::with_session(&settings, None).unwrap();
        assert_eq!(
            source.url_for(&Ticker::new("spx").unwrap()),
            "http://localhost/stats?symbol=SPX&x=1"
        );
    }

    #[test]
    fn cookie_with_newline_is_rejected() {
        let session = Some(SecretString::new("a=b\nc".into()));
        let err = AnalyticsPageSource::with_session(&PageSettings::default(), session);
        assert!(matches!(err, Err(SourceInitError::InvalidCookie { .. })));
    }
}
