//! Finam Trade API (REST/JSON).
//!
//! Market data and account endpoints share one [`AuthenticatedClient`]:
//! the session token is a JWT obtained from `POST sessions`, and an
//! expired JWT shows up as HTTP 500 with gRPC status code 13.

use super::client::{AuthConfig, AuthenticatedClient};
use super::error::ApiError;
use super::transport::{ApiRequest, HttpTransport, Transport};
use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

pub const FINAM_API_BASE_URL: &str = "https://api.finam.ru/v1";
pub const FINAM_TOKEN_ERROR_CODE: i64 = 13;
pub const TIME_FRAME_DAILY: &str = "TIME_FRAME_D";

/// Interval bounds are sent as Moscow-time midnights.
const MOSCOW_OFFSET: &str = "+03:00";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FinamAsset {
    pub mic: String,
    pub ticker: String,
    pub name: String,
    /// `TICKER@MIC`, the id used by instrument endpoints.
    pub symbol: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
struct DecimalValue {
    value: Decimal,
}

#[derive(Debug, Deserialize)]
struct RawBar {
    timestamp: DateTime<Utc>,
    open: DecimalValue,
    high: DecimalValue,
    low: DecimalValue,
    close: DecimalValue,
    volume: DecimalValue,
}

/// One OHLCV bar.
#[derive(Debug, Clone, PartialEq)]
pub struct FinamBar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl From<RawBar> for FinamBar {
    fn from(b: RawBar) -> Self {
        Self {
            timestamp: b.timestamp,
            open: b.open.value,
            high: b.high.value,
            low: b.low.value,
            close: b.close.value,
            volume: b.volume.value,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AssetsResponse {
    assets: Vec<FinamAsset>,
}

#[derive(Debug, Deserialize)]
struct BarsResponse {
    #[serde(default)]
    bars: Vec<RawBar>,
}

#[derive(Debug, Deserialize)]
struct SessionDetails {
    #[serde(default)]
    account_ids: Vec<String>,
}

/// Session endpoint and token-expired code of the Finam Trade API.
pub fn finam_auth() -> AuthConfig {
    AuthConfig {
        session_path: "sessions".to_string(),
        token_error_code: Some(FINAM_TOKEN_ERROR_CODE),
    }
}

fn moscow_midnight(date: NaiveDate) -> String {
    format!("{}T00:00:00{MOSCOW_OFFSET}", date.format("%Y-%m-%d"))
}

/// Typed Finam Trade API calls over an [`AuthenticatedClient`].
pub struct FinamApi<T: Transport> {
    client: AuthenticatedClient<T>,
}

impl FinamApi<HttpTransport> {
    /// Client against the given base URL (normally [`FINAM_API_BASE_URL`]).
    pub fn connect(base_url: &str, secret: impl Into<String>) -> Result<Self, ApiError> {
        Ok(Self::new(HttpTransport::new(base_url)?, secret))
    }
}

impl<T: Transport> FinamApi<T> {
    pub fn new(transport: T, secret: impl Into<String>) -> Self {
        Self {
            client: AuthenticatedClient::new(transport, secret, finam_auth()),
        }
    }

    pub fn client(&self) -> &AuthenticatedClient<T> {
        &self.client
    }

    /// Every asset tradable through the API.
    pub fn assets(&mut self) -> Result<Vec<FinamAsset>, ApiError> {
        let resp: AssetsResponse = self.client.call_json(&ApiRequest::get("assets"))?;
        Ok(resp.assets)
    }

    /// Bars for `symbol` covering `start..=end` (calendar days, Moscow time).
    pub fn bars(
        &mut self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        time_frame: &str,
    ) -> Result<Vec<FinamBar>, ApiError> {
        let end_exclusive = end
            .checked_add_days(Days::new(1))
            .ok_or_else(|| ApiError::Decode(format!("end date out of range: {end}")))?;
        let request = ApiRequest::get(format!("instruments/{symbol}/bars"))
            .query("interval.start_time", moscow_midnight(start))
            .query("interval.end_time", moscow_midnight(end_exclusive))
            .query("timeframe", time_frame);

        let resp: BarsResponse = self.client.call_json(&request)?;
        Ok(resp.bars.into_iter().map(FinamBar::from).collect())
    }

    /// Accounts visible to the current session.
    pub fn account_ids(&mut self) -> Result<Vec<String>, ApiError> {
        let value = self
            .client
            .call_with(|token| ApiRequest::post("sessions/details", json!({ "token": token })))?;
        let details: SessionDetails =
            serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(details.account_ids)
    }
}
