//! Google Sheets v4 REST client (read-only, API-key auth).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::errors::{FetchError, SheetsError};
use crate::models::Row;
use crate::reconciler::SheetSource;

/// Body of `GET /spreadsheets/{id}/values/{range}`.
///
/// `values` is absent when the range is empty.
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    range: Option<String>,
    #[serde(default)]
    values: Vec<Row>,
}

/// Asynchronous Google Sheets client.
#[derive(Clone)]
pub struct SheetsClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl SheetsClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SheetsError> {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("rolesync/0.1"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        info!(api_url = %api_url, "created SheetsClient");
        Ok(Self {
            http,
            api_url,
            api_key: api_key.into(),
        })
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> Result<Url, SheetsError> {
        let mut url = Url::parse(&self.api_url).map_err(|e| SheetsError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| SheetsError::InvalidUrl(format!("{} cannot be a base", self.api_url)))?
            .pop_if_empty()
            .extend(["spreadsheets", spreadsheet_id, "values", range]);
        Ok(url)
    }

    /// Fetch the cells of `range`, row-major.
    #[instrument(skip(self))]
    pub async fn get_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Row>, SheetsError> {
        let url = self.values_url(spreadsheet_id, range)?;
        let resp = self
            .http
            .get(url)
            .query(&[("key", self.api_key.as_str()), ("majorDimension", "ROWS")])
            .send()
            .await?;
        let resp = check_response(resp).await?;
        let body: ValueRange = resp.json().await?;
        debug!(
            range = body.range.as_deref().unwrap_or(range),
            rows = body.values.len(),
            "fetched sheet values"
        );
        Ok(body.values)
    }
}

#[async_trait]
impl SheetSource for SheetsClient {
    async fn fetch_rows(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Row>, FetchError> {
        Ok(self.get_values(spreadsheet_id, range).await?)
    }
}

async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, SheetsError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(SheetsError::AuthenticationFailed(format!("HTTP {}: {}", status, body)));
    }
    Err(SheetsError::ApiError {
        status: status.as_u16(),
        body,
    })
}
