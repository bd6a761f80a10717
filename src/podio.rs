use std::collections::HashSet;

use anyhow::{bail, Context};
use chrono::{Datelike, NaiveDate};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::PodioConfig;
use crate::extract::RawItem;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct FilterResponse {
    #[serde(default)]
    items: Vec<RawItem>,
}

pub struct PodioClient {
    http: Client,
    config: PodioConfig,
}

impl PodioClient {
    pub fn new(config: PodioConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, config })
    }

    /// Exchange app credentials for a bearer token. Any failure here is
    /// fatal for the run.
    pub async fn authenticate(&self) -> anyhow::Result<String> {
        info!("authenticating with Podio");
        let params = [
            ("grant_type", "app"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("app_id", self.config.app_id.as_str()),
            ("app_token", self.config.app_token.as_str()),
        ];
        let request = self.http.post(&self.config.auth_url).form(&params);
        let response = self
            .send_with_retry(request)
            .await
            .context("authentication request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("authentication failed with status {status}: {body}");
        }
        let token: TokenResponse = response
            .json()
            .await
            .context("malformed token response")?;
        Ok(token.access_token)
    }

    /// Fetch every visible item: the current month first so fresh data
    /// lands even if an older window later degrades, then each year
    /// descending to the configured earliest year. Deduplicated by item
    /// id, first seen wins.
    pub async fn fetch_all_items(
        &self,
        token: &str,
        today: NaiveDate,
    ) -> anyhow::Result<Vec<RawItem>> {
        let mut all: Vec<RawItem> = Vec::new();

        let month_start = today.with_day(1).unwrap_or(today);
        match self.fetch_window(token, month_start, today, &mut all).await {
            Ok(count) => info!(window = "current month", items = count, "window complete"),
            Err(err) => warn!(window = "current month", error = %err, "window degraded"),
        }

        for year in (self.config.earliest_year..=today.year()).rev() {
            let start = NaiveDate::from_ymd_opt(year, 1, 1).context("invalid window start")?;
            let end = NaiveDate::from_ymd_opt(year, 12, 31).context("invalid window end")?;
            match self.fetch_window(token, start, end, &mut all).await {
                Ok(count) => info!(window = year, items = count, "window complete"),
                Err(err) => warn!(window = year, error = %err, "window degraded"),
            }
        }

        let mut seen: HashSet<i64> = HashSet::new();
        let before = all.len();
        let mut unique = Vec::with_capacity(before);
        for item in all {
            if seen.insert(item.item_id) {
                unique.push(item);
            }
        }
        if unique.len() < before {
            debug!(removed = before - unique.len(), "removed duplicate items");
        }
        info!(items = unique.len(), "fetch complete");
        Ok(unique)
    }

    /// Paginate one date window. Stops on an empty or short page. A
    /// non-success response stops this window only; the caller keeps
    /// whatever other windows produced.
    async fn fetch_window(
        &self,
        token: &str,
        from: NaiveDate,
        to: NaiveDate,
        out: &mut Vec<RawItem>,
    ) -> anyhow::Result<usize> {
        let url = format!(
            "{}/item/app/{}/filter/",
            self.config.api_base.trim_end_matches('/'),
            self.config.app_id
        );

        let mut offset = 0usize;
        let mut fetched = 0usize;
        loop {
            let body = serde_json::json!({
                "limit": self.config.page_size,
                "offset": offset,
                "sort_by": "appointment-date",
                "sort_desc": false,
                "filters": {
                    "appointment-date": { "from": from.to_string(), "to": to.to_string() }
                }
            });
            let request = self
                .http
                .post(&url)
                .header("Authorization", format!("OAuth2 {token}"))
                .json(&body);
            let response = self.send_with_retry(request).await?;

            let status = response.status();
            if !status.is_success() {
                warn!(%status, %from, %to, "non-success response, stopping window");
                break;
            }

            let page: FilterResponse = response
                .json()
                .await
                .context("malformed filter response")?;
            let returned = page.items.len();
            if returned == 0 {
                break;
            }
            fetched += returned;
            out.extend(page.items);
            debug!(%from, %to, fetched, "fetched page");

            if returned < self.config.page_size {
                break;
            }
            offset += self.config.page_size;
        }
        Ok(fetched)
    }

    /// Retry wrapper. Only transport-level failures (connect, timeout) are
    /// retried, with exponential backoff; any HTTP response, success or
    /// not, goes straight back to the caller.
    async fn send_with_retry(&self, request: RequestBuilder) -> anyhow::Result<Response> {
        let mut delay = self.config.initial_backoff;
        let mut attempt = 1usize;
        loop {
            let cloned = request
                .try_clone()
                .context("request body is not cloneable")?;
            match cloned.send().await {
                Ok(response) => return Ok(response),
                Err(err)
                    if (err.is_connect() || err.is_timeout())
                        && attempt < self.config.max_retries =>
                {
                    warn!(
                        attempt,
                        max = self.config.max_retries,
                        error = %err,
                        "transport error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(err).context("request failed after retries");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn test_config(base_url: &str, earliest_year: i32, page_size: usize) -> PodioConfig {
        PodioConfig {
            client_id: "test-client".to_string(),
            client_secret: "test-secret".to_string(),
            app_id: "424242".to_string(),
            app_token: "test-token".to_string(),
            api_base: base_url.to_string(),
            auth_url: format!("{base_url}/oauth/token"),
            page_size,
            earliest_year,
            max_retries: 3,
            initial_backoff: Duration::from_millis(10),
            http_timeout: Duration::from_secs(5),
        }
    }

    fn item_json(item_id: i64) -> serde_json::Value {
        json!({
            "item_id": item_id,
            "fields": [
                { "external_id": "closer-assigned", "type": "contact",
                  "values": [{ "value": { "name": "Jane Doe" } }] }
            ]
        })
    }

    #[tokio::test]
    async fn authenticate_returns_token() {
        let server = MockServer::start_async().await;
        let _mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(200)
                    .json_body(json!({ "access_token": "abc123", "token_type": "bearer" }));
            })
            .await;

        let client = PodioClient::new(test_config(&server.base_url(), 3000, 500)).unwrap();
        let token = client.authenticate().await.unwrap();
        assert_eq!(token, "abc123");
    }

    #[tokio::test]
    async fn authenticate_failure_is_fatal_and_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(401).body("invalid_client");
            })
            .await;

        let client = PodioClient::new(test_config(&server.base_url(), 3000, 500)).unwrap();
        let err = client.authenticate().await.unwrap_err();
        assert!(err.to_string().contains("401"));
        assert_eq!(mock.hits_async().await, 1);
    }

    #[tokio::test]
    async fn pagination_stops_on_short_page() {
        let server = MockServer::start_async().await;
        // Future earliest year keeps only the current-month window.
        let earliest = Local::now().date_naive().year() + 1;

        let first = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/item/app/424242/filter/")
                    .json_body_partial(r#"{ "offset": 0 }"#);
                then.status(200)
                    .json_body(json!({ "items": [item_json(1), item_json(2)] }));
            })
            .await;
        let second = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/item/app/424242/filter/")
                    .json_body_partial(r#"{ "offset": 2 }"#);
                then.status(200).json_body(json!({ "items": [item_json(3)] }));
            })
            .await;

        let client = PodioClient::new(test_config(&server.base_url(), earliest, 2)).unwrap();
        let today = Local::now().date_naive();
        let items = client.fetch_all_items("tok", today).await.unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(first.hits_async().await, 1);
        assert_eq!(second.hits_async().await, 1);
    }

    #[tokio::test]
    async fn overlapping_windows_deduplicate_first_seen() {
        let server = MockServer::start_async().await;
        // Current month plus the current year: both windows return the
        // same item.
        let today = Local::now().date_naive();
        let _mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/item/app/424242/filter/");
                then.status(200).json_body(json!({ "items": [item_json(7)] }));
            })
            .await;

        let client =
            PodioClient::new(test_config(&server.base_url(), today.year(), 500)).unwrap();
        let items = client.fetch_all_items("tok", today).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_id, 7);
    }

    #[tokio::test]
    async fn non_success_stops_window_without_failing_fetch() {
        let server = MockServer::start_async().await;
        let earliest = Local::now().date_naive().year() + 1;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/item/app/424242/filter/");
                then.status(500).body("boom");
            })
            .await;

        let client = PodioClient::new(test_config(&server.base_url(), earliest, 500)).unwrap();
        let today = Local::now().date_naive();
        let items = client.fetch_all_items("tok", today).await.unwrap();

        assert!(items.is_empty());
        // Application errors are not retried.
        assert_eq!(mock.hits_async().await, 1);
    }

    #[tokio::test]
    async fn transport_errors_retry_until_exhausted() {
        // Nothing listens here; every attempt is a connection error.
        let mut config = test_config("http://127.0.0.1:9", 3000, 500);
        config.max_retries = 2;
        let client = PodioClient::new(config).unwrap();
        let err = client.authenticate().await.unwrap_err();
        assert!(err.to_string().contains("authentication request failed"));
    }
}
