use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

/// Deployment configuration. Credentials come from the environment; the
/// remaining tunables are fixed at deployment time and carried as explicit
/// values so tests can inject their own.
#[derive(Debug, Clone)]
pub struct Config {
    pub podio: PodioConfig,
    pub rates: RateConfig,
    pub exclusions: ExclusionRules,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PodioConfig {
    pub client_id: String,
    pub client_secret: String,
    pub app_id: String,
    pub app_token: String,
    pub api_base: String,
    pub auth_url: String,
    pub page_size: usize,
    /// Oldest calendar year fetched, in addition to the current-month window.
    pub earliest_year: i32,
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub http_timeout: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct RateConfig {
    pub revenue_per_watt: f64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            revenue_per_watt: 5.5,
        }
    }
}

/// Markers for appointments that belong to this report's sister teams and
/// must be excluded. Matching is literal substring, case-insensitive.
#[derive(Debug, Clone)]
pub struct ExclusionRules {
    pub excluded_team: String,
    pub excluded_source: String,
}

impl Default for ExclusionRules {
    fn default() -> Self {
        Self {
            excluded_team: "chase".to_string(),
            excluded_source: "infinite".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let client_id =
            std::env::var("PODIO_CLIENT_ID").context("PODIO_CLIENT_ID must be set")?;
        let client_secret =
            std::env::var("PODIO_CLIENT_SECRET").context("PODIO_CLIENT_SECRET must be set")?;
        let app_id = std::env::var("PODIO_APP_ID").context("PODIO_APP_ID must be set")?;
        let app_token =
            std::env::var("PODIO_APP_TOKEN").context("PODIO_APP_TOKEN must be set")?;

        let api_base = std::env::var("PODIO_API_BASE")
            .unwrap_or_else(|_| "https://api.podio.com".to_string());
        let auth_url = std::env::var("PODIO_AUTH_URL")
            .unwrap_or_else(|_| "https://podio.com/oauth/token".to_string());
        let output_path = std::env::var("DASHBOARD_OUT")
            .unwrap_or_else(|_| "full_org_return.html".to_string())
            .into();

        Ok(Self {
            podio: PodioConfig {
                client_id,
                client_secret,
                app_id,
                app_token,
                api_base,
                auth_url,
                page_size: 500,
                earliest_year: 2023,
                max_retries: 5,
                initial_backoff: Duration::from_secs(2),
                http_timeout: Duration::from_secs(90),
            },
            rates: RateConfig::default(),
            exclusions: ExclusionRules::default(),
            output_path,
        })
    }
}
