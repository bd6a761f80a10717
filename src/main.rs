use anyhow::{bail, Context};
use chrono::{Datelike, Duration, Local, NaiveDate};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod classify;
mod config;
mod extract;
mod metrics;
mod models;
mod podio;
mod report;

use config::{Config, RateConfig};
use metrics::FactsByDate;
use report::{DashboardData, WindowStats};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let client = podio::PodioClient::new(config.podio.clone())?;
    let today = Local::now().date_naive();

    let token = client.authenticate().await?;
    let items = client.fetch_all_items(&token, today).await?;
    if items.is_empty() {
        bail!("no items fetched; refusing to overwrite the dashboard");
    }

    let by_date = classify::classify_all(&items, &config.exclusions);
    let fact_count: usize = by_date.values().map(Vec::len).sum();
    if fact_count == 0 {
        bail!("no valid appointments after classification");
    }
    info!(
        items = items.len(),
        facts = fact_count,
        days = by_date.len(),
        "classification complete"
    );

    let activity_start =
        metrics::activity_start(&by_date).context("no appointment dates in fact set")?;
    let ytd_start = NaiveDate::from_ymd_opt(today.year(), 1, 1).context("invalid YTD anchor")?;
    let mtd_start = today.with_day(1).context("invalid month start")?;
    let wtd_start = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));

    let data = DashboardData {
        generated_at: Local::now().format("%B %d, %Y at %I:%M %p").to_string(),
        today,
        ytd_start,
        mtd_start,
        wtd_start,
        activity_start,
        ytd: window_stats(&by_date, ytd_start, today, &config.rates),
        mtd: window_stats(&by_date, mtd_start, today, &config.rates),
        wtd: window_stats(&by_date, wtd_start, today, &config.rates),
        monthly: metrics::monthly_snapshots(&by_date, activity_start, today, &config.rates),
    };

    let html = report::build_dashboard(&data);
    std::fs::write(&config.output_path, html)
        .with_context(|| format!("failed to write {}", config.output_path.display()))?;

    println!("Dashboard written to {}.", config.output_path.display());
    Ok(())
}

fn window_stats(
    by_date: &FactsByDate,
    start: NaiveDate,
    today: NaiveDate,
    rates: &RateConfig,
) -> WindowStats {
    let facts = metrics::facts_in_window(by_date, start, today);
    WindowStats {
        snapshot: metrics::snapshot(&facts, rates),
        calendar: metrics::calendar_day_averages(&facts, start, today),
        active: metrics::active_day_averages(by_date, start, today),
    }
}
