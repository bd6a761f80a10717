use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{DailyAverages, MetricsSnapshot};

/// Everything the renderer needs. Pure data; all derivation happens in the
/// aggregator.
pub struct DashboardData {
    pub generated_at: String,
    pub today: NaiveDate,
    pub ytd_start: NaiveDate,
    pub mtd_start: NaiveDate,
    pub wtd_start: NaiveDate,
    pub activity_start: NaiveDate,
    pub ytd: WindowStats,
    pub mtd: WindowStats,
    pub wtd: WindowStats,
    pub monthly: BTreeMap<(i32, u32), MetricsSnapshot>,
}

pub struct WindowStats {
    pub snapshot: MetricsSnapshot,
    pub calendar: DailyAverages,
    pub active: DailyAverages,
}

const CSS: &str = "\
* { margin: 0; padding: 0; box-sizing: border-box; }
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Arial, sans-serif;
  background: linear-gradient(135deg, #1e3c72 0%, #2a5298 50%, #7e22ce 100%);
  min-height: 100vh; padding: 20px; color: #fff; font-size: 13px; }
.container { max-width: 1800px; margin: 0 auto; }
.header { text-align: center; margin-bottom: 25px; }
.header h1 { font-size: 2.2em; margin-bottom: 8px; color: #fbbf24; }
.last-updated { text-align: center; opacity: 0.7; margin-bottom: 20px; font-size: 0.85em; }
.summary-grid { display: grid; grid-template-columns: repeat(3, 1fr); gap: 25px; margin-bottom: 40px; }
.summary-card, .section { background: rgba(255, 255, 255, 0.1); border-radius: 12px;
  padding: 18px; border: 1px solid rgba(255, 255, 255, 0.2); margin-bottom: 20px; }
.summary-card h2, .section h2 { font-size: 1.3em; margin-bottom: 12px;
  border-bottom: 2px solid rgba(251, 191, 36, 0.5); padding-bottom: 8px; }
.metric-grid { display: grid; grid-template-columns: repeat(2, 1fr); gap: 10px; }
.metric { background: rgba(255, 255, 255, 0.05); padding: 10px; border-radius: 8px; }
.metric-label { font-size: 0.8em; opacity: 0.8; margin-bottom: 5px; }
.metric-value { font-size: 1.4em; font-weight: bold; color: #fbbf24; }
.metric .span { grid-column: span 2; }
.daily-grid { display: grid; grid-template-columns: repeat(3, 1fr); gap: 12px; }
.daily-box { background: rgba(255, 255, 255, 0.05); padding: 15px; border-radius: 10px; text-align: center; }
.daily-box .label { font-size: 0.9em; opacity: 0.8; margin-bottom: 8px; }
.daily-box .value { font-size: 1.8em; font-weight: bold; color: #4ade80; }
table { width: 100%; border-collapse: collapse; background: rgba(255, 255, 255, 0.05);
  border-radius: 8px; overflow: hidden; font-size: 0.95em; }
th { background: rgba(251, 191, 36, 0.2); padding: 10px 12px; text-align: left;
  border-bottom: 2px solid rgba(251, 191, 36, 0.5); }
td { padding: 8px 12px; border-bottom: 1px solid rgba(255, 255, 255, 0.1); }
.footer { text-align: center; margin-top: 40px; opacity: 0.6; font-size: 0.95em; }
";

pub fn build_dashboard(data: &DashboardData) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "<!DOCTYPE html>");
    let _ = writeln!(out, "<html lang=\"en\">");
    let _ = writeln!(out, "<head>");
    let _ = writeln!(out, "<meta charset=\"UTF-8\">");
    let _ = writeln!(
        out,
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">"
    );
    let _ = writeln!(out, "<title>Full Org Return - Performance Dashboard</title>");
    let _ = writeln!(out, "<style>{CSS}</style>");
    let _ = writeln!(out, "</head>");
    let _ = writeln!(out, "<body>");
    let _ = writeln!(out, "<div class=\"container\">");
    let _ = writeln!(out, "<div class=\"header\"><h1>FULL ORG RETURN</h1>");
    let _ = writeln!(out, "<p>Comprehensive Performance Dashboard</p></div>");
    let _ = writeln!(
        out,
        "<div class=\"last-updated\">Last Updated: {}</div>",
        data.generated_at
    );

    let _ = writeln!(out, "<div class=\"summary-grid\">");
    write_summary_card(
        &mut out,
        &format!("YTD {} (Year to Date)", data.ytd_start.format("%Y")),
        data.ytd_start,
        data.today,
        &data.ytd.snapshot,
    );
    write_summary_card(
        &mut out,
        "MTD (Month to Date)",
        data.mtd_start,
        data.today,
        &data.mtd.snapshot,
    );
    write_summary_card(
        &mut out,
        "WTD (Week to Date)",
        data.wtd_start,
        data.today,
        &data.wtd.snapshot,
    );
    let _ = writeln!(out, "</div>");

    write_monthly_table(&mut out, data);

    let _ = writeln!(out, "<div class=\"section\">");
    let _ = writeln!(out, "<h2>Daily Averages</h2>");
    write_daily_panel(&mut out, "YTD Daily Averages", &data.ytd);
    write_daily_panel(&mut out, "MTD Daily Averages", &data.mtd);
    write_daily_panel(&mut out, "WTD Daily Averages", &data.wtd);
    let _ = writeln!(out, "</div>");

    let _ = writeln!(out, "<div class=\"footer\">");
    let _ = writeln!(out, "<p><strong>Full Organization Return Dashboard</strong></p>");
    let _ = writeln!(
        out,
        "<p>YTD: {} to {} | MTD: {} to {} | WTD: {} to {} | Activity start: {}</p>",
        data.ytd_start,
        data.today,
        data.mtd_start,
        data.today,
        data.wtd_start,
        data.today,
        data.activity_start
    );
    let _ = writeln!(out, "</div>");

    let _ = writeln!(out, "</div>");
    let _ = writeln!(out, "</body>");
    let _ = writeln!(out, "</html>");

    out
}

fn write_summary_card(
    out: &mut String,
    title: &str,
    start: NaiveDate,
    end: NaiveDate,
    snap: &MetricsSnapshot,
) {
    let _ = writeln!(out, "<div class=\"summary-card\">");
    let _ = writeln!(out, "<h2>{title}</h2>");
    let _ = writeln!(out, "<p class=\"metric-label\">{start} to {end}</p>");
    let _ = writeln!(out, "<div class=\"metric-grid\">");
    write_metric(out, "Total Appointments", &snap.total_appts.to_string());
    write_metric(out, "Dispositioned", &snap.dispositioned.to_string());
    write_metric(out, "Sits", &snap.sits.to_string());
    write_metric(out, "Sit Rate (Sits/Dispositioned)", &format_rate(snap.sit_rate));
    write_metric(out, "Closed Deals", &snap.closed.to_string());
    write_metric(out, "Close Rate", &format_rate(snap.close_rate));
    write_metric(out, "KW Closed", &format!("{:.2}", snap.total_kw));
    write_metric(out, "Revenue", &format_dollars(snap.revenue));

    let states = snap
        .states
        .iter()
        .map(|(state, count)| format!("{state} ({count})"))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(
        out,
        "<div class=\"metric span\"><div class=\"metric-label\">States</div>\
         <div class=\"metric-value\">{states}</div></div>"
    );

    let _ = writeln!(out, "</div></div>");
}

fn write_metric(out: &mut String, label: &str, value: &str) {
    let _ = writeln!(
        out,
        "<div class=\"metric\"><div class=\"metric-label\">{label}</div>\
         <div class=\"metric-value\">{value}</div></div>"
    );
}

fn write_monthly_table(out: &mut String, data: &DashboardData) {
    let _ = writeln!(out, "<div class=\"section\">");
    let _ = writeln!(out, "<h2>Per-Month Breakdown</h2>");
    let _ = writeln!(out, "<table>");
    let _ = writeln!(
        out,
        "<thead><tr><th>Month</th><th>Appointments</th><th>Sits</th><th>Sit Rate</th>\
         <th>Closed</th><th>Close Rate</th><th>KW</th><th>Revenue</th></tr></thead>"
    );
    let _ = writeln!(out, "<tbody>");
    for ((year, month), snap) in data.monthly.iter().rev() {
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.2}</td><td>{}</td></tr>",
            month_label(*year, *month),
            snap.total_appts,
            snap.sits,
            format_rate(snap.sit_rate),
            snap.closed,
            format_rate(snap.close_rate),
            snap.total_kw,
            format_dollars(snap.revenue)
        );
    }
    let _ = writeln!(out, "</tbody></table></div>");
}

fn write_daily_panel(out: &mut String, title: &str, window: &WindowStats) {
    let _ = writeln!(
        out,
        "<h3>{title} ({} calendar days, {} active days)</h3>",
        window.calendar.days, window.active.days
    );
    let _ = writeln!(out, "<div class=\"daily-grid\">");
    write_daily_box(out, "Avg Appointments per Day", &window.calendar, &window.active, |a| a.appts);
    write_daily_box(out, "Avg Sits per Day", &window.calendar, &window.active, |a| a.sits);
    write_daily_box(out, "Avg Closed per Day", &window.calendar, &window.active, |a| a.closed);
    let _ = writeln!(out, "</div>");
}

fn write_daily_box(
    out: &mut String,
    label: &str,
    calendar: &DailyAverages,
    active: &DailyAverages,
    pick: fn(&DailyAverages) -> f64,
) {
    let _ = writeln!(
        out,
        "<div class=\"daily-box\"><div class=\"label\">{label}</div>\
         <div class=\"value\">{:.2}</div>\
         <div class=\"label\">calendar-day | active-day: {:.2}</div></div>",
        pick(calendar),
        pick(active)
    );
}

fn month_label(year: i32, month: u32) -> String {
    match NaiveDate::from_ymd_opt(year, month, 1) {
        Some(date) => date.format("%B %Y").to_string(),
        None => format!("{year}-{month:02}"),
    }
}

/// Rates render to one decimal place.
fn format_rate(rate: f64) -> String {
    format!("{rate:.1}%")
}

/// Whole dollars with comma grouping, matching the original artifact.
fn format_dollars(amount: f64) -> String {
    let whole = amount.round() as i64;
    let digits = whole.abs().to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if whole < 0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}
