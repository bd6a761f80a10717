use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};

use crate::config::RateConfig;
use crate::models::{AppointmentFact, DailyAverages, MetricsSnapshot};

pub type FactsByDate = BTreeMap<NaiveDate, Vec<AppointmentFact>>;

/// Compute the metrics for one set of facts.
///
/// Sit rate divides by the dispositioned count, not the total:
/// undispositioned appointments have not been worked yet and would
/// artificially depress the rate.
pub fn snapshot(facts: &[&AppointmentFact], rates: &RateConfig) -> MetricsSnapshot {
    let total_appts = facts.len();
    let dispositioned = facts.iter().filter(|f| f.sit_status_raw.is_some()).count();
    let sits = facts.iter().filter(|f| f.is_sit).count();
    let closed = facts.iter().filter(|f| f.is_closed).count();
    let total_kw: f64 = facts.iter().map(|f| f.kw).sum();

    let sit_rate = if dispositioned > 0 {
        sits as f64 / dispositioned as f64 * 100.0
    } else {
        0.0
    };
    let close_rate = if sits > 0 {
        closed as f64 / sits as f64 * 100.0
    } else {
        0.0
    };

    // KW to watts, then dollars per watt.
    let revenue = total_kw * 1000.0 * rates.revenue_per_watt;

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for fact in facts {
        *counts.entry(fact.state.as_str()).or_insert(0) += 1;
    }
    let mut states: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(state, count)| (state.to_string(), count))
        .collect();
    states.sort_by(|a, b| b.1.cmp(&a.1));

    MetricsSnapshot {
        total_appts,
        dispositioned,
        sits,
        closed,
        total_kw,
        sit_rate,
        close_rate,
        revenue,
        states,
    }
}

/// Reporting starts on the earliest date with 3 or more facts; sparse
/// lead-in data does not count as meaningful volume. Falls back to the
/// earliest fact date when no such day exists.
pub fn activity_start(by_date: &FactsByDate) -> Option<NaiveDate> {
    for (date, facts) in by_date {
        if facts.len() >= 3 {
            return Some(*date);
        }
    }
    by_date.keys().next().copied()
}

/// Facts in `[start, end]`, both endpoints inclusive.
pub fn facts_in_window<'a>(
    by_date: &'a FactsByDate,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<&'a AppointmentFact> {
    by_date
        .range(start..=end)
        .flat_map(|(_, facts)| facts.iter())
        .collect()
}

/// One snapshot per calendar month, from the activity start through `today`.
pub fn monthly_snapshots(
    by_date: &FactsByDate,
    start: NaiveDate,
    today: NaiveDate,
    rates: &RateConfig,
) -> BTreeMap<(i32, u32), MetricsSnapshot> {
    let mut months: BTreeMap<(i32, u32), Vec<&AppointmentFact>> = BTreeMap::new();
    for (date, facts) in by_date.range(start..=today) {
        months
            .entry((date.year(), date.month()))
            .or_default()
            .extend(facts.iter());
    }
    months
        .into_iter()
        .map(|(month, facts)| (month, snapshot(&facts, rates)))
        .collect()
}

/// Averages over every calendar day in `[start, today]`, including days
/// with no activity.
pub fn calendar_day_averages(
    facts: &[&AppointmentFact],
    start: NaiveDate,
    today: NaiveDate,
) -> DailyAverages {
    let days = (today - start).num_days() + 1;
    if days <= 0 {
        return DailyAverages::default();
    }
    averages_over(facts, days)
}

/// Averages over only the days in `[start, end]` that had at least one
/// fact. Zero-activity days do not dilute the result.
pub fn active_day_averages(by_date: &FactsByDate, start: NaiveDate, end: NaiveDate) -> DailyAverages {
    let mut facts: Vec<&AppointmentFact> = Vec::new();
    let mut active_days = 0i64;
    for (_, day_facts) in by_date.range(start..=end) {
        if day_facts.is_empty() {
            continue;
        }
        active_days += 1;
        facts.extend(day_facts.iter());
    }
    if active_days == 0 {
        return DailyAverages::default();
    }
    averages_over(&facts, active_days)
}

fn averages_over(facts: &[&AppointmentFact], days: i64) -> DailyAverages {
    let sits = facts.iter().filter(|f| f.is_sit).count();
    let closed = facts.iter().filter(|f| f.is_closed).count();
    DailyAverages {
        appts: facts.len() as f64 / days as f64,
        sits: sits as f64 / days as f64,
        closed: closed as f64 / days as f64,
        days,
    }
}
