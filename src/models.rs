use chrono::NaiveDate;

/// One classified, in-scope appointment. Only records that pass the
/// assignment and exclusion gates ever become facts.
#[derive(Debug, Clone)]
pub struct AppointmentFact {
    pub date: NaiveDate,
    pub is_sit: bool,
    pub is_closed: bool,
    /// KW of the sold system; zero unless `is_closed`.
    pub kw: f64,
    pub customer: String,
    pub closer: String,
    /// Two-letter region code, or "Unknown".
    pub state: String,
    /// Original sit-status text. `None` means no disposition recorded yet,
    /// which is different from an explicit "No".
    pub sit_status_raw: Option<String>,
}

/// Derived metrics over one date window. Rates and totals are kept at full
/// precision; rounding happens in the renderer.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub total_appts: usize,
    pub dispositioned: usize,
    pub sits: usize,
    pub closed: usize,
    pub total_kw: f64,
    pub sit_rate: f64,
    pub close_rate: f64,
    pub revenue: f64,
    /// (state, appointment count), sorted descending by count.
    pub states: Vec<(String, usize)>,
}

/// Per-day averages over a window. `days` is the divisor that was used:
/// calendar days for the calendar variant, active days for the active one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DailyAverages {
    pub appts: f64,
    pub sits: f64,
    pub closed: f64,
    pub days: i64,
}
