use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::config::ExclusionRules;
use crate::extract::{parse_appointment_date, FieldValue, RawItem};
use crate::models::AppointmentFact;

const STATE_MAP: &[(&str, &str)] = &[
    ("alabama", "AL"),
    ("alaska", "AK"),
    ("arizona", "AZ"),
    ("arkansas", "AR"),
    ("california", "CA"),
    ("colorado", "CO"),
    ("connecticut", "CT"),
    ("delaware", "DE"),
    ("florida", "FL"),
    ("georgia", "GA"),
    ("hawaii", "HI"),
    ("idaho", "ID"),
    ("illinois", "IL"),
    ("indiana", "IN"),
    ("iowa", "IA"),
    ("kansas", "KS"),
    ("kentucky", "KY"),
    ("louisiana", "LA"),
    ("maine", "ME"),
    ("maryland", "MD"),
    ("massachusetts", "MA"),
    ("michigan", "MI"),
    ("minnesota", "MN"),
    ("mississippi", "MS"),
    ("missouri", "MO"),
    ("montana", "MT"),
    ("nebraska", "NE"),
    ("nevada", "NV"),
    ("new hampshire", "NH"),
    ("new jersey", "NJ"),
    ("new mexico", "NM"),
    ("new york", "NY"),
    ("north carolina", "NC"),
    ("north dakota", "ND"),
    ("ohio", "OH"),
    ("oklahoma", "OK"),
    ("oregon", "OR"),
    ("pennsylvania", "PA"),
    ("rhode island", "RI"),
    ("south carolina", "SC"),
    ("south dakota", "SD"),
    ("tennessee", "TN"),
    ("texas", "TX"),
    ("utah", "UT"),
    ("vermont", "VT"),
    ("virginia", "VA"),
    ("washington", "WA"),
    ("west virginia", "WV"),
    ("wisconsin", "WI"),
    ("wyoming", "WY"),
];

const COUNTRY_TOKENS: &[&str] = &["usa", "united states", "us"];

fn text_field(item: &RawItem, external_id: &str) -> Option<String> {
    item.field(external_id).and_then(FieldValue::into_text)
}

/// Classify one raw item. `None` means the item is out of scope for the
/// report: unassigned, excluded, or missing a usable appointment date.
pub fn classify_item(item: &RawItem, rules: &ExclusionRules) -> Option<AppointmentFact> {
    let closer = text_field(item, "closer-assigned").unwrap_or_default();
    let partner = text_field(item, "partner-assigned").unwrap_or_default();

    // Assignment gate: a record nobody was assigned to was never worked.
    if closer.trim().is_empty() && partner.trim().is_empty() {
        return None;
    }

    let agent = text_field(item, "agent").unwrap_or_default();
    let set_by = text_field(item, "set-by-3").unwrap_or_default();

    // Literal substring matching, kept for compatibility with the upstream
    // data. A closer surname containing the marker would be a false
    // positive; accepted as a known risk.
    let team = rules.excluded_team.to_lowercase();
    if contains_marker(&closer, &team)
        || contains_marker(&partner, &team)
        || contains_marker(&agent, &team)
    {
        return None;
    }

    let source = rules.excluded_source.to_lowercase();
    if contains_marker(&set_by, &source) || contains_marker(&agent, &source) {
        return None;
    }

    let date = text_field(item, "appointment-date")
        .and_then(|raw| parse_appointment_date(&raw))?;

    let sit_status = text_field(item, "sit").filter(|s| !s.is_empty());
    let closer_reset = text_field(item, "closer-reset-status");

    // Two independently sourced sit signals; either one suffices.
    let sit_from_status = sit_status
        .as_deref()
        .map(|s| {
            let s = s.to_lowercase();
            s == "yes" || s.contains("reset by closer")
        })
        .unwrap_or(false);
    let sit_from_reset = closer_reset
        .as_deref()
        .map(|s| s.to_lowercase().contains("sit yes"))
        .unwrap_or(false);
    let is_sit = sit_from_status || sit_from_reset;

    // "Closed" without an attached dollar figure (e.g. "Closed Lost") does
    // not count as a close.
    let status = text_field(item, "status").unwrap_or_default();
    let is_closed = status.to_lowercase().contains("closed") && status.contains('$');

    let kw = if is_closed {
        item.field("kw-size")
            .and_then(FieldValue::into_number)
            .or_else(|| item.field("kw").and_then(FieldValue::into_number))
            .unwrap_or(0.0)
    } else {
        0.0
    };

    let customer = text_field(item, "customer-name")
        .or_else(|| text_field(item, "customer"))
        .unwrap_or_default();

    let state = address_state(item).unwrap_or_else(|| "Unknown".to_string());

    Some(AppointmentFact {
        date,
        is_sit,
        is_closed,
        kw,
        customer,
        closer,
        state,
        sit_status_raw: sit_status,
    })
}

/// Classify every item and group the surviving facts by appointment date.
pub fn classify_all(
    items: &[RawItem],
    rules: &ExclusionRules,
) -> BTreeMap<NaiveDate, Vec<AppointmentFact>> {
    let mut by_date: BTreeMap<NaiveDate, Vec<AppointmentFact>> = BTreeMap::new();
    for item in items {
        if let Some(fact) = classify_item(item, rules) {
            by_date.entry(fact.date).or_default().push(fact);
        }
    }
    by_date
}

fn contains_marker(haystack: &str, marker_lower: &str) -> bool {
    !marker_lower.is_empty() && haystack.to_lowercase().contains(marker_lower)
}

fn address_state(item: &RawItem) -> Option<String> {
    match item.field("address")? {
        FieldValue::Location {
            state: Some(state), ..
        } if !state.trim().is_empty() => Some(state),
        FieldValue::Location {
            formatted: Some(text),
            ..
        } => state_from_text(&text),
        other => other.into_text().and_then(|text| state_from_text(&text)),
    }
}

/// State heuristic for free-text addresses: scan the last three
/// comma-separated segments from the end, skip country names, accept a bare
/// two-letter code or a known full state name.
pub fn state_from_text(address: &str) -> Option<String> {
    let parts: Vec<&str> = address.split(',').collect();
    let tail = if parts.len() > 3 {
        &parts[parts.len() - 3..]
    } else {
        &parts[..]
    };

    for part in tail.iter().rev() {
        let clean = part.trim().to_lowercase();
        if COUNTRY_TOKENS.contains(&clean.as_str()) {
            continue;
        }
        if clean.len() == 2 && clean.chars().all(|c| c.is_ascii_alphabetic()) {
            return Some(clean.to_uppercase());
        }
        if let Some((_, code)) = STATE_MAP.iter().find(|(name, _)| *name == clean) {
            return Some((*code).to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_item(fields: serde_json::Value) -> RawItem {
        serde_json::from_value(json!({ "item_id": 1, "fields": fields })).unwrap()
    }

    fn rules() -> ExclusionRules {
        ExclusionRules::default()
    }

    fn contact(external_id: &str, name: &str) -> serde_json::Value {
        json!({ "external_id": external_id, "type": "contact", "values": [{ "value": { "name": name } }] })
    }

    fn category(external_id: &str, text: &str) -> serde_json::Value {
        json!({ "external_id": external_id, "type": "category", "values": [{ "value": { "text": text } }] })
    }

    fn date(external_id: &str, start: &str) -> serde_json::Value {
        json!({ "external_id": external_id, "type": "date", "values": [{ "start": start }] })
    }

    fn assigned_item(extra: Vec<serde_json::Value>) -> RawItem {
        let mut fields = vec![
            contact("closer-assigned", "Jane Doe"),
            date("appointment-date", "2025-03-04 00:00:00"),
        ];
        fields.extend(extra);
        raw_item(serde_json::Value::Array(fields))
    }

    #[test]
    fn unassigned_items_are_dropped() {
        let item = raw_item(json!([date("appointment-date", "2025-03-04 00:00:00")]));
        assert!(classify_item(&item, &rules()).is_none());

        let partner_only = raw_item(json!([
            contact("partner-assigned", "Sam Ortiz"),
            date("appointment-date", "2025-03-04 00:00:00"),
        ]));
        assert!(classify_item(&partner_only, &rules()).is_some());
    }

    #[test]
    fn excluded_team_marker_drops_item() {
        let by_closer = raw_item(json!([
            contact("closer-assigned", "Chase Williams"),
            date("appointment-date", "2025-03-04 00:00:00"),
        ]));
        assert!(classify_item(&by_closer, &rules()).is_none());

        let by_agent = assigned_item(vec![category("agent", "Team Chase")]);
        assert!(classify_item(&by_agent, &rules()).is_none());
    }

    #[test]
    fn excluded_source_marker_drops_item() {
        let by_set_by = assigned_item(vec![category("set-by-3", "Infinite AI Booking")]);
        assert!(classify_item(&by_set_by, &rules()).is_none());

        let by_agent = assigned_item(vec![category("agent", "infinite ai")]);
        assert!(classify_item(&by_agent, &rules()).is_none());
    }

    #[test]
    fn unparseable_date_drops_item() {
        let item = raw_item(json!([
            contact("closer-assigned", "Jane Doe"),
            date("appointment-date", "sometime in March"),
        ]));
        assert!(classify_item(&item, &rules()).is_none());

        let no_date = raw_item(json!([contact("closer-assigned", "Jane Doe")]));
        assert!(classify_item(&no_date, &rules()).is_none());
    }

    #[test]
    fn sit_from_either_signal() {
        let by_status = assigned_item(vec![category("sit", "Yes")]);
        assert!(classify_item(&by_status, &rules()).unwrap().is_sit);

        let by_reset_phrase = assigned_item(vec![category("sit", "Reset by Closer - weather")]);
        assert!(classify_item(&by_reset_phrase, &rules()).unwrap().is_sit);

        let by_closer_reset =
            assigned_item(vec![category("closer-reset-status", "Sit Yes - confirmed")]);
        assert!(classify_item(&by_closer_reset, &rules()).unwrap().is_sit);

        let no_sit = assigned_item(vec![category("sit", "No")]);
        assert!(!classify_item(&no_sit, &rules()).unwrap().is_sit);
    }

    #[test]
    fn closed_requires_both_token_and_currency_marker() {
        let closed = assigned_item(vec![category("status", "Closed $15,000")]);
        assert!(classify_item(&closed, &rules()).unwrap().is_closed);

        let closed_lost = assigned_item(vec![category("status", "Closed Lost")]);
        assert!(!classify_item(&closed_lost, &rules()).unwrap().is_closed);

        let pending = assigned_item(vec![category("status", "$ pending")]);
        assert!(!classify_item(&pending, &rules()).unwrap().is_closed);
    }

    #[test]
    fn kw_read_only_for_closed_with_fallback_and_default() {
        let primary = assigned_item(vec![
            category("status", "Closed $15,000"),
            json!({ "external_id": "kw-size", "type": "number", "values": [{ "value": "10.4" }] }),
        ]);
        assert_eq!(classify_item(&primary, &rules()).unwrap().kw, 10.4);

        let fallback = assigned_item(vec![
            category("status", "Closed $15,000"),
            json!({ "external_id": "kw", "type": "number", "values": [{ "value": "7.2" }] }),
        ]);
        assert_eq!(classify_item(&fallback, &rules()).unwrap().kw, 7.2);

        let non_numeric = assigned_item(vec![
            category("status", "Closed $15,000"),
            json!({ "external_id": "kw-size", "type": "number", "values": [{ "value": "TBD" }] }),
        ]);
        assert_eq!(classify_item(&non_numeric, &rules()).unwrap().kw, 0.0);

        let not_closed = assigned_item(vec![
            json!({ "external_id": "kw-size", "type": "number", "values": [{ "value": "10.4" }] }),
        ]);
        assert_eq!(classify_item(&not_closed, &rules()).unwrap().kw, 0.0);
    }

    #[test]
    fn dispositioned_tracks_raw_sit_status() {
        let undispositioned = assigned_item(vec![]);
        assert!(classify_item(&undispositioned, &rules())
            .unwrap()
            .sit_status_raw
            .is_none());

        let dispositioned_no = assigned_item(vec![category("sit", "No")]);
        let fact = classify_item(&dispositioned_no, &rules()).unwrap();
        assert_eq!(fact.sit_status_raw.as_deref(), Some("No"));
        assert!(!fact.is_sit);
    }

    #[test]
    fn state_from_two_letter_code() {
        assert_eq!(
            state_from_text("123 Main St, 90001 Los Angeles, CA"),
            Some("CA".to_string())
        );
    }

    #[test]
    fn state_from_full_name() {
        assert_eq!(
            state_from_text("123 Main St, Somewhere, California"),
            Some("CA".to_string())
        );
    }

    #[test]
    fn state_skips_country_tokens() {
        assert_eq!(
            state_from_text("123 Main St, Austin, TX, USA"),
            Some("TX".to_string())
        );
    }

    #[test]
    fn unparseable_address_degrades_to_unknown() {
        let item = assigned_item(vec![
            json!({ "external_id": "address", "type": "text", "values": [{ "value": "somewhere nice" }] }),
        ]);
        assert_eq!(classify_item(&item, &rules()).unwrap().state, "Unknown");

        let no_address = assigned_item(vec![]);
        assert_eq!(classify_item(&no_address, &rules()).unwrap().state, "Unknown");
    }

    #[test]
    fn structured_address_state_wins() {
        let item = assigned_item(vec![json!({
            "external_id": "address",
            "type": "location",
            "values": [{ "value": { "state": "NV", "formatted": "1 Desert Rd, Las Vegas, NV" } }]
        })]);
        assert_eq!(classify_item(&item, &rules()).unwrap().state, "NV");
    }

    #[test]
    fn classify_all_groups_by_date() {
        let items = vec![
            assigned_item(vec![]),
            assigned_item(vec![]),
            raw_item(json!([
                contact("closer-assigned", "Jane Doe"),
                date("appointment-date", "2025-03-05 00:00:00"),
            ])),
            // unassigned, never enters the fact set
            raw_item(json!([date("appointment-date", "2025-03-05 00:00:00")])),
        ];
        let by_date = classify_all(&items, &rules());
        let total: usize = by_date.values().map(Vec::len).sum();
        assert_eq!(total, 3);
        assert_eq!(
            by_date[&NaiveDate::from_ymd_opt(2025, 3, 4).unwrap()].len(),
            2
        );
        assert_eq!(
            by_date[&NaiveDate::from_ymd_opt(2025, 3, 5).unwrap()].len(),
            1
        );
    }
}
