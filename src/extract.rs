use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

/// One item as returned by the Podio filter endpoint. Fields beyond the
/// ones we read are tolerated and ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RawItem {
    pub item_id: i64,
    #[serde(default)]
    pub fields: Vec<RawField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawField {
    pub external_id: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub values: Vec<Value>,
}

/// A decoded field value, tagged by the Podio field type. One decoder per
/// tag; anything that fails to decode surfaces as `None` from
/// [`RawItem::field`] and the caller picks the default.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Category(String),
    Number(f64),
    Date(String),
    Contact(String),
    Text(String),
    Location {
        state: Option<String>,
        formatted: Option<String>,
    },
}

impl FieldValue {
    /// Textual reading of the value, consuming it. Numbers are rendered
    /// with their natural display form.
    pub fn into_text(self) -> Option<String> {
        match self {
            FieldValue::Category(s)
            | FieldValue::Date(s)
            | FieldValue::Contact(s)
            | FieldValue::Text(s) => Some(s),
            FieldValue::Number(n) => Some(n.to_string()),
            FieldValue::Location { formatted, .. } => formatted,
        }
    }

    pub fn into_number(self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(n),
            FieldValue::Category(s) | FieldValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl RawItem {
    /// First field matching `external_id`, decoded. `None` when the field
    /// is absent, has no values, or its first value cannot be decoded.
    pub fn field(&self, external_id: &str) -> Option<FieldValue> {
        self.fields
            .iter()
            .find(|f| f.external_id == external_id)
            .and_then(decode_field)
    }
}

fn decode_field(field: &RawField) -> Option<FieldValue> {
    let first = field.values.first()?;
    match field.field_type.as_str() {
        "category" => {
            let value = first.get("value")?;
            let text = match value {
                Value::Object(obj) => obj.get("text").and_then(Value::as_str).unwrap_or_default(),
                other => return Some(FieldValue::Category(display_string(other))),
            };
            Some(FieldValue::Category(text.to_string()))
        }
        "number" => {
            let value = first.get("value")?;
            value
                .as_f64()
                .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
                .map(FieldValue::Number)
        }
        "date" => first
            .get("start")
            .and_then(Value::as_str)
            .map(|s| FieldValue::Date(s.to_string())),
        "contact" => first
            .get("value")
            .and_then(|v| v.get("name"))
            .and_then(Value::as_str)
            .map(|name| FieldValue::Contact(name.to_string())),
        "text" => first
            .get("value")
            .and_then(Value::as_str)
            .map(|s| FieldValue::Text(s.to_string())),
        "location" => {
            let value = first.get("value")?;
            match value {
                Value::Object(obj) => Some(FieldValue::Location {
                    state: obj
                        .get("state")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    formatted: obj
                        .get("formatted")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                }),
                Value::String(s) => Some(FieldValue::Location {
                    state: None,
                    formatted: Some(s.clone()),
                }),
                _ => None,
            }
        }
        _ => first
            .get("value")
            .map(|v| FieldValue::Text(display_string(v))),
    }
}

fn display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse an appointment date. Accepts a full timestamp (only the date
/// portion is used) or a plain `YYYY-MM-DD`. Never errors; bad input is
/// `None` and the caller drops the record.
pub fn parse_appointment_date(raw: &str) -> Option<NaiveDate> {
    let date_part = if raw.contains('T') {
        raw.split('T').next()?
    } else {
        raw.split_whitespace().next()?
    };
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}
