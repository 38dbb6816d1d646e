//! Raw form rows → canonical records
//!
//! Normalization is total: every row yields exactly one record and every field of the
//! record is filled, falling back to configured defaults when the form left a column
//! empty or malformed. Each field is derived independently, so a corrupt identifier
//! never prevents the name or email from being used.

use crate::config::{FieldMapping, NormalizeConfig};
use crate::types::{CanonicalRecord, Identifier, RawRow};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::debug;

/// Timestamp layouts accepted for the submission date, tried in order
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Date-only layouts accepted for the submission date
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Applies the coalescing rules of a form to its rows
#[derive(Clone, Debug, Default)]
pub struct Normalizer {
    fields: FieldMapping,
    rules: NormalizeConfig,
}

impl Normalizer {
    /// Create a normalizer for the given column mapping and fallback values
    pub fn new(fields: FieldMapping, rules: NormalizeConfig) -> Self {
        Self { fields, rules }
    }

    /// Normalize rows, using today's local date for unparseable submission dates
    pub fn normalize(&self, rows: &[RawRow]) -> Vec<CanonicalRecord> {
        self.normalize_at(rows, Local::now().date_naive())
    }

    /// Normalize rows with an explicit fallback date; output order matches input order
    pub fn normalize_at(&self, rows: &[RawRow], today: NaiveDate) -> Vec<CanonicalRecord> {
        rows.iter().map(|row| self.normalize_row(row, today)).collect()
    }

    /// Normalize a single row
    pub fn normalize_row(&self, row: &RawRow, today: NaiveDate) -> CanonicalRecord {
        let key = row.fingerprint();

        let identifier = parse_identifier(row.get(&self.fields.identifier));
        if let Identifier::Unparsed(raw) = &identifier {
            debug!(record = %key, identifier = %raw, "identifier is not an integer, keeping raw value");
        }

        let submission_date = match row.get(&self.fields.date).and_then(parse_date) {
            Some(date) => date,
            None => {
                debug!(record = %key, "submission date missing or unparseable, using today");
                today
            }
        };

        CanonicalRecord {
            key,
            submission_date,
            identifier,
            email: self.email(row),
            display_name: self.display_name(row),
        }
    }

    fn email(&self, row: &RawRow) -> String {
        // The sentinel means "answered anonymously"; the secondary column holds the address
        let primary = text(row.get(&self.fields.email))
            .filter(|email| *email != self.rules.email_sentinel);

        primary
            .or_else(|| text(row.get(&self.fields.email_fallback)))
            .unwrap_or_else(|| self.rules.default_email.clone())
    }

    fn display_name(&self, row: &RawRow) -> String {
        text(row.get(&self.fields.name))
            .or_else(|| text(row.get(&self.fields.name_fallback)))
            .unwrap_or_else(|| self.rules.anonymous_name.clone())
    }
}

/// Non-blank textual form of a value; null and blank strings are absent
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        other => Some(other.to_string()),
    }
}

fn parse_identifier(value: Option<&Value>) -> Identifier {
    let Some(value) = value else {
        return Identifier::default();
    };

    match value {
        Value::Null => Identifier::default(),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(integral))
            .map(Identifier::Number)
            .unwrap_or_else(|| Identifier::Unparsed(n.to_string())),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Identifier::default();
            }
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(integral))
                .map(Identifier::Number)
                .unwrap_or_else(|| Identifier::Unparsed(s.clone()))
        }
        other => Identifier::Unparsed(other.to_string()),
    }
}

/// Spreadsheet exports often carry integers as `1234.0`
fn integral(f: f64) -> Option<i64> {
    let in_range = f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64;
    in_range.then_some(f as i64)
}

fn parse_date(value: &Value) -> Option<NaiveDate> {
    let raw = value.as_str()?.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        })
}
