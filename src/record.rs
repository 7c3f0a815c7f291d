use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;
use uuid::Uuid;

use crate::domain::DashError;
use crate::schema::{DisplayType, STATUS_COLUMN, Schema};

/// External date format used for display and editing.
pub const DATE_FORMAT: &str = "%d-%m-%Y";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(String);

impl RowId {
    pub fn generate() -> Self {
        RowId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RowId {
    fn from(s: &str) -> Self {
        RowId(s.to_string())
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Null,
    Text(String),
    Number(f64),
    Date(NaiveDateTime),
}

impl CellValue {
    pub fn text(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }

    /// Convert a raw backend value into the column's type. Values that do not
    /// fit the column type are kept as text so nothing is lost on ingestion.
    pub fn from_json(raw: &Value, display_type: DisplayType) -> Self {
        match (raw, display_type) {
            (Value::Null, _) => CellValue::Null,
            (Value::Number(n), DisplayType::Number) => {
                n.as_f64().map(CellValue::Number).unwrap_or(CellValue::Null)
            }
            (Value::String(s), DisplayType::Number) => s
                .trim()
                .parse::<f64>()
                .map(CellValue::Number)
                .unwrap_or_else(|_| CellValue::Text(s.clone())),
            (Value::String(s), DisplayType::Date) => parse_date(s)
                .map(CellValue::Date)
                .unwrap_or_else(|| CellValue::Text(s.clone())),
            (Value::Number(n), DisplayType::Date) => n
                .as_i64()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .map(|dt| CellValue::Date(dt.naive_utc()))
                .unwrap_or_else(|| CellValue::Text(n.to_string())),
            (Value::String(s), _) => CellValue::Text(s.clone()),
            (Value::Number(n), _) => CellValue::Text(n.to_string()),
            (Value::Bool(b), _) => CellValue::Text(b.to_string()),
            (other, _) => CellValue::Text(other.to_string()),
        }
    }

    pub fn to_display(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            CellValue::Date(d) => d.format(DATE_FORMAT).to_string(),
        }
    }

    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::Date(d) => Some(*d),
            CellValue::Text(s) => parse_date(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Ordering used by sorting. Nulls are not handled here.
    pub fn compare(&self, other: &CellValue) -> Ordering {
        match (self, other) {
            (CellValue::Number(a), CellValue::Number(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (CellValue::Date(a), CellValue::Date(b)) => a.cmp(b),
            // Typed values come before leftovers that failed conversion
            (CellValue::Number(_) | CellValue::Date(_), CellValue::Text(_)) => Ordering::Less,
            (CellValue::Text(_), CellValue::Number(_) | CellValue::Date(_)) => Ordering::Greater,
            (a, b) => a.to_display().cmp(&b.to_display()),
        }
    }
}

/// Accepts ISO dates and datetimes as sent by the backend and the
/// `DD-MM-YYYY` display format.
pub fn parse_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    // "05-03-2024" would otherwise parse as year 5 under the ISO format
    let fmt = if s.as_bytes().get(2) == Some(&b'-') {
        DATE_FORMAT
    } else {
        "%Y-%m-%d"
    };
    NaiveDate::parse_from_str(s, fmt)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    Approved,
    Rejected,
    Pending,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Approved => "Approved",
            WorkflowStatus::Rejected => "Rejected",
            WorkflowStatus::Pending => "Pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Approved" => Some(WorkflowStatus::Approved),
            "Rejected" => Some(WorkflowStatus::Rejected),
            "Pending" => Some(WorkflowStatus::Pending),
            _ => None,
        }
    }

    /// Backend rows carry `approve` / `reject`; everything else is kept as sent.
    fn normalize_ingested(raw: &str) -> Option<Self> {
        match raw {
            "approve" => Some(WorkflowStatus::Approved),
            "reject" => Some(WorkflowStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRecord {
    pub id: RowId,
    pub fields: BTreeMap<String, CellValue>,
}

impl RowRecord {
    pub fn new(id: impl Into<RowId>, fields: BTreeMap<String, CellValue>) -> Self {
        RowRecord {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, column: &str) -> &CellValue {
        self.fields.get(column).unwrap_or(&CellValue::Null)
    }

    pub fn set(&mut self, column: &str, value: CellValue) {
        self.fields.insert(column.to_string(), value);
    }

    pub fn display(&self, column: &str) -> String {
        self.get(column).to_display()
    }

    pub fn status(&self) -> Option<WorkflowStatus> {
        match self.get(STATUS_COLUMN) {
            CellValue::Text(s) => WorkflowStatus::parse(s),
            _ => None,
        }
    }

    /// Build a record from one backend row. Columns are typed through the
    /// schema; fields the schema does not know are kept as text.
    pub fn from_json(raw: &Value, schema: &Schema) -> Result<Self, DashError> {
        let object = raw
            .as_object()
            .ok_or_else(|| DashError::MalformedResponse("row is not an object".into()))?;

        let mut fields = BTreeMap::new();
        for (key, value) in object {
            let display_type = schema
                .column(key)
                .map(|c| c.display_type)
                .unwrap_or(DisplayType::String);
            let mut cell = CellValue::from_json(value, display_type);
            if key == STATUS_COLUMN
                && let CellValue::Text(s) = &cell
                && let Some(status) = WorkflowStatus::normalize_ingested(s)
            {
                cell = CellValue::text(status.as_str());
            }
            fields.insert(key.clone(), cell);
        }
        Ok(RowRecord::new(RowId::generate(), fields))
    }
}

impl From<String> for RowId {
    fn from(s: String) -> Self {
        RowId(s)
    }
}

/// Parse the `{ data: [...] }` envelope of a data endpoint.
pub fn rows_from_response(body: &Value, schema: &Schema) -> Result<Vec<RowRecord>, DashError> {
    let data = body
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| DashError::MalformedResponse("data response has no data array".into()))?;
    let rows = data
        .iter()
        .map(|raw| RowRecord::from_json(raw, schema))
        .collect::<Result<Vec<_>, _>>()?;
    trace!("Ingested {} rows", rows.len());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnDescriptor;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(vec![
            ColumnDescriptor::new("amount", DisplayType::Number),
            ColumnDescriptor::new("createdOn", DisplayType::Date),
            ColumnDescriptor::new("status", DisplayType::String),
        ])
    }

    #[test]
    fn ingestion_types_values_and_maps_status() {
        let body = json!({"data": [
            {"amount": 12, "createdOn": "2024-03-05T10:20:00Z", "status": "approve", "extra": true},
            {"amount": "7.5", "createdOn": "garbage", "status": "reject"},
            {"amount": null, "status": "on hold"}
        ]});
        let rows = rows_from_response(&body, &schema()).unwrap();
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].get("amount"), &CellValue::Number(12.0));
        assert_eq!(rows[0].display("createdOn"), "05-03-2024");
        assert_eq!(rows[0].status(), Some(WorkflowStatus::Approved));
        assert_eq!(rows[0].display("extra"), "true");

        assert_eq!(rows[1].get("amount"), &CellValue::Number(7.5));
        assert_eq!(rows[1].get("createdOn"), &CellValue::text("garbage"));
        assert_eq!(rows[1].status(), Some(WorkflowStatus::Rejected));

        assert!(rows[2].get("amount").is_null());
        assert_eq!(rows[2].display("status"), "on hold");
        assert_eq!(rows[2].status(), None);

        assert_ne!(rows[0].id, rows[1].id);
    }

    #[test]
    fn missing_data_array_is_malformed() {
        let err = rows_from_response(&json!({"rows": []}), &schema()).unwrap_err();
        assert!(matches!(err, DashError::MalformedResponse(_)));
        let err = rows_from_response(&json!({"data": [1, 2]}), &schema()).unwrap_err();
        assert!(matches!(err, DashError::MalformedResponse(_)));
    }

    #[test]
    fn dates_parse_in_both_formats() {
        let iso = parse_date("2024-02-29").unwrap();
        let ext = parse_date("29-02-2024").unwrap();
        assert_eq!(iso, ext);
        assert!(parse_date("31-02-2024").is_none());
    }

    #[test]
    fn numbers_display_without_trailing_fraction() {
        assert_eq!(CellValue::Number(42.0).to_display(), "42");
        assert_eq!(CellValue::Number(2.5).to_display(), "2.5");
    }
}
