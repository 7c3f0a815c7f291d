use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::DashError;

pub const STATUS_COLUMN: &str = "status";
pub const STATUS_REASON_COLUMN: &str = "status_reason";
pub const STATUS_VALUES: [&str; 3] = ["Approved", "Pending", "Rejected"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisplayType {
    String,
    Number,
    Date,
    Enum,
}

impl DisplayType {
    fn from_schema_type(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "integer" | "int" | "number" | "numeric" | "float" | "decimal" | "bigint" => {
                DisplayType::Number
            }
            "date" | "datetime" | "timestamp" => DisplayType::Date,
            "enum" => DisplayType::Enum,
            "string" | "text" | "varchar" => DisplayType::String,
            other => {
                warn!("Unknown column type \"{other}\", treating it as string");
                DisplayType::String
            }
        }
    }
}

/// Optional per column limits. Missing limits are not enforced, except that
/// numbers default to rejecting negatives and zero.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationOptions {
    pub min_chars: Option<usize>,
    pub max_chars: Option<usize>,
    pub min_digits: Option<usize>,
    pub max_digits: Option<usize>,
    pub allow_negative: bool,
    pub allow_zero: bool,
    pub min_date: Option<String>,
    pub max_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub header: String,
    pub display_type: DisplayType,
    pub editable: bool,
    pub allowed_values: Option<Vec<String>>,
    pub rules: ValidationOptions,
}

impl ColumnDescriptor {
    pub fn new(name: &str, display_type: DisplayType) -> Self {
        let (display_type, allowed_values) = match (display_type, name) {
            (DisplayType::String | DisplayType::Enum, STATUS_COLUMN) => (
                DisplayType::Enum,
                Some(STATUS_VALUES.iter().map(|s| s.to_string()).collect()),
            ),
            (dt, _) => (dt, None),
        };
        ColumnDescriptor {
            name: name.to_string(),
            header: header_for(name),
            display_type,
            editable: true,
            allowed_values,
            rules: ValidationOptions::default(),
        }
    }

    pub fn with_allowed_values(mut self, values: &[&str]) -> Self {
        self.display_type = DisplayType::Enum;
        self.allowed_values = Some(values.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_rules(mut self, rules: ValidationOptions) -> Self {
        self.rules = rules;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.editable = false;
        self
    }

    pub fn choices(&self) -> &[String] {
        self.allowed_values.as_deref().unwrap_or(&[])
    }
}

/// "kyc_type" -> "Kyc type"
pub fn header_for(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Deserialize)]
struct RawColumn {
    name: String,
    #[serde(rename = "type", default)]
    column_type: Option<String>,
    #[serde(default)]
    editable: Option<bool>,
    #[serde(rename = "allowedValues", default)]
    allowed_values: Option<Vec<String>>,
    #[serde(flatten)]
    rules: ValidationOptions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    columns: Vec<ColumnDescriptor>,
    lookup: HashMap<String, usize>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        let lookup = columns
            .iter()
            .enumerate()
            .map(|(idx, c)| (c.name.clone(), idx))
            .collect();
        Schema { columns, lookup }
    }

    /// Parse a `/page-schema/{tenant}/{page}` response body.
    pub fn from_response(body: &serde_json::Value) -> Result<Self, DashError> {
        let raw = body
            .get("columns")
            .filter(|c| c.is_array())
            .ok_or_else(|| DashError::MalformedResponse("schema has no columns array".into()))?;
        let raw_columns: Vec<RawColumn> = serde_json::from_value(raw.clone())?;

        let mut columns = Vec::with_capacity(raw_columns.len());
        for rc in raw_columns {
            if rc.name.trim().is_empty() {
                return Err(DashError::MalformedResponse(
                    "schema column without a name".into(),
                ));
            }
            let display_type = rc
                .column_type
                .as_deref()
                .map(DisplayType::from_schema_type)
                .unwrap_or(DisplayType::String);
            let mut column = ColumnDescriptor::new(&rc.name, display_type).with_rules(rc.rules);
            if let Some(values) = rc.allowed_values {
                column.display_type = DisplayType::Enum;
                column.allowed_values = Some(values);
            }
            column.editable = rc.editable.unwrap_or(true);
            debug!("Column {} -> {:?}", column.name, column.display_type);
            columns.push(column);
        }
        Ok(Schema::new(columns))
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.lookup.get(name).map(|&idx| &self.columns[idx])
    }

    pub fn get(&self, idx: usize) -> Option<&ColumnDescriptor> {
        self.columns.get(idx)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_columns_and_types() {
        let body = json!({
            "columns": [
                {"name": "player_kyc_id", "type": "integer", "editable": false},
                {"name": "kyc_type", "type": "string", "allowedValues": ["Aadhaar", "Pan"]},
                {"name": "createdOn", "type": "Date", "minDate": "01-01-2000"},
                {"name": "status", "type": "string"},
                {"name": "notes"}
            ]
        });
        let schema = Schema::from_response(&body).unwrap();
        assert_eq!(schema.len(), 5);

        let id = schema.column("player_kyc_id").unwrap();
        assert_eq!(id.display_type, DisplayType::Number);
        assert!(!id.editable);

        let kyc = schema.column("kyc_type").unwrap();
        assert_eq!(kyc.display_type, DisplayType::Enum);
        assert_eq!(kyc.choices(), ["Aadhaar", "Pan"]);

        let created = schema.column("createdOn").unwrap();
        assert_eq!(created.display_type, DisplayType::Date);
        assert_eq!(created.rules.min_date.as_deref(), Some("01-01-2000"));

        let status = schema.column("status").unwrap();
        assert_eq!(status.display_type, DisplayType::Enum);
        assert_eq!(status.choices().len(), 3);

        assert_eq!(schema.column("notes").unwrap().display_type, DisplayType::String);
    }

    #[test]
    fn missing_columns_is_malformed() {
        let err = Schema::from_response(&json!({"cols": []})).unwrap_err();
        assert!(matches!(err, DashError::MalformedResponse(_)));

        let err = Schema::from_response(&json!({"columns": "nope"})).unwrap_err();
        assert!(matches!(err, DashError::MalformedResponse(_)));
    }

    #[test]
    fn headers_are_humanized() {
        assert_eq!(header_for("kyc_type"), "Kyc type");
        assert_eq!(header_for("playerID"), "PlayerID");
        assert_eq!(header_for(""), "");
    }
}
