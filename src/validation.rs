use chrono::NaiveDate;
use thiserror::Error;

use crate::record::{CellValue, DATE_FORMAT};
use crate::schema::{ColumnDescriptor, DisplayType, Schema};

/// A failed cell check. The message is meant to be shown to the operator as is.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

type Checked = Result<CellValue, ValidationError>;

fn fail(message: String) -> Checked {
    Err(ValidationError(message))
}

/// Check `value` against the rules of `column` and return the typed cell to
/// store. Pure; every failure is a message, never a panic.
pub fn validate(value: &str, column: &str, schema: &Schema) -> Checked {
    let Some(descriptor) = schema.column(column) else {
        return fail("Column schema not found".to_string());
    };
    match descriptor.display_type {
        DisplayType::String => validate_string(value, descriptor),
        DisplayType::Number => validate_number(value, descriptor),
        DisplayType::Date => validate_date(value, descriptor),
        DisplayType::Enum => validate_enum(value, descriptor),
    }
}

fn validate_string(value: &str, column: &ColumnDescriptor) -> Checked {
    let name = &column.name;
    if value.trim().is_empty() {
        return fail(format!("{name} should not be empty."));
    }
    let len = value.chars().count();
    if let Some(min) = column.rules.min_chars
        && len < min
    {
        return fail(format!("{name} must have at least {min} characters."));
    }
    if let Some(max) = column.rules.max_chars
        && len > max
    {
        return fail(format!("{name} must have no more than {max} characters."));
    }
    Ok(CellValue::text(value))
}

fn validate_number(value: &str, column: &ColumnDescriptor) -> Checked {
    let name = &column.name;
    let trimmed = value.trim();
    let Ok(number) = trimmed.parse::<f64>() else {
        return fail(format!("{name} must be a valid number and cannot be empty."));
    };
    if !number.is_finite() {
        return fail(format!("{name} must be a valid number and cannot be empty."));
    }

    let digits = trimmed.chars().filter(|c| c.is_ascii_digit()).count();
    if let Some(min) = column.rules.min_digits
        && digits < min
    {
        return fail(format!("{name} must have at least {min} digits."));
    }
    if let Some(max) = column.rules.max_digits
        && digits > max
    {
        return fail(format!("{name} must have no more than {max} digits."));
    }

    if !column.rules.allow_negative && number < 0.0 {
        return fail(format!("{name} must be a non-negative number."));
    }
    if !column.rules.allow_zero && number == 0.0 {
        return fail(format!("{name} must be a positive number."));
    }
    Ok(CellValue::Number(number))
}

/// Strict `DD-MM-YYYY`; chrono alone would accept unpadded fields.
fn has_date_shape(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(idx, b)| match idx {
            2 | 5 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

pub fn parse_external_date(value: &str) -> Option<NaiveDate> {
    if !has_date_shape(value) {
        return None;
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

fn validate_date(value: &str, column: &ColumnDescriptor) -> Checked {
    let name = &column.name;
    let value = value.trim();
    if value.is_empty() {
        return fail(format!("{name} should not be empty and must be a valid date string."));
    }
    if !has_date_shape(value) {
        return fail(format!("{name} must be in the format DD-MM-YYYY."));
    }
    let Some(date) = parse_external_date(value) else {
        return fail(format!("{name} must be a valid date."));
    };

    if let Some(min) = column.rules.min_date.as_deref()
        && let Some(min_date) = parse_external_date(min)
        && date < min_date
    {
        return fail(format!("{name} cannot be earlier than {min}."));
    }
    if let Some(max) = column.rules.max_date.as_deref()
        && let Some(max_date) = parse_external_date(max)
        && date > max_date
    {
        return fail(format!("{name} cannot be later than {max}."));
    }

    match date.and_hms_opt(0, 0, 0) {
        Some(dt) => Ok(CellValue::Date(dt)),
        None => fail(format!("{name} must be a valid date.")),
    }
}

fn validate_enum(value: &str, column: &ColumnDescriptor) -> Checked {
    let name = &column.name;
    let value = value.trim();
    if value.is_empty() {
        return fail(format!("{name} should not be empty."));
    }
    let choices = column.choices();
    match choices.iter().find(|c| c.eq_ignore_ascii_case(value)) {
        Some(canonical) => Ok(CellValue::text(canonical)),
        None => fail(format!("{name} must be one of: {}.", choices.join(", "))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ValidationOptions;

    fn schema() -> Schema {
        Schema::new(vec![
            ColumnDescriptor::new("kyc_type", DisplayType::String).with_allowed_values(&[
                "Aadhaar",
                "Voter Id",
                "Pan",
            ]),
            ColumnDescriptor::new("status", DisplayType::String),
            ColumnDescriptor::new("name", DisplayType::String).with_rules(ValidationOptions {
                min_chars: Some(2),
                max_chars: Some(5),
                ..Default::default()
            }),
            ColumnDescriptor::new("amount", DisplayType::Number).with_rules(ValidationOptions {
                min_digits: Some(1),
                max_digits: Some(4),
                ..Default::default()
            }),
            ColumnDescriptor::new("balance", DisplayType::Number).with_rules(ValidationOptions {
                allow_negative: true,
                allow_zero: true,
                ..Default::default()
            }),
            ColumnDescriptor::new("createdOn", DisplayType::Date).with_rules(ValidationOptions {
                min_date: Some("01-01-2000".into()),
                max_date: Some("31-12-2024".into()),
                ..Default::default()
            }),
        ])
    }

    fn message(result: Checked) -> String {
        result.unwrap_err().0
    }

    #[test]
    fn unknown_column() {
        assert_eq!(message(validate("x", "nope", &schema())), "Column schema not found");
    }

    #[test]
    fn strings() {
        let s = schema();
        assert_eq!(message(validate("   ", "name", &s)), "name should not be empty.");
        assert_eq!(
            message(validate("a", "name", &s)),
            "name must have at least 2 characters."
        );
        assert_eq!(
            message(validate("abcdef", "name", &s)),
            "name must have no more than 5 characters."
        );
        assert_eq!(validate("abc", "name", &s), Ok(CellValue::text("abc")));
    }

    #[test]
    fn numbers() {
        let s = schema();
        assert!(message(validate("abc", "amount", &s)).contains("valid number"));
        assert!(message(validate("", "amount", &s)).contains("valid number"));
        assert!(message(validate("12345", "amount", &s)).contains("no more than 4 digits"));
        assert!(message(validate("-5", "amount", &s)).contains("non-negative"));
        assert!(message(validate("0", "amount", &s)).contains("positive"));
        assert_eq!(validate("12.5", "amount", &s), Ok(CellValue::Number(12.5)));
        assert_eq!(validate("-3", "balance", &s), Ok(CellValue::Number(-3.0)));
        assert_eq!(validate("0", "balance", &s), Ok(CellValue::Number(0.0)));
    }

    #[test]
    fn impossible_calendar_date_is_rejected() {
        let s = schema();
        assert_eq!(
            message(validate("31-02-2024", "createdOn", &s)),
            "createdOn must be a valid date."
        );
    }

    #[test]
    fn dates() {
        let s = schema();
        assert!(message(validate("", "createdOn", &s)).contains("should not be empty"));
        assert_eq!(
            message(validate("2024-01-01", "createdOn", &s)),
            "createdOn must be in the format DD-MM-YYYY."
        );
        assert_eq!(
            message(validate("1-1-2020", "createdOn", &s)),
            "createdOn must be in the format DD-MM-YYYY."
        );
        assert!(message(validate("31-12-1999", "createdOn", &s)).contains("earlier than"));
        assert!(message(validate("01-01-2025", "createdOn", &s)).contains("later than"));
        let ok = validate("29-02-2024", "createdOn", &s).unwrap();
        assert_eq!(ok.to_display(), "29-02-2024");
    }

    #[test]
    fn enums_compare_case_insensitively_and_store_canonical() {
        let s = schema();
        assert_eq!(validate("pan", "kyc_type", &s), Ok(CellValue::text("Pan")));
        assert_eq!(validate("VOTER ID", "kyc_type", &s), Ok(CellValue::text("Voter Id")));
        assert!(message(validate("passport", "kyc_type", &s)).contains("must be one of"));
        assert_eq!(validate("approved", "status", &s), Ok(CellValue::text("Approved")));
        assert!(message(validate("Done", "status", &s)).contains("Approved, Pending, Rejected"));
    }
}
