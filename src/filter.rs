use std::collections::{BTreeMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};
use rayon::prelude::*;
use tracing::trace;

use crate::record::RowRecord;
use crate::schema::Schema;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MatchMode {
    #[default]
    Contains,
    StartsWith,
    Equals,
}

impl MatchMode {
    pub fn next(self) -> Self {
        match self {
            MatchMode::Contains => MatchMode::StartsWith,
            MatchMode::StartsWith => MatchMode::Equals,
            MatchMode::Equals => MatchMode::Contains,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MatchMode::Contains => "contains",
            MatchMode::StartsWith => "starts with",
            MatchMode::Equals => "equals",
        }
    }

    fn matches(&self, haystack: &str, needle: &str) -> bool {
        match self {
            MatchMode::Contains => haystack.contains(needle),
            MatchMode::StartsWith => haystack.starts_with(needle),
            MatchMode::Equals => haystack == needle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnFilter {
    pub text: String,
    pub mode: MatchMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DateRange {
    pub column: String,
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    fn bounds(&self) -> (NaiveDateTime, NaiveDateTime) {
        let start = self
            .start
            .and_hms_opt(0, 0, 0)
            .unwrap_or(NaiveDateTime::MIN);
        let end = match self.end {
            Some(end) => end
                .and_hms_milli_opt(23, 59, 59, 999)
                .unwrap_or(NaiveDateTime::MAX),
            None => NaiveDateTime::MAX,
        };
        (start, end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub column: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterState {
    pub global_text: String,
    pub per_column: BTreeMap<String, ColumnFilter>,
    pub date_range: Option<DateRange>,
    pub sort: Option<SortKey>,
}

impl FilterState {
    pub fn set_column_filter(&mut self, column: &str, text: &str) {
        let entry = self.per_column.entry(column.to_string()).or_default();
        entry.text = text.to_string();
    }

    pub fn cycle_match_mode(&mut self, column: &str) -> MatchMode {
        let entry = self.per_column.entry(column.to_string()).or_default();
        entry.mode = entry.mode.next();
        entry.mode
    }

    pub fn clear(&mut self) {
        *self = FilterState::default();
    }

    pub fn is_active(&self) -> bool {
        !self.global_text.is_empty()
            || self.per_column.values().any(|f| !f.text.is_empty())
            || self.date_range.is_some()
    }

    fn global_match(
        &self,
        row: &RowRecord,
        schema: &Schema,
        hidden: &HashSet<String>,
        needle: &str,
    ) -> bool {
        needle.is_empty()
            || schema
                .columns()
                .iter()
                .filter(|c| !hidden.contains(&c.name))
                .any(|c| row.display(&c.name).to_lowercase().contains(needle))
    }

    fn column_match(&self, row: &RowRecord) -> bool {
        self.per_column.iter().all(|(column, filter)| {
            filter.text.is_empty()
                || filter.mode.matches(
                    &row.display(column).to_lowercase(),
                    &filter.text.to_lowercase(),
                )
        })
    }

    fn date_match(&self, row: &RowRecord) -> bool {
        match &self.date_range {
            None => true,
            Some(range) => {
                let (start, end) = range.bounds();
                row.get(&range.column)
                    .as_date()
                    .is_some_and(|d| d >= start && d <= end)
            }
        }
    }

    fn matches(&self, row: &RowRecord, schema: &Schema, hidden: &HashSet<String>) -> bool {
        let needle = self.global_text.to_lowercase();
        self.global_match(row, schema, hidden, &needle)
            && self.column_match(row)
            && self.date_match(row)
    }

    /// Indices into `rows` of the rows to display, in display order.
    pub fn apply(&self, rows: &[RowRecord], schema: &Schema) -> Vec<usize> {
        self.apply_visible(rows, schema, &HashSet::new())
    }

    /// Like `apply`, but the global text ignores `hidden` columns.
    pub fn apply_visible(
        &self,
        rows: &[RowRecord],
        schema: &Schema,
        hidden: &HashSet<String>,
    ) -> Vec<usize> {
        let mut indices: Vec<usize> = rows
            .par_iter()
            .enumerate()
            .filter(|(_, row)| self.matches(row, schema, hidden))
            .map(|(idx, _)| idx)
            .collect();

        if let Some(sort) = &self.sort {
            // sort_by is stable, ties keep insertion order
            indices.sort_by(|&a, &b| {
                let (va, vb) = (rows[a].get(&sort.column), rows[b].get(&sort.column));
                match (va.is_null(), vb.is_null()) {
                    (true, true) => std::cmp::Ordering::Equal,
                    (true, false) => std::cmp::Ordering::Greater,
                    (false, true) => std::cmp::Ordering::Less,
                    (false, false) => match sort.direction {
                        SortDirection::Ascending => va.compare(vb),
                        SortDirection::Descending => vb.compare(va),
                    },
                }
            });
        }
        trace!("Filter kept {} of {} rows", indices.len(), rows.len());
        indices
    }
}
