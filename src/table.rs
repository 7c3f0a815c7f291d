use std::collections::{BTreeSet, HashSet};

use chrono::NaiveDate;
use tracing::{debug, info, trace};

use crate::domain::{Notification, Severity};
use crate::editor::{CellEditor, CommitOutcome, EditEvent};
use crate::filter::{DateRange, FilterState, MatchMode, SortDirection, SortKey};
use crate::record::{RowId, RowRecord};
use crate::schema::{ColumnDescriptor, DisplayType, Schema};
use crate::store::RowStore;
use crate::validation::parse_external_date;
use crate::workflow::{self, WorkflowError};

use ratatui::crossterm::event::KeyEvent;

/// Ids of checked rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionSet {
    ids: BTreeSet<RowId>,
}

impl SelectionSet {
    pub fn toggle(&mut self, id: RowId) {
        if !self.ids.remove(&id) {
            self.ids.insert(id);
        }
    }

    pub fn contains(&self, id: &RowId) -> bool {
        self.ids.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RowId> {
        self.ids.iter()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn replace(&mut self, ids: impl IntoIterator<Item = RowId>) {
        self.ids = ids.into_iter().collect();
    }

    /// Drop ids whose rows are gone from the store.
    pub fn retain_existing(&mut self, store: &RowStore) {
        self.ids.retain(|id| store.contains(id));
    }
}

/// Page size and current page over the filtered rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Pager {
    page_size: usize,
    page: usize,
}

impl Pager {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            page: 0,
        }
    }

    /// The page size in effect for `total` rows, never above the row count.
    pub fn page_size(&self, total: usize) -> usize {
        std::cmp::min(self.page_size, total.max(1))
    }

    pub fn page(&self) -> usize {
        self.page
    }

    /// Bounded to `[1, total]`; always returns to the first page.
    pub fn set_page_size(&mut self, requested: usize, total: usize) -> usize {
        self.page_size = requested.clamp(1, total.max(1));
        self.page = 0;
        self.page_size
    }

    pub fn reset(&mut self) {
        self.page = 0;
    }

    pub fn page_count(&self, total: usize) -> usize {
        total.div_ceil(self.page_size).max(1)
    }

    pub fn next(&mut self, total: usize) -> bool {
        if self.page + 1 < self.page_count(total) {
            self.page += 1;
            true
        } else {
            false
        }
    }

    pub fn prev(&mut self) -> bool {
        if self.page > 0 {
            self.page -= 1;
            true
        } else {
            false
        }
    }

    pub fn range(&self, total: usize) -> std::ops::Range<usize> {
        let start = std::cmp::min(self.page * self.page_size, total);
        let end = std::cmp::min(start + self.page_size, total);
        start..end
    }
}

/// Parse `DD-MM-YYYY..DD-MM-YYYY` or `DD-MM-YYYY..` (open end).
pub fn parse_date_range(input: &str) -> Result<(NaiveDate, Option<NaiveDate>), String> {
    let (start, end) = match input.split_once("..") {
        Some((start, end)) => (start.trim(), end.trim()),
        None => (input.trim(), ""),
    };
    let start = parse_external_date(start)
        .ok_or_else(|| format!("Start date \"{start}\" must be a valid DD-MM-YYYY date"))?;
    let end = if end.is_empty() {
        None
    } else {
        let end = parse_external_date(end)
            .ok_or_else(|| format!("End date \"{end}\" must be a valid DD-MM-YYYY date"))?;
        if end < start {
            return Err("End date is before start date".to_string());
        }
        Some(end)
    };
    Ok((start, end))
}

/// One opened page: schema, rows and everything the operator did to the view.
pub struct TableView {
    pub name: String,
    pub schema: Schema,
    pub store: RowStore,
    pub filter: FilterState,
    pub selection: SelectionSet,
    pub pager: Pager,
    pub editor: Option<CellEditor>,
    hidden: HashSet<String>,
    filtered: Vec<usize>, // store indices of rows that pass the filter, display order
    pub curser_row: usize, // row within the current page
    pub curser_column: usize, // index into visible columns
    pub offset_column: usize,
}

impl TableView {
    pub fn new(name: &str, schema: Schema, store: RowStore, page_size: usize) -> Self {
        let mut table = TableView {
            name: name.to_string(),
            schema,
            store,
            filter: FilterState::default(),
            selection: SelectionSet::default(),
            pager: Pager::new(page_size),
            editor: None,
            hidden: HashSet::new(),
            filtered: Vec::new(),
            curser_row: 0,
            curser_column: 0,
            offset_column: 0,
        };
        table.refresh();
        info!("Opened page {} with {} rows", name, table.store.len());
        table
    }

    /// Recompute the filtered row order. Call after any change of rows or filters.
    pub fn refresh(&mut self) {
        self.filtered = self
            .filter
            .apply_visible(self.store.rows(), &self.schema, &self.hidden);
        self.selection.retain_existing(&self.store);
        self.clamp_cursor();
    }

    fn filters_changed(&mut self) {
        self.pager.reset();
        self.curser_row = 0;
        self.refresh();
    }

    fn clamp_cursor(&mut self) {
        let on_page = self.page_rows().len();
        self.curser_row = std::cmp::min(self.curser_row, on_page.saturating_sub(1));
        let visible = self.visible_columns().len();
        self.curser_column = std::cmp::min(self.curser_column, visible.saturating_sub(1));
        self.offset_column = std::cmp::min(self.offset_column, self.curser_column);
    }

    pub fn filtered_count(&self) -> usize {
        self.filtered.len()
    }

    /// Store rows shown on the current page.
    pub fn page_rows(&self) -> Vec<&RowRecord> {
        let rows = self.store.rows();
        self.filtered[self.pager.range(self.filtered.len())]
            .iter()
            .map(|&idx| &rows[idx])
            .collect()
    }

    pub fn visible_columns(&self) -> Vec<&ColumnDescriptor> {
        self.schema
            .columns()
            .iter()
            .filter(|c| !self.hidden.contains(&c.name))
            .collect()
    }

    /// Render width of each visible column on the current page, capped at `max_width`.
    pub fn column_widths(&self, max_width: usize) -> Vec<usize> {
        let rows = self.page_rows();
        self.visible_columns()
            .iter()
            .map(|c| {
                let widest = rows
                    .iter()
                    .map(|r| r.display(&c.name).chars().count())
                    .max()
                    .unwrap_or(0);
                std::cmp::max(widest, c.header.chars().count()).clamp(1, max_width.max(1))
            })
            .collect()
    }

    pub fn current_column(&self) -> Option<&ColumnDescriptor> {
        self.visible_columns().get(self.curser_column).copied()
    }

    pub fn current_row(&self) -> Option<&RowRecord> {
        self.page_rows().get(self.curser_row).copied()
    }

    // -------------------- Filtering ---------------------- //

    pub fn set_global_filter(&mut self, text: &str) {
        self.filter.global_text = text.to_string();
        self.filters_changed();
    }

    pub fn set_column_filter(&mut self, text: &str) -> Option<String> {
        let column = self.current_column()?.name.clone();
        self.filter.set_column_filter(&column, text);
        self.filters_changed();
        Some(column)
    }

    pub fn column_filter_text(&self) -> String {
        self.current_column()
            .and_then(|c| self.filter.per_column.get(&c.name))
            .map(|f| f.text.clone())
            .unwrap_or_default()
    }

    pub fn cycle_match_mode(&mut self) -> Option<MatchMode> {
        let column = self.current_column()?.name.clone();
        let mode = self.filter.cycle_match_mode(&column);
        self.filters_changed();
        Some(mode)
    }

    pub fn set_date_range(&mut self, input: &str) -> Result<(), String> {
        let column = self
            .current_column()
            .filter(|c| c.display_type == DisplayType::Date)
            .map(|c| c.name.clone())
            .ok_or_else(|| "Date range filters need a date column".to_string())?;
        if input.trim().is_empty() {
            self.filter.date_range = None;
        } else {
            let (start, end) = parse_date_range(input)?;
            self.filter.date_range = Some(DateRange { column, start, end });
        }
        self.filters_changed();
        Ok(())
    }

    pub fn sort_current_column(&mut self, direction: SortDirection) {
        if let Some(column) = self.current_column() {
            self.filter.sort = Some(SortKey {
                column: column.name.clone(),
                direction,
            });
            self.refresh();
        }
    }

    pub fn clear_sort(&mut self) {
        self.filter.sort = None;
        self.refresh();
    }

    /// Reset every filter and the sort, and uncheck all rows.
    pub fn clear_filters(&mut self) {
        self.filter.clear();
        self.selection.clear();
        self.filters_changed();
        debug!("Filters cleared on {}", self.name);
    }

    // -------------------- Pagination ---------------------- //

    pub fn page_size(&self) -> usize {
        self.pager.page_size(self.filtered.len())
    }

    pub fn set_page_size(&mut self, requested: usize) -> usize {
        let size = self.pager.set_page_size(requested, self.filtered.len());
        self.curser_row = 0;
        self.clamp_cursor();
        size
    }

    pub fn next_page(&mut self) {
        if self.pager.next(self.filtered.len()) {
            self.curser_row = 0;
        }
    }

    pub fn prev_page(&mut self) {
        if self.pager.prev() {
            self.curser_row = 0;
        }
    }

    // -------------------- Columns ---------------------- //

    pub fn toggle_current_column(&mut self) -> Option<String> {
        let visible = self.visible_columns().len();
        let name = self.current_column()?.name.clone();
        if visible <= 1 {
            return None;
        }
        self.hidden.insert(name.clone());
        self.visibility_changed();
        Some(name)
    }

    pub fn show_all_columns(&mut self) {
        self.hidden.clear();
        self.visibility_changed();
    }

    // the global filter only searches visible columns
    fn visibility_changed(&mut self) {
        if self.filter.global_text.is_empty() {
            self.clamp_cursor();
        } else {
            self.filters_changed();
        }
    }

    pub fn hidden_count(&self) -> usize {
        self.hidden.len()
    }

    // -------------------- Selection ---------------------- //

    pub fn toggle_current_row(&mut self) {
        if let Some(id) = self.current_row().map(|r| r.id.clone()) {
            trace!("Toggle selection of {id}");
            self.selection.toggle(id);
        }
    }

    /// Header checkbox: checked iff every filtered row is selected.
    /// Header checkbox: every filtered row is selected.
    pub fn all_selected(&self) -> bool {
        let rows = self.store.rows();
        !self.filtered.is_empty()
            && self.selection.len() >= self.filtered.len()
            && self.filtered.iter().all(|&i| self.selection.contains(&rows[i].id))
    }

    pub fn toggle_select_all(&mut self) {
        if self.all_selected() {
            self.selection.clear();
        } else {
            let rows = self.store.rows();
            let ids: Vec<RowId> = self.filtered.iter().map(|&i| rows[i].id.clone()).collect();
            self.selection.replace(ids);
        }
    }

    // -------------------- Editing ---------------------- //

    pub fn begin_edit(&mut self) -> Result<(), String> {
        let column = self.current_column().ok_or("No column selected")?;
        let row = self.current_row().ok_or("No row selected")?;
        let editor = CellEditor::begin(row, column)
            .ok_or_else(|| format!("{} is not editable", column.header))?;
        self.editor = Some(editor);
        Ok(())
    }

    /// Feed a key to the active editor. Returns a notification when the edit ended.
    pub fn edit_key(&mut self, key: KeyEvent) -> Option<Notification> {
        let editor = self.editor.as_mut()?;
        match editor.handle_key(key) {
            EditEvent::Continue => None,
            EditEvent::Cancel => {
                self.editor = None;
                None
            }
            EditEvent::Commit => match editor.commit(&mut self.store, &self.schema) {
                CommitOutcome::Unchanged => {
                    self.editor = None;
                    None
                }
                CommitOutcome::Invalid(message) => {
                    Some(Notification::error("Validation Error", message))
                }
                CommitOutcome::Committed => {
                    self.editor = None;
                    self.refresh();
                    Some(match self.store.persist() {
                        Ok(()) => Notification::success("Data saved successfully!"),
                        Err(e) => Notification::new(
                            Severity::Warning,
                            "Saved in memory only",
                            format!("Persisting failed: {e}"),
                        ),
                    })
                }
            },
        }
    }

    // -------------------- Workflow ---------------------- //

    pub fn approve(&mut self) -> Result<Notification, WorkflowError> {
        let result = workflow::approve(&mut self.store, &mut self.selection);
        self.refresh();
        result
    }

    pub fn can_reject(&self) -> Result<(), WorkflowError> {
        workflow::can_reject(&self.store, &self.selection)
    }

    pub fn reject(&mut self, reason: &str) -> Result<Notification, WorkflowError> {
        let result = workflow::reject(&mut self.store, &mut self.selection, reason);
        self.refresh();
        result
    }

    // -------------------- Cursor ---------------------- //

    pub fn move_up(&mut self) {
        if self.curser_row > 0 {
            self.curser_row -= 1;
        } else if self.pager.prev() {
            self.curser_row = self.page_rows().len().saturating_sub(1);
        }
    }

    pub fn move_down(&mut self) {
        if self.curser_row + 1 < self.page_rows().len() {
            self.curser_row += 1;
        } else if self.pager.next(self.filtered.len()) {
            self.curser_row = 0;
        }
    }

    pub fn move_left(&mut self) {
        self.curser_column = self.curser_column.saturating_sub(1);
        self.offset_column = std::cmp::min(self.offset_column, self.curser_column);
    }

    pub fn move_right(&mut self) {
        if self.curser_column + 1 < self.visible_columns().len() {
            self.curser_column += 1;
        }
    }

    pub fn move_beginning(&mut self) {
        self.curser_row = 0;
    }

    pub fn move_end(&mut self) {
        self.curser_row = self.page_rows().len().saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CellValue;
    use ratatui::crossterm::event::{KeyCode, KeyModifiers};
    use std::collections::BTreeMap;

    fn table() -> TableView {
        let schema = Schema::new(vec![
            ColumnDescriptor::new("name", DisplayType::String),
            ColumnDescriptor::new("createdOn", DisplayType::Date),
            ColumnDescriptor::new("status", DisplayType::String),
        ]);
        let rows = ["Alice", "Bob", "Carol", "Dave", "Erin"]
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let mut fields = BTreeMap::new();
                fields.insert("name".to_string(), CellValue::text(name));
                fields.insert(
                    "createdOn".to_string(),
                    CellValue::Date(
                        crate::record::parse_date(&format!("{:02}-01-2024", i + 1)).unwrap(),
                    ),
                );
                fields.insert("status".to_string(), CellValue::text("Pending"));
                RowRecord::new((i + 1).to_string(), fields)
            })
            .collect();
        TableView::new("kyc", schema, RowStore::new(rows), 2)
    }

    fn names(table: &TableView) -> Vec<String> {
        table.page_rows().iter().map(|r| r.display("name")).collect()
    }

    #[test]
    fn pager_bounds() {
        let mut pager = Pager::new(10);
        assert_eq!(pager.set_page_size(0, 5), 1);
        assert_eq!(pager.set_page_size(50, 5), 5);
        assert_eq!(pager.set_page_size(3, 0), 1);
        pager.set_page_size(2, 5);
        assert_eq!(pager.page_count(5), 3);
        assert!(pager.next(5));
        assert!(pager.next(5));
        assert!(!pager.next(5));
        assert_eq!(pager.range(5), 4..5);
    }

    #[test]
    fn paging_and_filter_changes_reset_to_first_page() {
        let mut t = table();
        assert_eq!(names(&t), ["Alice", "Bob"]);
        t.next_page();
        assert_eq!(names(&t), ["Carol", "Dave"]);

        t.set_global_filter("a");
        assert_eq!(t.pager.page(), 0);
        assert_eq!(t.filtered_count(), 3);
        assert_eq!(names(&t), ["Alice", "Carol"]);

        t.next_page();
        assert_eq!(names(&t), ["Dave"]);
        assert_eq!(t.set_page_size(10), 3);
        assert_eq!(t.pager.page(), 0);
        assert_eq!(names(&t), ["Alice", "Carol", "Dave"]);
    }

    #[test]
    fn header_checkbox_tracks_filtered_rows() {
        let mut t = table();
        t.set_global_filter("a");
        assert_eq!(t.filtered_count(), 3);
        t.toggle_select_all();
        assert!(t.all_selected());
        assert_eq!(t.selection.len(), 3);

        t.set_global_filter("");
        assert!(!t.all_selected());
        t.toggle_select_all();
        assert_eq!(t.selection.len(), 5);
        t.toggle_select_all();
        assert!(t.selection.is_empty());
    }

    #[test]
    fn header_checkbox_needs_the_filtered_rows_themselves() {
        let mut t = table();
        t.toggle_current_row();
        assert_eq!(t.selection.len(), 1);
        t.set_global_filter("erin");
        assert_eq!(t.filtered_count(), 1);
        assert!(!t.all_selected());
        t.toggle_select_all();
        assert!(t.all_selected());
        assert_eq!(t.selection.iter().count(), 1);
    }

    #[test]
    fn page_size_follows_a_shrinking_filter() {
        let mut t = table();
        assert_eq!(t.set_page_size(4), 4);
        t.set_global_filter("bob");
        assert_eq!(t.filtered_count(), 1);
        assert_eq!(t.page_size(), 1);
        t.set_global_filter("");
        assert_eq!(t.page_size(), 4);
        assert_eq!(names(&t).len(), 4);
    }

    #[test]
    fn clear_filters_clears_selection_and_restores_order() {
        let mut t = table();
        t.set_page_size(5);
        t.sort_current_column(SortDirection::Descending);
        t.set_global_filter("o");
        t.toggle_current_row();
        assert_eq!(t.selection.len(), 1);

        t.clear_filters();
        t.clear_filters();
        assert!(t.selection.is_empty());
        assert_eq!(names(&t), ["Alice", "Bob", "Carol", "Dave", "Erin"]);
    }

    #[test]
    fn date_range_on_date_column_only() {
        let mut t = table();
        assert!(t.set_date_range("01-01-2024..02-01-2024").is_err());
        t.move_right();
        t.set_date_range("02-01-2024..03-01-2024").unwrap();
        assert_eq!(t.filtered_count(), 2);
        t.set_date_range("04-01-2024..").unwrap();
        assert_eq!(t.filtered_count(), 2);
        assert!(t.set_date_range("31-02-2024..").is_err());
        assert!(t.set_date_range("05-01-2024..01-01-2024").is_err());
        t.set_date_range("").unwrap();
        assert_eq!(t.filtered_count(), 5);
    }

    #[test]
    fn editing_through_the_table() {
        let mut t = table();
        t.move_right();
        t.begin_edit().unwrap();
        for _ in 0..10 {
            t.edit_key(KeyEvent::new(KeyCode::Backspace, KeyModifiers::NONE));
        }
        for c in "31-02-2024".chars() {
            t.edit_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE));
        }
        let note = t.edit_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)).unwrap();
        assert_eq!(note.summary, "Validation Error");
        assert!(t.editor.is_some());
        assert_eq!(t.current_row().unwrap().display("createdOn"), "01-01-2024");

        t.edit_key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE));
        assert!(t.editor.is_none());
    }

    #[test]
    fn workflow_through_the_table() {
        let mut t = table();
        t.toggle_current_row();
        let note = t.approve().unwrap();
        assert_eq!(note.severity, Severity::Success);
        assert_eq!(t.current_row().unwrap().display("status"), "Approved");
        assert!(t.selection.is_empty());

        t.toggle_current_row();
        assert!(t.can_reject().is_ok());
        assert_eq!(t.reject(" "), Err(WorkflowError::MissingReason));
        t.reject("expired document").unwrap();
        t.toggle_current_row();
        assert_eq!(t.approve(), Err(WorkflowError::RejectedInSelection));
    }

    #[test]
    fn hiding_columns_keeps_one_visible() {
        let mut t = table();
        assert_eq!(t.toggle_current_column().as_deref(), Some("name"));
        assert_eq!(t.toggle_current_column().as_deref(), Some("createdOn"));
        assert_eq!(t.toggle_current_column(), None);
        assert_eq!(t.visible_columns().len(), 1);
        t.show_all_columns();
        assert_eq!(t.visible_columns().len(), 3);
    }

    #[test]
    fn global_filter_skips_hidden_columns() {
        let mut t = table();
        t.set_global_filter("pend");
        assert_eq!(t.filtered_count(), 5);
        t.move_right();
        t.move_right();
        assert_eq!(t.toggle_current_column().as_deref(), Some("status"));
        assert_eq!(t.filtered_count(), 0);
        t.show_all_columns();
        assert_eq!(t.filtered_count(), 5);
    }
}
