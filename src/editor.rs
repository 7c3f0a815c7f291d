use chrono::Duration;
use ratatui::crossterm::event::{KeyCode, KeyEvent};
use tracing::{debug, trace};

use crate::inputter::Inputter;
use crate::record::{DATE_FORMAT, RowId, RowRecord};
use crate::schema::{ColumnDescriptor, DisplayType, Schema};
use crate::store::RowStore;
use crate::validation::{parse_external_date, validate};

enum EditorKind {
    Text(Inputter),
    Date(Inputter),
    Choice { choices: Vec<String>, selected: usize },
}

/// What the key did to the editor.
#[derive(Debug, PartialEq)]
pub enum EditEvent {
    Continue,
    Commit,
    Cancel,
}

#[derive(Debug, PartialEq)]
pub enum CommitOutcome {
    /// Value written to the store, back to viewing.
    Committed,
    /// Input equals the stored value, back to viewing without a write.
    Unchanged,
    /// Still editing; the message is shown next to the cell.
    Invalid(String),
}

/// The one cell currently in `Editing`. All other cells are `Viewing`.
pub struct CellEditor {
    pub row: RowId,
    pub column: String,
    original: String,
    kind: EditorKind,
    pub error: Option<String>,
}

fn date_char(c: char) -> bool {
    c.is_ascii_digit() || c == '-'
}

impl CellEditor {
    /// Start editing; `None` when the column is read only.
    pub fn begin(row: &RowRecord, column: &ColumnDescriptor) -> Option<Self> {
        if !column.editable {
            trace!("Column {} is not editable", column.name);
            return None;
        }
        let original = row.display(&column.name);
        let kind = match column.display_type {
            DisplayType::Enum => {
                let choices = column.choices().to_vec();
                let selected = choices
                    .iter()
                    .position(|c| c.eq_ignore_ascii_case(&original))
                    .unwrap_or(0);
                EditorKind::Choice { choices, selected }
            }
            DisplayType::Date => {
                let mut input = Inputter::restricted(date_char, DATE_FORMAT_LEN);
                input.set(&original);
                EditorKind::Date(input)
            }
            DisplayType::String | DisplayType::Number => {
                let mut input = Inputter::default();
                input.set(&original);
                EditorKind::Text(input)
            }
        };
        debug!("Editing {}:{}", row.id, column.name);
        Some(CellEditor {
            row: row.id.clone(),
            column: column.name.clone(),
            original,
            kind,
            error: None,
        })
    }

    pub fn value(&self) -> String {
        match &self.kind {
            EditorKind::Text(input) | EditorKind::Date(input) => input.value().to_string(),
            EditorKind::Choice { choices, selected } => {
                choices.get(*selected).cloned().unwrap_or_default()
            }
        }
    }

    pub fn cursor(&self) -> Option<usize> {
        match &self.kind {
            EditorKind::Text(input) | EditorKind::Date(input) => Some(input.get().curser_pos),
            EditorKind::Choice { .. } => None,
        }
    }

    pub fn is_choice(&self) -> bool {
        matches!(self.kind, EditorKind::Choice { .. })
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> EditEvent {
        match key.code {
            KeyCode::Enter | KeyCode::Tab => return EditEvent::Commit,
            KeyCode::Esc => return EditEvent::Cancel,
            _ => {}
        }
        match &mut self.kind {
            EditorKind::Choice { choices, selected } if !choices.is_empty() => match key.code {
                KeyCode::Up | KeyCode::Left => {
                    *selected = (*selected + choices.len() - 1) % choices.len();
                }
                KeyCode::Down | KeyCode::Right | KeyCode::Char(' ') => {
                    *selected = (*selected + 1) % choices.len();
                }
                _ => {}
            },
            EditorKind::Choice { .. } => {}
            EditorKind::Date(input) => match key.code {
                KeyCode::Up => step_date(input, 1),
                KeyCode::Down => step_date(input, -1),
                _ => {
                    input.read(key);
                }
            },
            EditorKind::Text(input) => {
                input.read(key);
            }
        }
        EditEvent::Continue
    }

    /// Validate the input and write it to the store on success.
    pub fn commit(&mut self, store: &mut RowStore, schema: &Schema) -> CommitOutcome {
        let value = self.value();
        if value == self.original {
            return CommitOutcome::Unchanged;
        }
        match validate(&value, &self.column, schema) {
            Ok(cell) => {
                if store.update_cell(&self.row, &self.column, cell) {
                    self.error = None;
                    CommitOutcome::Committed
                } else {
                    let message = "Row no longer exists".to_string();
                    self.error = Some(message.clone());
                    CommitOutcome::Invalid(message)
                }
            }
            Err(e) => {
                debug!("Rejected edit of {}:{}: {e}", self.row, self.column);
                self.error = Some(e.0.clone());
                CommitOutcome::Invalid(e.0)
            }
        }
    }
}

const DATE_FORMAT_LEN: usize = 10;

fn step_date(input: &mut Inputter, days: i64) {
    if let Some(date) = parse_external_date(input.value()) {
        let stepped = date + Duration::days(days);
        input.set(&stepped.format(DATE_FORMAT).to_string());
    }
}
