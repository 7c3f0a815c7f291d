use tracing::{debug, info};

use crate::domain::DashError;
use crate::record::{CellValue, RowId, RowRecord};
use crate::storage::{LocalStorage, TABLE_DATA_KEY};

/// Rows of the current page. Optionally mirrored to `tableData` in local storage.
#[derive(Debug, Default)]
pub struct RowStore {
    rows: Vec<RowRecord>,
    mirror: Option<LocalStorage>,
}

impl RowStore {
    pub fn new(rows: Vec<RowRecord>) -> Self {
        Self { rows, mirror: None }
    }

    pub fn with_mirror(mut self, storage: LocalStorage) -> Self {
        self.mirror = Some(storage);
        self
    }

    /// Rows stored by an earlier session, if any.
    pub fn load_mirrored(storage: &LocalStorage) -> Result<Option<Vec<RowRecord>>, DashError> {
        let rows: Option<Vec<RowRecord>> = storage.get(TABLE_DATA_KEY)?;
        if let Some(rows) = &rows {
            info!("Loaded {} rows from {}", rows.len(), storage.root().display());
        }
        Ok(rows)
    }

    pub fn rows(&self) -> &[RowRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirror.is_some()
    }

    pub fn get(&self, id: &RowId) -> Option<&RowRecord> {
        self.rows.iter().find(|r| &r.id == id)
    }

    pub fn contains(&self, id: &RowId) -> bool {
        self.get(id).is_some()
    }

    pub fn get_mut(&mut self, id: &RowId) -> Option<&mut RowRecord> {
        self.rows.iter_mut().find(|r| &r.id == id)
    }

    /// Write one already validated cell. Returns false for unknown rows.
    pub fn update_cell(&mut self, id: &RowId, column: &str, value: CellValue) -> bool {
        match self.get_mut(id) {
            Some(row) => {
                debug!("Row {id}: {column} <- {}", value.to_display());
                row.set(column, value);
                true
            }
            None => false,
        }
    }

    /// Mirror all rows to local storage. No-op without a mirror.
    pub fn persist(&self) -> Result<(), DashError> {
        if let Some(storage) = &self.mirror {
            storage.set(TABLE_DATA_KEY, &self.rows)?;
            debug!("Persisted {} rows", self.rows.len());
        }
        Ok(())
    }
}
