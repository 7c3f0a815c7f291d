use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{Notification, Severity};
use crate::record::{CellValue, WorkflowStatus};
use crate::schema::{STATUS_COLUMN, STATUS_REASON_COLUMN};
use crate::store::RowStore;
use crate::table::SelectionSet;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkflowError {
    #[error("No rows selected!")]
    NothingSelected,
    #[error("Cannot approve rejected records!")]
    RejectedInSelection,
    #[error("Cannot reject already rejected records!")]
    AlreadyRejected,
    #[error("Status Reason is required for rejection!")]
    MissingReason,
}

impl WorkflowError {
    pub fn to_notification(&self) -> Notification {
        let summary = match self {
            WorkflowError::MissingReason => "Validation Error",
            _ => "Action Not Allowed",
        };
        Notification::new(Severity::Warning, summary, self.to_string())
    }
}

fn any_rejected(store: &RowStore, selection: &SelectionSet) -> bool {
    selection
        .iter()
        .filter_map(|id| store.get(id))
        .any(|row| row.status() == Some(WorkflowStatus::Rejected))
}

fn check_selection(store: &RowStore, selection: &SelectionSet) -> Result<(), WorkflowError> {
    if selection.iter().all(|id| !store.contains(id)) {
        return Err(WorkflowError::NothingSelected);
    }
    Ok(())
}

/// Checks done before asking the operator for a rejection reason.
pub fn can_reject(store: &RowStore, selection: &SelectionSet) -> Result<(), WorkflowError> {
    check_selection(store, selection)?;
    if any_rejected(store, selection) {
        return Err(WorkflowError::AlreadyRejected);
    }
    Ok(())
}

fn commit(
    store: &mut RowStore,
    selection: &mut SelectionSet,
    status: WorkflowStatus,
    reason: &str,
) -> Notification {
    let mut changed = 0;
    for id in selection.iter() {
        if let Some(row) = store.get_mut(id) {
            row.set(STATUS_COLUMN, CellValue::text(status.as_str()));
            row.set(STATUS_REASON_COLUMN, CellValue::text(reason));
            changed += 1;
        }
    }
    selection.clear();
    info!("Set {changed} rows to {}", status.as_str());

    let detail = format!("Status updated to {}!", status.as_str());
    match store.persist() {
        Ok(()) => Notification::success(detail),
        Err(e) => {
            warn!("Could not persist rows after workflow action: {e}");
            Notification::new(
                Severity::Warning,
                "Saved in memory only",
                format!("{detail} Persisting failed: {e}"),
            )
        }
    }
}

/// Approve every selected row. Refused as a whole when any selected row is Rejected.
pub fn approve(
    store: &mut RowStore,
    selection: &mut SelectionSet,
) -> Result<Notification, WorkflowError> {
    check_selection(store, selection)?;
    if any_rejected(store, selection) {
        return Err(WorkflowError::RejectedInSelection);
    }
    let approved = WorkflowStatus::Approved.as_str();
    Ok(commit(store, selection, WorkflowStatus::Approved, approved))
}

/// Reject every selected row with the given reason.
pub fn reject(
    store: &mut RowStore,
    selection: &mut SelectionSet,
    reason: &str,
) -> Result<Notification, WorkflowError> {
    can_reject(store, selection)?;
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(WorkflowError::MissingReason);
    }
    Ok(commit(store, selection, WorkflowStatus::Rejected, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RowId, RowRecord};
    use crate::storage::LocalStorage;
    use std::collections::BTreeMap;

    fn row(id: &str, kyc_type: &str, status: &str) -> RowRecord {
        let mut fields = BTreeMap::new();
        fields.insert("kyc_type".to_string(), CellValue::text(kyc_type));
        fields.insert("status".to_string(), CellValue::text(status));
        RowRecord::new(id, fields)
    }

    fn select(ids: &[&str]) -> SelectionSet {
        let mut selection = SelectionSet::default();
        for id in ids {
            selection.toggle(RowId::from(*id));
        }
        selection
    }

    #[test]
    fn approve_then_reject_without_reason() {
        let mut store = RowStore::new(vec![row("1", "aadhaar", "Pending")]);
        let mut selection = select(&["1"]);

        let note = approve(&mut store, &mut selection).unwrap();
        assert_eq!(note.detail, "Status updated to Approved!");
        let stored = store.get(&RowId::from("1")).unwrap();
        assert_eq!(stored.display("status"), "Approved");
        assert_eq!(stored.display("status_reason"), "Approved");
        assert_eq!(stored.display("kyc_type"), "aadhaar");
        assert!(selection.is_empty());

        let mut store = RowStore::new(vec![row("1", "aadhaar", "Pending")]);
        let mut selection = select(&["1"]);
        let err = reject(&mut store, &mut selection, "").unwrap_err();
        assert_eq!(err.to_string(), "Status Reason is required for rejection!");
        assert_eq!(store.get(&RowId::from("1")).unwrap().display("status"), "Pending");
        assert_eq!(selection.len(), 1);
    }

    #[test]
    fn approve_with_rejected_row_changes_nothing() {
        let rows = vec![row("1", "pan", "Pending"), row("2", "pan", "Rejected")];
        let mut store = RowStore::new(rows.clone());
        let mut selection = select(&["1", "2"]);

        let err = approve(&mut store, &mut selection).unwrap_err();
        assert_eq!(err, WorkflowError::RejectedInSelection);
        assert_eq!(err.to_notification().summary, "Action Not Allowed");
        assert_eq!(store.rows(), rows.as_slice());
        assert_eq!(selection.len(), 2);
    }

    #[test]
    fn reject_sets_reason_and_refuses_double_rejection() {
        let mut store = RowStore::new(vec![row("1", "pan", "Pending"), row("2", "pan", "Approved")]);
        let mut selection = select(&["1", "2"]);
        reject(&mut store, &mut selection, "  blurry scan ").unwrap();
        for id in ["1", "2"] {
            let r = store.get(&RowId::from(id)).unwrap();
            assert_eq!(r.status(), Some(WorkflowStatus::Rejected));
            assert_eq!(r.display("status_reason"), "blurry scan");
        }

        let mut selection = select(&["2"]);
        assert_eq!(can_reject(&store, &selection), Err(WorkflowError::AlreadyRejected));
        assert_eq!(
            reject(&mut store, &mut selection, "again"),
            Err(WorkflowError::AlreadyRejected)
        );
    }

    #[test]
    fn empty_selection_is_refused() {
        let mut store = RowStore::new(vec![row("1", "pan", "Pending")]);
        let mut selection = SelectionSet::default();
        assert_eq!(approve(&mut store, &mut selection), Err(WorkflowError::NothingSelected));
    }

    #[test]
    fn workflow_persists_mirrored_rows() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        let mut store = RowStore::new(vec![row("1", "pan", "Pending")]).with_mirror(storage.clone());
        let mut selection = select(&["1"]);
        approve(&mut store, &mut selection).unwrap();

        let loaded = RowStore::load_mirrored(&storage).unwrap().unwrap();
        assert_eq!(loaded[0].status(), Some(WorkflowStatus::Approved));
    }
}
