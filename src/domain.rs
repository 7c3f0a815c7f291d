use std::path::PathBuf;

use clap::ValueEnum;
use derive_setters::Setters;
use ratatui::crossterm::event::KeyEvent;
use thiserror::Error;

pub const HELP_TEXT: &str = "\
Navigation
  arrows / hjkl     move cursor
  PgUp / PgDn       previous / next page
  Home / End        first / last row of page
  g                 back to page list
  Enter             open page (page list)

Filtering
  /                 global search
  f                 filter current column
  m                 cycle match mode of current column filter
  d                 date range on current column (DD-MM-YYYY..DD-MM-YYYY)
  s / S             sort current column ascending / descending
  u                 remove sorting
  c                 clear all filters, sorting and selection

Rows
  Space             toggle row selection
  a                 toggle selection of all filtered rows
  e                 edit current cell (Enter/Tab commit, Esc cancel)
  A                 approve selected rows
  X                 reject selected rows (asks for a reason)
  n                 set rows per page
  v                 hide / show current column, V shows all

Other
  r                 retry loading the page
  R                 refetch rows from the backend
  L                 sign out
  ?                 this help
  q                 quit";

/// Errors that end a load or the application. Cell and workflow failures
/// have their own types and never reach this enum.
#[derive(Debug, Error)]
pub enum DashError {
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("http error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("backend answered with status {0}")]
    BadStatus(u16),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("storage error: {0}")]
    StorageError(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

/// A short message for the status line.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
}

impl Notification {
    pub fn new(severity: Severity, summary: &str, detail: impl Into<String>) -> Self {
        Self {
            severity,
            summary: summary.to_string(),
            detail: detail.into(),
        }
    }

    pub fn success(detail: impl Into<String>) -> Self {
        Self::new(Severity::Success, "Success", detail)
    }

    pub fn info(detail: impl Into<String>) -> Self {
        Self::new(Severity::Info, "Info", detail)
    }

    pub fn error(summary: &str, detail: impl Into<String>) -> Self {
        Self::new(Severity::Error, summary, detail)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CMDMode {
    Username,
    Otp,
    GlobalFilter,
    ColumnFilter,
    DateRange,
    PageSize,
    RejectReason,
}

impl CMDMode {
    pub fn prompt(&self) -> &'static str {
        match self {
            CMDMode::Username => "Username: ",
            CMDMode::Otp => "OTP: ",
            CMDMode::GlobalFilter => "Search all: ",
            CMDMode::ColumnFilter => "Filter column: ",
            CMDMode::DateRange => "Date range: ",
            CMDMode::PageSize => "Rows per page: ",
            CMDMode::RejectReason => "Reason for rejection: ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    MovePageUp,
    MovePageDown,
    MoveBeginning,
    MoveEnd,
    Enter,
    Exit,
    Help,
    Resize(usize, usize),
    RawKey(KeyEvent),
    Tick,
    Search,
    Filter,
    CycleMatchMode,
    DateRange,
    SortAscending,
    SortDescending,
    ClearSort,
    ClearFilters,
    ToggleSelect,
    ToggleSelectAll,
    EditCell,
    Approve,
    Reject,
    PageSize,
    ToggleColumn,
    ShowAllColumns,
    Retry,
    Refetch,
    Pages,
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, ValueEnum)]
pub enum PersistMode {
    /// Rows are mirrored to the `tableData` storage key after every change.
    #[default]
    Local,
    /// Rows live in memory only and are refetched on every page load.
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, ValueEnum)]
pub enum AuthMode {
    /// Login and OTP verification against the schema service.
    #[default]
    Remote,
    /// Any username, fixed OTP.
    Local,
}

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct DashConfig {
    #[setters(into)]
    pub tenant: String,
    #[setters(strip_option)]
    pub start_page: Option<String>,
    #[setters(into)]
    pub schema_url: String,
    #[setters(into)]
    pub data_url: String,
    pub storage_dir: PathBuf,
    pub persist: PersistMode,
    pub auth: AuthMode,
    #[setters(into)]
    pub local_otp: String,
    #[setters(into)]
    pub mobile_number: String,
    pub session_minutes: u64,
    pub page_size: usize,
    pub max_column_width: usize,
    pub event_poll_time: u64,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            tenant: "bluboy".to_string(),
            start_page: None,
            schema_url: "http://localhost:8080/api/v1".to_string(),
            data_url: "http://localhost:8081/api/v1/page-data".to_string(),
            storage_dir: PathBuf::from(".pagedesk"),
            persist: PersistMode::Local,
            auth: AuthMode::Remote,
            local_otp: "123456".to_string(),
            mobile_number: "9676000000".to_string(),
            session_minutes: 30,
            page_size: 10,
            max_column_width: 24,
            event_poll_time: 100,
        }
    }
}
