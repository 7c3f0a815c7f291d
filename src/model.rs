use std::sync::Arc;
use std::time::{Duration, Instant};

use ratatui::crossterm::event::KeyEvent;
use tracing::{debug, error, info, trace, warn};

use crate::api::Backend;
use crate::domain::{
    CMDMode, DashConfig, DashError, HELP_TEXT, Message, Notification, PersistMode, Severity,
};
use crate::filter::SortDirection;
use crate::inputter::{InputResult, Inputter};
use crate::loader::{LoadOutcome, Loader};
use crate::session::SessionManager;
use crate::storage::LocalStorage;
use crate::store::RowStore;
use crate::table::TableView;
use crate::ui::{CHECKBOX_WIDTH, CMDLINE_HEIGH, COLUMN_WIDTH_MARGIN, FOOTER_HEIGHT, TABLE_HEADER_HEIGHT};

const STATUS_MESSAGE_TTL: Duration = Duration::from_secs(8);

#[derive(Debug, PartialEq)]
pub enum Status {
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    LOGIN,
    PAGES,
    LOADING,
    TABLE,
    ERROR,
    POPUP,
    CMDINPUT,
    EDITING,
}

#[derive(Default, Clone, Debug)]
pub struct UILayout {
    pub width: usize,
    pub height: usize,
    pub table_width: usize,
    pub table_height: usize,
    pub statusline_width: usize,
    pub statusline_height: usize,
}

impl UILayout {
    pub fn from_values(ui_width: usize, ui_height: usize) -> Self {
        let table_width = ui_width.saturating_sub(CHECKBOX_WIDTH);
        let table_height = ui_height.saturating_sub(CMDLINE_HEIGH + TABLE_HEADER_HEIGHT + FOOTER_HEIGHT);
        let layout = UILayout {
            width: ui_width,
            height: ui_height,
            table_width,
            table_height,
            statusline_width: ui_width,
            statusline_height: CMDLINE_HEIGH,
        };
        trace!("Build UILayout: {:?}", layout);
        layout
    }
}

/// What the UI has to draw besides the overlays.
pub enum Screen<'a> {
    Login,
    Pages { pages: &'a [String], selected: usize },
    Loading { what: String },
    Error { message: &'a str },
    Table(&'a TableView),
}

pub struct UIData<'a> {
    pub screen: Screen<'a>,
    pub tenant: &'a str,
    pub user: Option<&'a str>,
    pub session_minutes_left: Option<i64>,
    pub layout: &'a UILayout,
    pub show_popup: bool,
    pub popup_message: &'a str,
    pub cmdinput: &'a InputResult,
    pub cmd_mode: Option<CMDMode>,
    pub active_cmdinput: bool,
    pub notification: Option<&'a Notification>,
}

pub struct Model {
    config: DashConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    sessions: SessionManager,
    loader: Loader,
    storage: LocalStorage,
    pages: Vec<String>,
    page_cursor: usize,
    table: Option<TableView>,
    error_message: String,
    failed_page: Option<String>,
    uilayout: UILayout,
    popup_message: String,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    last_input: InputResult,
    active_cmdinput: bool,
    notification: Option<Notification>,
    last_status_message_update: Instant,
}

impl Model {
    pub fn init(
        config: &DashConfig,
        backend: Arc<dyn Backend>,
        sessions: SessionManager,
        storage: LocalStorage,
        ui_width: usize,
        ui_height: usize,
    ) -> Result<Self, DashError> {
        let mut model = Self {
            config: config.clone(),
            status: Status::READY,
            modus: Modus::LOGIN,
            previous_modus: Modus::LOGIN,
            sessions,
            loader: Loader::new(backend),
            storage,
            pages: Vec::new(),
            page_cursor: 0,
            table: None,
            error_message: String::new(),
            failed_page: None,
            uilayout: UILayout::from_values(ui_width, ui_height),
            popup_message: String::new(),
            input: Inputter::default(),
            cmd_mode: None,
            last_input: InputResult::default(),
            active_cmdinput: false,
            notification: None,
            last_status_message_update: Instant::now(),
        };

        if model.sessions.restore()? {
            let user = model.sessions.user().unwrap_or_default().to_string();
            model.set_status_message(Notification::info(format!("Welcome back {user}")));
            model.after_login();
        } else {
            model.show_login();
        }
        Ok(model)
    }

    fn set_status_message(&mut self, notification: Notification) {
        match notification.severity {
            Severity::Error | Severity::Warning => {
                warn!("{}: {}", notification.summary, notification.detail)
            }
            _ => debug!("{}: {}", notification.summary, notification.detail),
        }
        self.notification = Some(notification);
        self.last_status_message_update = Instant::now();
    }

    pub fn get_uidata(&self) -> UIData<'_> {
        let screen = match self.visible_modus() {
            Modus::LOGIN => Screen::Login,
            Modus::PAGES => Screen::Pages {
                pages: &self.pages,
                selected: self.page_cursor,
            },
            Modus::LOADING => Screen::Loading {
                what: match self.loader.loading_page() {
                    Some(page) => format!("Loading {page} ..."),
                    None => "Loading pages ...".to_string(),
                },
            },
            Modus::ERROR => Screen::Error {
                message: &self.error_message,
            },
            _ => match &self.table {
                Some(table) => Screen::Table(table),
                None => Screen::Login,
            },
        };
        UIData {
            screen,
            tenant: &self.config.tenant,
            user: self.sessions.user(),
            session_minutes_left: self.sessions.remaining().map(|d| d.num_minutes()),
            layout: &self.uilayout,
            show_popup: self.modus == Modus::POPUP,
            popup_message: &self.popup_message,
            cmdinput: &self.last_input,
            cmd_mode: self.cmd_mode,
            active_cmdinput: self.active_cmdinput,
            notification: self
                .notification
                .as_ref()
                .filter(|_| self.last_status_message_update.elapsed() < STATUS_MESSAGE_TTL),
        }
    }

    /// The screen below popups and the command line.
    fn visible_modus(&self) -> Modus {
        match self.modus {
            Modus::POPUP | Modus::CMDINPUT => self.previous_modus,
            Modus::EDITING => Modus::TABLE,
            modus => modus,
        }
    }

    pub fn raw_keyevents(&self) -> bool {
        self.active_cmdinput || self.modus == Modus::EDITING
    }

    pub fn quit(&mut self) {
        info!("Quitting");
        self.status = Status::QUITTING;
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.uilayout.width, width, self.uilayout.height, height
        );
        self.uilayout = UILayout::from_values(width, height);
        self.fit_columns();
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), DashError> {
        let Some(msg) = message else {
            return Ok(());
        };
        if msg == Message::Tick {
            return self.tick();
        }
        match msg {
            Message::Quit if !self.raw_keyevents() => {
                self.quit();
                return Ok(());
            }
            Message::Resize(width, height) => {
                self.ui_resize(width, height);
                return Ok(());
            }
            _ => {}
        }

        match self.modus {
            Modus::LOGIN => match msg {
                Message::Enter => self.show_login(),
                Message::Help => self.show_help(),
                _ => (),
            },
            Modus::PAGES => match msg {
                Message::MoveUp => self.page_cursor = self.page_cursor.saturating_sub(1),
                Message::MoveDown => {
                    if self.page_cursor + 1 < self.pages.len() {
                        self.page_cursor += 1;
                    }
                }
                Message::MoveBeginning => self.page_cursor = 0,
                Message::MoveEnd => self.page_cursor = self.pages.len().saturating_sub(1),
                Message::Enter => {
                    if let Some(page) = self.pages.get(self.page_cursor).cloned() {
                        self.open_page(&page, false);
                    }
                }
                Message::Retry | Message::Refetch => self.load_pages(),
                Message::Logout => self.logout(),
                Message::Help => self.show_help(),
                _ => (),
            },
            Modus::LOADING => match msg {
                Message::Pages | Message::Exit => self.load_pages(),
                Message::Logout => self.logout(),
                _ => (),
            },
            Modus::ERROR => match msg {
                Message::Retry | Message::Enter => self.retry(),
                Message::Pages | Message::Exit => self.load_pages(),
                Message::Logout => self.logout(),
                Message::Help => self.show_help(),
                _ => (),
            },
            Modus::TABLE => self.update_table(msg),
            Modus::POPUP => match msg {
                Message::Exit | Message::Enter | Message::Help => self.exit(),
                _ => (),
            },
            Modus::CMDINPUT => {
                if let Message::RawKey(key) = msg {
                    self.raw_input(key)
                }
            }
            Modus::EDITING => {
                if let Message::RawKey(key) = msg {
                    self.edit_input(key)
                }
            }
        }
        Ok(())
    }

    fn update_table(&mut self, msg: Message) {
        let Some(table) = self.table.as_mut() else {
            return;
        };
        match msg {
            Message::MoveUp => table.move_up(),
            Message::MoveDown => table.move_down(),
            Message::MoveLeft => table.move_left(),
            Message::MoveRight => table.move_right(),
            Message::MovePageUp => table.prev_page(),
            Message::MovePageDown => table.next_page(),
            Message::MoveBeginning => table.move_beginning(),
            Message::MoveEnd => table.move_end(),
            Message::Search => self.enter_cmd_mode(CMDMode::GlobalFilter),
            Message::Filter => self.enter_cmd_mode(CMDMode::ColumnFilter),
            Message::DateRange => self.enter_cmd_mode(CMDMode::DateRange),
            Message::PageSize => self.enter_cmd_mode(CMDMode::PageSize),
            Message::CycleMatchMode => {
                if let Some(mode) = table.cycle_match_mode() {
                    self.set_status_message(Notification::info(format!(
                        "Column filter matches: {}",
                        mode.label()
                    )));
                }
            }
            Message::SortAscending => table.sort_current_column(SortDirection::Ascending),
            Message::SortDescending => table.sort_current_column(SortDirection::Descending),
            Message::ClearSort => table.clear_sort(),
            Message::ClearFilters => {
                table.clear_filters();
                self.set_status_message(Notification::info("Filters cleared"));
            }
            Message::ToggleSelect => table.toggle_current_row(),
            Message::ToggleSelectAll => table.toggle_select_all(),
            Message::EditCell => match table.begin_edit() {
                Ok(()) => self.modus = Modus::EDITING,
                Err(e) => self.set_status_message(Notification::new(
                    Severity::Warning,
                    "Not editable",
                    e,
                )),
            },
            Message::Approve => {
                let notification = match table.approve() {
                    Ok(n) => n,
                    Err(e) => e.to_notification(),
                };
                self.set_status_message(notification);
            }
            Message::Reject => match table.can_reject() {
                Ok(()) => self.enter_cmd_mode(CMDMode::RejectReason),
                Err(e) => self.set_status_message(e.to_notification()),
            },
            Message::ToggleColumn => {
                if table.toggle_current_column().is_none() {
                    self.set_status_message(Notification::new(
                        Severity::Warning,
                        "Columns",
                        "The last visible column cannot be hidden",
                    ));
                }
            }
            Message::ShowAllColumns => table.show_all_columns(),
            Message::Retry => {
                let page = table.name.clone();
                self.open_page(&page, false);
            }
            Message::Refetch => {
                let page = table.name.clone();
                self.open_page(&page, true);
            }
            Message::Pages | Message::Exit => self.load_pages(),
            Message::Logout => self.logout(),
            Message::Help => self.show_help(),
            _ => (),
        }
        self.fit_columns();
    }

    // -------------------- Session ---------------------- //

    fn tick(&mut self) -> Result<(), DashError> {
        if self.sessions.check_expiry()? {
            self.loader.cancel();
            self.table = None;
            self.show_login();
            self.set_status_message(Notification::new(
                Severity::Warning,
                "Session expired",
                "Please sign in again",
            ));
            return Ok(());
        }
        if let Some(outcome) = self.loader.poll() {
            self.loaded(outcome);
        }
        Ok(())
    }

    fn show_login(&mut self) {
        self.modus = Modus::LOGIN;
        self.previous_modus = Modus::LOGIN;
        self.enter_cmd_mode(CMDMode::Username);
    }

    fn after_login(&mut self) {
        match self.config.start_page.clone() {
            Some(page) => self.open_page(&page, false),
            None => self.load_pages(),
        }
    }

    fn logout(&mut self) {
        self.loader.cancel();
        self.table = None;
        self.pages.clear();
        if let Err(e) = self.sessions.sign_out() {
            error!("Removing the stored session failed: {e}");
        }
        self.show_login();
        self.set_status_message(Notification::info("Signed out"));
    }

    // -------------------- Loading ---------------------- //

    fn page_storage(&self, page: &str) -> Option<LocalStorage> {
        if self.config.persist != PersistMode::Local {
            return None;
        }
        match self.storage.scoped(&[&self.config.tenant, page]) {
            Ok(storage) => Some(storage),
            Err(e) => {
                warn!("No local storage for {page}: {e}");
                None
            }
        }
    }

    fn open_page(&mut self, page: &str, refetch: bool) {
        let stored = match (refetch, self.page_storage(page)) {
            (false, Some(storage)) => RowStore::load_mirrored(&storage).unwrap_or_else(|e| {
                warn!("Ignoring stored rows of {page}: {e}");
                None
            }),
            _ => None,
        };
        self.failed_page = Some(page.to_string());
        self.loader.load_page(&self.config.tenant, page, stored);
        self.modus = Modus::LOADING;
    }

    fn load_pages(&mut self) {
        self.failed_page = None;
        self.table = None;
        self.loader.load_pages(&self.config.tenant);
        self.modus = Modus::LOADING;
    }

    fn retry(&mut self) {
        match self.failed_page.clone() {
            Some(page) => self.open_page(&page, false),
            None => self.load_pages(),
        }
    }

    fn loaded(&mut self, outcome: LoadOutcome) {
        match outcome {
            LoadOutcome::Pages(pages) => {
                info!("{} pages for tenant {}", pages.len(), self.config.tenant);
                self.page_cursor = std::cmp::min(self.page_cursor, pages.len().saturating_sub(1));
                self.pages = pages;
                self.modus = Modus::PAGES;
            }
            LoadOutcome::Ready {
                page,
                schema,
                rows,
                from_storage,
            } => {
                let mut store = RowStore::new(rows);
                if let Some(storage) = self.page_storage(&page) {
                    store = store.with_mirror(storage);
                    if !from_storage && let Err(e) = store.persist() {
                        warn!("Could not store rows of {page}: {e}");
                    }
                }
                self.table = Some(TableView::new(&page, schema, store, self.config.page_size));
                self.failed_page = None;
                self.modus = Modus::TABLE;
                self.fit_columns();
            }
            LoadOutcome::Failed { page, error } => {
                self.error_message = match &page {
                    Some(page) => format!("Loading {page} failed: {error}"),
                    None => format!("Loading the page list failed: {error}"),
                };
                self.modus = Modus::ERROR;
                self.set_status_message(Notification::error("Loading failed", error.to_string()));
            }
        }
    }

    // -------------------- Control handling functions ---------------------- //

    fn exit(&mut self) {
        if self.modus == Modus::POPUP {
            trace!("Close popup ...");
            self.modus = self.previous_modus;
            self.previous_modus = Modus::POPUP;
        }
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
        self.popup_message = HELP_TEXT.to_string();
    }

    fn raw_input(&mut self, key: KeyEvent) {
        if self.active_cmdinput {
            self.last_input = self.input.read(key);
            if self.last_input.finished {
                self.handle_cmd_input();
            }
        }
    }

    fn edit_input(&mut self, key: KeyEvent) {
        let Some(table) = self.table.as_mut() else {
            self.modus = Modus::TABLE;
            return;
        };
        let notification = table.edit_key(key);
        if table.editor.is_none() {
            self.modus = Modus::TABLE;
        }
        if let Some(notification) = notification {
            self.set_status_message(notification);
        }
    }

    fn enter_cmd_mode(&mut self, mode: CMDMode) {
        trace!("Entering command mode {mode:?}");
        if self.modus != Modus::CMDINPUT {
            self.previous_modus = self.modus;
        }
        self.modus = Modus::CMDINPUT;
        self.cmd_mode = Some(mode);
        self.active_cmdinput = true;
        self.input = match mode {
            CMDMode::Otp => Inputter::restricted(|c| c.is_ascii_digit(), 6),
            CMDMode::PageSize => Inputter::restricted(|c| c.is_ascii_digit(), 6),
            _ => Inputter::default(),
        };
        let prefill = match (mode, &self.table) {
            (CMDMode::GlobalFilter, Some(table)) => table.filter.global_text.clone(),
            (CMDMode::ColumnFilter, Some(table)) => table.column_filter_text(),
            (CMDMode::PageSize, Some(table)) => table.page_size().to_string(),
            _ => String::new(),
        };
        self.input.set(&prefill);
        self.last_input = self.input.get();
    }

    fn handle_cmd_input(&mut self) {
        trace!("Handle cmd input {:?}", self.cmd_mode);

        self.active_cmdinput = false;
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;
        let cmd_mode = self.cmd_mode.take();

        let cmd_input = self.last_input.input.clone();
        if self.last_input.canceled {
            if let Some(CMDMode::Otp) = cmd_mode {
                self.show_login();
            }
            return;
        }
        match cmd_mode {
            Some(CMDMode::Username) => match self.sessions.login(&cmd_input) {
                Ok(message) => {
                    let message = if message.is_empty() {
                        "OTP sent".to_string()
                    } else {
                        message
                    };
                    self.set_status_message(Notification::info(message));
                    self.enter_cmd_mode(CMDMode::Otp);
                }
                Err(e) => {
                    self.set_status_message(Notification::error("Login failed", e.to_string()));
                    self.enter_cmd_mode(CMDMode::Username);
                }
            },
            Some(CMDMode::Otp) => match self.sessions.verify_otp(&cmd_input) {
                Ok(session) => {
                    self.set_status_message(Notification::success(format!(
                        "Signed in as {}",
                        session.user
                    )));
                    self.after_login();
                }
                Err(e) => {
                    self.set_status_message(Notification::error(
                        "Verification failed",
                        e.to_string(),
                    ));
                    self.enter_cmd_mode(CMDMode::Otp);
                }
            },
            Some(mode) => self.handle_table_input(mode, &cmd_input),
            None => info!("Cmd mode is none!"),
        }
    }

    fn handle_table_input(&mut self, mode: CMDMode, cmd_input: &str) {
        let Some(table) = self.table.as_mut() else {
            return;
        };
        let notification = match mode {
            CMDMode::GlobalFilter => {
                table.set_global_filter(cmd_input);
                None
            }
            CMDMode::ColumnFilter => {
                table.set_column_filter(cmd_input);
                None
            }
            CMDMode::DateRange => table
                .set_date_range(cmd_input)
                .err()
                .map(|e| Notification::new(Severity::Warning, "Date range", e)),
            CMDMode::PageSize => match cmd_input.trim().parse::<usize>() {
                Ok(size) => {
                    let size = table.set_page_size(size);
                    Some(Notification::info(format!("{size} rows per page")))
                }
                Err(_) => Some(Notification::new(
                    Severity::Warning,
                    "Page size",
                    "Rows per page must be a number",
                )),
            },
            CMDMode::RejectReason => Some(match table.reject(cmd_input) {
                Ok(n) => n,
                Err(e) => e.to_notification(),
            }),
            CMDMode::Username | CMDMode::Otp => None,
        };
        if let Some(notification) = notification {
            self.set_status_message(notification);
        }
        self.fit_columns();
    }

    /// Scroll columns so the cursor column is fully visible.
    fn fit_columns(&mut self) {
        let available = self.uilayout.table_width;
        let max_width = self.config.max_column_width;
        let Some(table) = self.table.as_mut() else {
            return;
        };
        let widths = table.column_widths(max_width);
        if widths.is_empty() {
            return;
        }
        let cursor = std::cmp::min(table.curser_column, widths.len() - 1);
        let mut offset = std::cmp::min(table.offset_column, cursor);
        let span = |from: usize| -> usize {
            widths[from..=cursor]
                .iter()
                .map(|w| w + COLUMN_WIDTH_MARGIN)
                .sum()
        };
        while offset < cursor && span(offset) > available {
            offset += 1;
        }
        table.offset_column = offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeBackend;
    use crate::domain::AuthMode;
    use crate::record::WorkflowStatus;
    use crate::session::LocalAuthenticator;
    use crate::session::testing::FixedClock;
    use crate::storage::TABLE_DATA_KEY;
    use chrono::{Duration, TimeZone, Utc};
    use ratatui::crossterm::event::{KeyCode, KeyModifiers};
    use serde_json::json;
    use std::time::Duration as StdDuration;

    struct Harness {
        model: Model,
        clock: FixedClock,
        backend: Arc<FakeBackend>,
        storage: LocalStorage,
        _dir: tempfile::TempDir,
    }

    fn backend() -> FakeBackend {
        FakeBackend {
            schema: Some(json!({"columns": [
                {"name": "kyc_type", "type": "string"},
                {"name": "createdOn", "type": "date"},
                {"name": "status", "type": "string"},
                {"name": "status_reason", "type": "string"}
            ]})),
            rows: Some(json!({"data": [
                {"kyc_type": "aadhaar", "createdOn": "2024-01-05", "status": "Pending"},
                {"kyc_type": "pan", "createdOn": "2024-01-10", "status": "Rejected"}
            ]})),
            pages: vec!["kyc".into(), "payouts".into()],
            ..Default::default()
        }
    }

    fn harness(config: DashConfig) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        let clock = FixedClock::at(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
        let sessions = SessionManager::new(
            storage.clone(),
            Box::new(clock.clone()),
            Box::new(LocalAuthenticator::new(&config.local_otp)),
            config.session_minutes,
        );
        let backend = Arc::new(backend());
        let model = Model::init(&config, backend.clone(), sessions, storage.clone(), 120, 40).unwrap();
        Harness {
            model,
            clock,
            backend,
            storage,
            _dir: dir,
        }
    }

    fn config() -> DashConfig {
        DashConfig::default().with_auth(AuthMode::Local)
    }

    impl Harness {
        fn send(&mut self, msg: Message) {
            self.model.update(Some(msg)).unwrap();
        }

        fn key(&mut self, code: KeyCode) {
            self.send(Message::RawKey(KeyEvent::new(code, KeyModifiers::NONE)));
        }

        fn type_line(&mut self, text: &str) {
            for c in text.chars() {
                self.key(KeyCode::Char(c));
            }
            self.key(KeyCode::Enter);
        }

        fn settle(&mut self) {
            for _ in 0..500 {
                self.send(Message::Tick);
                if !self.model.loader.is_loading() {
                    return;
                }
                std::thread::sleep(StdDuration::from_millis(5));
            }
            panic!("loading did not settle");
        }

        fn sign_in(&mut self) {
            self.type_line("asha");
            self.type_line("123456");
            self.settle();
        }

        fn open_kyc(&mut self) {
            self.sign_in();
            assert_eq!(self.model.modus, Modus::PAGES);
            self.send(Message::Enter);
            self.settle();
            assert_eq!(self.model.modus, Modus::TABLE);
        }

        fn table(&self) -> &TableView {
            self.model.table.as_ref().unwrap()
        }

        fn summary(&self) -> String {
            self.model
                .notification
                .as_ref()
                .map(|n| format!("{}: {}", n.summary, n.detail))
                .unwrap_or_default()
        }
    }

    #[test]
    fn login_then_page_list_then_table() {
        let mut h = harness(config());
        assert!(h.model.raw_keyevents());
        assert_eq!(h.model.cmd_mode, Some(CMDMode::Username));

        h.type_line("asha");
        assert_eq!(h.model.cmd_mode, Some(CMDMode::Otp));
        h.type_line("999999");
        assert_eq!(h.model.cmd_mode, Some(CMDMode::Otp));
        assert!(h.summary().starts_with("Verification failed"));

        h.type_line("123456");
        h.settle();
        assert_eq!(h.model.modus, Modus::PAGES);
        assert_eq!(h.model.pages, ["kyc", "payouts"]);

        h.send(Message::Enter);
        assert_eq!(h.model.modus, Modus::LOADING);
        h.settle();
        assert_eq!(h.model.modus, Modus::TABLE);
        assert_eq!(h.table().filtered_count(), 2);
    }

    #[test]
    fn leaving_a_loading_page_drops_its_answer() {
        let mut h = harness(config());
        h.sign_in();
        h.send(Message::Enter);
        assert_eq!(h.model.modus, Modus::LOADING);
        h.send(Message::Pages);
        h.settle();

        // let the abandoned fetches answer before ticking again
        for _ in 0..500 {
            let calls = h.backend.calls();
            if calls.iter().any(|c| c == "rows kyc") && calls.iter().any(|c| c == "schema bluboy/kyc") {
                break;
            }
            std::thread::sleep(StdDuration::from_millis(5));
        }
        std::thread::sleep(StdDuration::from_millis(50));
        for _ in 0..5 {
            h.send(Message::Tick);
        }
        assert_eq!(h.model.modus, Modus::PAGES);
        assert!(h.model.table.is_none());
    }

    #[test]
    fn quit_is_typed_while_entering_text() {
        let mut h = harness(config());
        h.send(Message::Quit);
        assert_eq!(h.model.status, Status::READY);
        h.model.active_cmdinput = false;
        h.model.modus = Modus::LOGIN;
        h.send(Message::Quit);
        assert_eq!(h.model.status, Status::QUITTING);
    }

    #[test]
    fn approve_and_reject_through_messages() {
        let mut h = harness(config());
        h.open_kyc();

        h.send(Message::Approve);
        assert_eq!(h.summary(), "Action Not Allowed: No rows selected!");

        h.send(Message::ToggleSelectAll);
        h.send(Message::Approve);
        assert_eq!(h.summary(), "Action Not Allowed: Cannot approve rejected records!");

        h.send(Message::ToggleSelectAll);
        h.send(Message::ToggleSelect);
        h.send(Message::Reject);
        assert_eq!(h.model.cmd_mode, Some(CMDMode::RejectReason));
        h.type_line("   ");
        assert_eq!(h.summary(), "Validation Error: Status Reason is required for rejection!");

        h.send(Message::Reject);
        h.type_line("blurry scan");
        assert_eq!(h.summary(), "Success: Status updated to Rejected!");
        let row = &h.table().store.rows()[0];
        assert_eq!(row.status(), Some(WorkflowStatus::Rejected));
        assert_eq!(row.display("status_reason"), "blurry scan");
    }

    #[test]
    fn edits_go_through_validation() {
        let mut h = harness(config());
        h.open_kyc();
        h.send(Message::MoveRight);
        h.send(Message::EditCell);
        assert!(h.model.raw_keyevents());
        h.send(Message::RawKey(KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL)));
        h.type_line("31-02-2024");
        assert_eq!(h.model.modus, Modus::EDITING);
        assert_eq!(h.summary(), "Validation Error: createdOn must be a valid date.");

        h.key(KeyCode::Esc);
        assert_eq!(h.model.modus, Modus::TABLE);
        assert_eq!(h.table().store.rows()[0].display("createdOn"), "05-01-2024");
    }

    #[test]
    fn stored_rows_are_reused_until_refetch() {
        let mut h = harness(config());
        h.open_kyc();
        h.send(Message::ToggleSelect);
        h.send(Message::Approve);

        h.send(Message::Pages);
        h.settle();
        h.send(Message::Enter);
        h.settle();
        assert_eq!(
            h.table().store.rows()[0].status(),
            Some(WorkflowStatus::Approved)
        );
        let row_fetches = |h: &Harness| h.backend.calls().iter().filter(|c| c.starts_with("rows")).count();
        assert_eq!(row_fetches(&h), 1);

        h.send(Message::Refetch);
        h.settle();
        assert_eq!(row_fetches(&h), 2);
        assert_eq!(h.table().store.rows()[0].display("status"), "Pending");

        let scoped = h.storage.scoped(&["bluboy", "kyc"]).unwrap();
        assert!(scoped.root().join(format!("{TABLE_DATA_KEY}.json")).exists());
    }

    #[test]
    fn memory_mode_always_fetches() {
        let mut h = harness(config().with_persist(PersistMode::Memory));
        h.open_kyc();
        h.send(Message::Retry);
        h.settle();
        let fetches = h.backend.calls().iter().filter(|c| c.starts_with("rows")).count();
        assert_eq!(fetches, 2);
    }

    #[test]
    fn failed_load_shows_error_and_retries() {
        let mut h = harness(config().with_start_page("missing".to_string()));
        h.sign_in();
        assert_eq!(h.model.modus, Modus::TABLE);

        h.model.open_page("missing", true);
        h.model.loader.cancel();
        h.model.loaded(LoadOutcome::Failed {
            page: Some("missing".into()),
            error: DashError::BadStatus(404),
        });
        assert_eq!(h.model.modus, Modus::ERROR);
        assert!(h.model.error_message.contains("404"));

        h.send(Message::Retry);
        h.settle();
        assert_eq!(h.model.modus, Modus::TABLE);
    }

    #[test]
    fn session_expiry_returns_to_login() {
        let mut h = harness(config());
        h.open_kyc();
        h.clock.advance(Duration::minutes(31));
        h.send(Message::Tick);
        assert_eq!(h.model.modus, Modus::CMDINPUT);
        assert_eq!(h.model.cmd_mode, Some(CMDMode::Username));
        assert!(h.model.table.is_none());
        assert_eq!(h.summary(), "Session expired: Please sign in again");
    }

    #[test]
    fn stored_session_skips_login() {
        let mut first = harness(config());
        first.sign_in();

        let sessions = SessionManager::new(
            first.storage.clone(),
            Box::new(first.clock.clone()),
            Box::new(LocalAuthenticator::new("123456")),
            30,
        );
        let model = Model::init(
            &config(),
            first.backend.clone(),
            sessions,
            first.storage.clone(),
            80,
            24,
        )
        .unwrap();
        assert!(!model.raw_keyevents());
        assert_eq!(model.modus, Modus::LOADING);
    }

    #[test]
    fn logout_clears_state() {
        let mut h = harness(config());
        h.open_kyc();
        h.send(Message::Logout);
        assert!(h.model.table.is_none());
        assert!(!h.model.sessions.is_signed_in());
        assert_eq!(h.model.cmd_mode, Some(CMDMode::Username));
    }

    #[test]
    fn help_popup_returns_to_previous_screen() {
        let mut h = harness(config());
        h.open_kyc();
        h.send(Message::Help);
        assert!(h.model.get_uidata().show_popup);
        h.send(Message::Exit);
        assert_eq!(h.model.modus, Modus::TABLE);
    }

    #[test]
    fn page_size_prompt() {
        let mut h = harness(config());
        h.open_kyc();
        h.send(Message::PageSize);
        assert_eq!(h.model.last_input.input, "10");
        h.send(Message::RawKey(KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL)));
        h.type_line("1");
        assert_eq!(h.table().page_size(), 1);
        assert_eq!(h.table().page_rows().len(), 1);
    }
}
