use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread;

use serde_json::Value;
use tracing::{debug, error, info, info_span, trace};
use tracing_error::SpanTrace;

use crate::api::Backend;
use crate::domain::DashError;
use crate::record::{RowRecord, rows_from_response};
use crate::schema::Schema;

/// Identifies one load. Answers carrying an older token are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageToken(u64);

enum LoadEvent {
    Schema(PageToken, Result<Schema, DashError>),
    Rows(PageToken, Result<Value, DashError>),
    Pages(PageToken, Result<Vec<String>, DashError>),
}

enum RowsHalf {
    Raw(Value),
    Stored(Vec<RowRecord>),
}

struct PendingLoad {
    token: PageToken,
    page: String,
    schema: Option<Schema>,
    rows: Option<RowsHalf>,
}

/// What a finished load produced.
pub enum LoadOutcome {
    Ready {
        page: String,
        schema: Schema,
        rows: Vec<RowRecord>,
        from_storage: bool,
    },
    Pages(Vec<String>),
    Failed {
        page: Option<String>,
        error: DashError,
    },
}

/// Runs schema and row fetches on worker threads and joins their answers.
pub struct Loader {
    backend: Arc<dyn Backend>,
    tx: Sender<LoadEvent>,
    rx: Receiver<LoadEvent>,
    next_token: u64,
    current: Option<PendingLoad>,
    pages_token: Option<PageToken>,
}

fn report(what: &str, page: &str, error: &DashError) {
    let trace = SpanTrace::capture();
    error!("Fetching {what} of {page} failed: {error}\n{trace}");
}

impl Loader {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (tx, rx) = channel();
        Self {
            backend,
            tx,
            rx,
            next_token: 0,
            current: None,
            pages_token: None,
        }
    }

    fn token(&mut self) -> PageToken {
        self.next_token += 1;
        PageToken(self.next_token)
    }

    pub fn is_loading(&self) -> bool {
        self.current.is_some() || self.pages_token.is_some()
    }

    pub fn loading_page(&self) -> Option<&str> {
        self.current.as_ref().map(|p| p.page.as_str())
    }

    /// Start loading a page. With `stored` rows only the schema is fetched.
    pub fn load_page(&mut self, tenant: &str, page: &str, stored: Option<Vec<RowRecord>>) -> PageToken {
        let token = self.token();
        info!("Loading page {tenant}/{page} ({token:?})");

        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        let (tenant_s, page_s) = (tenant.to_string(), page.to_string());
        thread::spawn(move || {
            let span = info_span!("fetch_schema", tenant = %tenant_s, page = %page_s);
            let _guard = span.enter();
            let result = backend.fetch_schema(&tenant_s, &page_s);
            if let Err(e) = &result {
                report("schema", &page_s, e);
            }
            // The receiver is gone when the application is shutting down
            let _ = tx.send(LoadEvent::Schema(token, result));
        });

        let rows = match stored {
            Some(rows) => {
                debug!("Using {} stored rows for {page}", rows.len());
                Some(RowsHalf::Stored(rows))
            }
            None => {
                let backend = Arc::clone(&self.backend);
                let tx = self.tx.clone();
                let page_s = page.to_string();
                thread::spawn(move || {
                    let span = info_span!("fetch_rows", page = %page_s);
                    let _guard = span.enter();
                    let result = backend.fetch_rows(&page_s);
                    if let Err(e) = &result {
                        report("rows", &page_s, e);
                    }
                    let _ = tx.send(LoadEvent::Rows(token, result));
                });
                None
            }
        };

        self.current = Some(PendingLoad {
            token,
            page: page.to_string(),
            schema: None,
            rows,
        });
        token
    }

    /// Fetch the page list. A page load still running is abandoned.
    pub fn load_pages(&mut self, tenant: &str) -> PageToken {
        if let Some(pending) = self.current.take() {
            debug!("Abandoning load of {} ({:?})", pending.page, pending.token);
        }
        let token = self.token();
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        let tenant = tenant.to_string();
        thread::spawn(move || {
            let span = info_span!("list_pages", tenant = %tenant);
            let _guard = span.enter();
            let result = backend.list_pages(&tenant);
            if let Err(e) = &result {
                report("page list", &tenant, e);
            }
            let _ = tx.send(LoadEvent::Pages(token, result));
        });
        self.pages_token = Some(token);
        token
    }

    /// Forget the running loads; their answers will be dropped.
    pub fn cancel(&mut self) {
        self.current = None;
        self.pages_token = None;
    }

    /// Collect answers that arrived since the last call. Never blocks.
    pub fn poll(&mut self) -> Option<LoadOutcome> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    if let Some(outcome) = self.handle(event) {
                        return Some(outcome);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            }
        }
    }

    fn handle(&mut self, event: LoadEvent) -> Option<LoadOutcome> {
        match event {
            LoadEvent::Pages(token, result) => {
                if self.pages_token != Some(token) {
                    trace!("Dropping stale page list {token:?}");
                    return None;
                }
                self.pages_token = None;
                Some(match result {
                    Ok(pages) => LoadOutcome::Pages(pages),
                    Err(error) => LoadOutcome::Failed { page: None, error },
                })
            }
            LoadEvent::Schema(token, result) => {
                let pending = self.pending_for(token)?;
                match result {
                    Ok(schema) => pending.schema = Some(schema),
                    Err(error) => return self.fail(error),
                }
                self.try_finish()
            }
            LoadEvent::Rows(token, result) => {
                let pending = self.pending_for(token)?;
                match result {
                    Ok(body) => pending.rows = Some(RowsHalf::Raw(body)),
                    Err(error) => return self.fail(error),
                }
                self.try_finish()
            }
        }
    }

    fn pending_for(&mut self, token: PageToken) -> Option<&mut PendingLoad> {
        match self.current.as_mut() {
            Some(pending) if pending.token == token => Some(pending),
            _ => {
                trace!("Dropping stale answer {token:?}");
                None
            }
        }
    }

    fn fail(&mut self, error: DashError) -> Option<LoadOutcome> {
        let page = self.current.take().map(|p| p.page);
        Some(LoadOutcome::Failed { page, error })
    }

    fn try_finish(&mut self) -> Option<LoadOutcome> {
        let ready = self
            .current
            .as_ref()
            .is_some_and(|p| p.schema.is_some() && p.rows.is_some());
        if !ready {
            return None;
        }
        let PendingLoad {
            page, schema, rows, ..
        } = self.current.take()?;
        let schema = schema?;
        let (rows, from_storage) = match rows? {
            RowsHalf::Stored(rows) => (rows, true),
            RowsHalf::Raw(body) => match rows_from_response(&body, &schema) {
                Ok(rows) => (rows, false),
                Err(error) => {
                    return Some(LoadOutcome::Failed {
                        page: Some(page),
                        error,
                    });
                }
            },
        };
        info!("Page {page} ready with {} rows", rows.len());
        Some(LoadOutcome::Ready {
            page,
            schema,
            rows,
            from_storage,
        })
    }
}
