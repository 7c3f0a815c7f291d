use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod controller;
mod domain;
mod editor;
mod filter;
mod inputter;
mod loader;
mod model;
mod record;
mod schema;
mod session;
mod storage;
mod store;
mod table;
mod ui;
mod validation;
mod workflow;

use api::HttpBackend;
use controller::Controller;
use domain::{AuthMode, DashConfig, DashError, PersistMode};
use model::{Model, Status};
use session::{Authenticator, LocalAuthenticator, RemoteAuthenticator, SessionManager, SystemClock};
use storage::LocalStorage;
use ui::TableUI;

/// Terminal dashboard for schema driven review pages.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Tenant whose pages are shown
    #[arg(short, long, default_value = "bluboy")]
    tenant: String,

    /// Open this page right after sign in instead of the page list
    #[arg(short, long)]
    page: Option<String>,

    /// Base URL of the schema service (also used for login)
    #[arg(long, default_value = "http://localhost:8080/api/v1")]
    schema_url: String,

    /// Base URL of the row data endpoint
    #[arg(long, default_value = "http://localhost:8081/api/v1/page-data")]
    data_url: String,

    /// Directory for the session and locally saved rows
    #[arg(long, default_value = "~/.pagedesk")]
    storage_dir: String,

    #[arg(long, value_enum, default_value_t = PersistMode::Local)]
    persist: PersistMode,

    #[arg(long, value_enum, default_value_t = AuthMode::Remote)]
    auth: AuthMode,

    /// OTP accepted by `--auth local`
    #[arg(long, default_value = "123456")]
    otp: String,

    /// Mobile number sent along with the OTP for remote verification
    #[arg(long, default_value = "9676000000")]
    mobile_number: String,

    #[arg(long, default_value_t = 30)]
    session_minutes: u64,

    #[arg(long, default_value_t = 10)]
    page_size: usize,

    #[arg(long, default_value = "pagedesk.log")]
    log_file: String,

    /// Milliseconds to wait for terminal events per loop
    #[arg(long, default_value_t = 100)]
    event_poll_time: u64,
}

fn expand(path: &str) -> Result<PathBuf, DashError> {
    shellexpand::full(path)
        .map(|p| PathBuf::from(p.as_ref()))
        .map_err(|e| DashError::InvalidConfig(e.to_string()))
}

impl Args {
    fn into_config(self) -> Result<DashConfig, DashError> {
        if self.page_size == 0 {
            return Err(DashError::InvalidConfig("page size must be at least 1".into()));
        }
        if self.session_minutes == 0 {
            return Err(DashError::InvalidConfig(
                "session length must be at least 1 minute".into(),
            ));
        }
        let mut config = DashConfig::default()
            .with_tenant(self.tenant)
            .with_schema_url(self.schema_url)
            .with_data_url(self.data_url)
            .with_storage_dir(expand(&self.storage_dir)?)
            .with_persist(self.persist)
            .with_auth(self.auth)
            .with_local_otp(self.otp)
            .with_mobile_number(self.mobile_number)
            .with_session_minutes(self.session_minutes)
            .with_page_size(self.page_size)
            .with_event_poll_time(self.event_poll_time);
        if let Some(page) = self.page {
            config = config.with_start_page(page);
        }
        Ok(config)
    }
}

fn setup_logging(path: &Path) -> Result<(), DashError> {
    let file = std::fs::File::create(path)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .with(ErrorLayer::default())
        .try_init()
        .map_err(|e| DashError::InvalidConfig(format!("logging: {e}")))
}

fn main() -> ExitCode {
    let args = Args::parse();
    let result = run(args);
    ratatui::restore();
    match result {
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn run(args: Args) -> Result<(), DashError> {
    setup_logging(&expand(&args.log_file)?)?;
    let cfg = args.into_config()?;
    info!("Starting pagedesk for tenant {}", cfg.tenant);

    let storage = LocalStorage::open(&cfg.storage_dir)?;
    let auth: Box<dyn Authenticator> = match cfg.auth {
        AuthMode::Remote => Box::new(RemoteAuthenticator::new(&cfg)),
        AuthMode::Local => Box::new(LocalAuthenticator::new(&cfg.local_otp)),
    };
    let sessions = SessionManager::new(
        storage.clone(),
        Box::new(SystemClock),
        auth,
        cfg.session_minutes,
    );
    let backend = Arc::new(HttpBackend::new(&cfg));

    let mut terminal = ratatui::init();
    let size = terminal.size()?;
    let mut model = Model::init(
        &cfg,
        backend,
        sessions,
        storage,
        size.width as usize,
        size.height as usize,
    )?;
    let mut ui = TableUI::new(&cfg);
    let mut controller = Controller::new(&cfg);

    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(&model, f))?;

        // Handle events and map to a Message
        let message = controller.handle_event(&model)?;
        model.update(message)?;
    }

    Ok(())
}
