use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::domain::{DashConfig, DashError};
use crate::schema::Schema;

/// The read side of the backend: schemas, page lists and rows.
pub trait Backend: Send + Sync {
    fn fetch_schema(&self, tenant: &str, page: &str) -> Result<Schema, DashError>;
    fn list_pages(&self, tenant: &str) -> Result<Vec<String>, DashError>;
    /// Rows come back as raw JSON; they are typed once the schema is known.
    fn fetch_rows(&self, page: &str) -> Result<Value, DashError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageEntry {
    page_title: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageList {
    page_data: Vec<PageEntry>,
}

pub fn pages_from_response(body: Value) -> Result<Vec<String>, DashError> {
    let list: PageList = serde_json::from_value(body)
        .map_err(|e| DashError::MalformedResponse(format!("page list: {e}")))?;
    Ok(list.page_data.into_iter().map(|p| p.page_title).collect())
}

pub struct HttpBackend {
    schema_url: String,
    data_url: String,
    client: reqwest::blocking::Client,
}

impl HttpBackend {
    pub fn new(config: &DashConfig) -> Self {
        Self {
            schema_url: config.schema_url.trim_end_matches('/').to_string(),
            data_url: config.data_url.trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn get_json(&self, url: &str) -> Result<Value, DashError> {
        debug!("GET {url}");
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(DashError::BadStatus(status.as_u16()));
        }
        Ok(response.json()?)
    }
}

impl Backend for HttpBackend {
    #[instrument(skip(self))]
    fn fetch_schema(&self, tenant: &str, page: &str) -> Result<Schema, DashError> {
        let body = self.get_json(&format!("{}/page-schema/{tenant}/{page}", self.schema_url))?;
        Schema::from_response(&body)
    }

    #[instrument(skip(self))]
    fn list_pages(&self, tenant: &str) -> Result<Vec<String>, DashError> {
        let body = self.get_json(&format!("{}/page-schema/{tenant}", self.schema_url))?;
        pages_from_response(body)
    }

    #[instrument(skip(self))]
    fn fetch_rows(&self, page: &str) -> Result<Value, DashError> {
        self.get_json(&format!("{}/{page}", self.data_url))
    }
}
