use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::domain::DashError;

pub const TABLE_DATA_KEY: &str = "tableData";
pub const USER_SESSION_KEY: &str = "userSession";

/// Small key/value store on disk. Every key is one JSON file in `root`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, DashError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!("Local storage at {}", root.display());
        Ok(Self { root })
    }

    /// Storage for one namespace below this one, e.g. `tenant/page`.
    pub fn scoped(&self, namespace: &[&str]) -> Result<Self, DashError> {
        let mut root = self.root.clone();
        for part in namespace {
            root.push(sanitize(part));
        }
        LocalStorage::open(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", sanitize(key)))
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DashError> {
        let path = self.path_for(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        trace!("Read {} bytes from {}", content.len(), path.display());
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| DashError::StorageError(format!("{key}: {e}")))
    }

    /// Writes go through a temporary file so a crash never leaves half a value.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), DashError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string(value)?;
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;
        trace!("Stored {}", path.display());
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), DashError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}
