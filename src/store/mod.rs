//! JSON file persistence for a single ledger.

use std::collections::BTreeSet;
use std::{fs, io, path::{Path, PathBuf}};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::facade::{LedgerFacade, LedgerState, Receipt};
use crate::ledger::{LedgerEvent, Timestamp};
use crate::request::{RequestError, SignedRequest};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("state file is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("state file {0} already exists")]
    AlreadyExists(String),
    #[error("request {0} was already applied")]
    DuplicateRequest(String),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Serialize, Deserialize)]
struct PersistedLedger {
    config: LedgerConfig,
    state: LedgerState,
    events: Vec<LedgerEvent>,
    /// Hex digests of signed requests already executed.
    applied_requests: BTreeSet<String>,
}

#[derive(Debug)]
pub struct LedgerStore {
    path: PathBuf,
    facade: LedgerFacade,
    applied_requests: BTreeSet<String>,
}

impl LedgerStore {
    /// Persists a freshly constructed ledger; refuses to clobber an existing file.
    pub fn create(path: &Path, facade: LedgerFacade) -> Result<Self, StoreError> {
        if path.exists() {
            return Err(StoreError::AlreadyExists(path.display().to_string()));
        }
        let store = Self {
            path: path.to_path_buf(),
            facade,
            applied_requests: BTreeSet::new(),
        };
        store.save()?;
        Ok(store)
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let bytes = fs::read(path).map_err(|source| io_err(path, source))?;
        let persisted: PersistedLedger = serde_json::from_slice(&bytes)?;
        debug!(path = %path.display(), height = persisted.state.meta.height, "ledger loaded");
        Ok(Self {
            path: path.to_path_buf(),
            facade: LedgerFacade::from_parts(persisted.config, persisted.state, persisted.events),
            applied_requests: persisted.applied_requests,
        })
    }

    pub fn facade(&self) -> &LedgerFacade {
        &self.facade
    }

    /// Verifies, executes and persists one request. The request runs against
    /// a copy of the ledger, which replaces the in-memory one only after the
    /// file was written, so memory and disk agree when any step fails.
    pub fn submit(&mut self, request: &SignedRequest, now: Timestamp) -> Result<Receipt, StoreError> {
        let digest = hex::encode(request.digest()?);
        if self.applied_requests.contains(&digest) {
            return Err(StoreError::DuplicateRequest(digest));
        }
        let ctx = request.context(now)?;
        let mut facade = self.facade.clone();
        let receipt = facade.execute(&ctx, request.operation.clone())?;
        let mut applied_requests = self.applied_requests.clone();
        applied_requests.insert(digest);
        write_ledger(&self.path, &facade, &applied_requests)?;
        self.facade = facade;
        self.applied_requests = applied_requests;
        Ok(receipt)
    }

    pub fn save(&self) -> Result<(), StoreError> {
        write_ledger(&self.path, &self.facade, &self.applied_requests)
    }
}

/// Writes to a sibling temp file and renames it over the target.
fn write_ledger(
    path: &Path,
    facade: &LedgerFacade,
    applied_requests: &BTreeSet<String>,
) -> Result<(), StoreError> {
    let (config, state, events) = facade.clone().into_parts();
    let persisted = PersistedLedger {
        config,
        state,
        events,
        applied_requests: applied_requests.clone(),
    };
    let bytes = serde_json::to_vec_pretty(&persisted)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| io_err(parent, source))?;
        }
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|source| io_err(&tmp, source))?;
    fs::rename(&tmp, path).map_err(|source| io_err(path, source))?;
    Ok(())
}

fn io_err(path: &Path, source: io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}
