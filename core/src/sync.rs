//! Remote replication of the current period document.
//!
//! RULE: The engine must work with no remote at all. A failing remote
//! degrades the sync status; it never aborts or rolls back local work.

use crate::{
    error::{BillingError, BillingResult},
    period::BillingPeriod,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

pub trait RemoteSync: Send {
    /// `Ok(None)` when the remote has no document for this organization.
    fn fetch(&mut self, org_key: &str) -> BillingResult<Option<BillingPeriod>>;
    fn push(&mut self, org_key: &str, period: &BillingPeriod) -> BillingResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    /// No remote configured.
    LocalOnly,
    /// Remote configured, nothing exchanged yet.
    Idle,
    Synced,
    Failed { reason: String },
}

impl SyncStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Remote kept in memory as serialized documents. Can be told to fail.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    documents:   HashMap<String, String>,
    pub offline: bool,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offline() -> Self {
        Self {
            documents: HashMap::new(),
            offline:   true,
        }
    }

    /// Seed a document as if another device had pushed it.
    pub fn seed(&mut self, org_key: &str, period: &BillingPeriod) -> BillingResult<()> {
        self.documents
            .insert(org_key.to_string(), serde_json::to_string(period)?);
        Ok(())
    }

    pub fn document(&self, org_key: &str) -> BillingResult<Option<BillingPeriod>> {
        self.documents
            .get(org_key)
            .map(|json| serde_json::from_str(json).map_err(BillingError::from))
            .transpose()
    }
}

impl RemoteSync for InMemoryRemote {
    fn fetch(&mut self, org_key: &str) -> BillingResult<Option<BillingPeriod>> {
        if self.offline {
            return Err(BillingError::Sync("remote unreachable".into()));
        }
        self.document(org_key)
            .map_err(|e| BillingError::Sync(format!("corrupt remote document: {e}")))
    }

    fn push(&mut self, org_key: &str, period: &BillingPeriod) -> BillingResult<()> {
        if self.offline {
            return Err(BillingError::Sync("remote unreachable".into()));
        }
        self.seed(org_key, period)
    }
}

/// One `{org_key}.json` document per organization in a shared directory.
#[derive(Debug, Clone)]
pub struct DirectoryRemote {
    root: PathBuf,
}

impl DirectoryRemote {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn document_path(&self, org_key: &str) -> BillingResult<PathBuf> {
        let valid = !org_key.is_empty()
            && org_key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(BillingError::Validation(format!(
                "organization key '{org_key}' may only contain letters, digits, '-' and '_'"
            )));
        }
        Ok(self.root.join(format!("{org_key}.json")))
    }
}

impl RemoteSync for DirectoryRemote {
    fn fetch(&mut self, org_key: &str) -> BillingResult<Option<BillingPeriod>> {
        let path = self.document_path(org_key)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| BillingError::Sync(format!("read {}: {e}", path.display())))?;
        let period = serde_json::from_str(&content)
            .map_err(|e| BillingError::Sync(format!("corrupt remote document: {e}")))?;
        Ok(Some(period))
    }

    fn push(&mut self, org_key: &str, period: &BillingPeriod) -> BillingResult<()> {
        let path = self.document_path(org_key)?;
        std::fs::create_dir_all(&self.root)
            .map_err(|e| BillingError::Sync(format!("create {}: {e}", self.root.display())))?;
        let json = serde_json::to_string_pretty(period)?;
        std::fs::write(&path, json)
            .map_err(|e| BillingError::Sync(format!("write {}: {e}", path.display())))?;
        Ok(())
    }
}
