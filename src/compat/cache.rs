use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use super::processor::CompatProcessor;
use super::report::ChangeReport;
use crate::snapshot::envelope;
use crate::snapshot::Payload;
use crate::CompatError;

/// Payload as served to one data-plane version
#[derive(Debug)]
pub struct VersionedContent {
    pub payload: Bytes,
    /// Hash of the control plane's canonical snapshot
    pub hash: String,
    pub report: ChangeReport,
    rpc_params: OnceCell<Value>,
}

impl VersionedContent {
    pub fn new(
        payload: Bytes,
        hash: String,
        report: ChangeReport,
    ) -> Self {
        Self {
            payload,
            hash,
            report,
            rpc_params: OnceCell::new(),
        }
    }

    /// Decompressed envelope used as `sync_config` params; decoded once
    pub fn rpc_params(&self) -> Result<&Value, CompatError> {
        self.rpc_params
            .get_or_try_init(|| envelope::decode_value(&self.payload))
    }
}

type CacheEntry = Result<Arc<VersionedContent>, CompatError>;

/// Memoizes downgraded payloads per exact data-plane version string.
///
/// Failures are cached as well, so a payload that cannot be processed for
/// a version is not retried until the next `update`.
#[derive(Debug)]
pub struct VersionCache {
    processor: Arc<CompatProcessor>,
    payload: Arc<Payload>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl VersionCache {
    pub fn new(
        processor: Arc<CompatProcessor>,
        payload: Arc<Payload>,
    ) -> Self {
        Self {
            processor,
            payload,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(
        &self,
        dp_version: &str,
    ) -> CacheEntry {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(dp_version) {
            return entry.clone();
        }

        let current = self.payload.raw().ok_or(CompatError::PayloadUnavailable)?;
        let entry = self
            .processor
            .process(dp_version, &current.bytes)
            .map(|out| Arc::new(VersionedContent::new(out.payload, current.hash, out.report)));

        debug!(%dp_version, ok = entry.is_ok(), "version cache miss");
        entries.insert(dp_version.to_string(), entry.clone());
        entry
    }

    /// Swaps the payload and drops every cached version in one step
    pub fn update(
        &self,
        bytes: Bytes,
        hash: String,
    ) {
        let mut entries = self.entries.lock();
        self.payload.update(bytes, hash);
        entries.clear();
    }

    pub fn payload(&self) -> &Arc<Payload> {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
