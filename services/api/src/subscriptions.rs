//! Dispatch subscription lifecycle.
//!
//! The backend only routes incoming calls to this service while a dispatch
//! subscription exists. Its id is kept in a small JSON file so a restart
//! reuses the subscription and shutdown can remove it.

use crate::config::DispatchConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, warn};
use voicenet_core::{CommandClient, DispatchRegistration, VoiceError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("subscription store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("subscription store is corrupt: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Command(#[from] VoiceError),
}

/// One persisted subscription, owned by a workflow node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub workflow_id: String,
    pub node_id: String,
    pub subscription_id: String,
}

/// JSON file of [`SubscriptionRecord`]s keyed by workflow and node.
#[derive(Debug)]
pub struct SubscriptionStore {
    path: PathBuf,
    records: Mutex<Vec<SubscriptionRecord>>,
}

impl SubscriptionStore {
    /// Loads the store; a missing file is an empty store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Vec::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, workflow_id: &str, node_id: &str) -> Option<String> {
        self.records
            .lock()
            .await
            .iter()
            .find(|r| r.workflow_id == workflow_id && r.node_id == node_id)
            .map(|r| r.subscription_id.clone())
    }

    /// Stores the subscription id for a node, replacing any previous one.
    pub async fn put(
        &self,
        workflow_id: &str,
        node_id: &str,
        subscription_id: &str,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        records.retain(|r| !(r.workflow_id == workflow_id && r.node_id == node_id));
        records.push(SubscriptionRecord {
            workflow_id: workflow_id.to_string(),
            node_id: node_id.to_string(),
            subscription_id: subscription_id.to_string(),
        });
        self.persist(&records).await
    }

    /// Removes a node's record, returning the subscription id it held.
    pub async fn remove(&self, workflow_id: &str, node_id: &str) -> Result<Option<String>, StoreError> {
        let mut records = self.records.lock().await;
        let Some(index) = records
            .iter()
            .position(|r| r.workflow_id == workflow_id && r.node_id == node_id)
        else {
            return Ok(None);
        };
        let removed = records.remove(index);
        self.persist(&records).await?;
        Ok(Some(removed.subscription_id))
    }

    async fn persist(&self, records: &[SubscriptionRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(records)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Makes sure the dispatch subscription exists, registering it if needed.
pub async fn ensure_registered(
    client: &dyn CommandClient,
    store: &SubscriptionStore,
    dispatch: &DispatchConfig,
) -> Result<String, SubscriptionError> {
    if let Some(existing) = store.get(&dispatch.workflow_id, &dispatch.node_id).await {
        info!(subscription_id = %existing, "Dispatch subscription already registered");
        return Ok(existing);
    }

    let registration = DispatchRegistration::incoming_call(
        &dispatch.workflow_id,
        &dispatch.node_id,
        dispatch.callback_url(),
        &dispatch.did,
    );
    let subscription_id = client.register_dispatch(&registration).await?;
    store
        .put(&dispatch.workflow_id, &dispatch.node_id, &subscription_id)
        .await?;
    info!(%subscription_id, did = %dispatch.did, callback_url = %registration.callback_url, "Registered dispatch subscription");
    Ok(subscription_id)
}

/// Removes the dispatch subscription; `false` if none was registered.
///
/// The local record is only dropped once the backend has accepted the removal.
pub async fn unregister(
    client: &dyn CommandClient,
    store: &SubscriptionStore,
    dispatch: &DispatchConfig,
) -> Result<bool, SubscriptionError> {
    let Some(subscription_id) = store.get(&dispatch.workflow_id, &dispatch.node_id).await else {
        return Ok(false);
    };
    if let Err(e) = client.unregister_dispatch(&subscription_id).await {
        warn!(%subscription_id, error = %e, "Failed to unregister dispatch subscription");
        return Err(e.into());
    }
    store.remove(&dispatch.workflow_id, &dispatch.node_id).await?;
    info!(%subscription_id, "Unregistered dispatch subscription");
    Ok(true)
}
