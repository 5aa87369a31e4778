//! Provider registry: configured engine adapters and their last-known
//! health/balance.
//!
//! An explicit, constructed service passed to the orchestrator, so tests
//! substitute fake adapters freely. Credentials enter at `register` and
//! never leave: listings expose only a fingerprint. Health snapshots run
//! per provider and tolerate individual failures; staleness is bounded
//! by `refresh_interval` instead of locking on every read.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use genflow_domain::{EngineCredentials, EngineDescriptor, EngineKind, ErrorCode};

use crate::adapter::{EngineAdapter, EngineBalance};
use crate::errors::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Unconfigured,
    Connected,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthNote {
    pub healthy: bool,
    pub checked_at: DateTime<Utc>,
}

/// Redacted provider record suitable for listings and logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderView {
    pub engine_id: String,
    pub kind: EngineKind,
    pub status: ProviderStatus,
    /// Fingerprint only; the credential value is never echoed back.
    pub credential_fingerprint: String,
    pub last_health: Option<HealthNote>,
    pub last_balance: Option<EngineBalance>,
}

struct ProviderEntry {
    adapter: Arc<dyn EngineAdapter>,
    descriptor: EngineDescriptor,
    credential_fingerprint: String,
    status: ProviderStatus,
    last_health: Option<HealthNote>,
    last_balance: Option<EngineBalance>,
}

pub struct ProviderRegistry {
    entries: DashMap<String, ProviderEntry>,
    refresh_interval: Duration,
}

impl ProviderRegistry {
    pub fn new(refresh_interval: Duration) -> Self {
        Self { entries: DashMap::new(),
               refresh_interval }
    }

    /// Register an adapter under its engine id: verify the credential,
    /// then read the provider balance. Re-registering the same id with a
    /// different credential requires `replace`; with the same credential
    /// it is a refresh.
    pub async fn register(&self,
                          adapter: Arc<dyn EngineAdapter>,
                          credentials: &EngineCredentials,
                          replace: bool)
                          -> Result<EngineBalance, CoreError> {
        let descriptor = adapter.descriptor().clone();
        let engine_id = descriptor.engine_id().to_string();
        let fingerprint = credentials.fingerprint();

        if let Some(existing) = self.entries.get(&engine_id) {
            if existing.credential_fingerprint != fingerprint && !replace {
                return Err(CoreError::rejected(
                    ErrorCode::ValidationError,
                    format!("engine '{engine_id}' already registered with different credentials; pass replace to overwrite"),
                ));
            }
        }

        let verified = adapter.verify_identity(credentials)
                              .await
                              .map_err(|e| CoreError::Rejected(e.to_info()))?;
        if !verified {
            return Err(CoreError::rejected(ErrorCode::ValidationError,
                                           format!("engine '{engine_id}' rejected the supplied credentials")));
        }

        let balance = adapter.check_balance()
                             .await
                             .map_err(|e| CoreError::Rejected(e.to_info()))?;

        tracing::info!(engine = %engine_id, "provider registered");
        self.entries.insert(engine_id,
                            ProviderEntry { adapter,
                                            descriptor,
                                            credential_fingerprint: fingerprint,
                                            status: ProviderStatus::Connected,
                                            last_health: None,
                                            last_balance: Some(balance.clone()) });
        Ok(balance)
    }

    pub fn get(&self, engine_id: &str) -> Option<Arc<dyn EngineAdapter>> {
        self.entries.get(engine_id).map(|e| Arc::clone(&e.adapter))
    }

    /// Redacted snapshot of every registered provider.
    pub fn list_all(&self) -> Vec<ProviderView> {
        let mut views: Vec<ProviderView> =
            self.entries
                .iter()
                .map(|e| ProviderView { engine_id: e.key().clone(),
                                        kind: e.descriptor.kind(),
                                        status: e.status,
                                        credential_fingerprint: e.credential_fingerprint.clone(),
                                        last_health: e.last_health.clone(),
                                        last_balance: e.last_balance.clone() })
                .collect();
        views.sort_by(|a, b| a.engine_id.cmp(&b.engine_id));
        views
    }

    /// Probe every provider. One unhealthy or panicking provider never
    /// faults the listing; it just reports unhealthy.
    pub async fn health_snapshot(&self) -> Vec<ProviderView> {
        let ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            let adapter = match self.get(&id) {
                Some(a) => a,
                None => continue,
            };
            let healthy = adapter.health_check().await;
            if let Some(mut entry) = self.entries.get_mut(&id) {
                entry.last_health = Some(HealthNote { healthy, checked_at: Utc::now() });
                entry.status = if healthy { ProviderStatus::Connected } else { ProviderStatus::Error };
            }
        }
        self.list_all()
    }

    /// Health answer with bounded staleness: a recent probe is reused,
    /// an older one triggers a fresh check. Unknown engines are
    /// unhealthy by definition.
    pub async fn healthy(&self, engine_id: &str) -> bool {
        let cached = self.entries.get(engine_id).and_then(|e| e.last_health.clone());
        if let Some(note) = cached {
            let age = Utc::now().signed_duration_since(note.checked_at);
            if age.to_std().map(|a| a < self.refresh_interval).unwrap_or(false) {
                return note.healthy;
            }
        }
        let adapter = match self.get(engine_id) {
            Some(a) => a,
            None => return false,
        };
        let healthy = adapter.health_check().await;
        if let Some(mut entry) = self.entries.get_mut(engine_id) {
            entry.last_health = Some(HealthNote { healthy, checked_at: Utc::now() });
            entry.status = if healthy { ProviderStatus::Connected } else { ProviderStatus::Error };
        }
        healthy
    }
}
