//! Generic remote JSON engine.
//!
//! Assumes a plain JSON-over-HTTP provider: one POST per operation under
//! a common base URL, bearer-token auth, and a small account/balance
//! surface. Transport failures and HTTP statuses are classified into
//! the error taxonomy here, so the orchestrator never sees a raw
//! reqwest error.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use genflow_core::{AdapterError, EngineAdapter, EngineBalance, EngineOutput, GenerationRequest};
use genflow_domain::{EngineCredentials, EngineDescriptor, EngineKind, ErrorCode, OperationKind};

pub struct HttpJsonEngine {
    descriptor: EngineDescriptor,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct BalanceBody {
    balance: f64,
    #[serde(default = "default_currency")]
    currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Transport deadline for direct adapter calls (registration probes,
/// balance checks); the orchestrator additionally bounds step attempts.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

impl HttpJsonEngine {
    pub fn new(engine_id: &str,
               base_url: impl Into<String>,
               credentials: &EngineCredentials,
               operations: impl IntoIterator<Item = OperationKind>)
               -> Self {
        Self::with_request_timeout(engine_id, base_url, credentials, operations, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_request_timeout(engine_id: &str,
                                base_url: impl Into<String>,
                                credentials: &EngineCredentials,
                                operations: impl IntoIterator<Item = OperationKind>,
                                timeout: Duration)
                                -> Self {
        Self { descriptor: EngineDescriptor::new(engine_id, EngineKind::Remote, operations),
               base_url: base_url.into(),
               api_key: credentials.expose().to_string(),
               // The builder only fails on TLS backend init; fall back
               // to the stock client rather than panic.
               client: reqwest::Client::builder().timeout(timeout)
                                                 .build()
                                                 .unwrap_or_else(|_| reqwest::Client::new()) }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn classify_transport(&self, err: reqwest::Error) -> AdapterError {
        if err.is_timeout() {
            AdapterError::timeout(format!("'{}' timed out", self.descriptor.engine_id()))
        } else if err.is_connect() {
            AdapterError::offline(format!("'{}' unreachable", self.descriptor.engine_id()))
        } else {
            AdapterError::contract(format!("'{}' transport fault: {err}", self.descriptor.engine_id()))
        }
    }

    fn classify_status(&self, status: reqwest::StatusCode, body: &str) -> AdapterError {
        let engine = self.descriptor.engine_id();
        let code = match status.as_u16() {
            402 => ErrorCode::InsufficientFunds,
            404 => ErrorCode::FileNotFound,
            422 if body.contains("safety") => ErrorCode::SafetyFilter,
            400 | 422 => ErrorCode::ValidationError,
            451 => ErrorCode::SafetyFilter,
            408 | 504 => ErrorCode::EngineTimeout,
            500..=599 => ErrorCode::EngineOffline,
            _ => ErrorCode::ContractMismatch,
        };
        // Provider bodies may quote the prompt; keep only the status line.
        AdapterError::new(code, format!("'{engine}' answered HTTP {status}"))
    }

    async fn post_operation(&self, path: &str, request: &GenerationRequest) -> Result<EngineOutput, AdapterError> {
        let body = json!({
            "inputs": request.inputs,
            "quality": request.quality,
        });
        let response = self.client
                           .post(self.url(path))
                           .bearer_auth(&self.api_key)
                           .json(&body)
                           .send()
                           .await
                           .map_err(|e| self.classify_transport(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.classify_transport(e))?;
        if !status.is_success() {
            return Err(self.classify_status(status, &text));
        }
        let payload: Value = serde_json::from_str(&text).map_err(|e| {
            AdapterError::contract(format!("'{}' returned non-JSON body: {e}", self.descriptor.engine_id()))
        })?;
        Ok(EngineOutput { payload,
                          metadata: json!({"engine": self.descriptor.engine_id(), "endpoint": path}) })
    }
}

#[async_trait]
impl EngineAdapter for HttpJsonEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    async fn verify_identity(&self, credentials: &EngineCredentials) -> Result<bool, AdapterError> {
        let response = self.client
                           .get(self.url("v1/account"))
                           .bearer_auth(credentials.expose())
                           .send()
                           .await
                           .map_err(|e| self.classify_transport(e))?;
        match response.status().as_u16() {
            200..=299 => Ok(true),
            401 | 403 => Ok(false),
            s => Err(AdapterError::contract(format!("unexpected HTTP {s} from account endpoint"))),
        }
    }

    async fn check_balance(&self) -> Result<EngineBalance, AdapterError> {
        let response = self.client
                           .get(self.url("v1/balance"))
                           .bearer_auth(&self.api_key)
                           .send()
                           .await
                           .map_err(|e| self.classify_transport(e))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.classify_status(status, &text));
        }
        let body: BalanceBody = response.json().await.map_err(|e| {
            AdapterError::contract(format!("balance body mismatch: {e}"))
        })?;
        Ok(EngineBalance { balance: body.balance, currency: body.currency })
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(self.url("v1/health"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn generate_image(&self, request: &GenerationRequest) -> Result<EngineOutput, AdapterError> {
        self.post_operation("v1/generate/image", request).await
    }

    async fn generate_video(&self, request: &GenerationRequest) -> Result<EngineOutput, AdapterError> {
        self.post_operation("v1/generate/video", request).await
    }

    async fn apply_lip_sync(&self, request: &GenerationRequest) -> Result<EngineOutput, AdapterError> {
        self.post_operation("v1/generate/lip-sync", request).await
    }

    async fn upscale(&self, request: &GenerationRequest) -> Result<EngineOutput, AdapterError> {
        self.post_operation("v1/generate/upscale", request).await
    }
}
