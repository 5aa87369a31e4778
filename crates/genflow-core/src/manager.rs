//! PipelineManager: admission, worker pool and the job state machine.
//!
//! Role in the flow:
//! - `submit` validates the request against its preset, enforces the
//!   consent gate, pre-authorizes the estimated cost and queues the job.
//!   Every foreseeable rejection comes back as a value with remediation,
//!   and a rejected request creates no job record at all.
//! - A bounded worker pool consumes the queue; each worker owns one job
//!   at a time and executes its steps sequentially in dependency order.
//! - Per step, candidates are tried in preset order: unhealthy or
//!   transiently-failing engines fall through to the next candidate with
//!   bounded backoff; non-retryable failures abort the job immediately.
//! - Cancellation is cooperative: a flag checked between steps and
//!   before each adapter call. A call already in flight finishes and its
//!   results are discarded.
//! - The ledger is settled exactly once on every terminal transition.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use genflow_domain::{ErrorCode, ErrorInfo, PresetStep, QualityLevel, WorkflowPreset};
use genflow_policies::{CostTable, RetryPolicy};

use crate::adapter::{dispatch, AdapterError, EngineBalance, GenerationRequest};
use crate::artifact::{ArtifactKind, ArtifactStore};
use crate::catalog::PresetCatalog;
use crate::errors::CoreError;
use crate::event::{EventStore, JobEventKind, JobIndexEntry};
use crate::inputs::resolve_step_inputs;
use crate::job::{JobStatus, PipelineJob};
use crate::ledger::CreditLedger;
use crate::registry::ProviderRegistry;
use crate::repo::replay_job;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub preset_id: String,
    pub preset_version: u32,
    pub account_id: String,
    pub inputs: Value,
    pub quality: QualityLevel,
    pub consent_given: bool,
}

/// Non-exceptional submission result: either an admitted job or an
/// error code plus concrete remediation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: Option<Uuid>,
    pub status: Option<JobStatus>,
    pub estimated_cost: Option<u64>,
    pub error: Option<ErrorInfo>,
}

impl SubmitResponse {
    fn rejected(error: ErrorInfo) -> Self {
        Self { job_id: None,
               status: None,
               estimated_cost: None,
               error: Some(error) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job: PipelineJob,
    /// Remediation of the terminal error, when there is one.
    pub remediation: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub ok: bool,
    pub balance: Option<EngineBalance>,
    pub error: Option<ErrorInfo>,
}

/// Everything a worker needs to run an admitted job. Removed on
/// terminal transition; history then lives in the event log alone.
struct JobTicket {
    preset: Arc<WorkflowPreset>,
    inputs: Value,
    quality: QualityLevel,
    account_id: String,
}

pub struct PipelineManager<S, A>
    where S: EventStore + 'static,
          A: ArtifactStore + 'static
{
    events: Arc<S>,
    artifacts: Arc<A>,
    registry: Arc<ProviderRegistry>,
    ledger: Arc<CreditLedger>,
    catalog: Arc<PresetCatalog>,
    costs: Arc<CostTable>,
    retry: RetryPolicy,
    queue_tx: mpsc::Sender<Uuid>,
    queue_rx: StdMutex<Option<mpsc::Receiver<Uuid>>>,
    tickets: DashMap<Uuid, JobTicket>,
    cancel_flags: DashMap<Uuid, Arc<AtomicBool>>,
}

impl<S, A> PipelineManager<S, A>
    where S: EventStore + 'static,
          A: ArtifactStore + 'static
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(events: Arc<S>,
               artifacts: Arc<A>,
               registry: Arc<ProviderRegistry>,
               ledger: Arc<CreditLedger>,
               catalog: Arc<PresetCatalog>,
               costs: Arc<CostTable>,
               retry: RetryPolicy,
               queue_capacity: usize)
               -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(queue_capacity);
        Self { events,
               artifacts,
               registry,
               ledger,
               catalog,
               costs,
               retry,
               queue_tx,
               queue_rx: StdMutex::new(Some(queue_rx)),
               tickets: DashMap::new(),
               cancel_flags: DashMap::new() }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn ledger(&self) -> &Arc<CreditLedger> {
        &self.ledger
    }

    pub fn artifacts(&self) -> &Arc<A> {
        &self.artifacts
    }

    /// Spawn the bounded worker pool. Call once; later calls find the
    /// receiver gone and spawn nothing.
    pub fn start(self: &Arc<Self>, workers: usize) -> Vec<JoinHandle<()>> {
        let rx = self.queue_rx.lock().unwrap_or_else(|p| p.into_inner()).take();
        let Some(rx) = rx else {
            return Vec::new();
        };
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        (0..workers).map(|worker| {
                        let manager = Arc::clone(self);
                        let rx = Arc::clone(&rx);
                        tokio::spawn(async move {
                            loop {
                                let job_id = { rx.lock().await.recv().await };
                                let Some(job_id) = job_id else { break };
                                if let Err(e) = manager.run_job(job_id).await {
                                    tracing::error!(%job_id, worker, error = %e, "job execution faulted");
                                }
                            }
                        })
                    })
                    .collect()
    }

    /// Admit a job or reject it with a remediable error. Rejections
    /// leave no job record and no ledger transaction.
    pub async fn submit(&self, request: SubmitRequest) -> SubmitResponse {
        let Some(preset) = self.catalog.get(&request.preset_id, request.preset_version) else {
            return SubmitResponse::rejected(ErrorInfo::new(
                ErrorCode::ValidationError,
                format!("unknown preset '{}' version {}", request.preset_id, request.preset_version),
            ));
        };

        for name in preset.required_inputs() {
            if request.inputs.get(name).is_none() {
                return SubmitResponse::rejected(ErrorInfo::new(
                    ErrorCode::ValidationError,
                    format!("required input '{name}' missing"),
                ));
            }
        }

        if !preset.supports_quality(request.quality) {
            return SubmitResponse::rejected(ErrorInfo::new(
                ErrorCode::ValidationError,
                format!("preset '{}' does not offer quality '{}'", preset.id(), request.quality),
            ));
        }

        // Consent gate: checked here and never re-checked downstream.
        if preset.requires_consent() && !request.consent_given {
            return SubmitResponse::rejected(ErrorInfo::new(
                ErrorCode::ConsentMissing,
                format!("preset '{}' contains identity-bearing steps", preset.id()),
            ));
        }

        let estimated_cost = match self.costs.estimate(&preset, request.quality) {
            Ok(v) => v,
            Err(e) => return SubmitResponse::rejected(e.to_info()),
        };

        let job_id = Uuid::new_v4();
        let hold_tx = match self.ledger.hold(&request.account_id, estimated_cost, job_id) {
            Ok(tx) => tx,
            Err(CoreError::Rejected(info)) => return SubmitResponse::rejected(info),
            Err(e) => {
                return SubmitResponse::rejected(ErrorInfo::new(ErrorCode::ValidationError, e.to_string()))
            }
        };

        let admitted = self.events.append_kind(job_id,
                                               JobEventKind::JobSubmitted {
                                                   account_id: request.account_id.clone(),
                                                   preset_id: preset.id().to_string(),
                                                   preset_version: preset.version(),
                                                   definition_hash: preset.definition_hash().to_string(),
                                                   quality: request.quality,
                                                   estimated_cost,
                                                   hold_tx,
                                                   consent_given: request.consent_given,
                                               });
        if let Err(e) = admitted {
            // The hold must not outlive a job that was never recorded.
            self.ledger.settle(&request.account_id, job_id, &[]);
            return SubmitResponse::rejected(ErrorInfo::new(ErrorCode::ValidationError,
                                                           format!("job history unavailable: {e}")));
        }

        self.tickets.insert(job_id,
                            JobTicket { preset,
                                        inputs: request.inputs,
                                        quality: request.quality,
                                        account_id: request.account_id });
        self.cancel_flags.insert(job_id, Arc::new(AtomicBool::new(false)));

        tracing::info!(%job_id, estimated_cost, "job admitted");
        if self.queue_tx.send(job_id).await.is_err() {
            // Pool shut down between admission and enqueue.
            self.finish_cancelled(job_id, &[]).ok();
            return SubmitResponse::rejected(ErrorInfo::new(ErrorCode::ValidationError,
                                                           "job queue is closed"));
        }

        SubmitResponse { job_id: Some(job_id),
                         status: Some(JobStatus::Queued),
                         estimated_cost: Some(estimated_cost),
                         error: None }
    }

    /// Current view of a job, replayed from its history.
    pub fn status(&self, job_id: Uuid) -> Result<Option<JobStatusResponse>, CoreError> {
        let events = self.events.list(job_id)?;
        Ok(replay_job(&events).map(|job| {
            let remediation = job.error.as_ref().map(|e| e.remediation.clone()).unwrap_or_default();
            JobStatusResponse { job, remediation }
        }))
    }

    /// Jobs of one account, most recent first.
    pub fn jobs_for_account(&self, account_id: &str) -> Result<Vec<JobIndexEntry>, CoreError> {
        Ok(self.events.jobs_for_account(account_id)?)
    }

    /// Request cooperative cancellation. Takes effect at the next step
    /// boundary; an in-flight adapter call is left to finish and its
    /// results are discarded.
    pub fn cancel(&self, job_id: Uuid) {
        if let Some(flag) = self.cancel_flags.get(&job_id) {
            flag.store(true, Ordering::SeqCst);
            tracing::info!(%job_id, "cancellation requested");
        }
    }

    /// Register a provider; the credential value never appears in the
    /// response, only the registration outcome and provider balance.
    pub async fn register_provider(&self,
                                   adapter: Arc<dyn crate::adapter::EngineAdapter>,
                                   credentials: &genflow_domain::EngineCredentials,
                                   replace: bool)
                                   -> RegisterResponse {
        match self.registry.register(adapter, credentials, replace).await {
            Ok(balance) => RegisterResponse { ok: true, balance: Some(balance), error: None },
            Err(CoreError::Rejected(info)) => RegisterResponse { ok: false, balance: None, error: Some(info) },
            Err(e) => RegisterResponse { ok: false,
                                         balance: None,
                                         error: Some(ErrorInfo::new(ErrorCode::ValidationError, e.to_string())) },
        }
    }

    fn cancelled(&self, job_id: Uuid) -> bool {
        self.cancel_flags
            .get(&job_id)
            .map(|f| f.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn cleanup(&self, job_id: Uuid) {
        self.tickets.remove(&job_id);
        self.cancel_flags.remove(&job_id);
    }

    fn finish_cancelled(&self, job_id: Uuid, completed: &[(String, u64)]) -> Result<(), CoreError> {
        let account = self.tickets.get(&job_id).map(|t| t.account_id.clone());
        self.events.append_kind(job_id, JobEventKind::JobCancelled {})?;
        if let Some(account) = account {
            self.ledger.settle(&account, job_id, completed);
        }
        self.cleanup(job_id);
        tracing::info!(%job_id, "job cancelled");
        Ok(())
    }

    fn finish_failed(&self,
                     job_id: Uuid,
                     account_id: &str,
                     preset: &WorkflowPreset,
                     step_id: &str,
                     error: ErrorInfo,
                     completed: &[(String, u64)])
                     -> Result<(), CoreError> {
        let hints: Vec<String> = preset.hints_for(error.code.as_str()).to_vec();
        let error = error.with_hints(&hints);
        self.events.append_kind(job_id,
                                JobEventKind::StepFailed { step_id: step_id.to_string(),
                                                           error: error.clone() })?;
        self.events.append_kind(job_id, JobEventKind::JobFailed { error: error.clone() })?;
        // Refund covers every unexecuted step plus estimate slack.
        self.ledger.settle(account_id, job_id, completed);
        self.cleanup(job_id);
        tracing::warn!(%job_id, step = step_id, code = %error.code, "job failed");
        Ok(())
    }

    async fn run_job(&self, job_id: Uuid) -> Result<(), CoreError> {
        let mut completed: Vec<(String, u64)> = Vec::new();
        let result = self.run_job_inner(job_id, &mut completed).await;
        if result.is_err() {
            self.settle_after_fault(job_id, &completed);
        }
        result
    }

    /// An event-store fault mid-run cannot record a terminal event, but
    /// the hold and the ticket still must not outlive the worker.
    /// Completed steps are debited; the rest of the hold is refunded.
    fn settle_after_fault(&self, job_id: Uuid, completed: &[(String, u64)]) {
        if let Some((_, ticket)) = self.tickets.remove(&job_id) {
            self.ledger.settle(&ticket.account_id, job_id, completed);
            tracing::warn!(%job_id, "hold settled after job history fault");
        }
        self.cancel_flags.remove(&job_id);
    }

    async fn run_job_inner(&self,
                           job_id: Uuid,
                           completed: &mut Vec<(String, u64)>)
                           -> Result<(), CoreError> {
        let Some((preset, inputs, quality, account_id)) =
            self.tickets.get(&job_id).map(|t| {
                (Arc::clone(&t.preset), t.inputs.clone(), t.quality, t.account_id.clone())
            })
        else {
            // Cancelled-and-settled before a worker got here.
            return Ok(());
        };

        // A queued job cancelled before start produces no artifacts.
        if self.cancelled(job_id) {
            return self.finish_cancelled(job_id, &[]);
        }

        self.events.append_kind(job_id, JobEventKind::JobStarted {})?;
        tracing::info!(%job_id, preset = preset.id(), "job started");

        let order = preset.topological_order()
                          .map_err(|e| CoreError::Internal(format!("published preset became cyclic: {e}")))?;

        let mut refs_by_step: HashMap<String, Vec<String>> = HashMap::new();

        for step_id in order {
            if self.cancelled(job_id) {
                return self.finish_cancelled(job_id, completed);
            }
            let step = preset.step(&step_id)
                             .ok_or_else(|| CoreError::Internal(format!("step '{step_id}' lost from preset")))?;

            let resolved = match resolve_step_inputs(step, &inputs, &refs_by_step) {
                Ok(v) => v,
                Err(CoreError::Rejected(info)) => {
                    return self.finish_failed(job_id, &account_id, &preset, &step_id, info, completed);
                }
                Err(e) => return Err(e),
            };

            match self.run_step(job_id, step, &resolved, quality).await? {
                StepOutcome::Finished { refs, cost } => {
                    refs_by_step.insert(step_id.clone(), refs);
                    completed.push((step_id.clone(), cost));
                }
                StepOutcome::Cancelled => {
                    return self.finish_cancelled(job_id, completed);
                }
                StepOutcome::Failed(error) => {
                    return self.finish_failed(job_id, &account_id, &preset, &step_id, error, completed);
                }
            }
        }

        let total_cost: u64 = completed.iter().map(|(_, c)| c).sum();
        self.events.append_kind(job_id, JobEventKind::JobCompleted { total_cost })?;
        self.ledger.settle(&account_id, job_id, completed);
        self.cleanup(job_id);
        tracing::info!(%job_id, total_cost, "job completed");
        Ok(())
    }

    /// Try the step's candidates in preset order. Attempts are bounded
    /// by the candidate list; there is no retry of the same engine.
    async fn run_step(&self,
                      job_id: Uuid,
                      step: &PresetStep,
                      resolved_inputs: &Value,
                      quality: QualityLevel)
                      -> Result<StepOutcome, CoreError> {
        let mut last_error: Option<ErrorInfo> = None;

        for (index, engine_id) in step.engine_candidates.iter().enumerate() {
            let attempt = index as u32 + 1;
            // Cooperative cancel: checked before every new adapter call.
            if self.cancelled(job_id) {
                return Ok(StepOutcome::Cancelled);
            }

            self.events.append_kind(job_id,
                                    JobEventKind::StepAttemptStarted { step_id: step.step_id.clone(),
                                                                       engine_id: engine_id.clone(),
                                                                       attempt })?;

            let attempt_error = match self.attempt_engine(job_id, step, engine_id, resolved_inputs, quality).await {
                Ok(output) => {
                    // Discard results of a step that outlived cancellation.
                    if self.cancelled(job_id) {
                        return Ok(StepOutcome::Cancelled);
                    }
                    let artifact = self.artifacts
                                       .save(job_id,
                                             &step.step_id,
                                             ArtifactKind::for_operation(step.operation),
                                             output.payload,
                                             output.metadata)
                                       .map_err(|e| CoreError::Internal(format!("artifact store: {e}")))?;
                    let cost = self.costs.cost(engine_id, step.operation, quality).unwrap_or(0);
                    self.events.append_kind(job_id,
                                            JobEventKind::StepFinished {
                                                step_id: step.step_id.clone(),
                                                engine_id: engine_id.clone(),
                                                artifact_refs: vec![artifact.artifact_ref.clone()],
                                                cost,
                                            })?;
                    tracing::debug!(%job_id, step = %step.step_id, engine = %engine_id, cost, "step finished");
                    return Ok(StepOutcome::Finished { refs: vec![artifact.artifact_ref],
                                                      cost });
                }
                Err(e) => e,
            };

            let retryable = attempt_error.code.retryable();
            let info = attempt_error.to_info();
            self.events.append_kind(job_id,
                                    JobEventKind::StepAttemptFailed { step_id: step.step_id.clone(),
                                                                      engine_id: engine_id.clone(),
                                                                      attempt,
                                                                      error: info.clone(),
                                                                      retryable })?;
            if !retryable {
                // The request itself is unsound; further candidates
                // would fail the same way.
                return Ok(StepOutcome::Failed(info));
            }

            tracing::debug!(%job_id, step = %step.step_id, engine = %engine_id, code = %info.code,
                            "attempt failed, falling back");
            last_error = Some(info);
            if index + 1 < step.engine_candidates.len() {
                tokio::time::sleep(self.retry.backoff_delay(index as u32)).await;
            }
        }

        let error = last_error.unwrap_or_else(|| {
            ErrorInfo::new(ErrorCode::EngineOffline,
                           format!("no candidate engine available for step '{}'", step.step_id))
        });
        Ok(StepOutcome::Failed(error))
    }

    /// One attempt against one engine: health gate, dispatch, deadline.
    async fn attempt_engine(&self,
                            job_id: Uuid,
                            step: &PresetStep,
                            engine_id: &str,
                            resolved_inputs: &Value,
                            quality: QualityLevel)
                            -> Result<crate::adapter::EngineOutput, AdapterError> {
        let Some(adapter) = self.registry.get(engine_id) else {
            return Err(AdapterError::offline(format!("engine '{engine_id}' is not registered")));
        };
        if !self.registry.healthy(engine_id).await {
            return Err(AdapterError::offline(format!("engine '{engine_id}' reports unhealthy")));
        }

        let request = GenerationRequest { job_id,
                                          step_id: step.step_id.clone(),
                                          inputs: resolved_inputs.clone(),
                                          quality };
        match tokio::time::timeout(self.retry.attempt_timeout,
                                   dispatch(adapter.as_ref(), step.operation, &request)).await
        {
            Ok(result) => result,
            Err(_) => Err(AdapterError::timeout(format!("engine '{engine_id}' exceeded {:?}",
                                                        self.retry.attempt_timeout))),
        }
    }
}

enum StepOutcome {
    Finished { refs: Vec<String>, cost: u64 },
    Cancelled,
    Failed(ErrorInfo),
}
