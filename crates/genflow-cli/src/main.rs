//! genflow: demo and inspection CLI for the pipeline orchestrator.
//!
//! Subcommands:
//! - `demo`: runs an image-then-upscale job end to end against
//!   synthetic local engines, persisting history and artifacts under a
//!   data directory.
//! - `history --job <UUID>`: prints the event timeline of a job.
//! - `jobs --account <ID>`: lists an account's jobs, most recent first.
//!
//! Exit codes: 0 ok, 2 usage, 3 bad argument, 4 not found / rejected,
//! 5 infrastructure error.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::json;
use uuid::Uuid;

use genflow_adapters::SyntheticLocalEngine;
use genflow_core::{ArtifactStore, CreditLedger, EngineAdapter, EventStore, JobStatus,
                   PipelineManager, PresetCatalog, ProviderRegistry, SubmitRequest};
use genflow_domain::{EngineCredentials, OperationKind, PresetStep, QualityLevel, WorkflowPreset};
use genflow_policies::{CostTable, RetryPolicy};
use genflow_persistence::{FsArtifactStore, FsEventStore};

const DEMO_ACCOUNT: &str = "demo-account";

fn data_dir(args: &[String]) -> PathBuf {
    for (i, arg) in args.iter().enumerate() {
        if arg == "--data" {
            if let Some(v) = args.get(i + 1) {
                return PathBuf::from(v);
            }
        }
    }
    std::env::var("GENFLOW_DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("genflow-data"))
}

fn parse_quality(args: &[String]) -> Result<QualityLevel, String> {
    for (i, arg) in args.iter().enumerate() {
        if arg == "--quality" {
            return match args.get(i + 1).map(|s| s.as_str()) {
                Some("low") => Ok(QualityLevel::Low),
                Some("standard") => Ok(QualityLevel::Standard),
                Some("pro") => Ok(QualityLevel::Pro),
                other => Err(format!("unknown quality {other:?} (expected low|standard|pro)")),
            };
        }
    }
    Ok(QualityLevel::Standard)
}

fn demo_preset() -> WorkflowPreset {
    let mut hints = IndexMap::new();
    hints.insert("ENGINE_OFFLINE".to_string(),
                 vec!["Re-run `genflow demo`; synthetic engines are always local.".to_string()]);
    // publish() already validated this shape in tests; a failure here is
    // a programming error, so the demo may abort loudly.
    WorkflowPreset::publish(
        "image-then-upscale",
        1,
        &["prompt"],
        &["style"],
        vec![PresetStep::new("image", OperationKind::GenerateImage, &["cloud-img"])
                 .params(json!({"width": 1024, "height": 1024})),
             PresetStep::new("upscale", OperationKind::Upscale, &["cloud-up"])
                 .depends_on(&["image"])
                 .params(json!({"source": "{{image.output}}", "factor": 2}))],
        &[QualityLevel::Low, QualityLevel::Standard, QualityLevel::Pro],
        false,
        hints,
    )
    .unwrap_or_else(|e| {
        eprintln!("[genflow demo] invalid builtin preset: {e}");
        std::process::exit(5);
    })
}

async fn run_demo(args: &[String]) -> i32 {
    let quality = match parse_quality(args) {
        Ok(q) => q,
        Err(e) => {
            eprintln!("[genflow demo] {e}");
            return 3;
        }
    };
    let dir = data_dir(args);

    let events = match FsEventStore::open(&dir) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("[genflow demo] cannot open event store at {}: {e}", dir.display());
            return 5;
        }
    };
    let artifacts = match FsArtifactStore::open(dir.join("artifacts")) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("[genflow demo] cannot open artifact store: {e}");
            return 5;
        }
    };

    let registry = Arc::new(ProviderRegistry::new(Duration::from_secs(30)));
    let ledger = Arc::new(CreditLedger::new());
    ledger.credit(DEMO_ACCOUNT, 200);
    let catalog = Arc::new(PresetCatalog::new());
    if let Err(e) = catalog.publish(demo_preset()) {
        eprintln!("[genflow demo] preset publish failed: {e}");
        return 5;
    }

    let manager = Arc::new(PipelineManager::new(Arc::clone(&events),
                                                Arc::clone(&artifacts),
                                                Arc::clone(&registry),
                                                Arc::clone(&ledger),
                                                catalog,
                                                Arc::new(CostTable::builtin_demo()),
                                                RetryPolicy::default(),
                                                16));
    let _workers = manager.start(2);

    for adapter in [SyntheticLocalEngine::new("cloud-img", [OperationKind::GenerateImage]),
                    SyntheticLocalEngine::new("cloud-up", [OperationKind::Upscale])]
    {
        let id = adapter.descriptor().engine_id().to_string();
        let response = manager.register_provider(Arc::new(adapter), &EngineCredentials::none(), false).await;
        if !response.ok {
            eprintln!("[genflow demo] register {id} failed: {:?}", response.error);
            return 5;
        }
        if let Some(balance) = response.balance {
            println!("provider {id}: {} {}", balance.balance, balance.currency);
        }
    }

    let response = manager.submit(SubmitRequest { preset_id: "image-then-upscale".into(),
                                                  preset_version: 1,
                                                  account_id: DEMO_ACCOUNT.into(),
                                                  inputs: json!({"prompt": "a lighthouse at dusk"}),
                                                  quality,
                                                  consent_given: false })
                          .await;
    let Some(job_id) = response.job_id else {
        eprintln!("[genflow demo] rejected: {:?}", response.error);
        return 4;
    };
    println!("submitted {job_id} (estimated cost {})", response.estimated_cost.unwrap_or(0));

    // Poll until a terminal status replays from the log.
    let job = loop {
        tokio::time::sleep(Duration::from_millis(50)).await;
        match manager.status(job_id) {
            Ok(Some(view)) if view.job.status.is_terminal() => break view.job,
            Ok(_) => continue,
            Err(e) => {
                eprintln!("[genflow demo] status error: {e}");
                return 5;
            }
        }
    };

    println!("job {} finished: {:?}, total cost {}", job.job_id, job.status, job.total_cost);
    for (step_id, result) in &job.step_results {
        println!("  step {step_id}: engine={} attempts={} cost={}",
                 result.engine_used.as_deref().unwrap_or("-"),
                 result.attempts,
                 result.cost);
        for r in &result.artifact_refs {
            let size = artifacts.resolve(r).map(|a| a.size_bytes).unwrap_or(0);
            println!("    artifact {r} ({size} bytes)");
        }
    }
    println!("account balance: {} credits ({} on hold)",
             ledger.balance(DEMO_ACCOUNT),
             ledger.outstanding_holds(DEMO_ACCOUNT));
    if job.status == JobStatus::Completed {
        0
    } else {
        4
    }
}

fn print_history(args: &[String]) -> i32 {
    let mut job: Option<Uuid> = None;
    for (i, arg) in args.iter().enumerate() {
        if arg == "--job" {
            job = args.get(i + 1).and_then(|v| Uuid::parse_str(v).ok());
        }
    }
    let Some(job_id) = job else {
        eprintln!("usage: genflow history --job <UUID> [--data <DIR>]");
        return 2;
    };
    let store = match FsEventStore::open(data_dir(args)) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("[genflow history] {e}");
            return 5;
        }
    };
    match store.list(job_id) {
        Ok(events) if events.is_empty() => {
            eprintln!("[genflow history] no events for job {job_id}");
            4
        }
        Ok(events) => {
            for ev in events {
                println!("{:>4}  {}  {:?}", ev.seq, ev.ts.to_rfc3339(), ev.kind);
            }
            0
        }
        Err(e) => {
            eprintln!("[genflow history] {e}");
            5
        }
    }
}

fn print_jobs(args: &[String]) -> i32 {
    let mut account: Option<String> = None;
    for (i, arg) in args.iter().enumerate() {
        if arg == "--account" {
            account = args.get(i + 1).cloned();
        }
    }
    let Some(account) = account else {
        eprintln!("usage: genflow jobs --account <ID> [--data <DIR>]");
        return 2;
    };
    let store = match FsEventStore::open(data_dir(args)) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("[genflow jobs] {e}");
            return 5;
        }
    };
    match store.jobs_for_account(&account) {
        Ok(entries) => {
            for entry in entries {
                println!("{}  {}  {}", entry.created_at.to_rfc3339(), entry.job_id, entry.account_id);
            }
            0
        }
        Err(e) => {
            eprintln!("[genflow jobs] {e}");
            5
        }
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                             .init();

    let args: Vec<String> = std::env::args().collect();
    let code = match args.get(1).map(|s| s.as_str()) {
        Some("demo") => run_demo(&args[2..]).await,
        Some("history") => print_history(&args[2..]),
        Some("jobs") => print_jobs(&args[2..]),
        _ => {
            eprintln!("usage: genflow <demo|history|jobs> [options]");
            2
        }
    };
    std::process::exit(code);
}
