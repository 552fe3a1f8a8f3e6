//! Subcommand implementations.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::Utc;
use vaultwork_core::{Folder, RecordKind, Result, Status, VaultConfig, VaultError};
use vaultwork_engine::state_machine::{apply, Actor, Transition};
use vaultwork_engine::{
    DedupCache, Dispatcher, DraftEmailHandler, DraftPostHandler, IngestStage, PlanStage, RecordLoop,
    RetryPolicy, SendStage, Stage, StageRunner, StoreError, TickReport, TriageStage, VaultStore,
    WorkerStage,
};

use crate::cli::StageName;
use crate::collaborators::{Collaborators, SpoolSource};

/// Open the vault named by the config, creating its folders.
pub fn open_store(config: &VaultConfig) -> Result<VaultStore> {
    let store = VaultStore::new(config.vault_root()).with_dashboard_file(config.general.dashboard_file.clone());
    store.ensure_layout()?;
    Ok(store)
}

/// Build one stage wired with the configured collaborators.
pub fn build_stage(
    name: StageName,
    config: &VaultConfig,
    store: &VaultStore,
    collaborators: &Collaborators,
) -> Box<dyn Stage> {
    let policy = RetryPolicy::from_config(&config.retry);
    match name {
        StageName::Ingest => Box::new(
            IngestStage::new(store.clone(), DedupCache::load(config.dedup_cache_path()))
                .with_source(Box::new(SpoolSource::new(config.spool_dir()))),
        ),
        StageName::Triage => Box::new(RecordLoop::new(
            TriageStage::new(collaborators.classifier.clone()),
            store.clone(),
            policy,
        )),
        StageName::Plan => Box::new(RecordLoop::new(
            PlanStage::new(collaborators.planner.clone(), config.actions.clone()),
            store.clone(),
            policy,
        )),
        StageName::Worker => {
            let mut dispatcher = Dispatcher::new();
            dispatcher.register_handler(std::sync::Arc::new(DraftEmailHandler::new(collaborators.drafter.clone())));
            dispatcher.register_handler(std::sync::Arc::new(DraftPostHandler::new(collaborators.drafter.clone())));
            Box::new(RecordLoop::new(WorkerStage::new(dispatcher), store.clone(), policy))
        }
        StageName::Send => Box::new(RecordLoop::new(
            SendStage::new(collaborators.transport.clone(), collaborators.poster.clone()),
            store.clone(),
            policy,
        )),
    }
}

/// Stages `run` starts: the named ones, or every enabled one.
pub fn selected_stages(config: &VaultConfig, requested: &[StageName]) -> Vec<StageName> {
    if !requested.is_empty() {
        let mut stages = Vec::new();
        for name in requested {
            if !stages.contains(name) {
                stages.push(*name);
            }
        }
        return stages;
    }
    StageName::ALL
        .into_iter()
        .filter(|name| name.config(&config.stages).enabled)
        .collect()
}

/// Run stage loops until Ctrl-C.
pub async fn run(config: &VaultConfig, requested: &[StageName]) -> Result<()> {
    let store = open_store(config)?;
    let collaborators = Collaborators::from_config(config);
    let stages = selected_stages(config, requested);
    if stages.is_empty() {
        tracing::warn!("No stages enabled, nothing to run");
        return Ok(());
    }

    let mut handles = Vec::with_capacity(stages.len());
    let mut tasks = Vec::with_capacity(stages.len());
    for name in stages {
        let interval = name.config(&config.stages).interval();
        let runner = StageRunner::new(build_stage(name, config, &store, &collaborators), interval);
        handles.push(runner.shutdown_handle());
        tasks.push(tokio::spawn(runner.run()));
    }
    tracing::info!(vault = %store.root().display(), stages = tasks.len(), "Vaultwork running");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested, waiting for stages to finish their tick");
    for handle in &handles {
        handle.shutdown();
    }
    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Stage task ended abnormally");
        }
    }
    tracing::info!("Vaultwork stopped");
    Ok(())
}

/// Run exactly one tick of one stage.
pub async fn tick(config: &VaultConfig, name: StageName) -> Result<TickReport> {
    let store = open_store(config)?;
    let collaborators = Collaborators::from_config(config);
    let mut stage = build_stage(name, config, &store, &collaborators);
    let report = stage.tick().await?;
    stage.shutdown().await?;
    Ok(report)
}

/// Per-folder counts by status, plus any records that fail to parse.
pub fn status(store: &VaultStore) -> Result<String> {
    let mut out = String::new();
    let mut corrupt = Vec::new();

    for folder in Folder::ALL {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        let handles = store.list(folder, "*")?;
        for handle in &handles {
            match store.read_record(handle) {
                Ok(record) => *counts.entry(record.status.to_string()).or_default() += 1,
                Err(StoreError::Corrupt { source, .. }) => {
                    corrupt.push(format!("{}/{}: {}", folder, handle.file_name, source));
                }
                Err(e) => return Err(e.into()),
            }
        }

        let total: usize = counts.values().sum();
        let _ = write!(out, "{folder}: {total}");
        if !counts.is_empty() {
            let detail: Vec<String> = counts.iter().map(|(status, n)| format!("{status}: {n}")).collect();
            let _ = write!(out, " ({})", detail.join(", "));
        }
        out.push('\n');
    }

    for line in &corrupt {
        let _ = writeln!(out, "corrupt: {line}");
    }
    Ok(out)
}

/// Human approval of a plan or draft.
pub fn approve(store: &VaultStore, folder: Folder, file: &str) -> Result<Status> {
    human_transition(store, folder, file, |_| Status::Approved, false)
}

/// Send a failed record back: plans and drafts to `approved`, sources to `new`.
pub fn retry(store: &VaultStore, folder: Folder, file: &str) -> Result<Status> {
    human_transition(
        store,
        folder,
        file,
        |kind| match kind {
            RecordKind::Plan | RecordKind::Draft => Status::Approved,
            RecordKind::Email | RecordKind::InboxItem => Status::New,
        },
        true,
    )
}

fn human_transition(
    store: &VaultStore,
    folder: Folder,
    file: &str,
    target: impl Fn(RecordKind) -> Status,
    require_failed: bool,
) -> Result<Status> {
    let handle = store
        .find(folder, file)
        .ok_or_else(|| VaultError::Vault(format!("{folder}/{file} not found")))?;
    let record = store.read_record(&handle)?;
    if require_failed && record.status != Status::Failed {
        return Err(VaultError::Record(format!(
            "{} is {}, only failed records can be retried",
            handle.file_name, record.status
        )));
    }

    let to = target(record.kind);
    let transition = Transition::new(to, Actor::Human).with_field("reviewed_at", Utc::now().to_rfc3339());
    let mut updated = apply(&record, &transition)?;
    if require_failed {
        updated.metadata.remove("error");
        updated.metadata.remove("failed_at");
    }
    store.write_record(&handle, &updated)?;
    tracing::info!(record = %handle.file_name, from = %record.status, to = %to, "Human transition applied");
    store.append_log(&format!("[human] {} {} -> {}", handle.file_name, record.status, to))?;
    Ok(to)
}
