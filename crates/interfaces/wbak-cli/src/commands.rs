use anyhow::{bail, Context, Result};
use camino::Utf8Path;
use chrono::NaiveDateTime;
use std::sync::Arc;
use wbak_app_core::{
    describe_project, project_vm, AppCommand, BackupKernel, BackupOrchestrator, CoreSettings,
    InboundEvent, Notice,
};
use wbak_core::{
    derive_password, generate_name, restore_pipeline, GateState, PersistedListing, PipelineState,
    ResourceType,
};

use crate::loopback::{ConsoleSink, LoopbackChannel, LoopbackDevice};

type LoopbackKernel = BackupKernel<LoopbackChannel, ConsoleSink>;

const MAX_PUMP_ROUNDS: usize = 32;

pub fn cmd_password(imei: &str, uin: &str) -> Result<String> {
    let (imei, uin) = (imei.trim(), uin.trim());
    if imei.is_empty() || uin.is_empty() {
        bail!("Both IMEI and UIN are needed to derive the password");
    }
    Ok(derive_password(imei, uin))
}

pub fn cmd_new_name(now: NaiveDateTime) -> String {
    generate_name(now)
}

/// One summary line per listed project, in name order.
pub fn cmd_inspect(path: &Utf8Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read listing {path}"))?;
    let listing = PersistedListing::from_json_str(&raw)
        .with_context(|| format!("Failed to parse listing {path}"))?;

    let mut lines = Vec::with_capacity(listing.projects.len());
    for (name, entry) in &listing.projects {
        match restore_pipeline(name, entry) {
            Ok(pipeline) => lines.push(describe_project(&project_vm(&pipeline))),
            Err(e) => lines.push(format!("{name}: skipped ({e})")),
        }
    }
    if listing.skipped > 0 {
        lines.push(format!("{} malformed entries skipped", listing.skipped));
    }
    Ok(lines)
}

pub fn load_settings(path: Option<&Utf8Path>, settle_ms: Option<u64>) -> Result<CoreSettings> {
    let mut settings = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings {path}"))?;
            CoreSettings::from_json_str(&raw)
                .with_context(|| format!("Failed to parse settings {path}"))?
        }
        None => CoreSettings::default(),
    };
    if let Some(ms) = settle_ms {
        settings.settle_delay_ms = ms;
    }
    Ok(settings)
}

#[derive(Debug)]
pub struct SimulationReport {
    pub project: String,
    pub final_state: PipelineState,
    pub notices: Vec<Notice>,
    pub requests: Vec<String>,
    /// Virtual time the cascade needed, in milliseconds.
    pub elapsed_ms: u64,
}

/// Backs up one project end to end against the loopback executor, deletes
/// its files in database-first order and lets the cascade unwind it.
pub async fn cmd_simulate(settings: CoreSettings, now: NaiveDateTime) -> Result<SimulationReport> {
    let channel = Arc::new(LoopbackChannel::new(LoopbackDevice::default()));
    let sink = Arc::new(ConsoleSink::default());
    let orchestrator = BackupOrchestrator::new(settings, channel.clone(), sink.clone());
    let mut kernel = BackupKernel::new(orchestrator);

    kernel
        .sender()
        .send(InboundEvent::ChannelUp)
        .await
        .context("Event queue closed")?;
    pump(&mut kernel, &channel).await?;

    let gate = kernel.orchestrator.gate().state();
    if gate != GateState::RootReady {
        bail!("Loopback device did not reach root (gate is {gate})");
    }

    kernel.dispatch(AppCommand::RequestCredentials);
    pump(&mut kernel, &channel).await?;

    let project = kernel
        .orchestrator
        .create_project(now)
        .context("Credentials were not accepted")?;
    pump(&mut kernel, &channel).await?;

    for resource in ResourceType::ALL {
        kernel.dispatch(AppCommand::Start {
            project: project.clone(),
            resource,
        });
        pump(&mut kernel, &channel).await?;
    }

    for resource in ResourceType::ALL {
        kernel.dispatch(AppCommand::Delete {
            project: project.clone(),
            resource,
        });
        pump(&mut kernel, &channel).await?;
    }

    let started = kernel.orchestrator.now_ms();
    while let Some(due) = kernel.orchestrator.next_deferred_due() {
        kernel.tick_at(due);
    }
    let elapsed_ms = kernel.orchestrator.now_ms() - started;

    let final_state = kernel
        .orchestrator
        .pipeline(&project)
        .map(|p| p.state())
        .context("Project disappeared from the registry")?;

    Ok(SimulationReport {
        project,
        final_state,
        notices: sink.notices(),
        requests: channel.sent(),
        elapsed_ms,
    })
}

/// Feeds loopback replies back through the event queue until it goes quiet.
async fn pump(kernel: &mut LoopbackKernel, channel: &LoopbackChannel) -> Result<()> {
    let tx = kernel.sender();
    let now = kernel.orchestrator.now_ms();
    for _ in 0..MAX_PUMP_ROUNDS {
        kernel.tick_at(now);
        let replies = channel.drain();
        if replies.is_empty() {
            return Ok(());
        }
        for reply in replies {
            tx.send(InboundEvent::Response(reply))
                .await
                .context("Event queue closed")?;
        }
    }
    bail!("Loopback executor still replying after {MAX_PUMP_ROUNDS} rounds")
}
