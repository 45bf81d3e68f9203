use std::time::Instant;
use tokio::sync::mpsc;
use tracing::debug;

use crate::app_core::{AppCommand, InboundEvent};
use crate::orchestrator::BackupOrchestrator;
use crate::ports::{ChannelPort, StatusSink};

/// Event loop around the orchestrator. Adapters push [`InboundEvent`]s
/// through [`BackupKernel::sender`]; the owner calls [`BackupKernel::tick`].
pub struct BackupKernel<C, S> {
    pub orchestrator: BackupOrchestrator<C, S>,
    tx: mpsc::Sender<InboundEvent>,
    rx: mpsc::Receiver<InboundEvent>,
    started: Instant,
}

impl<C, S> BackupKernel<C, S>
where
    C: ChannelPort,
    S: StatusSink,
{
    pub fn new(orchestrator: BackupOrchestrator<C, S>) -> Self {
        let (tx, rx) = mpsc::channel(100);
        Self {
            orchestrator,
            tx,
            rx,
            started: Instant::now(),
        }
    }

    pub fn dispatch(&mut self, cmd: AppCommand) {
        let o = &mut self.orchestrator;
        match cmd {
            AppCommand::SetCredentials { imei, uin, user } => {
                o.set_credentials(&imei, &uin, &user);
            }
            AppCommand::RequestCredentials => {
                o.request_credentials();
            }
            AppCommand::CreateProject => {
                o.create_project(chrono::Local::now().naive_local());
            }
            AppCommand::UpdateProjectCredentials {
                project,
                user,
                password,
            } => {
                o.update_project_credentials(&project, &user, &password);
            }
            AppCommand::Evict(project) => {
                o.evict(&project);
            }
            AppCommand::Start { project, resource } => {
                o.start(&project, resource);
            }
            AppCommand::Stop { project, resource } => {
                o.request_stop(&project, resource);
            }
            AppCommand::Delete { project, resource } => {
                o.request_delete(&project, resource);
            }
        }
    }

    pub fn apply(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::ChannelUp => {
                self.orchestrator.channel_connected();
            }
            InboundEvent::ChannelDown => {
                self.orchestrator.channel_disconnected();
            }
            InboundEvent::Response(response) => self.orchestrator.handle_response(response),
            InboundEvent::Command(cmd) => self.dispatch(cmd),
        }
    }

    /// Drains queued events, then runs deferred work due by now.
    pub fn tick(&mut self) -> usize {
        let elapsed = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.tick_at(elapsed)
    }

    /// Same as [`BackupKernel::tick`] on an explicit clock, in milliseconds
    /// since the kernel was created.
    pub fn tick_at(&mut self, now_ms: u64) -> usize {
        // events applied below schedule relative to this tick
        self.orchestrator.advance_clock(now_ms);
        let mut drained = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.apply(event);
            drained += 1;
        }
        let ran = self.orchestrator.tick_at(now_ms);
        if drained + ran > 0 {
            debug!(drained, deferred = ran, now_ms, "kernel tick");
        }
        drained + ran
    }

    pub fn sender(&self) -> mpsc::Sender<InboundEvent> {
        self.tx.clone()
    }
}
