//! Single-threaded coordinator of the device gate and every backup pipeline.
//!
//! Everything runs on the caller's thread: inbound responses, operator
//! actions and deferred cascades. Remote work is fire-and-forget through the
//! [`ChannelPort`]; its results come back through [`BackupOrchestrator::handle_response`].

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use wbak_core::{
    generate_name, DeviceGate, GateEffect, GateEvent, GateState, ItemStatus, PersistedListing,
    Pipeline, PipelineEffect, PipelineEvent, PipelineState, Poller, Project, ProjectName,
    ResourceType,
};

use crate::dispatch::{CommandDispatcher, DispatchError, HandlerTable, Hooks};
use crate::domain::{CoreSettings, CredentialCandidates, DeviceInfo, DeviceStatus, Notice};
use crate::ingest::{ProgressReport, ProgressSignal};
use crate::ports::{ChannelPort, StatusSink};
use crate::protocol::{
    poller_task, CommandId, CommandResponse, DbPullReport, DecryptReport, ItemAck,
    ResourceReport, TaskCategory, RECOVER_TASK_NAME,
};
use crate::registry::PipelineRegistry;
use crate::scheduler::{DeferredAction, Scheduler};
use crate::viewmodel::{gate_vm, project_vm, GateVm, ProjectVm};

pub struct BackupOrchestrator<C, S> {
    settings: CoreSettings,
    gate: DeviceGate,
    device: DeviceStatus,
    candidates: CredentialCandidates,
    registry: PipelineRegistry,
    dispatcher: CommandDispatcher<C>,
    handlers: HandlerTable<Self>,
    scheduler: Scheduler,
    sink: Arc<S>,
}

impl<C, S> BackupOrchestrator<C, S>
where
    C: ChannelPort,
    S: StatusSink,
{
    pub fn new(settings: CoreSettings, channel: Arc<C>, sink: Arc<S>) -> Self {
        let dispatcher = CommandDispatcher::new(channel, settings.channel.clone());
        Self {
            settings,
            gate: DeviceGate::new(),
            device: DeviceStatus::default(),
            candidates: CredentialCandidates::default(),
            registry: PipelineRegistry::new(),
            dispatcher,
            handlers: Self::handler_table(),
            scheduler: Scheduler::new(),
            sink,
        }
    }

    fn handler_table() -> HandlerTable<Self> {
        use CommandId::*;
        HandlerTable::new()
            .before(CheckDevice, Self::on_device_serial)
            .after(CheckDevice, Self::on_device_presence)
            .before(CheckRoot, Self::on_root_recorded)
            .after(CheckRoot, Self::on_root_status)
            .before(CheckInsecure, Self::on_insecure_checked)
            .before(GetDeviceProperties, Self::on_device_properties)
            .before(GetUsers, Self::on_users)
            .before(GetImei, Self::on_imei)
            .before(GetUin, Self::on_uin)
            .before(CreateProject, Self::on_project_created)
            .before(GetExistProjects, Self::on_exist_projects)
            .before(CheckDbSize, Self::on_stage_observed)
            .after(CheckDbSize, Self::on_db_progress)
            .before(CheckDecryptProgress, Self::on_stage_observed)
            .after(CheckDecryptProgress, Self::on_decrypt_progress)
            .before(CheckResourceProgress, Self::on_stage_observed)
            .after(CheckResourceProgress, Self::on_resource_progress)
            .before(DeleteFile, Self::on_file_deleted)
            .before(StopTask, Self::on_task_stopped)
    }

    // --- Accessors ---

    pub fn settings(&self) -> &CoreSettings {
        &self.settings
    }

    pub fn gate(&self) -> &DeviceGate {
        &self.gate
    }

    pub fn device(&self) -> &DeviceStatus {
        &self.device
    }

    pub fn candidates(&self) -> &CredentialCandidates {
        &self.candidates
    }

    pub fn registry(&self) -> &PipelineRegistry {
        &self.registry
    }

    pub fn pipeline(&self, name: &str) -> Option<&Pipeline> {
        self.registry.get(name)
    }

    pub fn project_view(&self, name: &str) -> Option<ProjectVm> {
        self.registry.get(name).map(project_vm)
    }

    pub fn project_views(&self) -> Vec<ProjectVm> {
        self.registry.iter().map(project_vm).collect()
    }

    pub fn gate_view(&self) -> GateVm {
        gate_vm(&self.gate, self.device.info.as_ref())
    }

    pub fn pending_deferred(&self) -> usize {
        self.scheduler.pending()
    }

    pub fn next_deferred_due(&self) -> Option<u64> {
        self.scheduler.next_due()
    }

    pub fn now_ms(&self) -> u64 {
        self.scheduler.now_ms()
    }

    /// Moves the deferred-work clock forward without running anything.
    /// Work scheduled afterwards is due relative to `now_ms`.
    pub fn advance_clock(&mut self, now_ms: u64) {
        self.scheduler.advance_to(now_ms);
    }

    /// Whether a command sent with `exec` still waits for its response.
    pub fn is_awaiting(&self, command: CommandId) -> bool {
        self.dispatcher.is_pending(command)
    }

    // --- Device gate ---

    pub fn channel_connected(&mut self) -> bool {
        self.fire_gate(GateEvent::ConnectChannel)
    }

    pub fn channel_disconnected(&mut self) -> bool {
        self.fire_gate(GateEvent::DisconnectChannel)
    }

    /// Fires a gate event and carries out its effects. Returns false when the
    /// event is not permitted in the current state.
    pub fn fire_gate(&mut self, event: GateEvent) -> bool {
        let transition = match self.gate.fire(event) {
            Ok(t) => t,
            Err(rejected) => {
                debug!("{rejected}");
                return false;
            }
        };

        for step in &transition.steps {
            self.announce_gate_step(step.event);
        }
        for effect in transition.effects {
            self.apply_gate_effect(effect);
        }
        self.sink.gate_changed(self.gate.state());
        true
    }

    fn announce_gate_step(&mut self, event: GateEvent) {
        match event {
            GateEvent::ConnectChannel => self.sink.notice(Notice::success("Server is connected")),
            GateEvent::DisconnectChannel => {
                self.sink
                    .notice(Notice::error("Server has been disconnected"));
            }
            GateEvent::ConnectDevice => self.sink.notice(Notice::success("Device is connected")),
            GateEvent::DisconnectDevice => {
                self.device = DeviceStatus::default();
                self.sink
                    .notice(Notice::error("Device has been disconnected"));
            }
            _ => {}
        }
    }

    fn apply_gate_effect(&mut self, effect: GateEffect) {
        match effect {
            GateEffect::StartPoller(poller) => {
                let (name, command) = poller_task(poller);
                let interval = match poller {
                    Poller::DevicePresence => self.settings.device_poll_secs,
                    Poller::RootStatus => self.settings.root_poll_secs,
                };
                self.send_task(
                    name,
                    TaskCategory::Heartbeat,
                    json!({ "command": command, "interval": interval }),
                );
            }
            GateEffect::StopPoller(poller) => {
                let (name, _) = poller_task(poller);
                match self.dispatcher.kill_task(name) {
                    Ok(()) => {}
                    // the executor drops heartbeats of a closed channel on its own
                    Err(e) if e.is_disconnected() => debug!("{e}"),
                    Err(e) => self.report_dispatch_error(e),
                }
            }
            GateEffect::RecoverProjects => {
                self.send_task(
                    RECOVER_TASK_NAME,
                    TaskCategory::Once,
                    json!({ "command": CommandId::GetExistProjects }),
                );
            }
            GateEffect::ReevaluateCredentials => self.reevaluate_credentials(),
            GateEffect::BroadcastCapabilities => self.broadcast_capabilities(),
        }
    }

    /// Recomputes every pipeline's stage-start flags against the gate.
    fn broadcast_capabilities(&mut self) {
        let gate = &self.gate;
        let mut changed = Vec::new();
        for pipeline in self.registry.iter_mut() {
            if pipeline.refresh_capabilities(|t| gate.permits(t)) {
                changed.push(project_vm(pipeline));
            }
        }
        for vm in &changed {
            self.sink.project_updated(vm);
        }
    }

    // --- Credentials ---

    /// Replaces the credential inputs. Only accepted once root is granted.
    pub fn set_credentials(&mut self, imei: &str, uin: &str, user: &str) -> bool {
        if self.gate.state() < GateState::RootReady {
            debug!(gate = %self.gate.state(), "credential edit ignored before root");
            return false;
        }
        let previous = self.gate.credentials().password().to_string();
        if !self.gate.set_credential_inputs(imei, uin, user) {
            return false;
        }
        let password = self.gate.credentials().password().to_string();
        if !password.is_empty() && password != previous {
            self.sink
                .notice(Notice::info(format!("Calculated password: {password}")));
        }
        self.reevaluate_credentials();
        true
    }

    pub fn select_user(&mut self, user: &str) -> bool {
        let c = self.gate.credentials().clone();
        self.set_credentials(&c.imei, &c.uin, user)
    }

    pub fn select_imei(&mut self, imei: &str) -> bool {
        let c = self.gate.credentials().clone();
        self.set_credentials(imei, &c.uin, &c.user)
    }

    pub fn set_uin(&mut self, uin: &str) -> bool {
        let c = self.gate.credentials().clone();
        self.set_credentials(&c.imei, uin, &c.user)
    }

    fn reevaluate_credentials(&mut self) {
        if let Some(event) = self.gate.credentials_follow_up() {
            self.fire_gate(event);
        }
    }

    /// Asks the device for users, IMEI and UIN.
    pub fn request_credentials(&mut self) -> bool {
        [CommandId::GetUsers, CommandId::GetImei, CommandId::GetUin]
            .into_iter()
            .fold(true, |ok, c| self.send_command(c, c.as_str(), json!([])) && ok)
    }

    // --- Projects ---

    /// Registers a new project at `Init` and asks the executor to create it.
    pub fn create_project(&mut self, now: NaiveDateTime) -> Option<ProjectName> {
        if self.gate.state() != GateState::CredentialsReady {
            debug!(gate = %self.gate.state(), "project creation needs complete credentials");
            return None;
        }
        let credentials = self.gate.credentials().clone();
        let name = generate_name(now);
        let project = match Project::new(&name, credentials.user.as_str(), credentials.password())
        {
            Ok(p) => p,
            Err(e) => {
                warn!("{e}");
                return None;
            }
        };
        self.registry.insert(Pipeline::new(project));

        let params = json!({
            "command": CommandId::CreateProject,
            "user": credentials.user,
            "password": credentials.password(),
        });
        if !self.send_task(&name, TaskCategory::Once, params) {
            self.registry.evict(&name);
            return None;
        }
        info!(project = %name, "project created");
        self.publish(&name);
        Some(name)
    }

    /// Rebuilds pipelines from a persisted listing.
    pub fn load_listing(&mut self, listing: &PersistedListing) -> Vec<ProjectName> {
        let names = self.registry.reconstruct(listing);
        info!(
            count = names.len(),
            skipped = listing.skipped,
            "projects recovered"
        );
        for name in &names {
            self.publish(name);
        }
        names
    }

    /// Changes user/password of a project whose first stage has not gone out yet.
    pub fn update_project_credentials(&mut self, name: &str, user: &str, password: &str) -> bool {
        let Some(pipeline) = self.registry.get_mut(name) else {
            return false;
        };
        if !pipeline.update_credentials(user, password) {
            debug!(project = name, "credentials are fixed once a stage was dispatched");
            return false;
        }
        self.publish(name);
        true
    }

    pub fn evict(&mut self, name: &str) -> bool {
        if self.registry.evict(name).is_none() {
            return false;
        }
        info!(project = name, "project evicted");
        self.sink.project_removed(name);
        true
    }

    // --- Stage commands ---

    /// Dispatches the stage task for `resource` and moves the pipeline into
    /// the stage. Nothing is sent when the guard fails.
    pub fn start(&mut self, name: &str, resource: ResourceType) -> bool {
        let Some(pipeline) = self.registry.get(name) else {
            debug!(project = name, "start for unknown project");
            return false;
        };
        if pipeline.state() != resource.prerequisite_state() || !self.gate.permits(resource) {
            debug!(
                project = name,
                %resource,
                state = %pipeline.state(),
                gate = %self.gate.state(),
                "stage start not permitted"
            );
            return false;
        }

        let category = TaskCategory::for_stage(resource);
        let project = pipeline.project();
        let params = match resource {
            ResourceType::EncryptedDb => json!({
                "command": category.as_str(),
                "user": project.user,
            }),
            ResourceType::DecryptedDb => json!({
                "command": category.as_str(),
                "password": project.password,
            }),
            ResourceType::ResourceArchive => json!({
                "command": category.as_str(),
                "user": project.user,
                "timeout": self.settings.resource_timeout_secs,
            }),
        };
        if !self.send_task(name, category, params) {
            return false;
        }
        if let Some(pipeline) = self.registry.get_mut(name) {
            pipeline.mark_dispatched();
        }
        self.fire_pipeline(name, PipelineEvent::Start(resource))
    }

    /// Asks the executor to stop a running stage. The pipeline moves when the
    /// executor confirms.
    pub fn request_stop(&mut self, name: &str, resource: ResourceType) -> bool {
        let Some(pipeline) = self.registry.get(name) else {
            return false;
        };
        if !pipeline.can(PipelineEvent::Stop(resource)) {
            debug!(project = name, %resource, state = %pipeline.state(), "nothing to stop");
            return false;
        }
        self.send_command(CommandId::StopTask, name, json!({ "type": resource }))
    }

    /// Asks the executor to delete a completed resource's file.
    pub fn request_delete(&mut self, name: &str, resource: ResourceType) -> bool {
        let Some(pipeline) = self.registry.get(name) else {
            return false;
        };
        let item = pipeline.item(resource);
        if item.status() != ItemStatus::Done || item.byte_total == 0 {
            debug!(project = name, %resource, "nothing to delete");
            return false;
        }
        let params = json!({ "type": resource, "path": item.path });
        self.send_command(CommandId::DeleteFile, name, params)
    }

    /// Applies a confirmed delete. Out-of-order database deletes only clear
    /// the byte total so a later cascade can remove the stale marker.
    pub fn apply_delete(&mut self, name: &str, resource: ResourceType) {
        let Some(pipeline) = self.registry.get_mut(name) else {
            return;
        };
        if pipeline.can(PipelineEvent::Delete(resource)) {
            self.fire_pipeline(name, PipelineEvent::Delete(resource));
            return;
        }
        match resource {
            ResourceType::ResourceArchive => {
                debug!(project = name, state = %pipeline.state(), "resource delete ignored");
            }
            _ => {
                pipeline.item_mut(resource).clear_file();
                debug!(project = name, %resource, "out-of-order delete, size cleared");
                self.publish(name);
            }
        }
    }

    fn fire_pipeline(&mut self, name: &str, event: PipelineEvent) -> bool {
        let Some(pipeline) = self.registry.get_mut(name) else {
            debug!(project = name, %event, "event for unknown project");
            return false;
        };
        let transition = match pipeline.fire(event) {
            Ok(t) => t,
            Err(rejected) => {
                debug!(project = name, "{rejected}");
                return false;
            }
        };

        for effect in transition.effects {
            match effect {
                PipelineEffect::AwaitGate => self.await_gate(name),
                PipelineEffect::ScheduleDelete(resource) => {
                    let due = self.scheduler.schedule_in(
                        self.settings.settle_delay_ms(),
                        DeferredAction::CascadeDelete {
                            project: name.to_string(),
                            resource,
                        },
                    );
                    info!(project = name, %resource, due_ms = due, "cascade delete scheduled");
                }
            }
        }
        self.publish(name);
        true
    }

    /// Sends a freshly created pipeline back to `Init` while the gate is not ready.
    fn await_gate(&mut self, name: &str) {
        if self.gate.is_ready_for_projects() {
            return;
        }
        if let Some(pipeline) = self.registry.get_mut(name) {
            debug!(project = name, gate = %self.gate.state(), "device not ready, back to init");
            let _ = pipeline.fire(PipelineEvent::Goto(PipelineState::Init));
        }
    }

    fn publish(&mut self, name: &str) {
        let gate = &self.gate;
        if let Some(pipeline) = self.registry.get_mut(name) {
            pipeline.refresh_capabilities(|t| gate.permits(t));
            self.sink.project_updated(&project_vm(pipeline));
        }
    }

    // --- Progress ingestion ---

    /// Applies one normalised progress report to its pipeline.
    pub fn ingest(&mut self, report: ProgressReport) {
        let signal = report.signal();
        let name = report.project.as_str();
        let resource = report.resource;
        let Some(pipeline) = self.registry.get_mut(name) else {
            debug!(project = name, "report for unknown project");
            return;
        };

        let item = pipeline.item_mut(resource);
        // only live reports carry a trustworthy path and size
        if matches!(signal, ProgressSignal::Progress | ProgressSignal::Finished) {
            item.set_file(&report.path, report.byte_total);
            if let Some(current) = report.byte_current {
                item.byte_current = current;
            }
        }
        item.progress = report.progress;
        if let Some(label) = &report.step_label {
            item.step_label = label.clone();
        }
        if let Some(step) = report.step_index {
            item.step_index = step;
        }

        match signal {
            ProgressSignal::Finished => {
                if pipeline.can(PipelineEvent::Finish(resource)) {
                    self.fire_pipeline(name, PipelineEvent::Finish(resource));
                    return;
                }
                pipeline.strand_completion(resource);
                warn!(project = name, %resource, state = %pipeline.state(), "completion arrived outside the stage");
            }
            ProgressSignal::Progress => {
                if pipeline.resume_item(resource) {
                    debug!(project = name, %resource, "item resumed from a stale display");
                }
            }
            ProgressSignal::Pending => {}
            ProgressSignal::Failed => {
                if pipeline.can(PipelineEvent::Stop(resource)) {
                    self.fire_pipeline(name, PipelineEvent::Stop(resource));
                }
                if let Some(pipeline) = self.registry.get_mut(name) {
                    pipeline.fail_item(resource);
                }
                warn!(project = name, %resource, "stage failed remotely");
                self.sink
                    .notice(Notice::error(format!("{} [Error]", resource.label())));
            }
            ProgressSignal::TimedOut => {
                warn!(project = name, %resource, "stage timed out, killing task");
                if let Err(e) = self.dispatcher.kill_task(name) {
                    self.report_dispatch_error(e);
                }
                let label = report.step_label.as_deref().unwrap_or("Timeout");
                self.sink.notice(Notice::error(format!("{name}: {label}")));
            }
        }
        self.publish(name);
    }

    // --- Deferred work ---

    /// Runs every deferred action due at or before `now_ms`, in due order.
    /// Returns how many ran.
    pub fn tick_at(&mut self, now_ms: u64) -> usize {
        let mut ran = 0;
        while let Some(action) = self.scheduler.pop_due(now_ms) {
            self.run_deferred(action);
            ran += 1;
        }
        self.scheduler.advance_to(now_ms);
        ran
    }

    fn run_deferred(&mut self, action: DeferredAction) {
        match action {
            DeferredAction::CascadeDelete { project, resource } => {
                let legal = self
                    .registry
                    .get(&project)
                    .is_some_and(|p| p.can(PipelineEvent::Delete(resource)));
                if !legal {
                    debug!(%project, %resource, "cascade delete no longer applicable");
                    return;
                }
                info!(%project, %resource, "cascade delete");
                self.fire_pipeline(&project, PipelineEvent::Delete(resource));
            }
        }
    }

    // --- Responses ---

    /// Routes a command or task response through its (before, after) handlers.
    pub fn handle_response(&mut self, response: CommandResponse) {
        let hooks = match CommandId::parse(&response.command) {
            Some(command) => {
                match self.dispatcher.resolve(command) {
                    Some(sent_as) => debug!(%command, name = %sent_as, "command completed"),
                    None => debug!(
                        %command,
                        name = %response.name,
                        "response without a pending request"
                    ),
                }
                self.handlers.lookup(command)
            }
            None => {
                debug!(command = %response.command, "no handlers for command");
                Hooks::none()
            }
        };

        if let Some(before) = hooks.before {
            before(self, &response);
        }
        if !response.message.is_empty() {
            let notice = if response.success {
                Notice::info(response.message.clone())
            } else {
                Notice::error(response.message.clone())
            };
            self.sink.notice(notice);
        }
        if let Some(after) = hooks.after {
            after(self, &response);
        }
    }

    fn on_device_serial(&mut self, response: &CommandResponse) {
        let serial = response.data.as_str().unwrap_or_default();
        if serial.is_empty() || serial == self.device.serial {
            return;
        }
        self.device.serial = serial.to_string();
        self.send_command(
            CommandId::GetDeviceProperties,
            "Get device properties",
            json!([]),
        );
    }

    fn on_device_presence(&mut self, response: &CommandResponse) {
        let present = response.data.as_str().is_some_and(|s| !s.is_empty());
        if !present && self.gate.can(GateEvent::DisconnectDevice) {
            self.fire_gate(GateEvent::DisconnectDevice);
        } else if present && self.gate.can(GateEvent::ConnectDevice) {
            self.fire_gate(GateEvent::ConnectDevice);
        }
    }

    fn on_root_recorded(&mut self, response: &CommandResponse) {
        let rooted = response.data.as_bool().unwrap_or(false);
        let previous = self.device.rooted;
        self.device.remind_insecure = previous != Some(true) && previous != Some(rooted);
        self.device.rooted = Some(rooted);
    }

    fn on_root_status(&mut self, response: &CommandResponse) {
        let rooted = response.data.as_bool().unwrap_or(false);
        if rooted && self.gate.can(GateEvent::GrantRoot) {
            self.fire_gate(GateEvent::GrantRoot);
        } else if !rooted && self.gate.can(GateEvent::DenyRoot) {
            self.fire_gate(GateEvent::DenyRoot);
        }
        if !rooted && self.gate.state() == GateState::DeviceReady {
            self.send_command(CommandId::CheckInsecure, "Check insecure", json!([]));
        }
    }

    fn on_insecure_checked(&mut self, response: &CommandResponse) {
        let installed = response.data.as_bool().unwrap_or(false);
        if self.device.remind_insecure {
            let advice = if installed {
                "Please check \"Enable insecure adbd\" in adbd Insecure on your device"
            } else {
                "If the device is already rooted, install adbd Insecure from the root status menu"
            };
            self.sink.notice(Notice::info(advice));
        }
        self.device.insecure_installed = Some(installed);
        self.device.remind_insecure = false;
    }

    fn on_device_properties(&mut self, response: &CommandResponse) {
        let Some(mut info) = parse_data::<DeviceInfo>(response) else {
            return;
        };
        info.serial = self.device.serial.clone();
        info!(model = %info.model, serial = %info.serial, "device identified");
        self.device.info = Some(info);
    }

    fn on_users(&mut self, response: &CommandResponse) {
        self.candidates.users = string_list(&response.data);
        if let [only] = self.candidates.users.as_slice() {
            let only = only.clone();
            self.select_user(&only);
        }
    }

    fn on_imei(&mut self, response: &CommandResponse) {
        self.candidates.imeis = string_list(&response.data);
        if let [only] = self.candidates.imeis.as_slice() {
            let only = only.clone();
            self.select_imei(&only);
        }
    }

    fn on_uin(&mut self, response: &CommandResponse) {
        if let Some(uin) = response.data.as_str().filter(|s| !s.is_empty()) {
            let uin = uin.to_string();
            self.set_uin(&uin);
        }
    }

    fn on_project_created(&mut self, response: &CommandResponse) {
        let Some(name) = response.data.as_str().map(str::to_string) else {
            return;
        };
        self.fire_pipeline(&name, PipelineEvent::WaitPullDb);
    }

    fn on_exist_projects(&mut self, response: &CommandResponse) {
        if response.data.is_null() || response.data.as_str() == Some("") {
            return;
        }
        match PersistedListing::from_value(response.data.clone()) {
            Ok(listing) => {
                self.load_listing(&listing);
            }
            Err(e) => {
                warn!("unreadable project listing: {e}");
                self.sink.notice(Notice::error(e.to_string()));
            }
        }
    }

    /// A report for a pipeline still at the stage's prerequisite means the
    /// stage was started elsewhere.
    fn on_stage_observed(&mut self, response: &CommandResponse) {
        let Some(resource) = report_stage(&response.command) else {
            return;
        };
        let Some(name) = response.data.get("projectName").and_then(Value::as_str) else {
            return;
        };
        let name = name.to_string();
        let Some(pipeline) = self.registry.get_mut(&name) else {
            return;
        };
        if !pipeline.can(PipelineEvent::Start(resource)) {
            return;
        }
        pipeline.mark_dispatched();
        info!(project = %name, %resource, "stage running remotely");
        self.fire_pipeline(&name, PipelineEvent::Start(resource));
    }

    fn on_db_progress(&mut self, response: &CommandResponse) {
        if let Some(report) = parse_data::<DbPullReport>(response) {
            self.ingest(report.into());
        }
    }

    fn on_decrypt_progress(&mut self, response: &CommandResponse) {
        if let Some(report) = parse_data::<DecryptReport>(response) {
            self.ingest(report.into());
        }
    }

    fn on_resource_progress(&mut self, response: &CommandResponse) {
        if let Some(report) = parse_data::<ResourceReport>(response) {
            self.ingest(report.into());
        }
    }

    fn on_file_deleted(&mut self, response: &CommandResponse) {
        let Some(ack) = parse_data::<ItemAck>(response) else {
            return;
        };
        if ack.success {
            self.apply_delete(&ack.project_name, ack.resource);
        }
    }

    fn on_task_stopped(&mut self, response: &CommandResponse) {
        let Some(ack) = parse_data::<ItemAck>(response) else {
            return;
        };
        if response.success {
            self.fire_pipeline(&ack.project_name, PipelineEvent::Stop(ack.resource));
        }
    }

    // --- Sending ---

    fn send_command(&mut self, command: CommandId, name: &str, params: Value) -> bool {
        match self.dispatcher.exec(command, name, params) {
            Ok(()) => true,
            Err(e) => {
                self.report_dispatch_error(e);
                false
            }
        }
    }

    fn send_task(&mut self, name: &str, category: TaskCategory, params: Value) -> bool {
        match self.dispatcher.add_task(name, category, params) {
            Ok(()) => true,
            Err(e) => {
                self.report_dispatch_error(e);
                false
            }
        }
    }

    fn report_dispatch_error(&self, e: DispatchError) {
        warn!("{e}");
        self.sink.notice(Notice::error(e.to_string()));
    }
}

fn report_stage(command: &str) -> Option<ResourceType> {
    match CommandId::parse(command)? {
        CommandId::CheckDbSize => Some(ResourceType::EncryptedDb),
        CommandId::CheckDecryptProgress => Some(ResourceType::DecryptedDb),
        CommandId::CheckResourceProgress => Some(ResourceType::ResourceArchive),
        _ => None,
    }
}

fn parse_data<T: DeserializeOwned>(response: &CommandResponse) -> Option<T> {
    if response.data.is_null() {
        return None;
    }
    match serde_json::from_value(response.data.clone()) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(command = %response.command, "malformed response data: {e}");
            None
        }
    }
}

/// Accepts a list of strings or a single string.
fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Value::String(s) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}
