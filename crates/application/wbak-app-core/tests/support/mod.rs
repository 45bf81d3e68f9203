#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use wbak_app_core::{
    BackupOrchestrator, ChannelPort, CommandId, CommandRequest, CommandResponse, CoreSettings,
    KillRequest, Notice, ProjectVm, Severity, StatusSink, TaskRequest,
};
use wbak_core::{GateState, ItemStatus, PersistedListing, PipelineState, ResourceType};

pub const IMEI: &str = "356987012345678";
pub const UIN: &str = "1234567890";
pub const USER: &str = "0123456789abcdef0123456789abcdef";

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Exec(CommandRequest),
    Task(TaskRequest),
    Kill(KillRequest),
}

/// Channel that records requests instead of sending them.
pub struct RecordingChannel {
    connected: AtomicBool,
    sent: Mutex<Vec<Sent>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn tasks(&self) -> Vec<TaskRequest> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Sent::Task(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn kills(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Sent::Kill(k) => Some(k.name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn commands(&self) -> Vec<CommandRequest> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Sent::Exec(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, sent: Sent) {
        self.sent.lock().unwrap().push(sent);
    }
}

impl ChannelPort for RecordingChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn exec_command(&self, request: &CommandRequest) -> anyhow::Result<()> {
        self.record(Sent::Exec(request.clone()));
        Ok(())
    }

    fn add_task(&self, request: &TaskRequest) -> anyhow::Result<()> {
        self.record(Sent::Task(request.clone()));
        Ok(())
    }

    fn kill_task(&self, request: &KillRequest) -> anyhow::Result<()> {
        self.record(Sent::Kill(request.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub notices: Mutex<Vec<Notice>>,
    pub updates: Mutex<Vec<ProjectVm>>,
    pub removed: Mutex<Vec<String>>,
    pub gates: Mutex<Vec<GateState>>,
}

impl RecordingSink {
    pub fn messages(&self, severity: Severity) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.severity == severity)
            .map(|n| n.message.clone())
            .collect()
    }

    pub fn last_update(&self, project: &str) -> Option<ProjectVm> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|vm| vm.name == project)
            .cloned()
    }
}

impl StatusSink for RecordingSink {
    fn notice(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }

    fn project_updated(&self, project: &ProjectVm) {
        self.updates.lock().unwrap().push(project.clone());
    }

    fn project_removed(&self, name: &str) {
        self.removed.lock().unwrap().push(name.to_string());
    }

    fn gate_changed(&self, state: GateState) {
        self.gates.lock().unwrap().push(state);
    }
}

pub type Orchestrator = BackupOrchestrator<RecordingChannel, RecordingSink>;

pub struct Harness {
    pub core: Orchestrator,
    pub channel: Arc<RecordingChannel>,
    pub sink: Arc<RecordingSink>,
}

pub fn harness(settle_delay_ms: u64) -> Harness {
    let settings = CoreSettings {
        settle_delay_ms,
        ..CoreSettings::default()
    };
    let channel = Arc::new(RecordingChannel::new());
    let sink = Arc::new(RecordingSink::default());
    let core = BackupOrchestrator::new(settings, channel.clone(), sink.clone());
    Harness {
        core,
        channel,
        sink,
    }
}

pub fn respond(core: &mut Orchestrator, command: CommandId, data: Value) {
    core.handle_response(CommandResponse::ok(command, data));
}

/// Channel up, device attached and rooted, credentials entered.
pub fn ready_harness(settle_delay_ms: u64) -> Harness {
    let mut h = harness(settle_delay_ms);
    h.core.channel_connected();
    respond(&mut h.core, CommandId::CheckDevice, json!("emulator-5554"));
    respond(&mut h.core, CommandId::CheckRoot, json!(true));
    assert!(h.core.set_credentials(IMEI, UIN, USER));
    assert_eq!(h.core.gate().state(), GateState::CredentialsReady);
    h.channel.take();
    h
}

pub const PROJECT: &str = "20190301123005_ab12";

/// Registers a project restored at `state` with no files on disk.
pub fn with_project(h: &mut Harness, state: PipelineState) {
    h.core.load_listing(&listing(Vec::new()));
    let pipeline = h.core.pipeline(PROJECT).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Waiting);
    if state != PipelineState::Waiting {
        goto(h, state);
    }
}

pub fn listing(files: Vec<Value>) -> PersistedListing {
    let mut projects = serde_json::Map::new();
    projects.insert(
        PROJECT.to_string(),
        json!({"user": USER, "password": "5cdc092", "files": files}),
    );
    PersistedListing::from_value(Value::Object(projects)).unwrap()
}

/// Jumps a restored project to a completed state by re-listing its files.
pub fn goto(h: &mut Harness, state: PipelineState) {
    let files: Vec<Value> = match state {
        PipelineState::DbPulled => vec![json!([format!("data/{PROJECT}/EnMicroMsg.db"), 100])],
        PipelineState::Decrypted => vec![
            json!([format!("data/{PROJECT}/EnMicroMsg.db"), 100]),
            json!([format!("data/{PROJECT}/DeMicroMsg.db"), 90]),
        ],
        PipelineState::ResPulled => vec![
            json!([format!("data/{PROJECT}/EnMicroMsg.db"), 100]),
            json!([format!("data/{PROJECT}/DeMicroMsg.db"), 90]),
            json!([format!("data/{PROJECT}/Resource.tar"), 2048]),
        ],
        other => panic!("no listing shape for {other}"),
    };
    h.core.load_listing(&listing(files));
    assert_eq!(h.core.pipeline(PROJECT).unwrap().state(), state);
}

pub fn db_report(progress: f64, src: i64, dest: i64) -> Value {
    json!({
        "projectName": PROJECT,
        "path": format!("data/{PROJECT}/EnMicroMsg.db"),
        "src_byte": src,
        "dest_byte": dest,
        "progress": progress,
    })
}

pub fn resource_report(step: i64, progress: f64) -> Value {
    json!({
        "projectName": PROJECT,
        "path": format!("data/{PROJECT}/Resource.tar"),
        "byte": 2.0,
        "current": 1.0,
        "step": step,
        "step_name": "Packing",
        "progress": progress,
    })
}

pub fn item_status(h: &Harness, resource: ResourceType) -> ItemStatus {
    h.core.pipeline(PROJECT).unwrap().item(resource).status()
}
