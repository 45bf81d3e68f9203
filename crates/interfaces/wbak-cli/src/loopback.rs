//! In-memory stand-in for the remote task executor.
//!
//! Every request is answered at once with the responses a healthy, rooted
//! device would eventually produce. Replies are queued until drained.

use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use wbak_app_core::{
    ChannelPort, CommandId, CommandRequest, CommandResponse, KillRequest, Notice, ProjectVm,
    Severity, StatusSink, TaskRequest,
};
use wbak_config::RESOURCE_UNIT_BYTES;
use wbak_core::GateState;

#[derive(Debug, Clone)]
pub struct LoopbackDevice {
    pub serial: String,
    pub model: String,
    pub imei: String,
    pub uin: String,
    pub user: String,
    pub rooted: bool,
    pub db_bytes: u64,
    pub resource_bytes: u64,
}

impl Default for LoopbackDevice {
    fn default() -> Self {
        Self {
            serial: "loopback-0001".into(),
            model: "Loopback".into(),
            imei: "356987012345678".into(),
            uin: "1234567890".into(),
            user: "0123456789abcdef0123456789abcdef".into(),
            rooted: true,
            db_bytes: 12_940_000,
            resource_bytes: 52_428_800,
        }
    }
}

pub struct LoopbackChannel {
    device: LoopbackDevice,
    connected: AtomicBool,
    replies: Mutex<VecDeque<CommandResponse>>,
    sent: Mutex<Vec<String>>,
}

impl LoopbackChannel {
    pub fn new(device: LoopbackDevice) -> Self {
        Self {
            device,
            connected: AtomicBool::new(true),
            replies: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Takes every reply produced so far, oldest first.
    pub fn drain(&self) -> Vec<CommandResponse> {
        lock(&self.replies).drain(..).collect()
    }

    /// One line per request received, e.g. `task pull_db 20190301123005_ab12`.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }

    fn record(&self, line: String) {
        lock(&self.sent).push(line);
    }

    fn reply(&self, response: CommandResponse) {
        lock(&self.replies).push_back(response);
    }

    fn stage_replies(&self, project: &str, command: &str) -> Vec<CommandResponse> {
        let d = &self.device;
        match command {
            "pull_db" => {
                let path = format!("data/{project}/EnMicroMsg.db");
                let total = d.db_bytes as i64;
                [0.5, 1.0]
                    .into_iter()
                    .map(|p| {
                        CommandResponse::ok(
                            CommandId::CheckDbSize,
                            json!({
                                "projectName": project,
                                "path": path,
                                "src_byte": total,
                                "dest_byte": (total as f64 * p) as i64,
                                "progress": p,
                            }),
                        )
                    })
                    .collect()
            }
            "decrypt" => {
                let path = format!("data/{project}/DeMicroMsg.db");
                [(0.5, "Decrypting"), (1.0, "Done")]
                    .into_iter()
                    .map(|(p, step)| {
                        CommandResponse::ok(
                            CommandId::CheckDecryptProgress,
                            json!({
                                "projectName": project,
                                "path": path,
                                "byte": d.db_bytes,
                                "step_name": step,
                                "progress": p,
                            }),
                        )
                    })
                    .collect()
            }
            "pull_res" => {
                let path = format!("data/{project}/Resource.tar");
                let kb = d.resource_bytes as f64 / RESOURCE_UNIT_BYTES as f64;
                [(1, 0.5, "Pulling images"), (-1, 1.0, "Done")]
                    .into_iter()
                    .map(|(step, p, name)| {
                        CommandResponse::ok(
                            CommandId::CheckResourceProgress,
                            json!({
                                "projectName": project,
                                "path": path,
                                "byte": kb,
                                "current": kb * p,
                                "step": step,
                                "step_name": name,
                                "progress": p,
                            }),
                        )
                    })
                    .collect()
            }
            _ => Vec::new(),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // a panic while holding the lock leaves plain data behind
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ChannelPort for LoopbackChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn exec_command(&self, request: &CommandRequest) -> anyhow::Result<()> {
        self.record(format!("exec {} {}", request.command, request.name));
        let d = &self.device;
        let data = match request.command {
            CommandId::GetDeviceProperties => json!({
                "ro.product.manufacturer": "Loopback",
                "ro.product.model": d.model,
                "net.hostname": "loopback",
            }),
            CommandId::GetUsers => json!([d.user]),
            CommandId::GetImei => json!([d.imei]),
            CommandId::GetUin => json!(d.uin),
            CommandId::CheckInsecure => json!(false),
            CommandId::StopTask | CommandId::DeleteFile => json!({
                "projectName": request.name,
                "type": request.params.get("type").cloned().unwrap_or(Value::Null),
                "success": true,
            }),
            _ => Value::Null,
        };
        self.reply(CommandResponse::ok(request.command, data).with_name(&request.name));
        Ok(())
    }

    fn add_task(&self, request: &TaskRequest) -> anyhow::Result<()> {
        let command = request
            .params
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default();
        self.record(format!("task {command} {}", request.name));

        let d = &self.device;
        let replies = match command {
            "check_device" => vec![CommandResponse::ok(CommandId::CheckDevice, json!(d.serial))],
            "check_root" => vec![CommandResponse::ok(CommandId::CheckRoot, json!(d.rooted))],
            "get_exist_projects" => {
                vec![CommandResponse::ok(CommandId::GetExistProjects, json!({}))]
            }
            "create_project" => vec![CommandResponse::ok(
                CommandId::CreateProject,
                json!(request.name),
            )
            .with_message(format!("Project {} created", request.name))],
            other => self.stage_replies(&request.name, other),
        };
        for r in replies {
            self.reply(r.with_name(&request.name));
        }
        Ok(())
    }

    fn kill_task(&self, request: &KillRequest) -> anyhow::Result<()> {
        self.record(format!("kill {}", request.name));
        Ok(())
    }
}

/// Collects notices and logs view updates.
#[derive(Default)]
pub struct ConsoleSink {
    notices: Mutex<Vec<Notice>>,
}

impl ConsoleSink {
    pub fn notices(&self) -> Vec<Notice> {
        lock(&self.notices).clone()
    }
}

impl StatusSink for ConsoleSink {
    fn notice(&self, notice: Notice) {
        match notice.severity {
            Severity::Error => tracing::warn!("{}", notice.message),
            _ => tracing::info!("{}", notice.message),
        }
        lock(&self.notices).push(notice);
    }

    fn project_updated(&self, project: &ProjectVm) {
        tracing::debug!(project = %project.name, state = %project.state, "project updated");
    }

    fn project_removed(&self, name: &str) {
        tracing::debug!(project = name, "project removed");
    }

    fn gate_changed(&self, state: GateState) {
        tracing::info!(%state, "gate changed");
    }
}
