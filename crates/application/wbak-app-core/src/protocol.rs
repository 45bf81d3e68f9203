//! Wire shapes exchanged with the remote task executor.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use wbak_core::{Poller, ResourceType};

/// Every command the executor understands, by wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandId {
    CheckDevice,
    CheckRoot,
    GetDeviceProperties,
    CheckInsecure,
    GetUsers,
    GetImei,
    GetUin,
    CreateProject,
    GetExistProjects,
    CheckDbSize,
    CheckDecryptProgress,
    CheckResourceProgress,
    DeleteFile,
    StopTask,
}

impl CommandId {
    pub const ALL: [CommandId; 14] = [
        CommandId::CheckDevice,
        CommandId::CheckRoot,
        CommandId::GetDeviceProperties,
        CommandId::CheckInsecure,
        CommandId::GetUsers,
        CommandId::GetImei,
        CommandId::GetUin,
        CommandId::CreateProject,
        CommandId::GetExistProjects,
        CommandId::CheckDbSize,
        CommandId::CheckDecryptProgress,
        CommandId::CheckResourceProgress,
        CommandId::DeleteFile,
        CommandId::StopTask,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommandId::CheckDevice => "check_device",
            CommandId::CheckRoot => "check_root",
            CommandId::GetDeviceProperties => "get_device_properties",
            CommandId::CheckInsecure => "check_insecure",
            CommandId::GetUsers => "get_users",
            CommandId::GetImei => "get_imei",
            CommandId::GetUin => "get_uin",
            CommandId::CreateProject => "create_project",
            CommandId::GetExistProjects => "get_exist_projects",
            CommandId::CheckDbSize => "check_db_size",
            CommandId::CheckDecryptProgress => "check_decrypt_progress",
            CommandId::CheckResourceProgress => "check_resource_progress",
            CommandId::DeleteFile => "delete_file",
            CommandId::StopTask => "stop_task",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Heartbeat,
    Once,
    PullDb,
    Decrypt,
    PullRes,
}

impl TaskCategory {
    /// Category of the long-running task that produces `resource`.
    pub fn for_stage(resource: ResourceType) -> Self {
        match resource {
            ResourceType::EncryptedDb => TaskCategory::PullDb,
            ResourceType::DecryptedDb => TaskCategory::Decrypt,
            ResourceType::ResourceArchive => TaskCategory::PullRes,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskCategory::Heartbeat => "heartbeat",
            TaskCategory::Once => "once",
            TaskCategory::PullDb => "pull_db",
            TaskCategory::Decrypt => "decrypt",
            TaskCategory::PullRes => "pull_res",
        }
    }
}

/// Task name and probe command of each heartbeat.
pub fn poller_task(poller: Poller) -> (&'static str, CommandId) {
    match poller {
        Poller::DevicePresence => ("Device checker", CommandId::CheckDevice),
        Poller::RootStatus => ("Root checker", CommandId::CheckRoot),
    }
}

pub const RECOVER_TASK_NAME: &str = "Exist projects";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandRequest {
    pub command: CommandId,
    pub name: String,
    pub channel: String,
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRequest {
    pub name: String,
    pub category: TaskCategory,
    pub channel: String,
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KillRequest {
    pub name: String,
    pub channel: String,
}

/// `(command, name, success, data, message)` as delivered for both command
/// callbacks and task responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub command: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub message: String,
}

impl CommandResponse {
    pub fn ok(command: CommandId, data: Value) -> Self {
        Self {
            command: command.as_str().to_string(),
            name: String::new(),
            success: true,
            data,
            message: String::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// `check_db_size`. Byte counts are `-1` when the pull failed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DbPullReport {
    #[serde(rename = "projectName")]
    pub project_name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub src_byte: i64,
    #[serde(default)]
    pub dest_byte: i64,
    pub progress: f64,
}

/// `check_decrypt_progress`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DecryptReport {
    #[serde(rename = "projectName")]
    pub project_name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub byte: i64,
    #[serde(default)]
    pub step_name: String,
    pub progress: f64,
}

/// `check_resource_progress`. Sizes are in kilobytes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResourceReport {
    #[serde(rename = "projectName")]
    pub project_name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub byte: f64,
    #[serde(default)]
    pub current: f64,
    #[serde(default)]
    pub step: i64,
    #[serde(default)]
    pub step_name: String,
    pub progress: f64,
}

/// Payload of `stop_task` and `delete_file` responses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ItemAck {
    #[serde(rename = "projectName")]
    pub project_name: String,
    #[serde(rename = "type")]
    pub resource: ResourceType,
    #[serde(default = "default_true")]
    pub success: bool,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_names_round_trip() {
        for c in CommandId::ALL {
            assert_eq!(CommandId::parse(c.as_str()), Some(c));
            assert_eq!(serde_json::to_value(c).unwrap(), json!(c.as_str()));
        }
        assert_eq!(CommandId::parse("install_insecure"), None);
    }

    #[test]
    fn task_request_serialises_with_wire_names() {
        let req = TaskRequest {
            name: "20190301123005_ab12".into(),
            category: TaskCategory::for_stage(ResourceType::ResourceArchive),
            channel: "android".into(),
            params: json!({"command": "pull_res"}),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["category"], "pull_res");
        assert_eq!(TaskCategory::PullRes.as_str(), "pull_res");
    }

    #[test]
    fn acks_parse_the_type_prefix() {
        let ack: ItemAck =
            serde_json::from_value(json!({"projectName": "p", "type": "De"})).unwrap();
        assert_eq!(ack.resource, ResourceType::DecryptedDb);
        assert!(ack.success);
    }
}
