use wbak_core::{
    format_percent, DeviceGate, GateState, ItemRecord, ItemStatus, Pipeline,
    PipelineEvent, PipelineState, ResourceType,
};

use crate::domain::DeviceInfo;

#[derive(Debug, Clone, PartialEq)]
pub struct ItemVm {
    pub resource: ResourceType,
    pub label: &'static str,
    pub status: ItemStatus,
    pub file_name: String,
    pub size_label: String,
    pub progress_label: Option<String>,
    pub step_label: String,
    pub can_start: bool,
    pub can_stop: bool,
    pub can_delete: bool,
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectVm {
    pub name: String,
    pub id: String,
    pub created_label: String,
    pub user_label: String,
    pub password: String,
    pub state: PipelineState,
    pub items: Vec<ItemVm>,
}

impl ProjectVm {
    pub fn item(&self, resource: ResourceType) -> &ItemVm {
        &self.items[resource.index()]
    }
}

fn size_label(item: &ItemRecord) -> String {
    if item.status() != ItemStatus::InProgress {
        return item.size_label();
    }
    match item.resource {
        ResourceType::DecryptedDb if !item.step_label.is_empty() => item.step_label.clone(),
        // a timed-out resource pull keeps its last known size
        ResourceType::ResourceArchive if item.step_index < 0 => {
            format!("- / {}", item.size_label())
        }
        _ => format!("{} / {}", item.current_label(), item.size_label()),
    }
}

fn item_vm(pipeline: &Pipeline, item: &ItemRecord) -> ItemVm {
    let t = item.resource;
    let progress_label = (item.status() == ItemStatus::InProgress && item.progress > 0.0)
        .then(|| format_percent(item.progress));
    ItemVm {
        resource: t,
        label: t.label(),
        status: item.status(),
        file_name: item.file_name.clone(),
        size_label: size_label(item),
        progress_label,
        step_label: item.step_label.clone(),
        can_start: item.status() == ItemStatus::Queued && pipeline.start_enabled(t),
        can_stop: pipeline.can(PipelineEvent::Stop(t)),
        can_delete: item.status() == ItemStatus::Done && item.byte_total > 0,
        failed: item.failed,
    }
}

pub fn project_vm(pipeline: &Pipeline) -> ProjectVm {
    let project = pipeline.project();
    ProjectVm {
        name: project.name.clone(),
        id: project.id.clone(),
        created_label: project.created_label(),
        user_label: project.user_label(),
        password: project.password.clone(),
        state: pipeline.state(),
        items: pipeline.items().map(|i| item_vm(pipeline, i)).collect(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateVm {
    pub state: GateState,
    pub device_label: String,
    pub password: String,
    pub user: String,
    pub can_edit_credentials: bool,
    pub can_create_project: bool,
}

pub fn gate_vm(gate: &DeviceGate, device: Option<&DeviceInfo>) -> GateVm {
    let device_label = match device {
        Some(info) if !info.model.is_empty() => format!("{} is connected", info.model),
        _ if gate.state() >= GateState::DeviceReady => "Device is connected".to_string(),
        _ => "No device".to_string(),
    };
    GateVm {
        state: gate.state(),
        device_label,
        password: gate.credentials().password().to_string(),
        user: gate.credentials().user.clone(),
        can_edit_credentials: gate.state() >= GateState::RootReady,
        can_create_project: gate.state() == GateState::CredentialsReady,
    }
}

/// One-line summary used by the CLI.
pub fn describe_project(vm: &ProjectVm) -> String {
    let items: Vec<String> = vm
        .items
        .iter()
        .map(|i| format!("{}={:?}({})", i.resource, i.status, i.size_label))
        .collect();
    format!(
        "{} [{}] {} user={} password={} {}",
        vm.name,
        vm.created_label,
        vm.state,
        vm.user_label,
        vm.password,
        items.join(" ")
    )
}
