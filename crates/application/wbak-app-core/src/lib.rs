pub mod app_core;
pub mod dispatch;
pub mod domain;
pub mod ingest;
pub mod kernel;
pub mod orchestrator;
pub mod ports;
pub mod protocol;
pub mod registry;
pub mod scheduler;
pub mod viewmodel;

pub use app_core::*;
pub use dispatch::{CommandDispatcher, DispatchError, HandlerTable, Hooks};
pub use domain::{CoreSettings, CredentialCandidates, DeviceInfo, DeviceStatus, Notice, Severity};
pub use ingest::{ProgressReport, ProgressSignal};
pub use kernel::BackupKernel;
pub use orchestrator::BackupOrchestrator;
pub use ports::*;
pub use protocol::{
    CommandId, CommandRequest, CommandResponse, KillRequest, TaskCategory, TaskRequest,
};
pub use registry::PipelineRegistry;
pub use scheduler::{DeferredAction, Scheduler};
pub use viewmodel::*;
