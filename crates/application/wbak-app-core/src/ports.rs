use wbak_core::GateState;

use crate::domain::Notice;
use crate::protocol::{CommandRequest, KillRequest, TaskRequest};
use crate::viewmodel::ProjectVm;

/// Bidirectional link to the remote task executor.
///
/// Requests are fire-and-forget: results come back later as
/// [`crate::protocol::CommandResponse`] events.
pub trait ChannelPort: Send + Sync + 'static {
    fn is_connected(&self) -> bool;
    fn exec_command(&self, request: &CommandRequest) -> anyhow::Result<()>;
    fn add_task(&self, request: &TaskRequest) -> anyhow::Result<()>;
    fn kill_task(&self, request: &KillRequest) -> anyhow::Result<()>;
}

pub trait StatusSink: Send + Sync + 'static {
    fn notice(&self, notice: Notice);
    fn project_updated(&self, project: &ProjectVm);
    fn project_removed(&self, name: &str);
    fn gate_changed(&self, state: GateState);
}
