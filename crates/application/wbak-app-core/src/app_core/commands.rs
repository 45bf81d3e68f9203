use wbak_core::{ProjectName, ResourceType};

/// Operator actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    // Credentials
    SetCredentials {
        imei: String,
        uin: String,
        user: String,
    },
    RequestCredentials,

    // Projects
    CreateProject,
    UpdateProjectCredentials {
        project: ProjectName,
        user: String,
        password: String,
    },
    Evict(ProjectName),

    // Stages
    Start {
        project: ProjectName,
        resource: ResourceType,
    },
    Stop {
        project: ProjectName,
        resource: ResourceType,
    },
    Delete {
        project: ProjectName,
        resource: ResourceType,
    },
}
