pub mod gate;
pub mod item;
pub mod listing;
pub mod pipeline;
pub mod project;

pub use gate::{
    Credentials, DeviceGate, GateEffect, GateEvent, GateRejected, GateState, GateStep,
    GateTransition, Poller,
};
pub use item::{format_megabytes, format_percent, ItemRecord, ItemStatus, ResourceType};
pub use listing::{restore_pipeline, ListedFile, ListingEntry, ListingError, PersistedListing};
pub use pipeline::{
    Pipeline, PipelineEffect, PipelineEvent, PipelineState, Transition, TransitionRejected,
};
pub use project::{
    derive_password, generate_name, parse_name, Project, ProjectName, ProjectNameError,
};
