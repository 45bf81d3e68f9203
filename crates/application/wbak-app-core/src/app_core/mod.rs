pub mod commands;
pub mod events;

pub use commands::AppCommand;
pub use events::InboundEvent;
