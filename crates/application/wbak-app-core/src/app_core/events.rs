use crate::app_core::AppCommand;
use crate::protocol::CommandResponse;

/// Everything that reaches the event loop from outside.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    // Channel lifecycle
    ChannelUp,
    ChannelDown,

    // Executor results
    Response(CommandResponse),

    // Operator
    Command(AppCommand),
}
