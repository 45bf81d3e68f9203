use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::ports::ChannelPort;
use crate::protocol::{
    CommandId, CommandRequest, CommandResponse, KillRequest, TaskCategory, TaskRequest,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("channel is disconnected, `{0}` was not sent")]
    Disconnected(String),
    #[error("failed to send `{what}`: {message}")]
    Transport { what: String, message: String },
}

impl DispatchError {
    pub fn is_disconnected(&self) -> bool {
        matches!(self, DispatchError::Disconnected(_))
    }
}

/// Sends requests over the channel. Never queues and never retries.
pub struct CommandDispatcher<C> {
    channel: Arc<C>,
    channel_name: String,
    /// One-shot completion slots, keyed by command.
    pending: BTreeMap<CommandId, String>,
}

impl<C: ChannelPort> CommandDispatcher<C> {
    pub fn new(channel: Arc<C>, channel_name: impl Into<String>) -> Self {
        Self {
            channel,
            channel_name: channel_name.into(),
            pending: BTreeMap::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    fn ensure_connected(&self, what: &str) -> Result<(), DispatchError> {
        if self.channel.is_connected() {
            Ok(())
        } else {
            Err(DispatchError::Disconnected(what.to_string()))
        }
    }

    pub fn exec(
        &mut self,
        command: CommandId,
        name: &str,
        params: Value,
    ) -> Result<(), DispatchError> {
        self.ensure_connected(command.as_str())?;
        let request = CommandRequest {
            command,
            name: name.to_string(),
            channel: self.channel_name.clone(),
            params,
        };
        self.channel
            .exec_command(&request)
            .map_err(|e| transport(command.as_str(), e))?;
        self.pending.insert(command, name.to_string());
        debug!(%command, name, "command sent");
        Ok(())
    }

    pub fn add_task(
        &mut self,
        name: &str,
        category: TaskCategory,
        params: Value,
    ) -> Result<(), DispatchError> {
        self.ensure_connected(name)?;
        let request = TaskRequest {
            name: name.to_string(),
            category,
            channel: self.channel_name.clone(),
            params,
        };
        self.channel
            .add_task(&request)
            .map_err(|e| transport(name, e))?;
        debug!(name, category = category.as_str(), "task added");
        Ok(())
    }

    pub fn kill_task(&mut self, name: &str) -> Result<(), DispatchError> {
        self.ensure_connected(name)?;
        let request = KillRequest {
            name: name.to_string(),
            channel: self.channel_name.clone(),
        };
        self.channel
            .kill_task(&request)
            .map_err(|e| transport(name, e))?;
        debug!(name, "task killed");
        Ok(())
    }

    /// Consumes the completion slot for `command`, returning the name it was sent under.
    pub fn resolve(&mut self, command: CommandId) -> Option<String> {
        self.pending.remove(&command)
    }

    pub fn is_pending(&self, command: CommandId) -> bool {
        self.pending.contains_key(&command)
    }
}

fn transport(what: &str, e: anyhow::Error) -> DispatchError {
    DispatchError::Transport {
        what: what.to_string(),
        message: format!("{e:#}"),
    }
}

pub type Handler<T> = fn(&mut T, &CommandResponse);

/// Handlers run around the response message: `before`, then the message is
/// surfaced, then `after`.
pub struct Hooks<T> {
    pub before: Option<Handler<T>>,
    pub after: Option<Handler<T>>,
}

impl<T> Hooks<T> {
    pub fn none() -> Self {
        Self {
            before: None,
            after: None,
        }
    }
}

impl<T> Clone for Hooks<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Hooks<T> {}

pub struct HandlerTable<T> {
    hooks: HashMap<CommandId, Hooks<T>>,
}

impl<T> Default for HandlerTable<T> {
    fn default() -> Self {
        Self {
            hooks: HashMap::new(),
        }
    }
}

impl<T> HandlerTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before(mut self, command: CommandId, handler: Handler<T>) -> Self {
        self.hooks.entry(command).or_insert_with(Hooks::none).before = Some(handler);
        self
    }

    pub fn after(mut self, command: CommandId, handler: Handler<T>) -> Self {
        self.hooks.entry(command).or_insert_with(Hooks::none).after = Some(handler);
        self
    }

    /// Commands without handlers get empty hooks.
    pub fn lookup(&self, command: CommandId) -> Hooks<T> {
        self.hooks.get(&command).copied().unwrap_or_else(Hooks::none)
    }
}
