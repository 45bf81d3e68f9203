//! Process-wide device readiness ladder.
//!
//! `Disconnected → ChannelReady → DeviceReady → RootReady → CredentialsReady`.
//! Every demotion drops exactly one level; losing a lower prerequisite walks
//! down the ladder one step at a time so each level's exit effects run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::item::ResourceType;
use crate::project::derive_password;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateState {
    Disconnected,
    ChannelReady,
    DeviceReady,
    RootReady,
    CredentialsReady,
}

impl GateState {
    fn below(self) -> Option<GateState> {
        match self {
            GateState::Disconnected => None,
            GateState::ChannelReady => Some(GateState::Disconnected),
            GateState::DeviceReady => Some(GateState::ChannelReady),
            GateState::RootReady => Some(GateState::DeviceReady),
            GateState::CredentialsReady => Some(GateState::RootReady),
        }
    }

    /// Event that removes this level.
    fn demotion(self) -> Option<GateEvent> {
        match self {
            GateState::Disconnected => None,
            GateState::ChannelReady => Some(GateEvent::DisconnectChannel),
            GateState::DeviceReady => Some(GateEvent::DisconnectDevice),
            GateState::RootReady => Some(GateEvent::DenyRoot),
            GateState::CredentialsReady => Some(GateEvent::ClearCredentials),
        }
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GateState::Disconnected => "disconnected",
            GateState::ChannelReady => "channel-ready",
            GateState::DeviceReady => "device-ready",
            GateState::RootReady => "root-ready",
            GateState::CredentialsReady => "credentials-ready",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateEvent {
    ConnectChannel,
    DisconnectChannel,
    ConnectDevice,
    DisconnectDevice,
    GrantRoot,
    DenyRoot,
    SupplyCredentials,
    ClearCredentials,
}

impl GateEvent {
    /// For demotions: the level the event removes.
    fn removes(self) -> Option<GateState> {
        match self {
            GateEvent::DisconnectChannel => Some(GateState::ChannelReady),
            GateEvent::DisconnectDevice => Some(GateState::DeviceReady),
            GateEvent::DenyRoot => Some(GateState::RootReady),
            GateEvent::ClearCredentials => Some(GateState::CredentialsReady),
            _ => None,
        }
    }

    /// For promotions: (required level, reached level).
    fn promotes(self) -> Option<(GateState, GateState)> {
        match self {
            GateEvent::ConnectChannel => Some((GateState::Disconnected, GateState::ChannelReady)),
            GateEvent::ConnectDevice => Some((GateState::ChannelReady, GateState::DeviceReady)),
            GateEvent::GrantRoot => Some((GateState::DeviceReady, GateState::RootReady)),
            GateEvent::SupplyCredentials => {
                Some((GateState::RootReady, GateState::CredentialsReady))
            }
            _ => None,
        }
    }
}

impl fmt::Display for GateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GateEvent::ConnectChannel => "connect-channel",
            GateEvent::DisconnectChannel => "disconnect-channel",
            GateEvent::ConnectDevice => "connect-device",
            GateEvent::DisconnectDevice => "disconnect-device",
            GateEvent::GrantRoot => "grant-root",
            GateEvent::DenyRoot => "deny-root",
            GateEvent::SupplyCredentials => "supply-credentials",
            GateEvent::ClearCredentials => "clear-credentials",
        })
    }
}

/// Periodic remote heartbeats bound to a readiness level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Poller {
    /// Runs while the gate is at `ChannelReady` or above.
    DevicePresence,
    /// Runs while the gate is at `DeviceReady` or above.
    RootStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEffect {
    StartPoller(Poller),
    StopPoller(Poller),
    /// One-shot load of the persisted project listing.
    RecoverProjects,
    /// Credential inputs must be checked against the new level.
    ReevaluateCredentials,
    /// Every pipeline must recompute its stage-start flags.
    BroadcastCapabilities,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateStep {
    pub event: GateEvent,
    pub from: GateState,
    pub to: GateState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateTransition {
    pub event: GateEvent,
    pub from: GateState,
    pub to: GateState,
    pub steps: Vec<GateStep>,
    pub effects: Vec<GateEffect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("`{event}` is not permitted while the gate is `{state}`")]
pub struct GateRejected {
    pub event: GateEvent,
    pub state: GateState,
}

/// Operator inputs the database password is derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub imei: String,
    pub uin: String,
    pub user: String,
    password: String,
}

impl Credentials {
    pub fn new(imei: &str, uin: &str, user: &str) -> Self {
        Self {
            imei: imei.to_string(),
            uin: uin.to_string(),
            user: user.to_string(),
            password: derive_password(imei, uin),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn is_complete(&self) -> bool {
        !self.password.is_empty() && !self.user.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DeviceGate {
    state: GateState,
    credentials: Credentials,
    pollers: BTreeSet<Poller>,
}

impl Default for DeviceGate {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceGate {
    pub fn new() -> Self {
        Self {
            state: GateState::Disconnected,
            credentials: Credentials::default(),
            pollers: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn active_pollers(&self) -> impl Iterator<Item = Poller> + '_ {
        self.pollers.iter().copied()
    }

    /// Whether stage-start commands for `resource` may be issued right now.
    pub fn permits(&self, _resource: ResourceType) -> bool {
        self.state() >= GateState::RootReady
    }

    /// Level a freshly created project needs before it may leave `Init`.
    pub fn is_ready_for_projects(&self) -> bool {
        self.state() >= GateState::RootReady
    }

    /// Replaces the credential inputs and re-derives the password. Returns true on change.
    pub fn set_credential_inputs(&mut self, imei: &str, uin: &str, user: &str) -> bool {
        let next = Credentials::new(imei, uin, user);
        if next == self.credentials {
            return false;
        }
        self.credentials = next;
        true
    }

    /// Event that brings the gate in line with the credential inputs, if any.
    pub fn credentials_follow_up(&self) -> Option<GateEvent> {
        let complete = self.credentials.is_complete();
        match self.state() {
            GateState::RootReady if complete => Some(GateEvent::SupplyCredentials),
            GateState::CredentialsReady if !complete => Some(GateEvent::ClearCredentials),
            _ => None,
        }
    }

    pub fn can(&self, event: GateEvent) -> bool {
        let state = self.state();
        if let Some((required, _)) = event.promotes() {
            let guard = event != GateEvent::SupplyCredentials || self.credentials.is_complete();
            return state == required && guard;
        }
        match event {
            GateEvent::DisconnectChannel => true,
            other => other.removes().is_some_and(|level| state >= level),
        }
    }

    pub fn fire(&mut self, event: GateEvent) -> Result<GateTransition, GateRejected> {
        let from = self.state();
        if !self.can(event) {
            return Err(GateRejected { event, state: from });
        }

        let mut steps = Vec::new();
        let mut effects = Vec::new();

        if let Some((_, reached)) = event.promotes() {
            self.state = reached;
            steps.push(GateStep {
                event,
                from,
                to: reached,
            });
            match event {
                GateEvent::ConnectChannel => {
                    self.start_poller(Poller::DevicePresence, &mut effects);
                    effects.push(GateEffect::RecoverProjects);
                }
                GateEvent::ConnectDevice => self.start_poller(Poller::RootStatus, &mut effects),
                GateEvent::GrantRoot => effects.push(GateEffect::ReevaluateCredentials),
                _ => {}
            }
        } else if let Some(removed) = event.removes() {
            let target = removed.below().unwrap_or(GateState::Disconnected);
            while self.state() > target {
                let level = self.state();
                let (Some(step_event), Some(below)) = (level.demotion(), level.below()) else {
                    break;
                };
                match level {
                    GateState::DeviceReady => self.stop_poller(Poller::RootStatus, &mut effects),
                    GateState::ChannelReady => {
                        self.stop_poller(Poller::DevicePresence, &mut effects)
                    }
                    _ => {}
                }
                self.state = below;
                steps.push(GateStep {
                    event: step_event,
                    from: level,
                    to: below,
                });
            }
        }

        effects.push(GateEffect::BroadcastCapabilities);
        let to = self.state();
        tracing::debug!(%event, %from, %to, steps = steps.len(), "gate transition");

        Ok(GateTransition {
            event,
            from,
            to,
            steps,
            effects,
        })
    }

    fn start_poller(&mut self, poller: Poller, effects: &mut Vec<GateEffect>) {
        if self.pollers.insert(poller) {
            effects.push(GateEffect::StartPoller(poller));
        }
    }

    fn stop_poller(&mut self, poller: Poller, effects: &mut Vec<GateEffect>) {
        if self.pollers.remove(&poller) {
            effects.push(GateEffect::StopPoller(poller));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_levels_are_ordered() {
        assert!(GateState::Disconnected < GateState::ChannelReady);
        assert!(GateState::RootReady < GateState::CredentialsReady);
        assert_eq!(GateState::DeviceReady.below(), Some(GateState::ChannelReady));
        assert_eq!(GateState::Disconnected.below(), None);
    }

    #[test]
    fn credentials_need_user_and_password() {
        assert!(!Credentials::new("356987012345678", "1234567890", "").is_complete());
        assert!(!Credentials::new("", "1234567890", "abc").is_complete());
        assert!(Credentials::new("356987012345678", "1234567890", "abc").is_complete());
    }
}
