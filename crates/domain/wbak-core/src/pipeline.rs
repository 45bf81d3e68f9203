//! Per-project backup pipeline.
//!
//! The pipeline is an explicit finite-state machine: every transition is a
//! row of [`TRANSITIONS`] (`event`, legal sources, target, item hook, after
//! hook), plus the wildcard [`PipelineEvent::Goto`] which is legal from any
//! state. Item-status changes happen inside [`Pipeline::fire`]; anything that
//! needs the outside world is returned as a [`PipelineEffect`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::item::{ItemRecord, ItemStatus, ResourceType};
use crate::project::Project;

/// Progress of a pipeline. The declaration order is the progress order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineState {
    Init,
    Waiting,
    DbPulling,
    DbPulled,
    Decrypting,
    Decrypted,
    ResPulling,
    ResPulled,
}

impl PipelineState {
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            PipelineState::DbPulling | PipelineState::Decrypting | PipelineState::ResPulling
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Init => "init",
            PipelineState::Waiting => "waiting",
            PipelineState::DbPulling => "db-pulling",
            PipelineState::DbPulled => "db-pulled",
            PipelineState::Decrypting => "db-decrypting",
            PipelineState::Decrypted => "db-decrypted",
            PipelineState::ResPulling => "res-pulling",
            PipelineState::ResPulled => "res-pulled",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ResourceType {
    /// Stable state a stage starts from and falls back to.
    pub fn prerequisite_state(self) -> PipelineState {
        match self {
            ResourceType::EncryptedDb => PipelineState::Waiting,
            ResourceType::DecryptedDb => PipelineState::DbPulled,
            ResourceType::ResourceArchive => PipelineState::Decrypted,
        }
    }

    pub fn active_state(self) -> PipelineState {
        match self {
            ResourceType::EncryptedDb => PipelineState::DbPulling,
            ResourceType::DecryptedDb => PipelineState::Decrypting,
            ResourceType::ResourceArchive => PipelineState::ResPulling,
        }
    }

    pub fn completed_state(self) -> PipelineState {
        match self {
            ResourceType::EncryptedDb => PipelineState::DbPulled,
            ResourceType::DecryptedDb => PipelineState::Decrypted,
            ResourceType::ResourceArchive => PipelineState::ResPulled,
        }
    }

    /// Resource whose completed marker depends on this one being present.
    pub fn parent(self) -> Option<ResourceType> {
        match self {
            ResourceType::EncryptedDb => None,
            ResourceType::DecryptedDb => Some(ResourceType::EncryptedDb),
            ResourceType::ResourceArchive => Some(ResourceType::DecryptedDb),
        }
    }
}

impl ItemStatus {
    /// Status an item displays when its pipeline sits in `state` with no pending side effects.
    pub fn for_state(resource: ResourceType, state: PipelineState) -> Self {
        if state == resource.active_state() {
            ItemStatus::InProgress
        } else if state >= resource.completed_state() {
            ItemStatus::Done
        } else {
            ItemStatus::Queued
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineEvent {
    WaitPullDb,
    Start(ResourceType),
    Stop(ResourceType),
    Finish(ResourceType),
    Delete(ResourceType),
    Goto(PipelineState),
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = |t: &ResourceType| match t {
            ResourceType::EncryptedDb => ("pull", "db", "pulled-db"),
            ResourceType::DecryptedDb => ("decrypt", "db", "decrypted-db"),
            ResourceType::ResourceArchive => ("pull", "res", "pulled-res"),
        };
        match self {
            PipelineEvent::WaitPullDb => f.write_str("wait-pull-db"),
            PipelineEvent::Start(t) => {
                let (verb, noun, _) = stage(t);
                write!(f, "start-{verb}-{noun}")
            }
            PipelineEvent::Stop(t) => {
                let (verb, noun, _) = stage(t);
                write!(f, "stop-{verb}-{noun}")
            }
            PipelineEvent::Finish(t) => {
                let (verb, noun, _) = stage(t);
                write!(f, "finish-{verb}-{noun}")
            }
            PipelineEvent::Delete(t) => write!(f, "delete-{}", stage(t).2),
            PipelineEvent::Goto(s) => write!(f, "goto({s})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemHook {
    None,
    Begin(ResourceType),
    Complete(ResourceType),
    Requeue(ResourceType),
    Remove(ResourceType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterHook {
    None,
    AwaitGate,
    CascadeInto(ResourceType),
}

struct Rule {
    event: PipelineEvent,
    from: &'static [PipelineState],
    to: PipelineState,
    before: ItemHook,
    after: AfterHook,
}

use PipelineState as S;
use ResourceType::{DecryptedDb as De, EncryptedDb as En, ResourceArchive as Re};

// `finish-*` is also legal from Init: a pipeline bounced back by the gate
// check still records a completion that lands afterwards.
const TRANSITIONS: [Rule; 13] = [
    Rule {
        event: PipelineEvent::WaitPullDb,
        from: &[S::Init],
        to: S::Waiting,
        before: ItemHook::None,
        after: AfterHook::AwaitGate,
    },
    Rule {
        event: PipelineEvent::Start(En),
        from: &[S::Waiting],
        to: S::DbPulling,
        before: ItemHook::Begin(En),
        after: AfterHook::None,
    },
    Rule {
        event: PipelineEvent::Stop(En),
        from: &[S::DbPulling],
        to: S::Waiting,
        before: ItemHook::Requeue(En),
        after: AfterHook::None,
    },
    Rule {
        event: PipelineEvent::Finish(En),
        from: &[S::Init, S::DbPulling],
        to: S::DbPulled,
        before: ItemHook::Complete(En),
        after: AfterHook::None,
    },
    Rule {
        event: PipelineEvent::Delete(En),
        from: &[S::DbPulled],
        to: S::Waiting,
        before: ItemHook::Remove(En),
        after: AfterHook::None,
    },
    Rule {
        event: PipelineEvent::Start(De),
        from: &[S::DbPulled],
        to: S::Decrypting,
        before: ItemHook::Begin(De),
        after: AfterHook::None,
    },
    Rule {
        event: PipelineEvent::Stop(De),
        from: &[S::Decrypting],
        to: S::DbPulled,
        before: ItemHook::Requeue(De),
        after: AfterHook::None,
    },
    Rule {
        event: PipelineEvent::Finish(De),
        from: &[S::Init, S::Decrypting],
        to: S::Decrypted,
        before: ItemHook::Complete(De),
        after: AfterHook::None,
    },
    Rule {
        event: PipelineEvent::Delete(De),
        from: &[S::Decrypted],
        to: S::DbPulled,
        before: ItemHook::Remove(De),
        after: AfterHook::CascadeInto(En),
    },
    Rule {
        event: PipelineEvent::Start(Re),
        from: &[S::Decrypted],
        to: S::ResPulling,
        before: ItemHook::Begin(Re),
        after: AfterHook::None,
    },
    Rule {
        event: PipelineEvent::Stop(Re),
        from: &[S::ResPulling],
        to: S::Decrypted,
        before: ItemHook::Requeue(Re),
        after: AfterHook::None,
    },
    Rule {
        event: PipelineEvent::Finish(Re),
        from: &[S::Init, S::ResPulling],
        to: S::ResPulled,
        before: ItemHook::Complete(Re),
        after: AfterHook::None,
    },
    Rule {
        event: PipelineEvent::Delete(Re),
        from: &[S::ResPulled],
        to: S::Decrypted,
        before: ItemHook::Remove(Re),
        after: AfterHook::CascadeInto(De),
    },
];

fn lookup(state: PipelineState, event: PipelineEvent) -> Option<&'static Rule> {
    TRANSITIONS
        .iter()
        .find(|r| r.event == event && r.from.contains(&state))
}

/// Work the owner of a pipeline must carry out after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEffect {
    /// Re-check the device gate; the pipeline must drop back to `Init` if it is not ready.
    AwaitGate,
    /// The named resource's file is already gone; delete its completed marker after the settle delay.
    ScheduleDelete(ResourceType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub event: PipelineEvent,
    pub from: PipelineState,
    pub to: PipelineState,
    pub effects: Vec<PipelineEffect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("`{event}` is not permitted in state `{state}`")]
pub struct TransitionRejected {
    pub event: PipelineEvent,
    pub state: PipelineState,
}

/// One backup job: its project identity, state and three item records.
#[derive(Debug, Clone)]
pub struct Pipeline {
    project: Project,
    state: PipelineState,
    items: [ItemRecord; 3],
    start_enabled: [bool; 3],
    dispatched: bool,
}

impl Pipeline {
    pub fn new(project: Project) -> Self {
        let mut pipeline = Self {
            project,
            state: PipelineState::Init,
            items: ResourceType::ALL.map(ItemRecord::new),
            start_enabled: [false; 3],
            dispatched: false,
        };
        pipeline.sync_items();
        pipeline
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn name(&self) -> &str {
        &self.project.name
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn item(&self, resource: ResourceType) -> &ItemRecord {
        &self.items[resource.index()]
    }

    pub fn item_mut(&mut self, resource: ResourceType) -> &mut ItemRecord {
        &mut self.items[resource.index()]
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemRecord> {
        self.items.iter()
    }

    /// Stage currently running, if any. At most one can be, by construction.
    pub fn active_stage(&self) -> Option<ResourceType> {
        ResourceType::ALL
            .into_iter()
            .find(|t| t.active_state() == self.state)
    }

    pub fn can(&self, event: PipelineEvent) -> bool {
        matches!(event, PipelineEvent::Goto(_)) || lookup(self.state, event).is_some()
    }

    pub fn fire(&mut self, event: PipelineEvent) -> Result<Transition, TransitionRejected> {
        let from = self.state;

        if let PipelineEvent::Goto(to) = event {
            self.state = to;
            self.sync_items();
            return Ok(Transition {
                event,
                from,
                to,
                effects: Vec::new(),
            });
        }

        let rule = lookup(from, event).ok_or(TransitionRejected { event, state: from })?;
        self.apply_item_hook(rule.before);
        self.state = rule.to;

        let mut effects = Vec::new();
        match rule.after {
            AfterHook::None => {}
            AfterHook::AwaitGate => effects.push(PipelineEffect::AwaitGate),
            AfterHook::CascadeInto(parent) => {
                if self.item(parent).byte_total == 0 {
                    effects.push(PipelineEffect::ScheduleDelete(parent));
                }
            }
        }

        tracing::debug!(
            project = %self.project.name,
            %event,
            %from,
            to = %rule.to,
            "pipeline transition"
        );

        Ok(Transition {
            event,
            from,
            to: rule.to,
            effects,
        })
    }

    fn apply_item_hook(&mut self, hook: ItemHook) {
        match hook {
            ItemHook::None => {}
            ItemHook::Begin(t) => {
                let item = self.item_mut(t);
                item.set_status(ItemStatus::InProgress);
                item.failed = false;
            }
            ItemHook::Complete(t) => {
                let item = self.item_mut(t);
                item.set_status(ItemStatus::Done);
                item.progress = 1.0;
            }
            ItemHook::Requeue(t) => {
                let item = self.item_mut(t);
                item.set_status(ItemStatus::Queued);
                item.progress = 0.0;
            }
            ItemHook::Remove(t) => {
                let item = self.item_mut(t);
                item.set_status(ItemStatus::Queued);
                item.clear_file();
                item.progress = 0.0;
            }
        }
    }

    fn sync_items(&mut self) {
        let state = self.state;
        for item in self.items.iter_mut() {
            item.set_status(ItemStatus::for_state(item.resource, state));
        }
    }

    /// Completion reported while the finish transition is not legal: the item
    /// shows Done but the pipeline keeps its state.
    pub fn strand_completion(&mut self, resource: ResourceType) {
        let item = self.item_mut(resource);
        item.set_status(ItemStatus::Done);
        item.progress = 1.0;
    }

    /// Progress for an item that displays Queued/Done: the transfer was resumed elsewhere.
    pub fn resume_item(&mut self, resource: ResourceType) -> bool {
        let item = self.item_mut(resource);
        if item.status() == ItemStatus::InProgress {
            return false;
        }
        item.set_status(ItemStatus::InProgress);
        true
    }

    /// Remote failure: back to Queued with an error annotation.
    pub fn fail_item(&mut self, resource: ResourceType) {
        let item = self.item_mut(resource);
        item.set_status(ItemStatus::Queued);
        item.failed = true;
    }

    pub fn start_enabled(&self, resource: ResourceType) -> bool {
        self.start_enabled[resource.index()]
    }

    /// Recomputes the stage-start flags. Returns true when any flag changed.
    pub fn refresh_capabilities(&mut self, permits: impl Fn(ResourceType) -> bool) -> bool {
        let next = ResourceType::ALL
            .map(|t| permits(t) && self.state == t.prerequisite_state());
        let changed = next != self.start_enabled;
        self.start_enabled = next;
        changed
    }

    pub fn has_dispatched(&self) -> bool {
        self.dispatched
    }

    pub fn mark_dispatched(&mut self) {
        self.dispatched = true;
    }

    /// Replaces user/password. Refused once a stage command went out.
    pub fn update_credentials(&mut self, user: &str, password: &str) -> bool {
        if self.dispatched {
            return false;
        }
        self.project.user = user.to_string();
        self.project.password = password.to_string();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> Pipeline {
        Pipeline::new(Project::new("20190301123005_ab12", "user", "pass").unwrap())
    }

    #[test]
    fn every_rule_targets_a_neighbouring_state() {
        for rule in TRANSITIONS.iter() {
            for from in rule.from {
                if *from == PipelineState::Init {
                    continue;
                }
                assert_ne!(*from, rule.to, "{} must move", rule.event);
            }
        }
    }

    #[test]
    fn event_names_match_the_wire_vocabulary() {
        assert_eq!(PipelineEvent::Start(En).to_string(), "start-pull-db");
        assert_eq!(PipelineEvent::Start(De).to_string(), "start-decrypt-db");
        assert_eq!(PipelineEvent::Finish(Re).to_string(), "finish-pull-res");
        assert_eq!(PipelineEvent::Delete(De).to_string(), "delete-decrypted-db");
    }

    #[test]
    fn new_pipeline_queues_everything() {
        let p = pipeline();
        assert_eq!(p.state(), PipelineState::Init);
        assert!(p.items().all(|i| i.status() == ItemStatus::Queued));
    }

    #[test]
    fn delete_cascade_is_requested_only_for_emptied_parents() {
        let mut p = pipeline();
        p.fire(PipelineEvent::Goto(PipelineState::Decrypted)).unwrap();
        p.item_mut(En).set_file("data/x/EnMicroMsg.db", 10);

        let t = p.fire(PipelineEvent::Delete(De)).unwrap();
        assert!(t.effects.is_empty());

        p.fire(PipelineEvent::Goto(PipelineState::Decrypted)).unwrap();
        p.item_mut(En).clear_file();
        let t = p.fire(PipelineEvent::Delete(De)).unwrap();
        assert_eq!(t.effects, vec![PipelineEffect::ScheduleDelete(En)]);
    }

    #[test]
    fn credentials_lock_after_dispatch() {
        let mut p = pipeline();
        assert!(p.update_credentials("other", "1234567"));
        p.mark_dispatched();
        assert!(!p.update_credentials("again", "7654321"));
        assert_eq!(p.project().user, "other");
    }
}
