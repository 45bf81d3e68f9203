use std::collections::BTreeMap;
use wbak_core::{ProjectName, ResourceType};

/// Work deferred onto the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredAction {
    /// Delete a stage whose file is already gone, if that is still legal.
    CascadeDelete {
        project: ProjectName,
        resource: ResourceType,
    },
}

/// Deferred actions ordered by due time on a millisecond clock owned by the
/// event loop. Actions due at the same instant run in scheduling order.
#[derive(Debug, Default)]
pub struct Scheduler {
    now_ms: u64,
    seq: u64,
    queue: BTreeMap<(u64, u64), DeferredAction>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn schedule_in(&mut self, delay_ms: u64, action: DeferredAction) -> u64 {
        let due = self.now_ms.saturating_add(delay_ms);
        self.queue.insert((due, self.seq), action);
        self.seq += 1;
        due
    }

    /// Removes the earliest action due at or before `until_ms` and moves the
    /// clock to its due time, so follow-ups are scheduled relative to it.
    pub fn pop_due(&mut self, until_ms: u64) -> Option<DeferredAction> {
        let (&(due, _), _) = self.queue.first_key_value()?;
        if due > until_ms {
            return None;
        }
        self.now_ms = self.now_ms.max(due);
        self.queue.pop_first().map(|(_, action)| action)
    }

    pub fn advance_to(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }

    pub fn next_due(&self) -> Option<u64> {
        self.queue.keys().next().map(|&(due, _)| due)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
