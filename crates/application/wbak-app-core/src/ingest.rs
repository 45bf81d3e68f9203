//! Normalises the three progress report shapes and classifies them.

use wbak_config::RESOURCE_UNIT_BYTES;
use wbak_core::ResourceType;

use crate::protocol::{DbPullReport, DecryptReport, ResourceReport};

/// What a report means for its stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSignal {
    /// Nothing has moved yet; only labels change.
    Pending,
    Progress,
    Finished,
    /// Remote failure sentinel (`progress < 0`).
    Failed,
    /// Resource pull declared hung by the executor.
    TimedOut,
}

/// A progress report with byte counts normalised to bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    pub project: String,
    pub resource: ResourceType,
    pub path: String,
    pub byte_total: u64,
    pub byte_current: Option<u64>,
    pub progress: f64,
    pub step_label: Option<String>,
    pub step_index: Option<i64>,
}

fn non_negative(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

fn kilobytes(kb: f64) -> u64 {
    if kb.is_finite() && kb > 0.0 {
        (kb * RESOURCE_UNIT_BYTES as f64) as u64
    } else {
        0
    }
}

impl From<DbPullReport> for ProgressReport {
    fn from(r: DbPullReport) -> Self {
        Self {
            project: r.project_name,
            resource: ResourceType::EncryptedDb,
            path: r.path,
            byte_total: non_negative(r.src_byte),
            byte_current: Some(non_negative(r.dest_byte)),
            progress: r.progress,
            step_label: None,
            step_index: None,
        }
    }
}

impl From<DecryptReport> for ProgressReport {
    fn from(r: DecryptReport) -> Self {
        Self {
            project: r.project_name,
            resource: ResourceType::DecryptedDb,
            path: r.path,
            byte_total: non_negative(r.byte),
            byte_current: None,
            progress: r.progress,
            step_label: Some(r.step_name),
            step_index: None,
        }
    }
}

impl From<ResourceReport> for ProgressReport {
    fn from(r: ResourceReport) -> Self {
        Self {
            project: r.project_name,
            resource: ResourceType::ResourceArchive,
            path: r.path,
            byte_total: kilobytes(r.byte),
            byte_current: Some(kilobytes(r.current)),
            progress: r.progress,
            step_label: Some(r.step_name),
            step_index: Some(r.step),
        }
    }
}

impl ProgressReport {
    pub fn signal(&self) -> ProgressSignal {
        let p = self.progress;
        match self.step_index {
            // Resource pulls: the step decides, the fraction only refines it.
            Some(0) => ProgressSignal::Pending,
            Some(step) if step < 0 => {
                if p >= 1.0 {
                    ProgressSignal::Finished
                } else {
                    ProgressSignal::TimedOut
                }
            }
            Some(_) if p < 0.0 => ProgressSignal::Failed,
            Some(_) => ProgressSignal::Progress,
            None if p >= 1.0 => ProgressSignal::Finished,
            None if p < 0.0 => ProgressSignal::Failed,
            None if p > 0.0 => ProgressSignal::Progress,
            None => ProgressSignal::Pending,
        }
    }
}
