use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use crate::item::ResourceType;
use crate::pipeline::{Pipeline, PipelineEvent, PipelineState};
use crate::project::{Project, ProjectNameError};

#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error("listing is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("listing must be a JSON object keyed by project name")]
    NotAnObject,
}

/// One file that already exists for a project, as reported by the remote side.
#[derive(Debug, Clone, PartialEq)]
pub struct ListedFile {
    pub path: String,
    pub byte_size: u64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListingEntry {
    pub user: String,
    pub password: String,
    pub files: Vec<ListedFile>,
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(default)]
    user: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    files: Vec<Value>,
}

/// `{projectName → {user, password, files: [[path, byteSize], …]}}`.
///
/// Parsing never fails on a single bad entry or file; those are skipped and
/// counted in `skipped`.
#[derive(Debug, Clone, Default)]
pub struct PersistedListing {
    pub projects: BTreeMap<String, ListingEntry>,
    pub skipped: usize,
}

impl PersistedListing {
    pub fn from_json_str(json: &str) -> Result<Self, ListingError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Accepts either the object itself or a JSON string that encodes it.
    pub fn from_value(value: Value) -> Result<Self, ListingError> {
        let map = match value {
            Value::Object(map) => map,
            Value::String(s) => return Self::from_json_str(&s),
            _ => return Err(ListingError::NotAnObject),
        };

        let mut listing = PersistedListing::default();
        for (name, raw) in map {
            let raw: RawEntry = match serde_json::from_value(raw) {
                Ok(r) => r,
                Err(e) => {
                    warn!(project = %name, "skipping malformed listing entry: {e}");
                    listing.skipped += 1;
                    continue;
                }
            };
            let mut files = Vec::with_capacity(raw.files.len());
            for file in raw.files {
                match parse_file(&file) {
                    Some(f) => files.push(f),
                    None => {
                        warn!(project = %name, "skipping malformed file entry {file}");
                        listing.skipped += 1;
                    }
                }
            }
            listing.projects.insert(
                name,
                ListingEntry {
                    user: raw.user,
                    password: raw.password,
                    files,
                },
            );
        }
        Ok(listing)
    }

    /// Project names in display order.
    pub fn names(&self) -> Vec<String> {
        self.projects.keys().cloned().collect()
    }
}

fn parse_file(value: &Value) -> Option<ListedFile> {
    let pair = value.as_array()?;
    let path = pair.first()?.as_str()?.to_string();
    let size = pair.get(1)?;
    let byte_size = size
        .as_u64()
        .or_else(|| size.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))?;
    Some(ListedFile { path, byte_size })
}

/// Rebuilds a pipeline from files that already exist, without re-running anything.
///
/// The pipeline starts at `Waiting` and only ever advances: each recognised
/// file pushes it to at least that resource's completed state.
pub fn restore_pipeline(name: &str, entry: &ListingEntry) -> Result<Pipeline, ProjectNameError> {
    let project = Project::new(name, entry.user.clone(), entry.password.clone())?;
    let mut pipeline = Pipeline::new(project);
    advance_to(&mut pipeline, PipelineState::Waiting);

    for file in &entry.files {
        let Some(resource) = ResourceType::classify_path(&file.path) else {
            warn!(project = %name, path = %file.path, "unrecognised file prefix, ignoring");
            continue;
        };
        pipeline.item_mut(resource).set_file(&file.path, file.byte_size);
        advance_to(&mut pipeline, resource.completed_state());
    }

    Ok(pipeline)
}

fn advance_to(pipeline: &mut Pipeline, target: PipelineState) {
    if pipeline.state() < target {
        // Goto is legal from every state.
        let _ = pipeline.fire(PipelineEvent::Goto(target));
    }
}
