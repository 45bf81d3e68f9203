use std::collections::BTreeMap;
use tracing::{debug, warn};
use wbak_core::{restore_pipeline, PersistedListing, Pipeline, ProjectName};

/// Owned mapping from project name to pipeline. Starts empty; only
/// creation, reconstruction and explicit eviction change its key set.
#[derive(Debug, Default)]
pub struct PipelineRegistry {
    pipelines: BTreeMap<ProjectName, Pipeline>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pipelines.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Pipeline> {
        self.pipelines.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Pipeline> {
        self.pipelines.get_mut(name)
    }

    /// Registers `pipeline`, returning the one it replaced.
    pub fn insert(&mut self, pipeline: Pipeline) -> Option<Pipeline> {
        self.pipelines.insert(pipeline.name().to_string(), pipeline)
    }

    pub fn evict(&mut self, name: &str) -> Option<Pipeline> {
        self.pipelines.remove(name)
    }

    /// Names in lexicographic order.
    pub fn names(&self) -> Vec<ProjectName> {
        self.pipelines.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pipeline> {
        self.pipelines.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Pipeline> {
        self.pipelines.values_mut()
    }

    /// Rebuilds pipelines from a persisted listing and returns the listed
    /// names in display order.
    ///
    /// A pipeline that is mid-stage is left alone; entries with malformed
    /// names are skipped.
    pub fn reconstruct(&mut self, listing: &PersistedListing) -> Vec<ProjectName> {
        let mut names = Vec::with_capacity(listing.projects.len());
        for (name, entry) in &listing.projects {
            if let Some(existing) = self.pipelines.get(name) {
                if existing.state().is_transient() {
                    debug!(project = %name, state = %existing.state(), "keeping running pipeline");
                    names.push(name.clone());
                    continue;
                }
            }
            match restore_pipeline(name, entry) {
                Ok(pipeline) => {
                    debug!(project = %name, state = %pipeline.state(), "pipeline restored");
                    self.insert(pipeline);
                    names.push(name.clone());
                }
                Err(e) => warn!(project = %name, "skipping listed project: {e}"),
            }
        }
        names
    }
}
