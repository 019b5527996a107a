//! In-memory workflow store

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use pagewright_core_types::WorkflowId;
use parking_lot::RwLock;
use tracing::info;

use crate::errors::FlowError;
use crate::schema::{load_workflow, save_workflow, validate_workflow};
use crate::types::Workflow;

/// Validated workflows keyed by id, with a name index
///
/// Writes take the store's write lock, so hand edits and pattern promotion
/// never interleave.
#[derive(Default, Clone)]
pub struct WorkflowStore {
    inner: Arc<RwLock<HashMap<WorkflowId, Workflow>>>,
    name_index: Arc<DashMap<String, WorkflowId>>,
}

impl WorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and insert, replacing any workflow with the same id
    pub fn insert(&self, workflow: Workflow) -> Result<WorkflowId, FlowError> {
        validate_workflow(&workflow)?;
        let id = workflow.id.clone();
        let mut guard = self.inner.write();
        if let Some(previous) = guard.insert(id.clone(), workflow.clone()) {
            if previous.name != workflow.name {
                self.name_index.remove(&previous.name);
            }
        }
        self.name_index.insert(workflow.name.clone(), id.clone());
        info!(workflow_id = %id, name = %workflow.name, "Stored workflow");
        Ok(id)
    }

    pub fn get(&self, id: &WorkflowId) -> Option<Workflow> {
        self.inner.read().get(id).cloned()
    }

    pub fn get_by_name(&self, name: &str) -> Option<Workflow> {
        let id = self.name_index.get(name)?.value().clone();
        self.get(&id)
    }

    pub fn remove(&self, id: &WorkflowId) -> Option<Workflow> {
        let removed = self.inner.write().remove(id)?;
        self.name_index
            .remove_if(&removed.name, |_, indexed| indexed == id);
        Some(removed)
    }

    /// All workflows sorted by name
    pub fn list(&self) -> Vec<Workflow> {
        let mut workflows: Vec<Workflow> = self.inner.read().values().cloned().collect();
        workflows.sort_by(|a, b| a.name.cmp(&b.name));
        workflows
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Load a document and insert it
    pub fn load_file(&self, path: &Path) -> Result<WorkflowId, FlowError> {
        let workflow = load_workflow(path)?;
        self.insert(workflow)
    }

    /// Write a stored workflow to a document
    pub fn save_file(&self, id: &WorkflowId, path: &Path) -> Result<(), FlowError> {
        let workflow = self
            .get(id)
            .ok_or_else(|| FlowError::NotFound(id.to_string()))?;
        save_workflow(&workflow, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Step;
    use action_primitives::{Action, TargetSpec};

    fn workflow(name: &str) -> Workflow {
        Workflow::new(name, vec![Step::action("go", Action::click(TargetSpec::text("Go")))])
    }

    #[test]
    fn test_insert_get_remove() {
        let store = WorkflowStore::new();
        let id = store.insert(workflow("checkout")).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_by_name("checkout").unwrap().id, id);

        store.remove(&id).unwrap();
        assert!(store.is_empty());
        assert!(store.get_by_name("checkout").is_none());
    }

    #[test]
    fn test_invalid_workflow_rejected() {
        let store = WorkflowStore::new();
        let invalid = Workflow::new("empty", vec![]);
        assert!(store.insert(invalid).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkout.json");
        let store = WorkflowStore::new();
        let id = store.insert(workflow("checkout")).unwrap();
        store.save_file(&id, &path).unwrap();

        let other = WorkflowStore::new();
        assert_eq!(other.load_file(&path).unwrap(), id);
        assert!(matches!(
            other.save_file(&WorkflowId::new(), &path),
            Err(FlowError::NotFound(_))
        ));
    }
}
