//! Per-project accumulation of pipeline artifacts.
//!
//! Projects are created implicitly on first write and live for the process
//! lifetime. Writes to one project are serialized by that project's own
//! mutex; distinct projects never contend beyond the brief map lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;

use crate::models::{Project, ProjectPatch};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Project store lock poisoned")]
    LockPoisoned,
}

#[derive(Default)]
pub struct ProjectStateStore {
    projects: RwLock<HashMap<String, Arc<Mutex<Project>>>>,
}

impl ProjectStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Result<Arc<Mutex<Project>>, StoreError> {
        {
            let map = self.projects.read().map_err(|_| StoreError::LockPoisoned)?;
            if let Some(slot) = map.get(key) {
                return Ok(slot.clone());
            }
        }
        let mut map = self.projects.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Project::empty(key))))
            .clone())
    }

    /// Field-level merge; returns the project after the merge.
    pub fn merge(&self, key: &str, patch: ProjectPatch) -> Result<Project, StoreError> {
        let slot = self.slot(key)?;
        let mut project = slot.lock().map_err(|_| StoreError::LockPoisoned)?;
        if !patch.is_empty() {
            project.apply(patch);
            tracing::debug!(project_id = key, "project merged");
        }
        Ok(project.clone())
    }

    /// Read-modify-write under the project's lock.
    pub fn update<F, R>(&self, key: &str, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Project) -> R,
    {
        let slot = self.slot(key)?;
        let mut project = slot.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&mut project))
    }

    /// `update` for a project that already exists. An unknown key yields
    /// `None` and is not created.
    pub fn update_existing<F, R>(&self, key: &str, f: F) -> Result<Option<R>, StoreError>
    where
        F: FnOnce(&mut Project) -> R,
    {
        let slot = {
            let map = self.projects.read().map_err(|_| StoreError::LockPoisoned)?;
            map.get(key).cloned()
        };
        let Some(slot) = slot else {
            return Ok(None);
        };
        let mut project = slot.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(Some(f(&mut project)))
    }

    /// Current aggregate; an unknown key yields an empty project.
    pub fn get(&self, key: &str) -> Result<Project, StoreError> {
        let slot = {
            let map = self.projects.read().map_err(|_| StoreError::LockPoisoned)?;
            map.get(key).cloned()
        };
        match slot {
            Some(slot) => Ok(slot.lock().map_err(|_| StoreError::LockPoisoned)?.clone()),
            None => Ok(Project::empty(key)),
        }
    }

    pub fn contains(&self, key: &str) -> Result<bool, StoreError> {
        let map = self.projects.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.contains_key(key))
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let map = self.projects.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FloorPlan, LeaseInfo, SecurityDeposit};

    fn lease(amount: f64) -> LeaseInfo {
        LeaseInfo {
            security_deposit: Some(SecurityDeposit {
                amount: Some(amount),
                currency: Some("EUR".into()),
                conditions: None,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn unknown_key_is_empty_not_error() {
        let store = ProjectStateStore::new();
        let project = store.get("nope").unwrap();
        assert_eq!(project.project_id, "nope");
        assert!(project.lease_info.is_none());
        assert!(!store.contains("nope").unwrap());
    }

    #[test]
    fn update_existing_never_creates() {
        let store = ProjectStateStore::new();
        assert_eq!(store.update_existing("ghost", |_| 1).unwrap(), None);
        assert!(store.is_empty().unwrap());

        store.merge("p1", ProjectPatch::default()).unwrap();
        let id = store.update_existing("p1", |p| p.project_id.clone()).unwrap();
        assert_eq!(id.as_deref(), Some("p1"));
    }

    #[test]
    fn merge_only_touches_supplied_fields() {
        let store = ProjectStateStore::new();
        store
            .merge(
                "p1",
                ProjectPatch {
                    lease_info: Some(lease(900.0)),
                    ..Default::default()
                },
            )
            .unwrap();
        let merged = store
            .merge(
                "p1",
                ProjectPatch {
                    floor_plan: Some(FloorPlan::default()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(merged.lease_info.is_some());
        assert!(merged.floor_plan.is_some());
        assert_eq!(merged.deposit_amount, Some(900.0));
        assert_eq!(merged.deposit_currency.as_deref(), Some("EUR"));
        assert!(merged.updated_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_merges_on_one_key_are_serialized() {
        let store = Arc::new(ProjectStateStore::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let patch = if i % 2 == 0 {
                    ProjectPatch {
                        lease_info: Some(lease(i as f64)),
                        ..Default::default()
                    }
                } else {
                    ProjectPatch {
                        floor_plan: Some(FloorPlan {
                            property_type: Some(format!("plan-{i}")),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }
                };
                store.merge("shared", patch).unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let project = store.get("shared").unwrap();
        // both fields survive and each is a whole value from one writer
        let deposit = project.lease_info.unwrap().deposit_amount().unwrap();
        assert_eq!(Some(deposit), project.deposit_amount);
        assert!(project
            .floor_plan
            .unwrap()
            .property_type
            .unwrap()
            .starts_with("plan-"));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn update_runs_under_lock() {
        let store = ProjectStateStore::new();
        let count = store
            .update("p", |p| {
                p.deposit_amount = Some(1.0);
                p.deposit_amount
            })
            .unwrap();
        assert_eq!(count, Some(1.0));
        assert_eq!(store.get("p").unwrap().deposit_amount, Some(1.0));
    }
}
