//! In-memory object store
//!
//! Keeps objects in a map with a global generation counter, the same
//! guarantees a real bucket gives for conditional writes. Useful for unit
//! tests without network access.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use super::{Generation, ObjectAttributes, ObjectStore};
use crate::error::{RepoError, Result};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    generation: Generation,
    created: DateTime<Utc>,
    cache_control: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<String, StoredObject>,
    next_generation: Generation,
    failing_creates: usize,
    /// Uploads left before the injected failure, counting the failing one
    failing_upload: Option<usize>,
    /// Rewrite applied to a path right before its next conditional delete
    before_delete: Option<(String, Option<Vec<u8>>)>,
    counts: OperationCounts,
}

/// In-memory object store for testing
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone)]
pub struct OperationCounts {
    pub uploads: usize,
    pub downloads: usize,
    pub creates: usize,
    pub deletes: usize,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.read().counts.clone()
    }

    /// Store an object directly, returning its generation
    pub fn put(&self, path: &str, data: impl Into<Vec<u8>>) -> Generation {
        let mut state = self.write();
        Self::insert(&mut state, path, data.into(), None)
    }

    /// Contents of an object
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.read().objects.get(path).map(|o| o.data.clone())
    }

    /// Cache-Control an object was uploaded with
    pub fn cache_control(&self, path: &str) -> Option<String> {
        self.read()
            .objects
            .get(path)
            .and_then(|o| o.cache_control.clone())
    }

    /// All object paths, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = self.read().objects.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Pretend an object was written `age` ago
    pub fn backdate(&self, path: &str, age: Duration) {
        let mut state = self.write();
        if let Some(object) = state.objects.get_mut(path) {
            object.created = Utc::now() - chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::zero());
        }
    }

    /// Make the next `count` conditional creates fail with a transient error
    pub fn fail_next_creates(&self, count: usize) {
        self.write().failing_creates = count;
    }

    /// Make the `nth` upload from now fail, counting from 1
    ///
    /// Uploads before and after it succeed.
    pub fn fail_upload_number(&self, nth: usize) {
        self.write().failing_upload = Some(nth);
    }

    /// On the next conditional delete of `path`, overwrite the object first
    ///
    /// Simulates another writer replacing it between a read of its
    /// attributes and the delete.
    pub fn replace_before_delete(&self, path: &str, data: impl Into<Vec<u8>>) {
        self.write().before_delete = Some((path.to_string(), Some(data.into())));
    }

    /// On the next conditional delete of `path`, remove the object first
    pub fn remove_before_delete(&self, path: &str) {
        self.write().before_delete = Some((path.to_string(), None));
    }

    fn insert(state: &mut State, path: &str, data: Vec<u8>, cache_control: Option<String>) -> Generation {
        state.next_generation += 1;
        let generation = state.next_generation;
        state.objects.insert(
            path.to_string(),
            StoredObject {
                data,
                generation,
                created: Utc::now(),
                cache_control,
            },
        );
        generation
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn attributes(&self, path: &str) -> Result<ObjectAttributes> {
        let state = self.read();
        let object = state
            .objects
            .get(path)
            .ok_or_else(|| RepoError::ObjectNotFound {
                path: path.to_string(),
            })?;
        Ok(ObjectAttributes {
            generation: object.generation,
            created: object.created,
            size: object.data.len() as u64,
        })
    }

    async fn upload(&self, local: &Path, path: &str, cache_control: &str) -> Result<Generation> {
        let data = tokio::fs::read(local).await?;
        let mut state = self.write();
        state.counts.uploads += 1;

        if let Some(remaining) = state.failing_upload {
            if remaining <= 1 {
                state.failing_upload = None;
                return Err(RepoError::Store {
                    message: format!("injected upload failure for {}", path),
                });
            }
            state.failing_upload = Some(remaining - 1);
        }

        Ok(Self::insert(
            &mut state,
            path,
            data,
            Some(cache_control.to_string()),
        ))
    }

    async fn download(&self, path: &str, local: &Path) -> Result<()> {
        let data = {
            let mut state = self.write();
            state.counts.downloads += 1;
            state
                .objects
                .get(path)
                .map(|o| o.data.clone())
                .ok_or_else(|| RepoError::ObjectNotFound {
                    path: path.to_string(),
                })?
        };
        tokio::fs::write(local, data).await?;
        Ok(())
    }

    async fn create_if_absent(&self, path: &str, contents: &[u8]) -> Result<Generation> {
        let mut state = self.write();
        state.counts.creates += 1;

        if state.failing_creates > 0 {
            state.failing_creates -= 1;
            return Err(RepoError::Store {
                message: "injected transient failure".to_string(),
            });
        }

        if state.objects.contains_key(path) {
            return Err(RepoError::PreconditionFailed {
                path: path.to_string(),
            });
        }
        Ok(Self::insert(&mut state, path, contents.to_vec(), None))
    }

    async fn delete_if_generation(&self, path: &str, generation: Generation) -> Result<()> {
        let mut state = self.write();
        state.counts.deletes += 1;

        if state.before_delete.as_ref().is_some_and(|(target, _)| target == path) {
            if let Some((_, replacement)) = state.before_delete.take() {
                match replacement {
                    Some(data) => {
                        Self::insert(&mut state, path, data, None);
                    }
                    None => {
                        state.objects.remove(path);
                    }
                }
            }
        }

        let current = state
            .objects
            .get(path)
            .map(|o| o.generation)
            .ok_or_else(|| RepoError::ObjectNotFound {
                path: path.to_string(),
            })?;
        if current != generation {
            return Err(RepoError::PreconditionFailed {
                path: path.to_string(),
            });
        }
        state.objects.remove(path);
        Ok(())
    }
}
