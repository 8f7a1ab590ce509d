use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use klinesync_core::{DatasetStore, SyncError};

#[derive(Debug, Clone)]
enum Fault {
    Fail(SyncError),
    Hang,
}

/// In-memory dataset store with per-path fault injection.
///
/// Faults apply to `download`, `upload` and `delete` on the matching path.
/// One-shot faults are consumed in order before sticky ones are consulted.
#[derive(Default)]
pub struct MockStore {
    files: Mutex<BTreeMap<String, Bytes>>,
    one_shot: Mutex<HashMap<String, VecDeque<Fault>>>,
    sticky: Mutex<HashMap<String, Fault>>,
    upload_faults: Mutex<HashMap<String, SyncError>>,
    uploads: Mutex<Vec<(String, String)>>,
    deletes: Mutex<Vec<String>>,
    attempts: Mutex<HashMap<String, usize>>,
}

impl MockStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn insert(&self, path: &str, content: Bytes) {
        self.files
            .lock()
            .expect("mutex poisoned")
            .insert(path.to_string(), content);
    }

    /// Current content of a file.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.files.lock().expect("mutex poisoned").get(path).cloned()
    }

    /// All stored paths, sorted.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.files.lock().expect("mutex poisoned").keys().cloned().collect()
    }

    /// Fail the next call on `path` with `err`.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn fail_next(&self, path: &str, err: SyncError) {
        self.one_shot
            .lock()
            .expect("mutex poisoned")
            .entry(path.to_string())
            .or_default()
            .push_back(Fault::Fail(err));
    }

    /// Fail every call on `path` with `err`.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn fail_always(&self, path: &str, err: SyncError) {
        self.sticky
            .lock()
            .expect("mutex poisoned")
            .insert(path.to_string(), Fault::Fail(err));
    }

    /// Fail every upload to `path` with `err`; downloads and deletes still work.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn reject_uploads(&self, path: &str, err: SyncError) {
        self.upload_faults
            .lock()
            .expect("mutex poisoned")
            .insert(path.to_string(), err);
    }

    /// Never complete calls on `path`.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn hang_on(&self, path: &str) {
        self.sticky
            .lock()
            .expect("mutex poisoned")
            .insert(path.to_string(), Fault::Hang);
    }

    /// Successful uploads as `(path, commit message)`, in order.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.lock().expect("mutex poisoned").clone()
    }

    /// Successful deletes, in order.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn deletes(&self) -> Vec<String> {
        self.deletes.lock().expect("mutex poisoned").clone()
    }

    /// Calls made against `path`, including failed ones.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn attempts(&self, path: &str) -> usize {
        self.attempts
            .lock()
            .expect("mutex poisoned")
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    fn next_fault(&self, path: &str) -> Option<Fault> {
        *self
            .attempts
            .lock()
            .expect("mutex poisoned")
            .entry(path.to_string())
            .or_default() += 1;
        let one_shot = self
            .one_shot
            .lock()
            .expect("mutex poisoned")
            .get_mut(path)
            .and_then(VecDeque::pop_front);
        one_shot.or_else(|| self.sticky.lock().expect("mutex poisoned").get(path).cloned())
    }

    async fn check(&self, path: &str) -> Result<(), SyncError> {
        match self.next_fault(path) {
            None => Ok(()),
            Some(Fault::Fail(err)) => Err(err),
            Some(Fault::Hang) => std::future::pending().await,
        }
    }
}

#[async_trait]
impl DatasetStore for MockStore {
    fn name(&self) -> &'static str {
        "mock-store"
    }

    async fn download(&self, path: &str) -> Result<Option<Bytes>, SyncError> {
        self.check(path).await?;
        Ok(self.get(path))
    }

    async fn upload(&self, path: &str, content: Bytes, message: &str) -> Result<(), SyncError> {
        self.check(path).await?;
        let rejected = self
            .upload_faults
            .lock()
            .expect("mutex poisoned")
            .get(path)
            .cloned();
        if let Some(err) = rejected {
            return Err(err);
        }
        self.insert(path, content);
        self.uploads
            .lock()
            .expect("mutex poisoned")
            .push((path.to_string(), message.to_string()));
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, SyncError> {
        let prefix = prefix.trim_end_matches('/');
        Ok(self
            .paths()
            .into_iter()
            .filter(|p| prefix.is_empty() || p.starts_with(&format!("{prefix}/")))
            .collect())
    }

    async fn delete(&self, path: &str, _message: &str) -> Result<(), SyncError> {
        self.check(path).await?;
        let removed = self.files.lock().expect("mutex poisoned").remove(path);
        if removed.is_none() {
            return Err(SyncError::not_found(path));
        }
        self.deletes
            .lock()
            .expect("mutex poisoned")
            .push(path.to_string());
        Ok(())
    }
}
