//! In-memory Storage double with failure injection.

use async_trait::async_trait;
use bytes::Bytes;
use marquee_storage::keys::is_folder_placeholder;
use marquee_storage::{Storage, StorageBackend, StorageError, StorageResult};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct FlakyStorage {
    files: Arc<Mutex<BTreeMap<String, Bytes>>>,
    list_unavailable: AtomicBool,
    unavailable_keys: Mutex<HashSet<String>>,
    /// Deletes of these keys are acknowledged but never take effect.
    sticky_keys: Mutex<HashSet<String>>,
    deleted: Mutex<Vec<String>>,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files(keys: &[&str]) -> Self {
        let storage = Self::new();
        for key in keys {
            storage.set_file(key, b"data");
        }
        storage
    }

    pub fn set_file(&self, key: &str, data: &'static [u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::from_static(data));
    }

    pub fn has_file(&self, key: &str) -> bool {
        self.files.lock().unwrap().contains_key(key)
    }

    pub fn fail_listing(&self, fail: bool) {
        self.list_unavailable.store(fail, Ordering::SeqCst);
    }

    pub fn fail_key(&self, key: &str) {
        self.unavailable_keys
            .lock()
            .unwrap()
            .insert(key.to_string());
    }

    pub fn make_sticky(&self, key: &str) {
        self.sticky_keys.lock().unwrap().insert(key.to_string());
    }

    /// Keys a delete call actually removed, in order.
    pub fn deleted_keys(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    fn check_key(&self, key: &str) -> StorageResult<()> {
        if self.unavailable_keys.lock().unwrap().contains(key) {
            return Err(StorageError::Unavailable(format!("injected failure for {}", key)));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        if self.list_unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected listing failure".to_string()));
        }
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, data)| {
                key.starts_with(prefix) && !is_folder_placeholder(key, data.len() as u64)
            })
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn create_folder(&self, prefix: &str) -> StorageResult<()> {
        self.set_file(&format!("{}.keep", prefix), b"");
        Ok(())
    }

    async fn write(&self, key: &str, data: Bytes, _content_type: &str) -> StorageResult<String> {
        self.check_key(key)?;
        self.files.lock().unwrap().insert(key.to_string(), data);
        Ok(key.to_string())
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        self.check_key(key)?;
        if self.sticky_keys.lock().unwrap().contains(key) {
            return Ok(false);
        }
        if self.files.lock().unwrap().remove(key).is_some() {
            self.deleted.lock().unwrap().push(key.to_string());
        }
        Ok(!self.has_file(key))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.check_key(key)?;
        Ok(self.has_file(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_url_base(), key.replace(' ', "%20"))
    }

    fn public_url_base(&self) -> String {
        "https://cdn.test".to_string()
    }
}
