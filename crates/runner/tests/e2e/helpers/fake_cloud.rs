//! In-memory stand-in for the cloud provider.
//!
//! The mock provisioner writes into it on apply/destroy and the mock platform
//! client reads from it, so a scenario exercises the same path it would
//! against a real project.

use std::collections::HashMap;
use std::sync::Mutex;

use terraprobe_core::types::LiveState;

/// Resources and bucket objects keyed by resource name.
#[derive(Default)]
pub struct FakeCloud {
    resources: Mutex<HashMap<String, LiveState>>,
    objects: Mutex<HashMap<String, Vec<String>>>,
    reads: Mutex<HashMap<String, u32>>,
}

#[allow(dead_code)]
impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, state: LiveState) {
        let name = state.reference.name.clone();
        self.resources.lock().unwrap().insert(name, state);
    }

    pub fn get(&self, name: &str) -> Option<LiveState> {
        self.resources.lock().unwrap().get(name).cloned()
    }

    pub fn remove(&self, name: &str) {
        self.resources.lock().unwrap().remove(name);
        self.objects.lock().unwrap().remove(name);
    }

    pub fn exists(&self, name: &str) -> bool {
        self.resources.lock().unwrap().contains_key(name)
    }

    /// Names of every resource still present.
    pub fn live_resources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.resources.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn add_object(&self, bucket: &str, object: &str) {
        self.objects
            .lock()
            .unwrap()
            .entry(bucket.to_owned())
            .or_default()
            .push(object.to_owned());
    }

    pub fn objects(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .get(bucket)
            .cloned()
            .unwrap_or_default()
    }

    /// Counts one read of `name` and returns the running total.
    pub fn record_read(&self, name: &str) -> u32 {
        let mut reads = self.reads.lock().unwrap();
        let count = reads.entry(name.to_owned()).or_default();
        *count += 1;
        *count
    }

    pub fn reads(&self, name: &str) -> u32 {
        self.reads.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}
