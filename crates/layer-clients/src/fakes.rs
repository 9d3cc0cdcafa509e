//! In-memory fakes for the client traits (testing only)
//!
//! Provides `MemoryArtifactStore`, `ScriptedBuildService`,
//! `MemoryRuntimeRegistry` and `MemoryConfigStore`. Each counts its calls so
//! tests can assert which services an invocation touched, and each can be
//! told to fail.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client_traits::*;
use crate::error::ClientError;

// ---------------------------------------------------------------------------
// MemoryArtifactStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum GetFailures {
    #[default]
    Never,
    Next(u32),
    Always,
}

/// In-memory artifact store backed by a `BTreeMap<key, bytes>`.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    get_failures: Mutex<GetFailures>,
    puts: AtomicUsize,
    gets: AtomicUsize,
    lists: AtomicUsize,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style seeding, for objects the build service would have written.
    pub fn with_object(self, key: &str, data: &[u8]) -> Self {
        self.insert(key, data);
        self
    }

    pub fn insert(&self, key: &str, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
    }

    /// Stored bytes for `key`, bypassing call counting and failure injection.
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    /// Fail the next `n` calls to `get`, then behave normally.
    pub fn fail_next_gets(&self, n: u32) {
        *self.get_failures.lock().unwrap() = GetFailures::Next(n);
    }

    /// Fail every call to `get`.
    pub fn fail_all_gets(&self) {
        *self.get_failures.lock().unwrap() = GetFailures::Always;
    }

    pub fn put_calls(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.put_calls() + self.get_calls() + self.list_calls()
    }

    fn take_get_failure(&self) -> bool {
        let mut failures = self.get_failures.lock().unwrap();
        match *failures {
            GetFailures::Never => false,
            GetFailures::Always => true,
            GetFailures::Next(0) => {
                *failures = GetFailures::Never;
                false
            }
            GetFailures::Next(n) => {
                *failures = GetFailures::Next(n - 1);
                true
            }
        }
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, key: &str, data: &[u8]) -> ClientResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.insert(key, data);
        Ok(())
    }

    async fn get(&self, key: &str) -> ClientResult<Vec<u8>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.take_get_failure() {
            return Err(ClientError::Transport {
                operation: "get_object",
                message: format!("simulated read failure for {key}"),
            });
        }
        self.object(key).ok_or_else(|| ClientError::NotFound {
            key: key.to_string(),
        })
    }

    async fn list(&self, prefix: &str) -> ClientResult<Vec<String>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// ScriptedBuildService
// ---------------------------------------------------------------------------

/// Job id handed out by `ScriptedBuildService` unless overridden.
pub const SCRIPTED_JOB_ID: &str = "swetest-layer-build:0f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0";

/// Build service that walks through a fixed status script, one entry per poll.
///
/// The last status repeats once the script is exhausted.
#[derive(Debug)]
pub struct ScriptedBuildService {
    script: Vec<BuildStatus>,
    job_id: String,
    reject_submit: Option<String>,
    poll_errors: Mutex<u32>,
    submitted: Mutex<Vec<String>>,
    polls: AtomicUsize,
}

impl ScriptedBuildService {
    pub fn new(script: Vec<BuildStatus>) -> Self {
        Self {
            script,
            job_id: SCRIPTED_JOB_ID.to_string(),
            reject_submit: None,
            poll_errors: Mutex::new(0),
            submitted: Mutex::new(Vec::new()),
            polls: AtomicUsize::new(0),
        }
    }

    /// `polls - 1` in-progress answers, then `SUCCEEDED`.
    pub fn succeeding_after(polls: usize) -> Self {
        Self::ending_with(polls, BuildStatus::Succeeded)
    }

    /// `polls - 1` in-progress answers, then `terminal`.
    pub fn ending_with(polls: usize, terminal: BuildStatus) -> Self {
        let mut script = vec![BuildStatus::InProgress; polls.saturating_sub(1)];
        script.push(terminal);
        Self::new(script)
    }

    /// A service that refuses every submission.
    pub fn rejecting(message: &str) -> Self {
        let mut service = Self::new(vec![BuildStatus::InProgress]);
        service.reject_submit = Some(message.to_string());
        service
    }

    pub fn with_job_id(mut self, job_id: &str) -> Self {
        self.job_id = job_id.to_string();
        self
    }

    /// Fail the next `n` polls with a transport error.
    pub fn fail_next_polls(&self, n: u32) {
        *self.poll_errors.lock().unwrap() = n;
    }

    pub fn submit_calls(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    pub fn submitted_projects(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn poll_calls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.submit_calls() + self.poll_calls()
    }

    fn job_at(&self, status: BuildStatus) -> BuildJob {
        let phase = |name: &str, status: &str| BuildPhase {
            name: name.to_string(),
            status: Some(status.to_string()),
            duration_secs: Some(1),
        };
        let (current_phase, phases) = match status {
            BuildStatus::InProgress => ("BUILD", vec![phase("SUBMITTED", "SUCCEEDED")]),
            BuildStatus::Succeeded => (
                "COMPLETED",
                vec![
                    phase("SUBMITTED", "SUCCEEDED"),
                    phase("INSTALL", "SUCCEEDED"),
                    phase("BUILD", "SUCCEEDED"),
                    phase("UPLOAD_ARTIFACTS", "SUCCEEDED"),
                ],
            ),
            failed => (
                "COMPLETED",
                vec![
                    phase("SUBMITTED", "SUCCEEDED"),
                    phase("INSTALL", "SUCCEEDED"),
                    phase("BUILD", failed.as_str()),
                ],
            ),
        };
        BuildJob {
            id: self.job_id.clone(),
            status,
            current_phase: Some(current_phase.to_string()),
            phases,
            log_link: Some(format!("https://logs.example.test/builds/{}", self.job_id)),
        }
    }
}

#[async_trait]
impl BuildService for ScriptedBuildService {
    async fn submit(&self, project: &str) -> ClientResult<String> {
        self.submitted.lock().unwrap().push(project.to_string());
        match &self.reject_submit {
            Some(message) => Err(ClientError::Rejected {
                operation: "start_build",
                message: message.clone(),
            }),
            None => Ok(self.job_id.clone()),
        }
    }

    async fn poll(&self, job_id: &str) -> ClientResult<BuildJob> {
        let index = self.polls.fetch_add(1, Ordering::SeqCst);
        {
            let mut errors = self.poll_errors.lock().unwrap();
            if *errors > 0 {
                *errors -= 1;
                return Err(ClientError::Transport {
                    operation: "batch_get_builds",
                    message: "simulated throttling".to_string(),
                });
            }
        }
        if job_id != self.job_id {
            return Err(ClientError::NotFound {
                key: job_id.to_string(),
            });
        }
        let status = self
            .script
            .get(index)
            .or_else(|| self.script.last())
            .copied()
            .unwrap_or(BuildStatus::InProgress);
        Ok(self.job_at(status))
    }
}

// ---------------------------------------------------------------------------
// MemoryRuntimeRegistry
// ---------------------------------------------------------------------------

/// A layer version recorded by `MemoryRuntimeRegistry`.
#[derive(Debug, Clone)]
pub struct PublishedLayer {
    pub version: LayerVersion,
    pub publication: LayerPublication,
}

/// Append-only in-memory layer registry.
#[derive(Debug, Default)]
pub struct MemoryRuntimeRegistry {
    published: Mutex<Vec<PublishedLayer>>,
    reject: Option<String>,
    calls: AtomicUsize,
}

impl MemoryRuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that refuses every publication.
    pub fn rejecting(message: &str) -> Self {
        Self {
            reject: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<PublishedLayer> {
        self.published.lock().unwrap().clone()
    }

    pub fn publish_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuntimeRegistry for MemoryRuntimeRegistry {
    async fn publish(&self, publication: LayerPublication) -> ClientResult<LayerVersion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.reject {
            return Err(ClientError::Rejected {
                operation: "publish_layer_version",
                message: message.clone(),
            });
        }
        let mut published = self.published.lock().unwrap();
        let version = published
            .iter()
            .filter(|layer| layer.publication.name == publication.name)
            .count() as i64
            + 1;
        let layer_version = LayerVersion {
            arn: format!(
                "arn:aws:lambda:us-east-1:000000000000:layer:{}:{}",
                publication.name, version
            ),
            version,
        };
        published.push(PublishedLayer {
            version: layer_version.clone(),
            publication,
        });
        Ok(layer_version)
    }
}

// ---------------------------------------------------------------------------
// MemoryConfigStore
// ---------------------------------------------------------------------------

/// In-memory configuration store with overwrite semantics and a write log.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    records: Mutex<BTreeMap<String, ConfigRecord>>,
    writes: Mutex<Vec<ConfigRecord>>,
    reject: Option<String>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses every write.
    pub fn rejecting(message: &str) -> Self {
        Self {
            reject: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn value(&self, name: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap()
            .get(name)
            .map(|record| record.value.clone())
    }

    /// Every successful write in order.
    pub fn writes(&self) -> Vec<ConfigRecord> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn put(&self, name: &str, value: &str, overwrite: bool) -> ClientResult<i64> {
        if let Some(message) = &self.reject {
            return Err(ClientError::Rejected {
                operation: "put_parameter",
                message: message.clone(),
            });
        }
        let mut records = self.records.lock().unwrap();
        let previous = records.get(name).map(|record| record.version);
        if previous.is_some() && !overwrite {
            return Err(ClientError::Rejected {
                operation: "put_parameter",
                message: format!("parameter {name} already exists"),
            });
        }
        let record = ConfigRecord {
            name: name.to_string(),
            value: value.to_string(),
            type_tag: CONFIG_TYPE_STRING.to_string(),
            version: previous.unwrap_or(0) + 1,
        };
        records.insert(name.to_string(), record.clone());
        self.writes.lock().unwrap().push(record.clone());
        Ok(record.version)
    }
}
