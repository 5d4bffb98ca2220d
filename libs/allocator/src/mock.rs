//! Scripted collaborator doubles for tests and development.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::backend::{CandidateSource, LivenessProbe, RecordStore};
use crate::types::CandidateRecord;

/// Mock inventory source returning a fixed candidate list.
pub struct MockSource {
    candidates: Vec<CandidateRecord>,
    fail: bool,
    calls: AtomicU32,
    last_limit: AtomicU32,
}

impl MockSource {
    /// Source that returns `candidates` on every query.
    pub fn new(candidates: Vec<CandidateRecord>) -> Self {
        Self {
            candidates,
            fail: false,
            calls: AtomicU32::new(0),
            last_limit: AtomicU32::new(0),
        }
    }

    /// Source that fails every query.
    pub fn failing() -> Self {
        Self {
            candidates: Vec::new(),
            fail: true,
            calls: AtomicU32::new(0),
            last_limit: AtomicU32::new(0),
        }
    }

    /// Number of queries issued.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Limit passed to the most recent query.
    pub fn last_limit(&self) -> u32 {
        self.last_limit.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandidateSource for MockSource {
    async fn query_candidates(&self, _subnet: &str, limit: u32) -> Result<Vec<CandidateRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_limit.store(limit, Ordering::SeqCst);

        if self.fail {
            anyhow::bail!("mock source configured to fail");
        }

        // Deliberately ignores the limit so tests can exercise the
        // engine-side inspection clamp.
        Ok(self.candidates.clone())
    }
}

/// Scripted probe outcome for one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeReply {
    /// The address answers.
    Reachable,
    /// The address does not answer.
    Unreachable,
    /// The probe itself errors.
    Fails,
}

/// Mock liveness probe with per-address scripted replies.
pub struct MockProbe {
    replies: HashMap<IpAddr, ProbeReply>,
    default_reply: ProbeReply,
    probed: Mutex<Vec<IpAddr>>,
}

impl MockProbe {
    /// Probe that reports every address unreachable unless scripted.
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            default_reply: ProbeReply::Unreachable,
            probed: Mutex::new(Vec::new()),
        }
    }

    /// Probe that reports every address reachable unless scripted.
    pub fn all_reachable() -> Self {
        Self {
            default_reply: ProbeReply::Reachable,
            ..Self::new()
        }
    }

    /// Probe that errors on every address unless scripted.
    pub fn failing() -> Self {
        Self {
            default_reply: ProbeReply::Fails,
            ..Self::new()
        }
    }

    /// Script the reply for one address.
    pub fn with_reply(mut self, address: IpAddr, reply: ProbeReply) -> Self {
        self.replies.insert(address, reply);
        self
    }

    /// Addresses probed so far, in probe order.
    pub fn probed(&self) -> Vec<IpAddr> {
        self.probed.lock().unwrap().clone()
    }

    /// Number of probes issued.
    pub fn calls(&self) -> usize {
        self.probed.lock().unwrap().len()
    }
}

impl Default for MockProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LivenessProbe for MockProbe {
    async fn is_reachable(&self, address: IpAddr) -> Result<bool> {
        self.probed.lock().unwrap().push(address);

        match self.replies.get(&address).unwrap_or(&self.default_reply) {
            ProbeReply::Reachable => Ok(true),
            ProbeReply::Unreachable => Ok(false),
            ProbeReply::Fails => anyhow::bail!("mock probe configured to fail"),
        }
    }
}

/// Conventional "available" status used by the mock store unless scripted.
const MOCK_AVAILABLE_STATUS: i32 = 2;

/// Mock record store with scripted statuses and write failures.
pub struct MockStore {
    statuses: Mutex<HashMap<String, i32>>,
    fail_field: Option<String>,
    fail_reads: bool,
    attempts: AtomicU32,
    updates: Mutex<Vec<(String, Value)>>,
}

impl MockStore {
    /// Store where every record reads as available and every write succeeds.
    pub fn new() -> Self {
        Self {
            statuses: Mutex::new(HashMap::new()),
            fail_field: None,
            fail_reads: false,
            attempts: AtomicU32::new(0),
            updates: Mutex::new(Vec::new()),
        }
    }

    /// Script the status read back for one record reference.
    pub fn with_status(self, reference: impl Into<String>, status: i32) -> Self {
        self.statuses.lock().unwrap().insert(reference.into(), status);
        self
    }

    /// Fail any update that writes the named field.
    pub fn failing_field(mut self, field: impl Into<String>) -> Self {
        self.fail_field = Some(field.into());
        self
    }

    /// Fail every status read.
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Successful updates, in write order.
    pub fn updates(&self) -> Vec<(String, Value)> {
        self.updates.lock().unwrap().clone()
    }

    /// Number of update calls attempted, including failed ones.
    pub fn update_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MockStore {
    async fn read_status(&self, reference: &str) -> Result<i32> {
        if self.fail_reads {
            anyhow::bail!("mock store configured to fail reads");
        }

        Ok(*self
            .statuses
            .lock()
            .unwrap()
            .get(reference)
            .unwrap_or(&MOCK_AVAILABLE_STATUS))
    }

    async fn update(&self, reference: &str, fields: &Value) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(fail_field) = &self.fail_field {
            if fields.get(fail_field).is_some() {
                anyhow::bail!("mock store configured to fail '{}' writes", fail_field);
            }
        }

        self.updates
            .lock()
            .unwrap()
            .push((reference.to_string(), fields.clone()));
        Ok(())
    }
}
