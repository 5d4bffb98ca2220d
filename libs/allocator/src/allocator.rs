//! The allocation loop: fetch, evaluate, claim.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::backend::{CandidateSource, LivenessProbe, RecordStore};
use crate::error::{AllocationError, ClaimStep};
use crate::types::{AllocationRequest, AllocationResult, CandidateRecord};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Timeout applied to each inventory query and record write.
    pub call_timeout: Duration,

    /// Timeout applied to each liveness probe.
    pub probe_timeout: Duration,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

/// Outcome of one claim attempt.
enum ClaimAttempt {
    /// All three writes landed.
    Claimed,
    /// The record changed since the query; the candidate is gone.
    Lost,
}

/// The allocation engine.
///
/// One [`allocate`](Allocator::allocate) call produces exactly one success
/// or one typed failure. The engine holds no state across calls.
pub struct Allocator {
    source: Arc<dyn CandidateSource>,
    probe: Arc<dyn LivenessProbe>,
    store: Arc<dyn RecordStore>,
    config: AllocatorConfig,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Allocator {
    /// Create an engine over the three collaborators with default config.
    pub fn new(
        source: Arc<dyn CandidateSource>,
        probe: Arc<dyn LivenessProbe>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            source,
            probe,
            store,
            config: AllocatorConfig::default(),
            shutdown: None,
        }
    }

    /// Override the timeout configuration.
    pub fn with_config(mut self, config: AllocatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Cancel between steps once the channel flips to `true`.
    ///
    /// The flag is checked before the fetch and before each probe, never
    /// inside the claim write sequence: a claim that has started either
    /// finishes or fails with the step that broke.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Allocate one address from the requested subnet.
    pub async fn allocate(
        &self,
        request: &AllocationRequest,
    ) -> Result<AllocationResult, AllocationError> {
        info!(
            subnet = request.subnet(),
            ping_test = request.ping_test(),
            retry_limit = request.retry_limit(),
            "allocating address"
        );

        self.check_cancelled()?;

        let candidates = self.fetch_candidates(request).await?;
        if candidates.is_empty() {
            return Err(AllocationError::NoCandidatesFound {
                subnet: request.subnet().to_string(),
            });
        }

        debug!(count = candidates.len(), "inventory returned candidates");

        // Candidate order is the inventory system's availability ranking and
        // is consumed as-is.
        let mut inspected = 0u32;
        for candidate in candidates.iter().take(request.retry_limit() as usize) {
            inspected += 1;

            if !candidate.has_reference() {
                warn!(
                    address = %candidate.address,
                    "candidate has a blank record reference, skipping"
                );
                continue;
            }

            if request.ping_test() {
                self.check_cancelled()?;
                if self.answers_probe(candidate).await {
                    continue;
                }
            }

            match self.claim(request, candidate).await? {
                ClaimAttempt::Claimed => {
                    info!(
                        address = %candidate.address,
                        reference = %candidate.reference,
                        "address claimed"
                    );
                    return Ok(AllocationResult {
                        address: candidate.address,
                        reference: candidate.reference.clone(),
                    });
                }
                ClaimAttempt::Lost => continue,
            }
        }

        Err(AllocationError::NoUnusedAddressFound {
            subnet: request.subnet().to_string(),
            inspected,
        })
    }

    async fn fetch_candidates(
        &self,
        request: &AllocationRequest,
    ) -> Result<Vec<CandidateRecord>, AllocationError> {
        let query = self
            .source
            .query_candidates(request.subnet(), request.retry_limit());

        match timeout(self.config.call_timeout, query).await {
            Ok(Ok(candidates)) => Ok(candidates),
            Ok(Err(e)) => Err(AllocationError::QueryFailed {
                detail: format!("{e:#}"),
            }),
            Err(_) => Err(AllocationError::QueryFailed {
                detail: format!("query timed out after {:?}", self.config.call_timeout),
            }),
        }
    }

    /// Probe one candidate, returning `true` if it must be skipped.
    ///
    /// A reachable address means the inventory is stale for this record. An
    /// errored or timed-out probe also counts as reachable: skipping a free
    /// address is cheaper than handing out a live one.
    async fn answers_probe(&self, candidate: &CandidateRecord) -> bool {
        let probe = self.probe.is_reachable(candidate.address);

        match timeout(self.config.probe_timeout, probe).await {
            Ok(Ok(false)) => false,
            Ok(Ok(true)) => {
                info!(
                    address = %candidate.address,
                    "address answered probe, inventory is stale, skipping"
                );
                true
            }
            Ok(Err(e)) => {
                warn!(
                    address = %candidate.address,
                    error = %format!("{e:#}"),
                    "probe inconclusive, treating address as reachable"
                );
                true
            }
            Err(_) => {
                warn!(
                    address = %candidate.address,
                    timeout = ?self.config.probe_timeout,
                    "probe timed out, treating address as reachable"
                );
                true
            }
        }
    }

    /// Re-check availability, then write the claim.
    ///
    /// The backing store offers no transaction primitive, so the three writes
    /// are attempted independently and are not rolled back on failure; the
    /// error names the step that broke so partial state can be reconciled.
    async fn claim(
        &self,
        request: &AllocationRequest,
        candidate: &CandidateRecord,
    ) -> Result<ClaimAttempt, AllocationError> {
        if !self.still_available(candidate).await {
            return Ok(ClaimAttempt::Lost);
        }

        let writes: [(ClaimStep, Value); 3] = [
            (
                ClaimStep::Status,
                json!({ "Status": request.desired_status() }),
            ),
            (
                ClaimStep::Comment,
                json!({ "Comments": request.desired_comment() }),
            ),
            (ClaimStep::ScanFlag, json!({ "SkipScan": true })),
        ];

        for (step, fields) in &writes {
            self.write_claim_field(candidate, *step, fields).await?;
        }

        Ok(ClaimAttempt::Claimed)
    }

    /// Optimistic pre-claim check: the record must still carry the status
    /// the query observed. A changed status or an unreadable record counts
    /// as a lost candidate and the loop moves on to the next one instead of
    /// failing the whole call.
    async fn still_available(&self, candidate: &CandidateRecord) -> bool {
        let read = self.store.read_status(&candidate.reference);

        match timeout(self.config.call_timeout, read).await {
            Ok(Ok(status)) if status == candidate.raw_status => true,
            Ok(Ok(status)) => {
                info!(
                    address = %candidate.address,
                    observed = candidate.raw_status,
                    current = status,
                    "record status changed since query, candidate lost"
                );
                false
            }
            Ok(Err(e)) => {
                warn!(
                    address = %candidate.address,
                    error = %format!("{e:#}"),
                    "could not re-read record status, treating candidate as lost"
                );
                false
            }
            Err(_) => {
                warn!(
                    address = %candidate.address,
                    "status re-read timed out, treating candidate as lost"
                );
                false
            }
        }
    }

    async fn write_claim_field(
        &self,
        candidate: &CandidateRecord,
        step: ClaimStep,
        fields: &Value,
    ) -> Result<(), AllocationError> {
        let write = self.store.update(&candidate.reference, fields);

        match timeout(self.config.call_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(AllocationError::ClaimFailed {
                step,
                address: candidate.address,
                detail: format!("{e:#}"),
            }),
            Err(_) => Err(AllocationError::ClaimFailed {
                step,
                address: candidate.address,
                detail: format!("write timed out after {:?}", self.config.call_timeout),
            }),
        }
    }

    fn check_cancelled(&self) -> Result<(), AllocationError> {
        match &self.shutdown {
            Some(rx) if *rx.borrow() => Err(AllocationError::Cancelled),
            _ => Ok(()),
        }
    }
}
