//! Core allocation engine for Orion IPAM address claims.
//!
//! This library implements the select → verify → claim loop used to hand out
//! an unused IP address from an IPAM subnet:
//!
//! - **Select**: fetch an ordered window of candidate records the inventory
//!   system believes are available.
//! - **Verify**: probe each candidate for liveness; an address that answers
//!   is stale inventory and is skipped.
//! - **Claim**: write status, comment, and scan-flag back to the inventory
//!   record, surfacing exactly which write failed if one does.
//!
//! The three collaborators (inventory source, liveness probe, record store)
//! are trait seams so that real backends and test doubles plug in the same
//! way. The engine itself is sequential; each step depends on the previous
//! step's result.
//!
//! Two callers racing for the same subnet can still pass verification for
//! the same candidate before either claims it. The pre-claim status re-check
//! narrows that window but does not close it; callers that need exclusion
//! must provide it externally.

pub mod allocator;
pub mod backend;
pub mod error;
pub mod mock;
pub mod types;

pub use allocator::{Allocator, AllocatorConfig};
pub use backend::{CandidateSource, LivenessProbe, RecordStore};
pub use error::{AllocationError, ClaimStep};
pub use types::{
    AllocationRequest, AllocationResult, CandidateRecord, DEFAULT_DESIRED_COMMENT,
    DEFAULT_DESIRED_STATUS, DEFAULT_RETRY_LIMIT,
};
