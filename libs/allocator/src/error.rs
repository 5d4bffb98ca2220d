//! Allocation error taxonomy.

use std::net::IpAddr;

use thiserror::Error;

/// Which of the three claim writes failed.
///
/// The claim is an ordered write sequence with no rollback; the step lets an
/// operator reconcile whatever partial state was left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStep {
    /// The status write.
    Status,
    /// The comment write.
    Comment,
    /// Clearing the needs-scan marker.
    ScanFlag,
}

impl std::fmt::Display for ClaimStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimStep::Status => write!(f, "status"),
            ClaimStep::Comment => write!(f, "comment"),
            ClaimStep::ScanFlag => write!(f, "scan_flag"),
        }
    }
}

/// Terminal failure of one allocation call.
///
/// Every collaborator error is converted at its call site into one of these
/// kinds with the original error preserved in the detail; nothing propagates
/// to the caller as a generic error.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// Malformed input, rejected before any collaborator call.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The inventory query could not be completed. Not retried: credential
    /// and subnet errors are not transient.
    #[error("inventory query failed: {detail}")]
    QueryFailed { detail: String },

    /// The query succeeded but returned no candidates.
    #[error("no available candidates in subnet {subnet}")]
    NoCandidatesFound { subnet: String },

    /// Every inspected candidate answered a probe, was inconclusive, or was
    /// malformed.
    #[error("no unused address found in subnet {subnet} after inspecting {inspected} candidate(s)")]
    NoUnusedAddressFound { subnet: String, inspected: u32 },

    /// A claim write failed after a candidate was accepted. Earlier writes in
    /// the sequence are not rolled back; the record may be partially claimed.
    #[error("claim write '{step}' failed for {address}: {detail}")]
    ClaimFailed {
        step: ClaimStep,
        address: IpAddr,
        detail: String,
    },

    /// The call was cancelled between steps.
    #[error("allocation cancelled")]
    Cancelled,
}

impl AllocationError {
    /// Stable kind string for structured output.
    pub fn kind(&self) -> &'static str {
        match self {
            AllocationError::InvalidRequest(_) => "invalid_request",
            AllocationError::QueryFailed { .. } => "query_failed",
            AllocationError::NoCandidatesFound { .. } => "no_candidates_found",
            AllocationError::NoUnusedAddressFound { .. } => "no_unused_address_found",
            AllocationError::ClaimFailed { .. } => "claim_failed",
            AllocationError::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_are_stable() {
        let err = AllocationError::ClaimFailed {
            step: ClaimStep::Comment,
            address: "10.0.0.5".parse().unwrap(),
            detail: "boom".to_string(),
        };
        assert_eq!(err.kind(), "claim_failed");
        assert!(err.to_string().contains("'comment'"));
        assert!(err.to_string().contains("10.0.0.5"));
    }
}
