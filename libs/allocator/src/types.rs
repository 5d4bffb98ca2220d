//! Request and record types for the allocation engine.

use std::net::IpAddr;

use crate::error::AllocationError;

/// Default status written to a claimed record.
pub const DEFAULT_DESIRED_STATUS: &str = "Used";

/// Default comment written to a claimed record.
pub const DEFAULT_DESIRED_COMMENT: &str = "Updated by automation";

/// Default number of candidates inspected per allocation.
pub const DEFAULT_RETRY_LIMIT: u32 = 5;

/// A validated allocation request.
///
/// Constructed once via [`AllocationRequest::new`] and immutable afterwards.
/// `retry_limit` bounds the breadth of the candidate window requested from
/// the inventory system and the number of candidates inspected for liveness;
/// it is not a transient-failure retry count.
#[derive(Debug, Clone)]
pub struct AllocationRequest {
    subnet: String,
    desired_status: String,
    desired_comment: String,
    ping_test: bool,
    retry_limit: u32,
}

impl AllocationRequest {
    /// Validate and construct a request.
    pub fn new(
        subnet: impl Into<String>,
        desired_status: impl Into<String>,
        desired_comment: impl Into<String>,
        ping_test: bool,
        retry_limit: u32,
    ) -> Result<Self, AllocationError> {
        let subnet = subnet.into();
        let desired_status = desired_status.into();

        if subnet.trim().is_empty() {
            return Err(AllocationError::InvalidRequest(
                "subnet must not be empty".to_string(),
            ));
        }
        if desired_status.trim().is_empty() {
            return Err(AllocationError::InvalidRequest(
                "desired status must not be empty".to_string(),
            ));
        }
        if retry_limit < 1 {
            return Err(AllocationError::InvalidRequest(format!(
                "retry limit must be at least 1, got {}",
                retry_limit
            )));
        }

        Ok(Self {
            subnet,
            desired_status,
            desired_comment: desired_comment.into(),
            ping_test,
            retry_limit,
        })
    }

    /// Subnet display name or CIDR the address is allocated from.
    pub fn subnet(&self) -> &str {
        &self.subnet
    }

    /// Status value written to the claimed record.
    pub fn desired_status(&self) -> &str {
        &self.desired_status
    }

    /// Comment written to the claimed record.
    pub fn desired_comment(&self) -> &str {
        &self.desired_comment
    }

    /// Whether candidates are liveness-probed before acceptance.
    pub fn ping_test(&self) -> bool {
        self.ping_test
    }

    /// Maximum number of candidates inspected in one call.
    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }
}

/// One candidate row from the inventory system.
///
/// Transient: fetched once per allocation attempt and either claimed or
/// discarded, never cached across calls. Candidates arrive in the inventory
/// system's own availability order and the engine consumes them in that
/// order without re-sorting or deduplicating.
#[derive(Debug, Clone)]
pub struct CandidateRecord {
    /// The candidate address.
    pub address: IpAddr,

    /// Opaque record reference used to address the record store.
    ///
    /// Never parsed by the engine; only checked for emptiness.
    pub reference: String,

    /// Raw status value the inventory system reported for this record.
    pub raw_status: i32,

    /// Display name of the record, if the inventory system provided one.
    pub display_name: Option<String>,

    /// Existing comment on the record, if any.
    pub comments: Option<String>,
}

impl CandidateRecord {
    /// Whether the record carries a usable (non-blank) reference.
    pub fn has_reference(&self) -> bool {
        !self.reference.trim().is_empty()
    }
}

/// A successful allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationResult {
    /// The claimed address.
    pub address: IpAddr,

    /// Reference of the claimed record.
    pub reference: String,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn request_accepts_valid_input() {
        let request = AllocationRequest::new(
            "10.0.0.0/24",
            DEFAULT_DESIRED_STATUS,
            DEFAULT_DESIRED_COMMENT,
            true,
            DEFAULT_RETRY_LIMIT,
        )
        .unwrap();

        assert_eq!(request.subnet(), "10.0.0.0/24");
        assert_eq!(request.desired_status(), "Used");
        assert_eq!(request.retry_limit(), 5);
        assert!(request.ping_test());
    }

    #[rstest]
    #[case("", "Used", 5)]
    #[case("   ", "Used", 5)]
    #[case("10.0.0.0/24", "", 5)]
    #[case("10.0.0.0/24", "Used", 0)]
    fn request_rejects_invalid_input(
        #[case] subnet: &str,
        #[case] status: &str,
        #[case] retry_limit: u32,
    ) {
        let result = AllocationRequest::new(subnet, status, "c", false, retry_limit);
        assert!(matches!(result, Err(AllocationError::InvalidRequest(_))));
    }

    #[test]
    fn blank_reference_is_flagged() {
        let candidate = CandidateRecord {
            address: "10.0.0.5".parse().unwrap(),
            reference: "  ".to_string(),
            raw_status: 2,
            display_name: None,
            comments: None,
        };
        assert!(!candidate.has_reference());
    }
}
