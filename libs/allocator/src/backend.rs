//! Collaborator interfaces consumed by the allocation engine.
//!
//! Real backends (the SWIS client, the probers) and test doubles implement
//! these traits. All methods return `anyhow::Result`; the engine converts
//! failures into the specific [`AllocationError`](crate::AllocationError)
//! kind for the call site.

use std::net::IpAddr;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::types::CandidateRecord;

/// Ordered candidate lookup against the inventory system.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Fetch up to `limit` candidate records for `subnet`, in the inventory
    /// system's own availability order (first-available-first).
    async fn query_candidates(&self, subnet: &str, limit: u32) -> Result<Vec<CandidateRecord>>;
}

/// Network reachability check for a single address.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Whether `address` answers on the network.
    ///
    /// Reachability is a heuristic for "in use", not a guarantee: ICMP may
    /// be filtered, and an unused address may be momentarily unreachable.
    async fn is_reachable(&self, address: IpAddr) -> Result<bool>;
}

/// Field writes against a single inventory record.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read the record's current raw status value.
    async fn read_status(&self, reference: &str) -> Result<i32>;

    /// Persist a field/value mutation on the record.
    async fn update(&self, reference: &str, fields: &Value) -> Result<()>;
}
