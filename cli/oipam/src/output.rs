//! Result output for the CLI.
//!
//! Exactly one record goes to stdout on success; failures go to stderr.

use clap::ValueEnum;
use colored::Colorize;
use oipam_allocator::{AllocationError, AllocationResult};
use serde_json::{json, Value};

/// Output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum Format {
    /// Single JSON record.
    #[default]
    Json,
    /// Human-readable text.
    Text,
}

fn result_record(result: &AllocationResult) -> Value {
    json!({
        "ip_address": result.address.to_string(),
        "uri": result.reference,
    })
}

fn failure_record(err: &AllocationError) -> Value {
    json!({
        "error": err.kind(),
        "detail": err.to_string(),
    })
}

/// Print a successful allocation on stdout.
pub fn print_result(result: &AllocationResult, format: Format) {
    match format {
        Format::Json => {
            let json = serde_json::to_string_pretty(&result_record(result))
                .unwrap_or_else(|_| "{}".to_string());
            println!("{}", json);
        }
        Format::Text => {
            println!("{} claimed {}", "Success:".green().bold(), result.address);
        }
    }
}

/// Print a failed allocation on stderr.
pub fn print_failure(err: &AllocationError, format: Format) {
    match format {
        Format::Json => {
            let json = serde_json::to_string_pretty(&failure_record(err))
                .unwrap_or_else(|_| "{}".to_string());
            eprintln!("{}", json);
        }
        Format::Text => {
            eprintln!("{} {}", "Error:".red().bold(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_record_matches_the_module_return_shape() {
        let result = AllocationResult {
            address: "10.0.0.12".parse().unwrap(),
            reference: "swis://orion/Orion/IPAM.IPNode/IpNodeId=12".to_string(),
        };

        let record = result_record(&result);
        assert_eq!(record["ip_address"], "10.0.0.12");
        assert_eq!(record["uri"], "swis://orion/Orion/IPAM.IPNode/IpNodeId=12");
    }

    #[test]
    fn failure_record_carries_kind_and_detail() {
        let err = AllocationError::NoCandidatesFound {
            subnet: "10.0.0.0/24".to_string(),
        };

        let record = failure_record(&err);
        assert_eq!(record["error"], "no_candidates_found");
        assert!(record["detail"].as_str().unwrap().contains("10.0.0.0/24"));
    }
}
