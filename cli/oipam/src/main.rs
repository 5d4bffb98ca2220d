//! oipam — claim the next unused IP address from a Solarwinds Orion IPAM
//! subnet.
//!
//! Queries Orion for candidate records in the subnet, optionally verifies
//! each candidate is really silent on the network, and writes the claim
//! (status, comment, scan flag) back to the record. Emits a single success
//! or failure record; exit code 0 only on success. The password is read
//! from `OIPAM_PASSWORD` and never logged or echoed.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::sync::watch;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use oipam_allocator::{
    AllocationError, AllocationRequest, AllocationResult, Allocator, AllocatorConfig,
    LivenessProbe, DEFAULT_DESIRED_COMMENT, DEFAULT_DESIRED_STATUS, DEFAULT_RETRY_LIMIT,
};
use oipam_probe::{PingProbe, TcpProbe, DEFAULT_TCP_PROBE_PORT};
use oipam_swis::{Password, SwisClient, SwisConfig, SwisError, DEFAULT_SWIS_PORT};

mod output;

use output::{print_failure, print_result, Format};

/// Claim the next unused IP address from an Orion IPAM subnet.
#[derive(Debug, Parser)]
#[command(name = "oipam")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subnet display name or CIDR to allocate from.
    #[arg(long)]
    subnet: String,

    /// Orion server hostname.
    #[arg(long, env = "OIPAM_SERVER")]
    server: String,

    /// SWIS API port.
    #[arg(long, default_value_t = DEFAULT_SWIS_PORT)]
    port: u16,

    /// Orion API username.
    #[arg(long, env = "OIPAM_USERNAME")]
    username: String,

    /// Orion API password.
    #[arg(long, env = "OIPAM_PASSWORD", hide_env_values = true)]
    password: String,

    /// Skip TLS certificate verification (self-signed Orion installs).
    #[arg(long)]
    insecure: bool,

    /// Status written to the claimed record.
    #[arg(long, default_value = DEFAULT_DESIRED_STATUS)]
    status: String,

    /// Comment written to the claimed record.
    #[arg(long, default_value = DEFAULT_DESIRED_COMMENT)]
    comment: String,

    /// Accept the first candidate without probing it.
    #[arg(long)]
    no_ping: bool,

    /// How many candidates to inspect before giving up.
    #[arg(long, default_value_t = DEFAULT_RETRY_LIMIT)]
    retry_limit: u32,

    /// Liveness probe method.
    #[arg(long, value_enum, default_value = "ping")]
    probe: ProbeMethod,

    /// Port used by the tcp probe method.
    #[arg(long, default_value_t = DEFAULT_TCP_PROBE_PORT)]
    probe_port: u16,

    /// Per-probe timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    probe_timeout_ms: u64,

    /// Per-request timeout in seconds for SWIS calls.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Output format.
    #[arg(long, value_enum, default_value = "json")]
    format: Format,
}

/// How candidates are probed for liveness.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProbeMethod {
    /// ICMP echo via the system ping binary.
    Ping,
    /// TCP connect; a refused connection counts as alive.
    Tcp,
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so stdout stays a single machine-readable record.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let format = cli.format;

    match run(cli).await {
        Ok(result) => print_result(&result, format),
        Err(err) => {
            print_failure(&err, format);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<AllocationResult, AllocationError> {
    let request = AllocationRequest::new(
        cli.subnet,
        cli.status,
        cli.comment,
        !cli.no_ping,
        cli.retry_limit,
    )?;

    let mut swis_config = SwisConfig::new(cli.server, cli.username, Password::new(cli.password))
        .with_port(cli.port)
        .with_timeout(Duration::from_secs(cli.timeout_secs));
    if cli.insecure {
        swis_config = swis_config.insecure();
    }

    let swis = Arc::new(SwisClient::new(&swis_config).map_err(|e| match e {
        SwisError::Config(msg) => AllocationError::InvalidRequest(msg),
        other => AllocationError::QueryFailed {
            detail: other.to_string(),
        },
    })?);

    let probe_timeout = Duration::from_millis(cli.probe_timeout_ms);
    let probe: Arc<dyn LivenessProbe> = match cli.probe {
        ProbeMethod::Ping => Arc::new(PingProbe::new(probe_timeout)),
        ProbeMethod::Tcp => Arc::new(TcpProbe::new(cli.probe_port, probe_timeout)),
    };

    // Ctrl-C cancels between steps; a claim already in flight runs to its
    // own conclusion.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received, cancelling");
            let _ = shutdown_tx.send(true);
        }
    });

    let allocator = Allocator::new(swis.clone(), probe, swis)
        .with_config(AllocatorConfig {
            call_timeout: Duration::from_secs(cli.timeout_secs),
            // Engine backstop sits above the prober's own deadline.
            probe_timeout: probe_timeout + Duration::from_secs(2),
        })
        .with_shutdown(shutdown_rx);

    allocator.allocate(&request).await
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_match_the_exposed_operation() {
        let cli = Cli::try_parse_from([
            "oipam",
            "--subnet",
            "10.0.0.0/24",
            "--server",
            "orion.example.com",
            "--username",
            "api",
            "--password",
            "pw",
        ])
        .unwrap();

        assert_eq!(cli.status, "Used");
        assert_eq!(cli.comment, "Updated by automation");
        assert_eq!(cli.retry_limit, 5);
        assert_eq!(cli.port, 17778);
        assert!(!cli.no_ping);
        assert!(!cli.insecure);
    }
}
