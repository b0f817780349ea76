use clap::Parser;
use getset::{CopyGetters, Getters};
use gwc_core::instrumentation::{LogFormat, LogLevel};
use std::net::SocketAddr;

#[derive(Parser, Getters, CopyGetters, Debug)]
#[command(about = "Derives Gateway API Gateways from WrappedGateways and their routes", long_about = None)]
pub struct Cli {
    #[getset(get_copy = "pub")]
    #[arg(default_value = "0.0.0.0:8081", env = "HEALTH_ADDRESS", long = "health-address")]
    health_address: SocketAddr,

    #[getset(get_copy = "pub")]
    #[arg(default_value = "text", env = "LOG_FORMAT", long = "log-format")]
    log_format: LogFormat,

    #[getset(get_copy = "pub")]
    #[arg(default_value = "info", env = "LOG_LEVEL", long = "log-level")]
    log_level: LogLevel,

    /// Objects of one kind reconciled at the same time.
    #[getset(get_copy = "pub")]
    #[arg(default_value = "4", env = "CONCURRENCY", long = "concurrency")]
    concurrency: u16,

    /// Run the controllers only while holding the leader Lease.
    #[getset(get_copy = "pub")]
    #[arg(env = "LEADER_ELECTION", long = "leader-election")]
    leader_election: bool,

    /// Namespace of the leader Lease. Defaults to the client's namespace.
    #[getset(get = "pub")]
    #[arg(env = "POD_NAMESPACE", long = "leader-election-namespace")]
    leader_election_namespace: Option<String>,

    #[getset(get = "pub")]
    #[arg(env = "HOSTNAME", long = "leader-election-identity")]
    leader_election_identity: Option<String>,
}
