use core::time::Duration;

use anyhow::bail;
use clap::{Parser, ValueEnum};
use flakeid::{FlakeId, RetryPolicy, ServiceConfig};

/// How the process obtains its worker ID.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    /// Use `WORKER_ID` as-is. The operator keeps it unique.
    Static,
    /// Lease the lowest free ID from etcd.
    Etcd,
}

/// Console log encoding.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Runtime configuration for the `flakeid-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults suitable for a single-node
/// deployment.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "flakeid-server",
    version,
    about = "An HTTP service for fleet-unique Snowflake IDs"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,

    /// Worker ID allocation strategy.
    ///
    /// Environment variable: `WORKER_MODE`
    #[arg(long, env = "WORKER_MODE", value_enum, default_value_t = WorkerMode::Static)]
    pub worker_mode: WorkerMode,

    /// Worker ID used in `static` mode.
    ///
    /// Environment variable: `WORKER_ID`
    #[arg(long, env = "WORKER_ID", default_value_t = 0)]
    pub worker_id: u64,

    /// Highest worker ID the `etcd` mode may claim. Lowering it shrinks the
    /// pool, which is useful to partition the ID space between deployments.
    ///
    /// Environment variable: `MAX_WORKER_ID`
    #[arg(long, env = "MAX_WORKER_ID", default_value_t = 1023)]
    pub max_worker_id: u64,

    /// Comma-separated etcd endpoints.
    ///
    /// Environment variable: `ETCD_ENDPOINTS`
    #[arg(long, env = "ETCD_ENDPOINTS", value_delimiter = ',', default_value = "127.0.0.1:2379")]
    pub etcd_endpoints: Vec<String>,

    /// Key prefix under which worker slots are claimed.
    ///
    /// Environment variable: `ETCD_NAMESPACE`
    #[arg(long, env = "ETCD_NAMESPACE", default_value_t = String::from("/flakeid/workers"))]
    pub etcd_namespace: String,

    /// Lease TTL. A crashed process frees its slot after at most this long.
    ///
    /// Environment variable: `ETCD_LEASE_TTL_SECS`
    #[arg(long, env = "ETCD_LEASE_TTL_SECS", default_value_t = 10)]
    pub etcd_lease_ttl_secs: u64,

    /// Attempts per coordination call before startup gives up.
    ///
    /// Environment variable: `COORDINATOR_ATTEMPTS`
    #[arg(long, env = "COORDINATOR_ATTEMPTS", default_value_t = 10)]
    pub coordinator_attempts: u32,

    /// Initial backoff between coordination attempts; doubles up to 10x.
    ///
    /// Environment variable: `COORDINATOR_BACKOFF_MS`
    #[arg(long, env = "COORDINATOR_BACKOFF_MS", default_value_t = 500)]
    pub coordinator_backoff_ms: u64,

    /// File holding the last used timestamp.
    ///
    /// Environment variable: `CHECKPOINT_PATH`
    #[arg(long, env = "CHECKPOINT_PATH", default_value_t = String::from("flakeid.checkpoint.json"))]
    pub checkpoint_path: String,

    /// How often the checkpoint is rewritten.
    ///
    /// Environment variable: `CHECKPOINT_INTERVAL_MS`
    #[arg(long, env = "CHECKPOINT_INTERVAL_MS", default_value_t = 1000)]
    pub checkpoint_interval_ms: u64,

    /// Custom epoch in milliseconds since the Unix epoch. Changing it on a
    /// live fleet breaks ordering.
    ///
    /// Environment variable: `EPOCH_MS`
    #[arg(long, env = "EPOCH_MS", default_value_t = flakeid::DEFAULT_EPOCH)]
    pub epoch_ms: u64,

    /// Console log encoding.
    ///
    /// Environment variable: `LOG_FORMAT`
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub worker_mode: WorkerMode,
    pub worker_id: u64,
    pub max_worker_id: u64,
    pub etcd_endpoints: Vec<String>,
    pub etcd_namespace: String,
    pub etcd_lease_ttl: Duration,
    pub retry: RetryPolicy,
    pub checkpoint_path: String,
    pub service: ServiceConfig,
    pub log_format: LogFormat,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let max_worker_id = FlakeId::max_worker_id();

        if args.worker_id > max_worker_id {
            bail!(
                "WORKER_ID ({}) exceeds the worker ID space (max = {})",
                args.worker_id,
                max_worker_id
            );
        }

        if args.max_worker_id > max_worker_id {
            bail!(
                "MAX_WORKER_ID ({}) exceeds the worker ID space (max = {})",
                args.max_worker_id,
                max_worker_id
            );
        }

        if args.checkpoint_interval_ms == 0 {
            bail!("CHECKPOINT_INTERVAL_MS must be greater than 0");
        }

        if args.checkpoint_path.trim().is_empty() {
            bail!("CHECKPOINT_PATH must not be empty");
        }

        if args.worker_mode == WorkerMode::Etcd {
            if cfg!(not(feature = "etcd")) {
                bail!("WORKER_MODE=etcd requires building with the `etcd` feature");
            }
            if args.etcd_endpoints.iter().all(|e| e.trim().is_empty()) {
                bail!("ETCD_ENDPOINTS must name at least one endpoint");
            }
            if args.etcd_lease_ttl_secs == 0 {
                bail!("ETCD_LEASE_TTL_SECS must be greater than 0");
            }
            if args.coordinator_attempts == 0 {
                bail!("COORDINATOR_ATTEMPTS must be greater than 0");
            }
        }

        let initial_backoff = Duration::from_millis(args.coordinator_backoff_ms);

        Ok(Self {
            server_addr: args.server_addr,
            worker_mode: args.worker_mode,
            worker_id: args.worker_id,
            max_worker_id: args.max_worker_id,
            etcd_endpoints: args
                .etcd_endpoints
                .into_iter()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
            etcd_namespace: args.etcd_namespace,
            etcd_lease_ttl: Duration::from_secs(args.etcd_lease_ttl_secs),
            retry: RetryPolicy {
                attempts: args.coordinator_attempts,
                initial_backoff,
                max_backoff: initial_backoff.saturating_mul(10),
            },
            checkpoint_path: args.checkpoint_path,
            service: ServiceConfig {
                epoch: args.epoch_ms,
                flush_interval: Duration::from_millis(args.checkpoint_interval_ms),
            },
            log_format: args.log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> anyhow::Result<ServerConfig> {
        let args =
            CliArgs::try_parse_from(std::iter::once("flakeid-server").chain(extra.iter().copied()))?;
        ServerConfig::try_from(args)
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--server-addr",
            "127.0.0.1:9000",
            "--worker-id",
            "12",
            "--checkpoint-interval-ms",
            "250",
            "--coordinator-backoff-ms",
            "100",
            "--epoch-ms",
            "1000",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(config.server_addr, "127.0.0.1:9000");
        assert_eq!(config.worker_id, 12);
        assert_eq!(config.service.flush_interval, Duration::from_millis(250));
        assert_eq!(config.service.epoch, 1000);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(100));
        assert_eq!(config.retry.max_backoff, Duration::from_secs(1));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn endpoints_are_comma_separated() {
        let config = parse(&["--etcd-endpoints", "10.0.0.1:2379, 10.0.0.2:2379,"]).unwrap();
        assert_eq!(config.etcd_endpoints, vec!["10.0.0.1:2379", "10.0.0.2:2379"]);
    }

    #[test]
    fn rejects_out_of_range_worker_ids() {
        assert!(parse(&["--worker-id", "1024"]).is_err());
        assert!(parse(&["--max-worker-id", "1024"]).is_err());
        assert!(parse(&["--worker-id", "1023", "--max-worker-id", "1023"]).is_ok());
    }

    #[test]
    fn rejects_zero_checkpoint_interval() {
        let err = parse(&["--checkpoint-interval-ms", "0"]).unwrap_err();
        assert!(err.to_string().contains("CHECKPOINT_INTERVAL_MS"));
    }

    #[test]
    fn rejects_unknown_worker_mode() {
        assert!(parse(&["--worker-mode", "zookeeper"]).is_err());
    }

    #[cfg(not(feature = "etcd"))]
    #[test]
    fn etcd_mode_requires_the_feature() {
        let err = parse(&["--worker-mode", "etcd"]).unwrap_err();
        assert!(err.to_string().contains("etcd"));
    }

    #[cfg(feature = "etcd")]
    #[test]
    fn etcd_mode_validates_lease_ttl() {
        assert!(parse(&["--worker-mode", "etcd", "--etcd-lease-ttl-secs", "0"]).is_err());
        assert!(parse(&["--worker-mode", "etcd"]).is_ok());
    }
}
