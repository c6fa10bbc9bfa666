// crates/server/src/config.rs
//! Command-line and environment configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use jobtrail_core::paths::default_jobs_root;
use jobtrail_core::JobOptions;

/// Default port for the server.
pub const DEFAULT_PORT: u16 = 47893;

#[derive(Debug, Clone, Parser)]
#[command(name = "jobtrail", version, about = "File-backed streaming job server")]
pub struct ServerConfig {
    /// Port to listen on.
    #[arg(long, env = "JOBTRAIL_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind.
    #[arg(long, env = "JOBTRAIL_HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Job store root. Defaults to `<data dir>/jobtrail/jobs`.
    #[arg(long, env = "JOBTRAIL_JOBS_DIR")]
    pub jobs_dir: Option<PathBuf>,

    /// Log blocks buffered per job before a flush.
    #[arg(long, env = "JOBTRAIL_LOG_BUFFER_SIZE", default_value_t = 10)]
    pub log_buffer_size: usize,

    /// Sentinel poll interval while a job is paused.
    #[arg(long, env = "JOBTRAIL_POLL_INTERVAL_MS", default_value_t = 150)]
    pub poll_interval_ms: u64,

    /// Job id allocation attempts before giving up.
    #[arg(long, env = "JOBTRAIL_MAX_CREATE_ATTEMPTS", default_value_t = 5)]
    pub max_create_attempts: usize,

    /// Also write daily-rotated log files here.
    #[arg(long, env = "JOBTRAIL_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn jobs_root(&self) -> anyhow::Result<PathBuf> {
        self.jobs_dir
            .clone()
            .or_else(default_jobs_root)
            .ok_or_else(|| anyhow::anyhow!("Could not determine a data directory; pass --jobs-dir"))
    }

    pub fn job_options(&self) -> JobOptions {
        JobOptions {
            buffer_size: self.log_buffer_size,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_create_attempts: self.max_create_attempts,
            ..JobOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::try_parse_from(["jobtrail"]).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.addr().to_string(), format!("127.0.0.1:{DEFAULT_PORT}"));
        let options = config.job_options();
        assert_eq!(options.buffer_size, 10);
        assert_eq!(options.poll_interval, Duration::from_millis(150));
        assert_eq!(options.max_create_attempts, 5);
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = ServerConfig::try_parse_from([
            "jobtrail",
            "--port",
            "9000",
            "--jobs-dir",
            "/srv/jobs",
            "--log-buffer-size",
            "1",
            "--poll-interval-ms",
            "20",
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.jobs_root().unwrap(), PathBuf::from("/srv/jobs"));
        assert_eq!(config.job_options().buffer_size, 1);
        assert_eq!(config.job_options().poll_interval, Duration::from_millis(20));
    }
}
