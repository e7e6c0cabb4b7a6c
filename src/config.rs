use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Deserialize;

/// Largest payload a UDP datagram can carry over IPv4.
const MAX_UDP_PAYLOAD: usize = 65_507;

/// Top-level configuration for the slicerd daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// UDP address to receive samples on. ":port" binds all interfaces.
    /// Default: ":6850".
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Directory holding the round-robin database files. Relative paths are
    /// resolved against the working directory. Default: "data".
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Path to the rrdtool binary. Default: "/usr/bin/rrdtool".
    #[serde(default = "default_rrdtool")]
    pub rrdtool: PathBuf,

    /// Logging verbosity (trace, debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Length of one aggregation window; also the database step. Default: 10s.
    #[serde(default = "default_slice_interval", with = "humantime_serde")]
    pub slice_interval: Duration,

    /// How often closed windows are rolled up and written. Default: 60s.
    #[serde(default = "default_write_interval", with = "humantime_serde")]
    pub write_interval: Duration,

    /// Reverse-resolve sample sources to host names. Default: true.
    #[serde(default = "default_true")]
    pub resolve_hosts: bool,

    /// Samples buffered between the socket and the slice store; newer
    /// samples are dropped when full. Default: 65536.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Receive buffer size; longer datagrams are truncated. Default: 256.
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,

    /// Closed-window backlog that triggers a warning. Default: 64.
    #[serde(default = "default_max_pending_windows")]
    pub max_pending_windows: usize,

    /// How often ingest counters are logged. Default: 60s.
    #[serde(default = "default_stats_interval", with = "humantime_serde")]
    pub stats_interval: Duration,
}

/// Command-line overrides applied on top of the file configuration.
#[derive(Debug, Default, Clone, Args)]
pub struct Overrides {
    /// Set the port (+optional address) to listen at.
    #[arg(long)]
    pub listen: Option<String>,

    /// Set the data directory.
    #[arg(long = "data")]
    pub data_dir: Option<PathBuf>,

    /// Set the rrdtool absolute path.
    #[arg(long)]
    pub rrdtool: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Set the slice interval in seconds.
    #[arg(long = "slice")]
    pub slice_secs: Option<u64>,

    /// Set the write interval in seconds.
    #[arg(long = "write")]
    pub write_secs: Option<u64>,
}

// --- Default value functions ---

fn default_listen() -> String {
    ":6850".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_rrdtool() -> PathBuf {
    PathBuf::from("/usr/bin/rrdtool")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_slice_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_write_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_true() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    65536
}

fn default_max_datagram_size() -> usize {
    256
}

fn default_max_pending_windows() -> usize {
    64
}

fn default_stats_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            data_dir: default_data_dir(),
            rrdtool: default_rrdtool(),
            log_level: default_log_level(),
            slice_interval: default_slice_interval(),
            write_interval: default_write_interval(),
            resolve_hosts: true,
            queue_capacity: default_queue_capacity(),
            max_datagram_size: default_max_datagram_size(),
            max_pending_windows: default_max_pending_windows(),
            stats_interval: default_stats_interval(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        Ok(cfg)
    }

    /// Applies command-line overrides in place.
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(listen) = &overrides.listen {
            self.listen.clone_from(listen);
        }
        if let Some(data_dir) = &overrides.data_dir {
            self.data_dir.clone_from(data_dir);
        }
        if let Some(rrdtool) = &overrides.rrdtool {
            self.rrdtool.clone_from(rrdtool);
        }
        if let Some(log_level) = &overrides.log_level {
            self.log_level.clone_from(log_level);
        }
        if let Some(secs) = overrides.slice_secs {
            self.slice_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = overrides.write_secs {
            self.write_interval = Duration::from_secs(secs);
        }
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.listen.is_empty() {
            bail!("listen address is required");
        }

        if self.rrdtool.as_os_str().is_empty() {
            bail!("rrdtool path is required");
        }

        if self.slice_interval.as_secs() == 0 {
            bail!("slice_interval must be at least 1s");
        }
        if self.slice_interval.subsec_nanos() != 0 {
            bail!(
                "slice_interval {:?} must be a whole number of seconds",
                self.slice_interval
            );
        }

        if self.write_interval.is_zero() {
            bail!("write_interval must be positive");
        }

        if self.stats_interval.is_zero() {
            bail!("stats_interval must be positive");
        }

        if self.queue_capacity == 0 {
            bail!("queue_capacity must be positive");
        }

        if self.max_datagram_size == 0 || self.max_datagram_size > MAX_UDP_PAYLOAD {
            bail!(
                "max_datagram_size must be between 1 and {MAX_UDP_PAYLOAD}, got {}",
                self.max_datagram_size
            );
        }

        Ok(())
    }

    /// Returns the listen address in a form accepted by the socket API,
    /// expanding the ":port" shorthand to all interfaces.
    pub fn bind_addr(&self) -> String {
        if self.listen.starts_with(':') {
            format!("0.0.0.0{}", self.listen)
        } else {
            self.listen.clone()
        }
    }

    /// Returns the data directory as an absolute path.
    pub fn data_dir_absolute(&self) -> Result<PathBuf> {
        if self.data_dir.is_absolute() {
            return Ok(self.data_dir.clone());
        }
        let cwd = std::env::current_dir().context("resolving working directory")?;
        Ok(cwd.join(&self.data_dir))
    }

    /// Slice interval in whole seconds.
    pub fn slice_secs(&self) -> u64 {
        self.slice_interval.as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.listen, ":6850");
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
        assert_eq!(cfg.rrdtool, PathBuf::from("/usr/bin/rrdtool"));
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.slice_interval, Duration::from_secs(10));
        assert_eq!(cfg.write_interval, Duration::from_secs(60));
        assert!(cfg.resolve_hosts);
        assert_eq!(cfg.queue_capacity, 65536);
        assert_eq!(cfg.max_datagram_size, 256);
        cfg.validate().expect("defaults are valid");
    }

    #[test]
    fn test_parse_yaml_with_durations() {
        let cfg: Config = serde_yaml::from_str(
            "listen: 127.0.0.1:9000\n\
             slice_interval: 30s\n\
             write_interval: 5m\n\
             resolve_hosts: false\n",
        )
        .expect("valid yaml");

        assert_eq!(cfg.listen, "127.0.0.1:9000");
        assert_eq!(cfg.slice_interval, Duration::from_secs(30));
        assert_eq!(cfg.write_interval, Duration::from_secs(300));
        assert!(!cfg.resolve_hosts);
        // Unset fields keep their defaults.
        assert_eq!(cfg.queue_capacity, 65536);
    }

    #[test]
    fn test_overrides_win_over_file_values() {
        let mut cfg = Config {
            listen: "127.0.0.1:1".to_string(),
            ..Default::default()
        };
        cfg.apply(&Overrides {
            listen: Some(":7000".to_string()),
            slice_secs: Some(5),
            write_secs: Some(20),
            ..Default::default()
        });

        assert_eq!(cfg.listen, ":7000");
        assert_eq!(cfg.slice_interval, Duration::from_secs(5));
        assert_eq!(cfg.write_interval, Duration::from_secs(20));
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_bind_addr_expands_port_shorthand() {
        let cfg = Config::default();
        assert_eq!(cfg.bind_addr(), "0.0.0.0:6850");

        let cfg = Config {
            listen: "[::1]:6850".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.bind_addr(), "[::1]:6850");
    }

    #[test]
    fn test_validation_zero_slice_interval() {
        let cfg = Config {
            slice_interval: Duration::ZERO,
            ..Default::default()
        };
        let err = cfg.validate().expect_err("should fail");
        assert!(err.to_string().contains("slice_interval"));
    }

    #[test]
    fn test_validation_fractional_slice_interval() {
        let cfg = Config {
            slice_interval: Duration::from_millis(1500),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validation_zero_write_interval() {
        let cfg = Config {
            write_interval: Duration::ZERO,
            ..Default::default()
        };
        let err = cfg.validate().expect_err("should fail");
        assert!(err.to_string().contains("write_interval"));
    }

    #[test]
    fn test_validation_queue_capacity_zero() {
        let cfg = Config {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validation_datagram_size_bounds() {
        for size in [0, MAX_UDP_PAYLOAD + 1] {
            let cfg = Config {
                max_datagram_size: size,
                ..Default::default()
            };
            assert!(cfg.validate().is_err(), "size {size} should be rejected");
        }
    }

    #[test]
    fn test_validation_empty_rrdtool() {
        let cfg = Config {
            rrdtool: PathBuf::new(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_data_dir_absolute_keeps_absolute_paths() {
        let cfg = Config {
            data_dir: PathBuf::from("/var/lib/slicerd"),
            ..Default::default()
        };
        assert_eq!(
            cfg.data_dir_absolute().expect("absolute"),
            PathBuf::from("/var/lib/slicerd")
        );

        let relative = Config::default().data_dir_absolute().expect("resolved");
        assert!(relative.is_absolute());
        assert!(relative.ends_with("data"));
    }
}
