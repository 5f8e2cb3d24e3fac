//! Startup configuration: serial device path, metrics listen address,
//! B-route credentials, and the poll interval. Credentials fall back to
//! environment variables so they need not appear on the command line.

use clap::Parser;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// ECHONET Lite LAN controller / Wi-SUN smart meter exporter.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about)]
pub struct Config {
    /// Serial device the BP35C2 module is attached to.
    #[arg(long, env = "ECHONET_SERIAL_DEVICE", default_value = "/dev/ttyUSB0")]
    pub serial_device: String,

    /// Address the Prometheus `/metrics` endpoint listens on.
    #[arg(long, env = "ECHONET_METRICS_ADDR", default_value = "0.0.0.0:9327")]
    pub metrics_addr: String,

    /// B-route id issued by the power company.
    #[arg(long, env = "ECHONET_BROUTE_ID", default_value = "")]
    pub broute_id: String,

    /// B-route password issued by the power company.
    #[arg(long, env = "ECHONET_BROUTE_PASSWORD", default_value = "")]
    pub broute_password: String,

    /// Directory of class dictionary CSV files.
    #[arg(long, env = "ECHONET_CLASS_DB_DIR", default_value = "./class-db")]
    pub class_db_dir: String,

    /// Seconds between instantaneous-power polls.
    #[arg(long, env = "ECHONET_UPDATE_INTERVAL_SECS", default_value_t = 10)]
    pub update_interval_secs: u64,
}

impl Config {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    /// Fails before any serial I/O is attempted if credentials are
    /// missing, per the configuration invariant.
    pub fn validate_broute_credentials(&self) -> Result<()> {
        if self.broute_id.is_empty() || self.broute_password.is_empty() {
            return Err(ProtocolError::EmptyCredentials.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_credentials_fail_validation() {
        let cfg = Config {
            serial_device: "/dev/ttyUSB0".into(),
            metrics_addr: "0.0.0.0:9327".into(),
            broute_id: "".into(),
            broute_password: "".into(),
            class_db_dir: "./class-db".into(),
            update_interval_secs: 10,
        };
        assert!(cfg.validate_broute_credentials().is_err());
    }

    #[test]
    fn present_credentials_pass_validation() {
        let cfg = Config {
            serial_device: "/dev/ttyUSB0".into(),
            metrics_addr: "0.0.0.0:9327".into(),
            broute_id: "00112233445566778899AABBCCDDEEFF".into(),
            broute_password: "hunter2hunter2".into(),
            class_db_dir: "./class-db".into(),
            update_interval_secs: 10,
        };
        assert!(cfg.validate_broute_credentials().is_ok());
    }
}
