use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::filter::LevelFilter;

use crate::error::{LiftClubError, Result};

/// Service configuration.
///
/// Layered as defaults, then an optional JSON file, then environment
/// variables, then CLI flags (applied by the binary).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub bind_address: String,
    pub http_port: u16,

    /// Directory holding the state snapshot
    pub state_path: String,

    /// Bearer token required on admin routes
    pub admin_token: String,

    /// Seconds between periodic snapshots
    pub snapshot_interval_secs: u64,

    /// trace, debug, info, warn, error or off
    pub log_level: String,

    /// Recent log entries kept for the admin panel
    pub log_buffer_size: usize,

    /// Serve HTTPS when both are set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_cert_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_key_path: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 8080,
            state_path: "state".to_string(),
            admin_token: String::new(),
            snapshot_interval_secs: 60,
            log_level: "info".to_string(),
            log_buffer_size: 1000,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl ServiceConfig {
    /// Load from a JSON file
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| LiftClubError::ConfigLoad {
            path: path.to_string(),
            source: e,
        })?;

        serde_json::from_str(&content).map_err(|e| LiftClubError::ConfigParse {
            path: path.to_string(),
            source: e,
        })
    }

    /// Defaults, or the given file, with environment overrides on top
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from environment-style lookups
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("BIND_ADDRESS") {
            self.bind_address = v;
        }
        if let Some(v) = lookup("HTTP_PORT") {
            self.http_port = parse_env("HTTP_PORT", &v)?;
        }
        if let Some(v) = lookup("STATE_PATH") {
            self.state_path = v;
        }
        if let Some(v) = lookup("ADMIN_TOKEN") {
            self.admin_token = v;
        }
        if let Some(v) = lookup("SNAPSHOT_INTERVAL_SECS") {
            self.snapshot_interval_secs = parse_env("SNAPSHOT_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = lookup("TLS_CERT_PATH") {
            self.tls_cert_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("TLS_KEY_PATH") {
            self.tls_key_path = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Check the config is usable
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.http_port == 0 {
            problems.push("http_port must not be 0".to_string());
        }
        if IpAddr::from_str(&self.bind_address).is_err() {
            problems.push(format!("bind_address '{}' is not an IP address", self.bind_address));
        }
        if self.admin_token.trim().is_empty() {
            problems.push("admin_token must be set (ADMIN_TOKEN)".to_string());
        }
        if self.snapshot_interval_secs == 0 {
            problems.push("snapshot_interval_secs must be positive".to_string());
        }
        if self.log_buffer_size == 0 {
            problems.push("log_buffer_size must be positive".to_string());
        }
        if LevelFilter::from_str(&self.log_level).is_err() {
            problems.push(format!("log_level '{}' is not a level", self.log_level));
        }
        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            problems.push("tls_cert_path and tls_key_path must be set together".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(LiftClubError::ConfigValidation {
                message: problems.join("; "),
            })
        }
    }

    pub fn level_filter(&self) -> LevelFilter {
        LevelFilter::from_str(&self.log_level).unwrap_or(LevelFilter::INFO)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip = IpAddr::from_str(&self.bind_address).map_err(|_| {
            LiftClubError::ConfigValidation {
                message: format!("bind_address '{}' is not an IP address", self.bind_address),
            }
        })?;
        Ok(SocketAddr::new(ip, self.http_port))
    }

    pub fn snapshot_file(&self) -> PathBuf {
        PathBuf::from(&self.state_path).join("snapshot.json")
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls_cert_path.is_some() && self.tls_key_path.is_some()
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| LiftClubError::ConfigValidation {
            message: format!("{} has invalid value '{}'", key, value),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid() -> ServiceConfig {
        ServiceConfig {
            admin_token: "secret".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_partial_file() {
        let json = r#"{
            "http_port": 9000,
            "admin_token": "from-file"
        }"#;

        let config: ServiceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.admin_token, "from-file");
        assert_eq!(config.snapshot_interval_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: std::result::Result<ServiceConfig, _> =
            serde_json::from_str(r#"{ "port": 9000 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("HTTP_PORT", "3000"),
            ("ADMIN_TOKEN", "env-token"),
            ("LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = ServiceConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.http_port, 3000);
        assert_eq!(config.admin_token, "env-token");
        assert_eq!(config.level_filter(), LevelFilter::DEBUG);
    }

    #[test]
    fn test_bad_env_number() {
        let mut config = ServiceConfig::default();
        let err = config
            .apply_env(|key| (key == "HTTP_PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(err, LiftClubError::ConfigValidation { .. }));
    }

    #[test]
    fn test_validate_collects_problems() {
        let config = ServiceConfig {
            http_port: 0,
            snapshot_interval_secs: 0,
            tls_cert_path: Some(PathBuf::from("cert.pem")),
            ..Default::default()
        };

        match config.validate() {
            Err(LiftClubError::ConfigValidation { message }) => {
                assert!(message.contains("http_port"));
                assert!(message.contains("admin_token"));
                assert!(message.contains("snapshot_interval_secs"));
                assert!(message.contains("tls_key_path"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_missing_file() {
        let err = ServiceConfig::load_from_file("/nonexistent/liftclub.json").unwrap_err();
        assert!(matches!(err, LiftClubError::ConfigLoad { .. }));
    }

    #[test]
    fn test_paths() {
        let config = valid();
        assert_eq!(config.snapshot_file(), PathBuf::from("state/snapshot.json"));
        assert_eq!(config.socket_addr().unwrap().port(), 8080);
        assert!(!config.tls_enabled());
    }
}
