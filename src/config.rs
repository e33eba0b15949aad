//! Harness configuration
//!
//! Defaults mirror the local forward-sink setup; every knob can be
//! overridden through `HARNESS_*` environment variables so CI can move ports
//! or timeouts without a rebuild.

use serde_json::{json, Value};
use std::time::Duration;

/// Environment variables the process-under-test reads at launch.
///
/// These four names are the externally observable contract between the
/// harness and the forwarder's own configuration file.
pub const ENV_FORWARD_URL: &str = "FORWARD_URL";
pub const ENV_FORWARD_AUTH_TOKEN: &str = "FORWARD_AUTH_TOKEN";
pub const ENV_WORKSPACE_URL: &str = "DATABRICKS_WORKSPACE_URL";
pub const ENV_TABLE_NAME: &str = "DATABRICKS_TABLE_NAME";

/// Full configuration for one harness run
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Executable to launch (name resolved on PATH, or an explicit path)
    pub executable: String,
    /// Arguments passed to the executable
    pub args: Vec<String>,
    /// Extra environment variables merged into the child's environment,
    /// on top of the four contract variables
    pub extra_env: Vec<(String, String)>,

    /// Loopback address everything binds to
    pub bind_addr: String,
    /// Ingress port of the process-under-test
    pub ingress_port: u16,
    /// Health/API port of the process-under-test
    pub api_port: u16,
    /// Port the mock collector listens on
    pub collector_port: u16,

    /// Bearer token the forwarder must attach downstream
    pub auth_token: String,
    /// Workspace URL identifier the forwarder must attach downstream
    pub workspace_url: String,
    /// Table name identifier the forwarder must attach downstream
    pub table_name: String,

    /// The single stimulus event
    pub payload: Value,

    /// Deadline for the health endpoint to return 200
    pub health_timeout: Duration,
    /// Interval between health polls
    pub health_poll_interval: Duration,
    /// Deadline for the forwarded request to reach the collector
    pub capture_timeout: Duration,
    /// Pause after the first capture so trailing requests can land
    pub settle_delay: Duration,
    /// Grace period between SIGTERM and SIGKILL at teardown
    pub grace_period: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            executable: "vector".to_string(),
            args: vec!["--config".to_string(), "vector_local.yaml".to_string()],
            extra_env: Vec::new(),
            bind_addr: "127.0.0.1".to_string(),
            ingress_port: 8080,
            api_port: 8686,
            collector_port: 9090,
            auth_token: "test-token".to_string(),
            workspace_url: "https://test-workspace.databricks.com".to_string(),
            table_name: "catalog.schema.test_table".to_string(),
            payload: json!({"event": "test", "number": 42, "nested": {"a": 1}}),
            health_timeout: Duration::from_secs(15),
            health_poll_interval: Duration::from_millis(300),
            capture_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_millis(500),
            grace_period: Duration::from_secs(5),
        }
    }
}

impl HarnessConfig {
    /// Build a config from defaults plus `HARNESS_*` environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("HARNESS_EXECUTABLE") {
            config.executable = v;
        }
        if let Ok(v) = std::env::var("HARNESS_BIND_ADDR") {
            config.bind_addr = v;
        }
        if let Ok(v) = std::env::var("HARNESS_INGRESS_PORT") {
            if let Ok(port) = v.parse() {
                config.ingress_port = port;
            }
        }
        if let Ok(v) = std::env::var("HARNESS_API_PORT") {
            if let Ok(port) = v.parse() {
                config.api_port = port;
            }
        }
        if let Ok(v) = std::env::var("HARNESS_COLLECTOR_PORT") {
            if let Ok(port) = v.parse() {
                config.collector_port = port;
            }
        }
        if let Ok(v) = std::env::var("HARNESS_AUTH_TOKEN") {
            config.auth_token = v;
        }
        if let Ok(v) = std::env::var("HARNESS_WORKSPACE_URL") {
            config.workspace_url = v;
        }
        if let Ok(v) = std::env::var("HARNESS_TABLE_NAME") {
            config.table_name = v;
        }
        if let Ok(v) = std::env::var("HARNESS_CAPTURE_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse() {
                config.capture_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = std::env::var("HARNESS_HEALTH_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse() {
                config.health_timeout = Duration::from_secs(secs);
            }
        }

        config
    }

    /// Ingress URL the stimulus is POSTed to
    pub fn ingress_url(&self) -> String {
        format!("http://{}:{}", self.bind_addr, self.ingress_port)
    }

    /// Health URL polled during startup
    pub fn health_url(&self) -> String {
        format!("http://{}:{}/health", self.bind_addr, self.api_port)
    }

    /// Forward target handed to the child via `FORWARD_URL`
    pub fn forward_url(&self) -> String {
        format!("http://{}:{}", self.bind_addr, self.collector_port)
    }

    /// The environment injected into the process-under-test at launch
    pub fn env_overrides(&self) -> Vec<(String, String)> {
        let mut env = vec![
            (ENV_FORWARD_URL.to_string(), self.forward_url()),
            (ENV_FORWARD_AUTH_TOKEN.to_string(), self.auth_token.clone()),
            (ENV_WORKSPACE_URL.to_string(), self.workspace_url.clone()),
            (ENV_TABLE_NAME.to_string(), self.table_name.clone()),
        ];
        env.extend(self.extra_env.iter().cloned());
        env
    }

    /// Expectation set derived from this configuration
    pub fn expectation(&self) -> crate::Expectation {
        crate::Expectation {
            payload: self.payload.clone(),
            auth_token: self.auth_token.clone(),
            workspace_url: self.workspace_url.clone(),
            table_name: self.table_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_urls() {
        let config = HarnessConfig::default();
        assert_eq!(config.ingress_url(), "http://127.0.0.1:8080");
        assert_eq!(config.health_url(), "http://127.0.0.1:8686/health");
        assert_eq!(config.forward_url(), "http://127.0.0.1:9090");
    }

    #[test]
    fn test_env_overrides_carry_contract_vars() {
        let mut config = HarnessConfig::default();
        config.extra_env = vec![("EXTRA".to_string(), "1".to_string())];

        let env = config.env_overrides();
        let names: Vec<&str> = env.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            vec![
                ENV_FORWARD_URL,
                ENV_FORWARD_AUTH_TOKEN,
                ENV_WORKSPACE_URL,
                ENV_TABLE_NAME,
                "EXTRA",
            ]
        );
        assert_eq!(env[0].1, "http://127.0.0.1:9090");
        assert_eq!(env[1].1, "test-token");
    }

    #[test]
    fn test_default_payload_shape() {
        let config = HarnessConfig::default();
        assert_eq!(config.payload["event"], "test");
        assert_eq!(config.payload["number"], 42);
        assert_eq!(config.payload["nested"]["a"], 1);
    }
}
