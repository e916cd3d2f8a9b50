//! Global configuration parsing and validation.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// How the agent binary is launched for each session.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct AgentConfig {
    /// Agent binary (resolved through `PATH` when not absolute).
    pub program: String,
    /// Arguments appended after the fixed `app-server` argument set.
    pub extra_args: Vec<String>,
    /// Working directory for the child; inherits the server's when unset.
    pub working_dir: Option<PathBuf>,
    /// Additional environment variable names inherited by the child.
    pub env_passthrough: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: "codex".into(),
            extra_args: Vec::new(),
            working_dir: None,
            env_passthrough: Vec::new(),
        }
    }
}

/// Defaults carried by every `thread/start` request.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct ThreadConfig {
    /// Working directory the agent operates in.
    pub cwd: String,
    /// Approval policy requested for the thread.
    pub approval_policy: String,
    /// Sandbox mode requested for the thread.
    pub sandbox: String,
    /// Model used when the client payload does not name one.
    pub model: Option<String>,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            cwd: "/tmp".into(),
            approval_policy: "onRequest".into(),
            sandbox: "dangerFullAccess".into(),
            model: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_http_port() -> u16 {
    8081
}

fn default_heartbeat_seconds() -> u64 {
    15
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Interface the HTTP server binds to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port the HTTP server binds to.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Interval between keep-alive frames on an open stream.
    #[serde(default = "default_heartbeat_seconds")]
    pub heartbeat_seconds: u64,
    /// Agent process launch settings.
    #[serde(default)]
    pub agent: AgentConfig,
    /// Thread defaults forwarded to the agent.
    #[serde(default)]
    pub thread: ThreadConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            heartbeat_seconds: default_heartbeat_seconds(),
            agent: AgentConfig::default(),
            thread: ThreadConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Keep-alive interval as a [`Duration`].
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_seconds)
    }

    /// Socket address the HTTP server binds to.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `host` is not a valid IP address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.http_port)
            .parse()
            .map_err(|err| AppError::Config(format!("invalid bind address: {err}")))
    }

    /// Validate field invariants.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when a field is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_seconds == 0 {
            return Err(AppError::Config(
                "heartbeat_seconds must be greater than zero".into(),
            ));
        }

        if self.agent.program.trim().is_empty() {
            return Err(AppError::Config("agent.program must not be empty".into()));
        }

        Ok(())
    }
}
