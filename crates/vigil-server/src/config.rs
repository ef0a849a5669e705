//! Server Configuration
//!
//! Configuration of the automation server with a builder pattern for
//! ergonomic construction.
//!
//! # Examples
//!
//! ```rust
//! use vigil_server::ServerConfig;
//! use vigil_plugin::Version;
//!
//! let config = ServerConfig::builder()
//!     .host_name("my analytics box")
//!     .host_version(Version::new(2, 1, 0))
//!     .janitor_poll_ms(100)
//!     .build();
//! ```

use vigil_plugin::Version;

/// Configuration of an [`AutomationServer`](crate::AutomationServer)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Name reported to scripts via `host_name()` (default: "vigil automation server")
    pub host_name: String,

    /// Version reported to scripts via `host_version()` (default: 1.0.1)
    pub host_version: Version,

    /// Janitor poll interval in milliseconds (default: 200)
    ///
    /// How often finalized workers are checked for reaping. Lower values
    /// reclaim resources faster at the cost of more wake-ups.
    pub janitor_poll_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host_name: "vigil automation server".to_string(),
            host_version: Version::new(1, 0, 1),
            janitor_poll_ms: 200,
        }
    }
}

impl ServerConfig {
    /// Create a configuration builder
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.host_name.is_empty() {
            issues.push("host_name cannot be empty".to_string());
        }
        if self.janitor_poll_ms < 10 {
            issues.push("janitor_poll_ms should be at least 10ms".to_string());
        }
        if self.janitor_poll_ms > 60_000 {
            issues.push("janitor_poll_ms should not exceed 60s".to_string());
        }

        if issues.is_empty() { Ok(()) } else { Err(issues) }
    }
}

/// Builder for [`ServerConfig`]
#[derive(Debug, Clone, Default)]
pub struct ServerConfigBuilder {
    host_name: Option<String>,
    host_version: Option<Version>,
    janitor_poll_ms: Option<u64>,
}

impl ServerConfigBuilder {
    /// Set the host name reported to scripts
    #[must_use]
    pub fn host_name(mut self, name: impl Into<String>) -> Self {
        self.host_name = Some(name.into());
        self
    }

    /// Set the host version reported to scripts
    #[must_use]
    pub fn host_version(mut self, version: Version) -> Self {
        self.host_version = Some(version);
        self
    }

    /// Set the janitor poll interval in milliseconds
    #[must_use]
    pub fn janitor_poll_ms(mut self, millis: u64) -> Self {
        self.janitor_poll_ms = Some(millis);
        self
    }

    /// Build the configuration, filling unset fields with defaults
    #[must_use]
    pub fn build(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            host_name: self.host_name.unwrap_or(defaults.host_name),
            host_version: self.host_version.unwrap_or(defaults.host_version),
            janitor_poll_ms: self.janitor_poll_ms.unwrap_or(defaults.janitor_poll_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::builder()
            .host_name("probe")
            .host_version(Version::new(3, 0, 0))
            .janitor_poll_ms(50)
            .build();

        assert_eq!(config.host_name, "probe");
        assert_eq!(config.host_version, Version::new(3, 0, 0));
        assert_eq!(config.janitor_poll_ms, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_catches_issues() {
        let config = ServerConfig {
            host_name: String::new(),
            janitor_poll_ms: 1,
            ..Default::default()
        };
        let issues = config.validate().unwrap_err();
        assert_eq!(issues.len(), 2);
    }
}
