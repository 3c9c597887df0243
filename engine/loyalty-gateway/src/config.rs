//! Configuration for the LoyaltyGateway

use crate::error::{GatewayError, GatewayResult};
use clap::Parser;
use loyalty_service::LoyaltyServiceConfig;
use serde::{Deserialize, Serialize};

/// Command line for the gateway binary
///
/// Every flag falls back to its environment variable; a flag given on the
/// command line wins over the environment.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "loyalty-gateway")]
#[command(about = "REST API for the loyalty points ledger")]
pub struct Args {
    /// Address to serve the API on (host:port)
    #[arg(short = 'a', long = "address", env = "RUN_ADDRESS")]
    pub run_address: Option<String>,

    /// Postgres connection string
    #[arg(short = 'd', long = "database-uri", env = "DATABASE_URI")]
    pub database_uri: Option<String>,

    /// Address of the accrual service
    #[arg(short = 'r', long = "accrual-address", env = "ACCRUAL_SYSTEM_ADDRESS")]
    pub accrual_address: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOYALTY_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log format (pretty, json, compact)
    #[arg(long, env = "LOYALTY_LOG_FORMAT")]
    pub log_format: Option<String>,
}

/// Main configuration for the LoyaltyGateway
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Core service configuration
    pub service: LoyaltyServiceConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to, `host:port`
    pub address: String,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { address: "localhost:8080".to_string(), shutdown_timeout_secs: 10 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

impl GatewayConfig {
    /// Build the configuration: defaults, then environment, then command line
    pub fn load(args: &Args) -> GatewayResult<Self> {
        let mut config =
            Self { service: LoyaltyServiceConfig::from_env()?, ..Default::default() };

        if let Ok(timeout) = std::env::var("LOYALTY_SHUTDOWN_TIMEOUT_SECS") {
            config.server.shutdown_timeout_secs = timeout.parse().map_err(|_| {
                GatewayError::Config(format!("Invalid LOYALTY_SHUTDOWN_TIMEOUT_SECS: {}", timeout))
            })?;
        }

        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Override fields with whatever the command line carries
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(address) = &args.run_address {
            self.server.address = address.clone();
        }
        if let Some(uri) = &args.database_uri {
            self.service.database.url = uri.clone();
        }
        if let Some(address) = &args.accrual_address {
            self.service.accrual.address = address.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if let Some(format) = &args.log_format {
            self.logging.format = format.clone();
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> GatewayResult<()> {
        let port_ok = match self.server.address.rsplit_once(':') {
            Some((_, port)) => port.parse::<u16>().is_ok(),
            None => false,
        };
        if !port_ok {
            return Err(GatewayError::Config(format!(
                "Invalid server address: {}",
                self.server.address
            )));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(GatewayError::Config(format!("Invalid log level: {}", self.logging.level))),
        }

        match self.logging.format.as_str() {
            "json" | "pretty" | "compact" => {}
            _ => {
                return Err(GatewayError::Config(format!(
                    "Invalid log format: {}",
                    self.logging.format
                )))
            }
        }

        self.service.validate()?;
        Ok(())
    }

    /// Address to bind, with an empty host meaning every interface
    pub fn bind_address(&self) -> String {
        match self.server.address.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{}", port),
            None => self.server.address.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(GatewayConfig::default().validate().is_ok());
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::try_parse_from([
            "loyalty-gateway",
            "-a",
            "0.0.0.0:9000",
            "-d",
            "postgres://loyalty@db/loyalty",
            "-r",
            "accrual:8081",
        ])
        .unwrap();

        let mut config = GatewayConfig::default();
        config.apply_args(&args);

        assert_eq!(config.server.address, "0.0.0.0:9000");
        assert_eq!(config.service.database.url, "postgres://loyalty@db/loyalty");
        assert_eq!(config.service.accrual.base_url(), "http://accrual:8081");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_port_only_address_binds_all_interfaces() {
        let mut config = GatewayConfig::default();
        config.server.address = ":8080".to_string();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = GatewayConfig::default();
        config.server.address = "localhost".to_string();
        assert!(matches!(config.validate(), Err(GatewayError::Config(_))));

        let mut config = GatewayConfig::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(config.validate(), Err(GatewayError::Config(_))));

        let mut config = GatewayConfig::default();
        config.service.accrual.address.clear();
        assert!(matches!(config.validate(), Err(GatewayError::Service(_))));
    }
}
