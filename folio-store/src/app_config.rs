use folio_shared::Masked;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub payment: PaymentConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// No URL means the in-memory store
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: Masked<String>,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    pub base_url: String,
    pub server_key: Masked<String>,
    #[serde(default = "default_gateway_timeout_ms")]
    pub timeout_ms: u64,
    /// Use the in-process gateway instead of calling out
    #[serde(default)]
    pub mock: bool,
}

fn default_gateway_timeout_ms() -> u64 { 10_000 }

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BreakerConfig {
    pub min_requests: u32,
    pub failure_ratio: f64,
    pub interval_secs: u64,
    pub cool_down_secs: u64,
    pub half_open_max_requests: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            min_requests: 5,
            failure_ratio: 0.6,
            interval_secs: 30,
            cool_down_secs: 60,
            half_open_max_requests: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SettlementConfig {
    /// Applied when the caller supplies no deadline of its own
    pub deadline_ms: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self { deadline_ms: 5_000 }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `FOLIO__SERVER__PORT=9000` sets `server.port`
            .add_source(config::Environment::with_prefix("FOLIO").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_optional_sections() {
        let s = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [server]
                port = 8080

                [auth]
                jwt_secret = "hello_123"
                jwt_expiration_seconds = 86400

                [payment]
                base_url = "https://app.sandbox.midtrans.com/snap/v1"
                server_key = "SB-Mid-server-xyz"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let cfg: Config = s.try_deserialize().unwrap();
        assert!(cfg.database.url.is_none());
        assert_eq!(cfg.breaker.min_requests, 5);
        assert_eq!(cfg.breaker.half_open_max_requests, 3);
        assert_eq!(cfg.settlement.deadline_ms, 5_000);
        assert_eq!(cfg.payment.timeout_ms, 10_000);
        assert!(!format!("{:?}", cfg.auth).contains("hello_123"));
    }
}
