use guestpass::{StoreConfig, DEFAULT_DATABASE_URL};
use std::path::PathBuf;
use std::time::Duration;

pub const SESSION_COOKIE: &str = "guestpass_session";

#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreConfig,
    /// Shared operator credential
    pub operator_password: String,
    /// Where issued QR images are written and served from
    pub qr_output_dir: PathBuf,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
    pub max_body_bytes: usize,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("store", &self.store)
            .field("operator_password", &"<redacted>")
            .field("qr_output_dir", &self.qr_output_dir)
            .field("rate_limit_per_second", &self.rate_limit_per_second)
            .field("rate_limit_burst", &self.rate_limit_burst)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_env("PORT").unwrap_or(5000);

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        let store = StoreConfig::new(&database_url)
            .with_max_connections(parse_env("DB_MAX_CONNECTIONS").unwrap_or(8))
            .with_busy_timeout(Duration::from_secs(
                parse_env("DB_BUSY_TIMEOUT_SECS").unwrap_or(5),
            ));

        let operator_password = std::env::var("OPERATOR_PASSWORD")
            .map_err(|_| anyhow::anyhow!("OPERATOR_PASSWORD must be set"))?;
        if operator_password.is_empty() {
            anyhow::bail!("OPERATOR_PASSWORD must not be empty");
        }

        let qr_output_dir = std::env::var("QR_OUTPUT_DIR").unwrap_or_else(|_| "static".to_string());
        let qr_output_dir = PathBuf::from(shellexpand::tilde(&qr_output_dir).to_string());

        let rate_limit_per_second = parse_env("RATE_LIMIT_PER_SECOND").unwrap_or(10);
        let rate_limit_burst = parse_env("RATE_LIMIT_BURST").unwrap_or(20);
        let max_body_bytes = parse_env("MAX_BODY_BYTES").unwrap_or(16 * 1024);

        Ok(Self {
            host,
            port,
            store,
            operator_password,
            qr_output_dir,
            rate_limit_per_second,
            rate_limit_burst,
            max_body_bytes,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
pub(crate) fn test_config(qr_output_dir: PathBuf) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        store: StoreConfig::in_memory(),
        operator_password: "door-secret".to_string(),
        qr_output_dir,
        rate_limit_per_second: 10,
        rate_limit_burst: 20,
        max_body_bytes: 16 * 1024,
    }
}
