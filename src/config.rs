use std::path::PathBuf;
use std::str::FromStr;

/// Process configuration, read from `EVENTDESK_*` environment variables.
///
/// A `.env` file in the working directory is loaded first when present.
/// Unparseable numbers fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    /// Defaults to `<data_dir>/form_content.json`.
    pub form_content: PathBuf,
    pub admin_password: String,
    pub public_password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
}

fn num<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|s| s.trim().parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("loaded {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(&format!("EVENTDESK_{name}"));

        let data_dir = PathBuf::from(var("DATA_DIR").unwrap_or_else(|| "./data".into()));
        let form_content = var("FORM_CONTENT")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("form_content.json"));

        Config {
            port: num(var("PORT")).unwrap_or(5433),
            bind: var("BIND").unwrap_or_else(|| "0.0.0.0".into()),
            data_dir,
            form_content,
            admin_password: var("ADMIN_PASSWORD").unwrap_or_else(|| "admin".into()),
            public_password: var("PUBLIC_PASSWORD").unwrap_or_else(|| "eventdesk".into()),
            max_connections: num(var("MAX_CONNECTIONS")).unwrap_or(256),
            compact_threshold: num(var("COMPACT_THRESHOLD")).unwrap_or(1000),
            metrics_port: num(var("METRICS_PORT")),
            tls_cert: var("TLS_CERT"),
            tls_key: var("TLS_KEY"),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
