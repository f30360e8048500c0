use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Process settings, read once from `HOTDESK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    /// WAL appends since the last compaction before the compactor rewrites it.
    pub compact_threshold: u64,
    pub sweep_interval: Duration,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable numbers fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let sweep_secs: u64 = parse_or(&lookup, "HOTDESK_SWEEP_INTERVAL_SECS", 60);
        Self {
            port: parse_or(&lookup, "HOTDESK_PORT", 5433),
            bind: lookup("HOTDESK_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            data_dir: lookup("HOTDESK_DATA_DIR")
                .unwrap_or_else(|| "./data".into())
                .into(),
            password: lookup("HOTDESK_PASSWORD").unwrap_or_else(|| "hotdesk".into()),
            max_connections: parse_or(&lookup, "HOTDESK_MAX_CONNECTIONS", 256),
            compact_threshold: parse_or(&lookup, "HOTDESK_COMPACT_THRESHOLD", 1000),
            sweep_interval: Duration::from_secs(sweep_secs.max(1)),
            metrics_port: lookup("HOTDESK_METRICS_PORT").and_then(|raw| parse_logged("HOTDESK_METRICS_PORT", &raw)),
            tls_cert: lookup("HOTDESK_TLS_CERT").map(PathBuf::from),
            tls_key: lookup("HOTDESK_TLS_KEY").map(PathBuf::from),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => parse_logged(key, &raw).unwrap_or_else(|| {
            warn!("{key}: using default {default}");
            default
        }),
        None => default,
    }
}

fn parse_logged<T>(key: &str, raw: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| warn!("invalid {key} value {raw:?}: {e}"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let c = config(&[]);
        assert_eq!(c.port, 5433);
        assert_eq!(c.listen_addr(), "0.0.0.0:5433");
        assert_eq!(c.data_dir, PathBuf::from("./data"));
        assert_eq!(c.password, "hotdesk");
        assert_eq!(c.max_connections, 256);
        assert_eq!(c.compact_threshold, 1000);
        assert_eq!(c.sweep_interval, Duration::from_secs(60));
        assert_eq!(c.metrics_port, None);
        assert_eq!(c.tls_cert, None);
    }

    #[test]
    fn reads_overrides() {
        let c = config(&[
            ("HOTDESK_PORT", "6000"),
            ("HOTDESK_BIND", "127.0.0.1"),
            ("HOTDESK_SWEEP_INTERVAL_SECS", "5"),
            ("HOTDESK_METRICS_PORT", "9100"),
            ("HOTDESK_TLS_CERT", "/etc/hotdesk/cert.pem"),
        ]);
        assert_eq!(c.listen_addr(), "127.0.0.1:6000");
        assert_eq!(c.sweep_interval, Duration::from_secs(5));
        assert_eq!(c.metrics_port, Some(9100));
        assert_eq!(c.tls_cert, Some(PathBuf::from("/etc/hotdesk/cert.pem")));
    }

    #[test]
    fn garbage_numbers_fall_back() {
        let c = config(&[
            ("HOTDESK_PORT", "not-a-port"),
            ("HOTDESK_MAX_CONNECTIONS", "-4"),
            ("HOTDESK_METRICS_PORT", "99999"),
        ]);
        assert_eq!(c.port, 5433);
        assert_eq!(c.max_connections, 256);
        assert_eq!(c.metrics_port, None);
    }

    #[test]
    fn zero_sweep_interval_is_clamped() {
        let c = config(&[("HOTDESK_SWEEP_INTERVAL_SECS", "0")]);
        assert_eq!(c.sweep_interval, Duration::from_secs(1));
    }
}
