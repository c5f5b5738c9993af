use crate::mailer::{DEFAULT_SMTP_HOST, DEFAULT_SMTP_PORT};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

pub const DEFAULT_LICENSE_KEYS: [&str; 3] = ["INN123", "XYZ123", "MNO123"];

/// Runtime settings. Defaults match a local single-user install; every
/// field can be overridden through a `SHEETMAIL_*` environment variable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub license_file: PathBuf,
    pub license_keys: Vec<String>,
    /// Rows per page in the preview grid.
    pub page_size: usize,
    /// Idle time after which a browser session and its upload are dropped.
    pub session_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "0.0.0.0".to_string(),
            port: 10000,
            smtp_host: DEFAULT_SMTP_HOST.to_string(),
            smtp_port: DEFAULT_SMTP_PORT,
            license_file: PathBuf::from("license.txt"),
            license_keys: DEFAULT_LICENSE_KEYS.iter().map(|k| k.to_string()).collect(),
            page_size: 10,
            session_ttl_secs: 4 * 60 * 60,
        }
    }
}

impl Config {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Defaults overridden by `vars`. Unparseable numbers keep their default.
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        let mut config = Config::default();

        if let Some(bind) = vars.get("SHEETMAIL_BIND") {
            config.bind = bind.clone();
        }
        if let Some(port) = vars.get("SHEETMAIL_PORT") {
            config.port = port.parse().unwrap_or(config.port);
        }
        if let Some(host) = vars.get("SHEETMAIL_SMTP_HOST") {
            config.smtp_host = host.clone();
        }
        if let Some(port) = vars.get("SHEETMAIL_SMTP_PORT") {
            config.smtp_port = port.parse().unwrap_or(config.smtp_port);
        }
        if let Some(path) = vars.get("SHEETMAIL_LICENSE_FILE") {
            config.license_file = PathBuf::from(path);
        }
        if let Some(keys) = vars.get("SHEETMAIL_LICENSE_KEYS") {
            config.license_keys = keys
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
        }
        if let Some(size) = vars.get("SHEETMAIL_PAGE_SIZE") {
            config.page_size = size.parse().unwrap_or(config.page_size);
        }
        if let Some(ttl) = vars.get("SHEETMAIL_SESSION_TTL") {
            config.session_ttl_secs = ttl.parse().unwrap_or(config.session_ttl_secs);
        }

        config
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults() {
        let config = Config::from_vars(Vec::new());
        assert_eq!(config, Config::default());
        assert_eq!(config.address(), "0.0.0.0:10000");
        assert_eq!(config.smtp_port, 587);
    }

    #[test]
    fn environment_overrides() {
        let config = Config::from_vars(vars(&[
            ("SHEETMAIL_PORT", "8080"),
            ("SHEETMAIL_SMTP_HOST", "mail.example.com"),
            ("SHEETMAIL_LICENSE_KEYS", "AAA, BBB,,"),
            ("SHEETMAIL_PAGE_SIZE", "25"),
            ("SHEETMAIL_SESSION_TTL", "90"),
        ]));
        assert_eq!(config.port, 8080);
        assert_eq!(config.smtp_host, "mail.example.com");
        assert_eq!(config.license_keys, vec!["AAA", "BBB"]);
        assert_eq!(config.page_size, 25);
        assert_eq!(config.session_ttl_secs, 90);
    }

    #[test]
    fn bad_numbers_keep_defaults() {
        let config = Config::from_vars(vars(&[("SHEETMAIL_SMTP_PORT", "smtp")]));
        assert_eq!(config.smtp_port, 587);
    }

    #[test]
    fn deserializes_partial_json() {
        let config: Config = serde_json::from_str(r#"{"port": 3000}"#).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.bind, "0.0.0.0");
    }
}
