use std::env;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Per tool call. Should exceed the pipeline's own request deadline.
    pub timeout_ms: u64,
    pub max_msg_bytes: usize,
    pub max_field_bytes: usize,
    pub cache_entries: u64,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            max_msg_bytes: 1_000_000,
            max_field_bytes: 64_000,
            cache_entries: 512,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| env::var(k).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = lookup("QUERYGATE_SERVER_TIMEOUT_MS") {
            if let Ok(n) = v.parse() {
                cfg.timeout_ms = n;
            }
        }
        if let Some(v) = lookup("QUERYGATE_MAX_BYTES") {
            if let Ok(n) = v.parse() {
                cfg.max_msg_bytes = n;
            }
        }
        if let Some(v) = lookup("QUERYGATE_MAX_FIELD_BYTES") {
            if let Ok(n) = v.parse() {
                cfg.max_field_bytes = n;
            }
        }
        if let Some(v) = lookup("QUERYGATE_CACHE_ENTRIES") {
            if let Ok(n) = v.parse() {
                cfg.cache_entries = n;
            }
        }
        if let Some(v) = lookup("QUERYGATE_LOG") {
            cfg.log_level = v;
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("QUERYGATE_SERVER_TIMEOUT_MS", "250"),
            ("QUERYGATE_MAX_FIELD_BYTES", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let cfg = ServerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.timeout_ms, 250);
        assert_eq!(cfg.max_field_bytes, 64_000);
    }
}
