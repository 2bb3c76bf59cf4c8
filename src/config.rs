use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/phishguard.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub dns: DnsConfig,
    pub whois: WhoisConfig,
    pub inference: InferenceConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DnsConfig {
    pub nameservers: Vec<String>,
    /// Per-query timeout handed to the resolver
    pub timeout_seconds: f64,
    /// Upper bound for a whole lookup, retries included
    pub lifetime_seconds: f64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            nameservers: vec!["8.8.8.8".to_string(), "1.1.1.1".to_string()],
            timeout_seconds: DEFAULT_DNS_SECONDS,
            lifetime_seconds: DEFAULT_DNS_SECONDS,
        }
    }
}

const DEFAULT_DNS_SECONDS: f64 = 5.0;

/// Negative, NaN, infinite and out-of-range values fall back to the default.
fn seconds_or_default(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds)
        .unwrap_or_else(|_| Duration::from_secs_f64(DEFAULT_DNS_SECONDS))
}

impl DnsConfig {
    pub fn timeout(&self) -> Duration {
        seconds_or_default(self.timeout_seconds)
    }

    pub fn lifetime(&self) -> Duration {
        seconds_or_default(self.lifetime_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WhoisConfig {
    pub timeout_seconds: u64,
}

impl Default for WhoisConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InferenceConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    /// Sized for local model latency
    pub timeout_seconds: u64,
    pub probe_timeout_seconds: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "gpt-oss:latest".to_string(),
            temperature: 0.3,
            top_p: 0.9,
            timeout_seconds: 60,
            probe_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    /// `None` keeps entries for the life of the process
    pub ttl_seconds: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl_seconds: Some(24 * 60 * 60),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_seconds.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// OLLAMA_ENDPOINT and OLLAMA_MODEL take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup("OLLAMA_ENDPOINT").filter(|v| !v.trim().is_empty()) {
            log::debug!("Inference endpoint overridden from environment: {endpoint}");
            self.inference.endpoint = endpoint.trim().to_string();
        }
        if let Some(model) = lookup("OLLAMA_MODEL").filter(|v| !v.trim().is_empty()) {
            log::debug!("Inference model overridden from environment: {model}");
            self.inference.model = model.trim().to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.dns.nameservers, vec!["8.8.8.8", "1.1.1.1"]);
        assert_eq!(config.dns.timeout(), Duration::from_secs(5));
        assert_eq!(config.inference.endpoint, "http://localhost:11434");
        assert_eq!(config.inference.timeout_seconds, 60);
        assert_eq!(config.cache.ttl(), Some(Duration::from_secs(86400)));
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
inference:
  model: llama3
cache:
  max_entries: 50
  ttl_seconds: ~
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.inference.model, "llama3");
        assert_eq!(config.inference.endpoint, "http://localhost:11434");
        assert_eq!(config.cache.max_entries, 50);
        assert_eq!(config.cache.ttl(), None);
        assert_eq!(config.dns, DnsConfig::default());
    }

    #[test]
    fn test_unrepresentable_dns_durations_use_default() {
        let yaml = r#"
dns:
  timeout_seconds: .inf
  lifetime_seconds: 1.0e300
"#;
        let mut config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.dns.timeout(), Duration::from_secs(5));
        assert_eq!(config.dns.lifetime(), Duration::from_secs(5));

        config.dns.timeout_seconds = f64::NAN;
        config.dns.lifetime_seconds = -1.0;
        assert_eq!(config.dns.timeout(), Duration::from_secs(5));
        assert_eq!(config.dns.lifetime(), Duration::from_secs(5));

        config.dns.timeout_seconds = 0.5;
        assert_eq!(config.dns.timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = Config::default();
        config.whois.timeout_seconds = 3;
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert_eq!(Config::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        let vars = HashMap::from([
            ("OLLAMA_MODEL", "test-model".to_string()),
            ("OLLAMA_ENDPOINT", "   ".to_string()),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|name| vars.get(name).cloned());

        assert_eq!(config.inference.model, "test-model");
        // blank values are ignored
        assert_eq!(config.inference.endpoint, "http://localhost:11434");
    }
}
