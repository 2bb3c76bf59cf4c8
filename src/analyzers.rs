use crate::cache::LookupCache;
use crate::config::Config;
use crate::dns::HickoryTxtResolver;
use crate::domain_age::DomainAgeChecker;
use crate::identity::IdentityVerifier;
use crate::intent::IntentAnalyzer;
use crate::llm::OllamaClient;
use crate::reputation::ReputationAnalyzer;
use crate::whois::WhoisClient;
use anyhow::Result;
use std::sync::Arc;

/// The three analyzers wired to production collaborators. Each owns its
/// caches; clones share them.
#[derive(Clone)]
pub struct Analyzers {
    pub identity: IdentityVerifier,
    pub reputation: ReputationAnalyzer,
    pub intent: IntentAnalyzer,
    pub backend: Arc<OllamaClient>,
}

impl Analyzers {
    pub fn from_config(config: &Config) -> Result<Self> {
        let resolver = Arc::new(HickoryTxtResolver::from_config(&config.dns)?);
        let identity = IdentityVerifier::new(
            resolver,
            Arc::new(LookupCache::from_config("identity", &config.cache)),
        );

        let whois = Arc::new(WhoisClient::from_config(&config.whois));
        let domain_age = DomainAgeChecker::new(
            whois,
            Arc::new(LookupCache::from_config("domain_age", &config.cache)),
        );
        let reputation = ReputationAnalyzer::new(domain_age);

        let backend = Arc::new(OllamaClient::from_config(&config.inference)?);
        let intent = IntentAnalyzer::new(backend.clone());

        log::debug!(
            "Analyzers ready (inference {} model {})",
            backend.endpoint(),
            backend.model()
        );

        Ok(Self {
            identity,
            reputation,
            intent,
            backend,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_default_config() {
        let analyzers = Analyzers::from_config(&Config::default()).unwrap();
        assert_eq!(analyzers.backend.endpoint(), "http://localhost:11434");
    }

    #[tokio::test]
    async fn test_invalid_nameserver_is_rejected() {
        let mut config = Config::default();
        config.dns.nameservers = vec!["dns.google".to_string()];
        assert!(Analyzers::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_reputation_runs_without_network_for_ip_urls() {
        let analyzers = Analyzers::from_config(&Config::default()).unwrap();
        let summary = analyzers
            .reputation
            .analyze(&["http://203.0.113.5/login".to_string()], "example.com")
            .await;
        assert_eq!(summary.flagged_domains, vec!["203.0.113.5"]);
    }
}
