use crate::cache::LookupCache;
use crate::dns::TxtResolver;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Selectors probed for a published DKIM key, in order.
pub const DKIM_SELECTORS: [&str; 7] = [
    "default",
    "google",
    "k1",
    "s1",
    "s2",
    "selector1",
    "selector2",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityResult {
    pub verified: bool,
    pub spf: bool,
    pub dkim: bool,
    pub dmarc: bool,
    pub domain: String,
}

impl IdentityResult {
    /// DKIM is informational; a domain is verified by SPF and DMARC alone.
    pub fn new(domain: &str, spf: bool, dkim: bool, dmarc: bool) -> Self {
        Self {
            verified: spf && dmarc,
            spf,
            dkim,
            dmarc,
            domain: domain.to_string(),
        }
    }
}

/// Sender-identity checks against the DNS records a domain publishes.
#[derive(Clone)]
pub struct IdentityVerifier {
    resolver: Arc<dyn TxtResolver>,
    cache: Arc<LookupCache<IdentityResult>>,
}

impl IdentityVerifier {
    pub fn new(resolver: Arc<dyn TxtResolver>, cache: Arc<LookupCache<IdentityResult>>) -> Self {
        Self { resolver, cache }
    }

    /// Verify `domain`. Results are cached per domain; `sender` does not
    /// take part in the verdict.
    pub async fn verify(&self, domain: &str, sender: &str) -> IdentityResult {
        log::info!("Starting identity verification for domain: {domain} (sender: {sender})");

        self.cache
            .get_or_load(domain, || self.lookup(domain))
            .await
    }

    async fn lookup(&self, domain: &str) -> IdentityResult {
        let (spf, dkim, dmarc) = tokio::join!(
            self.check_spf(domain),
            self.check_dkim(domain),
            self.check_dmarc(domain)
        );

        let result = IdentityResult::new(domain, spf, dkim, dmarc);
        log::info!(
            "Identity for {domain}: spf={spf} dkim={dkim} dmarc={dmarc} verified={}",
            result.verified
        );
        result
    }

    pub async fn check_spf(&self, domain: &str) -> bool {
        match self.resolver.resolve_txt(domain).await {
            Ok(records) => {
                let found = records.iter().any(|r| r.trim().starts_with("v=spf1"));
                if found {
                    log::debug!("SPF record found for {domain}");
                }
                found
            }
            Err(e) => {
                log::warn!("SPF check failed for {domain}: {e}");
                false
            }
        }
    }

    pub async fn check_dkim(&self, domain: &str) -> bool {
        for selector in DKIM_SELECTORS {
            let name = format!("{selector}._domainkey.{domain}");
            match self.resolver.resolve_txt(&name).await {
                Ok(records) => {
                    if records
                        .iter()
                        .any(|r| r.contains("v=DKIM1") || r.contains("k=rsa"))
                    {
                        log::debug!("DKIM record found for {domain} with selector {selector}");
                        return true;
                    }
                }
                Err(e) => {
                    log::debug!("DKIM selector {selector} failed for {domain}: {e}");
                }
            }
        }

        log::warn!("No DKIM records found for {domain}");
        false
    }

    pub async fn check_dmarc(&self, domain: &str) -> bool {
        let name = format!("_dmarc.{domain}");
        match self.resolver.resolve_txt(&name).await {
            Ok(records) => {
                let found = records.iter().any(|r| r.trim().starts_with("v=DMARC1"));
                if found {
                    log::debug!("DMARC record found for {domain}");
                }
                found
            }
            Err(e) => {
                log::warn!("DMARC check failed for {domain}: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct MockResolver {
        records: HashMap<String, Vec<String>>,
        queries: Mutex<Vec<String>>,
    }

    impl MockResolver {
        fn with(mut self, name: &str, txt: &str) -> Self {
            self.records
                .entry(name.to_string())
                .or_default()
                .push(txt.to_string());
            self
        }

        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TxtResolver for MockResolver {
        async fn resolve_txt(&self, name: &str) -> Result<Vec<String>> {
            self.queries.lock().unwrap().push(name.to_string());
            self.records
                .get(name)
                .cloned()
                .ok_or_else(|| anyhow!("NXDOMAIN: {name}"))
        }
    }

    /// Answers nothing, but tracks how many queries overlap.
    #[derive(Default)]
    struct SlowResolver {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl TxtResolver for SlowResolver {
        async fn resolve_txt(&self, name: &str) -> Result<Vec<String>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Err(anyhow!("SERVFAIL: {name}"))
        }
    }

    fn verifier(resolver: Arc<MockResolver>) -> IdentityVerifier {
        IdentityVerifier::new(resolver, Arc::new(LookupCache::new("identity", None, 100)))
    }

    #[tokio::test]
    async fn test_spf_and_dmarc_without_dkim_is_verified() {
        let resolver = Arc::new(
            MockResolver::default()
                .with("x.com", "v=spf1 include:_spf.x.com ~all")
                .with("_dmarc.x.com", "v=DMARC1; p=reject"),
        );
        let result = verifier(resolver.clone()).verify("x.com", "a@x.com").await;

        assert_eq!(result, IdentityResult::new("x.com", true, false, true));
        assert!(result.verified);

        // every selector was tried before giving up
        let queries = resolver.queries();
        for selector in DKIM_SELECTORS {
            assert!(queries.contains(&format!("{selector}._domainkey.x.com")));
        }
    }

    #[tokio::test]
    async fn test_record_checks_overlap() {
        let resolver = Arc::new(SlowResolver::default());
        let verifier = IdentityVerifier::new(
            resolver.clone(),
            Arc::new(LookupCache::new("identity", None, 100)),
        );

        let result = verifier.verify("x.com", "a@x.com").await;

        assert!(!result.verified);
        assert!(resolver.peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_dkim_short_circuits_on_first_match() {
        let resolver = Arc::new(
            MockResolver::default()
                .with("google._domainkey.y.org", "v=DKIM1; k=rsa; p=MIIB"),
        );
        let verifier = verifier(resolver.clone());
        assert!(verifier.check_dkim("y.org").await);

        let queries = resolver.queries();
        assert_eq!(
            queries,
            vec!["default._domainkey.y.org", "google._domainkey.y.org"]
        );
    }

    #[tokio::test]
    async fn test_dkim_matches_rsa_key_without_version() {
        let resolver =
            Arc::new(MockResolver::default().with("selector2._domainkey.z.net", "k=rsa; p=abc"));
        assert!(verifier(resolver).check_dkim("z.net").await);
    }

    #[tokio::test]
    async fn test_missing_dmarc_is_not_verified() {
        let resolver = Arc::new(
            MockResolver::default()
                .with("a.io", "google-site-verification=xyz")
                .with("a.io", "v=spf1 -all")
                .with("_dmarc.a.io", "not a dmarc record"),
        );
        let result = verifier(resolver).verify("a.io", "").await;
        assert!(result.spf);
        assert!(!result.dmarc);
        assert!(!result.verified);
    }

    #[tokio::test]
    async fn test_total_dns_failure_degrades_to_false() {
        let resolver = Arc::new(MockResolver::default());
        let result = verifier(resolver).verify("nowhere.invalid", "x").await;
        assert_eq!(
            result,
            IdentityResult::new("nowhere.invalid", false, false, false)
        );
    }

    #[tokio::test]
    async fn test_verify_is_cached_per_domain() {
        let resolver = Arc::new(
            MockResolver::default()
                .with("x.com", "v=spf1 -all")
                .with("_dmarc.x.com", "v=DMARC1; p=none"),
        );
        let verifier = verifier(resolver.clone());

        let first = verifier.verify("x.com", "one@x.com").await;
        let queries_after_first = resolver.queries().len();
        let second = verifier.verify("x.com", "other@x.com").await;

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(resolver.queries().len(), queries_after_first);
    }

    #[test]
    fn test_boundary_json_shape() {
        let result = IdentityResult::new("x.com", true, true, false);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "verified": false,
                "spf": true,
                "dkim": true,
                "dmarc": false,
                "domain": "x.com"
            })
        );
    }
}
