use crate::cache::LookupCache;
use crate::whois::WhoisLookup;
use chrono::{DateTime, Utc};
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Domain age in days, backed by WHOIS and a shared cache.
///
/// An age of 0 means "unknown": WHOIS failed, had no creation date, or the
/// host was an IP literal.
#[derive(Clone)]
pub struct DomainAgeChecker {
    whois: Arc<dyn WhoisLookup>,
    cache: Arc<LookupCache<u32>>,
}

impl DomainAgeChecker {
    pub fn new(whois: Arc<dyn WhoisLookup>, cache: Arc<LookupCache<u32>>) -> Self {
        Self { whois, cache }
    }

    /// Lowercase, drop any port and trailing dot.
    pub fn normalize_host(host: &str) -> String {
        let host = host.trim();
        let host = match host.rsplit_once(':') {
            Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
            _ => host,
        };
        host.trim_end_matches('.').to_lowercase()
    }

    /// Reduce a host to its last two labels, e.g. "email.nationalgeographic.com"
    /// -> "nationalgeographic.com". Multi-label suffixes such as "co.uk" are
    /// not special-cased.
    pub fn extract_root_domain(domain: &str) -> String {
        let parts: Vec<&str> = domain.split('.').collect();
        if parts.len() > 2 {
            parts[parts.len() - 2..].join(".")
        } else {
            domain.to_string()
        }
    }

    pub async fn get_domain_age(&self, host: &str) -> u32 {
        let host = Self::normalize_host(host);

        if host.parse::<Ipv4Addr>().is_ok() || host.starts_with('[') || host.is_empty() {
            log::debug!("Skipping WHOIS for non-domain host: {host:?}");
            return 0;
        }

        let root_domain = Self::extract_root_domain(&host);
        self.cache
            .get_or_load(&root_domain, || self.fetch_age(&root_domain))
            .await
    }

    async fn fetch_age(&self, root_domain: &str) -> u32 {
        log::info!("Querying WHOIS for {root_domain}");

        match self.whois.lookup(root_domain).await {
            Ok(record) => match record.creation_date() {
                Some(created) => {
                    let age_days = Self::calculate_age_days(created, Utc::now());
                    log::info!("Domain {root_domain} age: {age_days} days");
                    age_days
                }
                None => {
                    log::warn!("No creation date for {root_domain}, age unknown");
                    0
                }
            },
            Err(e) => {
                log::warn!("Failed to get domain age for {root_domain}: {e}");
                0
            }
        }
    }

    /// Whole days between creation and `now`, floored at 0.
    pub fn calculate_age_days(created: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
        let days = (now - created).num_days().max(0);
        u32::try_from(days).unwrap_or(u32::MAX)
    }
}
