use crate::domain_age::DomainAgeChecker;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

pub const SUSPICIOUS_TLDS: [&str; 7] = [".tk", ".ml", ".ga", ".cf", ".gq", ".xyz", ".top"];

pub const SUSPICIOUS_KEYWORDS: [&str; 7] = [
    "verify",
    "account",
    "suspended",
    "urgent",
    "confirm",
    "update",
    "secure",
];

const CHECK_FAILED: &str = "check failed";

/// Ordered by severity: `Safe < Suspicious < Dangerous`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reputation {
    #[default]
    Safe,
    Suspicious,
    Dangerous,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlCheck {
    pub url: String,
    #[serde(rename = "domainAge")]
    pub domain_age: u32,
    pub reputation: Reputation,
    pub reason: Option<String>,
}

impl UrlCheck {
    fn check_failed(url: &str) -> Self {
        Self {
            url: url.to_string(),
            domain_age: 0,
            reputation: Reputation::Safe,
            reason: Some(CHECK_FAILED.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationSummary {
    pub status: Reputation,
    pub urls: Vec<UrlCheck>,
    #[serde(rename = "flaggedDomains")]
    pub flagged_domains: Vec<String>,
}

/// Host and lowercased path of a URL, or `None` if it has no host.
fn split_url(url: &str) -> Option<(String, String)> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str().filter(|h| !h.is_empty())?.to_lowercase();
    Some((host, parsed.path().to_lowercase()))
}

fn is_dotted_quad(host: &str) -> bool {
    let parts: Vec<&str> = host.split('.').collect();
    parts.len() == 4
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// First matching heuristic, in priority order: TLD, path keyword, IP host,
/// subdomain depth.
pub fn match_heuristics(host: &str, path: &str) -> Option<String> {
    if let Some(tld) = SUSPICIOUS_TLDS.iter().find(|tld| host.ends_with(*tld)) {
        return Some(format!("Suspicious TLD: {tld}"));
    }

    if let Some(keyword) = SUSPICIOUS_KEYWORDS.iter().find(|kw| path.contains(*kw)) {
        return Some(format!("Suspicious keyword in URL: {keyword}"));
    }

    if is_dotted_quad(host) {
        return Some("IP address used instead of domain".to_string());
    }

    // Label count, not dot count: four labels (`mail.eu.example.com`) already trip it.
    if host.split('.').count() > 3 {
        return Some("Excessive subdomains".to_string());
    }

    None
}

/// Heuristic verdict for a single URL; `Some(reason)` when dangerous.
pub fn is_suspicious_url(url: &str) -> Option<String> {
    match split_url(url) {
        Some((host, path)) => match_heuristics(&host, &path),
        None => {
            log::warn!("Error analyzing URL {url}: unparseable");
            None
        }
    }
}

/// Reputation from domain age alone, for URLs no heuristic matched.
pub fn classify_age(age_days: u32) -> (Reputation, Option<String>) {
    match age_days {
        1..=29 => (
            Reputation::Suspicious,
            Some(format!("Recently registered domain ({age_days} days old)")),
        ),
        30..=89 => (
            Reputation::Suspicious,
            Some(format!("Relatively new domain ({age_days} days old)")),
        ),
        // 0 is "unknown" and lands with established domains
        _ => (Reputation::Safe, None),
    }
}

/// URL and domain reputation scoring.
///
/// URLs are checked one after another so WHOIS upstreams see at most one
/// query in flight per analysis.
#[derive(Clone)]
pub struct ReputationAnalyzer {
    domain_age: DomainAgeChecker,
}

impl ReputationAnalyzer {
    pub fn new(domain_age: DomainAgeChecker) -> Self {
        Self { domain_age }
    }

    pub async fn check_url_reputation(&self, url: &str) -> UrlCheck {
        let Some((host, path)) = split_url(url) else {
            log::error!("Failed to check reputation for {url}: no host");
            return UrlCheck::check_failed(url);
        };

        let domain_age = self.domain_age.get_domain_age(&host).await;

        let (reputation, reason) = match match_heuristics(&host, &path) {
            Some(reason) => (Reputation::Dangerous, Some(reason)),
            None => classify_age(domain_age),
        };

        UrlCheck {
            url: url.to_string(),
            domain_age,
            reputation,
            reason,
        }
    }

    pub async fn analyze(&self, urls: &[String], sender_domain: &str) -> ReputationSummary {
        log::info!(
            "Analyzing reputation for {} URLs (sender domain: {sender_domain})",
            urls.len()
        );

        let mut summary = ReputationSummary::default();
        let mut seen = HashSet::new();

        for url in urls {
            let check = self.check_url_reputation(url).await;

            if check.reputation != Reputation::Safe {
                if let Some((host, _)) = split_url(url) {
                    if seen.insert(host.clone()) {
                        summary.flagged_domains.push(host);
                    }
                }
            }

            summary.status = summary.status.max(check.reputation);
            summary.urls.push(check);
        }

        log::info!(
            "Reputation status {:?}, {} flagged domains",
            summary.status,
            summary.flagged_domains.len()
        );
        summary
    }
}
