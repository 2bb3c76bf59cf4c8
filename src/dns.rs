use crate::config::DnsConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;
use std::time::Duration;

/// Resolves the TXT strings published at a name.
///
/// Lookup errors (NXDOMAIN, timeouts, malformed answers) come back as `Err`;
/// callers decide how to degrade.
#[async_trait]
pub trait TxtResolver: Send + Sync {
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>>;
}

/// TXT resolver pinned to a fixed nameserver set.
pub struct HickoryTxtResolver {
    resolver: TokioAsyncResolver,
    lifetime: Duration,
}

impl HickoryTxtResolver {
    pub fn from_config(config: &DnsConfig) -> Result<Self> {
        let ips = config
            .nameservers
            .iter()
            .map(|ns| {
                ns.parse::<IpAddr>()
                    .with_context(|| format!("Invalid nameserver address: {ns}"))
            })
            .collect::<Result<Vec<_>>>()?;

        if ips.is_empty() {
            return Err(anyhow!("At least one nameserver is required"));
        }

        let group = NameServerConfigGroup::from_ips_clear(&ips, 53, true);
        let resolver_config = ResolverConfig::from_parts(None, vec![], group);

        let mut opts = ResolverOpts::default();
        opts.timeout = config.timeout();
        opts.attempts = 1;
        opts.use_hosts_file = false;

        log::debug!(
            "DNS resolver using {:?} (timeout {:?}, lifetime {:?})",
            config.nameservers,
            config.timeout(),
            config.lifetime()
        );

        Ok(Self {
            resolver: TokioAsyncResolver::tokio(resolver_config, opts),
            lifetime: config.lifetime(),
        })
    }
}

#[async_trait]
impl TxtResolver for HickoryTxtResolver {
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>> {
        let lookup = tokio::time::timeout(self.lifetime, self.resolver.txt_lookup(name))
            .await
            .map_err(|_| anyhow!("TXT lookup for {name} timed out after {:?}", self.lifetime))?
            .with_context(|| format!("TXT lookup failed for {name}"))?;

        // Character-strings of one record are concatenated, as for SPF/DKIM keys
        // split across 255-byte chunks.
        let records = lookup
            .iter()
            .map(|txt| {
                txt.txt_data()
                    .iter()
                    .map(|chunk| String::from_utf8_lossy(chunk))
                    .collect::<String>()
            })
            .collect();

        Ok(records)
    }
}
