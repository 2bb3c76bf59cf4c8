#![allow(clippy::uninlined_format_args)]

use phishguard::cache::LookupCache;
use phishguard::domain_age::DomainAgeChecker;
use phishguard::reputation::classify_age;
use phishguard::whois::{WhoisClient, WhoisLookup};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("Testing REAL WHOIS lookups...");

    let whois = Arc::new(WhoisClient::new(10));
    let checker = DomainAgeChecker::new(
        whois.clone(),
        Arc::new(LookupCache::new("domain_age", None, 100)),
    );

    let test_domains = vec!["google.com", "example.com", "mail.github.com", "example.org"];

    for domain in test_domains {
        println!("\n=== Testing domain: {} ===", domain);

        let root = DomainAgeChecker::extract_root_domain(domain);
        match whois.lookup(&root).await {
            Ok(record) => println!("  Creation dates: {:?}", record.creation_dates),
            Err(e) => {
                println!("❌ WHOIS lookup failed: {}", e);
                println!("  This could be due to:");
                println!("    - WHOIS rate limits");
                println!("    - Network connectivity issues");
                println!("    - Registry returning no creation date");
            }
        }

        let age = checker.get_domain_age(domain).await;
        let (reputation, reason) = classify_age(age);
        println!("  Age: {} days → {:?} {}", age, reputation, reason.unwrap_or_default());
    }

    Ok(())
}
