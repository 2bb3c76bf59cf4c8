use crate::config::WhoisConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;

/// Registration metadata for a domain. Registries may report several
/// creation dates; the first one is authoritative.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhoisRecord {
    pub creation_dates: Vec<DateTime<Utc>>,
}

impl WhoisRecord {
    pub fn creation_date(&self) -> Option<DateTime<Utc>> {
        self.creation_dates.first().copied()
    }
}

#[async_trait]
pub trait WhoisLookup: Send + Sync {
    /// Fails when the registry has no data or cannot be reached.
    async fn lookup(&self, domain: &str) -> Result<WhoisRecord>;
}

lazy_static! {
    static ref CREATION_PATTERNS: Vec<Regex> = [
        r"(?im)^\s*creation\s*date\s*:\s*(.+)$",
        r"(?im)^\s*domain\s*created\s*:\s*(.+)$",
        r"(?im)^\s*created\s*on\s*:\s*(.+)$",
        r"(?im)^\s*created\s*:\s*(.+)$",
        r"(?im)^\s*registered\s*on\s*:\s*(.+)$",
        r"(?im)^\s*registered\s*:\s*(.+)$",
        r"(?im)^\s*registration\s*(?:date|time)\s*:\s*(.+)$",
        r"(?im)^\s*domain_date_created\s*:\s*(.+)$",
        r"(?im)^\s*create_date\s*:\s*(.+)$",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect();
    static ref REFER_PATTERN: Regex =
        Regex::new(r"(?im)^\s*(?:refer|whois|registrar\s+whois\s+server)\s*:\s*([a-z0-9.\-]+)\s*$")
            .unwrap();
}

/// Port-43 WHOIS client. Only the creation date is extracted.
pub struct WhoisClient {
    timeout: Duration,
    port: u16,
}

impl WhoisClient {
    pub fn new(timeout_seconds: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_seconds),
            port: 43,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn from_config(config: &WhoisConfig) -> Self {
        Self::new(config.timeout_seconds)
    }

    /// Registry server for the domain's TLD, if known.
    pub fn whois_server(domain: &str) -> Option<&'static str> {
        let tld = domain.rsplit('.').next().unwrap_or(domain);
        let server = match tld {
            "com" | "net" => "whois.verisign-grs.com",
            "org" => "whois.pir.org",
            "info" => "whois.afilias.net",
            "biz" => "whois.nic.biz",
            "io" => "whois.nic.io",
            "us" => "whois.nic.us",
            "uk" => "whois.nic.uk",
            "de" => "whois.denic.de",
            "fr" => "whois.nic.fr",
            "it" => "whois.nic.it",
            "nl" => "whois.domain-registry.nl",
            "au" => "whois.auda.org.au",
            "ca" => "whois.cira.ca",
            "jp" => "whois.jprs.jp",
            "br" => "whois.registro.br",
            "xyz" => "whois.nic.xyz",
            "top" => "whois.nic.top",
            _ => return None,
        };
        Some(server)
    }

    async fn query(&self, server: &str, domain: &str) -> Result<String> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpStream;
        use tokio::time::timeout;

        log::debug!("Querying WHOIS server {server}:{} for {domain}", self.port);

        let mut stream = timeout(self.timeout, TcpStream::connect((server, self.port)))
            .await
            .map_err(|_| anyhow!("Connection to {server} timed out"))??;

        timeout(self.timeout, stream.write_all(format!("{domain}\r\n").as_bytes()))
            .await
            .map_err(|_| anyhow!("Writing to {server} timed out"))??;

        let mut buf = Vec::new();
        timeout(self.timeout, stream.read_to_end(&mut buf))
            .await
            .map_err(|_| anyhow!("Reading from {server} timed out"))??;

        if buf.is_empty() {
            return Err(anyhow!("Empty WHOIS response from {server}"));
        }

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    async fn resolve_server(&self, domain: &str) -> Result<String> {
        if let Some(server) = Self::whois_server(domain) {
            return Ok(server.to_string());
        }

        let iana = self.query("whois.iana.org", domain).await?;
        referral(&iana).ok_or_else(|| anyhow!("No WHOIS server known for {domain}"))
    }
}

#[async_trait]
impl WhoisLookup for WhoisClient {
    async fn lookup(&self, domain: &str) -> Result<WhoisRecord> {
        let server = self.resolve_server(domain).await?;
        let text = self.query(&server, domain).await?;
        let mut record = parse_whois_text(&text);

        // Thin registries point at the registrar's server for the full record.
        if record.creation_dates.is_empty() {
            if let Some(next) = referral(&text).filter(|next| *next != server) {
                if let Ok(text) = self.query(&next, domain).await {
                    record = parse_whois_text(&text);
                }
            }
        }

        if record.creation_dates.is_empty() {
            return Err(anyhow!("No creation date in WHOIS data for {domain}"));
        }

        Ok(record)
    }
}

fn referral(text: &str) -> Option<String> {
    REFER_PATTERN
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches('.').to_lowercase())
        .filter(|server| server.contains('.'))
}

/// Extract every creation date from a WHOIS response, in document order.
pub fn parse_whois_text(text: &str) -> WhoisRecord {
    let mut creation_dates = Vec::new();
    for pattern in CREATION_PATTERNS.iter() {
        let dates: Vec<DateTime<Utc>> = pattern
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .filter_map(|m| parse_date(m.as_str()))
            .collect();

        if !dates.is_empty() {
            creation_dates = dates;
            break;
        }
    }

    WhoisRecord { creation_dates }
}

pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }

    // "2024-01-02T03:04:05.0Z" variants and trailing zone names
    let token = raw.split_whitespace().next().unwrap_or(raw);
    let token = token.trim_end_matches('Z');
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(token, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }

    for format in ["%Y-%m-%d", "%d-%b-%Y", "%d.%m.%Y", "%Y.%m.%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(token, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|naive| Utc.from_utc_datetime(&naive));
        }
    }

    None
}
