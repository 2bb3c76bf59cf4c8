pub mod analyzers;
pub mod cache;
pub mod config;
pub mod dns;
pub mod domain_age;
pub mod identity;
pub mod intent;
pub mod llm;
pub mod reputation;
pub mod whois;

pub use analyzers::Analyzers;
pub use cache::LookupCache;
pub use config::Config;
pub use domain_age::DomainAgeChecker;
pub use identity::{IdentityResult, IdentityVerifier};
pub use intent::{parse_llm_response, IntentAnalyzer, IntentAssessment};
pub use llm::{InferenceClient, OllamaClient, ResponseEnvelope};
pub use reputation::{Reputation, ReputationAnalyzer, ReputationSummary, UrlCheck};
pub use whois::{WhoisClient, WhoisLookup, WhoisRecord};
