use clap::{Arg, ArgAction, ArgMatches, Command};
use log::LevelFilter;
use phishguard::config::{Config, DEFAULT_CONFIG_PATH};
use phishguard::Analyzers;
use serde_json::{Map, Value};
use std::process;
use std::str::FromStr;

#[tokio::main]
async fn main() {
    let matches = Command::new("phishguard")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Phishing-risk signals for inbound email")
        .long_about("phishguard runs independent phishing analyzers and prints their results as JSON:\n\
                    • identity: SPF, DKIM and DMARC records published by the sender domain\n\
                    • reputation: URL heuristics combined with WHOIS domain age\n\
                    • intent: LLM classification of authority, urgency and financial pressure")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value(DEFAULT_CONFIG_PATH),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("check-identity")
                .long("check-identity")
                .value_name("DOMAIN")
                .help("Verify SPF, DKIM and DMARC for a sender domain")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("sender")
                .long("sender")
                .value_name("ADDRESS")
                .help("Sender address of the email")
                .default_value(""),
        )
        .arg(
            Arg::new("check-reputation")
                .long("check-reputation")
                .value_name("URL")
                .help("Score the reputation of one or more URLs")
                .num_args(1..)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("sender-domain")
                .long("sender-domain")
                .value_name("DOMAIN")
                .help("Sender domain the URLs were received from")
                .default_value(""),
        )
        .arg(
            Arg::new("analyze-intent")
                .long("analyze-intent")
                .help("Classify the email's intent with the inference backend")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("subject")
                .long("subject")
                .value_name("TEXT")
                .help("Email subject for intent analysis")
                .default_value(""),
        )
        .arg(
            Arg::new("body")
                .long("body")
                .value_name("TEXT")
                .help("Email body for intent analysis")
                .conflicts_with("body-file"),
        )
        .arg(
            Arg::new("body-file")
                .long("body-file")
                .value_name("FILE")
                .help("Read the email body for intent analysis from a file"),
        )
        .arg(
            Arg::new("check-backend")
                .long("check-backend")
                .help("Check that the inference backend is reachable")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG_PATH);
    let explicit_config = matches.value_source("config")
        == Some(clap::parser::ValueSource::CommandLine);

    let mut config = match load_config(config_path, explicit_config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };
    config.apply_env_overrides();

    // Initialize logger based on verbose flag
    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::from_str(&config.logging.level).unwrap_or(LevelFilter::Info)
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .parse_default_env()
        .init();

    let analyzers = match Analyzers::from_config(&config) {
        Ok(analyzers) => analyzers,
        Err(e) => {
            eprintln!("Error initializing analyzers: {e}");
            process::exit(1);
        }
    };

    let output = match run(&matches, &analyzers).await {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    if output.is_empty() {
        eprintln!("Nothing to do. Use --check-identity, --check-reputation, --analyze-intent or --check-backend.");
        process::exit(2);
    }

    match serde_json::to_string_pretty(&Value::Object(output)) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error serializing results: {e}");
            process::exit(1);
        }
    }
}

async fn run(matches: &ArgMatches, analyzers: &Analyzers) -> anyhow::Result<Map<String, Value>> {
    let mut output = Map::new();
    let sender = matches
        .get_one::<String>("sender")
        .map(String::as_str)
        .unwrap_or_default();

    if matches.get_flag("check-backend") {
        let available = analyzers.backend.probe().await;
        output.insert(
            "backend".to_string(),
            serde_json::json!({
                "endpoint": analyzers.backend.endpoint(),
                "model": analyzers.backend.model(),
                "available": available,
            }),
        );
    }

    if let Some(domain) = matches.get_one::<String>("check-identity") {
        let result = analyzers.identity.verify(domain, sender).await;
        output.insert("identity".to_string(), serde_json::to_value(result)?);
    }

    if let Some(urls) = matches.get_many::<String>("check-reputation") {
        let urls: Vec<String> = urls.cloned().collect();
        let sender_domain = matches
            .get_one::<String>("sender-domain")
            .map(String::as_str)
            .unwrap_or_default();
        let summary = analyzers.reputation.analyze(&urls, sender_domain).await;
        output.insert("reputation".to_string(), serde_json::to_value(summary)?);
    }

    if matches.get_flag("analyze-intent") {
        let subject = matches
            .get_one::<String>("subject")
            .map(String::as_str)
            .unwrap_or_default();
        let body = match matches.get_one::<String>("body-file") {
            Some(path) => std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("Cannot read body file {path}: {e}"))?,
            None => matches.get_one::<String>("body").cloned().unwrap_or_default(),
        };
        let assessment = analyzers.intent.analyze(subject, &body, sender).await;
        output.insert("intent".to_string(), serde_json::to_value(assessment)?);
    }

    Ok(output)
}

fn load_config(path: &str, explicit: bool) -> anyhow::Result<Config> {
    if explicit || std::path::Path::new(path).exists() {
        Config::from_file(path)
    } else {
        Ok(Config::default())
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}
