use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use donorstore_core::config::Config;
use donorstore_core::core_session::GossipHub;
use donorstore_core::logging::{init_logging_with_config, LogConfig};
use donorstore_core::DonorRegistry;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

mod demo;

/// Data directory used when neither the config file nor the environment sets one
const DEFAULT_DATA_DIR: &str = "~/.donorstore";

#[derive(Parser, Debug)]
#[command(name = "donorstore")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file; DONORSTORE_* environment variables are used otherwise
    #[arg(short, long)]
    config: Option<String>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a donor and print its id
    Put {
        /// Fields as key=value; values that parse as JSON keep their type
        #[arg(required = true, value_parser = parse_field)]
        fields: Vec<(String, Value)>,
    },
    /// Print every donor record as one JSON object per line
    List,
    /// Print the id the next donor would receive
    NextId,
    /// Run two in-process peers and show replication between them
    Demo,
}

/// Split `key=value`. The value is taken as JSON when it parses, as a string otherwise.
fn parse_field(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing field name in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let path = PathBuf::from(shellexpand::tilde(path).to_string());
            Config::from_file(&path)?
        }
        None => Config::from_env()?,
    };

    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    config.validate()?;
    Ok(config)
}

/// Open the configured store on its own transport, backed by a commit log
async fn open_registry(mut config: Config) -> Result<DonorRegistry> {
    let data_dir = match config.session.data_dir.take() {
        Some(dir) => dir.to_string_lossy().into_owned(),
        None => DEFAULT_DATA_DIR.to_string(),
    };
    config.session.data_dir = Some(PathBuf::from(shellexpand::tilde(&data_dir).to_string()));

    let peer = config.session.resolve_peer_id();
    config.session.peer_id = Some(peer.to_string());
    // Single-node: nobody else joins this hub
    let transport = GossipHub::new().join(peer);

    DonorRegistry::set_up(&config, Arc::new(transport))
        .await
        .context("failed to set up the donor registry")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_logging_with_config(LogConfig::try_from(&config.logging)?)?;

    info!("DonorStore CLI started");

    match args.command {
        Some(Command::Put { fields }) => {
            let donor: Map<String, Value> = fields.into_iter().collect();
            let registry = open_registry(config).await?;
            let id = registry.put_data(&donor)?;
            println!("{}", id);
        }
        Some(Command::List) => {
            let registry = open_registry(config).await?;
            for document in registry.get_data() {
                println!("{}", document.to_json());
            }
        }
        Some(Command::NextId) => {
            let registry = open_registry(config).await?;
            println!("{}", registry.get_id());
        }
        Some(Command::Demo) => demo::run(&config).await?,
        None => {
            info!("No command specified. Use --help for usage information.");
        }
    }

    info!("DonorStore CLI finished");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_field_keeps_json_types() {
        assert_eq!(parse_field("age=42").unwrap(), ("age".to_string(), json!(42)));
        assert_eq!(parse_field("active=true").unwrap(), ("active".to_string(), json!(true)));
        assert_eq!(
            parse_field("name=Alice").unwrap(),
            ("name".to_string(), json!("Alice"))
        );
        assert_eq!(
            parse_field("note=a=b").unwrap(),
            ("note".to_string(), json!("a=b"))
        );
    }

    #[test]
    fn test_parse_field_rejects_malformed() {
        assert!(parse_field("name").is_err());
        assert!(parse_field(" =x").is_err());
    }

    #[test]
    fn test_args_parse_put() {
        let args = Args::try_parse_from([
            "donorstore",
            "--log-level",
            "warn",
            "put",
            "name=Alice",
            "bloodType=O-",
        ])
        .unwrap();
        assert_eq!(args.log_level.as_deref(), Some("warn"));
        match args.command {
            Some(Command::Put { fields }) => assert_eq!(fields.len(), 2),
            other => panic!("expected put, got {:?}", other),
        }
    }

    #[test]
    fn test_put_requires_fields() {
        assert!(Args::try_parse_from(["donorstore", "put"]).is_err());
    }
}
