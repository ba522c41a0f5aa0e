mod cli;
mod config;
mod storage;

use std::io::Write;

use crate::cli::{ConfigCommand, KeyCommand};
use clap::Parser;
use color_eyre::Result;
use kvseal_core::storage::KvStore;
use kvseal_storage::key_provider::KeyProvider;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    dispatch(cli.command, config::load).await
}

/// Runs a command, loading the config only for commands that use it.
async fn dispatch(
    command: cli::Command,
    load_config: impl FnOnce() -> Result<config::Config>,
) -> Result<()> {
    if command == cli::Command::Version {
        print_version();
        return Ok(());
    }

    let config = load_config()?;
    match command {
        cli::Command::Get { key } => run_get(&config, &key).await?,
        cli::Command::Set { key, value } => run_set(&config, &key, value.as_bytes()).await?,
        cli::Command::Health { key } => run_health_check(&config, &key).await?,
        cli::Command::Key(KeyCommand::Init) => init_key(&config).await?,
        cli::Command::Config(ConfigCommand::Init) => init_config(&config)?,
        cli::Command::Version => print_version(),
    }

    Ok(())
}

fn init_tracing() {
    // Default to info; logs go to stderr so `get` output stays clean.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("kvseal {}", env!("CARGO_PKG_VERSION"));
}

async fn run_get(config: &config::Config, key: &str) -> Result<()> {
    let store = storage::store_from_config(config)?;
    let value = read_value(&store, key).await?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&value)?;
    stdout.flush()?;
    Ok(())
}

async fn run_set(config: &config::Config, key: &str, value: &[u8]) -> Result<()> {
    let store = storage::store_from_config(config)?;
    write_value(&store, key, value).await?;
    info!(key, "value stored");
    Ok(())
}

async fn read_value<S: KvStore>(store: &S, key: &str) -> Result<Vec<u8>> {
    store
        .get(key)
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))
}

async fn write_value<S: KvStore>(store: &S, key: &str, value: &[u8]) -> Result<()> {
    store
        .set(key, value)
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))
}

/// Runs the store's self-check: backend liveness plus a KMS round trip.
async fn run_health_check(config: &config::Config, key: &str) -> Result<()> {
    let store = storage::store_from_config(config)?;
    run_store_health(&store, key).await?;
    println!("Storage: ok");
    Ok(())
}

async fn run_store_health<S: KvStore>(store: &S, key: &str) -> Result<()> {
    store.test(key).await.map_err(|e| {
        let hint = if e.is_retryable() {
            "transient, may be retried"
        } else {
            "configuration problem, retrying will not help"
        };
        color_eyre::eyre::eyre!("{e} ({hint})")
    })
}

async fn init_key(config: &config::Config) -> Result<()> {
    let kms = storage::kms_from_config(config)?;
    let key_id = config.key_id();
    let material = kms
        .key_provider()
        .get_or_create(&key_id)
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    println!(
        "Master key '{}' ready in keyring service '{}'",
        material.id,
        kms.key_provider().service()
    );
    Ok(())
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}
