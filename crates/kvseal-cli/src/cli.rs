use clap::{Parser, Subcommand};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "kvseal",
    about = "Key-value storage with values sealed by a key-management service",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Decrypt and print the value stored under a key.
    Get { key: String },
    /// Encrypt and store a value under a key.
    Set { key: String, value: String },
    /// Check the storage backend and the KMS encrypt/decrypt round trip.
    Health {
        /// Key handed to the backend's own liveness check.
        #[arg(long, default_value = "health/probe")]
        key: String,
    },
    /// Manage master keys.
    #[command(subcommand)]
    Key(KeyCommand),
    /// Print version and exit.
    Version,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum KeyCommand {
    /// Provision the configured master key if it does not exist yet.
    Init,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_get_subcommand() {
        let cli =
            Cli::try_parse_from(["kvseal", "get", "vault-root"]).expect("parse should succeed");
        assert_eq!(
            cli.command,
            Command::Get {
                key: "vault-root".into()
            }
        );
    }

    #[test]
    fn parses_set_subcommand() {
        let cli =
            Cli::try_parse_from(["kvseal", "set", "k", "v"]).expect("parse should succeed");
        assert_eq!(
            cli.command,
            Command::Set {
                key: "k".into(),
                value: "v".into()
            }
        );
    }

    #[test]
    fn health_key_defaults_to_probe() {
        let cli = Cli::try_parse_from(["kvseal", "health"]).expect("parse should succeed");
        assert_eq!(
            cli.command,
            Command::Health {
                key: "health/probe".into()
            }
        );
    }

    #[test]
    fn parses_key_init_subcommand() {
        let cli = Cli::try_parse_from(["kvseal", "key", "init"]).expect("parse should succeed");
        assert_eq!(cli.command, Command::Key(KeyCommand::Init));
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli =
            Cli::try_parse_from(["kvseal", "config", "init"]).expect("parse should succeed");
        assert_eq!(cli.command, Command::Config(ConfigCommand::Init));
    }

    #[test]
    fn requires_a_subcommand() {
        assert!(Cli::try_parse_from(["kvseal"]).is_err());
    }
}
